//! Flow step results
//!
//! Every step handler resolves to a [`FlowResult`]: another form to show,
//! a finished entry, or a terminal abort. The serialized shape (a `type`
//! tag plus per-variant fields) is what the frontend consumes.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Steps that can await user input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepId {
    /// One-shot confirmation of a discovered device
    BluetoothConfirm,
    /// Manual device selection
    User,
}

/// Terminal reasons a flow ends without an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    /// The device is not a supported type
    NotSupported,
    /// Manual scan found no eligible devices
    NoDevicesFound,
    /// The address already has a persisted entry
    AlreadyConfigured,
    /// Another active flow already claimed the address
    AlreadyInProgress,
}

/// One choice in a select field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    /// Value submitted back by the frontend
    pub value: String,
    /// Label shown to the user
    pub label: String,
}

impl SelectOption {
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }
}

/// Form field schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<SelectOption>,
}

impl FormField {
    /// A required single-choice field constrained to the given options
    pub fn select(name: impl Into<String>, options: Vec<SelectOption>) -> Self {
        Self {
            name: name.into(),
            field_type: "select".to_string(),
            required: true,
            options,
        }
    }
}

/// Result of running one flow step
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlowResult {
    /// Show a form and suspend until the user submits it
    Form {
        step_id: StepId,
        /// Empty for confirm-only steps
        #[serde(skip_serializing_if = "Vec::is_empty")]
        data_schema: Vec<FormField>,
        #[serde(skip_serializing_if = "Option::is_none")]
        description_placeholders: Option<HashMap<String, String>>,
    },
    /// Flow finished; the entry is handed to the store
    CreateEntry {
        title: String,
        data: HashMap<String, serde_json::Value>,
    },
    /// Flow ended without creating an entry
    Abort { reason: AbortReason },
}

impl FlowResult {
    /// Whether this result ends the flow
    pub fn is_terminal(&self) -> bool {
        !matches!(self, FlowResult::Form { .. })
    }
}
