//! Solarbeaker setup flow session
//!
//! One [`SolarbeakerConfigFlow`] exists per setup attempt. It is a plain
//! stateful object: the host (or [`crate::FlowManager`]) calls a step
//! handler, gets a [`FlowResult`] back, and the session suspends until the
//! next call. Two linear paths exist:
//!
//! ```text
//! start -> handle_discovery -> bluetooth_confirm form -> handle_confirm -> entry | abort
//! start -> handle_user_select -> user form -> handle_user_select -> entry | abort
//! ```
//!
//! There are no retries and no backward transitions; every path ends in a
//! created entry or a terminal abort.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use indexmap::IndexMap;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use kindhome_bluetooth::{BluetoothServiceInfo, DiscoverySource};
use kindhome_config_entries::{ConfigEntries, ConfigEntriesError};

use crate::result::{AbortReason, FlowResult, FormField, SelectOption, StepId};
use crate::{CONF_ADDRESS, CONF_NAME, DOMAIN};

/// Device-support predicate the flow consults for every candidate.
///
/// Owned by the device driver; the flow only sees the boolean.
pub type SupportedFn = Arc<dyn Fn(&BluetoothServiceInfo) -> bool + Send + Sync + 'static>;

/// What started the flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowSource {
    /// A Bluetooth discovery notification
    Bluetooth,
    /// The user adding the integration manually
    User,
}

/// Programming or host errors.
///
/// These never reach the user as flow outcomes; user-facing terminal
/// conditions are [`FlowResult::Abort`] values.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("confirmation step reached without a stored discovery")]
    MissingDiscovery,

    #[error("submission is missing required field `{0}`")]
    MissingField(&'static str),

    #[error("selected address {0} is not in the candidate list")]
    UnknownAddress(String),

    #[error("no active flow with id {0}")]
    FlowNotFound(String),

    #[error("flow {0} has no step awaiting input")]
    NoPendingStep(String),

    #[error(transparent)]
    Entries(#[from] ConfigEntriesError),
}

/// Unique ids claimed by flows that are still in progress.
///
/// Shared across all sessions of one manager so a second discovery for an
/// address cannot spawn a parallel flow for the same device.
#[derive(Debug, Default)]
pub struct InProgressRegistry {
    /// unique_id -> flow_id of the claim holder
    claims: DashMap<String, String>,
}

impl InProgressRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a unique id for a flow.
    ///
    /// Returns false if a different flow already holds the claim, in which
    /// case the claim is left untouched. Claiming twice from the same flow
    /// is fine.
    pub fn claim(&self, unique_id: &str, flow_id: &str) -> bool {
        match self.claims.entry(unique_id.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(held) => held.get() == flow_id,
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(flow_id.to_string());
                true
            }
        }
    }

    /// Release a claim, but only if this flow holds it
    pub fn release(&self, unique_id: &str, flow_id: &str) {
        self.claims
            .remove_if(unique_id, |_, holder| holder == flow_id);
    }

    /// The flow currently holding a claim, if any
    pub fn holder(&self, unique_id: &str) -> Option<String> {
        self.claims.get(unique_id).map(|r| r.value().clone())
    }
}

/// One setup attempt for a Solarbeaker device
pub struct SolarbeakerConfigFlow {
    flow_id: String,
    source: FlowSource,

    entries: Arc<ConfigEntries>,
    discovery_source: Arc<dyn DiscoverySource>,
    supported: SupportedFn,
    in_progress: Arc<InProgressRegistry>,

    /// Discovery record stored by the bluetooth path
    discovery: Option<BluetoothServiceInfo>,
    /// address -> name, accumulated during manual selection
    discovered_devices: IndexMap<String, String>,
    /// Identifier claimed for duplicate prevention
    unique_id: Option<String>,
    /// Step currently awaiting input, if a form was rendered
    current_step: Option<StepId>,
    /// Placeholders for the frontend's flow-card title
    title_placeholders: HashMap<String, String>,
}

impl SolarbeakerConfigFlow {
    pub fn new(
        flow_id: impl Into<String>,
        source: FlowSource,
        entries: Arc<ConfigEntries>,
        discovery_source: Arc<dyn DiscoverySource>,
        supported: SupportedFn,
        in_progress: Arc<InProgressRegistry>,
    ) -> Self {
        Self {
            flow_id: flow_id.into(),
            source,
            entries,
            discovery_source,
            supported,
            in_progress,
            discovery: None,
            discovered_devices: IndexMap::new(),
            unique_id: None,
            current_step: None,
            title_placeholders: HashMap::new(),
        }
    }

    pub fn flow_id(&self) -> &str {
        &self.flow_id
    }

    pub fn source(&self) -> FlowSource {
        self.source
    }

    /// Step awaiting input, if any
    pub fn current_step(&self) -> Option<StepId> {
        self.current_step
    }

    /// Identifier claimed by this flow, if any
    pub fn unique_id(&self) -> Option<&str> {
        self.unique_id.as_deref()
    }

    pub fn title_placeholders(&self) -> &HashMap<String, String> {
        &self.title_placeholders
    }

    /// Resume the step currently awaiting input with a submission
    pub fn resume(
        &mut self,
        user_input: Option<&serde_json::Value>,
    ) -> Result<FlowResult, FlowError> {
        match self.current_step {
            Some(StepId::BluetoothConfirm) => self.handle_confirm(user_input),
            Some(StepId::User) => self.handle_user_select(user_input),
            None => Err(FlowError::NoPendingStep(self.flow_id.clone())),
        }
    }

    /// Handle a Bluetooth discovery notification.
    ///
    /// Claims the address, bails out on duplicates, checks device support,
    /// then stores the record and renders the confirmation form.
    pub fn handle_discovery(
        &mut self,
        discovery_info: BluetoothServiceInfo,
    ) -> Result<FlowResult, FlowError> {
        debug!(
            flow_id = %self.flow_id,
            address = %discovery_info.address,
            name = %discovery_info.name,
            "bluetooth discovery received"
        );

        if let Some(abort) = self.set_unique_id(&discovery_info.address, true) {
            return Ok(abort);
        }
        if let Some(abort) = self.abort_if_unique_id_configured() {
            return Ok(abort);
        }

        if !(self.supported)(&discovery_info) {
            debug!(flow_id = %self.flow_id, address = %discovery_info.address, "device type not supported");
            return Ok(FlowResult::Abort {
                reason: AbortReason::NotSupported,
            });
        }

        self.discovery = Some(discovery_info);
        self.handle_confirm(None)
    }

    /// Handle the confirmation step.
    ///
    /// Requires a stored discovery record; reaching this step without one is
    /// a driver bug, not a user-facing condition. First entry renders the
    /// confirm-only form; the confirming submission creates the entry.
    pub fn handle_confirm(
        &mut self,
        user_input: Option<&serde_json::Value>,
    ) -> Result<FlowResult, FlowError> {
        let discovery = self.discovery.as_ref().ok_or(FlowError::MissingDiscovery)?;

        if user_input.is_some() {
            return Ok(create_entry_result(&discovery.address, &discovery.name));
        }

        let title = format!("{} ({})", discovery.name, discovery.address);
        debug!(flow_id = %self.flow_id, title = %title, "showing confirmation form");

        self.title_placeholders
            .insert("name".to_string(), title.clone());
        self.current_step = Some(StepId::BluetoothConfirm);

        Ok(FlowResult::Form {
            step_id: StepId::BluetoothConfirm,
            data_schema: Vec::new(),
            description_placeholders: Some(HashMap::from([("name".to_string(), title)])),
        })
    }

    /// Handle the manual selection step.
    ///
    /// First entry enumerates visible devices, skipping configured and
    /// already-collected addresses, and renders the choice list; a
    /// submission creates the entry for the chosen address.
    pub fn handle_user_select(
        &mut self,
        user_input: Option<&serde_json::Value>,
    ) -> Result<FlowResult, FlowError> {
        if let Some(input) = user_input {
            let address = input
                .get(CONF_ADDRESS)
                .and_then(serde_json::Value::as_str)
                .ok_or(FlowError::MissingField(CONF_ADDRESS))?;

            let name = self
                .discovered_devices
                .get(address)
                .cloned()
                .ok_or_else(|| FlowError::UnknownAddress(address.to_string()))?;

            // The user picked this device on purpose; a claim held by a
            // discovery-triggered flow for the same address does not abort.
            self.set_unique_id(address, false);
            if let Some(abort) = self.abort_if_unique_id_configured() {
                return Ok(abort);
            }

            return Ok(create_entry_result(address, &name));
        }

        let configured = self.entries.unique_ids(DOMAIN);
        for info in self.discovery_source.discovered_service_info(false) {
            if configured.contains(&info.address)
                || self.discovered_devices.contains_key(&info.address)
            {
                continue;
            }
            if (self.supported)(&info) {
                debug!(flow_id = %self.flow_id, address = %info.address, name = %info.name, "eligible device found");
                self.discovered_devices.insert(info.address, info.name);
            }
        }

        if self.discovered_devices.is_empty() {
            debug!(flow_id = %self.flow_id, "no eligible devices visible");
            return Ok(FlowResult::Abort {
                reason: AbortReason::NoDevicesFound,
            });
        }

        self.current_step = Some(StepId::User);

        let options = self
            .discovered_devices
            .iter()
            .map(|(address, name)| SelectOption::new(address, format!("{name}: {address}")))
            .collect();

        Ok(FlowResult::Form {
            step_id: StepId::User,
            data_schema: vec![FormField::select(CONF_ADDRESS, options)],
            description_placeholders: None,
        })
    }

    /// Claim `address` as this flow's unique id.
    ///
    /// With `raise_on_progress`, a claim held by another active flow ends
    /// this one with an `already_in_progress` abort.
    fn set_unique_id(&mut self, address: &str, raise_on_progress: bool) -> Option<FlowResult> {
        let claimed = self.in_progress.claim(address, &self.flow_id);
        self.unique_id = Some(address.to_string());

        if raise_on_progress && !claimed {
            debug!(flow_id = %self.flow_id, address, "another flow already in progress for address");
            return Some(FlowResult::Abort {
                reason: AbortReason::AlreadyInProgress,
            });
        }
        None
    }

    /// End the flow if the claimed unique id already has a persisted entry
    fn abort_if_unique_id_configured(&self) -> Option<FlowResult> {
        let unique_id = self.unique_id.as_deref()?;
        if self.entries.get_by_unique_id(DOMAIN, unique_id).is_some() {
            debug!(flow_id = %self.flow_id, unique_id, "address already configured");
            return Some(FlowResult::Abort {
                reason: AbortReason::AlreadyConfigured,
            });
        }
        None
    }
}

/// Build the terminal create-entry result for a device
fn create_entry_result(address: &str, name: &str) -> FlowResult {
    let data = HashMap::from([
        (CONF_ADDRESS.to_string(), serde_json::json!(address)),
        (CONF_NAME.to_string(), serde_json::json!(name)),
    ]);

    FlowResult::CreateEntry {
        title: format!("{name} ({address})"),
        data,
    }
}
