//! Setup flow for the Kindhome Solarbeaker
//!
//! This crate implements the stepwise setup wizard that turns a discovered
//! (or manually picked) Solarbeaker into a persisted config entry. Two entry
//! points exist:
//!
//! - A Bluetooth discovery notification starts a flow that asks the user to
//!   confirm the found device.
//! - Adding the integration manually starts a flow that lists all visible,
//!   unconfigured, supported devices and asks the user to pick one.
//!
//! Either way the flow ends by writing a `{address, name}` entry titled
//! `"{name} ({address})"`, or by aborting. An address with an existing
//! entry never produces a second one.
//!
//! # Key Types
//!
//! - [`SolarbeakerConfigFlow`] - one setup attempt, driven step by step
//! - [`FlowManager`] - tracks active flows and persists finished ones
//! - [`ConfigFlowHandler`] - the trait the host drives flows through
//! - [`FlowResult`] - outcome of a step: form, entry, or abort

pub mod flow;
pub mod manager;
pub mod result;

/// Integration domain
pub const DOMAIN: &str = "kindhome_solarbeaker";

/// Form field carrying the device address
pub const CONF_ADDRESS: &str = "address";

/// Entry data key carrying the device name
pub const CONF_NAME: &str = "name";

// Re-export main types
pub use flow::{
    FlowError, FlowSource, InProgressRegistry, SolarbeakerConfigFlow, SupportedFn,
};

pub use manager::{ConfigFlowHandler, FlowInfo, FlowManager};

pub use result::{AbortReason, FlowResult, FormField, SelectOption, StepId};
