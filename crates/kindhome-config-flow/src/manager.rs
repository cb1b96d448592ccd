//! Flow manager
//!
//! Owns the active flow sessions and drives them on behalf of the host:
//! issues flow ids, resumes the right step on each submission, persists the
//! entry when a flow finishes, and releases the unique-id claim either way.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info};
use ulid::Ulid;

use kindhome_ble::SolarbeakerDevice;
use kindhome_bluetooth::{BluetoothServiceInfo, DiscoverySource};
use kindhome_config_entries::{ConfigEntries, ConfigEntry, ConfigEntrySource};

use crate::flow::{FlowError, FlowSource, InProgressRegistry, SolarbeakerConfigFlow, SupportedFn};
use crate::result::{FlowResult, StepId};
use crate::DOMAIN;

/// Summary of one active flow
#[derive(Debug, Clone, Serialize)]
pub struct FlowInfo {
    pub flow_id: String,
    pub source: FlowSource,
    pub step_id: Option<StepId>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub title_placeholders: HashMap<String, String>,
}

/// Host-facing interface for driving configuration flows
#[async_trait]
pub trait ConfigFlowHandler: Send + Sync {
    /// Start a flow from a Bluetooth discovery notification
    async fn start_bluetooth_flow(
        &self,
        discovery_info: BluetoothServiceInfo,
    ) -> Result<FlowResult, FlowError>;

    /// Start a flow from the user adding the integration manually
    async fn start_user_flow(&self) -> Result<FlowResult, FlowError>;

    /// Resume a suspended flow with a form submission
    async fn progress_flow(
        &self,
        flow_id: &str,
        user_input: Option<serde_json::Value>,
    ) -> Result<FlowResult, FlowError>;

    /// Drop an abandoned flow and release its unique-id claim
    async fn abort_flow(&self, flow_id: &str) -> Result<(), FlowError>;

    /// Summaries of all active flows
    async fn list_flows(&self) -> Vec<FlowInfo>;
}

/// Drives Solarbeaker setup flows for the host
pub struct FlowManager {
    entries: Arc<ConfigEntries>,
    discovery_source: Arc<dyn DiscoverySource>,
    supported: SupportedFn,

    /// Active flows: flow_id -> session
    flows: RwLock<HashMap<String, SolarbeakerConfigFlow>>,
    /// Unique ids claimed by active flows
    in_progress: Arc<InProgressRegistry>,
}

impl FlowManager {
    /// Create a manager using the Solarbeaker support predicate
    pub fn new(entries: Arc<ConfigEntries>, discovery_source: Arc<dyn DiscoverySource>) -> Self {
        Self::with_supported(
            entries,
            discovery_source,
            Arc::new(|info: &BluetoothServiceInfo| SolarbeakerDevice::supported(info)),
        )
    }

    /// Create a manager with a custom support predicate
    pub fn with_supported(
        entries: Arc<ConfigEntries>,
        discovery_source: Arc<dyn DiscoverySource>,
        supported: SupportedFn,
    ) -> Self {
        Self {
            entries,
            discovery_source,
            supported,
            flows: RwLock::new(HashMap::new()),
            in_progress: Arc::new(InProgressRegistry::new()),
        }
    }

    fn new_flow(&self, source: FlowSource) -> SolarbeakerConfigFlow {
        let flow_id = Ulid::new().to_string().to_lowercase();
        SolarbeakerConfigFlow::new(
            flow_id,
            source,
            self.entries.clone(),
            self.discovery_source.clone(),
            self.supported.clone(),
            self.in_progress.clone(),
        )
    }

    /// Store the flow if it is awaiting input, finish it otherwise
    async fn commit(
        &self,
        flow: SolarbeakerConfigFlow,
        result: FlowResult,
    ) -> Result<FlowResult, FlowError> {
        if result.is_terminal() {
            self.finish(&flow, &result).await?;
        } else {
            self.flows
                .write()
                .await
                .insert(flow.flow_id().to_string(), flow);
        }
        Ok(result)
    }

    /// Release the flow's claim and persist its entry if it created one
    async fn finish(
        &self,
        flow: &SolarbeakerConfigFlow,
        result: &FlowResult,
    ) -> Result<(), FlowError> {
        if let Some(unique_id) = flow.unique_id() {
            self.in_progress.release(unique_id, flow.flow_id());
        }

        match result {
            FlowResult::CreateEntry { title, data } => {
                let source = match flow.source() {
                    FlowSource::Bluetooth => ConfigEntrySource::Bluetooth,
                    FlowSource::User => ConfigEntrySource::User,
                };

                let mut entry = ConfigEntry::new(DOMAIN, title.clone())
                    .with_data(data.clone())
                    .with_source(source);
                if let Some(unique_id) = flow.unique_id() {
                    entry = entry.with_unique_id(unique_id);
                }

                let entry = self.entries.add(entry).await?;
                info!(
                    flow_id = %flow.flow_id(),
                    entry_id = %entry.entry_id,
                    title = %entry.title,
                    "config entry created"
                );
            }
            FlowResult::Abort { reason } => {
                info!(flow_id = %flow.flow_id(), reason = ?reason, "flow aborted");
            }
            FlowResult::Form { .. } => {}
        }

        Ok(())
    }
}

#[async_trait]
impl ConfigFlowHandler for FlowManager {
    async fn start_bluetooth_flow(
        &self,
        discovery_info: BluetoothServiceInfo,
    ) -> Result<FlowResult, FlowError> {
        let mut flow = self.new_flow(FlowSource::Bluetooth);
        info!(
            flow_id = %flow.flow_id(),
            address = %discovery_info.address,
            "starting discovery-triggered flow"
        );

        let result = flow.handle_discovery(discovery_info)?;
        self.commit(flow, result).await
    }

    async fn start_user_flow(&self) -> Result<FlowResult, FlowError> {
        let mut flow = self.new_flow(FlowSource::User);
        info!(flow_id = %flow.flow_id(), "starting user-initiated flow");

        let result = flow.handle_user_select(None)?;
        self.commit(flow, result).await
    }

    async fn progress_flow(
        &self,
        flow_id: &str,
        user_input: Option<serde_json::Value>,
    ) -> Result<FlowResult, FlowError> {
        let mut flows = self.flows.write().await;
        let flow = flows
            .get_mut(flow_id)
            .ok_or_else(|| FlowError::FlowNotFound(flow_id.to_string()))?;

        debug!(flow_id, step = ?flow.current_step(), "resuming flow");
        let result = flow.resume(user_input.as_ref())?;

        if result.is_terminal() {
            if let Some(flow) = flows.remove(flow_id) {
                self.finish(&flow, &result).await?;
            }
        }

        Ok(result)
    }

    async fn abort_flow(&self, flow_id: &str) -> Result<(), FlowError> {
        let flow = self
            .flows
            .write()
            .await
            .remove(flow_id)
            .ok_or_else(|| FlowError::FlowNotFound(flow_id.to_string()))?;

        if let Some(unique_id) = flow.unique_id() {
            self.in_progress.release(unique_id, flow.flow_id());
        }

        debug!(flow_id, "flow abandoned");
        Ok(())
    }

    async fn list_flows(&self) -> Vec<FlowInfo> {
        let flows = self.flows.read().await;
        flows
            .values()
            .map(|flow| FlowInfo {
                flow_id: flow.flow_id().to_string(),
                source: flow.source(),
                step_id: flow.current_step(),
                title_placeholders: flow.title_placeholders().clone(),
            })
            .collect()
    }
}
