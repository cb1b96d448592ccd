//! End-to-end setup scenarios
//!
//! Drives flows the way the host does — through the [`ConfigFlowHandler`]
//! trait only — and checks the results the frontend would see, including
//! their serialized shape.

use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;

use kindhome_ble::SOLARBEAKER_SERVICE_UUID;
use kindhome_bluetooth::{BluetoothServiceInfo, DiscoveryCache};
use kindhome_config_entries::{ConfigEntries, ConfigEntry, Storage};
use kindhome_config_flow::{
    AbortReason, ConfigFlowHandler, FlowManager, FlowResult, StepId, DOMAIN,
};

fn beaker(name: &str, address: &str) -> BluetoothServiceInfo {
    BluetoothServiceInfo::new(name, address, -60)
        .with_service_uuids(vec![SOLARBEAKER_SERVICE_UUID.to_string()])
}

struct Harness {
    _dir: TempDir,
    entries: Arc<ConfigEntries>,
    cache: Arc<DiscoveryCache>,
    manager: FlowManager,
}

fn harness() -> Harness {
    let dir = TempDir::new().unwrap();
    let entries = Arc::new(ConfigEntries::new(Arc::new(Storage::new(dir.path()))));
    let cache = Arc::new(DiscoveryCache::new());
    let manager = FlowManager::new(entries.clone(), cache.clone());
    Harness {
        _dir: dir,
        entries,
        cache,
        manager,
    }
}

async fn only_flow_id(manager: &FlowManager) -> String {
    let flows = manager.list_flows().await;
    assert_eq!(flows.len(), 1);
    flows[0].flow_id.clone()
}

#[tokio::test]
async fn discovered_beaker_is_confirmed_and_configured() {
    let h = harness();

    let result = h
        .manager
        .start_bluetooth_flow(beaker("Beaker1", "AA:BB"))
        .await
        .unwrap();

    // The confirmation form names the device in its placeholders and has no
    // input fields
    let rendered = serde_json::to_value(&result).unwrap();
    assert_eq!(rendered["type"], "form");
    assert_eq!(rendered["step_id"], "bluetooth_confirm");
    assert_eq!(rendered["description_placeholders"]["name"], "Beaker1 (AA:BB)");
    assert!(rendered.get("data_schema").is_none());

    let flow_id = only_flow_id(&h.manager).await;
    let result = h
        .manager
        .progress_flow(&flow_id, Some(json!({})))
        .await
        .unwrap();

    match result {
        FlowResult::CreateEntry { title, data } => {
            assert_eq!(title, "Beaker1 (AA:BB)");
            assert_eq!(data["address"], json!("AA:BB"));
            assert_eq!(data["name"], json!("Beaker1"));
        }
        other => panic!("expected create_entry, got {other:?}"),
    }

    let entry = h.entries.get_by_unique_id(DOMAIN, "AA:BB").unwrap();
    assert_eq!(entry.title, "Beaker1 (AA:BB)");
}

#[tokio::test]
async fn discovery_for_configured_address_never_shows_a_form() {
    let h = harness();
    h.entries
        .add(ConfigEntry::new(DOMAIN, "Beaker1 (AA:BB)").with_unique_id("AA:BB"))
        .await
        .unwrap();

    let result = h
        .manager
        .start_bluetooth_flow(beaker("Beaker1", "AA:BB"))
        .await
        .unwrap();

    assert_eq!(
        result,
        FlowResult::Abort {
            reason: AbortReason::AlreadyConfigured
        }
    );
    assert!(h.manager.list_flows().await.is_empty());
    assert_eq!(h.entries.len(), 1);
}

#[tokio::test]
async fn unsupported_discovery_aborts_not_supported() {
    let h = harness();

    let result = h
        .manager
        .start_bluetooth_flow(BluetoothServiceInfo::new("Mug", "AA:BB", -60))
        .await
        .unwrap();

    let rendered = serde_json::to_value(&result).unwrap();
    assert_eq!(rendered["type"], "abort");
    assert_eq!(rendered["reason"], "not_supported");
}

#[tokio::test]
async fn manual_selection_lists_only_the_unconfigured_device() {
    let h = harness();
    h.entries
        .add(ConfigEntry::new(DOMAIN, "Beaker1 (AA:BB)").with_unique_id("AA:BB"))
        .await
        .unwrap();

    h.cache.record(beaker("Beaker1", "AA:BB"));
    h.cache.record(beaker("Beaker2", "CC:DD"));

    let result = h.manager.start_user_flow().await.unwrap();

    match &result {
        FlowResult::Form {
            step_id,
            data_schema,
            ..
        } => {
            assert_eq!(*step_id, StepId::User);
            let options = &data_schema[0].options;
            assert_eq!(options.len(), 1);
            assert_eq!(options[0].value, "CC:DD");
            assert_eq!(options[0].label, "Beaker2: CC:DD");
        }
        other => panic!("expected form, got {other:?}"),
    }

    let flow_id = only_flow_id(&h.manager).await;
    let result = h
        .manager
        .progress_flow(&flow_id, Some(json!({ "address": "CC:DD" })))
        .await
        .unwrap();

    assert!(matches!(result, FlowResult::CreateEntry { .. }));
    assert_eq!(h.entries.len(), 2);
    assert!(h.entries.get_by_unique_id(DOMAIN, "CC:DD").is_some());
}

#[tokio::test]
async fn manual_selection_with_nothing_eligible_aborts() {
    let h = harness();
    h.entries
        .add(ConfigEntry::new(DOMAIN, "Beaker1 (AA:BB)").with_unique_id("AA:BB"))
        .await
        .unwrap();

    // The only visible devices: one configured, one not a Solarbeaker
    h.cache.record(beaker("Beaker1", "AA:BB"));
    h.cache
        .record(BluetoothServiceInfo::new("Mug", "EE:FF", -60));

    let result = h.manager.start_user_flow().await.unwrap();
    assert_eq!(
        result,
        FlowResult::Abort {
            reason: AbortReason::NoDevicesFound
        }
    );
    assert_eq!(h.entries.len(), 1);
}

#[tokio::test]
async fn user_can_complete_a_device_bluetooth_already_started() {
    let h = harness();
    h.cache.record(beaker("Beaker1", "AA:BB"));

    // Discovery puts a flow on the confirmation form
    let result = h
        .manager
        .start_bluetooth_flow(beaker("Beaker1", "AA:BB"))
        .await
        .unwrap();
    assert!(!result.is_terminal());

    // A second discovery for the same address is refused...
    let result = h
        .manager
        .start_bluetooth_flow(beaker("Beaker1", "AA:BB"))
        .await
        .unwrap();
    assert_eq!(
        result,
        FlowResult::Abort {
            reason: AbortReason::AlreadyInProgress
        }
    );

    // ...but the user may still finish the same device by hand
    let result = h.manager.start_user_flow().await.unwrap();
    assert!(!result.is_terminal());

    let user_flow_id = h
        .manager
        .list_flows()
        .await
        .into_iter()
        .find(|f| f.step_id == Some(StepId::User))
        .unwrap()
        .flow_id;

    let result = h
        .manager
        .progress_flow(&user_flow_id, Some(json!({ "address": "AA:BB" })))
        .await
        .unwrap();
    assert!(matches!(result, FlowResult::CreateEntry { .. }));
    assert!(h.entries.get_by_unique_id(DOMAIN, "AA:BB").is_some());
}

#[tokio::test]
async fn entries_created_by_flows_survive_a_restart() {
    let dir = TempDir::new().unwrap();
    let storage = Arc::new(Storage::new(dir.path()));

    {
        let entries = Arc::new(ConfigEntries::new(storage.clone()));
        let cache = Arc::new(DiscoveryCache::new());
        let manager = FlowManager::new(entries.clone(), cache.clone());

        manager
            .start_bluetooth_flow(beaker("Beaker1", "AA:BB"))
            .await
            .unwrap();
        let flow_id = only_flow_id(&manager).await;
        manager
            .progress_flow(&flow_id, Some(json!({})))
            .await
            .unwrap();
    }

    let entries = Arc::new(ConfigEntries::new(storage));
    entries.load().await.unwrap();

    let entry = entries.get_by_unique_id(DOMAIN, "AA:BB").unwrap();
    assert_eq!(entry.title, "Beaker1 (AA:BB)");
    assert_eq!(entry.data["name"], json!("Beaker1"));
}
