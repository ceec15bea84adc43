//! Persistence Tests
//!
//! Session round trips through the JSON file gateway: snapshot envelopes,
//! backups, legacy files and failure isolation between stores.

use std::fs;
use std::sync::Arc;
use std::thread;

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tempfile::tempdir;

use traitforge::persistence::backups;
use traitforge::persistence::envelope::CURRENT_SCHEMA_VERSION;
use traitforge::{EngineSettings, JsonFileGateway, PersistenceGateway, Session, StoreKind};

fn open(root: &std::path::Path) -> Session<JsonFileGateway> {
    Session::load(JsonFileGateway::new(root, 3), EngineSettings::default())
}

fn populate(session: &mut Session<JsonFileGateway>) {
    session.apply(|e| e.everything_changed());
    session.apply(|e| e.register_layer("bg", vec!["blue".into(), "red".into()]));
    session.apply(|e| {
        e.register_layer("eyes", vec!["open".into(), "closed".into()])
    });
    session
        .apply(|e| e.add_incompatibility("bg", "red", "eyes", "closed"))
        .unwrap();
    session.apply(|e| e.add_pipeline("mono", "Monochrome"));
    session.flush();
}

#[test]
fn test_session_round_trip() {
    let temp = tempdir().unwrap();
    let mut session = open(temp.path());
    populate(&mut session);
    let (engine, _) = session.into_parts();

    let reloaded = open(temp.path());
    assert_eq!(reloaded.engine().state(), engine.state());
    assert_eq!(reloaded.engine().set("set1").unwrap().possible_combinations, 3);
}

#[test]
fn test_every_store_is_an_envelope() {
    let temp = tempdir().unwrap();
    let mut session = open(temp.path());
    populate(&mut session);

    for store in StoreKind::ALL {
        let path = session.gateway().store_path(store);
        let raw: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["schemaVersion"], json!(CURRENT_SCHEMA_VERSION), "{}", store.name());
        assert!(raw["checksum"].as_str().unwrap().len() == 64);
        assert!(raw.get("data").is_some());
    }
}

#[test]
fn test_overwrites_keep_bounded_backups() {
    let temp = tempdir().unwrap();
    let mut session = open(temp.path());
    populate(&mut session);

    for _ in 0..5 {
        session.apply(|e| e.randomize_layer("bg"));
        session.flush();
        std::thread::sleep(std::time::Duration::from_millis(5));
    }

    let backups_dir = session.gateway().backups_dir();
    let kept = backups::list_backups(&backups_dir, StoreKind::RarityConfig.name()).unwrap();
    assert_eq!(kept.len(), 3);
}

#[test]
fn test_legacy_store_loads_and_is_upgraded_on_save() {
    let temp = tempdir().unwrap();
    let legacy = json!({
        "pipelines": [
            {"id": "mono", "name": "Monochrome", "weight": 50.0},
            {"id": "sepia", "name": "Sepia", "weight": 50.0}
        ]
    });
    fs::write(
        temp.path().join("filters.json"),
        serde_json::to_string_pretty(&legacy).unwrap(),
    )
    .unwrap();

    let mut session = open(temp.path());
    assert_eq!(session.engine().state().filters.pipelines.len(), 2);

    session.apply(|e| e.equalize_pipelines());
    session.flush();

    let raw: Value = serde_json::from_str(
        &fs::read_to_string(temp.path().join("filters.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(raw["schemaVersion"], json!(CURRENT_SCHEMA_VERSION));
}

#[test]
fn test_corrupt_store_falls_back_to_defaults_alone() {
    let temp = tempdir().unwrap();
    let mut session = open(temp.path());
    populate(&mut session);
    drop(session);

    fs::write(temp.path().join("incompatibilities.json"), "{ not json").unwrap();

    let reloaded = open(temp.path());
    let state = reloaded.engine().state();
    assert!(state.incompatibilities.is_empty("set1"));
    assert!(state.rarity.layer("bg").is_some());
    assert_eq!(state.filters.pipelines.len(), 1);
}

#[test]
fn test_typed_gateway_access() {
    let temp = tempdir().unwrap();
    let mut session = open(temp.path());
    populate(&mut session);

    let gateway = JsonFileGateway::new(temp.path(), 3);
    let layout = gateway.load_layer_order_state().unwrap().unwrap();
    assert_eq!(layout.active_set_id.as_deref(), Some("set1"));

    let forced = gateway.load_forced_combination_state().unwrap().unwrap();
    assert!(forced.is_empty("set1"));
}

#[test]
fn test_lost_layer_order_keeps_set_weights() {
    let temp = tempdir().unwrap();
    let mut session = open(temp.path());
    populate(&mut session);
    session
        .apply(|e| e.update_trait_weight("bg", "blue", 90.0))
        .unwrap();
    session.flush();
    let (engine, gateway) = session.into_parts();

    fs::write(gateway.store_path(StoreKind::LayerOrder), "\"corrupt\"").unwrap();

    let reloaded = open(temp.path());
    let state = reloaded.engine().state();
    assert_eq!(state.rarity, engine.state().rarity);
    assert_eq!(
        state.rarity.trait_set("bg", "blue", "set1").map(|c| c.value),
        Some(90.0)
    );
    assert_eq!(reloaded.engine().active_set_id(), Some("set1"));
    assert_eq!(reloaded.engine().set("set1").unwrap().layers, vec!["bg", "eyes"]);
}

#[test]
fn test_concurrent_saves_of_one_store_all_succeed() {
    let temp = tempdir().unwrap();
    let gateway = Arc::new(JsonFileGateway::new(temp.path(), 3));

    let workers: Vec<_> = (0..4)
        .map(|worker| {
            let gateway = Arc::clone(&gateway);
            thread::spawn(move || {
                (0..100)
                    .map(|round| {
                        let data = json!({
                            "pipelines": [{"id": "mono", "name": "Monochrome", "weight": 100.0}],
                            "writer": worker,
                            "round": round
                        });
                        gateway.save_raw(StoreKind::Filters, &data)
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    for worker in workers {
        for result in worker.join().unwrap() {
            assert!(result.is_ok(), "{:?}", result);
        }
    }

    assert!(gateway.load_raw(StoreKind::Filters).unwrap().is_some());
    let kept = backups::list_backups(&gateway.backups_dir(), StoreKind::Filters.name()).unwrap();
    assert!(kept.len() <= 3, "{} backups kept", kept.len());
}
