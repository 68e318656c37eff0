mod common;

use autostate_core::{TriggerInfo, Value};
use autostate_engine::ControllerManager;
use common::{id, Fixture};
use std::time::Duration;

const DOCUMENT: &str = r#"
items:
  hall:
    light:
      type: bool
      value: false
    presence:
      type: bool
      value: false
    manual:
      type: bool
      value: false
      as_manual_include: 'Visu:*'
    automatic:
      as_plugin: active
      as_startup_delay: 0
      as_item_light: ..light
      as_item_presence: ..presence
      occupied:
        name: Occupied
        as_set_light: true
        enter:
          as_value_presence: true
      vacant:
        name: Vacant
        as_set_light: false
  porch:
    automatic:
      as_plugin: active
      as_startup_delay: 0
      always:
        name: Always
  broken:
    as_plugin: active
  inactive:
    as_plugin: inactive
    idle:
      name: Idle
"#;

fn manager(fixture: &Fixture) -> ControllerManager {
    ControllerManager::new(fixture.tree.clone(), fixture.services())
}

#[test]
fn test_load_skips_broken_objects() {
    let fixture = Fixture::new(DOCUMENT, 12, 0);
    let manager = manager(&fixture);

    assert!(manager.is_empty());
    assert_eq!(manager.load(), 2);
    assert_eq!(manager.len(), 2);
    assert_eq!(manager.ids(), vec!["hall.automatic", "porch.automatic"]);
    assert!(manager.get("broken").is_none());
    assert!(manager.get("inactive").is_none());
}

#[tokio::test]
async fn test_start_evaluates_every_controller() {
    let fixture = Fixture::new(DOCUMENT, 12, 0);
    let manager = manager(&fixture);
    manager.load();

    manager.start().await;
    assert!(manager.is_running());

    assert_eq!(
        manager.cli_list(),
        "hall.automatic: Vacant\nporch.automatic: Always\n"
    );
    assert!(manager
        .cli_detail("porch.automatic")
        .unwrap()
        .starts_with("AutoState Item porch.automatic:\n"));
    assert!(manager.cli_detail("missing").is_none());

    manager.stop();
}

#[tokio::test]
async fn test_dispatch_routes_changes() {
    let mut fixture = Fixture::new(DOCUMENT, 12, 0);
    let manager = manager(&fixture);
    manager.load();
    manager.start().await;
    manager.stop();

    fixture
        .items
        .set(&id("hall.presence"), Value::Bool(true), TriggerInfo::new("Sensor"))
        .unwrap();
    let change = fixture.change("hall.automatic", 1, "Logic");
    manager.dispatch(&change);

    let hall = manager.get("hall.automatic").unwrap();
    assert_eq!(hall.laststate_name(), "Occupied");
    assert_eq!(fixture.value("hall.light"), Value::Bool(true));
}

#[tokio::test]
async fn test_item_changes_reach_controllers() {
    let fixture = Fixture::new(DOCUMENT, 12, 0);
    let manager = manager(&fixture);
    manager.load();
    manager.start().await;

    fixture
        .items
        .set(&id("hall.presence"), Value::Bool(true), TriggerInfo::new("Sensor"))
        .unwrap();
    fixture
        .items
        .set(&id("hall.automatic"), Value::Num(1.0), TriggerInfo::new("Logic"))
        .unwrap();

    let hall = manager.get("hall.automatic").unwrap();
    for _ in 0..50 {
        if hall.laststate_name() == "Occupied" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(hall.laststate_name(), "Occupied");

    manager.stop();
    for _ in 0..50 {
        if !manager.is_running() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(!manager.is_running());
}

#[test]
fn test_manual_item_update_eval() {
    let fixture = Fixture::new(DOCUMENT, 12, 0);
    let manager = manager(&fixture);

    let by_visu = TriggerInfo::new("Visu").with_source("panel");
    assert_eq!(
        manager.manual_item_update_eval("hall.manual", &by_visu).unwrap(),
        Value::Bool(true)
    );

    let by_logic = TriggerInfo::new("Logic").with_source("rule");
    assert_eq!(
        manager.manual_item_update_eval("hall.manual", &by_logic).unwrap(),
        Value::Bool(false)
    );

    assert!(manager
        .manual_item_update_eval("hall.missing", &by_visu)
        .is_err());
}
