//! Loading a split configuration from disk into the item tree

use autostate_config::{load_yaml, ConfigTree};
use autostate_core::{Cast, Value};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write_file(dir: &Path, name: &str, content: &str) {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

fn setup() -> TempDir {
    let dir = TempDir::new().unwrap();
    write_file(
        dir.path(),
        "autostate.yaml",
        r#"
location:
  latitude: 48.1
  longitude: 11.6
items:
  weather: !include weather.yaml
  living:
    blind:
      height:
        type: num
        value: 0
      automatic:
        type: bool
        as_plugin: active
        as_startup_delay: -1
        as_item_height: living.blind.height
        night: !include states/night.yaml
        day:
          name: Day
          as_set_height: value:0
"#,
    );
    write_file(
        dir.path(),
        "weather.yaml",
        "wind:\n  type: num\n  value: 3\nrain:\n  type: bool\n",
    );
    write_file(
        dir.path(),
        "states/night.yaml",
        r#"
name: Night
as_set_height: value:100
enter_evening:
  as_min_time: '22:00'
enter_morning:
  as_max_time: '06:00'
"#,
    );
    dir
}

#[test]
fn test_split_configuration() {
    let dir = setup();
    let document = load_yaml(dir.path(), "autostate.yaml").unwrap();
    let tree = ConfigTree::from_document(&document).unwrap();

    let objects: Vec<_> = tree.nodes_with_attr("as_plugin", "active").collect();
    assert_eq!(objects.len(), 1);
    let object = objects[0];
    assert_eq!(object.id().as_str(), "living.blind.automatic");

    let states: Vec<_> = tree.children(object.id()).map(|n| n.name()).collect();
    assert_eq!(states, vec!["Night", "Day"]);

    let night = tree.get("living.blind.automatic.night").unwrap();
    let sets: Vec<_> = tree
        .children(night.id())
        .map(|n| n.id().last_part().to_string())
        .collect();
    assert_eq!(sets, vec!["enter_evening", "enter_morning"]);
}

#[test]
fn test_item_seed_values() {
    let dir = setup();
    let document = load_yaml(dir.path(), "autostate.yaml").unwrap();
    let tree = ConfigTree::from_document(&document).unwrap();

    let wind = tree.get("weather.wind").unwrap();
    assert_eq!(wind.initial_value().unwrap(), Value::Num(3.0));
    let rain = tree.get("weather.rain").unwrap();
    assert_eq!(rain.item_type().unwrap(), Some(Cast::Bool));
    assert_eq!(rain.initial_value().unwrap(), Value::Bool(false));

    let object = tree.get("living.blind.automatic").unwrap();
    assert_eq!(object.attr_value("as_startup_delay"), Some(Value::Num(-1.0)));
    assert!(tree.location().is_some());
}
