//! Configuration for autostate
//!
//! Two layers:
//!
//! - [`YamlLoader`] reads the YAML document, resolving `!include path` and
//!   `!env_var NAME [default]` tags.
//! - [`ConfigTree`] turns the `items:` section into the read-only tree of
//!   [`ConfigNode`]s the engine builds its controllers from.
//!
//! ```ignore
//! use autostate_config::{load_yaml, ConfigTree};
//!
//! let document = load_yaml("/etc/autostate", "items.yaml")?;
//! let tree = ConfigTree::from_document(&document)?;
//! for object in tree.nodes_with_attr("as_plugin", "active") {
//!     println!("{}", object.id());
//! }
//! ```

mod error;
mod loader;
mod tree;

pub use error::{ConfigError, ConfigResult};
pub use loader::{load_yaml, load_yaml_string, YamlLoader};
pub use tree::{yaml_to_value, ConfigNode, ConfigTree, Location};

pub use serde_yaml::Value as YamlValue;
