//! Item ID type representing a dotted path in the host item tree

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for invalid item IDs
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ItemIdError {
    #[error("item id cannot be empty")]
    Empty,

    #[error("item id '{0}' contains an empty path segment")]
    EmptySegment(String),

    #[error("item id '{0}' contains invalid characters (must be alphanumeric, '_' or '-')")]
    InvalidChars(String),

    #[error("item '{relative}' can not be determined: parent item '{base}' has only {levels} levels")]
    TooManyLevels {
        relative: String,
        base: String,
        levels: usize,
    },
}

/// Represents an item ID (e.g., "living.blind.automatic")
///
/// Item IDs are dotted paths. Every segment must be non-empty and consist of
/// ASCII alphanumerics, underscores or hyphens.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ItemId(String);

impl ItemId {
    /// Create a new ItemId from its dotted form
    pub fn new(id: impl Into<String>) -> Result<Self, ItemIdError> {
        let id = id.into();
        if id.is_empty() {
            return Err(ItemIdError::Empty);
        }
        for segment in id.split('.') {
            if segment.is_empty() {
                return Err(ItemIdError::EmptySegment(id));
            }
            if !Self::is_valid_segment(segment) {
                return Err(ItemIdError::InvalidChars(id));
            }
        }
        Ok(Self(id))
    }

    /// Get the dotted form
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Iterate over the path segments
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }

    /// Number of path segments
    pub fn depth(&self) -> usize {
        self.segments().count()
    }

    /// Last path segment (e.g. "enter_night" for "blind.night.enter_night")
    pub fn last_part(&self) -> &str {
        self.0.rsplit('.').next().unwrap_or(&self.0)
    }

    /// Parent item, or `None` for a top level item
    pub fn parent(&self) -> Option<ItemId> {
        self.0
            .rsplit_once('.')
            .map(|(parent, _)| ItemId(parent.to_string()))
    }

    /// Child item with the given name
    pub fn child(&self, name: &str) -> Result<ItemId, ItemIdError> {
        ItemId::new(format!("{}.{}", self.0, name))
    }

    /// Resolve an item reference that may be relative to this item
    ///
    /// References without a leading `.` are absolute. One leading `.` means
    /// the reference is a child of this item, every further `.` removes one
    /// level before appending the rest:
    ///
    /// - `"other.item"` resolves to `other.item`
    /// - `".child"` on `my.object` resolves to `my.object.child`
    /// - `"..sibling"` on `my.object` resolves to `my.sibling`
    pub fn resolve(&self, reference: &str) -> Result<ItemId, ItemIdError> {
        if !reference.starts_with('.') {
            return reference.parse();
        }

        let parent_level = reference.chars().take_while(|c| *c == '.').count();
        let levels: Vec<&str> = self.segments().collect();
        let keep = levels.len() as isize - parent_level as isize + 1;
        if keep < 0 {
            return Err(ItemIdError::TooManyLevels {
                relative: reference.to_string(),
                base: self.0.clone(),
                levels: levels.len(),
            });
        }

        let mut parts: Vec<&str> = levels[..keep as usize].to_vec();
        let rest = &reference[parent_level..];
        if !rest.is_empty() {
            parts.push(rest);
        }
        ItemId::new(parts.join("."))
    }

    /// Check whether this id equals `ancestor` or lies below it
    pub fn is_within(&self, ancestor: &ItemId) -> bool {
        self.0 == ancestor.0
            || (self.0.starts_with(&ancestor.0) && self.0[ancestor.0.len()..].starts_with('.'))
    }

    fn is_valid_segment(s: &str) -> bool {
        s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    }
}

impl FromStr for ItemId {
    type Err = ItemIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ItemId {
    type Error = ItemIdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<ItemId> for String {
    fn from(id: ItemId) -> String {
        id.0
    }
}

impl AsRef<str> for ItemId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_item_id() {
        let id = ItemId::new("living.blind.automatic").unwrap();
        assert_eq!(id.depth(), 3);
        assert_eq!(id.last_part(), "automatic");
        assert_eq!(id.parent().unwrap().as_str(), "living.blind");
    }

    #[test]
    fn test_invalid_item_ids() {
        assert_eq!(ItemId::new("").unwrap_err(), ItemIdError::Empty);
        assert!(matches!(
            ItemId::new("a..b").unwrap_err(),
            ItemIdError::EmptySegment(_)
        ));
        assert!(matches!(
            ItemId::new("a.b c").unwrap_err(),
            ItemIdError::InvalidChars(_)
        ));
    }

    #[test]
    fn test_resolve_relative() {
        let base = ItemId::new("my.autostate.objectitem").unwrap();
        assert_eq!(
            base.resolve("not.prefixed.with.dots").unwrap().as_str(),
            "not.prefixed.with.dots"
        );
        assert_eq!(
            base.resolve(".onedot").unwrap().as_str(),
            "my.autostate.objectitem.onedot"
        );
        assert_eq!(
            base.resolve("..twodots").unwrap().as_str(),
            "my.autostate.twodots"
        );
        assert_eq!(
            base.resolve("...threedots").unwrap().as_str(),
            "my.threedots"
        );
        assert_eq!(
            base.resolve("...threedots.further.down").unwrap().as_str(),
            "my.threedots.further.down"
        );
    }

    #[test]
    fn test_resolve_too_many_levels() {
        let base = ItemId::new("a.b").unwrap();
        assert!(matches!(
            base.resolve(".....x").unwrap_err(),
            ItemIdError::TooManyLevels { levels: 2, .. }
        ));
    }

    #[test]
    fn test_is_within() {
        let parent = ItemId::new("blind").unwrap();
        assert!(ItemId::new("blind.day").unwrap().is_within(&parent));
        assert!(parent.is_within(&parent));
        assert!(!ItemId::new("blinds.day").unwrap().is_within(&parent));
    }

    #[test]
    fn test_serde_roundtrip() {
        let id = ItemId::new("blind.day").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"blind.day\"");
        let parsed: ItemId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }
}
