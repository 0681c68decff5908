//! Drone selection for fan-out dispatches.

use serde::{Deserialize, Serialize};

/// Rule choosing which drones participate in a dispatch.
///
/// Resolution precedence (see the hub dispatcher):
/// - `All` selects every registered drone.
/// - `Named` selects the drones whose ids match; unmatched names are
///   silently dropped.
/// - `Random` selects exactly one registered drone uniformly at random
///   (or none when the registry is empty).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Selector {
    /// Every registered drone.
    All,

    /// An explicit list of drone ids.
    Named { names: Vec<String> },

    /// One drone chosen uniformly at random.
    #[default]
    Random,
}

impl Selector {
    /// Convenience constructor used as a serde default by operations that
    /// fan out to the whole fleet when no selector is given.
    pub fn all() -> Self {
        Selector::All
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_tagging() {
        let json = serde_json::to_value(&Selector::All).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "all"}));

        let sel = Selector::Named {
            names: vec!["3fa91c07".into()],
        };
        let json = serde_json::to_value(&sel).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"kind": "named", "names": ["3fa91c07"]})
        );
    }

    #[test]
    fn test_selector_default_is_random() {
        assert_eq!(Selector::default(), Selector::Random);
    }
}
