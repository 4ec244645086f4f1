//! Derived-variable configuration.
//!
//! JSON shape:
//! {
//!   "definitions": [
//!     ["Muon_absEta", "abs(Muon_eta)"],
//!     ["nGoodMuon", "sum(Muon_pt > 20)"]
//!   ]
//! }
//!
//! Entries are applied in order, so later expressions may use earlier names.

use crate::error::Result;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct VariableConfig {
    #[serde(default)]
    pub definitions: Vec<(String, String)>,
}

impl VariableConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        Self::from_json(&fs::read_to_string(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn pairs_keep_order() {
        let cfg = VariableConfig::from_json(
            r#"{"definitions": [["a", "Muon_pt * 2"], ["b", "a[0] + 1"]]}"#,
        )
        .unwrap();
        assert_eq!(
            cfg.definitions,
            vec![
                ("a".to_string(), "Muon_pt * 2".to_string()),
                ("b".to_string(), "a[0] + 1".to_string()),
            ]
        );
    }

    #[test]
    fn missing_list_is_empty_and_bad_shape_fails() {
        assert_eq!(VariableConfig::from_json("{}").unwrap(), VariableConfig::default());
        assert!(VariableConfig::from_json(r#"{"definitions": [["only-name"]]}"#).is_err());
    }
}
