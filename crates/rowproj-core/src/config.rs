//! Projector configuration that downstream crates can serialize/deserialize.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectorConfig {
    /// Merge adjacent raw copies into one. Turning this off keeps one copy per
    /// field, which is handy when bisecting a suspected layout bug.
    pub coalesce: bool,

    /// Check both rows against the compiled schema layouts before executing.
    pub verify_rows: bool,
}

impl Default for ProjectorConfig {
    fn default() -> Self {
        Self {
            coalesce: true,
            verify_rows: true,
        }
    }
}

impl ProjectorConfig {
    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `ROWPROJ_COALESCE`: `true`/`false` (also `1`/`0`)
    /// - `ROWPROJ_VERIFY_ROWS`: `true`/`false` (also `1`/`0`)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reading through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();

        if let Some(v) = lookup("ROWPROJ_COALESCE").as_deref().and_then(parse_bool) {
            cfg.coalesce = v;
        }

        if let Some(v) = lookup("ROWPROJ_VERIFY_ROWS").as_deref().and_then(parse_bool) {
            cfg.verify_rows = v;
        }

        cfg
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_overrides_defaults() {
        let cfg = ProjectorConfig::from_lookup(|key| match key {
            "ROWPROJ_COALESCE" => Some("0".into()),
            _ => None,
        });
        assert!(!cfg.coalesce);
        assert!(cfg.verify_rows);
    }

    #[test]
    fn test_unparseable_values_are_ignored() {
        let cfg = ProjectorConfig::from_lookup(|key| match key {
            "ROWPROJ_VERIFY_ROWS" => Some("maybe".into()),
            _ => None,
        });
        assert_eq!(cfg, ProjectorConfig::default());
    }

    #[test]
    fn test_partial_document_uses_defaults() {
        let cfg: ProjectorConfig = serde_json::from_str(r#"{"coalesce": false}"#).unwrap();
        assert!(!cfg.coalesce);
        assert!(cfg.verify_rows);
    }
}
