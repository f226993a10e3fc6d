//! Stage resolution from object keys.
//!
//! The first `/`-separated segment of the triggering key selects the stage
//! alias. The mapping is fail-open: a key whose first segment is not mapped
//! (including a key with no separator at all) resolves to the default stage
//! rather than being rejected. With the default mapping that default is
//! production, so an artifact uploaded under an unexpected prefix is
//! promoted to `PROD`.

use std::collections::BTreeMap;

use crate::config::StageConfig;
use crate::types::StageName;

/// Maps object keys to stage aliases.
#[derive(Debug, Clone)]
pub struct StageResolver {
    prefixes: BTreeMap<String, StageName>,
    default: StageName,
}

impl StageResolver {
    /// Build a resolver from configuration.
    #[must_use]
    pub fn new(config: &StageConfig) -> Self {
        Self {
            prefixes: config
                .prefixes
                .iter()
                .map(|(prefix, stage)| (prefix.clone(), StageName::new(stage)))
                .collect(),
            default: StageName::new(&config.default),
        }
    }

    /// Resolve the stage for an object key. Never fails.
    #[must_use]
    pub fn resolve(&self, key: &str) -> StageName {
        let first = key.split('/').next().unwrap_or_default();
        self.prefixes
            .get(first)
            .unwrap_or(&self.default)
            .clone()
    }

    /// Stage used for unmapped keys.
    #[must_use]
    pub const fn default_stage(&self) -> &StageName {
        &self.default
    }
}

impl Default for StageResolver {
    fn default() -> Self {
        Self::new(&StageConfig::default())
    }
}

/// Resolve a key with the default mapping (`develop` → `DEV`, else `PROD`).
#[must_use]
pub fn resolve_stage(key: &str) -> StageName {
    StageResolver::default().resolve(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn develop_prefix_is_development() {
        assert_eq!(resolve_stage("develop/foo.zip").as_str(), "DEV");
    }

    #[test]
    fn prod_prefix_is_production() {
        assert_eq!(resolve_stage("prod/foo.zip").as_str(), "PROD");
    }

    #[test]
    fn unmapped_prefix_fails_open_to_production() {
        assert_eq!(resolve_stage("anything-else/x.zip").as_str(), "PROD");
        assert_eq!(resolve_stage("foo.zip").as_str(), "PROD");
        assert_eq!(resolve_stage("").as_str(), "PROD");
        assert_eq!(resolve_stage("/develop/foo.zip").as_str(), "PROD");
    }

    #[test]
    fn matching_is_case_sensitive() {
        assert_eq!(resolve_stage("Develop/foo.zip").as_str(), "PROD");
        assert_eq!(resolve_stage("DEVELOP/foo.zip").as_str(), "PROD");
    }

    #[test]
    fn bare_prefix_matches() {
        assert_eq!(resolve_stage("develop").as_str(), "DEV");
    }

    #[test]
    fn custom_mapping() {
        let config = StageConfig {
            prefixes: BTreeMap::from([
                ("develop".to_owned(), "DEV".to_owned()),
                ("staging".to_owned(), "STAGE".to_owned()),
            ]),
            default: "LIVE".to_owned(),
        };
        let resolver = StageResolver::new(&config);

        assert_eq!(resolver.resolve("staging/app.zip").as_str(), "STAGE");
        assert_eq!(resolver.resolve("release/app.zip").as_str(), "LIVE");
        assert_eq!(resolver.default_stage().as_str(), "LIVE");
    }
}
