//! Configuration for liftoff.

use std::collections::BTreeMap;
use std::path::PathBuf;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ConfigError;

/// Environment variable prefix for configuration overrides.
pub const ENV_PREFIX: &str = "LIFTOFF_";

/// Top-level configuration for a deployer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Function platform settings.
    #[serde(default)]
    pub platform: PlatformConfig,

    /// Manifest discovery and defaults.
    #[serde(default)]
    pub manifest: ManifestConfig,

    /// Key-prefix to stage alias mapping.
    #[serde(default)]
    pub stages: StageConfig,

    /// Object storage client settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Local scratch storage.
    #[serde(default)]
    pub scratch: ScratchConfig,

    /// Behaviour of a single host invocation.
    #[serde(default)]
    pub invocation: InvocationConfig,
}

impl DeployConfig {
    /// Load configuration from the default sources.
    ///
    /// Configuration is loaded in the following order (later sources override earlier):
    /// 1. Default values
    /// 2. `liftoff.toml` in the current directory (if present)
    /// 3. Environment variables with `LIFTOFF_` prefix
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_file("liftoff.toml")
    }

    /// Load configuration from a specific TOML file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| ConfigError(e.to_string()))
    }
}

/// Function platform configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Region functions are deployed to.
    #[serde(default = "default_region")]
    pub region: String,

    /// Resource-name partition (`aws`, `aws-cn`, ...).
    #[serde(default = "default_partition")]
    pub partition: String,

    /// Account that owns the functions.
    ///
    /// When set, existence checks use the fully qualified function ARN
    /// instead of the bare name. Accepts a string or a number, since
    /// environment overrides of a numeric id arrive as integers.
    #[serde(default, deserialize_with = "deserialize_account_id")]
    pub account_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AccountId {
    Text(String),
    Number(u64),
}

/// Account ids are twelve digits; a numeric value loses its leading zeros.
fn deserialize_account_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(
        Option::<AccountId>::deserialize(deserializer)?.map(|id| match id {
            AccountId::Text(text) => text,
            AccountId::Number(number) => format!("{number:012}"),
        }),
    )
}

fn default_region() -> String {
    "us-east-1".to_owned()
}

fn default_partition() -> String {
    "aws".to_owned()
}

impl PlatformConfig {
    /// Identifier used to look a function up on the platform.
    #[must_use]
    pub fn qualified_function_id(&self, function_name: &str) -> String {
        match &self.account_id {
            Some(account) => format!(
                "arn:{}:lambda:{}:{}:function:{}",
                self.partition, self.region, account, function_name
            ),
            None => function_name.to_owned(),
        }
    }
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            partition: default_partition(),
            account_id: None,
        }
    }
}

/// Encoding of a manifest file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManifestFormat {
    /// `KEY=VALUE` lines.
    Properties,
    /// A JSON object with named fields.
    Json,
}

/// A filename marker identifying a manifest entry inside an archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestMarker {
    /// Substring an entry name must contain.
    pub pattern: String,
    /// How the matching entry is decoded.
    pub format: ManifestFormat,
}

impl ManifestMarker {
    /// Create a new marker.
    #[must_use]
    pub fn new(pattern: impl Into<String>, format: ManifestFormat) -> Self {
        Self {
            pattern: pattern.into(),
            format,
        }
    }
}

/// Manifest discovery configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestConfig {
    /// Markers to look for, in priority order for a single entry.
    #[serde(default = "default_markers")]
    pub markers: Vec<ManifestMarker>,

    /// Runtime used when the manifest does not name one.
    #[serde(default = "default_runtime")]
    pub default_runtime: String,
}

fn default_markers() -> Vec<ManifestMarker> {
    vec![
        ManifestMarker::new("lambda.properties", ManifestFormat::Properties),
        ManifestMarker::new("lambda.json", ManifestFormat::Json),
    ]
}

fn default_runtime() -> String {
    "nodejs12.x".to_owned()
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            markers: default_markers(),
            default_runtime: default_runtime(),
        }
    }
}

/// Stage alias configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    /// First key segment to alias name.
    #[serde(default = "default_stage_prefixes")]
    pub prefixes: BTreeMap<String, String>,

    /// Alias used for every key whose first segment is not mapped.
    #[serde(default = "default_stage")]
    pub default: String,
}

fn default_stage_prefixes() -> BTreeMap<String, String> {
    BTreeMap::from([("develop".to_owned(), "DEV".to_owned())])
}

fn default_stage() -> String {
    "PROD".to_owned()
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            prefixes: default_stage_prefixes(),
            default: default_stage(),
        }
    }
}

/// Object storage configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// S3 endpoint URL (for S3-compatible stores).
    #[serde(default)]
    pub endpoint: Option<String>,

    /// S3 region. Falls back to the environment when unset.
    #[serde(default)]
    pub region: Option<String>,

    /// S3 access key ID.
    #[serde(default)]
    pub access_key_id: Option<String>,

    /// S3 secret access key.
    #[serde(default)]
    pub secret_access_key: Option<String>,

    /// Allow plain HTTP endpoints.
    #[serde(default)]
    pub allow_http: bool,
}

/// Scratch storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScratchConfig {
    /// Directory scratch files are created in.
    #[serde(default = "default_scratch_dir")]
    pub dir: PathBuf,
}

fn default_scratch_dir() -> PathBuf {
    std::env::temp_dir()
}

impl Default for ScratchConfig {
    fn default() -> Self {
        Self {
            dir: default_scratch_dir(),
        }
    }
}

/// Invocation behaviour configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationConfig {
    /// How long before the host deadline in-flight calls are cancelled.
    #[serde(default = "default_deadline_margin_ms")]
    pub deadline_margin_ms: u64,

    /// Report the invocation as failed when any record failed.
    #[serde(default = "default_fail_on_record_error")]
    pub fail_on_record_error: bool,
}

const fn default_deadline_margin_ms() -> u64 {
    500
}

const fn default_fail_on_record_error() -> bool {
    true
}

impl Default for InvocationConfig {
    fn default() -> Self {
        Self {
            deadline_margin_ms: default_deadline_margin_ms(),
            fail_on_record_error: default_fail_on_record_error(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_reference_behaviour() {
        let config = DeployConfig::default();
        assert_eq!(config.platform.region, "us-east-1");
        assert_eq!(config.manifest.default_runtime, "nodejs12.x");
        assert_eq!(config.manifest.markers[0].pattern, "lambda.properties");
        assert_eq!(config.stages.prefixes.get("develop").unwrap(), "DEV");
        assert_eq!(config.stages.default, "PROD");
        assert!(config.invocation.fail_on_record_error);
    }

    #[test]
    fn config_from_toml() {
        let toml = r#"
            [platform]
            region = "eu-west-1"
            account_id = "123456789012"

            [stages]
            default = "LIVE"

            [stages.prefixes]
            develop = "DEV"
            staging = "STAGE"

            [[manifest.markers]]
            pattern = "deploy.json"
            format = "json"
        "#;

        let config: DeployConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.platform.region, "eu-west-1");
        assert_eq!(config.platform.partition, "aws");
        assert_eq!(config.stages.prefixes.len(), 2);
        assert_eq!(config.stages.default, "LIVE");
        assert_eq!(config.manifest.markers.len(), 1);
        assert_eq!(config.manifest.markers[0].format, ManifestFormat::Json);
        assert_eq!(config.manifest.default_runtime, "nodejs12.x");
    }

    #[test]
    fn qualified_function_id() {
        let mut platform = PlatformConfig::default();
        assert_eq!(platform.qualified_function_id("orders"), "orders");

        platform.account_id = Some("655622384061".to_owned());
        assert_eq!(
            platform.qualified_function_id("orders"),
            "arn:aws:lambda:us-east-1:655622384061:function:orders"
        );
    }

    #[test]
    fn load_from_file_and_env() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "liftoff.toml",
                r#"
                    [platform]
                    region = "ap-southeast-2"
                "#,
            )?;
            jail.set_env("LIFTOFF_STAGES__DEFAULT", "PRODUCTION");

            let config = DeployConfig::load().map_err(|e| e.0)?;
            assert_eq!(config.platform.region, "ap-southeast-2");
            assert_eq!(config.stages.default, "PRODUCTION");
            assert_eq!(config.stages.prefixes.get("develop").unwrap(), "DEV");
            Ok(())
        });
    }

    #[test]
    fn numeric_account_id_from_env() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("LIFTOFF_PLATFORM__ACCOUNT_ID", "655622384061");

            let config = DeployConfig::load().map_err(|e| e.0)?;
            assert_eq!(config.platform.account_id.as_deref(), Some("655622384061"));
            assert_eq!(
                config.platform.qualified_function_id("orders"),
                "arn:aws:lambda:us-east-1:655622384061:function:orders"
            );
            Ok(())
        });
    }

    #[test]
    fn numeric_account_id_keeps_leading_zeros() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("LIFTOFF_PLATFORM__ACCOUNT_ID", "012345678901");

            let config = DeployConfig::load().map_err(|e| e.0)?;
            assert_eq!(config.platform.account_id.as_deref(), Some("012345678901"));
            Ok(())
        });
    }

    #[test]
    fn account_id_in_toml_as_string_or_integer() {
        let quoted: DeployConfig =
            toml::from_str("[platform]\naccount_id = \"655622384061\"\n").unwrap();
        let bare: DeployConfig = toml::from_str("[platform]\naccount_id = 655622384061\n").unwrap();

        assert_eq!(quoted.platform.account_id.as_deref(), Some("655622384061"));
        assert_eq!(bare.platform.account_id, quoted.platform.account_id);
        assert_eq!(DeployConfig::default().platform.account_id, None);
    }
}
