//! Deployment manifest discovery and decoding.
//!
//! An artifact is a zip archive carrying a manifest file next to the
//! function code. The manifest is found by substring match on entry names
//! (see [`ManifestConfig::markers`]); the first matching entry in archive
//! order wins, and its marker decides the encoding:
//!
//! - [`ManifestFormat::Properties`]: `KEY=VALUE` lines, see [`properties`]
//! - [`ManifestFormat::Json`]: a JSON object, see [`structured`]
//!
//! Both encodings decode into [`ManifestFields`], which is validated into a
//! [`DeploymentDescriptor`].

pub mod properties;
pub mod structured;

use std::collections::BTreeMap;
use std::io::{Read, Seek};

use serde::Deserialize;
use tracing::debug;
use zip::ZipArchive;

use crate::config::{ManifestConfig, ManifestFormat};
use crate::error::{DeployError, DeployResult};
use crate::types::{DeploymentDescriptor, NetworkPlacement};

/// Manifest contents before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ManifestFields {
    /// Function name.
    pub function_name: Option<String>,
    /// Entry-point handler.
    pub handler: Option<String>,
    /// Runtime identifier; the configured default applies when absent.
    pub runtime: Option<String>,
    /// Memory size in MB.
    pub memory_size: Option<u32>,
    /// Timeout in seconds.
    pub timeout: Option<u32>,
    /// Execution role.
    pub role: Option<String>,
    /// Description.
    pub description: Option<String>,
    /// Security group identifiers.
    pub security_group_ids: Vec<String>,
    /// Subnet identifiers.
    pub subnet_ids: Vec<String>,
    /// Environment variables.
    pub environment: BTreeMap<String, String>,
    /// Publish a new version; `false` when absent.
    pub publish: Option<bool>,
}

impl ManifestFields {
    /// Validate the fields into a descriptor.
    ///
    /// Function name, handler, role, memory size and timeout are required;
    /// memory size and timeout must be positive.
    pub fn into_descriptor(self, default_runtime: &str) -> DeployResult<DeploymentDescriptor> {
        let function_name = required_text(self.function_name, "function_name")?;
        let handler = required_text(self.handler, "handler")?;
        let role = required_text(self.role, "role")?;
        let memory_size = required_positive(self.memory_size, "memory_size")?;
        let timeout = required_positive(self.timeout, "timeout")?;

        let runtime = self
            .runtime
            .filter(|runtime| !runtime.trim().is_empty())
            .unwrap_or_else(|| default_runtime.to_owned());
        if runtime.trim().is_empty() {
            return Err(DeployError::manifest_invalid(
                "runtime",
                "no runtime given and no default configured",
            ));
        }

        let network = NetworkPlacement {
            security_group_ids: self.security_group_ids,
            subnet_ids: self.subnet_ids,
        };

        Ok(DeploymentDescriptor {
            function_name,
            handler,
            runtime,
            memory_size,
            timeout,
            role,
            description: self.description.unwrap_or_default(),
            network: (!network.is_empty()).then_some(network),
            environment: (!self.environment.is_empty()).then_some(self.environment),
            publish: self.publish.unwrap_or(false),
        })
    }
}

fn required_text(value: Option<String>, field: &str) -> DeployResult<String> {
    match value.map(|v| v.trim().to_owned()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(DeployError::manifest_invalid(field, "required field is missing")),
    }
}

fn required_positive(value: Option<u32>, field: &str) -> DeployResult<u32> {
    match value {
        Some(0) => Err(DeployError::manifest_invalid(field, "must be greater than zero")),
        Some(v) => Ok(v),
        None => Err(DeployError::manifest_invalid(field, "required field is missing")),
    }
}

/// Decode manifest text in the given encoding and validate it.
pub fn parse_manifest(
    text: &str,
    format: ManifestFormat,
    default_runtime: &str,
) -> DeployResult<DeploymentDescriptor> {
    let fields = match format {
        ManifestFormat::Properties => {
            properties::fields_from_properties(&properties::parse_properties(text))?
        }
        ManifestFormat::Json => structured::fields_from_json(text)?,
    };

    fields.into_descriptor(default_runtime)
}

/// Locate the manifest inside a zip archive and decode it.
///
/// The archive and entry readers are dropped before this returns.
pub fn parse_archive<R: Read + Seek>(
    reader: R,
    config: &ManifestConfig,
) -> DeployResult<DeploymentDescriptor> {
    let mut archive = ZipArchive::new(reader).map_err(|e| DeployError::Archive(e.to_string()))?;

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| DeployError::Archive(e.to_string()))?;

        if entry.is_dir() {
            continue;
        }

        let name = entry.name().to_owned();
        let Some(marker) = config
            .markers
            .iter()
            .find(|marker| name.contains(&marker.pattern))
        else {
            continue;
        };

        let mut raw = Vec::new();
        entry
            .read_to_end(&mut raw)
            .map_err(|e| DeployError::Archive(format!("failed to read {name}: {e}")))?;
        let text = String::from_utf8(raw)
            .map_err(|_| DeployError::manifest_invalid("manifest", format!("{name} is not valid UTF-8")))?;

        debug!(entry = %name, format = ?marker.format, "manifest found");
        return parse_manifest(&text, marker.format, &config.default_runtime);
    }

    Err(DeployError::ManifestMissing {
        markers: config
            .markers
            .iter()
            .map(|marker| marker.pattern.as_str())
            .collect::<Vec<_>>()
            .join(", "),
    })
}
