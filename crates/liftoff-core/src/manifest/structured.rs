//! JSON manifest encoding.

use crate::error::{DeployError, DeployResult};

use super::ManifestFields;

/// Decode a JSON manifest document.
///
/// Unknown fields are ignored. Type mismatches (a string where a number is
/// expected, a negative memory size) are reported as invalid manifests.
pub fn fields_from_json(text: &str) -> DeployResult<ManifestFields> {
    serde_json::from_str(text).map_err(|e| DeployError::manifest_invalid("manifest", e.to_string()))
}
