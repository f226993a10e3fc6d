//! Flat `KEY=VALUE` manifest encoding.

use std::collections::BTreeMap;

use crate::error::{DeployError, DeployResult};

use super::ManifestFields;

/// Function name key.
pub const FUNCTION_NAME: &str = "FUNCTION_NAME";
/// Handler key.
pub const HANDLER_NAME: &str = "HANDLER_NAME";
/// Memory size key (MB).
pub const MEMORY_SIZE: &str = "MEMORY_SIZE";
/// Timeout key (seconds).
pub const TIMEOUT: &str = "TIMEOUT";
/// Execution role key.
pub const ROLE: &str = "DEV_ARN_IAM_ROLE";
/// Alternative execution role key.
pub const ROLE_ARN: &str = "ROLE_ARN";
/// Description key.
pub const DESCRIPTION: &str = "LAMBDA_DESCRIPTION";
/// Comma-separated security group identifiers.
pub const SECURITY_GROUPS: &str = "SECURITY_GROUPS_ID";
/// Comma-separated subnet identifiers.
pub const SUBNETS: &str = "SUB_NETS_ID";
/// Publish flag key.
pub const PUBLISH: &str = "PUBLISH";
/// Runtime override key.
pub const RUNTIME: &str = "RUNTIME";
/// Prefix of keys that become environment variables.
pub const ENV_PREFIX: &str = "ENV_";

/// Split manifest text into trimmed key/value pairs.
///
/// The first `=` on a line separates key from value. Lines without `=`,
/// lines with an empty key, and `#`/`!` comments are ignored. A repeated key
/// keeps its last value.
#[must_use]
pub fn parse_properties(text: &str) -> BTreeMap<String, String> {
    let mut properties = BTreeMap::new();

    for line in text.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with('#') || trimmed.starts_with('!') {
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            continue;
        };

        let key = key.trim();
        if key.is_empty() {
            continue;
        }

        properties.insert(key.to_owned(), value.trim().to_owned());
    }

    properties
}

/// Map parsed properties onto manifest fields, checking value types.
pub fn fields_from_properties(properties: &BTreeMap<String, String>) -> DeployResult<ManifestFields> {
    let environment: BTreeMap<String, String> = properties
        .iter()
        .filter_map(|(key, value)| {
            key.strip_prefix(ENV_PREFIX)
                .filter(|name| !name.is_empty())
                .map(|name| (name.to_owned(), value.clone()))
        })
        .collect();

    Ok(ManifestFields {
        function_name: text(properties, FUNCTION_NAME),
        handler: text(properties, HANDLER_NAME),
        runtime: text(properties, RUNTIME),
        memory_size: number(properties, MEMORY_SIZE)?,
        timeout: number(properties, TIMEOUT)?,
        role: text(properties, ROLE).or_else(|| text(properties, ROLE_ARN)),
        description: text(properties, DESCRIPTION),
        security_group_ids: list(properties, SECURITY_GROUPS),
        subnet_ids: list(properties, SUBNETS),
        environment,
        publish: flag(properties, PUBLISH)?,
    })
}

fn text(properties: &BTreeMap<String, String>, key: &str) -> Option<String> {
    properties
        .get(key)
        .filter(|value| !value.is_empty())
        .cloned()
}

fn number(properties: &BTreeMap<String, String>, key: &str) -> DeployResult<Option<u32>> {
    match properties.get(key).filter(|value| !value.is_empty()) {
        None => Ok(None),
        Some(value) => value.parse::<u32>().map(Some).map_err(|e| {
            DeployError::manifest_invalid(key, format!("{value:?} is not a valid number: {e}"))
        }),
    }
}

fn flag(properties: &BTreeMap<String, String>, key: &str) -> DeployResult<Option<bool>> {
    match properties.get(key).filter(|value| !value.is_empty()) {
        None => Ok(None),
        Some(value) => parse_bool(value)
            .map(Some)
            .ok_or_else(|| DeployError::manifest_invalid(key, format!("{value:?} is not a boolean"))),
    }
}

fn list(properties: &BTreeMap<String, String>, key: &str) -> Vec<String> {
    properties
        .get(key)
        .map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(ToOwned::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

/// Parse the boolean spellings accepted by the manifest format.
#[must_use]
pub fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}
