//! # Pubspec Parsing and Validation
//!
//! A `pubspec.yaml` is parsed into a [`Pubspec`]: the fields the server knows
//! about are typed, every other top-level key lands in [`Pubspec::extra`] and
//! is merged back when the manifest is rendered as JSON, so read responses echo
//! the uploaded manifest faithfully.
//!
//! ```rust
//! use repub_server::pubspec;
//!
//! let spec = pubspec::parse("name: pkgA\nversion: 1.0.0\nx_custom: kept\n").unwrap();
//! assert_eq!(spec.name, "pkgA");
//! assert_eq!(spec.to_json().unwrap()["x_custom"], "kept");
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{AppError, AppResult};
use crate::validation::{validate_package_name, validate_version};

/// Parsed package manifest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pubspec {
    #[serde(default, deserialize_with = "scalar_string")]
    pub name: String,
    #[serde(default, deserialize_with = "scalar_string")]
    pub version: String,
    #[serde(
        default,
        deserialize_with = "optional_scalar_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<String>,
    #[serde(
        default,
        deserialize_with = "optional_scalar_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub homepage: Option<String>,
    #[serde(
        default,
        deserialize_with = "optional_scalar_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub repository: Option<String>,
    #[serde(
        default,
        deserialize_with = "optional_scalar_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub issue_tracker: Option<String>,
    #[serde(
        default,
        deserialize_with = "optional_scalar_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub documentation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<IndexMap<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dev_dependencies: Option<IndexMap<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<Environment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executables: Option<IndexMap<String, Option<String>>>,
    #[serde(
        default,
        deserialize_with = "optional_scalar_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub publish_to: Option<String>,
    #[serde(
        default,
        deserialize_with = "optional_scalar_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authors: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub funding: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshots: Option<Vec<Screenshot>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topics: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platforms: Option<IndexMap<String, Value>>,
    /// Top-level keys without a typed field, in document order
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

/// SDK constraints from the `environment` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    #[serde(
        default,
        deserialize_with = "optional_scalar_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub sdk: Option<String>,
    #[serde(
        default,
        deserialize_with = "optional_scalar_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub flutter: Option<String>,
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Screenshot {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub path: String,
}

// YAML happily types `version: 1` or `name: true` as non-strings
fn scalar_to_string<E: serde::de::Error>(value: Value) -> Result<Option<String>, E> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Bool(b) => Ok(Some(b.to_string())),
        other => Err(E::custom(format!("expected a scalar value, found {other}"))),
    }
}

fn scalar_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(scalar_to_string(value)?.unwrap_or_default())
}

fn optional_scalar_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        Some(value) => scalar_to_string(value),
        None => Ok(None),
    }
}

/// Parse and validate a manifest.
///
/// # Errors
///
/// * [`AppError::ManifestParse`] for empty or malformed YAML
/// * [`AppError::ManifestValidation`] when `name` or `version` is missing or malformed
pub fn parse(content: &str) -> AppResult<Pubspec> {
    if content.trim().is_empty() {
        return Err(AppError::ManifestParse(
            "pubspec content is empty".to_string(),
        ));
    }

    let pubspec: Pubspec = serde_yaml_ng::from_str(content)
        .map_err(|e| AppError::ManifestParse(format!("failed to parse YAML: {e}")))?;

    pubspec.validate()?;
    Ok(pubspec)
}

impl Pubspec {
    /// Check required fields and their syntax.
    pub fn validate(&self) -> AppResult<()> {
        if self.name.is_empty() {
            return Err(AppError::ManifestValidation(
                "package name is required".to_string(),
            ));
        }
        if self.version.is_empty() {
            return Err(AppError::ManifestValidation(
                "package version is required".to_string(),
            ));
        }

        validate_package_name(&self.name)
            .map_err(|e| AppError::ManifestValidation(e.to_string()))?;
        validate_version(&self.version).map_err(|e| AppError::ManifestValidation(e.to_string()))?;

        Ok(())
    }

    /// Render the manifest as a JSON object, extra fields included.
    pub fn to_json(&self) -> AppResult<Value> {
        Ok(serde_json::to_value(self)?)
    }
}
