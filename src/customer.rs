//! Per-customer extraction configuration loaded from YAML.
//!
//! Layout under the config root:
//!
//! ```text
//! config/
//! ├── base.yaml
//! └── customers/
//!     └── <customer>/
//!         ├── config.yaml               deep-merged over base.yaml
//!         └── surface-treatments.yaml   replaces surfaceTreatments
//! ```
//!
//! Maps merge recursively, lists and scalars from the customer file replace
//! the base value. Missing files count as empty documents so a customer with
//! no directory simply gets `base.yaml`.

use crate::error::ExtractError;
use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Customer id that maps to `base.yaml` alone.
pub const BASE_CUSTOMER: &str = "base";


#[derive(Debug, Clone, Default, Deserialize)]
pub struct HoleSignal {
    #[serde(default)]
    pub pattern: Option<String>,
    /// Fields to set when the pattern is seen (`type`, `diameter`, ...).
    #[serde(default)]
    pub capture: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToleratedLengthSignal {
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Signals {
    #[serde(default)]
    pub tolerated_lengths: Vec<ToleratedLengthSignal>,
    #[serde(default)]
    pub holes: Vec<HoleSignal>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurfaceTreatmentOption {
    pub display_name: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SurfaceTreatments {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub options: Vec<SurfaceTreatmentOption>,
}

/// Extra prompt rules appended to the matching prompt section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PromptAdditions {
    #[serde(default)]
    pub holes: Vec<String>,
    #[serde(default)]
    pub tolerated_lengths: Vec<String>,
    #[serde(default)]
    pub surface_treatment: Vec<String>,
    #[serde(default)]
    pub material: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerConfig {
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub signals: Option<Signals>,
    #[serde(default)]
    pub surface_treatments: Option<SurfaceTreatments>,
    #[serde(default, rename = "material_patterns")]
    pub material_patterns: Vec<String>,
    #[serde(default, rename = "prompt_additions")]
    pub prompt_additions: Option<PromptAdditions>,
}

impl CustomerConfig {
    /// Display name used in prompts; falls back to the upper-cased id.
    pub fn display_name(&self, customer_id: &str) -> String {
        self.customer_name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| customer_id.to_uppercase())
    }
}

/// Locate the config root when none was configured.
///
/// Checks `./config`, `./python_version/config` and `./public/config`
/// relative to the working directory; defaults to `./config`.
pub fn find_config_root() -> PathBuf {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let candidates = [
        cwd.join("config"),
        cwd.join("python_version").join("config"),
        cwd.join("public").join("config"),
    ];
    candidates
        .iter()
        .find(|p| p.is_dir())
        .cloned()
        .unwrap_or_else(|| cwd.join("config"))
}

/// Load the merged configuration for `customer_id`.
pub fn load_customer_config(root: &Path, customer_id: &str) -> Result<CustomerConfig, ExtractError> {
    let base = load_yaml(&root.join("base.yaml"))?;

    let merged = if customer_id == BASE_CUSTOMER {
        base
    } else {
        let customer_root = root.join("customers").join(customer_id);
        let customer = load_yaml(&customer_root.join("config.yaml"))?;
        let surface = load_yaml(&customer_root.join("surface-treatments.yaml"))?;

        let mut merged = deep_merge(base, customer);
        if !is_empty_document(&surface) {
            if let Value::Mapping(ref mut map) = merged {
                map.insert(Value::String("surfaceTreatments".into()), surface);
            }
        }
        merged
    };

    debug!("Loaded customer config '{}' from {}", customer_id, root.display());

    serde_yaml::from_value(merged).map_err(|e| ExtractError::CustomerConfig {
        path: root.join("customers").join(customer_id),
        detail: e.to_string(),
    })
}

/// Read a YAML file; a missing file or empty document yields an empty map.
fn load_yaml(path: &Path) -> Result<Value, ExtractError> {
    if !path.exists() {
        return Ok(Value::Mapping(Mapping::new()));
    }
    let text = std::fs::read_to_string(path).map_err(|e| ExtractError::ReadFailed {
        path: path.to_path_buf(),
        source: e,
    })?;
    let value: Value = serde_yaml::from_str(&text).map_err(|e| ExtractError::CustomerConfig {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    Ok(match value {
        Value::Null => Value::Mapping(Mapping::new()),
        other => other,
    })
}

fn is_empty_document(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Mapping(m) => m.is_empty(),
        _ => false,
    }
}

/// Recursively merge `overlay` into `base`. Maps merge; everything else in
/// `overlay` replaces the base value.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Mapping(mut base_map), Value::Mapping(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_value @ Value::Mapping(_)) if overlay_value.is_mapping() => {
                        deep_merge(base_value, overlay_value)
                    }
                    _ => overlay_value,
                };
                base_map.insert(key, merged);
            }
            Value::Mapping(base_map)
        }
        (_, overlay) => overlay,
    }
}
