//! Manifest files for `generate` and `vary`.
//!
//! Both accept either a bare JSON list or an object wrapping the list, so a manifest can
//! carry extra bookkeeping keys without the CLI caring.

use crate::error::ApiError;
use crate::request::{GenerationSpec, UnitOfWork};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::Path;

#[derive(Deserialize)]
#[serde(untagged)]
enum UnitManifest {
    List(Vec<UnitOfWork>),
    Wrapped { units: Vec<UnitOfWork> },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum VariationManifest {
    List(Vec<GenerationSpec>),
    Wrapped { variations: Vec<GenerationSpec> },
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ApiError> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        ApiError::InvalidRequest(format!("Failed to read manifest {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&raw).map_err(|e| {
        ApiError::InvalidRequest(format!("Invalid manifest {}: {}", path.display(), e))
    })
}

pub fn load_units(path: &Path) -> Result<Vec<UnitOfWork>, ApiError> {
    let units = match read_json::<UnitManifest>(path)? {
        UnitManifest::List(units) | UnitManifest::Wrapped { units } => units,
    };
    if units.is_empty() {
        return Err(ApiError::InvalidRequest(format!(
            "Manifest {} contains no units",
            path.display()
        )));
    }
    Ok(units)
}

pub fn load_variations(path: &Path) -> Result<Vec<GenerationSpec>, ApiError> {
    let variations = match read_json::<VariationManifest>(path)? {
        VariationManifest::List(specs) | VariationManifest::Wrapped { variations: specs } => specs,
    };
    if variations.is_empty() {
        return Err(ApiError::InvalidRequest(format!(
            "Manifest {} contains no variations",
            path.display()
        )));
    }
    Ok(variations)
}
