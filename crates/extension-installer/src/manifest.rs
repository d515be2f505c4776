//! `manifest.json` validation (spec §4.4 step 2).

use crate::error::{InstallError, Result};

#[derive(Debug, Clone)]
pub struct Manifest {
    pub version: String,
    pub name: Option<String>,
}

/// Validate the manifest at `path`: must parse as JSON, declare
/// `manifest_version == 3`, and carry a dotted-numeric `version` with
/// 1 to 4 components.
pub fn load_and_validate(path: &std::path::Path) -> Result<Manifest> {
    let contents = std::fs::read_to_string(path)?;
    let value: serde_json::Value = serde_json::from_str(&contents)
        .map_err(|e| InstallError::InvalidManifest(format!("not valid JSON: {e}")))?;

    let manifest_version = value
        .get("manifest_version")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InstallError::InvalidManifest("missing manifest_version".to_string()))?;
    if manifest_version != 3 {
        return Err(InstallError::InvalidManifest(format!(
            "manifest_version must be 3, got {manifest_version}"
        )));
    }

    let version = value
        .get("version")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| InstallError::InvalidManifest("missing version".to_string()))?
        .to_string();
    if !is_dotted_numeric(&version) {
        return Err(InstallError::InvalidManifest(format!("version '{version}' is not dotted-numeric")));
    }

    let name = value.get("name").and_then(serde_json::Value::as_str).map(str::to_string);

    Ok(Manifest { version, name })
}

/// Chrome's extension version grammar: 1 to 4 dot-separated non-negative
/// integers, no leading zeros beyond a bare `0`.
fn is_dotted_numeric(version: &str) -> bool {
    let parts: Vec<&str> = version.split('.').collect();
    if parts.is_empty() || parts.len() > 4 {
        return false;
    }
    parts.iter().all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
}

/// Locate the extension root inside an unpacked archive: the directory
/// containing `manifest.json`, either at the top level or one level down
/// if the archive has a single top-level directory (spec §4.4 step 1).
pub fn find_extension_root(extracted_dir: &std::path::Path) -> Result<std::path::PathBuf> {
    if extracted_dir.join("manifest.json").is_file() {
        return Ok(extracted_dir.to_path_buf());
    }

    let mut entries: Vec<std::path::PathBuf> = std::fs::read_dir(extracted_dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .collect();
    entries.retain(|p| p.is_dir());

    if entries.len() == 1 && entries[0].join("manifest.json").is_file() {
        return Ok(entries[0].clone());
    }

    Err(InstallError::InvalidSource("no manifest.json found at archive root or single top-level directory".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_one_to_four_component_versions() {
        for v in ["1", "1.0", "1.0.0", "1.0.0.0"] {
            assert!(is_dotted_numeric(v), "{v} should be valid");
        }
    }

    #[test]
    fn rejects_non_numeric_or_too_many_components() {
        for v in ["1.0.0.0.0", "1.a", "", "1."] {
            assert!(!is_dotted_numeric(v), "{v} should be invalid");
        }
    }

    #[test]
    fn load_and_validate_rejects_wrong_manifest_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        std::fs::write(&path, r#"{"manifest_version":2,"version":"1.0"}"#).unwrap();
        assert!(load_and_validate(&path).is_err());
    }

    #[test]
    fn load_and_validate_accepts_well_formed_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        std::fs::write(&path, r#"{"manifest_version":3,"version":"2.1.0","name":"demo"}"#).unwrap();
        let manifest = load_and_validate(&path).unwrap();
        assert_eq!(manifest.version, "2.1.0");
        assert_eq!(manifest.name.as_deref(), Some("demo"));
    }

    #[test]
    fn find_extension_root_descends_single_top_level_dir() {
        let dir = tempfile::tempdir().unwrap();
        let inner = dir.path().join("my-extension-main");
        std::fs::create_dir_all(&inner).unwrap();
        std::fs::write(inner.join("manifest.json"), "{}").unwrap();

        let root = find_extension_root(dir.path()).unwrap();
        assert_eq!(root, inner);
    }
}
