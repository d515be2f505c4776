//! Shared data types for the enterprise extension installation pipeline
//! (spec §3, §4.4).

use serde::{Deserialize, Serialize};

/// Where the extension source came from. Drives key-id derivation
/// (spec §4.4 step 3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtensionSource {
    GitHub { url: String, branch: Option<String> },
    Upload { manifest_name: String },
}

/// Result of a completed (or timed-out) install pipeline run (spec §4.4
/// step 9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtensionArtifact {
    pub id: String,
    pub version: String,
    pub crx_path: String,
    pub update_manifest_path: String,
    pub update_url: String,
    pub policy_path: String,
    pub installed: bool,
    pub profile_extensions_dir: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_serializes_installed_flag() {
        let artifact = ExtensionArtifact {
            id: "a".repeat(32),
            version: "1.0.0".to_string(),
            crx_path: "/repo/aaa/aaa.crx".to_string(),
            update_manifest_path: "/repo/aaa/update.xml".to_string(),
            update_url: "http://localhost/extrepo/aaa/update.xml".to_string(),
            policy_path: "/policy/force_aaa.json".to_string(),
            installed: false,
            profile_extensions_dir: "/profile/Extensions".to_string(),
        };
        let json = serde_json::to_value(&artifact).unwrap();
        assert_eq!(json["installed"], false);
    }
}
