//! Managed-policy force-list installation (spec §4.4 step 7): a single
//! JSON file per extension under the configured policy directory.

use std::path::{Path, PathBuf};

use serde_json::json;

use crate::error::{InstallError, Result};

/// Write `<policy_dir>/force_<ext_id>.json` containing an
/// `ExtensionInstallForcelist` entry, mode 0644.
pub fn install_forcelist(policy_dir: &Path, ext_id: &str, update_url: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(policy_dir).map_err(|_| InstallError::PolicyDirNotWritable(policy_dir.display().to_string()))?;

    let entry = format!("{ext_id};{update_url}");
    let body = json!({ "ExtensionInstallForcelist": [entry] });
    let path = policy_dir.join(format!("force_{ext_id}.json"));

    use std::os::unix::fs::OpenOptionsExt;
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o644)
        .open(&path)
        .map_err(|_| InstallError::PolicyDirNotWritable(policy_dir.display().to_string()))?;
    use std::io::Write;
    file.write_all(serde_json::to_string_pretty(&body)?.as_bytes())?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forcelist_entry_joins_id_and_update_url_with_semicolon() {
        let dir = tempfile::tempdir().unwrap();
        let path = install_forcelist(dir.path(), "aaa", "http://x/aaa/update.xml").unwrap();
        let body: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(body["ExtensionInstallForcelist"][0], "aaa;http://x/aaa/update.xml");
    }
}
