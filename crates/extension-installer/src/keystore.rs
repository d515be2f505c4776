//! Deterministic per-extension signing keys (spec §4.4 step 3): a key id
//! is derived from the source, and the 2048-bit RSA key for that id is
//! generated once and reused forever. Mirrors the generate-once /
//! persist-with-0600 / reuse-on-restart shape used for this workspace's
//! other long-lived secrets.

use std::path::{Path, PathBuf};

use pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding};
use rsa::RsaPrivateKey;
use sha2::{Digest, Sha256};
use vw_protocol::extension::ExtensionSource;

use crate::error::Result;

const KEY_BITS: usize = 2048;

/// Derive the deterministic key id for a source (spec §4.4 step 3).
pub fn key_id(source: &ExtensionSource) -> String {
    match source {
        ExtensionSource::GitHub { url, .. } => {
            let normalized = url.to_lowercase();
            let normalized = normalized.strip_suffix(".git").unwrap_or(&normalized);
            format!("gh_{}", &hex_digest(normalized.as_bytes())[..16])
        }
        ExtensionSource::Upload { manifest_name } => {
            format!("up_{}", &hex_digest(manifest_name.to_lowercase().as_bytes())[..16])
        }
    }
}

fn hex_digest(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    hex::encode(digest)
}

/// Load the persisted key for `key_id`, generating and persisting a new
/// one (mode 0600) if it doesn't exist yet.
pub fn load_or_generate(keystore_dir: &Path, id: &str) -> Result<RsaPrivateKey> {
    std::fs::create_dir_all(keystore_dir)?;
    let path = key_path(keystore_dir, id);

    if path.exists() {
        let pem = std::fs::read_to_string(&path)?;
        return Ok(RsaPrivateKey::from_pkcs8_pem(&pem)?);
    }

    let mut rng = rand::thread_rng();
    let key = RsaPrivateKey::new(&mut rng, KEY_BITS)?;
    let pem = key.to_pkcs8_pem(LineEnding::LF)?;

    use std::os::unix::fs::OpenOptionsExt;
    let mut file = std::fs::OpenOptions::new().write(true).create(true).truncate(true).mode(0o600).open(&path)?;
    use std::io::Write;
    file.write_all(pem.as_bytes())?;

    tracing::info!(key_id = id, path = %path.display(), "generated new extension signing key");
    Ok(key)
}

pub fn key_path(keystore_dir: &Path, id: &str) -> PathBuf {
    keystore_dir.join(format!("{id}.pem"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn github_key_id_ignores_trailing_git_and_case() {
        let a = ExtensionSource::GitHub { url: "https://github.com/Org/Repo.git".to_string(), branch: None };
        let b = ExtensionSource::GitHub { url: "https://github.com/org/repo".to_string(), branch: None };
        assert_eq!(key_id(&a), key_id(&b));
        assert!(key_id(&a).starts_with("gh_"));
        assert_eq!(key_id(&a).len(), "gh_".len() + 16);
    }

    #[test]
    fn upload_key_id_is_case_insensitive() {
        let a = ExtensionSource::Upload { manifest_name: "MyExt.zip".to_string() };
        let b = ExtensionSource::Upload { manifest_name: "myext.zip".to_string() };
        assert_eq!(key_id(&a), key_id(&b));
        assert!(key_id(&a).starts_with("up_"));
    }

    #[test]
    fn load_or_generate_reuses_persisted_key() {
        let dir = tempfile::tempdir().unwrap();
        let first = load_or_generate(dir.path(), "gh_abc").unwrap();
        let second = load_or_generate(dir.path(), "gh_abc").unwrap();
        assert_eq!(first.to_pkcs8_pem(LineEnding::LF).unwrap().as_str(), second.to_pkcs8_pem(LineEnding::LF).unwrap().as_str());
    }
}
