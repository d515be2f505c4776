//! Chromium `--pack-extension` invocation and extension id derivation
//! (spec §4.4 steps 4-5).

use std::path::{Path, PathBuf};
use std::process::Stdio;

use rsa::RsaPrivateKey;
use sha2::{Digest, Sha256};
use spki::EncodePublicKey;

use crate::error::{InstallError, Result};

/// Run the Chromium packer against `extension_root`, using the PEM key at
/// `key_pem_path`, as `run_as_user` if configured. Returns the produced
/// `.crx` path.
pub async fn pack_extension(
    chromium_path: &str,
    extension_root: &Path,
    key_pem_path: &Path,
    run_as_user: Option<&str>,
) -> Result<PathBuf> {
    let crx_path = extension_root.with_extension("crx");

    let mut cmd = match run_as_user {
        Some(user) => {
            let mut c = tokio::process::Command::new("runuser");
            c.args(["-u", user, "--", chromium_path]);
            c
        }
        None => tokio::process::Command::new(chromium_path),
    };
    cmd.arg(format!("--pack-extension={}", extension_root.display()))
        .arg(format!("--pack-extension-key={}", key_pem_path.display()))
        .arg("--no-sandbox")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let output = cmd.output().await?;
    if !output.status.success() {
        return Err(InstallError::PackerFailed(
            output.status.to_string(),
            String::from_utf8_lossy(&output.stderr).into_owned(),
        ));
    }

    if !crx_path.exists() {
        return Err(InstallError::MissingPackerOutput(crx_path.display().to_string()));
    }
    Ok(crx_path)
}

/// Compute the 32-character extension id Chrome would derive from this
/// key's public half: SHA-256 of the SPKI DER, first 16 bytes, each
/// nibble mapped to `a`..`p` (spec §4.4 step 5).
pub fn derive_extension_id(key: &RsaPrivateKey) -> Result<String> {
    let public_key = key.to_public_key();
    let spki_der = public_key.to_public_key_der()?;
    let digest = Sha256::digest(spki_der.as_bytes());

    let mut id = String::with_capacity(32);
    for byte in &digest[..16] {
        id.push(nibble_to_char(byte >> 4));
        id.push(nibble_to_char(byte & 0x0f));
    }
    Ok(id)
}

fn nibble_to_char(nibble: u8) -> char {
    (b'a' + nibble) as char
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nibble_maps_to_a_through_p() {
        assert_eq!(nibble_to_char(0), 'a');
        assert_eq!(nibble_to_char(15), 'p');
    }

    #[test]
    fn derive_extension_id_is_32_lowercase_chars() {
        let mut rng = rand::thread_rng();
        let key = RsaPrivateKey::new(&mut rng, 2048).unwrap();
        let id = derive_extension_id(&key).unwrap();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_lowercase() && ('a'..='p').contains(&c)));
    }

    #[test]
    fn derive_extension_id_is_deterministic_for_same_key() {
        let mut rng = rand::thread_rng();
        let key = RsaPrivateKey::new(&mut rng, 2048).unwrap();
        assert_eq!(derive_extension_id(&key).unwrap(), derive_extension_id(&key).unwrap());
    }
}
