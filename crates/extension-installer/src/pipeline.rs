//! End-to-end orchestration of the nine-step install pipeline
//! (spec §4.4).

use std::path::{Path, PathBuf};
use std::time::Duration;

use vw_protocol::extension::{ExtensionArtifact, ExtensionSource};

use crate::error::Result;
use crate::{devtools, keystore, manifest, packer, policy, publish, source};

/// Where to find the running browser's DevTools and on-disk profile, and
/// how long to wait for a force-installed extension before restarting.
pub struct DevtoolsTarget {
    pub http_base: String,
    pub profile_extensions_dir: PathBuf,
    pub install_timeout: Duration,
}

pub struct InstallerConfig {
    pub repo_dir: PathBuf,
    pub public_base_url: String,
    pub policy_dir: PathBuf,
    pub keystore_dir: PathBuf,
    pub chromium_path: String,
    pub chromium_user: Option<String>,
    pub work_dir: PathBuf,
}

/// Run the full pipeline for a GitHub-sourced extension.
pub async fn install_from_github(
    config: &InstallerConfig,
    url: String,
    branch: Option<String>,
    devtools: Option<&DevtoolsTarget>,
) -> Result<ExtensionArtifact> {
    let client = reqwest::Client::new();
    let work_dir = config.work_dir.join(uuid::Uuid::new_v4().to_string());
    let extension_root = source::acquire_github(&client, &url, branch.as_deref(), &work_dir).await?;
    let extension_source = source::github_source(url, branch);
    run_pipeline(config, extension_source, extension_root, devtools).await
}

/// Run the full pipeline for an uploaded archive.
pub async fn install_from_upload(
    config: &InstallerConfig,
    manifest_name: String,
    archive_bytes: &[u8],
    devtools: Option<&DevtoolsTarget>,
) -> Result<ExtensionArtifact> {
    let work_dir = config.work_dir.join(uuid::Uuid::new_v4().to_string());
    let extension_root = source::acquire_upload(archive_bytes, &work_dir)?;
    let extension_source = ExtensionSource::Upload { manifest_name };
    run_pipeline(config, extension_source, extension_root, devtools).await
}

async fn run_pipeline(
    config: &InstallerConfig,
    extension_source: ExtensionSource,
    extension_root: PathBuf,
    devtools_target: Option<&DevtoolsTarget>,
) -> Result<ExtensionArtifact> {
    let manifest = manifest::load_and_validate(&extension_root.join("manifest.json"))?;

    let id = keystore::key_id(&extension_source);
    let key = keystore::load_or_generate(&config.keystore_dir, &id)?;
    let key_pem_path = keystore::key_path(&config.keystore_dir, &id);

    let crx_path =
        packer::pack_extension(&config.chromium_path, &extension_root, &key_pem_path, config.chromium_user.as_deref())
            .await?;
    let ext_id = packer::derive_extension_id(&key)?;

    let published = publish::publish(&config.repo_dir, &ext_id, &crx_path, &manifest.version, &config.public_base_url)?;
    let policy_path = policy::install_forcelist(&config.policy_dir, &ext_id, &published.update_url)?;

    let (installed, profile_extensions_dir) = match devtools_target {
        Some(target) => {
            devtools::trigger_policy_reload(&target.http_base).await;
            let mut installed = devtools::wait_for_install(&target.profile_extensions_dir, &ext_id, target.install_timeout).await;
            if !installed {
                installed =
                    devtools::restart_and_wait(&target.http_base, &target.profile_extensions_dir, &ext_id).await;
            }
            (installed, target.profile_extensions_dir.display().to_string())
        }
        None => (false, String::new()),
    };

    Ok(ExtensionArtifact {
        id: ext_id,
        version: manifest.version,
        crx_path: published.crx_path.display().to_string(),
        update_manifest_path: published.update_manifest_path.display().to_string(),
        update_url: published.update_url,
        policy_path: policy_path.display().to_string(),
        installed,
        profile_extensions_dir,
    })
}

/// Resolve a public repo-route request (`/extrepo/<path>`) to a file on
/// disk, refusing to serve anything outside the repo directory.
pub fn resolve_repo_path(repo_dir: &Path, requested: &str) -> Option<PathBuf> {
    publish::resolve_within_repo(repo_dir, requested)
}
