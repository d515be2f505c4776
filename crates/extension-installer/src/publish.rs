//! Publish a packed CRX plus its update manifest into the configured repo
//! directory, and resolve requests against it without escaping it
//! (spec §4.4 step 6, and the `/extrepo/*` route's path guard).

use std::path::{Path, PathBuf};

use crate::error::Result;

pub struct Published {
    pub crx_path: PathBuf,
    pub update_manifest_path: PathBuf,
    pub update_url: String,
}

/// Copy the CRX into `<repo_dir>/<ext_id>/<ext_id>.crx` and write
/// `update.xml` beside it.
pub fn publish(repo_dir: &Path, ext_id: &str, crx_path: &Path, version: &str, public_base_url: &str) -> Result<Published> {
    let ext_dir = repo_dir.join(ext_id);
    std::fs::create_dir_all(&ext_dir)?;

    let published_crx = ext_dir.join(format!("{ext_id}.crx"));
    std::fs::copy(crx_path, &published_crx)?;

    let crx_url = format!("{}/{}/{}.crx", public_base_url.trim_end_matches('/'), ext_id, ext_id);
    let update_url = format!("{}/{}/update.xml", public_base_url.trim_end_matches('/'), ext_id);

    let manifest_path = ext_dir.join("update.xml");
    std::fs::write(&manifest_path, update_xml(ext_id, version, &crx_url))?;

    Ok(Published { crx_path: published_crx, update_manifest_path: manifest_path, update_url })
}

/// Render the `gupdate`-response XML Chromium's updater expects.
fn update_xml(ext_id: &str, version: &str, crx_url: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<gupdate xmlns="http://www.google.com/update2/response" protocol="2.0">
  <app appid="{ext_id}">
    <updatecheck codebase="{crx_url}" version="{version}" />
  </app>
</gupdate>
"#
    )
}

/// Resolve a requested path under `repo_dir`, rejecting anything that
/// normalizes outside it (`..` traversal, absolute escapes, symlink
/// surprises are out of scope — this guards the lexical path only).
pub fn resolve_within_repo(repo_dir: &Path, requested: &str) -> Option<PathBuf> {
    let mut resolved = repo_dir.to_path_buf();
    for component in Path::new(requested.trim_start_matches('/')).components() {
        match component {
            std::path::Component::Normal(part) => resolved.push(part),
            std::path::Component::CurDir => {}
            _ => return None,
        }
    }
    resolved.starts_with(repo_dir).then_some(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_within_repo_rejects_parent_traversal() {
        let repo = Path::new("/var/lib/vw/extrepo");
        assert!(resolve_within_repo(repo, "../../etc/passwd").is_none());
    }

    #[test]
    fn resolve_within_repo_accepts_nested_path() {
        let repo = Path::new("/var/lib/vw/extrepo");
        let resolved = resolve_within_repo(repo, "aaa/aaa.crx").unwrap();
        assert_eq!(resolved, repo.join("aaa").join("aaa.crx"));
    }

    #[test]
    fn update_xml_embeds_appid_version_and_codebase() {
        let xml = update_xml("aaa", "1.2.3", "http://x/aaa/aaa.crx");
        assert!(xml.contains(r#"appid="aaa""#));
        assert!(xml.contains(r#"version="1.2.3""#));
        assert!(xml.contains(r#"codebase="http://x/aaa/aaa.crx""#));
    }
}
