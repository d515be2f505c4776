//! Acquire extension source material: either a GitHub repository (resolved
//! to a codeload zip with a branch fallback chain) or an uploaded archive
//! (spec §4.4 step 1).

use std::io::Read;
use std::path::{Path, PathBuf};

use vw_protocol::extension::ExtensionSource;

use crate::error::{InstallError, Result};
use crate::manifest::find_extension_root;

/// Branches tried, in order, after the caller's requested branch (if any).
const FALLBACK_BRANCHES: &[&str] = &["main", "master", "HEAD"];

/// Download and unzip a GitHub repository into `work_dir`, trying the
/// requested branch then the fallback chain, and return the resolved
/// extension root directory.
pub async fn acquire_github(client: &reqwest::Client, url: &str, branch: Option<&str>, work_dir: &Path) -> Result<PathBuf> {
    let (owner_repo, _) = parse_github_url(url)?;

    let mut candidates: Vec<String> = Vec::new();
    if let Some(b) = branch {
        candidates.push(b.to_string());
    }
    for fallback in FALLBACK_BRANCHES {
        if !candidates.iter().any(|c| c == fallback) {
            candidates.push((*fallback).to_string());
        }
    }

    let mut last_error = None;
    for candidate in &candidates {
        let codeload_url = format!("https://codeload.github.com/{owner_repo}/zip/refs/heads/{candidate}");
        match client.get(&codeload_url).send().await {
            Ok(resp) if resp.status().is_success() => {
                let bytes = resp.bytes().await?;
                std::fs::create_dir_all(work_dir)?;
                extract_zip(&bytes, work_dir)?;
                return find_extension_root(work_dir);
            }
            Ok(resp) => {
                last_error = Some(format!("{candidate}: HTTP {}", resp.status()));
            }
            Err(e) => {
                last_error = Some(format!("{candidate}: {e}"));
            }
        }
    }

    Err(InstallError::InvalidSource(format!(
        "could not resolve any branch for {url} (tried {candidates:?}): {}",
        last_error.unwrap_or_default()
    )))
}

/// Unzip an uploaded archive into `work_dir` and return the resolved
/// extension root directory.
pub fn acquire_upload(archive_bytes: &[u8], work_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(work_dir)?;
    extract_zip(archive_bytes, work_dir)?;
    find_extension_root(work_dir)
}

fn extract_zip(bytes: &[u8], dest: &Path) -> Result<()> {
    let cursor = std::io::Cursor::new(bytes);
    let mut archive = zip::ZipArchive::new(cursor)?;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let Some(relative) = entry.enclosed_name() else {
            continue;
        };
        let out_path = dest.join(relative);
        if entry.is_dir() {
            std::fs::create_dir_all(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out_file = std::fs::File::create(&out_path)?;
        let mut buf = Vec::new();
        entry.read_to_end(&mut buf)?;
        std::io::Write::write_all(&mut out_file, &buf)?;
    }
    Ok(())
}

fn parse_github_url(url: &str) -> Result<(String, String)> {
    let trimmed = url
        .trim_end_matches('/')
        .trim_end_matches(".git")
        .trim_start_matches("https://github.com/")
        .trim_start_matches("http://github.com/")
        .trim_start_matches("git@github.com:");

    let mut parts = trimmed.splitn(2, '/');
    let owner = parts.next().filter(|s| !s.is_empty());
    let repo = parts.next().filter(|s| !s.is_empty());

    match (owner, repo) {
        (Some(owner), Some(repo)) => Ok((format!("{owner}/{repo}"), url.to_string())),
        _ => Err(InstallError::InvalidSource(format!("not a recognizable GitHub URL: {url}"))),
    }
}

/// Build the `ExtensionSource` for a GitHub install request.
pub fn github_source(url: String, branch: Option<String>) -> ExtensionSource {
    ExtensionSource::GitHub { url, branch }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_github_url_extracts_owner_repo() {
        let (owner_repo, _) = parse_github_url("https://github.com/example/my-ext").unwrap();
        assert_eq!(owner_repo, "example/my-ext");
    }

    #[test]
    fn parse_github_url_strips_dot_git_suffix() {
        let (owner_repo, _) = parse_github_url("https://github.com/example/my-ext.git").unwrap();
        assert_eq!(owner_repo, "example/my-ext");
    }

    #[test]
    fn parse_github_url_rejects_bare_host() {
        assert!(parse_github_url("https://github.com/").is_err());
    }
}
