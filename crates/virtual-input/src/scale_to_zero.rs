//! Scale-to-zero coordination (spec §4.2, "Scale-to-zero coordination").

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

/// Something that can pause/resume whatever external scale-to-zero mechanism
/// keeps this host alive while no pipeline is running.
#[async_trait]
pub trait ScaleToZeroController: Send + Sync {
    async fn disable(&self);
    async fn enable(&self);
}

/// Controller that does nothing, for deployments without scale-to-zero.
#[derive(Debug, Default)]
pub struct NoopController;

#[async_trait]
impl ScaleToZeroController for NoopController {
    async fn disable(&self) {}
    async fn enable(&self) {}
}

/// Controller used by tests to assert disable/enable call counts.
#[derive(Debug, Default)]
pub struct CountingController {
    pub disables: std::sync::atomic::AtomicUsize,
    pub enables: std::sync::atomic::AtomicUsize,
}

#[async_trait]
impl ScaleToZeroController for CountingController {
    async fn disable(&self) {
        self.disables.fetch_add(1, Ordering::SeqCst);
    }
    async fn enable(&self) {
        self.enables.fetch_add(1, Ordering::SeqCst);
    }
}

/// Wraps a controller with an idempotent "armed" token: `disable` arms it,
/// and `enable_once` only calls through the first time it's invoked after
/// arming, no matter which code path (normal stop, child-death watcher,
/// error path) gets there first.
pub struct ScaleToZeroGuard {
    controller: Arc<dyn ScaleToZeroController>,
    armed: AtomicBool,
}

impl ScaleToZeroGuard {
    pub fn new(controller: Arc<dyn ScaleToZeroController>) -> Self {
        Self { controller, armed: AtomicBool::new(false) }
    }

    pub async fn disable(&self) {
        self.controller.disable().await;
        self.armed.store(true, Ordering::SeqCst);
    }

    pub async fn enable_once(&self) {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.controller.enable().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn enable_once_fires_a_single_time() {
        let counting = Arc::new(CountingController::default());
        let guard = ScaleToZeroGuard::new(counting.clone());

        guard.disable().await;
        guard.enable_once().await;
        guard.enable_once().await;
        guard.enable_once().await;

        assert_eq!(counting.disables.load(Ordering::SeqCst), 1);
        assert_eq!(counting.enables.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn enable_without_disable_is_a_noop() {
        let counting = Arc::new(CountingController::default());
        let guard = ScaleToZeroGuard::new(counting.clone());

        guard.enable_once().await;

        assert_eq!(counting.enables.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn re_arming_allows_another_enable() {
        let counting = Arc::new(CountingController::default());
        let guard = ScaleToZeroGuard::new(counting.clone());

        guard.disable().await;
        guard.enable_once().await;
        guard.disable().await;
        guard.enable_once().await;

        assert_eq!(counting.disables.load(Ordering::SeqCst), 2);
        assert_eq!(counting.enables.load(Ordering::SeqCst), 2);
    }
}
