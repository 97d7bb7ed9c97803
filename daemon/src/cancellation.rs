use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Maps a resource UID to the [`CancellationToken`] of its in-flight
/// download (§4.B, §8 "at most one Download context for U is registered").
/// The delete worker's first action is always a lookup here before touching
/// the filesystem.
#[derive(Clone, Default)]
pub struct CancellationRegistry {
    inner: Arc<Mutex<HashMap<String, CancellationToken>>>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new token for `uid`, cancelling and replacing any
    /// existing one (§4.D.1 step 2, `Download` branch). Returns the new
    /// token.
    pub async fn register(&self, uid: &str) -> CancellationToken {
        let mut guard = self.inner.lock().await;
        if let Some(existing) = guard.remove(uid) {
            existing.cancel();
        }
        let token = CancellationToken::new();
        guard.insert(uid.to_string(), token.clone());
        token
    }

    /// Returns the existing token for `uid` without replacing it, used by
    /// the `DownloadOverride` branch which must not disturb an in-flight
    /// download (§4.D.1 step 2).
    pub async fn existing(&self, uid: &str) -> Option<CancellationToken> {
        self.inner.lock().await.get(uid).cloned()
    }

    /// Cancels and removes the token for `uid`, if any. Called by the
    /// delete worker before it touches the filesystem (§4.B).
    pub async fn cancel(&self, uid: &str) {
        if let Some(token) = self.inner.lock().await.remove(uid) {
            token.cancel();
        }
    }

    /// Removes the token for `uid` without cancelling it, called once a
    /// download completes (successfully or not) so a stale entry doesn't
    /// linger.
    pub async fn complete(&self, uid: &str) {
        self.inner.lock().await.remove(uid);
    }

    /// Count of in-flight registrations, sampled periodically into the
    /// `inflight_tasks` gauge (§4.K).
    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_cancels_previous_token() {
        let registry = CancellationRegistry::new();
        let first = registry.register("uid-1").await;
        assert!(!first.is_cancelled());
        let _second = registry.register("uid-1").await;
        assert!(first.is_cancelled());
    }

    #[tokio::test]
    async fn existing_does_not_disturb_inflight_token() {
        let registry = CancellationRegistry::new();
        let token = registry.register("uid-1").await;
        let same = registry.existing("uid-1").await.unwrap();
        assert!(!token.is_cancelled());
        assert!(!same.is_cancelled());
    }

    #[tokio::test]
    async fn cancel_removes_and_cancels() {
        let registry = CancellationRegistry::new();
        let token = registry.register("uid-1").await;
        registry.cancel("uid-1").await;
        assert!(token.is_cancelled());
        assert!(registry.existing("uid-1").await.is_none());
    }

    #[tokio::test]
    async fn len_tracks_registrations() {
        let registry = CancellationRegistry::new();
        assert_eq!(registry.len().await, 0);
        registry.register("uid-1").await;
        registry.register("uid-2").await;
        assert_eq!(registry.len().await, 2);
        registry.complete("uid-1").await;
        assert_eq!(registry.len().await, 1);
    }
}
