//! Single-flight access token refresh.
//!
//! At most one refresh episode is in flight. Callers that hit a 401 while an
//! episode runs attach to it and receive its result, so N concurrent
//! rejections cost exactly one call to the refresh endpoint.

use crate::api::AuthApi;
use crate::error::RefreshFailed;
use credential_store::CredentialStore;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

type RefreshTask = Shared<BoxFuture<'static, Result<(), RefreshFailed>>>;

/// Hooks fired when an episode resolves.
pub trait RefreshListener: Send + Sync {
    /// A new access token was stored.
    fn on_refreshed(&self) {}

    /// Credentials were torn down after a failed refresh.
    fn on_session_expired(&self, _reason: &RefreshFailed) {}
}

struct Episode {
    id: u64,
    task: RefreshTask,
}

struct Inner {
    credentials: Arc<CredentialStore>,
    api: AuthApi,
    episode: Mutex<Option<Episode>>,
    next_id: AtomicU64,
    listener: RwLock<Option<Arc<dyn RefreshListener>>>,
}

/// Coordinates refresh episodes across concurrent requests.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

impl RefreshCoordinator {
    pub fn new(credentials: Arc<CredentialStore>, api: AuthApi) -> Self {
        Self {
            inner: Arc::new(Inner {
                credentials,
                api,
                episode: Mutex::new(None),
                next_id: AtomicU64::new(0),
                listener: RwLock::new(None),
            }),
        }
    }

    /// Register the hooks notified on refresh success and teardown.
    pub fn set_listener(&self, listener: Arc<dyn RefreshListener>) {
        *self.inner.listener.write() = Some(listener);
    }

    /// True while an episode is in flight.
    pub fn is_refreshing(&self) -> bool {
        self.inner.episode.lock().is_some()
    }

    /// Join the in-flight episode, or start one.
    pub async fn ensure_fresh_token(&self) -> Result<(), RefreshFailed> {
        self.ensure_fresh_token_after(None).await
    }

    /// Like [`ensure_fresh_token`](Self::ensure_fresh_token), for a request
    /// whose `rejected` access token got a 401.
    ///
    /// When no episode is in flight and the stored access token already
    /// differs from `rejected`, an earlier episode (or a new login) replaced
    /// it; succeed without calling the backend.
    pub async fn ensure_fresh_token_after(&self, rejected: Option<&str>) -> Result<(), RefreshFailed> {
        let task = {
            let mut slot = self.inner.episode.lock();
            match slot.as_ref() {
                Some(episode) => {
                    debug!(episode = episode.id, "Joining in-flight token refresh");
                    episode.task.clone()
                }
                None => {
                    if let Some(rejected) = rejected {
                        let current = self.inner.credentials.get().access_token;
                        if current.is_some() && current.as_deref() != Some(rejected) {
                            debug!("Access token already replaced, skipping refresh");
                            return Ok(());
                        }
                    }
                    let episode = self.start_episode();
                    let task = episode.task.clone();
                    *slot = Some(episode);
                    task
                }
            }
        };

        task.await
    }

    /// Tear the session down without a refresh attempt, e.g. when a request
    /// is rejected again right after a successful refresh.
    pub fn expire_session(&self, reason: RefreshFailed) {
        if let Err(e) = self.inner.credentials.clear() {
            warn!(error = %e, "Failed to clear credentials while expiring session");
        }
        info!(reason = %reason.reason, "Session expired");
        self.inner.notify_expired(&reason);
    }

    fn start_episode(&self) -> Episode {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let context = EpisodeContext {
            id,
            credentials: self.inner.credentials.clone(),
            api: self.inner.api.clone(),
            coordinator: Arc::downgrade(&self.inner),
        };

        let task = async move {
            let result = context.run().await;
            context.finish();
            result
        }
        .boxed()
        .shared();

        debug!(episode = id, "Starting token refresh");
        Episode { id, task }
    }
}

/// Everything an episode needs while it runs.
///
/// The task is parked in `Inner.episode`, so it only keeps a weak handle to
/// the coordinator; an episode abandoned by every caller must not keep the
/// coordinator alive.
struct EpisodeContext {
    id: u64,
    credentials: Arc<CredentialStore>,
    api: AuthApi,
    coordinator: Weak<Inner>,
}

impl EpisodeContext {
    async fn run(&self) -> Result<(), RefreshFailed> {
        let id = self.id;
        let Some(refresh_token) = self.credentials.get().refresh_token else {
            let failure = RefreshFailed::new("No refresh token available");
            self.teardown(None, &failure);
            return Err(failure);
        };

        let refreshed = match self.api.refresh(&refresh_token).await {
            Ok(refreshed) => refreshed,
            Err(e) => {
                warn!(episode = id, error = %e, "Token refresh failed");
                let failure = RefreshFailed::new(e.to_string());
                self.teardown(Some(&refresh_token), &failure);
                return Err(failure);
            }
        };

        match self.credentials.store_refreshed(
            &refresh_token,
            &refreshed.access,
            refreshed.refresh.as_deref(),
        ) {
            Ok(true) => {
                info!(episode = id, "Access token refreshed");
                if let Some(listener) = self.listener() {
                    listener.on_refreshed();
                }
                Ok(())
            }
            Ok(false) => Err(RefreshFailed::new("Session changed during refresh")),
            Err(e) => {
                warn!(episode = id, error = %e, "Failed to store refreshed token");
                let failure = RefreshFailed::new(format!("Could not store refreshed token: {}", e));
                self.teardown(Some(&refresh_token), &failure);
                Err(failure)
            }
        }
    }

    /// Clear credentials if they still belong to the failed episode.
    fn teardown(&self, used_refresh_token: Option<&str>, failure: &RefreshFailed) {
        match self.credentials.clear_if_refresh_token(used_refresh_token) {
            Ok(true) => {
                info!(reason = %failure.reason, "Session ended after failed token refresh");
                self.notify_expired(failure);
            }
            Ok(false) => {
                debug!("A newer session replaced the failed one, keeping it");
            }
            Err(e) => {
                warn!(error = %e, "Failed to clear credentials after failed refresh");
                self.notify_expired(failure);
            }
        }
    }

    fn finish(&self) {
        if let Some(inner) = self.coordinator.upgrade() {
            inner.finish_episode(self.id);
        }
    }

    fn notify_expired(&self, failure: &RefreshFailed) {
        if let Some(inner) = self.coordinator.upgrade() {
            inner.notify_expired(failure);
        }
    }

    fn listener(&self) -> Option<Arc<dyn RefreshListener>> {
        self.coordinator.upgrade().and_then(|inner| inner.listener())
    }
}

impl Inner {
    fn finish_episode(&self, id: u64) {
        let mut slot = self.episode.lock();
        if slot.as_ref().map(|episode| episode.id) == Some(id) {
            *slot = None;
        }
    }

    fn notify_expired(&self, failure: &RefreshFailed) {
        if let Some(listener) = self.listener() {
            listener.on_session_expired(failure);
        }
    }

    fn listener(&self) -> Option<Arc<dyn RefreshListener>> {
        self.listener.read().clone()
    }
}
