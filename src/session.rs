use chrono::{DateTime, Utc};
use std::{
    fmt,
    sync::{Arc, PoisonError, RwLock},
};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::{SmartThingsError, SmartThingsResult};

/// Authenticated access to one SmartThings account.
///
/// Cloning is cheap and every clone refers to the same session. All calls made
/// through a session carry its bearer token, and closing the session cancels
/// requests that are still in flight.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    account: String,
    location_id: Option<String>,
    token: RwLock<String>,
    created_at: DateTime<Utc>,
    sync_lock: Arc<Mutex<()>>,
    cancel: CancellationToken,
}

/// Held for the duration of a sync. At most one exists per session.
pub struct SyncGuard {
    _guard: OwnedMutexGuard<()>,
}

impl Session {
    pub fn new(account: impl Into<String>, token: impl Into<String>) -> Self {
        Self::build(account.into(), token.into(), None)
    }

    /// A session restricted to the devices of one location.
    pub fn for_location(
        account: impl Into<String>,
        token: impl Into<String>,
        location_id: impl Into<String>,
    ) -> Self {
        Self::build(account.into(), token.into(), Some(location_id.into()))
    }

    fn build(account: String, token: String, location_id: Option<String>) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                account,
                location_id,
                token: RwLock::new(token),
                created_at: Utc::now(),
                sync_lock: Arc::new(Mutex::new(())),
                cancel: CancellationToken::new(),
            }),
        }
    }

    pub fn account(&self) -> &str {
        &self.inner.account
    }

    pub fn location_id(&self) -> Option<&str> {
        self.inner.location_id.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.inner.created_at
    }

    pub fn token(&self) -> String {
        self.inner
            .token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the bearer token after the host reauthenticated.
    pub fn set_token(&self, token: impl Into<String>) {
        *self
            .inner
            .token
            .write()
            .unwrap_or_else(PoisonError::into_inner) = token.into();
    }

    /// Wait for any running sync of this session to finish and claim the
    /// sync slot.
    pub async fn begin_sync(&self) -> SmartThingsResult<SyncGuard> {
        self.ensure_open()?;
        let guard = tokio::select! {
            guard = self.inner.sync_lock.clone().lock_owned() => guard,
            _ = self.inner.cancel.cancelled() => return Err(SmartThingsError::SessionClosed),
        };
        Ok(SyncGuard { _guard: guard })
    }

    /// Claim the sync slot if no sync is running.
    pub fn try_begin_sync(&self) -> Option<SyncGuard> {
        if self.is_closed() {
            return None;
        }
        self.inner
            .sync_lock
            .clone()
            .try_lock_owned()
            .ok()
            .map(|guard| SyncGuard { _guard: guard })
    }

    pub fn is_syncing(&self) -> bool {
        self.inner.sync_lock.try_lock().is_err()
    }

    /// Close the session. Pending and future requests fail with
    /// `SessionClosed`.
    pub fn close(&self) {
        log::debug!("Closing session for account [{}]", self.inner.account);
        self.inner.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    pub fn ensure_open(&self) -> SmartThingsResult<()> {
        if self.is_closed() {
            Err(SmartThingsError::SessionClosed)
        } else {
            Ok(())
        }
    }

    /// Resolves once the session is closed.
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.inner.cancel.cancelled()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("account", &self.inner.account)
            .field("location_id", &self.inner.location_id)
            .field("created_at", &self.inner.created_at)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_single_sync_slot() {
        let session = Session::new("acc", "token");
        let guard = session.begin_sync().await.unwrap();
        assert!(session.is_syncing());
        assert!(session.clone().try_begin_sync().is_none());
        drop(guard);
        assert!(session.try_begin_sync().is_some());
    }

    #[tokio::test]
    async fn test_close_cancels_waiting_sync() {
        let session = Session::new("acc", "token");
        let _guard = session.begin_sync().await.unwrap();
        let waiter = {
            let session = session.clone();
            tokio::spawn(async move { session.begin_sync().await.map(|_| ()) })
        };
        session.close();
        assert!(matches!(
            waiter.await.unwrap(),
            Err(SmartThingsError::SessionClosed)
        ));
        assert!(session.try_begin_sync().is_none());
    }

    #[test]
    fn test_token_is_shared_and_hidden() {
        let session = Session::new("acc", "old");
        session.clone().set_token("new");
        assert_eq!(session.token(), "new");
        assert!(!format!("{:?}", session).contains("new"));
    }
}
