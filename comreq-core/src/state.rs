use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::CacheError;
use crate::listener::{ListenerId, ListenerRegistry, NotifyReport, SharedListener};
use crate::request::{ComRequest, RequestId};

// comreq_id -> record, for a single user
type UserRequestCache = BTreeMap<RequestId, ComRequest>;

static SHARED: OnceCell<RequestStateService> = OnceCell::new();

/// Per-user request cache with synchronous change notification.
///
/// Cloning is cheap and every clone shares the same store and listeners, so
/// the application builds one instance at startup and hands clones to the
/// components that need it.
///
/// `update_data` notifies listeners; `set_initial_data` deliberately does not,
/// since hydration is a bulk load rather than an incremental change.
#[derive(Debug, Clone, Default)]
pub struct RequestStateService {
    // lock order: store, then listeners
    store: Arc<RwLock<HashMap<String, UserRequestCache>>>,
    listeners: Arc<RwLock<ListenerRegistry>>,
}

fn check_user_id(user_id: &str) -> Result<(), CacheError> {
    if user_id.trim().is_empty() {
        return Err(CacheError::invalid("user_id", "user id is empty"));
    }
    Ok(())
}

impl RequestStateService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide instance. The first call constructs it; later calls get
    /// the same instance back with its state intact.
    pub fn shared() -> &'static RequestStateService {
        SHARED.get_or_init(|| {
            info!("initialising shared request state service");
            Self::new()
        })
    }

    /// True when both handles point at the same underlying state.
    pub fn same_instance(&self, other: &RequestStateService) -> bool {
        Arc::ptr_eq(&self.store, &other.store) && Arc::ptr_eq(&self.listeners, &other.listeners)
    }

    /// Inserts or overwrites one record, then notifies every listener with the
    /// user's post-write snapshot before returning.
    pub async fn update_data(&self, user_id: &str, request: ComRequest) -> Result<(), CacheError> {
        check_user_id(user_id)?;
        request.validate()?;

        let mut store = self.store.write().await;
        let cache = store.entry(user_id.to_owned()).or_default();
        debug!(user_id = %user_id, comreq_id = %request.comreq_id, "caching request");
        cache.insert(request.comreq_id.clone(), request);

        // Holding the write guard through the fan-out keeps each user's
        // notifications in write order.
        let snapshot = snapshot_of(store.get(user_id));
        let listeners = self.listeners.read().await;
        listeners.dispatch(user_id, &snapshot);
        Ok(())
    }

    /// Owned snapshot of the user's requests, ordered by id. Unknown users
    /// yield an empty list.
    pub async fn get_user_requests(&self, user_id: &str) -> Vec<ComRequest> {
        let store = self.store.read().await;
        snapshot_of(store.get(user_id))
    }

    /// Replaces the user's whole cache. Every record is validated first, so
    /// a bad batch leaves the previous cache in place. Listeners are not
    /// notified.
    pub async fn set_initial_data(
        &self,
        user_id: &str,
        requests: Vec<ComRequest>,
    ) -> Result<(), CacheError> {
        check_user_id(user_id)?;
        for request in &requests {
            request.validate()?;
        }

        let received = requests.len();
        let cache: UserRequestCache = requests
            .into_iter()
            .map(|request| (request.comreq_id.clone(), request))
            .collect();
        debug!(user_id = %user_id, received, cached = cache.len(), "hydrating user cache");

        let mut store = self.store.write().await;
        store.insert(user_id.to_owned(), cache);
        Ok(())
    }

    /// Drops a user's cache entirely. Does not notify; returns whether the
    /// user had an entry.
    pub async fn clear_user(&self, user_id: &str) -> bool {
        let mut store = self.store.write().await;
        store.remove(user_id).is_some()
    }

    pub async fn add_listener(&self, listener: SharedListener) -> ListenerId {
        let mut listeners = self.listeners.write().await;
        let id = listeners.add(listener);
        debug!(listener = %id, total = listeners.len(), "listener registered");
        id
    }

    /// Returns false when the token was unknown or already removed.
    pub async fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write().await;
        let removed = listeners.remove(id);
        if removed {
            debug!(listener = %id, "listener removed");
        }
        removed
    }

    pub async fn remove_listener_by_ref(&self, listener: &SharedListener) -> bool {
        self.listeners.write().await.remove_by_ref(listener)
    }

    pub async fn listener_count(&self) -> usize {
        self.listeners.read().await.len()
    }

    /// Pushes the user's current snapshot to every listener. Listener
    /// failures are logged and reported, never returned as errors.
    pub async fn notify_listeners(&self, user_id: &str) -> NotifyReport {
        let store = self.store.read().await;
        let snapshot = snapshot_of(store.get(user_id));
        let listeners = self.listeners.read().await;
        listeners.dispatch(user_id, &snapshot)
    }

    pub async fn user_ids(&self) -> Vec<String> {
        let store = self.store.read().await;
        let mut ids: Vec<String> = store.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn request_count(&self, user_id: &str) -> usize {
        let store = self.store.read().await;
        store.get(user_id).map(|cache| cache.len()).unwrap_or(0)
    }
}

fn snapshot_of(cache: Option<&UserRequestCache>) -> Vec<ComRequest> {
    cache
        .map(|cache| cache.values().cloned().collect())
        .unwrap_or_default()
}
