use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::CacheError;
use crate::request::ComRequest;

pub type ListenerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Observer callback: receives the user whose cache changed and a snapshot
/// of that user's requests after the change.
pub type SharedListener = Arc<dyn Fn(&str, &[ComRequest]) -> ListenerResult + Send + Sync>;

/// Wraps a closure into a [`SharedListener`]. Keep the returned `Arc` around
/// if you intend to remove the listener by reference later.
pub fn listener<F>(f: F) -> SharedListener
where
    F: Fn(&str, &[ComRequest]) -> ListenerResult + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Token handed out by `add_listener`, used to deregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// Outcome of one fan-out round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotifyReport {
    pub invoked: usize,
    pub failed: Vec<ListenerId>,
}

impl NotifyReport {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Default)]
pub(crate) struct ListenerRegistry {
    next_id: u64,
    // registration order is the invocation order
    entries: Vec<(ListenerId, SharedListener)>,
}

fn same_listener(a: &SharedListener, b: &SharedListener) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

impl ListenerRegistry {
    pub(crate) fn add(&mut self, listener: SharedListener) -> ListenerId {
        if let Some((id, _)) = self
            .entries
            .iter()
            .find(|(_, existing)| same_listener(existing, &listener))
        {
            debug!(listener = %id, "listener already registered");
            return *id;
        }
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, listener));
        id
    }

    pub(crate) fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(existing, _)| *existing != id);
        self.entries.len() != before
    }

    pub(crate) fn remove_by_ref(&mut self, listener: &SharedListener) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(_, existing)| !same_listener(existing, listener));
        self.entries.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Invokes every listener with the same snapshot. Failures (an `Err`
    /// return or a panic) are logged and recorded, never propagated.
    pub(crate) fn dispatch(&self, user_id: &str, requests: &[ComRequest]) -> NotifyReport {
        debug!(
            user_id = %user_id,
            listeners = self.entries.len(),
            requests = requests.len(),
            "notifying listeners"
        );
        let mut report = NotifyReport::default();
        for (id, listener) in &self.entries {
            report.invoked += 1;
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| listener(user_id, requests)));
            let reason = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => err.to_string(),
                Err(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
            };
            let failure = CacheError::ObserverFailure {
                listener: *id,
                user_id: user_id.to_owned(),
                reason,
            };
            warn!(
                listener = %id,
                user_id = %user_id,
                error = %failure,
                "listener failed, continuing fan-out"
            );
            report.failed.push(*id);
        }
        report
    }
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("next_id", &self.next_id)
            .field(
                "listeners",
                &self.entries.iter().map(|(id, _)| *id).collect::<Vec<_>>(),
            )
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
