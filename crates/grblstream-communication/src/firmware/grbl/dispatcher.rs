//! Message fan-out to registered observers
//!
//! Observers run synchronously on the pump, in registration order. An
//! observer that fails or panics is logged and skipped; the remaining
//! observers still see the message.

use super::messages::Message;
use parking_lot::RwLock;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use uuid::Uuid;

/// Callback invoked for every classified message
///
/// `C` is the context handed back to the observer, typically the link the
/// message arrived on, so observers can enqueue follow-up commands.
pub type Observer<C> = Arc<dyn Fn(&Message, &C) -> anyhow::Result<()> + Send + Sync>;

/// Handle returned by registration, used to unregister
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverHandle(Uuid);

impl ObserverHandle {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ObserverHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ordered observer registry
pub struct MessageDispatcher<C> {
    observers: RwLock<Vec<(ObserverHandle, Observer<C>)>>,
}

impl<C> Default for MessageDispatcher<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for MessageDispatcher<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageDispatcher")
            .field("observers", &self.len())
            .finish()
    }
}

impl<C> MessageDispatcher<C> {
    /// Create an empty dispatcher
    pub fn new() -> Self {
        Self {
            observers: RwLock::new(Vec::new()),
        }
    }

    /// Append an observer; it sees every message dispatched after this call
    pub fn register<F>(&self, observer: F) -> ObserverHandle
    where
        F: Fn(&Message, &C) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let handle = ObserverHandle::new();
        let observer: Observer<C> = Arc::new(observer);
        self.observers.write().push((handle, observer));
        handle
    }

    /// Remove an observer. Returns `false` if the handle was unknown.
    pub fn unregister(&self, handle: ObserverHandle) -> bool {
        let mut observers = self.observers.write();
        let before = observers.len();
        observers.retain(|(h, _)| *h != handle);
        observers.len() != before
    }

    /// Number of registered observers
    pub fn len(&self) -> usize {
        self.observers.read().len()
    }

    /// Check if no observers are registered
    pub fn is_empty(&self) -> bool {
        self.observers.read().is_empty()
    }

    /// Deliver a message to every observer
    ///
    /// The registry is snapshotted first, so observers may register,
    /// unregister or enqueue from inside the callback. Returns how many
    /// observers completed without error.
    pub fn dispatch(&self, message: &Message, context: &C) -> usize {
        let snapshot: Vec<(ObserverHandle, Observer<C>)> = self.observers.read().clone();
        let mut delivered = 0;

        for (handle, observer) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| observer(message, context))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    tracing::warn!("Observer {} failed on {}: {:#}", handle, message, e);
                }
                Err(panic) => {
                    tracing::warn!(
                        "Observer {} panicked on {}: {}",
                        handle,
                        message,
                        panic_reason(panic.as_ref())
                    );
                }
            }
        }

        delivered
    }
}

pub(crate) fn panic_reason(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firmware::grbl::messages::Response;
    use parking_lot::Mutex;

    fn ok() -> Message {
        Message::Response(Response::Ok)
    }

    #[test]
    fn test_registration_order() {
        let dispatcher: MessageDispatcher<()> = MessageDispatcher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["a", "b", "c"] {
            let seen = seen.clone();
            dispatcher.register(move |_, _| {
                seen.lock().push(tag);
                Ok(())
            });
        }

        assert_eq!(dispatcher.dispatch(&ok(), &()), 3);
        assert_eq!(*seen.lock(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_unregister() {
        let dispatcher: MessageDispatcher<()> = MessageDispatcher::new();
        let handle = dispatcher.register(|_, _| Ok(()));
        assert_eq!(dispatcher.len(), 1);

        assert!(dispatcher.unregister(handle));
        assert!(!dispatcher.unregister(handle));
        assert!(dispatcher.is_empty());
        assert_eq!(dispatcher.dispatch(&ok(), &()), 0);
    }

    #[test]
    fn test_failing_observers_are_isolated() {
        let dispatcher: MessageDispatcher<()> = MessageDispatcher::new();
        let count = Arc::new(Mutex::new(0));

        dispatcher.register(|_, _| anyhow::bail!("refused"));
        dispatcher.register(|_, _| panic!("observer blew up"));
        let c = count.clone();
        dispatcher.register(move |_, _| {
            *c.lock() += 1;
            Ok(())
        });

        assert_eq!(dispatcher.dispatch(&ok(), &()), 1);
        assert_eq!(dispatcher.dispatch(&ok(), &()), 1);
        assert_eq!(*count.lock(), 2);
    }

    #[test]
    fn test_observer_can_register_during_dispatch() {
        let dispatcher: Arc<MessageDispatcher<()>> = Arc::new(MessageDispatcher::new());
        let inner = dispatcher.clone();
        dispatcher.register(move |_, _| {
            inner.register(|_, _| Ok(()));
            Ok(())
        });

        assert_eq!(dispatcher.dispatch(&ok(), &()), 1);
        assert_eq!(dispatcher.len(), 2);
    }

    #[test]
    fn test_panic_reason() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_reason(payload.as_ref()), "boom");
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_reason(payload.as_ref()), "bang");
        let payload: Box<dyn std::any::Any + Send> = Box::new(7u32);
        assert_eq!(panic_reason(payload.as_ref()), "unknown panic");
    }
}
