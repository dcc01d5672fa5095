//! Process-local bridge between the store and an external subscriber (a UI
//! push channel, out of scope here). At most one subscriber may register;
//! publishing is best-effort and never blocks the writer.

use crate::event::NetworkEvent;
use std::sync::{Arc, RwLock};

/// A subscriber's callback. Invoked after every successful append.
pub type PublishHook = Arc<dyn Fn(&NetworkEvent) + Send + Sync + 'static>;

#[derive(Default)]
pub struct EventPublisher {
    hook: RwLock<Option<PublishHook>>,
}

impl EventPublisher {
    pub fn new() -> Self {
        EventPublisher {
            hook: RwLock::new(None),
        }
    }

    /// Registers the subscriber, replacing any previous one — there is only
    /// ever one slot.
    pub fn subscribe(&self, hook: PublishHook) {
        *self.hook.write().unwrap() = Some(hook);
    }

    pub fn unsubscribe(&self) {
        *self.hook.write().unwrap() = None;
    }

    pub fn is_subscribed(&self) -> bool {
        self.hook.read().unwrap().is_some()
    }

    /// Calls the subscriber, if any. Never propagates a panic from the
    /// subscriber's closure into the writer's call stack.
    pub fn publish(&self, event: &NetworkEvent) {
        if let Some(hook) = self.hook.read().unwrap().as_ref() {
            let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| hook(event)));
        }
    }
}

impl std::fmt::Debug for EventPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventPublisher")
            .field("subscribed", &self.is_subscribed())
            .finish()
    }
}
