//! Event hooks fired as actions move through the pipeline.
//!
//! Hooks run synchronously on the pipeline's task but always outside the
//! queue lock. A hook that panics is reported through `tracing` and the
//! pipeline carries on.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracing::warn;

use crate::error::FailureReason;
use crate::tracked::TrackedAction;

/// Side-channel callbacks for observing or persisting in-flight work.
///
/// Every method defaults to a no-op, so implementors override only what
/// they need.
pub trait ActionHooks<D>: Send + Sync {
    /// An action was accepted into the queue.
    ///
    /// Fires before the action is queued. With several producers enqueueing
    /// at once, the order of `on_added` calls across producers may differ
    /// from queue order; within one `add_actions` call it matches.
    fn on_added(&self, _action: &TrackedAction<D>) {}

    /// An action is about to be submitted. Fires once per attempt.
    ///
    /// An attempt whose document fails to serialize is never submitted and
    /// does not fire `on_sent`; the action fails with its `try_count` still
    /// counting that attempt, so it ends one above its `on_sent` count.
    fn on_sent(&self, _action: &TrackedAction<D>) {}

    /// The service applied the action. Terminal.
    fn on_succeeded(&self, _action: &TrackedAction<D>) {}

    /// The action failed for good. Terminal.
    fn on_error(&self, _action: &TrackedAction<D>, _reason: &FailureReason) {}
}

/// Hooks that do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl<D> ActionHooks<D> for NoopHooks {}

/// Invokes registered hooks, containing any panic they raise.
pub(crate) struct HookDispatcher<D> {
    hooks: Arc<dyn ActionHooks<D>>,
}

impl<D> Clone for HookDispatcher<D> {
    fn clone(&self) -> Self {
        Self {
            hooks: self.hooks.clone(),
        }
    }
}

impl<D> HookDispatcher<D> {
    pub fn new(hooks: Arc<dyn ActionHooks<D>>) -> Self {
        Self { hooks }
    }

    pub fn added(&self, action: &TrackedAction<D>) {
        guarded("on_added", action.key(), || self.hooks.on_added(action));
    }

    pub fn sent(&self, action: &TrackedAction<D>) {
        guarded("on_sent", action.key(), || self.hooks.on_sent(action));
    }

    pub fn succeeded(&self, action: &TrackedAction<D>) {
        guarded("on_succeeded", action.key(), || self.hooks.on_succeeded(action));
    }

    pub fn error(&self, action: &TrackedAction<D>, reason: &FailureReason) {
        guarded("on_error", action.key(), || self.hooks.on_error(action, reason));
    }
}

fn guarded(hook: &'static str, key: &str, f: impl FnOnce()) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(f)) {
        warn!(
            hook = hook,
            key = %key,
            panic = %panic_message(panic.as_ref()),
            "Hook panicked; continuing"
        );
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use batcher_types::IndexAction;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHooks {
        sent: AtomicUsize,
    }

    impl ActionHooks<u32> for CountingHooks {
        fn on_sent(&self, _action: &TrackedAction<u32>) {
            self.sent.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct PanickingHooks;

    impl ActionHooks<u32> for PanickingHooks {
        fn on_added(&self, action: &TrackedAction<u32>) {
            panic!("hook failed for {}", action.key());
        }
    }

    fn action() -> TrackedAction<u32> {
        TrackedAction::new(IndexAction::upload(1), "k1".to_string())
    }

    #[test]
    fn test_default_methods_are_noops() {
        let dispatcher: HookDispatcher<u32> = HookDispatcher::new(Arc::new(NoopHooks));
        dispatcher.added(&action());
        dispatcher.sent(&action());
        dispatcher.succeeded(&action());
        dispatcher.error(&action(), &FailureReason::Unmatched);
    }

    #[test]
    fn test_dispatch_reaches_overridden_method() {
        let hooks = Arc::new(CountingHooks {
            sent: AtomicUsize::new(0),
        });
        let dispatcher = HookDispatcher::new(hooks.clone() as Arc<dyn ActionHooks<u32>>);
        dispatcher.sent(&action());
        dispatcher.sent(&action());
        assert_eq!(hooks.sent.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_panicking_hook_is_contained() {
        let dispatcher: HookDispatcher<u32> = HookDispatcher::new(Arc::new(PanickingHooks));
        dispatcher.added(&action());
        // Reaching this line means the panic did not escape.
        dispatcher.added(&action());
    }

    #[test]
    fn test_panic_message_extraction() {
        let panic = catch_unwind(|| panic!("boom")).unwrap_err();
        assert_eq!(panic_message(panic.as_ref()), "boom");

        let panic = catch_unwind(|| panic!("{}", String::from("owned"))).unwrap_err();
        assert_eq!(panic_message(panic.as_ref()), "owned");
    }
}
