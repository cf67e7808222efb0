//! Lifecycle notification port.
//!
//! [`LifecycleNotifier`] is an **output port**: the agent loop emits a
//! [`LifecycleEvent`] at each milestone and a transport layer (CLI printer,
//! JSONL event log, ...) relays it.
//!
//! This is separate from `tracing`-based operation logs: tracing carries
//! human-readable diagnostics, events are the machine-readable channel.

use taskpilot_domain::LifecycleEvent;

/// All methods have default no-op implementations.
pub trait LifecycleNotifier: Send + Sync {
    fn notify(&self, _event: &LifecycleEvent) {}
}

/// No-op implementation for tests and when nobody listens.
pub struct NoLifecycleNotifier;

impl LifecycleNotifier for NoLifecycleNotifier {}

/// A notifier that delegates to multiple inner notifiers.
#[derive(Default)]
pub struct CompositeNotifier {
    delegates: Vec<std::sync::Arc<dyn LifecycleNotifier>>,
}

impl CompositeNotifier {
    pub fn new(delegates: Vec<std::sync::Arc<dyn LifecycleNotifier>>) -> Self {
        Self { delegates }
    }

    pub fn push(&mut self, delegate: std::sync::Arc<dyn LifecycleNotifier>) {
        self.delegates.push(delegate);
    }
}

impl LifecycleNotifier for CompositeNotifier {
    fn notify(&self, event: &LifecycleEvent) {
        for d in &self.delegates {
            d.notify(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use taskpilot_domain::TaskId;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<&'static str>>);

    impl LifecycleNotifier for Recorder {
        fn notify(&self, event: &LifecycleEvent) {
            self.0.lock().push(event.event_type());
        }
    }

    #[test]
    fn test_composite_fans_out() {
        let a = Arc::new(Recorder::default());
        let b = Arc::new(Recorder::default());
        let composite = CompositeNotifier::new(vec![a.clone(), b.clone()]);
        composite.notify(&LifecycleEvent::TaskStarted {
            task_id: TaskId::new("t"),
            description: "x".to_string(),
        });
        assert_eq!(*a.0.lock(), vec!["taskStarted"]);
        assert_eq!(*b.0.lock(), vec!["taskStarted"]);
    }
}
