//! Transition hooks for circuit breakers

use crate::circuit::CircuitState;
use std::sync::Arc;

type Hook = Arc<dyn Fn(&str) + Send + Sync>;
type TransitionHook = Arc<dyn Fn(&Transition<'_>) + Send + Sync>;

/// A single state change, handed to `on_transition` hooks
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition<'a> {
    pub circuit: &'a str,
    pub from: CircuitState,
    pub to: CircuitState,
    /// Breaker clock time of the change, in seconds
    pub at: f64,
}

/// User hooks fired after a transition has been applied
///
/// Hooks run after the breaker's lock is released, so they may inspect the
/// breaker (or a registry holding it). Concurrent transitions can reach the
/// hooks in a different order than they were applied.
#[derive(Clone, Default)]
pub struct Callbacks {
    pub on_open: Option<Hook>,
    pub on_close: Option<Hook>,
    pub on_half_open: Option<Hook>,
    pub on_transition: Vec<TransitionHook>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn notify(&self, transition: &Transition<'_>) {
        let hook = match transition.to {
            CircuitState::Open => &self.on_open,
            CircuitState::Closed => &self.on_close,
            CircuitState::HalfOpen => &self.on_half_open,
        };
        if let Some(hook) = hook {
            hook(transition.circuit);
        }
        for hook in &self.on_transition {
            hook(transition);
        }
    }
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_open", &self.on_open.is_some())
            .field("on_close", &self.on_close.is_some())
            .field("on_half_open", &self.on_half_open.is_some())
            .field("on_transition", &self.on_transition.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_notify_dispatches_by_target_state() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let opened = seen.clone();
        let closed = seen.clone();

        let callbacks = Callbacks {
            on_open: Some(Arc::new(move |name: &str| {
                opened.lock().unwrap().push(format!("open:{name}"))
            })),
            on_close: Some(Arc::new(move |name: &str| {
                closed.lock().unwrap().push(format!("close:{name}"))
            })),
            ..Callbacks::new()
        };

        callbacks.notify(&Transition {
            circuit: "db",
            from: CircuitState::Closed,
            to: CircuitState::Open,
            at: 1.0,
        });
        callbacks.notify(&Transition {
            circuit: "db",
            from: CircuitState::Open,
            to: CircuitState::HalfOpen,
            at: 2.0,
        });
        callbacks.notify(&Transition {
            circuit: "db",
            from: CircuitState::HalfOpen,
            to: CircuitState::Closed,
            at: 3.0,
        });

        assert_eq!(*seen.lock().unwrap(), vec!["open:db", "close:db"]);
    }

    #[test]
    fn test_transition_hooks_see_every_change() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        let mut callbacks = Callbacks::new();
        callbacks.on_transition.push(Arc::new(move |t: &Transition<'_>| {
            sink.lock().unwrap().push((t.from, t.to));
        }));

        callbacks.notify(&Transition {
            circuit: "db",
            from: CircuitState::Closed,
            to: CircuitState::Open,
            at: 0.5,
        });

        assert_eq!(
            *seen.lock().unwrap(),
            vec![(CircuitState::Closed, CircuitState::Open)]
        );
    }
}
