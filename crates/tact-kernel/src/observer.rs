//! Scheduler observation hooks.
//!
//! Hooks fire on the scheduler thread in registration order. A hook
//! must not register further hooks; the registry lock is held while it
//! runs.

use std::sync::Mutex;

use smallvec::SmallVec;

type Hook = Box<dyn FnMut() + Send>;

/// Hook lists for the two scheduler notification points.
pub(crate) struct Registry {
    delta: Mutex<SmallVec<[Hook; 4]>>,
    time_step: Mutex<SmallVec<[Hook; 4]>>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            delta: Mutex::new(SmallVec::new()),
            time_step: Mutex::new(SmallVec::new()),
        }
    }

    pub(crate) fn on_delta(&self, hook: Hook) {
        self.delta.lock().unwrap().push(hook);
    }

    pub(crate) fn on_time_step(&self, hook: Hook) {
        self.time_step.lock().unwrap().push(hook);
    }

    /// Fires after every delta cycle that dispatched at least one wake.
    pub(crate) fn fire_delta(&self) {
        for hook in self.delta.lock().unwrap().iter_mut() {
            hook();
        }
    }

    /// Fires after every advance of the simulated clock.
    pub(crate) fn fire_time_step(&self) {
        for hook in self.time_step.lock().unwrap().iter_mut() {
            hook();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;

    #[test]
    fn hooks_fire_in_registration_order() {
        let registry = Registry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        for id in 0..3 {
            let log = Arc::clone(&log);
            registry.on_delta(Box::new(move || log.lock().unwrap().push(id)));
        }
        registry.fire_delta();
        registry.fire_delta();
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2, 0, 1, 2]);
    }

    #[test]
    fn lists_are_independent() {
        let registry = Registry::new();
        let deltas = Arc::new(AtomicU32::new(0));
        let steps = Arc::new(AtomicU32::new(0));
        let d = Arc::clone(&deltas);
        registry.on_delta(Box::new(move || {
            d.fetch_add(1, Ordering::Relaxed);
        }));
        let s = Arc::clone(&steps);
        registry.on_time_step(Box::new(move || {
            s.fetch_add(1, Ordering::Relaxed);
        }));
        registry.fire_time_step();
        registry.fire_time_step();
        registry.fire_delta();
        assert_eq!(deltas.load(Ordering::Relaxed), 1);
        assert_eq!(steps.load(Ordering::Relaxed), 2);
    }
}
