//! Single-slot, edge-triggered wake signal used to suspend/resume the
//! worker thread running a child clock's body.
//!
//! spec.md §9 suggests replacing the conceptual busy-wait on
//! `ready_and_waiting` with a condition variable "guarding"
//! `ready_and_waiting" transitions; that's exactly what this type does,
//! with identical externally observable behavior to a raw spin-wait.

use std::sync::{Condvar, Mutex};

/// A boolean flag plus condvar: `signal()` sets the flag and wakes one
/// waiter, `wait_and_clear()` blocks until the flag is set, then clears it
/// (edge-triggered — a signal sent before anyone is waiting is latched,
/// not lost, matching `threading.Event` semantics in the original).
pub struct WaitSignal {
    state: Mutex<bool>,
    condvar: Condvar,
}

impl WaitSignal {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(false),
            condvar: Condvar::new(),
        }
    }

    pub fn signal(&self) {
        let mut set = self.state.lock().unwrap();
        *set = true;
        self.condvar.notify_one();
    }

    pub fn wait_and_clear(&self) {
        let mut set = self.state.lock().unwrap();
        while !*set {
            set = self.condvar.wait(set).unwrap();
        }
        *set = false;
    }
}

impl Default for WaitSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn wakes_a_waiting_thread() {
        let signal = Arc::new(WaitSignal::new());
        let waiter = signal.clone();
        let handle = thread::spawn(move || {
            waiter.wait_and_clear();
        });
        thread::sleep(Duration::from_millis(20));
        signal.signal();
        handle.join().unwrap();
    }

    #[test]
    fn latches_a_signal_sent_before_waiting() {
        let signal = WaitSignal::new();
        signal.signal();
        signal.wait_and_clear(); // must not block
    }
}
