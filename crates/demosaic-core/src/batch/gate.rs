use std::sync::{Condvar, Mutex};

/// Counting gate bounding concurrent file reads or writes across all
/// batch workers, so a wide batch does not thrash the disk.
pub struct Gate {
    slots: Mutex<usize>,
    available: Condvar,
}

impl Gate {
    pub fn new(limit: usize) -> Self {
        Self {
            slots: Mutex::new(limit.max(1)),
            available: Condvar::new(),
        }
    }

    /// Take a slot, blocking until one is free. The slot is returned
    /// when the guard drops.
    pub fn acquire(&self) -> GateGuard<'_> {
        let mut slots = self.slots.lock().expect("gate mutex poisoned");
        while *slots == 0 {
            slots = self.available.wait(slots).expect("gate mutex poisoned");
        }
        *slots -= 1;
        GateGuard { gate: self }
    }
}

pub struct GateGuard<'a> {
    gate: &'a Gate,
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        let mut slots = self.gate.slots.lock().expect("gate mutex poisoned");
        *slots += 1;
        self.gate.available.notify_one();
    }
}
