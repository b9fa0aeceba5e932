//! Keeps the shared window awake while it is being accessed.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::extension::Extension;

/// Reference count of in-progress access sequences.
///
/// The first [`PowerGuard`] wakes the window through the extension and the
/// last one to drop puts it back to sleep. When the extension does not need
/// wakeups the guards are inert.
pub struct PowerGate {
    ext: Arc<dyn Extension>,
    users: Mutex<usize>,
}

impl PowerGate {
    pub fn new(ext: Arc<dyn Extension>) -> Self {
        Self {
            ext,
            users: Mutex::new(0),
        }
    }

    /// Hold the window awake until the guard drops.
    pub fn acquire(&self) -> PowerGuard<'_> {
        if !self.ext.needs_wakeup() {
            return PowerGuard { gate: None };
        }
        let mut users = self.users.lock();
        if *users == 0 {
            trace!("power: wakeup");
            self.ext.wakeup();
        }
        *users += 1;
        PowerGuard { gate: Some(self) }
    }

    /// Guards currently held.
    pub fn users(&self) -> usize {
        *self.users.lock()
    }
}

#[must_use = "the window may sleep as soon as the guard is dropped"]
pub struct PowerGuard<'a> {
    gate: Option<&'a PowerGate>,
}

impl Drop for PowerGuard<'_> {
    fn drop(&mut self) {
        let Some(gate) = self.gate else { return };
        let mut users = gate.users.lock();
        *users -= 1;
        if *users == 0 {
            trace!("power: sleep");
            gate.ext.sleep();
        }
    }
}
