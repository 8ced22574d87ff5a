//! Connectivity seam: a boolean "is connected" query.
//!
//! Change events are not part of this trait; platform bridges feed
//! reconnect/foreground transitions into the scheduler through its
//! [`SchedulerHandle`](crate::SchedulerHandle).

use std::sync::atomic::{AtomicBool, Ordering};

pub trait ConnectivityMonitor: Send + Sync {
    fn is_connected(&self) -> bool;
}

/// Settable connectivity flag for tests and simulations.
pub struct StaticConnectivity {
    connected: AtomicBool,
}

impl StaticConnectivity {
    pub fn new(connected: bool) -> Self {
        Self {
            connected: AtomicBool::new(connected),
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Relaxed);
    }
}

impl ConnectivityMonitor for StaticConnectivity {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}
