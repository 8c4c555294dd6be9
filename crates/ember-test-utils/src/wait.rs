//! Polling helpers for asynchronous assertions.

use std::time::{Duration, Instant};

use ember_assets::AssetManager;

/// Poll `condition` until it holds or `timeout` elapses. Returns the last result.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
}

/// Like [`wait_until`], dispatching the manager's events between polls.
pub fn pump_until(
    manager: &AssetManager,
    timeout: Duration,
    mut condition: impl FnMut() -> bool,
) -> bool {
    wait_until(timeout, || {
        manager.dispatch_events();
        condition()
    })
}

/// Dispatch until no load, job or notification is outstanding.
pub fn settle(manager: &AssetManager, timeout: Duration) -> bool {
    pump_until(manager, timeout, || {
        manager.in_flight_count() == 0
            && manager.pending_job_count() == 0
            && manager.pending_event_count() == 0
            && manager.pending_release_count() == 0
    })
}
