//! Wall-clock watchdog.
//!
//! Armed once at startup for the configured number of seconds. If the
//! run has not disarmed it by then, some blocking call (most likely a
//! barrier waiting on a failed peer) is stuck, and the watchdog
//! forcibly terminates the whole process. There is no per-operation
//! timeout and no graceful cancellation; termination is abrupt by
//! design.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

/// Handle to the armed watchdog. Dropping it disarms, so holding it
/// for the run's duration and letting the binary end also works.
pub struct Watchdog {
    disarm: Option<mpsc::Sender<()>>,
}

impl Watchdog {
    /// Arm a watchdog firing after `timeout`. A zero timeout arms
    /// nothing, matching `alarm(0)` in the traditional runner.
    pub fn arm(timeout: Duration) -> Self {
        if timeout.is_zero() {
            return Self { disarm: None };
        }

        let (tx, rx) = mpsc::channel::<()>();
        thread::spawn(move || match rx.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => {
                eprintln!(
                    "!!! ERROR !!! plfsbench: no progress after {} secs, giving up",
                    timeout.as_secs()
                );
                tracing::error!(timeout_secs = timeout.as_secs(), "watchdog expired");
                std::process::exit(1);
            }
            // Disarmed (message or sender dropped)
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {}
        });

        Self { disarm: Some(tx) }
    }

    /// Disarm the watchdog. Safe to call after the run completed.
    pub fn disarm(self) {
        if let Some(tx) = &self.disarm {
            let _ = tx.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disarm_before_expiry() {
        let watchdog = Watchdog::arm(Duration::from_secs(3600));
        watchdog.disarm();
    }

    #[test]
    fn zero_timeout_never_arms() {
        let watchdog = Watchdog::arm(Duration::ZERO);
        watchdog.disarm();
    }

    #[test]
    fn drop_disarms() {
        let _ = Watchdog::arm(Duration::from_secs(3600));
        // Timer thread exits on sender disconnect.
    }
}
