//! Turns termination signals into a flag the run loop polls, so an
//! interrupted run still puts `level.dat` and the region folders back.

use crate::error::ExploreError;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

#[cfg(unix)]
use signal_hook::consts::SIGHUP;
use signal_hook::consts::{SIGINT, SIGTERM};

/// Signals that stop the run after the current server start.
#[cfg(unix)]
pub const HANDLED_SIGNALS: &[(i32, &str)] =
    &[(SIGINT, "SIGINT"), (SIGTERM, "SIGTERM"), (SIGHUP, "SIGHUP")];
#[cfg(not(unix))]
pub const HANDLED_SIGNALS: &[(i32, &str)] = &[(SIGINT, "SIGINT"), (SIGTERM, "SIGTERM")];

/// Last signal received, 0 until one arrives.
#[derive(Debug, Default)]
pub struct ShutdownSignal {
    received: AtomicI32,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_signaled(&self) -> bool {
        self.received.load(Ordering::Acquire) != 0
    }

    pub fn trigger(&self, signal: i32) {
        self.received.store(signal, Ordering::Release);
    }

    pub fn signal_name(&self) -> &'static str {
        match self.received.load(Ordering::Acquire) {
            0 => "none",
            signal => name_of(signal),
        }
    }
}

fn name_of(signal: i32) -> &'static str {
    HANDLED_SIGNALS
        .iter()
        .find(|&&(number, _)| number == signal)
        .map_or("unknown", |&(_, name)| name)
}

/// Routes every signal in [`HANDLED_SIGNALS`] to `shutdown`. Fails on the
/// first one that cannot be installed.
pub fn install_signal_handlers(shutdown: Arc<ShutdownSignal>) -> Result<(), ExploreError> {
    let signals: Vec<i32> = HANDLED_SIGNALS.iter().map(|(number, _)| *number).collect();
    register_all(&shutdown, &signals)
}

fn register_all(shutdown: &Arc<ShutdownSignal>, signals: &[i32]) -> Result<(), ExploreError> {
    for &signal in signals {
        let target = Arc::clone(shutdown);
        // SAFETY: the handler only stores to an atomic.
        let registered =
            unsafe { signal_hook::low_level::register(signal, move || target.trigger(signal)) };
        registered.map_err(|source| ExploreError::SignalHandler {
            name: name_of(signal),
            source,
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_clear() {
        let signal = ShutdownSignal::new();
        assert!(!signal.is_signaled());
        assert_eq!(signal.signal_name(), "none");
    }

    #[test]
    fn trigger_records_the_signal() {
        let signal = ShutdownSignal::default();
        signal.trigger(SIGTERM);
        assert!(signal.is_signaled());
        assert_eq!(signal.signal_name(), "SIGTERM");

        signal.trigger(12345);
        assert!(signal.is_signaled());
        assert_eq!(signal.signal_name(), "unknown");
    }

    #[test]
    fn shared_across_threads() {
        let signal = Arc::new(ShutdownSignal::new());
        let remote = signal.clone();
        std::thread::spawn(move || remote.trigger(SIGINT))
            .join()
            .unwrap();
        assert!(signal.is_signaled());
        assert_eq!(signal.signal_name(), "SIGINT");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn registration_failure_is_an_error() {
        let shutdown = Arc::new(ShutdownSignal::new());
        // Linux has 64 signals; the kernel rejects anything above that.
        match register_all(&shutdown, &[4096]) {
            Err(ExploreError::SignalHandler { name, .. }) => assert_eq!(name, "unknown"),
            other => panic!("unexpected result {other:?}"),
        }
        assert!(!shutdown.is_signaled());
    }
}
