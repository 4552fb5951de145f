// File: testing-framework/src/orchestrator/clock.rs
//
// Time Source
//
// Provisioning and readiness polling are the only parts of the harness that
// wait on time. They go through this trait so that timeout behaviour can be
// exercised under tokio's paused time without real delays.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::{self, Instant};

/// Source of time for the provisioner and runner.
///
/// # Examples
///
/// ```rust
/// use spectre_testing_framework::orchestrator::{Clock, SystemClock};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() {
///     let clock = SystemClock;
///     let probe_started = clock.now();
///     clock.sleep(Duration::from_millis(10)).await;
///     assert!(probe_started.elapsed() >= Duration::from_millis(10));
/// }
/// ```
pub trait Clock: Send + Sync {
    /// Current instant
    fn now(&self) -> Instant;

    /// Wait for `d`
    fn sleep(&self, d: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// Wall-clock time, used by the runner binary.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        time::Instant::now()
    }

    fn sleep(&self, d: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(time::sleep(d))
    }
}

/// Clock for tests running under `#[tokio::test(start_paused = true)]`.
///
/// The runtime auto-advances paused time whenever every task is idle, so a
/// node that never becomes ready hits the provisioning timeout instantly.
/// Time can also be moved explicitly with [`PausedClock::advance`].
///
/// ```rust
/// use spectre_testing_framework::orchestrator::{Clock, PausedClock};
/// use std::time::Duration;
///
/// #[tokio::main(flavor = "current_thread", start_paused = true)]
/// async fn main() {
///     let clock = PausedClock::new();
///     let deadline = clock.now() + Duration::from_secs(60);
///     clock.advance(Duration::from_secs(60)).await;
///     assert!(clock.now() >= deadline);
/// }
/// ```
#[derive(Default)]
pub struct PausedClock;

impl PausedClock {
    /// Create the clock. Time must already be paused by the test runtime.
    pub fn new() -> Self {
        Self
    }

    /// Move paused time forward by `d`, waking any expired sleeps.
    pub async fn advance(&self, d: Duration) {
        time::advance(d).await
    }
}

impl Clock for PausedClock {
    fn now(&self) -> Instant {
        time::Instant::now()
    }

    fn sleep(&self, d: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(time::sleep(d))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_poll_intervals_accumulate() {
        let clock = PausedClock::new();
        let origin = clock.now();

        for _ in 0..5 {
            clock.advance(Duration::from_millis(100)).await;
        }
        assert_eq!(clock.now().duration_since(origin), Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_probe_wakes_once_deadline_passes() {
        let clock: Arc<dyn Clock> = Arc::new(PausedClock::new());
        let probe = {
            let clock = clock.clone();
            tokio::spawn(async move {
                let before = clock.now();
                clock.sleep(Duration::from_millis(250)).await;
                clock.now().duration_since(before)
            })
        };

        time::advance(Duration::from_millis(300)).await;
        assert!(probe.await.unwrap() >= Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_runtime_jumps_to_deadline() {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let origin = clock.now();

        // Nothing else is runnable, so the runtime jumps straight to the deadline
        clock.sleep(Duration::from_secs(3600)).await;
        assert!(clock.now().duration_since(origin) >= Duration::from_secs(3600));
    }

    #[tokio::test]
    async fn test_system_clock_waits() {
        let clock = SystemClock;
        let before = clock.now();
        clock.sleep(Duration::from_millis(5)).await;
        assert!(clock.now() > before);
    }
}
