//! Time source abstraction. The engine never reads a global clock: every
//! timestamp and deadline goes through this trait so hosts, embedded
//! executors and tests can each plug in their own notion of time.
use embassy_time::{Duration, Instant};
use futures_util::Future;

/// Monotonic clock with asynchronous waits.
pub trait XnetTimer {
    /// Current time.
    fn now(&self) -> Instant;

    /// Wait until `deadline`; returns immediately when it already passed.
    fn delay_until<'a>(&'a self, deadline: Instant) -> impl Future<Output = ()> + 'a;

    /// Wait for `duration`.
    fn delay<'a>(&'a self, duration: Duration) -> impl Future<Output = ()> + 'a {
        let deadline = self.now() + duration;
        self.delay_until(deadline)
    }

    /// Wait for `millis` milliseconds.
    fn delay_ms<'a>(&'a self, millis: u32) -> impl Future<Output = ()> + 'a {
        self.delay(Duration::from_millis(millis as u64))
    }
}

/// Wait until `deadline`, or forever when there is none.
pub(crate) async fn wait_for<T: XnetTimer>(timer: &T, deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => timer.delay_until(deadline).await,
        None => core::future::pending().await,
    }
}
