use rand::Rng;
use std::ops::RangeInclusive;
#[cfg(test)]
use tokio::sync::watch;
use tokio::time::{Duration, Instant};

#[async_trait::async_trait]
pub(crate) trait Clock: Clone + Send + Sync + 'static {
    fn now(&self) -> Instant;
    async fn sleep_until(&mut self, deadline: Instant);

    async fn sleep(&mut self, duration: Duration) {
        let deadline = self.now() + duration;
        self.sleep_until(deadline).await;
    }
}

#[derive(Copy, Clone)]
pub(crate) struct RealClock;

#[async_trait::async_trait]
impl Clock for RealClock {
    fn now(&self) -> Instant {
        tokio::time::Instant::now()
    }

    async fn sleep_until(&mut self, deadline: Instant) {
        tokio::time::sleep_until(deadline).await;
    }
}

/// Uniformly random duration within `range`, bounds included.
pub(crate) fn random_timeout(range: &RangeInclusive<Duration>) -> Duration {
    rand::thread_rng().gen_range(range.clone())
}

#[cfg(test)]
pub(crate) fn mocked_clock() -> (MockClock, MockClockController) {
    let now = Instant::now();
    let (tx, rx) = watch::channel(now);
    let sleeper = MockClock { current_time: rx };
    let controller = MockClockController {
        current_time: tx,
        time_of_instantiation: now,
    };

    (sleeper, controller)
}

/// MockClock only moves when its controller says so.
#[cfg(test)]
#[derive(Clone)]
pub(crate) struct MockClock {
    current_time: watch::Receiver<Instant>,
}

#[cfg(test)]
#[async_trait::async_trait]
impl Clock for MockClock {
    fn now(&self) -> Instant {
        *self.current_time.borrow()
    }

    async fn sleep_until(&mut self, deadline: Instant) {
        while *self.current_time.borrow() < deadline {
            if self.current_time.changed().await.is_err() {
                // Controller is gone, time will never reach the deadline.
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
pub(crate) struct MockClockController {
    current_time: watch::Sender<Instant>,
    time_of_instantiation: Instant,
}

#[cfg(test)]
impl MockClockController {
    pub(crate) fn current_time(&self) -> Instant {
        *self.current_time.borrow()
    }

    pub(crate) fn elapsed_time(&self) -> Duration {
        self.current_time() - self.time_of_instantiation
    }

    /// `sleep_until()` only promises to return once `now` is at or past its deadline. Advancing
    /// by one huge step wakes every sleeper once, late. Advance in steps smaller than what the
    /// test wants to observe.
    pub(crate) fn advance(&mut self, duration: Duration) {
        let new_now = self.current_time() + duration;
        let _ = self.current_time.send(new_now);
    }
}
