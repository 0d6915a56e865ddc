use crate::actor;
use crate::replica::election::timers::time::{self, Clock, RealClock};
use crate::replica::FollowerTimeoutTick;
use std::ops::RangeInclusive;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::time::{Duration, Instant};

/// FollowerTimerHandle is the election timer held by followers and candidates. Dropping the
/// handle stops the timer task.
///
/// Every fire carries the timer's id and the generation (number of resets) it fired for, so the
/// actor can tell a stale fire from a live one with `is_current()`.
pub(crate) struct FollowerTimerHandle<C: Clock = RealClock> {
    timer_id: u64,
    shared: Arc<Shared<C>>,
}

struct Shared<C: Clock> {
    schedule: Mutex<Schedule>,
    timeout_range: RangeInclusive<Duration>,
    clock: C,
}

// Wake time and generation change together, under one lock.
struct Schedule {
    next_wake_time: Option<Instant>,
    generation: u64,
}

#[derive(Debug, PartialEq)]
enum NextStep {
    SleepUntil(Instant),
    // The deadline passed with no reset since. Carries the generation that deadline belongs to.
    Fire { generation: u64 },
}

struct FollowerTimerTask<C: Clock> {
    timer_id: u64,
    weak_shared: Weak<Shared<C>>,
    actor_client: actor::WeakActorClient,
    clock: C,
    // timeout_backoff is an impl detail (not from paper) which is just a static amount of time
    // that this task will wait between triggering timeouts to the actor.
    timeout_backoff: Duration,
}

impl FollowerTimerHandle {
    pub(crate) fn spawn_timer_task(
        timer_id: u64,
        min_timeout: Duration,
        max_timeout: Duration,
        actor_client: actor::WeakActorClient,
    ) -> Self {
        let (task, handle) = FollowerTimerTask::new(timer_id, min_timeout, max_timeout, actor_client, RealClock);
        tokio::task::spawn(task.run());

        handle
    }
}

impl<C: Clock> FollowerTimerHandle<C> {
    /// Push the next fire out by a fresh random timeout. Any fire already in flight becomes stale.
    pub(crate) fn reset_timeout(&self) {
        self.shared.reset();
    }

    pub(crate) fn is_current(&self, tick: &FollowerTimeoutTick) -> bool {
        tick.timer_id == self.timer_id && tick.generation == self.shared.generation()
    }
}

impl<C: Clock> Shared<C> {
    fn reset(&self) {
        let wake_time = self.clock.now() + time::random_timeout(&self.timeout_range);
        let mut schedule = self.lock_schedule();
        schedule.generation += 1;
        schedule.next_wake_time.replace(wake_time);
    }

    fn next_step(&self) -> NextStep {
        let mut schedule = self.lock_schedule();
        match schedule.next_wake_time.take() {
            Some(wake_time) => NextStep::SleepUntil(wake_time),
            None => NextStep::Fire {
                generation: schedule.generation,
            },
        }
    }

    fn generation(&self) -> u64 {
        self.lock_schedule().generation
    }

    fn lock_schedule(&self) -> MutexGuard<'_, Schedule> {
        // Nothing panics while holding the lock, but a poisoned schedule is still consistent.
        match self.schedule.lock() {
            Ok(schedule) => schedule,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<C: Clock> FollowerTimerTask<C> {
    fn new(
        timer_id: u64,
        min_timeout: Duration,
        max_timeout: Duration,
        actor_client: actor::WeakActorClient,
        clock: C,
    ) -> (Self, FollowerTimerHandle<C>) {
        let shared = Arc::new(Shared {
            schedule: Mutex::new(Schedule {
                next_wake_time: None,
                generation: 0,
            }),
            timeout_range: RangeInclusive::new(min_timeout, max_timeout),
            clock: clock.clone(),
        });

        let task = FollowerTimerTask {
            timer_id,
            weak_shared: Arc::downgrade(&shared),
            actor_client,
            clock,
            timeout_backoff: min_timeout,
        };
        let handle = FollowerTimerHandle { timer_id, shared };

        // Timer task must have a timeout value present when it starts, otherwise it may
        // trigger a timeout immediately after we become a follower.
        handle.reset_timeout();

        (task, handle)
    }

    async fn run(mut self) {
        loop {
            // The handle has dropped, which means we are no longer a follower/candidate under this
            // timer. Exit without starting a new election.
            let shared = match self.weak_shared.upgrade() {
                Some(shared) => shared,
                None => return,
            };

            let next_step = shared.next_step();
            drop(shared);
            match next_step {
                NextStep::SleepUntil(wake_time) => {
                    // We've been reset, so we sleep until the next timeout.
                    self.clock.sleep_until(wake_time).await;
                }
                NextStep::Fire { generation } => {
                    // We slept until `wake_time` and nobody reset us. Keep firing every backoff
                    // until the actor replaces or resets this timer.
                    let tick = FollowerTimeoutTick {
                        timer_id: self.timer_id,
                        generation,
                    };
                    if self.actor_client.follower_timeout(tick).await.is_err() {
                        return;
                    }
                    self.clock.sleep(self.timeout_backoff).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::ActorClient;
    use crate::replica::election::timers::test_utils::TestUtilActor;
    use crate::replica::election::timers::time;

    #[tokio::test]
    async fn follower_timer_handle_reset_and_timeout() {
        // -- setup --
        let timeout = Duration::from_millis(100);
        let (strong_actor_client, rx) = ActorClient::new(10);
        let actor_client = strong_actor_client.weak();
        let mut actor = TestUtilActor::new(rx);

        let (mock_clock, mut mock_clock_controller) = time::mocked_clock();

        // -- execute & verify --

        // 1. Spawn task, assert there is no event in the queue.
        let (timer_task, timer_handle) = FollowerTimerTask::new(
            7,
            // We are not testing randomness/jitter, so make min/max the same.
            /* min */ timeout,
            /* max */ timeout,
            actor_client,
            mock_clock,
        );
        tokio::task::spawn(timer_task.run());

        actor.assert_no_event().await;

        // 2. Advance time and reset timeout many times, assert no event
        for _ in 0..5 {
            mock_clock_controller.advance(timeout / 2);
            timer_handle.reset_timeout();
        }
        actor.assert_no_event().await;

        // Sanity check T=2.5
        assert_eq!(mock_clock_controller.elapsed_time(), timeout * 5 / 2);

        // 3. Validate no timeout occurs at T < 3.5
        let one_ns = Duration::from_nanos(1);
        mock_clock_controller.advance(timeout - one_ns);
        actor.assert_no_event().await;

        // 4. Validate timeout occurs at exactly T >= 3.5, because our last timeout reset was at
        // T=2.5. The tick is current: 1 reset at construction + 5 resets above.
        mock_clock_controller.advance(one_ns);
        let tick = actor.assert_follower_timeout_event().await;
        assert_eq!(tick, FollowerTimeoutTick { timer_id: 7, generation: 6 });
        assert!(timer_handle.is_current(&tick));
    }

    #[tokio::test]
    async fn follower_timer_handle_drop() {
        // -- setup --
        let timeout = Duration::from_millis(100);
        let (strong_actor_client, rx) = ActorClient::new(10);
        let actor_client = strong_actor_client.weak();
        let mut actor = TestUtilActor::new(rx);

        let (mock_clock, mut mock_clock_controller) = time::mocked_clock();

        // -- execute --
        // Spawn task, it will be sleeping. Drop handle to observe behavior.
        let (timer_task, timer_handle) = FollowerTimerTask::new(1, timeout, timeout, actor_client, mock_clock);
        let task_join_handle = tokio::task::spawn(timer_task.run());
        drop(timer_handle);

        // -- verify --
        // Fast-fwd time to ensure timer task would've fired an event, and then assert timer task
        // has exited.
        mock_clock_controller.advance(timeout * 2);
        task_join_handle.await.unwrap();
        actor.assert_no_event().await;
    }

    #[tokio::test]
    async fn follower_timer_fire_is_stale_after_reset() {
        // -- setup --
        let timeout = Duration::from_millis(100);
        let (strong_actor_client, rx) = ActorClient::new(10);
        let actor_client = strong_actor_client.weak();
        let mut actor = TestUtilActor::new(rx);

        let (mock_clock, mut mock_clock_controller) = time::mocked_clock();

        let (timer_task, timer_handle) = FollowerTimerTask::new(3, timeout, timeout, actor_client, mock_clock);
        tokio::task::spawn(timer_task.run());
        actor.assert_no_event().await;

        // -- execute --
        // Timer fires, then a heartbeat that was already queued behind the fire resets the timer
        // before the actor gets to the fire.
        mock_clock_controller.advance(timeout);
        let tick = actor.assert_follower_timeout_event().await;
        timer_handle.reset_timeout();

        // -- verify --
        assert!(!timer_handle.is_current(&tick));

        // A tick from some other timer is never current either.
        let foreign_tick = FollowerTimeoutTick {
            timer_id: 4,
            generation: tick.generation + 1,
        };
        assert!(!timer_handle.is_current(&foreign_tick));

        // Validate timer task is still running and honoring resets.
        for _ in 0..5 {
            mock_clock_controller.advance(timeout / 2);
            timer_handle.reset_timeout();
        }
        actor.assert_no_event().await;
    }

    #[tokio::test]
    async fn follower_timer_keeps_firing_until_reset() {
        let timeout = Duration::from_millis(100);
        let (strong_actor_client, rx) = ActorClient::new(10);
        let actor_client = strong_actor_client.weak();
        let mut actor = TestUtilActor::new(rx);

        let (mock_clock, mut mock_clock_controller) = time::mocked_clock();

        let (timer_task, _timer_handle) = FollowerTimerTask::new(5, timeout, timeout, actor_client, mock_clock);
        tokio::task::spawn(timer_task.run());

        mock_clock_controller.advance(timeout);
        let first = actor.assert_follower_timeout_event().await;
        actor.assert_no_event().await;

        // Backoff is the min timeout.
        mock_clock_controller.advance(timeout);
        let second = actor.assert_follower_timeout_event().await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn fire_keeps_generation_of_the_passed_deadline() {
        let timeout = Duration::from_millis(100);
        let (strong_actor_client, _rx) = ActorClient::new(10);
        let (mock_clock, _mock_clock_controller) = time::mocked_clock();

        // The task is never run, its steps are taken by hand.
        let (_timer_task, timer_handle) =
            FollowerTimerTask::new(2, timeout, timeout, strong_actor_client.weak(), mock_clock);
        let shared = timer_handle.shared.clone();

        assert!(matches!(shared.next_step(), NextStep::SleepUntil(_)));
        // Deadline passed, so the task decides to fire. A reset lands before the tick is built.
        let step = shared.next_step();
        timer_handle.reset_timeout();

        let generation = match step {
            NextStep::Fire { generation } => generation,
            other => panic!("Expected a fire, got {:?}", other),
        };
        assert_eq!(generation, 1);
        let tick = FollowerTimeoutTick { timer_id: 2, generation };
        assert!(!timer_handle.is_current(&tick));

        // The reset scheduled a new deadline rather than a fire.
        assert!(matches!(shared.next_step(), NextStep::SleepUntil(_)));
        assert_eq!(shared.next_step(), NextStep::Fire { generation: 2 });
    }
}
