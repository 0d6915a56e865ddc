use crate::actor;
use crate::replica::election::timers::time::{Clock, RealClock};
use crate::replica::{LeaderTimerTick, Term};
use std::sync::{Arc, Weak};
use tokio::time::Duration;

/// LeaderTimerHandle drives the heartbeat rounds of one leadership term. Dropping the handle stops
/// the timer task.
pub(crate) struct LeaderTimerHandle {
    _shared: Arc<Shared>,
}

struct Shared {
    term: Term,
}

struct LeaderTimerTask<C: Clock> {
    weak_shared: Weak<Shared>,
    heartbeat_duration: Duration,
    actor_client: actor::WeakActorClient,
    clock: C,
}

impl LeaderTimerHandle {
    pub(crate) fn spawn_timer_task(
        heartbeat_duration: Duration,
        actor_client: actor::WeakActorClient,
        term: Term,
    ) -> Self {
        // Add minimal logic in this constructor, as it is untested.
        let (task, handle) = LeaderTimerTask::new(heartbeat_duration, actor_client, term, RealClock);
        tokio::task::spawn(task.run());

        handle
    }
}

impl<C: Clock> LeaderTimerTask<C> {
    fn new(
        heartbeat_duration: Duration,
        actor_client: actor::WeakActorClient,
        term: Term,
        clock: C,
    ) -> (Self, LeaderTimerHandle) {
        let shared = Arc::new(Shared { term });

        let task = LeaderTimerTask {
            weak_shared: Arc::downgrade(&shared),
            heartbeat_duration,
            actor_client,
            clock,
        };
        let handle = LeaderTimerHandle { _shared: shared };

        (task, handle)
    }

    async fn run(mut self) {
        // The first tick is published immediately, so a newly elected leader asserts itself
        // before any follower times out.
        loop {
            let tick = match self.weak_shared.upgrade() {
                Some(shared) => LeaderTimerTick { term: shared.term },
                // The timer handle has dropped, which means we are no longer leader for this
                // term. Exit the task.
                None => return,
            };

            if self.actor_client.leader_timer(tick).await.is_err() {
                return;
            }
            self.clock.sleep(self.heartbeat_duration).await;
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
    async fn leader_timer_handle_lifecycle() {
        // -- setup --
        let heartbeat_duration = Duration::from_millis(100);
        let (strong_actor_client, rx) = ActorClient::new(10);
        let actor_client = strong_actor_client.weak();
        let mut actor = TestUtilActor::new(rx);

        let term = Term::new(10);
        let expected_tick = LeaderTimerTick { term };

        let (mock_clock, mut mock_clock_controller) = time::mocked_clock();

        // -- execute & verify --

        // 1. Spawn task, assert there is one event in the queue.
        let (timer_task, timer_handle) = LeaderTimerTask::new(heartbeat_duration, actor_client, term, mock_clock);
        let task_join_handle = tokio::task::spawn(timer_task.run());

        actor.assert_leader_timer_event(expected_tick.clone()).await;
        actor.assert_no_event().await;

        // 2. Advance time and receive a tick each heartbeat duration.
        for _ in 0..5 {
            mock_clock_controller.advance(heartbeat_duration / 2);
            actor.assert_no_event().await;
            mock_clock_controller.advance(heartbeat_duration / 2);
            actor.assert_leader_timer_event(expected_tick.clone()).await;
            actor.assert_no_event().await;
        }

        // 3. Advance time by a big leap, still receive single tick.
        mock_clock_controller.advance(heartbeat_duration * 5);
        actor.assert_leader_timer_event(expected_tick.clone()).await;
        actor.assert_no_event().await;

        // 4. Drop handle and assert timer task exited without sending more events.
        drop(timer_handle);
        mock_clock_controller.advance(heartbeat_duration);
        task_join_handle.await.unwrap();
        actor.assert_no_event().await;
    }

    #[tokio::test]
    async fn leader_timer_exits_when_actor_is_gone() {
        let heartbeat_duration = Duration::from_millis(100);
        let (strong_actor_client, rx) = ActorClient::new(10);
        let actor_client = strong_actor_client.weak();
        drop(strong_actor_client);
        drop(rx);

        let (mock_clock, _mock_clock_controller) = time::mocked_clock();
        let (timer_task, _timer_handle) =
            LeaderTimerTask::new(heartbeat_duration, actor_client, Term::new(1), mock_clock);

        // Exits on the very first tick, without the clock moving.
        tokio::time::timeout(Duration::from_secs(5), timer_task.run())
            .await
            .expect("Timer task should exit");
    }
}
