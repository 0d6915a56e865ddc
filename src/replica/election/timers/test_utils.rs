use crate::actor::Event;
use crate::replica::{FollowerTimeoutTick, LeaderTimerTick};
use std::time::Duration;
use tokio::sync::mpsc;

pub(super) struct TestUtilActor {
    rx: mpsc::Receiver<Event>,
    timeout: Duration,
}

impl TestUtilActor {
    pub(super) fn new(actor_queue_rx: mpsc::Receiver<Event>) -> Self {
        TestUtilActor {
            rx: actor_queue_rx,
            timeout: Duration::from_millis(10),
        }
    }

    pub(super) async fn assert_leader_timer_event(&mut self, expected_tick: LeaderTimerTick) {
        match self.recv().await {
            Event::LeaderTimer(tick) => assert_eq!(tick, expected_tick),
            other => panic!("Unexpected event {:?}", other),
        }
    }

    pub(super) async fn assert_follower_timeout_event(&mut self) -> FollowerTimeoutTick {
        match self.recv().await {
            Event::FollowerTimeout(tick) => tick,
            other => panic!("Unexpected event {:?}", other),
        }
    }

    pub(super) async fn assert_no_event(&mut self) {
        tokio::time::timeout(self.timeout, self.rx.recv())
            .await
            .expect_err("Expected timeout");
    }

    async fn recv(&mut self) -> Event {
        tokio::time::timeout(Duration::from_secs(5), self.rx.recv())
            .await
            .expect("Unexpected timeout")
            .expect("Expected value")
    }
}
