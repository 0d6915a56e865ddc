use crate::actor::WeakActorClient;
use crate::commitlog::Index;
use crate::replica::election::state_change_listener::{self, ElectionStateChangeNotifier};
use crate::replica::election::timers::{FollowerTimerHandle, LeaderTimerHandle};
use crate::replica::election::{LeaderStateTracker, PeerState};
use crate::replica::{ElectionStateChangeListener, ElectionStateSnapshot, FollowerTimeoutTick, LeaderRedirectInfo, ReplicaId, Term};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::Duration;

#[derive(Clone)]
pub(crate) struct ElectionConfig {
    pub leader_heartbeat_duration: Duration,
    pub follower_min_timeout: Duration,
    pub follower_max_timeout: Duration,
}

/// ElectionState is responsible for holding state specific to the stage in an election. Its
/// methods are responsible for "what" to do. It is NOT responsible for validating anything
/// specific to logs, terms, peers, etc. or knowing "when" to do something.
///
/// Role specific resources (election timer, heartbeat ticker, replication progress) live inside
/// the role's state, so every transition drops the previous role's resources.
pub(crate) struct ElectionState {
    state: State,
    config: ElectionConfig,
    actor_client: WeakActorClient,
    state_change_notifier: ElectionStateChangeNotifier,
    next_timer_id: u64,
}

impl ElectionState {
    /// `new_follower()` creates a new ElectionState instance that starts out as a follower.
    pub(crate) fn new_follower(
        config: ElectionConfig,
        actor_client: WeakActorClient,
    ) -> (Self, ElectionStateChangeListener) {
        let initial_timer = FollowerTimerHandle::spawn_timer_task(
            0,
            config.follower_min_timeout,
            config.follower_max_timeout,
            actor_client.clone(),
        );
        let initial_state = State::Follower(FollowerState {
            leader: None,
            timer: initial_timer,
        });
        let (notifier, listener) = state_change_listener::new(Self::current_state_impl(&initial_state));

        let election_state = Self {
            state: initial_state,
            config,
            actor_client,
            state_change_notifier: notifier,
            next_timer_id: 1,
        };

        (election_state, listener)
    }

    pub(crate) fn transition_to_follower(&mut self, new_leader: Option<LeaderRedirectInfo>) {
        let timer = self.spawn_follower_timer();
        self.state = State::Follower(FollowerState {
            leader: new_leader,
            timer,
        });
        self.notify_new_state();
    }

    /// The caller must have already bumped the term and voted for itself.
    pub(crate) fn transition_to_candidate(&mut self) {
        let timer = self.spawn_follower_timer();
        self.state = State::Candidate(CandidateState { timer });
        self.notify_new_state();
    }

    pub(crate) fn transition_to_leader(&mut self, term: Term, peer_ids: HashSet<ReplicaId>, last_log_index: Option<Index>) {
        let mut peer_state = HashMap::with_capacity(peer_ids.len());
        for peer_id in peer_ids {
            peer_state.insert(peer_id, PeerState::new(last_log_index));
        }

        // Ticker starts with an immediate tick, so the first heartbeat round goes out right away.
        let timer =
            LeaderTimerHandle::spawn_timer_task(self.config.leader_heartbeat_duration, self.actor_client.clone(), term);
        self.state = State::Leader(LeaderState {
            tracker: LeaderStateTracker::new(term, peer_state),
            _timer: timer,
        });
        self.notify_new_state();
    }

    fn spawn_follower_timer(&mut self) -> FollowerTimerHandle {
        let timer_id = self.next_timer_id;
        self.next_timer_id += 1;

        FollowerTimerHandle::spawn_timer_task(
            timer_id,
            self.config.follower_min_timeout,
            self.config.follower_max_timeout,
            self.actor_client.clone(),
        )
    }

    pub(crate) fn current_state(&self) -> ElectionStateSnapshot {
        Self::current_state_impl(&self.state)
    }

    fn current_state_impl(state: &State) -> ElectionStateSnapshot {
        match state {
            State::Leader(_) => ElectionStateSnapshot::Leader,
            State::Candidate(_) => ElectionStateSnapshot::Candidate,
            State::Follower(FollowerState { leader: None, .. }) => ElectionStateSnapshot::FollowerNoLeader,
            State::Follower(FollowerState {
                leader: Some(leader_info),
                ..
            }) => ElectionStateSnapshot::Follower(leader_info.clone()),
        }
    }

    fn notify_new_state(&self) {
        self.state_change_notifier
            .notify_new_state(Self::current_state_impl(&self.state));
    }

    pub(crate) fn is_leader(&self) -> bool {
        matches!(self.state, State::Leader(_))
    }

    pub(crate) fn is_candidate(&self) -> bool {
        matches!(self.state, State::Candidate(_))
    }

    /// Followers only. Candidates keep their election deadline until they win, lose, or see a
    /// valid leader.
    pub(crate) fn reset_timeout_if_follower(&self) {
        if let State::Follower(fs) = &self.state {
            fs.timer.reset_timeout();
        }
    }

    /// Returns false for ticks from a replaced timer, ticks that fired before the latest reset,
    /// and any tick while we are leader.
    pub(crate) fn is_current_timeout(&self, tick: &FollowerTimeoutTick) -> bool {
        match &self.state {
            State::Leader(_) => false,
            State::Candidate(cs) => cs.timer.is_current(tick),
            State::Follower(fs) => fs.timer.is_current(tick),
        }
    }

    pub(crate) fn set_leader_if_unknown(&mut self, leader: &LeaderRedirectInfo) {
        if let State::Follower(fs) = &mut self.state {
            if fs.leader.is_none() {
                fs.leader.replace(leader.clone());
                self.notify_new_state();
            }
        }
    }

    /// Leader as known by a follower. Leaders don't redirect to themselves, so this is None for
    /// leaders and candidates.
    pub(crate) fn current_leader(&self) -> Option<&LeaderRedirectInfo> {
        match &self.state {
            State::Follower(fs) => fs.leader.as_ref(),
            State::Leader(_) | State::Candidate(_) => None,
        }
    }

    pub(crate) fn leader_state_mut(&mut self) -> Option<&mut LeaderStateTracker> {
        if let State::Leader(ls) = &mut self.state {
            Some(&mut ls.tracker)
        } else {
            None
        }
    }

    pub(crate) fn leader_state(&self) -> Option<&LeaderStateTracker> {
        if let State::Leader(ls) = &self.state {
            Some(&ls.tracker)
        } else {
            None
        }
    }
}

impl fmt::Debug for ElectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.state {
            State::Leader(_) => write!(f, "Leader"),
            State::Candidate(_) => write!(f, "Candidate"),
            State::Follower(FollowerState {
                leader: Some(leader_info),
                ..
            }) => write!(f, "Follower(Leader={:?})", leader_info.replica_id),
            State::Follower(FollowerState { leader: None, .. }) => write!(f, "Follower(Leader=None)"),
        }
    }
}

enum State {
    Leader(LeaderState),
    Candidate(CandidateState),
    Follower(FollowerState),
}

struct LeaderState {
    tracker: LeaderStateTracker,
    // Dropping this stops heartbeats.
    _timer: LeaderTimerHandle,
}

struct CandidateState {
    timer: FollowerTimerHandle,
}

struct FollowerState {
    leader: Option<LeaderRedirectInfo>,
    timer: FollowerTimerHandle,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::{ActorClient, Event};
    use std::net::SocketAddr;
    use tokio::sync::mpsc;

    fn config() -> ElectionConfig {
        ElectionConfig {
            leader_heartbeat_duration: Duration::from_millis(50),
            follower_min_timeout: Duration::from_secs(60),
            follower_max_timeout: Duration::from_secs(60),
        }
    }

    fn leader_info(id: &str) -> LeaderRedirectInfo {
        LeaderRedirectInfo {
            replica_id: ReplicaId::new(id),
            rpc_address: SocketAddr::from(([127, 0, 0, 1], 5000)),
        }
    }

    fn new_follower() -> (ElectionState, ElectionStateChangeListener, ActorClient, mpsc::Receiver<Event>) {
        let (actor_client, rx) = ActorClient::new(10);
        let (election_state, listener) = ElectionState::new_follower(config(), actor_client.weak());
        (election_state, listener, actor_client, rx)
    }

    #[tokio::test]
    async fn transitions_publish_snapshots() {
        let (mut election_state, mut listener, _actor_client, _rx) = new_follower();
        assert!(matches!(listener.latest(), ElectionStateSnapshot::FollowerNoLeader));

        election_state.transition_to_candidate();
        assert!(matches!(listener.next().await, Some(ElectionStateSnapshot::Candidate)));

        election_state.transition_to_leader(Term::new(1), HashSet::new(), None);
        assert!(matches!(listener.next().await, Some(ElectionStateSnapshot::Leader)));
        assert!(election_state.is_leader());
        assert!(election_state.current_leader().is_none());

        election_state.transition_to_follower(Some(leader_info("other")));
        match listener.next().await {
            Some(ElectionStateSnapshot::Follower(info)) => assert_eq!(info, leader_info("other")),
            other => panic!("Unexpected snapshot {:?}", other),
        }
        assert!(election_state.leader_state_mut().is_none());
    }

    #[tokio::test]
    async fn set_leader_only_when_unknown() {
        let (mut election_state, _listener, _actor_client, _rx) = new_follower();

        election_state.set_leader_if_unknown(&leader_info("a"));
        election_state.set_leader_if_unknown(&leader_info("b"));
        assert_eq!(election_state.current_leader(), Some(&leader_info("a")));

        // Candidates never pick up a leader this way.
        election_state.transition_to_candidate();
        election_state.set_leader_if_unknown(&leader_info("b"));
        assert_eq!(election_state.current_leader(), None);
    }

    #[tokio::test]
    async fn timeout_from_replaced_timer_is_stale() {
        let (mut election_state, _listener, _actor_client, _rx) = new_follower();

        // The initial timer has id 0 and has been reset once on creation.
        let first_timer_tick = FollowerTimeoutTick {
            timer_id: 0,
            generation: 1,
        };
        assert!(election_state.is_current_timeout(&first_timer_tick));

        election_state.transition_to_candidate();
        assert!(!election_state.is_current_timeout(&first_timer_tick));
        assert!(election_state.is_current_timeout(&FollowerTimeoutTick {
            timer_id: 1,
            generation: 1,
        }));

        election_state.transition_to_leader(Term::new(1), HashSet::new(), None);
        assert!(!election_state.is_current_timeout(&FollowerTimeoutTick {
            timer_id: 1,
            generation: 1,
        }));
    }
}
