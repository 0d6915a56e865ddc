use crate::replica::ReplicaOptions;
use std::convert::TryFrom;
use tokio::time::Duration;

/// Every field is optional. Unset fields get a default that works for a LAN cluster.
#[derive(Clone, Debug, Default)]
pub struct RaftOptions {
    pub leader_heartbeat_duration: Option<Duration>,
    pub follower_min_timeout: Option<Duration>,
    pub follower_max_timeout: Option<Duration>,
    /// How long a candidate collects votes.
    pub vote_window: Option<Duration>,
    /// How long a leader collects heartbeat acks before the round counts as missed.
    pub heartbeat_window: Option<Duration>,
    /// How long a leader waits for a majority to ack a client write.
    pub write_window: Option<Duration>,
    /// Per peer RPC timeout.
    pub rpc_timeout: Option<Duration>,
    pub missed_heartbeat_rounds_before_step_down: Option<u32>,
    pub max_entries_per_request: Option<usize>,
}

#[derive(Clone, Debug)]
pub(crate) struct RaftOptionsValidated {
    pub leader_heartbeat_duration: Duration,
    pub follower_min_timeout: Duration,
    pub follower_max_timeout: Duration,
    pub vote_window: Duration,
    pub heartbeat_window: Duration,
    pub write_window: Duration,
    pub rpc_timeout: Duration,
    pub missed_heartbeat_rounds_before_step_down: u32,
    pub max_entries_per_request: usize,
}

impl RaftOptionsValidated {
    fn validate(&self) -> Result<(), &'static str> {
        if self.leader_heartbeat_duration >= self.follower_min_timeout {
            return Err("Follower minimum timeout must be greater than leader's heartbeat");
        }
        if self.follower_min_timeout >= self.follower_max_timeout {
            return Err("Follower minimum timeout must be less than maximum timeout");
        }
        if self.heartbeat_window > self.leader_heartbeat_duration {
            return Err("Heartbeat window must not be longer than the heartbeat period");
        }
        if self.vote_window >= self.follower_min_timeout {
            return Err("Vote window must be less than the follower's minimum timeout");
        }
        if self.rpc_timeout == Duration::from_millis(0)
            || self.vote_window == Duration::from_millis(0)
            || self.heartbeat_window == Duration::from_millis(0)
            || self.write_window == Duration::from_millis(0)
        {
            return Err("RPC timeout and round windows must be non-zero");
        }
        if self.missed_heartbeat_rounds_before_step_down == 0 {
            return Err("Leader must tolerate at least one missed heartbeat round");
        }
        if self.max_entries_per_request == 0 {
            return Err("AppendEntries must be allowed to carry at least one entry");
        }

        Ok(())
    }
}

impl TryFrom<RaftOptions> for RaftOptionsValidated {
    type Error = &'static str;

    fn try_from(options: RaftOptions) -> Result<Self, Self::Error> {
        let values = RaftOptionsValidated {
            leader_heartbeat_duration: options.leader_heartbeat_duration.unwrap_or(Duration::from_millis(50)),
            follower_min_timeout: options.follower_min_timeout.unwrap_or(Duration::from_millis(150)),
            follower_max_timeout: options.follower_max_timeout.unwrap_or(Duration::from_millis(300)),
            vote_window: options.vote_window.unwrap_or(Duration::from_millis(100)),
            heartbeat_window: options.heartbeat_window.unwrap_or(Duration::from_millis(40)),
            write_window: options.write_window.unwrap_or(Duration::from_millis(100)),
            rpc_timeout: options.rpc_timeout.unwrap_or(Duration::from_millis(40)),
            missed_heartbeat_rounds_before_step_down: options.missed_heartbeat_rounds_before_step_down.unwrap_or(1),
            max_entries_per_request: options.max_entries_per_request.unwrap_or(64),
        };

        values.validate()?;
        Ok(values)
    }
}

impl From<RaftOptionsValidated> for ReplicaOptions {
    fn from(options: RaftOptionsValidated) -> Self {
        ReplicaOptions {
            leader_heartbeat_duration: options.leader_heartbeat_duration,
            follower_min_timeout: options.follower_min_timeout,
            follower_max_timeout: options.follower_max_timeout,
            vote_window: options.vote_window,
            heartbeat_window: options.heartbeat_window,
            write_window: options.write_window,
            rpc_timeout: options.rpc_timeout,
            missed_heartbeat_rounds_before_step_down: options.missed_heartbeat_rounds_before_step_down,
            max_entries_per_request: options.max_entries_per_request,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn millis(ms: u64) -> Option<Duration> {
        Some(Duration::from_millis(ms))
    }

    #[test]
    fn defaults_are_valid() {
        let options = RaftOptionsValidated::try_from(RaftOptions::default()).unwrap();
        assert_eq!(options.leader_heartbeat_duration, Duration::from_millis(50));
        assert_eq!(options.follower_min_timeout, Duration::from_millis(150));
        assert_eq!(options.follower_max_timeout, Duration::from_millis(300));
        assert_eq!(options.missed_heartbeat_rounds_before_step_down, 1);
    }

    #[test]
    fn rejects_inconsistent_combos() {
        let bad = vec![
            RaftOptions {
                leader_heartbeat_duration: millis(150),
                ..RaftOptions::default()
            },
            RaftOptions {
                follower_min_timeout: millis(300),
                ..RaftOptions::default()
            },
            RaftOptions {
                heartbeat_window: millis(60),
                ..RaftOptions::default()
            },
            RaftOptions {
                vote_window: millis(150),
                ..RaftOptions::default()
            },
            RaftOptions {
                rpc_timeout: millis(0),
                ..RaftOptions::default()
            },
            RaftOptions {
                missed_heartbeat_rounds_before_step_down: Some(0),
                ..RaftOptions::default()
            },
            RaftOptions {
                max_entries_per_request: Some(0),
                ..RaftOptions::default()
            },
        ];

        for options in bad {
            assert!(RaftOptionsValidated::try_from(options.clone()).is_err(), "{:?}", options);
        }
    }
}
