use crate::replica::{
    AppendEntriesError, AppendEntriesInput, AppendEntriesOutput, AppendEntriesRoundResult, FollowerTimeoutTick,
    LeaderTimerTick, ReadLogEntry, ReadLogError, ReadLogInput, ReplicaStatus, RequestVoteError, RequestVoteInput,
    RequestVoteOutput, RequestVoteRoundResult, StatusError, WriteToLogError, WriteToLogInput, WriteToLogOutput,
};
use std::fmt::Debug;
use tokio::sync::{mpsc, oneshot};

// Disk interaction is synchronous inside the actor. Network interaction never is: rounds are
// spawned as tasks that report back with a single *RoundComplete event.
#[derive(Debug)]
pub(crate) enum Event {
    // Leader: Append locally, start a write round, reply once committed or the round gives up.
    // Candidate: Reply NoLeader.
    // Follower: Redirect.
    WriteToLog(WriteToLogInput, Callback<WriteToLogOutput, WriteToLogError>),

    // Everyone: Observe term, grant vote if applicable.
    RequestVote(RequestVoteInput, Callback<RequestVoteOutput, RequestVoteError>),

    // Leader: Step down if term is higher.
    // Candidate: Step down if term is same or higher. Then as follower.
    // Follower: Check log consistency, write to disk then respond. Reset timeout.
    AppendEntries(AppendEntriesInput, Callback<AppendEntriesOutput, AppendEntriesError>),

    Status(Callback<ReplicaStatus, StatusError>),
    ReadLog(ReadLogInput, Callback<Vec<ReadLogEntry>, ReadLogError>),

    // Candidate: Become leader if won in the same term, else back to follower.
    // Others: discard
    RequestVoteRoundComplete(RequestVoteRoundResult),

    // Leader: Update peer progress, commit index, pending writes, missed heartbeat rounds.
    // Others: discard
    AppendEntriesRoundComplete(AppendEntriesRoundResult),

    // Leader: Start a heartbeat round.
    // Others: discard
    LeaderTimer(LeaderTimerTick),

    // Leader: discard
    // Candidate/Follower: Start a new election if the tick is from the current timer.
    FollowerTimeout(FollowerTimeoutTick),
}

#[derive(Debug)]
pub(crate) struct Callback<O: Debug, E: Debug>(pub(crate) oneshot::Sender<Result<O, E>>);

impl<O: Debug, E: Debug> Callback<O, E> {
    pub(crate) fn send(self, message: Result<O, E>) {
        // Caller may have given up waiting.
        let _ = self.0.send(message);
    }
}

#[derive(Debug, Copy, Clone, thiserror::Error)]
#[error("Replica actor has exited")]
pub(crate) struct ActorExited;

/// ActorClient is the strong handle to the replica actor. The actor keeps running as long as one
/// of these is alive.
#[derive(Clone)]
pub(crate) struct ActorClient {
    sender: mpsc::Sender<Event>,
}

/// WeakActorClient is held by the replica's own tasks (timers, rounds, the RPC server) so they
/// don't keep the actor alive after the application drops its node.
#[derive(Clone)]
pub(crate) struct WeakActorClient {
    sender: mpsc::WeakSender<Event>,
}

impl ActorClient {
    pub(crate) fn new(buffer_size: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(buffer_size);
        (ActorClient { sender: tx }, rx)
    }

    pub(crate) fn weak(&self) -> WeakActorClient {
        WeakActorClient {
            sender: self.sender.downgrade(),
        }
    }

    pub(crate) async fn write_to_log(&self, input: WriteToLogInput) -> Result<WriteToLogOutput, WriteToLogError> {
        let (tx, rx) = oneshot::channel();
        send(&self.sender, Event::WriteToLog(input, Callback(tx))).await?;
        rx.await.map_err(|_| ActorExited)?
    }

    pub(crate) async fn status(&self) -> Result<ReplicaStatus, StatusError> {
        let (tx, rx) = oneshot::channel();
        send(&self.sender, Event::Status(Callback(tx))).await?;
        rx.await.map_err(|_| ActorExited)?
    }

    pub(crate) async fn read_log(&self, input: ReadLogInput) -> Result<Vec<ReadLogEntry>, ReadLogError> {
        let (tx, rx) = oneshot::channel();
        send(&self.sender, Event::ReadLog(input, Callback(tx))).await?;
        rx.await.map_err(|_| ActorExited)?
    }
}

impl WeakActorClient {
    fn upgrade(&self) -> Result<mpsc::Sender<Event>, ActorExited> {
        self.sender.upgrade().ok_or(ActorExited)
    }

    pub(crate) async fn write_to_log(&self, input: WriteToLogInput) -> Result<WriteToLogOutput, WriteToLogError> {
        let (tx, rx) = oneshot::channel();
        send(&self.upgrade()?, Event::WriteToLog(input, Callback(tx))).await?;
        rx.await.map_err(|_| ActorExited)?
    }

    pub(crate) async fn request_vote(&self, input: RequestVoteInput) -> Result<RequestVoteOutput, RequestVoteError> {
        let (tx, rx) = oneshot::channel();
        send(&self.upgrade()?, Event::RequestVote(input, Callback(tx))).await?;
        rx.await.map_err(|_| ActorExited)?
    }

    pub(crate) async fn append_entries(
        &self,
        input: AppendEntriesInput,
    ) -> Result<AppendEntriesOutput, AppendEntriesError> {
        let (tx, rx) = oneshot::channel();
        send(&self.upgrade()?, Event::AppendEntries(input, Callback(tx))).await?;
        rx.await.map_err(|_| ActorExited)?
    }

    pub(crate) async fn status(&self) -> Result<ReplicaStatus, StatusError> {
        let (tx, rx) = oneshot::channel();
        send(&self.upgrade()?, Event::Status(Callback(tx))).await?;
        rx.await.map_err(|_| ActorExited)?
    }

    pub(crate) async fn request_vote_round_complete(&self, result: RequestVoteRoundResult) -> Result<(), ActorExited> {
        send(&self.upgrade()?, Event::RequestVoteRoundComplete(result)).await
    }

    pub(crate) async fn append_entries_round_complete(
        &self,
        result: AppendEntriesRoundResult,
    ) -> Result<(), ActorExited> {
        send(&self.upgrade()?, Event::AppendEntriesRoundComplete(result)).await
    }

    pub(crate) async fn leader_timer(&self, tick: LeaderTimerTick) -> Result<(), ActorExited> {
        send(&self.upgrade()?, Event::LeaderTimer(tick)).await
    }

    pub(crate) async fn follower_timeout(&self, tick: FollowerTimeoutTick) -> Result<(), ActorExited> {
        send(&self.upgrade()?, Event::FollowerTimeout(tick)).await
    }
}

async fn send(sender: &mpsc::Sender<Event>, event: Event) -> Result<(), ActorExited> {
    sender.send(event).await.map_err(|_| ActorExited)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replica::Term;

    #[tokio::test]
    async fn weak_client_fails_once_strong_clients_are_gone() {
        let (client, mut rx) = ActorClient::new(10);
        let weak = client.weak();

        weak.leader_timer(LeaderTimerTick { term: Term::new(1) }).await.unwrap();
        assert!(matches!(rx.recv().await, Some(Event::LeaderTimer(_))));

        drop(client);
        assert!(weak.leader_timer(LeaderTimerTick { term: Term::new(1) }).await.is_err());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn dropped_callback_surfaces_as_actor_exited() {
        let (client, mut rx) = ActorClient::new(10);

        tokio::spawn(async move {
            // Drop the event, and with it the callback.
            let _ = rx.recv().await;
        });

        assert!(matches!(client.status().await, Err(StatusError::ActorExited)));
    }
}
