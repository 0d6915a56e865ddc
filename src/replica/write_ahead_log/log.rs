use crate::commitlog;
use crate::commitlog::Index;
use crate::replica::local_state::Term;
use crate::replica::write_ahead_log::commit_stream::{CommitStreamPublisher, CommittedEntry};
use crate::replica::WriteAheadLogEntry;
use std::io;

/// WriteAheadLog is the raft-specific log facade.
///
/// Note: A log entry has 3 states (not modeled directly in code):
/// 1. Persisted - written to disk, not yet replicated to majority
/// 2. Committed - written to disk, replicated to majority
/// 3. Applied - a committed entry that has also been published to the commit stream
///
/// A log entry's state has no global truth. Each replica will have their own local view of what
/// state the log entry is in.
pub(crate) struct WriteAheadLog<L>
where
    L: commitlog::Log<WriteAheadLogEntry>,
{
    // Application's info/debug log.
    logger: slog::Logger,

    // This is the log that we're replicating.
    log: L,
    // Metadata about the highest log entry that we've locally written. It must be updated atomically.
    latest_entry_metadata: Option<(Term, Index)>,

    // Commit stream to publish committed entries to. To be consumed by the application layer to
    // apply committed entries to their state machine.
    commit_stream: CommitStreamPublisher,
    // Index of highest log entry known to be committed. None if nothing is committed.
    commit_index: Option<Index>,
    // Index of highest log entry published to the commit stream. None if nothing is published.
    last_applied_index: Option<Index>,
}

impl<L> WriteAheadLog<L>
where
    L: commitlog::Log<WriteAheadLogEntry>,
{
    /// Picks up wherever an existing log left off. Committed entries get re-published to the
    /// commit stream on the first `apply_all_committed_entries()`.
    pub(super) fn new(logger: slog::Logger, log: L, commit_stream: CommitStreamPublisher) -> Result<Self, io::Error> {
        let latest_entry_metadata = match log.last_index() {
            None => None,
            Some(last_index) => {
                let entry = log.read(last_index)?.ok_or_else(|| missing_entry(last_index))?;
                Some((entry.term, last_index))
            }
        };
        let commit_index = log.committed_through();

        slog::info!(
            logger,
            "Opened log. Latest entry: {:?}, commit index: {:?}",
            latest_entry_metadata,
            commit_index
        );

        Ok(WriteAheadLog {
            logger,
            log,
            latest_entry_metadata,
            commit_stream,
            commit_index,
            last_applied_index: None,
        })
    }

    pub(crate) fn latest_entry(&self) -> Option<(Term, Index)> {
        self.latest_entry_metadata
    }

    pub(crate) fn read(&self, index: Index) -> Result<Option<WriteAheadLogEntry>, io::Error> {
        self.log.read(index)
    }

    fn read_required(&self, index: Index) -> Result<WriteAheadLogEntry, io::Error> {
        self.read(index)?.ok_or_else(|| missing_entry(index))
    }

    /// Read up to `max_entries` contiguous entries starting at `index`.
    pub(crate) fn read_batch(&self, index: Index, max_entries: usize) -> Result<Vec<WriteAheadLogEntry>, io::Error> {
        let mut entries = Vec::new();
        let mut next = index;
        while entries.len() < max_entries {
            match self.read(next)? {
                Some(entry) => entries.push(entry),
                None => break,
            }
            next = next.plus(1);
        }

        Ok(entries)
    }

    pub(crate) fn entries_from(&self, index: Index) -> Result<Vec<WriteAheadLogEntry>, io::Error> {
        self.log.entries_from(index)
    }

    /// Remove anything starting at `index` and later. Committed entries are never removed.
    pub(crate) fn truncate(&mut self, index: Index) -> Result<(), io::Error> {
        if matches!(self.commit_index, Some(ci) if index <= ci) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "Refusing to truncate at {:?}, entries through {:?} are committed",
                    index, self.commit_index
                ),
            ));
        }

        let mut new_latest_entry_metadata = None;
        if let Some(new_latest_entry_index) = index.checked_minus(1) {
            new_latest_entry_metadata = self
                .read(new_latest_entry_index)?
                .map(|latest_entry| (latest_entry.term, new_latest_entry_index));
        }

        self.log.truncate(index)?;

        self.latest_entry_metadata = new_latest_entry_metadata;
        Ok(())
    }

    pub(crate) fn append(&mut self, entry: WriteAheadLogEntry) -> Result<Index, io::Error> {
        let appended_term = entry.term;
        let appended_index = self.log.append(entry)?;
        // Only update state after log action completes.
        self.latest_entry_metadata = Some((appended_term, appended_index));

        Ok(appended_index)
    }

    pub(crate) fn commit_index(&self) -> Option<Index> {
        self.commit_index
    }

    pub(crate) fn is_committed(&self, index: Index) -> bool {
        matches!(self.commit_index, Some(ci) if index <= ci)
    }

    /// Leader path. Returns true if the commit index moved.
    pub(crate) fn ratchet_fwd_commit_index_if_valid(
        &mut self,
        tentative_new_commit_index: Index,
        current_term: Term,
    ) -> Result<bool, io::Error> {
        if self.is_committed(tentative_new_commit_index) {
            return Ok(false);
        }

        // > If there exists an N such that N > commitIndex, a majority
        // > of matchIndex[i] ≥ N, and log[N].term == currentTerm:
        // > set commitIndex = N (§5.3, §5.4).
        let entry = self.read_required(tentative_new_commit_index)?;
        if entry.term != current_term {
            return Ok(false);
        }

        self.ratchet_fwd_commit_index(tentative_new_commit_index)
    }

    /// Follower path. Never moves backwards, and never past our own log. Returns true if the
    /// commit index moved.
    pub(crate) fn ratchet_fwd_commit_index(&mut self, new_commit_index: Index) -> Result<bool, io::Error> {
        if self.is_committed(new_commit_index) {
            return Ok(false);
        }

        let latest_locally_written_index = match self.latest_entry_metadata {
            Some((_, index)) => index,
            None => {
                slog::warn!(
                    self.logger,
                    "Can't commit through {:?}, local log is empty.",
                    new_commit_index
                );
                return Ok(false);
            }
        };
        if new_commit_index > latest_locally_written_index {
            slog::warn!(
                self.logger,
                "Can't ratchet commit index forwards past our local log. Latest: {:?}, requested: {:?}",
                latest_locally_written_index,
                new_commit_index,
            );
            return Ok(false);
        }

        self.log.commit(new_commit_index)?;
        self.commit_index.replace(new_commit_index);

        Ok(true)
    }

    /// apply_all_committed_entries publishes all committed but unpublished entries in order.
    pub(crate) fn apply_all_committed_entries(&mut self) {
        if let Err(e) = self.try_apply_all_committed_entries() {
            // We've already persisted the log. Publishing committed entries is not on critical
            // path. We can wait to retry next time.
            slog::error!(self.logger, "Failed to apply a log entry. {:?}", e);
        }
    }

    fn try_apply_all_committed_entries(&mut self) -> Result<(), io::Error> {
        let commit_index = match self.commit_index {
            Some(ci) => ci,
            None => return Ok(()),
        };

        let mut next_index = match self.last_applied_index {
            None => Index::start_index(),
            Some(applied) => applied.plus(1),
        };
        while next_index <= commit_index {
            let entry = self.read_required(next_index)?;
            self.commit_stream.notify_commit(
                &self.logger,
                CommittedEntry {
                    term: entry.term,
                    index: next_index,
                    payload: entry.payload,
                    source_tag: entry.source_tag,
                },
            );
            self.last_applied_index.replace(next_index);
            next_index = next_index.plus(1);
        }

        Ok(())
    }
}

fn missing_entry(index: Index) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("No log entry at index {:?}", index),
    )
}

#[cfg(test)]
mod tests {
    use crate::commitlog::{InMemoryLog, Index, Log};
    use crate::replica::write_ahead_log::{self, WriteAheadLog};
    use crate::replica::{CommitStream, Term, WriteAheadLogEntry};
    use bytes::Bytes;

    fn entry(term: u64, payload: &'static str) -> WriteAheadLogEntry {
        WriteAheadLogEntry::new(Term::new(term), Bytes::from_static(payload.as_bytes()), "test".into())
    }

    fn wal_with(log: InMemoryLog<WriteAheadLogEntry>) -> (WriteAheadLog<InMemoryLog<WriteAheadLogEntry>>, CommitStream) {
        let logger = slog::Logger::root(slog::Discard, slog::o!());
        write_ahead_log::wired(logger, log).unwrap()
    }

    fn empty_wal() -> (WriteAheadLog<InMemoryLog<WriteAheadLogEntry>>, CommitStream) {
        wal_with(InMemoryLog::create().unwrap())
    }

    #[tokio::test]
    async fn commits_are_published_in_order() {
        let (mut wal, mut stream) = empty_wal();
        for payload in &["a", "b", "c"] {
            wal.append(entry(1, payload)).unwrap();
        }

        assert!(wal.ratchet_fwd_commit_index(Index::new(2)).unwrap());
        wal.apply_all_committed_entries();
        assert!(wal.ratchet_fwd_commit_index(Index::new(3)).unwrap());
        wal.apply_all_committed_entries();

        for (i, payload) in ["a", "b", "c"].iter().enumerate() {
            let committed = stream.recv().await.unwrap();
            assert_eq!(committed.index, Index::new_usize(i + 1));
            assert_eq!(committed.payload, Bytes::from_static(payload.as_bytes()));
        }
    }

    #[test]
    fn commit_index_never_moves_backwards_or_past_log() {
        let (mut wal, _stream) = empty_wal();
        wal.append(entry(1, "a")).unwrap();
        wal.append(entry(1, "b")).unwrap();

        assert!(!wal.ratchet_fwd_commit_index(Index::new(5)).unwrap());
        assert!(wal.ratchet_fwd_commit_index(Index::new(2)).unwrap());
        assert!(!wal.ratchet_fwd_commit_index(Index::new(1)).unwrap());
        assert_eq!(wal.commit_index(), Some(Index::new(2)));
    }

    #[test]
    fn leader_only_commits_current_term_entries() {
        let (mut wal, _stream) = empty_wal();
        wal.append(entry(1, "old")).unwrap();
        wal.append(entry(2, "new")).unwrap();

        assert!(!wal.ratchet_fwd_commit_index_if_valid(Index::new(1), Term::new(2)).unwrap());
        assert_eq!(wal.commit_index(), None);
        assert!(wal.ratchet_fwd_commit_index_if_valid(Index::new(2), Term::new(2)).unwrap());
        assert_eq!(wal.commit_index(), Some(Index::new(2)));
    }

    #[test]
    fn truncate_refuses_committed_entries() {
        let (mut wal, _stream) = empty_wal();
        for payload in &["a", "b", "c"] {
            wal.append(entry(1, payload)).unwrap();
        }
        wal.ratchet_fwd_commit_index(Index::new(2)).unwrap();

        assert!(wal.truncate(Index::new(2)).is_err());
        wal.truncate(Index::new(3)).unwrap();
        assert_eq!(wal.latest_entry(), Some((Term::new(1), Index::new(2))));
    }

    #[tokio::test]
    async fn reopen_restores_state_and_republishes() {
        let mut log = InMemoryLog::create().unwrap();
        log.append(entry(1, "a")).unwrap();
        log.append(entry(3, "b")).unwrap();
        log.commit(Index::new(1)).unwrap();

        let (mut wal, mut stream) = wal_with(log);
        assert_eq!(wal.latest_entry(), Some((Term::new(3), Index::new(2))));
        assert_eq!(wal.commit_index(), Some(Index::new(1)));

        wal.apply_all_committed_entries();
        let committed = stream.recv().await.unwrap();
        assert_eq!(committed.index, Index::new(1));
        assert_eq!(committed.term, Term::new(1));
    }
}
