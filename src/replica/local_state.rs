use crate::replica::peers::ReplicaId;
use bytes::{Buf, BufMut, BytesMut};
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Copy, Clone, PartialOrd, PartialEq, Ord, Eq)]
pub(crate) struct Term(u64);

impl Term {
    pub(crate) fn new(term: u64) -> Self {
        Term(term)
    }

    pub(crate) fn as_u64(&self) -> u64 {
        self.0
    }

    pub(crate) fn incr(&mut self) {
        self.0 += 1;
    }
}

impl fmt::Debug for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// PersistentLocalState holds the term and vote record. Everything here must survive a restart
/// for raft to stay safe, and all mutations happen from the replica actor only.
///
/// Methods that mutate state behave like a CAS: they return true iff they changed something.
/// A change is durable before the method returns. On error nothing has changed.
pub(crate) trait PersistentLocalState: Send {
    /// Adopt `remote_term` iff it is larger than the current term. Adopting a term clears the
    /// vote. Returns true if our term was stale.
    fn observe_term(&mut self, remote_term: Term) -> Result<bool, io::Error>;

    /// Grant a vote iff `candidate_term >= current term` and we haven't voted for someone else
    /// in that term. Granting to the same candidate twice in one term returns true both times.
    fn try_grant_vote(&mut self, candidate_term: Term, candidate_id: &ReplicaId) -> Result<bool, io::Error>;

    /// Return the new term. Used when transitioning to candidate.
    fn increment_term_and_vote_for_self(&mut self) -> Result<Term, io::Error>;

    fn current_term(&self) -> Term;
    fn voted_for_current_term(&self) -> (Term, Option<Arc<ReplicaId>>);
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct VoteRecord {
    current_term: Term,
    voted_for: Option<Arc<ReplicaId>>,
}

impl VoteRecord {
    fn initial() -> Self {
        VoteRecord {
            current_term: Term::new(0),
            voted_for: None,
        }
    }
}

/// Where a vote record lives. Implementors only store and load, the raft rules are shared.
pub(crate) trait VoteRecordStore: Send {
    fn record(&self) -> &VoteRecord;
    /// Must not change `record()` unless the new record is durable.
    fn store(&mut self, record: VoteRecord) -> Result<(), io::Error>;
    fn my_replica_id(&self) -> &Arc<ReplicaId>;
}

impl<S: VoteRecordStore> PersistentLocalState for S {
    fn observe_term(&mut self, remote_term: Term) -> Result<bool, io::Error> {
        if remote_term <= self.record().current_term {
            return Ok(false);
        }

        self.store(VoteRecord {
            current_term: remote_term,
            voted_for: None,
        })?;
        Ok(true)
    }

    fn try_grant_vote(&mut self, candidate_term: Term, candidate_id: &ReplicaId) -> Result<bool, io::Error> {
        let current = self.record();
        if candidate_term < current.current_term {
            return Ok(false);
        }

        let voted_for = if candidate_term > current.current_term {
            None
        } else {
            current.voted_for.clone()
        };
        match voted_for {
            Some(voted_for) => Ok(voted_for.as_ref() == candidate_id),
            None => {
                // Term and vote land in one write.
                self.store(VoteRecord {
                    current_term: candidate_term,
                    voted_for: Some(Arc::new(candidate_id.clone())),
                })?;
                Ok(true)
            }
        }
    }

    fn increment_term_and_vote_for_self(&mut self) -> Result<Term, io::Error> {
        let mut new_term = self.record().current_term;
        new_term.incr();
        let me = self.my_replica_id().clone();

        self.store(VoteRecord {
            current_term: new_term,
            voted_for: Some(me),
        })?;
        Ok(new_term)
    }

    fn current_term(&self) -> Term {
        self.record().current_term
    }

    fn voted_for_current_term(&self) -> (Term, Option<Arc<ReplicaId>>) {
        let record = self.record();
        (record.current_term, record.voted_for.clone())
    }
}

/// Keeps term and vote in memory only. Used with in-memory logs, where a restart loses the log
/// as well.
pub(crate) struct VolatileLocalState {
    record: VoteRecord,
    my_replica_id: Arc<ReplicaId>,
}

impl VolatileLocalState {
    pub(crate) fn new(my_replica_id: ReplicaId) -> Self {
        VolatileLocalState {
            record: VoteRecord::initial(),
            my_replica_id: Arc::new(my_replica_id),
        }
    }
}

impl VoteRecordStore for VolatileLocalState {
    fn record(&self) -> &VoteRecord {
        &self.record
    }

    fn store(&mut self, record: VoteRecord) -> Result<(), io::Error> {
        self.record = record;
        Ok(())
    }

    fn my_replica_id(&self) -> &Arc<ReplicaId> {
        &self.my_replica_id
    }
}

const VOTE_FILE_NAME: &str = "vote.state";
const VOTE_TMP_FILE_NAME: &str = "vote.state.tmp";

// Layout of `vote.state`, little endian:
//
// 8 bytes : current term
// 4 bytes : length of the voted for replica id, 0 if no vote this term
// n bytes : voted for replica id (utf-8)
//
// Replaced atomically via write-to-temp + rename, the same way as the log's commit index.

/// FileLocalState keeps term and vote in a file next to a `FileLog`, so a restarted replica
/// remembers who it voted for.
pub(crate) struct FileLocalState {
    directory: PathBuf,
    record: VoteRecord,
    my_replica_id: Arc<ReplicaId>,
}

impl FileLocalState {
    pub(crate) fn open<P: AsRef<Path>>(directory: P, my_replica_id: ReplicaId) -> Result<Self, io::Error> {
        let directory = directory.as_ref().to_path_buf();
        fs::create_dir_all(&directory)?;

        let record = match fs::read(directory.join(VOTE_FILE_NAME)) {
            Ok(bytes) => Self::decode(&bytes)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => VoteRecord::initial(),
            Err(e) => return Err(e),
        };

        Ok(FileLocalState {
            directory,
            record,
            my_replica_id: Arc::new(my_replica_id),
        })
    }

    fn encode(record: &VoteRecord) -> BytesMut {
        let voted_for = record.voted_for.as_ref().map_or("", |id| id.as_str());
        let mut bytes = BytesMut::with_capacity(12 + voted_for.len());
        bytes.put_u64_le(record.current_term.as_u64());
        bytes.put_u32_le(voted_for.len() as u32);
        bytes.put_slice(voted_for.as_bytes());
        bytes
    }

    fn decode(mut bytes: &[u8]) -> Result<VoteRecord, io::Error> {
        let corrupt = || io::Error::new(io::ErrorKind::InvalidData, "Corrupt vote state file");

        if bytes.remaining() < 12 {
            return Err(corrupt());
        }
        let current_term = Term::new(bytes.get_u64_le());
        let len = bytes.get_u32_le() as usize;
        if bytes.remaining() != len {
            return Err(corrupt());
        }

        let voted_for = match len {
            0 => None,
            _ => {
                let id = String::from_utf8(bytes.to_vec()).map_err(|_| corrupt())?;
                Some(Arc::new(ReplicaId::new(id)))
            }
        };

        Ok(VoteRecord {
            current_term,
            voted_for,
        })
    }
}

impl VoteRecordStore for FileLocalState {
    fn record(&self) -> &VoteRecord {
        &self.record
    }

    fn store(&mut self, record: VoteRecord) -> Result<(), io::Error> {
        let tmp_path = self.directory.join(VOTE_TMP_FILE_NAME);
        let mut tmp = File::create(&tmp_path)?;
        tmp.write_all(&Self::encode(&record))?;
        tmp.sync_all()?;
        fs::rename(&tmp_path, self.directory.join(VOTE_FILE_NAME))?;

        self.record = record;
        Ok(())
    }

    fn my_replica_id(&self) -> &Arc<ReplicaId> {
        &self.my_replica_id
    }
}
