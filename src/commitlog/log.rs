use std::convert::TryFrom;
use std::{fmt, io};

#[derive(Copy, Clone, PartialOrd, PartialEq, Ord, Eq, Hash)]
struct U64NonZero(u64);

impl U64NonZero {
    fn new(val: u64) -> Self {
        assert_ne!(val, 0);
        U64NonZero(val)
    }
}

/// Index is an index of an entry in the log; i.e. a log entry's index.
#[derive(Copy, Clone, PartialOrd, PartialEq, Ord, Eq, Hash)]
pub struct Index(U64NonZero);

impl Index {
    pub fn new(index: u64) -> Self {
        Index(U64NonZero::new(index))
    }

    pub fn new_usize(index: usize) -> Self {
        Self::new(index as u64)
    }

    /// Wire and storage formats use 0 for "no entry".
    pub fn from_u64_opt(index: u64) -> Option<Self> {
        match index {
            0 => None,
            i => Some(Self::new(i)),
        }
    }

    pub fn start_index() -> Self {
        Self::new(1)
    }

    pub fn as_u64(&self) -> u64 {
        self.0 .0
    }

    pub fn plus(&self, delta: u64) -> Index {
        Index::new(self.as_u64() + delta)
    }

    pub fn checked_minus(&self, delta: u64) -> Option<Index> {
        self.as_u64().checked_sub(delta).and_then(Self::from_u64_opt)
    }
}

impl fmt::Debug for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0 .0)
    }
}

/// Log is an append only log intended for use as a replicated commit log in a database.
///
/// Log indexes entries starting from 1. There will be no entry existing at index 0. The first
/// entry is written at index 1.
///
/// Besides the entries themselves, a log durably tracks a commit watermark: every entry at or
/// below it is committed and must never be truncated.
pub trait Log<E: Entry> {
    /// append() appends a log entry to the log at the next log entry index, then returns
    /// the log entry index that was just used to append the entry.
    fn append(&mut self, entry: E) -> Result<Index, io::Error>;

    /// Read log entry at specified index.
    fn read(&self, index: Index) -> Result<Option<E>, io::Error>;

    /// Deletes anything starting at `index` and later.
    fn truncate(&mut self, index: Index) -> Result<(), io::Error>;

    /// next_index returns the next index that will be used to append an entry.
    fn next_index(&self) -> Index;

    /// Highest index present in the log, or None if the log is empty.
    fn last_index(&self) -> Option<Index> {
        self.next_index().checked_minus(1)
    }

    /// Read every entry starting at `index` through the end of the log.
    fn entries_from(&self, index: Index) -> Result<Vec<E>, io::Error> {
        let mut entries = Vec::new();
        let mut next = index;
        while let Some(entry) = self.read(next)? {
            entries.push(entry);
            next = next.plus(1);
        }

        Ok(entries)
    }

    /// Durably record that every entry up to and including `through` is committed.
    fn commit(&mut self, through: Index) -> Result<(), io::Error>;

    fn committed_through(&self) -> Option<Index>;
}

pub trait Entry: Clone + TryFrom<Vec<u8>, Error = io::Error> + Into<Vec<u8>> {}
