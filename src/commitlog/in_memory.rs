use crate::commitlog::{Entry, Index, Log};
use std::convert::TryFrom;
use std::io;
use std::marker::PhantomData;

/// InMemoryLog keeps every entry in RAM. Nothing survives a restart, so it is meant for tests
/// and throwaway clusters. See file_log.rs for the durable version.
pub struct InMemoryLog<E: Entry> {
    // We don't *need* to convert these to bytes. We could just hold the original entry in memory,
    // but we want to exercise the conversion logic.
    log: Vec<Vec<u8>>,
    committed_through: Option<Index>,
    _pd: PhantomData<E>,
}

impl<E: Entry> InMemoryLog<E> {
    pub fn create() -> Result<Self, io::Error> {
        Ok(InMemoryLog {
            log: vec![],
            committed_through: None,
            _pd: PhantomData::default(),
        })
    }

    fn vec_index(index: Index) -> usize {
        // Log API states that Index starts from 1.
        (index.as_u64() - 1) as usize
    }
}

impl<E: Entry> Log<E> for InMemoryLog<E> {
    fn append(&mut self, entry: E) -> Result<Index, io::Error> {
        self.log.push(entry.into());

        Ok(Index::new_usize(self.log.len()))
    }

    fn read(&self, index: Index) -> Result<Option<E>, io::Error> {
        match self.log.get(Self::vec_index(index)) {
            None => Ok(None),
            Some(bytes) => E::try_from(bytes.clone()).map(Some),
        }
    }

    fn truncate(&mut self, index: Index) -> Result<(), io::Error> {
        self.log.truncate(Self::vec_index(index));
        Ok(())
    }

    fn next_index(&self) -> Index {
        Index::new_usize(self.log.len() + 1)
    }

    fn commit(&mut self, through: Index) -> Result<(), io::Error> {
        self.committed_through.replace(through);
        Ok(())
    }

    fn committed_through(&self) -> Option<Index> {
        self.committed_through
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Minimal entry type for exercising logs without depending on the raft entry format.
    #[derive(Clone, Debug, PartialEq)]
    pub(crate) struct TestEntry(pub(crate) Vec<u8>);

    impl Entry for TestEntry {}

    impl TryFrom<Vec<u8>> for TestEntry {
        type Error = io::Error;

        fn try_from(bytes: Vec<u8>) -> Result<Self, Self::Error> {
            Ok(TestEntry(bytes))
        }
    }

    impl From<TestEntry> for Vec<u8> {
        fn from(entry: TestEntry) -> Self {
            entry.0
        }
    }

    #[test]
    fn append_read_truncate() {
        let mut log = InMemoryLog::<TestEntry>::create().unwrap();
        assert_eq!(log.next_index(), Index::start_index());
        assert_eq!(log.last_index(), None);

        for i in 1..=5u8 {
            let index = log.append(TestEntry(vec![i])).unwrap();
            assert_eq!(index, Index::new(i as u64));
        }
        assert_eq!(log.last_index(), Some(Index::new(5)));
        assert_eq!(log.read(Index::new(3)).unwrap(), Some(TestEntry(vec![3])));
        assert_eq!(log.read(Index::new(6)).unwrap(), None);

        log.truncate(Index::new(4)).unwrap();
        assert_eq!(log.next_index(), Index::new(4));
        assert_eq!(
            log.entries_from(Index::new(2)).unwrap(),
            vec![TestEntry(vec![2]), TestEntry(vec![3])]
        );
    }

    #[test]
    fn commit_watermark() {
        let mut log = InMemoryLog::<TestEntry>::create().unwrap();
        assert_eq!(log.committed_through(), None);
        log.append(TestEntry(vec![1])).unwrap();
        log.commit(Index::start_index()).unwrap();
        assert_eq!(log.committed_through(), Some(Index::start_index()));
    }
}
