use crate::commitlog::{Entry, Index, Log};
use bytes::{Buf, BufMut, BytesMut};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

const ENTRIES_FILE_NAME: &str = "entries.log";
const COMMIT_FILE_NAME: &str = "commit.idx";
const COMMIT_TMP_FILE_NAME: &str = "commit.idx.tmp";

// Record layout in `entries.log`:
//
// Bytes:
// 0    : data size
// 1    : data size
// 2    : data size
// 3    : data size
// V0   : data
// ...
// Vn   : data
//
// `commit.idx` holds a single u64 (little endian), the highest committed index. 0 means nothing
// is committed. It is replaced atomically via write-to-temp + rename.

/// FileLog is a durable log backed by a single append-only file inside a directory.
///
/// All records are also held in memory so reads never touch disk. Every mutation is synced
/// before returning. A torn record at the tail (crash mid-append) is discarded on open.
pub struct FileLog<E: Entry> {
    directory: PathBuf,
    file: File,
    // Byte offset where each record starts, plus the end of the last record.
    offsets: Vec<u64>,
    records: Vec<Vec<u8>>,
    committed_through: Option<Index>,
    // Set when a failed append couldn't be undone. The file may end in a torn record, so further
    // records would be unreadable after a restart.
    tail_poisoned: bool,
    _pd: PhantomData<E>,
}

impl<E: Entry> FileLog<E> {
    pub fn open<P: AsRef<Path>>(directory: P) -> Result<Self, io::Error> {
        let directory = directory.as_ref().to_path_buf();
        fs::create_dir_all(&directory)?;

        let entries_path = directory.join(ENTRIES_FILE_NAME);
        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&entries_path)?;

        let mut contents = Vec::new();
        file.read_to_end(&mut contents)?;
        let (offsets, records) = Self::decode_records(&contents);

        let valid_len = *offsets.last().unwrap_or(&0);
        if valid_len < contents.len() as u64 {
            file.set_len(valid_len)?;
            file.sync_all()?;
        }

        let mut log = FileLog {
            directory,
            file,
            offsets,
            records,
            committed_through: None,
            tail_poisoned: false,
            _pd: PhantomData::default(),
        };
        log.committed_through = log.read_commit_file()?;

        Ok(log)
    }

    fn decode_records(contents: &[u8]) -> (Vec<u64>, Vec<Vec<u8>>) {
        let mut offsets = vec![0u64];
        let mut records = Vec::new();
        let mut buf = contents;

        while buf.remaining() >= 4 {
            let len = (&buf[..4]).get_u32_le() as usize;
            if buf.remaining() < 4 + len {
                break;
            }
            buf.advance(4);
            records.push(buf[..len].to_vec());
            buf.advance(len);

            let last = *offsets.last().unwrap_or(&0);
            offsets.push(last + 4 + len as u64);
        }

        (offsets, records)
    }

    fn read_commit_file(&self) -> Result<Option<Index>, io::Error> {
        let bytes = match fs::read(self.directory.join(COMMIT_FILE_NAME)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        if bytes.len() != 8 {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "Corrupt commit index file"));
        }

        let committed = Index::from_u64_opt((&bytes[..]).get_u64_le());
        // Entries past the end of the log can't be committed locally.
        Ok(match (committed, self.last_index()) {
            (Some(committed), Some(last)) => Some(std::cmp::min(committed, last)),
            _ => None,
        })
    }

    fn vec_index(index: Index) -> usize {
        (index.as_u64() - 1) as usize
    }

    fn check_tail(&self) -> Result<(), io::Error> {
        if self.tail_poisoned {
            Err(io::Error::new(
                io::ErrorKind::Other,
                "Log file ends in a partial record that couldn't be removed",
            ))
        } else {
            Ok(())
        }
    }

    /// Cuts the file back to `valid_len` after a failed append, so the next record starts right
    /// after the last complete one. Returns the error that failed the append.
    fn abandon_partial_append(&mut self, valid_len: u64, cause: io::Error) -> io::Error {
        let cleanup = self.file.set_len(valid_len).and_then(|()| self.file.sync_all());
        if cleanup.is_err() {
            self.tail_poisoned = true;
        }
        cause
    }
}

impl<E: Entry> Log<E> for FileLog<E> {
    fn append(&mut self, entry: E) -> Result<Index, io::Error> {
        let data: Vec<u8> = entry.into();
        let mut record = BytesMut::with_capacity(4 + data.len());
        record.put_u32_le(data.len() as u32);
        record.put_slice(&data);

        self.check_tail()?;
        let last = *self.offsets.last().unwrap_or(&0);
        if let Err(e) = self.file.write_all(&record).and_then(|()| self.file.sync_data()) {
            return Err(self.abandon_partial_append(last, e));
        }

        self.offsets.push(last + record.len() as u64);
        self.records.push(data);

        Ok(Index::new_usize(self.records.len()))
    }

    fn read(&self, index: Index) -> Result<Option<E>, io::Error> {
        match self.records.get(Self::vec_index(index)) {
            None => Ok(None),
            Some(bytes) => E::try_from(bytes.clone()).map(Some),
        }
    }

    fn truncate(&mut self, index: Index) -> Result<(), io::Error> {
        let vec_index = Self::vec_index(index);
        if vec_index >= self.records.len() {
            return Ok(());
        }

        self.check_tail()?;
        let new_len = self.offsets[vec_index];
        self.file.set_len(new_len)?;
        self.file.sync_all()?;

        self.records.truncate(vec_index);
        self.offsets.truncate(vec_index + 1);

        Ok(())
    }

    fn next_index(&self) -> Index {
        Index::new_usize(self.records.len() + 1)
    }

    fn commit(&mut self, through: Index) -> Result<(), io::Error> {
        let tmp_path = self.directory.join(COMMIT_TMP_FILE_NAME);
        let mut tmp = File::create(&tmp_path)?;
        let mut bytes = BytesMut::with_capacity(8);
        bytes.put_u64_le(through.as_u64());
        tmp.write_all(&bytes)?;
        tmp.sync_all()?;
        fs::rename(&tmp_path, self.directory.join(COMMIT_FILE_NAME))?;

        self.committed_through.replace(through);
        Ok(())
    }

    fn committed_through(&self) -> Option<Index> {
        self.committed_through
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commitlog::in_memory::tests::TestEntry;
    use tempfile::TempDir;

    fn entry(i: u8) -> TestEntry {
        TestEntry(vec![i; i as usize])
    }

    #[test]
    fn reopen_restores_entries_and_commit() {
        let dir = TempDir::new().expect("tempdir");

        {
            let mut log = FileLog::<TestEntry>::open(dir.path()).unwrap();
            for i in 1..=4 {
                log.append(entry(i)).unwrap();
            }
            log.commit(Index::new(3)).unwrap();
        }

        let log = FileLog::<TestEntry>::open(dir.path()).unwrap();
        assert_eq!(log.next_index(), Index::new(5));
        assert_eq!(log.read(Index::new(2)).unwrap(), Some(entry(2)));
        assert_eq!(log.read(Index::new(4)).unwrap(), Some(entry(4)));
        assert_eq!(log.committed_through(), Some(Index::new(3)));
    }

    #[test]
    fn truncate_survives_reopen() {
        let dir = TempDir::new().expect("tempdir");

        {
            let mut log = FileLog::<TestEntry>::open(dir.path()).unwrap();
            for i in 1..=5 {
                log.append(entry(i)).unwrap();
            }
            log.truncate(Index::new(3)).unwrap();
            log.append(entry(9)).unwrap();
        }

        let log = FileLog::<TestEntry>::open(dir.path()).unwrap();
        assert_eq!(
            log.entries_from(Index::start_index()).unwrap(),
            vec![entry(1), entry(2), entry(9)]
        );
    }

    #[test]
    fn torn_tail_record_is_discarded() {
        let dir = TempDir::new().expect("tempdir");

        {
            let mut log = FileLog::<TestEntry>::open(dir.path()).unwrap();
            log.append(entry(1)).unwrap();
            log.append(entry(2)).unwrap();
        }

        // Simulate a crash halfway through writing a third record.
        let mut file = OpenOptions::new()
            .append(true)
            .open(dir.path().join(ENTRIES_FILE_NAME))
            .unwrap();
        file.write_all(&[10, 0, 0, 0, 1, 2]).unwrap();
        drop(file);

        let mut log = FileLog::<TestEntry>::open(dir.path()).unwrap();
        assert_eq!(log.next_index(), Index::new(3));
        log.append(entry(3)).unwrap();
        drop(log);

        let log = FileLog::<TestEntry>::open(dir.path()).unwrap();
        assert_eq!(log.read(Index::new(3)).unwrap(), Some(entry(3)));
    }

    #[test]
    fn partial_append_is_cut_off() {
        let dir = TempDir::new().expect("tempdir");
        let mut log = FileLog::<TestEntry>::open(dir.path()).unwrap();
        log.append(entry(1)).unwrap();
        log.append(entry(2)).unwrap();
        let valid_len = *log.offsets.last().unwrap();

        // Half a record reached the file before the write failed.
        log.file.write_all(&[10, 0, 0, 0, 1, 2]).unwrap();
        let cause = io::Error::new(io::ErrorKind::Other, "disk full");
        let returned = log.abandon_partial_append(valid_len, cause);
        assert_eq!(returned.to_string(), "disk full");
        assert_eq!(log.file.metadata().unwrap().len(), valid_len);

        log.append(entry(3)).unwrap();
        drop(log);

        let log = FileLog::<TestEntry>::open(dir.path()).unwrap();
        assert_eq!(
            log.entries_from(Index::start_index()).unwrap(),
            vec![entry(1), entry(2), entry(3)]
        );
    }

    #[test]
    fn failed_append_that_cannot_be_undone_blocks_later_writes() {
        let dir = TempDir::new().expect("tempdir");
        let mut log = FileLog::<TestEntry>::open(dir.path()).unwrap();
        log.append(entry(1)).unwrap();

        // A read only handle fails both the write and the cleanup.
        log.file = File::open(dir.path().join(ENTRIES_FILE_NAME)).unwrap();
        assert!(log.append(entry(2)).is_err());
        assert_eq!(log.next_index(), Index::new(2));

        log.file = OpenOptions::new()
            .append(true)
            .open(dir.path().join(ENTRIES_FILE_NAME))
            .unwrap();
        assert!(log.append(entry(2)).is_err());
        assert!(log.truncate(Index::new(1)).is_err());
        assert_eq!(log.read(Index::new(1)).unwrap(), Some(entry(1)));
    }
}
