use crate::commitlog;
use crate::replica::Term;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use chrono::{DateTime, TimeZone, Utc};
use std::convert::TryFrom;
use std::io;

/// Byte representation:
///
/// ```text
/// |                                         1                       2                   |
/// | 0 | 1 | 2 | 3 | 4 | 5 | 6 | 7 | 8 | 9 | 0 | ... | 6 | 7 | 8 | 9 | ...   | ...     |
/// +---+---+---+---+---+---+---+---+---+---+---+-...-+---+---+---+---+-...---+-...-----+
/// |Vrs|       Term (8 bytes)          |  CreatedAt (8 bytes)  |TagLen |Tag ...|Data ... |
/// +---+-------------------------------+-----------------------+-------+-------+---------+
/// ```
///
/// * `Vrs` - version of the serialized payload
/// * `Term` - raft leadership term when this entry was created
/// * `CreatedAt` - leader's wall clock when the entry was created, millis since epoch
/// * `TagLen` - length of `Tag` in bytes (u16)
/// * `Tag` - utf-8 source tag identifying who wrote the entry
/// * `Data` - app specific data payload
///
/// All integers are little endian. Checksum is not needed, it's guaranteed by underlying
/// commitlog. Size of `Data` is not needed; the underlying commitlog will give us the correctly
/// allocated array.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct WriteAheadLogEntry {
    pub term: Term,
    pub payload: Bytes,
    pub source_tag: String,
    pub created_at: DateTime<Utc>,
}

const RAFT_LOG_ENTRY_FORMAT_VERSION: u8 = 2;
const HEADER_LEN: usize = 1 + 8 + 8 + 2;

impl WriteAheadLogEntry {
    /// New entry stamped with the current time, at the millisecond precision we persist.
    pub(crate) fn new(term: Term, payload: Bytes, source_tag: String) -> Self {
        let now = Utc::now();
        WriteAheadLogEntry {
            term,
            payload,
            source_tag,
            created_at: timestamp_from_millis(now.timestamp_millis()).unwrap_or(now),
        }
    }
}

pub(crate) fn timestamp_from_millis(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

impl commitlog::Entry for WriteAheadLogEntry {}

impl TryFrom<Vec<u8>> for WriteAheadLogEntry {
    type Error = io::Error;

    fn try_from(bytes: Vec<u8>) -> Result<Self, Self::Error> {
        if bytes.len() < HEADER_LEN {
            return Err(invalid_data("Log entry shorter than header"));
        }

        let mut buf = Bytes::from(bytes);
        let version = buf.get_u8();
        if version != RAFT_LOG_ENTRY_FORMAT_VERSION {
            return Err(invalid_data("Unknown log entry format version"));
        }

        let term = Term::new(buf.get_u64_le());
        let created_at =
            timestamp_from_millis(buf.get_i64_le()).ok_or_else(|| invalid_data("Log entry timestamp out of range"))?;

        let tag_len = buf.get_u16_le() as usize;
        if buf.remaining() < tag_len {
            return Err(invalid_data("Log entry source tag is truncated"));
        }
        let tag_bytes = buf.split_to(tag_len);
        let source_tag =
            String::from_utf8(tag_bytes.to_vec()).map_err(|_| invalid_data("Log entry source tag is not utf-8"))?;

        Ok(WriteAheadLogEntry {
            term,
            payload: buf,
            source_tag,
            created_at,
        })
    }
}

impl From<WriteAheadLogEntry> for Vec<u8> {
    fn from(entry: WriteAheadLogEntry) -> Self {
        let tag = entry.source_tag.as_bytes();
        // Tags are short labels; anything absurdly long gets cut rather than corrupting the frame.
        let tag = &tag[..std::cmp::min(tag.len(), u16::MAX as usize)];

        let mut bytes = BytesMut::with_capacity(HEADER_LEN + tag.len() + entry.payload.len());
        bytes.put_u8(RAFT_LOG_ENTRY_FORMAT_VERSION);
        bytes.put_u64_le(entry.term.as_u64());
        bytes.put_i64_le(entry.created_at.timestamp_millis());
        bytes.put_u16_le(tag.len() as u16);
        bytes.put_slice(tag);
        bytes.put_slice(&entry.payload);

        bytes.to_vec()
    }
}

fn invalid_data(message: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoding_preserves_all_fields() {
        let entry = WriteAheadLogEntry::new(Term::new(7), Bytes::from_static(b"hello"), "gateway-1".into());

        let bytes: Vec<u8> = entry.clone().into();
        assert_eq!(bytes[0], RAFT_LOG_ENTRY_FORMAT_VERSION);
        assert_eq!(bytes.len(), HEADER_LEN + "gateway-1".len() + "hello".len());

        let decoded = WriteAheadLogEntry::try_from(bytes).unwrap();
        assert_eq!(decoded, entry);
    }

    #[test]
    fn empty_tag_and_payload() {
        let entry = WriteAheadLogEntry::new(Term::new(1), Bytes::new(), String::new());
        let decoded = WriteAheadLogEntry::try_from(Vec::<u8>::from(entry.clone())).unwrap();
        assert_eq!(decoded, entry);
    }

    #[test]
    fn rejects_malformed_bytes() {
        assert!(WriteAheadLogEntry::try_from(vec![RAFT_LOG_ENTRY_FORMAT_VERSION, 1, 2]).is_err());

        let entry = WriteAheadLogEntry::new(Term::new(1), Bytes::new(), "tag".into());
        let mut bytes: Vec<u8> = entry.into();
        bytes[0] = 1;
        assert_eq!(
            WriteAheadLogEntry::try_from(bytes).unwrap_err().kind(),
            io::ErrorKind::InvalidData
        );

        // Tag length claims more bytes than present.
        let mut bytes = vec![RAFT_LOG_ENTRY_FORMAT_VERSION];
        bytes.extend_from_slice(&[0; 16]);
        bytes.extend_from_slice(&[9, 0, b'a']);
        assert!(WriteAheadLogEntry::try_from(bytes).is_err());
    }
}
