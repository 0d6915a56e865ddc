use crate::commitlog;
use crate::replica::write_ahead_log::{commit_stream, WriteAheadLog};
use crate::replica::{CommitStream, WriteAheadLogEntry};
use std::io;

pub(crate) fn wired<L>(logger: slog::Logger, log: L) -> Result<(WriteAheadLog<L>, CommitStream), io::Error>
where
    L: commitlog::Log<WriteAheadLogEntry>,
{
    let (publisher, stream) = commit_stream::new();

    let wal = WriteAheadLog::new(logger, log, publisher)?;

    Ok((wal, stream))
}
