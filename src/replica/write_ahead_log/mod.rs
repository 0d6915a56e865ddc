//! This module is a raft-specific commit log that wraps the generic commit log. The generic log
//! only knows bytes and indexes; this layer knows terms, commit rules and the commit stream.

mod commit_stream;
mod log;
mod log_entry;
mod wiring;

pub(crate) use commit_stream::CommitStream;
pub(crate) use commit_stream::CommittedEntry;
pub(crate) use log::WriteAheadLog;
pub(crate) use log_entry::timestamp_from_millis;
pub(crate) use log_entry::WriteAheadLogEntry;
pub(crate) use wiring::wired;
