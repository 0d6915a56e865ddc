use crate::commitlog::Index;
use crate::grpc::{
    ProtoAppendEntriesReply, ProtoAppendEntriesReq, ProtoLogEntry, ProtoRequestVoteReply, ProtoRequestVoteReq,
};
use crate::replica::{
    timestamp_from_millis, AppendEntriesInput, AppendEntriesOutput, ReplicaId, RequestVoteInput, RequestVoteOutput,
    Term, WriteAheadLogEntry,
};
use bytes::Bytes;

#[derive(Debug, thiserror::Error)]
pub(crate) enum MalformedMessage {
    #[error("Log entry can't have index 0 and term {0}")]
    IndexZeroWithTerm(u64),
    #[error("Log entry at position {position} claims index {claimed}, expected {expected}")]
    NonContiguousEntry { position: usize, claimed: u64, expected: u64 },
    #[error("Log entry has invalid timestamp {0}")]
    InvalidTimestamp(i64),
    #[error("Log entries after index {previous} at position {position} overflow the index space")]
    IndexOverflow { previous: u64, position: usize },
}

// ------- Request Vote --------

pub(crate) fn request_vote_to_proto(input: RequestVoteInput) -> ProtoRequestVoteReq {
    let (last_log_entry_term, last_log_entry_index) = log_entry_metadata_to_proto(input.candidate_last_log_entry);

    ProtoRequestVoteReq {
        candidate_id: input.candidate_id.into_inner(),
        term: input.candidate_term.as_u64(),
        last_log_entry_index,
        last_log_entry_term,
    }
}

pub(crate) fn request_vote_from_proto(rpc_request: ProtoRequestVoteReq) -> Result<RequestVoteInput, MalformedMessage> {
    let candidate_last_log_entry =
        log_entry_metadata_from_proto(rpc_request.last_log_entry_term, rpc_request.last_log_entry_index)?;

    Ok(RequestVoteInput {
        candidate_term: Term::new(rpc_request.term),
        candidate_id: ReplicaId::new(rpc_request.candidate_id),
        candidate_last_log_entry,
    })
}

pub(crate) fn request_vote_reply_to_proto(output: RequestVoteOutput) -> ProtoRequestVoteReply {
    ProtoRequestVoteReply {
        term: output.term.as_u64(),
        vote_granted: output.vote_granted,
    }
}

pub(crate) fn request_vote_reply_from_proto(rpc_reply: ProtoRequestVoteReply) -> RequestVoteOutput {
    RequestVoteOutput {
        term: Term::new(rpc_reply.term),
        vote_granted: rpc_reply.vote_granted,
    }
}

// ------- Append Entries --------

pub(crate) fn append_entries_to_proto(input: AppendEntriesInput) -> ProtoAppendEntriesReq {
    let (previous_log_entry_term, previous_log_entry_index) =
        log_entry_metadata_to_proto(input.leader_previous_log_entry);

    // Indexes come from our own log, which can't come near u64::MAX.
    let first_new_index = previous_log_entry_index.saturating_add(1);
    let new_entries = input
        .new_entries
        .into_iter()
        .enumerate()
        .map(|(i, entry)| ProtoLogEntry {
            term: entry.term.as_u64(),
            index: first_new_index.saturating_add(i as u64),
            payload: entry.payload.to_vec(),
            source_tag: entry.source_tag,
            created_at_millis: entry.created_at.timestamp_millis(),
        })
        .collect();

    ProtoAppendEntriesReq {
        leader_id: input.leader_id.into_inner(),
        term: input.leader_term.as_u64(),
        previous_log_entry_index,
        previous_log_entry_term,
        commit_index: input.leader_commit_index.map(|i| i.as_u64()).unwrap_or(0),
        new_entries,
    }
}

pub(crate) fn append_entries_from_proto(
    rpc_request: ProtoAppendEntriesReq,
) -> Result<AppendEntriesInput, MalformedMessage> {
    let leader_previous_log_entry =
        log_entry_metadata_from_proto(rpc_request.previous_log_entry_term, rpc_request.previous_log_entry_index)?;

    let previous = rpc_request.previous_log_entry_index;
    let mut new_entries = Vec::with_capacity(rpc_request.new_entries.len());
    for (position, proto_entry) in rpc_request.new_entries.into_iter().enumerate() {
        let expected = previous
            .checked_add(1)
            .and_then(|first_new_index| first_new_index.checked_add(position as u64))
            .ok_or(MalformedMessage::IndexOverflow { previous, position })?;
        if proto_entry.index != expected {
            return Err(MalformedMessage::NonContiguousEntry {
                position,
                claimed: proto_entry.index,
                expected,
            });
        }

        let created_at = timestamp_from_millis(proto_entry.created_at_millis)
            .ok_or(MalformedMessage::InvalidTimestamp(proto_entry.created_at_millis))?;
        new_entries.push(WriteAheadLogEntry {
            term: Term::new(proto_entry.term),
            payload: Bytes::from(proto_entry.payload),
            source_tag: proto_entry.source_tag,
            created_at,
        });
    }

    Ok(AppendEntriesInput {
        leader_term: Term::new(rpc_request.term),
        leader_id: ReplicaId::new(rpc_request.leader_id),
        leader_previous_log_entry,
        leader_commit_index: Index::from_u64_opt(rpc_request.commit_index),
        new_entries,
    })
}

pub(crate) fn append_entries_reply_to_proto(output: AppendEntriesOutput) -> ProtoAppendEntriesReply {
    ProtoAppendEntriesReply {
        term: output.term.as_u64(),
        success: output.success,
    }
}

pub(crate) fn append_entries_reply_from_proto(rpc_reply: ProtoAppendEntriesReply) -> AppendEntriesOutput {
    AppendEntriesOutput {
        term: Term::new(rpc_reply.term),
        success: rpc_reply.success,
    }
}

// ------- Shared --------

fn log_entry_metadata_to_proto(metadata: Option<(Term, Index)>) -> (u64, u64) {
    match metadata {
        None => (0, 0),
        Some((term, index)) => (term.as_u64(), index.as_u64()),
    }
}

fn log_entry_metadata_from_proto(term: u64, index: u64) -> Result<Option<(Term, Index)>, MalformedMessage> {
    match Index::from_u64_opt(index) {
        Some(index) => Ok(Some((Term::new(term), index))),
        None if term == 0 => Ok(None),
        None => Err(MalformedMessage::IndexZeroWithTerm(term)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(term: u64, payload: &'static str) -> WriteAheadLogEntry {
        WriteAheadLogEntry::new(Term::new(term), Bytes::from(payload), "tag".to_string())
    }

    #[test]
    fn append_entries_numbers_entries_after_previous() {
        let input = AppendEntriesInput {
            leader_term: Term::new(4),
            leader_id: ReplicaId::new("leader"),
            leader_previous_log_entry: Some((Term::new(3), Index::new(7))),
            leader_commit_index: Some(Index::new(6)),
            new_entries: vec![entry(3, "a"), entry(4, "b")],
        };

        let proto = append_entries_to_proto(input);
        assert_eq!(proto.previous_log_entry_index, 7);
        assert_eq!(proto.commit_index, 6);
        assert_eq!(proto.new_entries.iter().map(|e| e.index).collect::<Vec<_>>(), vec![8, 9]);

        let back = append_entries_from_proto(proto).unwrap();
        assert_eq!(back.leader_previous_log_entry, Some((Term::new(3), Index::new(7))));
        assert_eq!(back.leader_commit_index, Some(Index::new(6)));
        let terms_and_payloads: Vec<_> = back
            .new_entries
            .iter()
            .map(|e| (e.term, e.payload.clone(), e.source_tag.as_str()))
            .collect();
        assert_eq!(
            terms_and_payloads,
            vec![(Term::new(3), Bytes::from("a"), "tag"), (Term::new(4), Bytes::from("b"), "tag")]
        );
    }

    #[test]
    fn empty_log_is_zero_on_the_wire() {
        let proto = ProtoAppendEntriesReq {
            leader_id: "leader".into(),
            term: 1,
            previous_log_entry_index: 0,
            previous_log_entry_term: 0,
            commit_index: 0,
            new_entries: vec![],
        };
        let input = append_entries_from_proto(proto).unwrap();
        assert_eq!(input.leader_previous_log_entry, None);
        assert_eq!(input.leader_commit_index, None);
    }

    #[test]
    fn rejects_malformed_requests() {
        let proto = ProtoRequestVoteReq {
            candidate_id: "c".into(),
            term: 2,
            last_log_entry_index: 0,
            last_log_entry_term: 1,
        };
        assert!(matches!(
            request_vote_from_proto(proto),
            Err(MalformedMessage::IndexZeroWithTerm(1))
        ));

        let proto = ProtoAppendEntriesReq {
            leader_id: "leader".into(),
            term: 1,
            previous_log_entry_index: 2,
            previous_log_entry_term: 1,
            commit_index: 0,
            new_entries: vec![ProtoLogEntry {
                term: 1,
                index: 5,
                payload: vec![],
                source_tag: String::new(),
                created_at_millis: 0,
            }],
        };
        assert!(matches!(
            append_entries_from_proto(proto),
            Err(MalformedMessage::NonContiguousEntry { claimed: 5, expected: 3, .. })
        ));
    }

    #[test]
    fn entries_past_the_last_index_are_rejected() {
        let proto_entry = |index: u64| ProtoLogEntry {
            term: 1,
            index,
            payload: vec![],
            source_tag: String::new(),
            created_at_millis: 0,
        };
        let request = |previous_log_entry_index: u64, new_entries: Vec<ProtoLogEntry>| ProtoAppendEntriesReq {
            leader_id: "leader".into(),
            term: 1,
            previous_log_entry_index,
            previous_log_entry_term: 1,
            commit_index: 0,
            new_entries,
        };

        assert!(matches!(
            append_entries_from_proto(request(u64::MAX, vec![proto_entry(0)])),
            Err(MalformedMessage::IndexOverflow { previous: u64::MAX, position: 0 })
        ));
        assert!(matches!(
            append_entries_from_proto(request(u64::MAX - 1, vec![proto_entry(u64::MAX), proto_entry(0)])),
            Err(MalformedMessage::IndexOverflow { position: 1, .. })
        ));

        // A heartbeat that far out is only a log mismatch, not a malformed message.
        let input = append_entries_from_proto(request(u64::MAX, vec![])).unwrap();
        assert_eq!(input.leader_previous_log_entry, Some((Term::new(1), Index::new(u64::MAX))));
    }
}
