//! Property-based tests for frame encoding/decoding.
//!
//! Verifies codec round-trips for arbitrary payloads rather than
//! hand-picked examples: responses survive encode/decode, terminal
//! commands survive arbitrary push/terminal splits, and stat records
//! survive serialization.

use bytes::Bytes;
use airlock_proto::{Command, MAX_FILE_PATHLEN, ProtocolError, Response, StatRecord};
use proptest::prelude::*;

/// Strategy for path bytes that stay within the protocol limit.
fn arbitrary_path() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=MAX_FILE_PATHLEN)
}

fn arbitrary_path_command() -> impl Strategy<Value = Command> {
    (0..5u8, arbitrary_path()).prop_map(|(kind, path)| {
        let path = Bytes::from(path);
        match kind {
            0 => Command::List { path },
            1 => Command::Get { path },
            2 => Command::HashFile { path },
            3 => Command::ReadLink { path },
            _ => Command::Stat { path },
        }
    })
}

fn arbitrary_response() -> impl Strategy<Value = Response> {
    prop_oneof![
        Just(Response::PushAck),
        Just(Response::Error),
        (any::<u8>(), prop::collection::vec(any::<u8>(), 0..1024))
            .prop_map(|(slot, chunk)| Response::Data { slot, chunk: Bytes::from(chunk) }),
        (any::<u8>(), prop::collection::vec(any::<u8>(), 0..1024))
            .prop_map(|(slot, chunk)| Response::Last { slot, chunk: Bytes::from(chunk) }),
    ]
}

#[test]
fn prop_response_round_trip() {
    proptest!(|(resp in arbitrary_response())| {
        let wire = resp.encode();
        let decoded = Response::decode(&wire).expect("encoded response must decode");
        prop_assert_eq!(decoded, resp);
    });
}

#[test]
fn prop_terminal_round_trip() {
    proptest!(|(cmd in arbitrary_path_command())| {
        let frame = cmd.encode_unfragmented();
        let decoded = Command::from_terminal(&frame, b"").expect("terminal must parse");
        prop_assert_eq!(decoded, cmd);
    });
}

#[test]
fn prop_push_split_is_transparent() {
    // However the path is split between pushed prefix and terminal
    // frame, the assembled command is the same.
    proptest!(|(path in arbitrary_path(), split in any::<prop::sample::Index>())| {
        let at = split.index(path.len() + 1);
        let (pushed, tail) = path.split_at(at.min(path.len()));

        let mut terminal = vec![b'G'];
        terminal.extend_from_slice(tail);

        let decoded = Command::from_terminal(&terminal, pushed).expect("within limit");
        prop_assert_eq!(decoded, Command::Get { path: Bytes::from(path.clone()) });
    });
}

#[test]
fn prop_oversize_paths_rejected() {
    proptest!(|(extra in 1..64usize)| {
        let pushed = vec![b'p'; MAX_FILE_PATHLEN + extra];
        let result = Command::from_terminal(b"L", &pushed);
        prop_assert_eq!(
            result,
            Err(ProtocolError::PathTooLong {
                len: MAX_FILE_PATHLEN + extra,
                max: MAX_FILE_PATHLEN,
            })
        );
    });
}

#[test]
fn prop_stat_record_round_trip() {
    proptest!(|(flags in any::<u8>(),
                mode in any::<u16>(),
                size in any::<u32>(),
                mtime in any::<u32>(),
                ctime in any::<u32>())| {
        let record = StatRecord::new(flags, mode, size, mtime, ctime);
        let parsed = StatRecord::from_bytes(&record.to_bytes()).expect("fixed size");

        prop_assert_eq!(parsed.flags(), flags);
        prop_assert_eq!(parsed.mode(), mode);
        prop_assert_eq!(parsed.size(), size);
        prop_assert_eq!(parsed.mtime(), mtime);
        prop_assert_eq!(parsed.ctime(), ctime);
    });
}
