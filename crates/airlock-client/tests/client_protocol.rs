//! Protocol tests for the client over a loopback pair.
//!
//! The peer side is scripted: responses are queued into the loopback
//! channel before the operation runs, and the frames the client sent
//! are inspected afterwards. This pins down the wire behavior without
//! a server in the loop.

use std::time::Duration;

use bytes::Bytes;

use airlock_client::{Client, ClientError, Listing};
use airlock_core::{Link, LoopbackLink};
use airlock_proto::StatRecord;

const TIMEOUT: Duration = Duration::from_millis(200);

fn pair(max_packet: usize) -> (Client<LoopbackLink>, LoopbackLink) {
    let (ours, theirs) = LoopbackLink::pair_with_max_packet(max_packet);
    (Client::new(ours, TIMEOUT), theirs)
}

async fn drain(peer: &mut LoopbackLink) -> Vec<Bytes> {
    let mut frames = Vec::new();
    while let Ok(Some(frame)) = peer.recv(Some(Duration::from_millis(20))).await {
        frames.push(frame);
    }
    frames
}

#[tokio::test]
async fn noop_round_trip() {
    let (mut client, mut peer) = pair(512);

    peer.send(b"l\0").await.unwrap();
    client.noop(None).await.unwrap();

    let sent = drain(&mut peer).await;
    assert_eq!(sent.len(), 1);
    assert_eq!(&sent[0][..], b"N");
}

#[tokio::test]
async fn noop_carries_probe_byte() {
    let (mut client, mut peer) = pair(512);

    peer.send(b"l\0").await.unwrap();
    client.noop(Some(7)).await.unwrap();

    let sent = drain(&mut peer).await;
    assert_eq!(&sent[0][..], &[b'N', 7][..]);
}

#[tokio::test]
async fn long_arguments_fragment_into_push_frames() {
    let (mut client, mut peer) = pair(16);

    // Two pushes will need acks, then the terminal gets its reply.
    peer.send(b"c").await.unwrap();
    peer.send(b"c").await.unwrap();
    peer.send(b"l\0data").await.unwrap();

    let path: Vec<u8> = (0..40).map(|i| b'a' + (i % 26)).collect();
    let content = client.get_file(&path).await.unwrap();
    assert_eq!(&content[..], b"data");

    let sent = drain(&mut peer).await;
    assert_eq!(sent.len(), 3);

    // P frames carry max_packet - 1 payload bytes each.
    assert_eq!(sent[0][0], b'P');
    assert_eq!(&sent[0][1..], &path[..15]);
    assert_eq!(sent[1][0], b'P');
    assert_eq!(&sent[1][1..], &path[15..30]);

    // Terminal frame: opcode plus the remainder.
    assert_eq!(sent[2][0], b'G');
    assert_eq!(&sent[2][1..], &path[30..]);
}

#[tokio::test]
async fn non_ack_during_push_resets_and_fails() {
    let (mut client, mut peer) = pair(16);

    peer.send(b"z\0").await.unwrap();

    let path = vec![b'p'; 40];
    let result = client.get_file(&path).await;
    assert!(matches!(result, Err(ClientError::Violation(_))));

    let sent = drain(&mut peer).await;
    // One push, then the reset.
    assert_eq!(sent[0][0], b'P');
    assert_eq!(&sent[1][..], b"Z");
}

#[tokio::test]
async fn fragmented_response_reassembles() {
    let (mut client, mut peer) = pair(512);

    peer.send(b"d\x05abc").await.unwrap();
    peer.send(b"d\x05def").await.unwrap();
    peer.send(b"l\x05gh").await.unwrap();

    let content = client.get_file(b"/data/big").await.unwrap();
    assert_eq!(&content[..], b"abcdefgh");

    let sent = drain(&mut peer).await;
    assert_eq!(sent.len(), 3);
    assert_eq!(sent[0][0], b'G');
    // One continue per non-terminal fragment, naming the slot.
    assert_eq!(&sent[1][..], &[b'C', 5][..]);
    assert_eq!(&sent[2][..], &[b'C', 5][..]);
}

#[tokio::test]
async fn chunk_stream_pulls_lazily() {
    let (mut client, mut peer) = pair(512);

    peer.send(b"d\x09one").await.unwrap();

    let mut chunks = client.file_chunks(b"/data/big").await.unwrap();

    let first = chunks.next().await.unwrap().unwrap();
    assert_eq!(&first[..], b"one");

    // The continue goes out on the *next* pull.
    peer.send(b"l\x09two").await.unwrap();
    let second = chunks.next().await.unwrap().unwrap();
    assert_eq!(&second[..], b"two");

    assert!(chunks.next().await.unwrap().is_none());

    let sent = drain(&mut peer).await;
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0][0], b'G');
    assert_eq!(&sent[1][..], &[b'C', 9][..]);
}

#[tokio::test]
async fn callback_style_sees_every_chunk() {
    let (mut client, mut peer) = pair(512);

    peer.send(b"d\x02xx").await.unwrap();
    peer.send(b"l\x02yy").await.unwrap();

    let mut seen = Vec::new();
    client
        .get_file_with(b"/data/f", |chunk| seen.extend_from_slice(chunk))
        .await
        .unwrap();

    assert_eq!(seen, b"xxyy");
}

#[tokio::test]
async fn error_frame_is_rejected() {
    let (mut client, mut peer) = pair(512);

    peer.send(b"z\0").await.unwrap();

    let result = client.get_file(b"/data/nope").await;
    assert!(matches!(result, Err(ClientError::Rejected)));

    // A z is an answer, not confusion: no reset goes out.
    let sent = drain(&mut peer).await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0][0], b'G');
}

#[tokio::test]
async fn runt_frame_resets_and_fails() {
    let (mut client, mut peer) = pair(512);

    peer.send(b"d").await.unwrap();

    let result = client.get_file(b"/data/f").await;
    assert!(matches!(result, Err(ClientError::Violation(_))));

    let sent = drain(&mut peer).await;
    assert_eq!(sent[0][0], b'G');
    assert_eq!(&sent[1][..], b"Z");
}

#[tokio::test]
async fn unknown_opcode_resets_and_fails() {
    let (mut client, mut peer) = pair(512);

    peer.send(b"??what").await.unwrap();

    let result = client.get_file(b"/data/f").await;
    assert!(matches!(result, Err(ClientError::Violation(_))));

    let sent = drain(&mut peer).await;
    assert_eq!(&sent[1][..], b"Z");
}

#[tokio::test]
async fn timeout_fails_without_reset() {
    let (mut client, mut peer) = pair(512);

    let result = client.get_file(b"/data/f").await;
    assert!(matches!(result, Err(ClientError::Timeout(_))));

    let sent = drain(&mut peer).await;
    assert_eq!(sent.len(), 1, "only the request itself was sent");
    assert_eq!(sent[0][0], b'G');
}

#[tokio::test]
async fn listing_parses_nul_separated_names() {
    let (mut client, mut peer) = pair(512);

    peer.send(b"l\0.meta\0.headers\0hello.txt").await.unwrap();

    let listing = client.list(b"/data/00042").await.unwrap();
    let Listing::Entries(names) = listing else {
        panic!("expected entries");
    };
    assert_eq!(names.len(), 3);
    assert!(names.iter().any(|n| n == "hello.txt"));
}

#[tokio::test]
async fn listing_detects_single_file_marker() {
    let (mut client, mut peer) = pair(512);

    peer.send(b"l\0\0\0").await.unwrap();

    let listing = client.list(b"/data/00042/hello.txt").await.unwrap();
    assert_eq!(listing, Listing::File);
}

#[tokio::test]
async fn empty_listing_is_no_entries() {
    let (mut client, mut peer) = pair(512);

    peer.send(b"l\0").await.unwrap();

    let listing = client.list(b"/data/empty").await.unwrap();
    assert_eq!(listing, Listing::Entries(Vec::new()));
}

#[tokio::test]
async fn stat_decodes_the_packed_record() {
    let (mut client, mut peer) = pair(512);

    let record = StatRecord::new(StatRecord::FLAG_FILE, 0o644, 1234, 1_700_000_000, 1_700_000_100);
    let mut frame = vec![b'l', 0];
    frame.extend_from_slice(&record.to_bytes());
    peer.send(&frame).await.unwrap();

    let got = client.stat(b"/data/f").await.unwrap();
    assert_eq!(got, record);
}

#[tokio::test]
async fn stat_with_wrong_size_is_malformed() {
    let (mut client, mut peer) = pair(512);

    peer.send(b"l\0short").await.unwrap();

    let result = client.stat(b"/data/f").await;
    assert!(matches!(result, Err(ClientError::Malformed { .. })));
}

#[tokio::test]
async fn negotiate_adopts_server_packet_size() {
    let (mut client, mut peer) = pair(512);

    let mut frame = vec![b'l', 0];
    frame.extend_from_slice(&1024u32.to_le_bytes());
    peer.send(&frame).await.unwrap();

    let adopted = client.negotiate().await.unwrap();
    assert_eq!(adopted, 1024);
    assert_eq!(client.max_packet(), 1024);

    let sent = drain(&mut peer).await;
    assert_eq!(&sent[0][..], b"M");
}

#[tokio::test]
async fn negotiate_clamps_silly_sizes() {
    let (mut client, mut peer) = pair(512);

    let mut frame = vec![b'l', 0];
    frame.extend_from_slice(&16u32.to_le_bytes());
    peer.send(&frame).await.unwrap();

    let adopted = client.negotiate().await.unwrap();
    assert_eq!(adopted, airlock_proto::FALLBACK_MAX_PACKET);
}

#[tokio::test]
async fn read_link_empty_payload_means_not_a_symlink() {
    let (mut client, mut peer) = pair(512);

    peer.send(b"l\0").await.unwrap();
    assert_eq!(client.read_link(b"/data/plain").await.unwrap(), None);

    peer.send(b"l\0target.txt").await.unwrap();
    let target = client.read_link(b"/data/link").await.unwrap().unwrap();
    assert_eq!(target, "target.txt");
}

#[tokio::test]
async fn hash_returns_text_digest() {
    let (mut client, mut peer) = pair(512);

    let mut frame = b"l\0".to_vec();
    frame.extend_from_slice(b"ab".repeat(64).as_slice());
    peer.send(&frame).await.unwrap();

    let digest = client.hash_file(b"/data/f").await.unwrap();
    assert_eq!(digest.len(), 128);
}
