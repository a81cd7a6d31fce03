//! End-to-end tests of the code-directory retrieval conventions.

use std::os::unix::ffi::OsStrExt;

use airlock_client::Retriever;
use airlock_harness::RelayPair;

#[tokio::test]
async fn prepare_serves_content_with_headers() {
    let mut pair = RelayPair::start().await;
    pair.seed_code(
        "00042",
        "report.pdf",
        b"%PDF-1.4 pretend",
        "Content-Type: application/pdf\n",
    );

    let root = pair.wire_path("");
    let mut retriever = Retriever::new(&mut pair.client, &root);

    let delivery = retriever.prepare("00042").await.unwrap().unwrap();

    assert_eq!(delivery.filename, "report.pdf");
    assert_eq!(
        delivery.headers.get("Content-Type").map(String::as_str),
        Some("application/pdf")
    );
    assert_eq!(
        delivery.headers.get("Content-Disposition").map(String::as_str),
        Some("inline; filename=\"report.pdf\"")
    );
    // Backfilled from a stat because .headers didn't carry it.
    assert_eq!(
        delivery.headers.get("Content-Length").map(String::as_str),
        Some("16")
    );

    let content = pair.client.get_file(&delivery.path).await.unwrap();
    assert_eq!(&content[..], b"%PDF-1.4 pretend");
}

#[tokio::test]
async fn short_codes_are_zero_padded() {
    let mut pair = RelayPair::start().await;
    pair.seed_code("00007", "lucky.txt", b"seven", "Content-Type: text/plain\n");

    let root = pair.wire_path("");
    let mut retriever = Retriever::new(&mut pair.client, &root);

    let delivery = retriever.prepare("7").await.unwrap().unwrap();
    assert_eq!(delivery.filename, "lucky.txt");
    assert!(delivery.path.ends_with(b"/00007/lucky.txt"));
}

#[tokio::test]
async fn unknown_code_yields_none() {
    let mut pair = RelayPair::start().await;

    let root = pair.wire_path("");
    let mut retriever = Retriever::new(&mut pair.client, &root);

    assert!(retriever.prepare("99999").await.unwrap().is_none());
}

#[tokio::test]
async fn dotfiles_are_never_the_content() {
    let mut pair = RelayPair::start().await;

    // A code directory with nothing but metadata.
    let dir = pair.data_dir().join("00013");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(".meta"), b"abandoned\n").unwrap();
    std::fs::write(dir.join(".headers"), b"Content-Type: text/plain\n").unwrap();

    let root = pair.wire_path("");
    let mut retriever = Retriever::new(&mut pair.client, &root);

    assert!(retriever.prepare("00013").await.unwrap().is_none());
}

#[tokio::test]
async fn explicit_content_length_is_preserved() {
    let mut pair = RelayPair::start().await;
    pair.seed_code(
        "00099",
        "archive.bin",
        b"0123456789",
        "Content-Type: application/octet-stream\nContent-Length: 999\n",
    );

    let root = pair.wire_path("");
    let mut retriever = Retriever::new(&mut pair.client, &root);

    let delivery = retriever.prepare("00099").await.unwrap().unwrap();
    assert_eq!(
        delivery.headers.get("Content-Length").map(String::as_str),
        Some("999")
    );
}

#[tokio::test]
async fn missing_headers_file_defaults_content_type() {
    let mut pair = RelayPair::start().await;

    let dir = pair.data_dir().join("00051");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("bare.dat"), b"raw").unwrap();

    let root = pair.wire_path("");
    let mut retriever = Retriever::new(&mut pair.client, &root);

    let delivery = retriever.prepare("00051").await.unwrap().unwrap();
    assert_eq!(
        delivery.headers.get("Content-Type").map(String::as_str),
        Some("application/octet-stream")
    );
    assert_eq!(delivery.filename.as_bytes(), b"bare.dat");
}

#[tokio::test]
async fn streamed_delivery_matches_staged_bytes() {
    let mut pair = RelayPair::start().await;

    let blob: Vec<u8> = (0..4000u32).map(|i| (i * 13 % 256) as u8).collect();
    pair.seed_code("00077", "blob.bin", &blob, "Content-Type: application/octet-stream\n");

    let root = pair.wire_path("");
    let delivery = {
        let mut retriever = Retriever::new(&mut pair.client, &root);
        retriever.prepare("77").await.unwrap().unwrap()
    };

    let mut streamed = Vec::new();
    let mut chunks = pair.client.file_chunks(&delivery.path).await.unwrap();
    while let Some(chunk) = chunks.next().await.unwrap() {
        streamed.extend_from_slice(&chunk);
    }

    assert_eq!(streamed, blob);
    assert_eq!(
        delivery.headers.get("Content-Length").map(String::as_str),
        Some("4000")
    );
}
