//! Transfer Progress Tests
//!
//! Tests for:
//! - The observer state machine on the documented event sequences
//! - Uploads and downloads through the client report to a per-call observer
//! - Failed transfers end in the failed state with the bytes moved so far
//! - Concurrent transfers each see only their own bytes

use std::io::{self, Cursor, Read};

use ossgate::observability::MemorySink;
use ossgate::progress::TransferDirection;
use ossgate::provider::{Credentials, LocalProvider};
use ossgate::{
    Event, FixedClock, ObjectSource, OssClient, OssConfig, ProgressListener, TransferEvent,
    TransferObserver, TransferOptions, TransferPhase,
};
use tempfile::TempDir;

// =============================================================================
// Test Utilities
// =============================================================================

const ENDPOINT: &str = "https://oss-cn-hangzhou.aliyuncs.com";

fn local_client(temp: &TempDir, sink: &MemorySink) -> OssClient {
    let provider = LocalProvider::new(
        temp.path().join("store"),
        ENDPOINT,
        Credentials::new("test-id", "test-secret"),
    )
    .unwrap();

    let mut client = OssClient::new(OssConfig::new(ENDPOINT, "test-id", "test-secret"))
        .with_logger(sink.logger())
        .with_clock(FixedClock::at_timestamp(1_700_000_000));
    client.connect_with(provider).unwrap();
    client.create_bucket_if_absent("media").unwrap();
    client
}

/// Yields `good` bytes, then fails
struct BrokenReader {
    good: Cursor<Vec<u8>>,
}

impl BrokenReader {
    fn after(bytes: usize) -> Self {
        Self {
            good: Cursor::new(vec![7u8; bytes]),
        }
    }
}

impl Read for BrokenReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.good.read(buf)? {
            0 => Err(io::Error::new(io::ErrorKind::ConnectionReset, "stream reset")),
            n => Ok(n),
        }
    }
}

/// Records every event it is handed
#[derive(Default)]
struct Recorder {
    events: Vec<TransferEvent>,
}

impl ProgressListener for Recorder {
    fn progress_changed(&mut self, event: TransferEvent) {
        self.events.push(event);
    }
}

// =============================================================================
// State Machine
// =============================================================================

#[test]
fn test_completed_sequence() {
    let mut observer = TransferObserver::new(TransferDirection::Upload);
    for event in [
        TransferEvent::Started,
        TransferEvent::ContentLengthKnown(100),
        TransferEvent::BytesTransferred(40),
        TransferEvent::BytesTransferred(60),
        TransferEvent::Completed,
    ] {
        observer.progress_changed(event);
    }

    assert!(observer.succeeded());
    assert_eq!(observer.bytes_transferred(), 100);
    assert_eq!(observer.total_bytes(), Some(100));
    assert_eq!(observer.phase(), TransferPhase::Completed);
}

#[test]
fn test_failed_sequence() {
    let mut observer = TransferObserver::new(TransferDirection::Download);
    for event in [
        TransferEvent::Started,
        TransferEvent::BytesTransferred(10),
        TransferEvent::Failed,
    ] {
        observer.progress_changed(event);
    }

    assert!(!observer.succeeded());
    assert_eq!(observer.bytes_transferred(), 10);
    assert_eq!(observer.total_bytes(), None);
    assert_eq!(observer.phase(), TransferPhase::Failed);
}

#[test]
fn test_events_after_terminal_state_are_ignored() {
    let mut observer = TransferObserver::new(TransferDirection::Upload);
    observer.progress_changed(TransferEvent::Started);
    observer.progress_changed(TransferEvent::Completed);
    observer.progress_changed(TransferEvent::BytesTransferred(5));
    observer.progress_changed(TransferEvent::Failed);

    assert!(observer.succeeded());
    assert_eq!(observer.bytes_transferred(), 0);
}

// =============================================================================
// Client Transfers
// =============================================================================

#[test]
fn test_upload_reports_to_observer() {
    let temp = TempDir::new().unwrap();
    let sink = MemorySink::new();
    let client = local_client(&temp, &sink);

    let mut observer = TransferObserver::new(TransferDirection::Upload);
    client
        .put("media", "big.bin", vec![1u8; 100_000], TransferOptions::observed(&mut observer))
        .unwrap()
        .unwrap();

    assert!(observer.succeeded());
    assert_eq!(observer.total_bytes(), Some(100_000));
    assert_eq!(observer.bytes_transferred(), 100_000);
    assert_eq!(observer.percent(), Some(100));
}

#[test]
fn test_upload_event_order() {
    let temp = TempDir::new().unwrap();
    let sink = MemorySink::new();
    let client = local_client(&temp, &sink);

    let mut recorder = Recorder::default();
    client
        .put("media", "k.txt", "Hello World", TransferOptions::observed(&mut recorder))
        .unwrap();

    assert_eq!(recorder.events.first(), Some(&TransferEvent::Started));
    assert_eq!(recorder.events.get(1), Some(&TransferEvent::ContentLengthKnown(11)));
    assert_eq!(recorder.events.last(), Some(&TransferEvent::Completed));
    let moved: u64 = recorder
        .events
        .iter()
        .map(|e| match e {
            TransferEvent::BytesTransferred(n) => *n,
            _ => 0,
        })
        .sum();
    assert_eq!(moved, 11);
}

#[test]
fn test_stream_upload_has_unknown_total() {
    let temp = TempDir::new().unwrap();
    let sink = MemorySink::new();
    let client = local_client(&temp, &sink);

    let mut observer = TransferObserver::new(TransferDirection::Upload);
    client
        .put(
            "media",
            "stream.bin",
            ObjectSource::reader(Cursor::new(vec![0u8; 2048])),
            TransferOptions::observed(&mut observer),
        )
        .unwrap()
        .unwrap();

    assert!(observer.succeeded());
    assert_eq!(observer.total_bytes(), None);
    assert_eq!(observer.bytes_transferred(), 2048);
    assert_eq!(observer.percent(), None);
}

#[test]
fn test_broken_upload_stream_fails_transfer() {
    let temp = TempDir::new().unwrap();
    let sink = MemorySink::new();
    let client = local_client(&temp, &sink);

    let mut observer = TransferObserver::new(TransferDirection::Upload);
    let url = client
        .put(
            "media",
            "broken.bin",
            ObjectSource::reader(BrokenReader::after(10)),
            TransferOptions::observed(&mut observer),
        )
        .unwrap();

    assert!(url.is_none());
    assert_eq!(observer.phase(), TransferPhase::Failed);
    assert!(!observer.succeeded());
    assert_eq!(observer.bytes_transferred(), 10);
    assert!(!client.exists("media", "broken.bin").unwrap());
    assert!(sink.contains(Event::ObjectPutFailed));
}

#[test]
fn test_download_reports_to_observer() {
    let temp = TempDir::new().unwrap();
    let sink = MemorySink::new();
    let client = local_client(&temp, &sink);
    client.put("media", "k.bin", vec![3u8; 5000], TransferOptions::none()).unwrap();

    let mut observer = TransferObserver::new(TransferDirection::Download);
    let target = temp.path().join("k.bin");
    assert!(client
        .get_to_file("media", "k.bin", &target, TransferOptions::observed(&mut observer))
        .unwrap());

    assert!(observer.succeeded());
    assert_eq!(observer.total_bytes(), Some(5000));
    assert_eq!(observer.bytes_transferred(), 5000);
}

/// Non-UTF-8 bytes are replaced, the read still completes
#[test]
fn test_get_lines_decodes_invalid_utf8_lossily() {
    let temp = TempDir::new().unwrap();
    let sink = MemorySink::new();
    let client = local_client(&temp, &sink);
    let stored: &[u8] = b"caf\xe9 latin-1\r\nsecond line\n";
    client.put("media", "latin1.txt", stored, TransferOptions::none()).unwrap().unwrap();

    let mut observer = TransferObserver::new(TransferDirection::Download);
    let lines = client
        .get_lines("media", "latin1.txt", TransferOptions::observed(&mut observer))
        .unwrap()
        .unwrap();

    assert_eq!(lines, vec!["caf\u{FFFD} latin-1", "second line"]);
    assert!(observer.succeeded());
    assert_eq!(observer.bytes_transferred(), stored.len() as u64);
    assert!(!sink.contains(Event::ObjectGetFailed));
}

/// A download abandoned by a local write failure still ends in `Failed`
#[test]
fn test_download_write_failure_fails_transfer() {
    let temp = TempDir::new().unwrap();
    let sink = MemorySink::new();
    let client = local_client(&temp, &sink);
    client.put("media", "k.bin", vec![3u8; 512], TransferOptions::none()).unwrap();

    let blocker = temp.path().join("blocker");
    std::fs::write(&blocker, b"a file, not a directory").unwrap();

    let mut observer = TransferObserver::new(TransferDirection::Download);
    let downloaded = client
        .get_to_file(
            "media",
            "k.bin",
            &blocker.join("k.bin"),
            TransferOptions::observed(&mut observer),
        )
        .unwrap();

    assert!(!downloaded);
    assert_eq!(observer.phase(), TransferPhase::Failed);
    assert_eq!(observer.total_bytes(), Some(512));
    assert!(sink.contains(Event::ObjectGetFailed));
}

#[test]
fn test_logged_download_failure_writes_transfer_failed() {
    let temp = TempDir::new().unwrap();
    let sink = MemorySink::new();
    let client = local_client(&temp, &sink);
    client.put("media", "k.bin", vec![3u8; 512], TransferOptions::none()).unwrap();

    let blocker = temp.path().join("blocker");
    std::fs::write(&blocker, b"x").unwrap();
    client
        .get_to_file("media", "k.bin", &blocker.join("k.bin"), TransferOptions::logged())
        .unwrap();

    let failed = sink.records_for(Event::TransferFailed);
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].field("direction"), Some("download"));
    assert!(!sink.contains(Event::TransferCompleted));
}

#[test]
fn test_logged_progress_writes_transfer_events() {
    let temp = TempDir::new().unwrap();
    let sink = MemorySink::new();
    let client = local_client(&temp, &sink);
    client.put("media", "k.txt", "line one\nline two", TransferOptions::none()).unwrap();

    client
        .get_lines("media", "k.txt", TransferOptions::logged())
        .unwrap()
        .unwrap();

    let started = sink.records_for(Event::TransferStarted);
    assert_eq!(started.len(), 1);
    assert_eq!(started[0].field("direction"), Some("download"));
    assert!(sink.contains(Event::TransferProgress));

    let completed = sink.records_for(Event::TransferCompleted);
    assert_eq!(completed[0].field("transferred"), Some("17"));
    assert_eq!(completed[0].field("transfer_id"), started[0].field("transfer_id"));
}

#[test]
fn test_no_progress_option_logs_no_transfer_events() {
    let temp = TempDir::new().unwrap();
    let sink = MemorySink::new();
    let client = local_client(&temp, &sink);

    client.put("media", "k.txt", "x", TransferOptions::none()).unwrap();
    assert!(!sink.contains(Event::TransferStarted));
    assert!(!sink.contains(Event::TransferCompleted));
}

// =============================================================================
// Concurrency
// =============================================================================

/// Each concurrent transfer's observer counts only its own bytes
#[test]
fn test_concurrent_transfers_are_isolated() {
    let temp = TempDir::new().unwrap();
    let sink = MemorySink::new();
    let client = local_client(&temp, &sink);

    std::thread::scope(|scope| {
        for i in 1..=8usize {
            let client = &client;
            scope.spawn(move || {
                let size = i * 1000;
                let key = format!("parallel/{}.bin", i);
                let mut observer = TransferObserver::new(TransferDirection::Upload);
                client
                    .put("media", &key, vec![i as u8; size], TransferOptions::observed(&mut observer))
                    .unwrap()
                    .unwrap();
                assert!(observer.succeeded());
                assert_eq!(observer.bytes_transferred(), size as u64);
            });
        }
    });

    for i in 1..=8usize {
        assert!(client.exists("media", &format!("parallel/{}.bin", i)).unwrap());
    }
}
