//! # Transfer Progress
//!
//! Providers push [`TransferEvent`]s into a [`ProgressListener`] on the caller's
//! thread while a put or get runs. [`TransferObserver`] is the stock listener: a small
//! state machine tracking bytes, the announced total and the final outcome.
//!
//! ```text
//! NotStarted ──Started──▶ InProgress ──Completed──▶ Completed
//!                              │
//!                              └──────Failed──────▶ Failed
//! ```
//!
//! Terminal states absorb every later event.

use std::fmt;
use std::io::{self, Read};

use uuid::Uuid;

use crate::observability::{Event, Logger};

/// Events emitted by a provider during a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransferEvent {
    /// Transfer began
    Started,
    /// Provider learned the total size
    ContentLengthKnown(u64),
    /// Some bytes moved
    BytesTransferred(u64),
    /// Provider acknowledged the transfer
    Completed,
    /// Transfer aborted with an error
    Failed,
    /// A multipart part began
    PartStarted(u32),
    /// A multipart part finished
    PartCompleted(u32),
}

/// Receives transfer events. Called synchronously from inside the transfer.
pub trait ProgressListener: Send {
    fn progress_changed(&mut self, event: TransferEvent);
}

/// Deliver an event to an optional listener
pub fn notify(listener: &mut Option<&mut dyn ProgressListener>, event: TransferEvent) {
    if let Some(listener) = listener.as_deref_mut() {
        listener.progress_changed(event);
    }
}

/// Direction of a transfer, used for log wording only
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    Upload,
    Download,
}

impl TransferDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferDirection::Upload => "upload",
            TransferDirection::Download => "download",
        }
    }
}

impl fmt::Display for TransferDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle phase of a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferPhase {
    NotStarted,
    InProgress,
    Completed,
    Failed,
}

impl TransferPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferPhase::Completed | TransferPhase::Failed)
    }
}

/// Snapshot of a transfer's counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferState {
    pub phase: TransferPhase,
    pub bytes_transferred: u64,
    /// `None` until the provider reports a content length
    pub total_bytes: Option<u64>,
    pub succeeded: bool,
}

impl TransferState {
    fn new() -> Self {
        Self {
            phase: TransferPhase::NotStarted,
            bytes_transferred: 0,
            total_bytes: None,
            succeeded: false,
        }
    }

    /// `floor(100 * transferred / total)`, only once the total is known
    pub fn percent(&self) -> Option<u64> {
        let total = self.total_bytes?;
        if total == 0 {
            return Some(100);
        }
        let percent = (self.bytes_transferred as u128 * 100) / total as u128;
        Some(percent.min(u64::MAX as u128) as u64)
    }
}

/// Progress state machine for one transfer. Create one per call; never reuse.
#[derive(Debug)]
pub struct TransferObserver {
    id: Uuid,
    direction: TransferDirection,
    state: TransferState,
    logger: Option<Logger>,
}

impl TransferObserver {
    /// Silent observer
    pub fn new(direction: TransferDirection) -> Self {
        Self {
            id: Uuid::new_v4(),
            direction,
            state: TransferState::new(),
            logger: None,
        }
    }

    /// Observer that logs every transition
    pub fn logged(direction: TransferDirection, logger: Logger) -> Self {
        Self {
            logger: Some(logger),
            ..Self::new(direction)
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn direction(&self) -> TransferDirection {
        self.direction
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    pub fn phase(&self) -> TransferPhase {
        self.state.phase
    }

    pub fn bytes_transferred(&self) -> u64 {
        self.state.bytes_transferred
    }

    pub fn total_bytes(&self) -> Option<u64> {
        self.state.total_bytes
    }

    pub fn succeeded(&self) -> bool {
        self.state.succeeded
    }

    pub fn percent(&self) -> Option<u64> {
        self.state.percent()
    }

    fn begin(&mut self) {
        if self.state.phase == TransferPhase::NotStarted {
            self.state.phase = TransferPhase::InProgress;
        }
    }

    fn log_info(&self, event: Event, fields: &[(&str, &str)]) {
        if let Some(logger) = &self.logger {
            logger.info(event, fields);
        }
    }

    fn log_trace(&self, event: Event, fields: &[(&str, &str)]) {
        if let Some(logger) = &self.logger {
            logger.trace(event, fields);
        }
    }

    fn log_error(&self, event: Event, fields: &[(&str, &str)]) {
        if let Some(logger) = &self.logger {
            logger.error(event, fields);
        }
    }
}

impl ProgressListener for TransferObserver {
    fn progress_changed(&mut self, event: TransferEvent) {
        if self.state.phase.is_terminal() {
            return;
        }

        let id = self.id.to_string();
        let direction = self.direction.as_str();

        match event {
            TransferEvent::Started => {
                self.begin();
                self.log_info(
                    Event::TransferStarted,
                    &[("transfer_id", id.as_str()), ("direction", direction)],
                );
            }
            TransferEvent::ContentLengthKnown(total) => {
                // A later report overrides an earlier estimate.
                self.begin();
                self.state.total_bytes = Some(total);
                let total = total.to_string();
                self.log_info(
                    Event::TransferContentLength,
                    &[
                        ("transfer_id", id.as_str()),
                        ("direction", direction),
                        ("total_bytes", total.as_str()),
                    ],
                );
            }
            TransferEvent::BytesTransferred(bytes) => {
                self.begin();
                self.state.bytes_transferred = self.state.bytes_transferred.saturating_add(bytes);

                let chunk = bytes.to_string();
                let transferred = self.state.bytes_transferred.to_string();
                let (total, percent) = match (self.state.total_bytes, self.state.percent()) {
                    (Some(total), Some(percent)) => (total.to_string(), format!("{}%", percent)),
                    _ => ("...".to_string(), "unknown".to_string()),
                };
                self.log_trace(
                    Event::TransferProgress,
                    &[
                        ("transfer_id", id.as_str()),
                        ("direction", direction),
                        ("bytes", chunk.as_str()),
                        ("transferred", transferred.as_str()),
                        ("total_bytes", total.as_str()),
                        ("progress", percent.as_str()),
                    ],
                );
            }
            TransferEvent::Completed => {
                self.state.succeeded = true;
                self.state.phase = TransferPhase::Completed;
                let transferred = self.state.bytes_transferred.to_string();
                self.log_info(
                    Event::TransferCompleted,
                    &[
                        ("transfer_id", id.as_str()),
                        ("direction", direction),
                        ("transferred", transferred.as_str()),
                    ],
                );
            }
            TransferEvent::Failed => {
                self.state.succeeded = false;
                self.state.phase = TransferPhase::Failed;
                let transferred = self.state.bytes_transferred.to_string();
                self.log_error(
                    Event::TransferFailed,
                    &[
                        ("transfer_id", id.as_str()),
                        ("direction", direction),
                        ("transferred", transferred.as_str()),
                    ],
                );
            }
            _ => {}
        }
    }
}

/// Reader that reports consumed bytes to a listener.
///
/// Upload readers leave completion to the provider, which only knows after the ack.
/// Download readers report completion at end of stream. A reader dropped before either
/// outcome was reported fails the transfer, so the listener always sees one terminal
/// event.
pub struct ProgressReader<'a, R> {
    inner: R,
    listener: Option<&'a mut dyn ProgressListener>,
    complete_on_eof: bool,
    finished: bool,
}

impl<'a, R: Read> ProgressReader<'a, R> {
    /// Reader for an upload body
    pub fn new(inner: R, listener: Option<&'a mut dyn ProgressListener>) -> Self {
        Self {
            inner,
            listener,
            complete_on_eof: false,
            finished: false,
        }
    }

    /// Reader for a download body; end of stream completes the transfer
    pub fn completing(inner: R, listener: Option<&'a mut dyn ProgressListener>) -> Self {
        Self {
            inner,
            listener,
            complete_on_eof: true,
            finished: false,
        }
    }

    /// Hand the listener back once the body has been consumed
    pub fn into_listener(mut self) -> Option<&'a mut dyn ProgressListener> {
        self.listener.take()
    }
}

impl<R> ProgressReader<'_, R> {
    /// Send an event through to the listener. Only the first terminal event is delivered.
    pub fn notify(&mut self, event: TransferEvent) {
        if matches!(event, TransferEvent::Completed | TransferEvent::Failed) {
            if self.finished {
                return;
            }
            self.finished = true;
        }
        notify(&mut self.listener, event);
    }

    /// True once `Completed` or `Failed` went out
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl<R: Read> Read for ProgressReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.inner.read(buf) {
            Ok(0) => {
                if self.complete_on_eof && !buf.is_empty() {
                    self.notify(TransferEvent::Completed);
                }
                Ok(0)
            }
            Ok(n) => {
                self.notify(TransferEvent::BytesTransferred(n as u64));
                Ok(n)
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Err(e),
            Err(e) => {
                self.notify(TransferEvent::Failed);
                Err(e)
            }
        }
    }
}

impl<R> Drop for ProgressReader<'_, R> {
    fn drop(&mut self) {
        // Consumer gave up early: a decoder error, a failed local write, an early return
        self.notify(TransferEvent::Failed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::{MemorySink, Severity};
    use std::io::Cursor;

    fn feed(observer: &mut TransferObserver, events: &[TransferEvent]) {
        for event in events {
            observer.progress_changed(*event);
        }
    }

    #[test]
    fn test_successful_transfer() {
        let mut observer = TransferObserver::new(TransferDirection::Upload);
        feed(
            &mut observer,
            &[
                TransferEvent::Started,
                TransferEvent::ContentLengthKnown(100),
                TransferEvent::BytesTransferred(40),
                TransferEvent::BytesTransferred(60),
                TransferEvent::Completed,
            ],
        );

        assert!(observer.succeeded());
        assert_eq!(observer.bytes_transferred(), 100);
        assert_eq!(observer.total_bytes(), Some(100));
        assert_eq!(observer.phase(), TransferPhase::Completed);
        assert_eq!(observer.percent(), Some(100));
    }

    #[test]
    fn test_failed_transfer_keeps_count() {
        let mut observer = TransferObserver::new(TransferDirection::Download);
        feed(
            &mut observer,
            &[
                TransferEvent::Started,
                TransferEvent::BytesTransferred(10),
                TransferEvent::Failed,
            ],
        );

        assert!(!observer.succeeded());
        assert_eq!(observer.bytes_transferred(), 10);
        assert_eq!(observer.total_bytes(), None);
        assert_eq!(observer.phase(), TransferPhase::Failed);
        assert_eq!(observer.percent(), None);
    }

    #[test]
    fn test_terminal_states_absorb_events() {
        let mut observer = TransferObserver::new(TransferDirection::Upload);
        feed(
            &mut observer,
            &[
                TransferEvent::Started,
                TransferEvent::BytesTransferred(5),
                TransferEvent::Failed,
                TransferEvent::BytesTransferred(50),
                TransferEvent::Completed,
            ],
        );
        assert_eq!(observer.phase(), TransferPhase::Failed);
        assert_eq!(observer.bytes_transferred(), 5);
        assert!(!observer.succeeded());

        let mut observer = TransferObserver::new(TransferDirection::Upload);
        feed(&mut observer, &[TransferEvent::Completed, TransferEvent::Failed]);
        assert_eq!(observer.phase(), TransferPhase::Completed);
        assert!(observer.succeeded());
    }

    #[test]
    fn test_content_length_overwrite() {
        let mut observer = TransferObserver::new(TransferDirection::Upload);
        feed(
            &mut observer,
            &[
                TransferEvent::Started,
                TransferEvent::ContentLengthKnown(400),
                TransferEvent::ContentLengthKnown(200),
                TransferEvent::BytesTransferred(50),
            ],
        );
        assert_eq!(observer.total_bytes(), Some(200));
        assert_eq!(observer.percent(), Some(25));
    }

    #[test]
    fn test_percent_floors() {
        let mut observer = TransferObserver::new(TransferDirection::Upload);
        feed(
            &mut observer,
            &[
                TransferEvent::ContentLengthKnown(3),
                TransferEvent::BytesTransferred(2),
            ],
        );
        assert_eq!(observer.percent(), Some(66));
    }

    #[test]
    fn test_started_only_changes_phase() {
        let mut observer = TransferObserver::new(TransferDirection::Upload);
        assert_eq!(observer.phase(), TransferPhase::NotStarted);
        observer.progress_changed(TransferEvent::Started);
        assert_eq!(observer.phase(), TransferPhase::InProgress);
        assert_eq!(observer.bytes_transferred(), 0);
        assert_eq!(observer.total_bytes(), None);
        assert!(!observer.succeeded());
    }

    #[test]
    fn test_part_events_ignored() {
        let mut observer = TransferObserver::new(TransferDirection::Upload);
        feed(
            &mut observer,
            &[
                TransferEvent::Started,
                TransferEvent::PartStarted(1),
                TransferEvent::PartCompleted(1),
            ],
        );
        let state = observer.state();
        assert_eq!(state.phase, TransferPhase::InProgress);
        assert_eq!(state.bytes_transferred, 0);
    }

    #[test]
    fn test_logged_observer_writes_records() {
        let sink = MemorySink::new();
        let mut observer = TransferObserver::logged(TransferDirection::Upload, sink.logger());
        feed(
            &mut observer,
            &[
                TransferEvent::Started,
                TransferEvent::BytesTransferred(7),
                TransferEvent::Failed,
            ],
        );

        assert!(sink.contains(Event::TransferStarted));
        let progress = &sink.records_for(Event::TransferProgress)[0];
        assert_eq!(progress.field("progress"), Some("unknown"));
        assert_eq!(progress.field("transferred"), Some("7"));
        assert_eq!(sink.count(Severity::Error), 1);
    }

    #[test]
    fn test_download_reader_completes_at_eof() {
        let mut observer = TransferObserver::new(TransferDirection::Download);
        {
            let mut reader =
                ProgressReader::completing(Cursor::new(b"hello world".to_vec()), Some(&mut observer));
            let mut out = Vec::new();
            reader.read_to_end(&mut out).unwrap();
            assert_eq!(out, b"hello world");
        }
        assert_eq!(observer.bytes_transferred(), 11);
        assert!(observer.succeeded());
    }

    #[test]
    fn test_upload_reader_leaves_completion_to_provider() {
        let mut observer = TransferObserver::new(TransferDirection::Upload);
        {
            let mut reader = ProgressReader::new(Cursor::new(vec![0u8; 32]), Some(&mut observer));
            let mut out = Vec::new();
            reader.read_to_end(&mut out).unwrap();
            let mut listener = reader.into_listener();
            notify(&mut listener, TransferEvent::Completed);
        }
        assert_eq!(observer.bytes_transferred(), 32);
        assert!(observer.succeeded());
    }

    struct Broken;

    impl Read for Broken {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
        }
    }

    #[test]
    fn test_abandoned_download_fails_transfer() {
        let mut observer = TransferObserver::new(TransferDirection::Download);
        {
            let mut reader =
                ProgressReader::completing(Cursor::new(vec![1u8; 64]), Some(&mut observer));
            let mut first = [0u8; 16];
            reader.read_exact(&mut first).unwrap();
        }
        assert_eq!(observer.phase(), TransferPhase::Failed);
        assert!(!observer.succeeded());
        assert_eq!(observer.bytes_transferred(), 16);
        assert_eq!(observer.total_bytes(), None);
    }

    #[derive(Default)]
    struct Recorder {
        events: Vec<TransferEvent>,
    }

    impl ProgressListener for Recorder {
        fn progress_changed(&mut self, event: TransferEvent) {
            self.events.push(event);
        }
    }

    #[test]
    fn test_terminal_event_delivered_once() {
        let mut recorder = Recorder::default();
        {
            let mut reader = ProgressReader::new(Broken, Some(&mut recorder));
            let mut out = Vec::new();
            assert!(reader.read_to_end(&mut out).is_err());
            assert!(reader.is_finished());
            reader.notify(TransferEvent::Failed);
            reader.notify(TransferEvent::Completed);
        }
        assert_eq!(recorder.events, vec![TransferEvent::Failed]);
    }

    #[test]
    fn test_completed_download_is_not_failed_on_drop() {
        let mut recorder = Recorder::default();
        {
            let mut reader = ProgressReader::completing(Cursor::new(vec![2u8; 4]), Some(&mut recorder));
            let mut out = Vec::new();
            reader.read_to_end(&mut out).unwrap();
        }
        assert_eq!(
            recorder.events,
            vec![TransferEvent::BytesTransferred(4), TransferEvent::Completed]
        );
    }

    #[test]
    fn test_reader_error_fails_transfer() {
        let mut observer = TransferObserver::new(TransferDirection::Download);
        {
            let mut reader = ProgressReader::completing(Broken, Some(&mut observer));
            let mut out = Vec::new();
            assert!(reader.read_to_end(&mut out).is_err());
        }
        assert_eq!(observer.phase(), TransferPhase::Failed);
    }
}
