//! Shared test doubles: a scriptable in-memory [`MessageSource`].

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use futures::StreamExt;
use futures::stream::BoxStream;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::client::{DownloadOutcome, MessageSource};
use crate::error::{Error, Result};
use crate::types::{AttachmentKind, RawAttachment, RawMessage, RawReaction, RawSender, SourceHandle};

/// Scripted behavior for one download attempt
enum Script {
    /// Return this outcome verbatim
    Outcome(DownloadOutcome),
    /// Claim success without writing the file
    PhantomDone,
}

/// In-memory message source with scriptable download outcomes and an
/// instrumented concurrency gauge
pub(crate) struct MockSource {
    messages: Vec<RawMessage>,
    scripts: Mutex<HashMap<i64, VecDeque<Script>>>,
    download_delay: Duration,
    fail_resolution: AtomicBool,
    fail_name: Mutex<Option<String>>,
    cancel_at: Mutex<Option<(i64, CancellationToken)>>,
    fail_stream_at: AtomicI64,
    yield_invalid: AtomicBool,
    pub(crate) name_resolve_calls: AtomicU64,
    pub(crate) peer_resolve_calls: AtomicU64,
    pub(crate) download_calls: AtomicU64,
    pub(crate) in_flight: AtomicUsize,
    pub(crate) peak_in_flight: AtomicUsize,
}

impl MockSource {
    pub(crate) fn new(messages: Vec<RawMessage>) -> Self {
        Self {
            messages,
            scripts: Mutex::new(HashMap::new()),
            download_delay: Duration::ZERO,
            fail_resolution: AtomicBool::new(false),
            fail_name: Mutex::new(None),
            cancel_at: Mutex::new(None),
            fail_stream_at: AtomicI64::new(0),
            yield_invalid: AtomicBool::new(false),
            name_resolve_calls: AtomicU64::new(0),
            peer_resolve_calls: AtomicU64::new(0),
            download_calls: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    /// Delay every download attempt, so the concurrency gauge can observe
    /// overlapping workers
    pub(crate) fn with_download_delay(mut self, delay: Duration) -> Self {
        self.download_delay = delay;
        self
    }

    /// Queue outcomes for a message id; once drained, attempts fall back to
    /// the default (write the file, return Done)
    pub(crate) fn script_outcomes(&self, message_id: i64, outcomes: Vec<DownloadOutcome>) {
        let mut scripts = self.scripts.lock().unwrap();
        scripts
            .entry(message_id)
            .or_default()
            .extend(outcomes.into_iter().map(Script::Outcome));
    }

    /// Queue `count` attempts that claim success without writing the file
    pub(crate) fn script_phantom_success(&self, message_id: i64, count: usize) {
        let mut scripts = self.scripts.lock().unwrap();
        let queue = scripts.entry(message_id).or_default();
        for _ in 0..count {
            queue.push_back(Script::PhantomDone);
        }
    }

    /// Make entity resolution fail
    pub(crate) fn fail_resolution(&self) {
        self.fail_resolution.store(true, Ordering::SeqCst);
    }

    /// Make resolution fail for one specific name only
    pub(crate) fn fail_resolution_of(&self, name: &str) {
        *self.fail_name.lock().unwrap() = Some(name.to_string());
    }

    /// Cancel `token` the moment iteration yields this message id, so
    /// cancellation lands mid-stream rather than before or after a pass
    pub(crate) fn cancel_when_streaming(&self, message_id: i64, token: CancellationToken) {
        *self.cancel_at.lock().unwrap() = Some((message_id, token));
    }

    /// Make iteration yield an error when it reaches this message id
    pub(crate) fn fail_stream_at(&self, message_id: i64) {
        self.fail_stream_at.store(message_id, Ordering::SeqCst);
    }

    /// Remove a previously injected stream failure
    pub(crate) fn clear_stream_failure(&self) {
        self.fail_stream_at.store(0, Ordering::SeqCst);
    }

    /// Append a message that fails parsing (id 0) to every iteration
    pub(crate) fn inject_invalid_message(&self) {
        self.yield_invalid.store(true, Ordering::SeqCst);
    }

    fn handle(&self) -> Result<SourceHandle> {
        if self.fail_resolution.load(Ordering::SeqCst) {
            return Err(Error::Source("no such entity".to_string()));
        }
        Ok(SourceHandle {
            peer_id: 1,
            name: Some("mock".to_string()),
        })
    }
}

#[async_trait]
impl MessageSource for MockSource {
    async fn resolve_name(&self, name: &str) -> Result<SourceHandle> {
        self.name_resolve_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_name.lock().unwrap().as_deref() == Some(name) {
            return Err(Error::Source(format!("no such entity: {name}")));
        }
        self.handle()
    }

    async fn resolve_peer(&self, _peer_id: i64) -> Result<SourceHandle> {
        self.peer_resolve_calls.fetch_add(1, Ordering::SeqCst);
        self.handle()
    }

    async fn count_messages(&self, _handle: &SourceHandle) -> Result<u64> {
        Ok(self.messages.len() as u64)
    }

    fn iter_messages<'a>(
        &'a self,
        _handle: &'a SourceHandle,
        offset_id: i64,
    ) -> BoxStream<'a, Result<RawMessage>> {
        let fail_at = self.fail_stream_at.load(Ordering::SeqCst);
        let mut remaining: Vec<Result<RawMessage>> = Vec::new();
        for message in self.messages.iter().filter(|m| m.id > offset_id) {
            if fail_at != 0 && message.id == fail_at {
                remaining.push(Err(Error::Source("connection reset".to_string())));
                break;
            }
            remaining.push(Ok(message.clone()));
        }
        if self.yield_invalid.load(Ordering::SeqCst) {
            remaining.push(Ok(plain_message(0)));
        }
        let cancel_at = self.cancel_at.lock().unwrap().clone();
        futures::stream::iter(remaining)
            .map(move |item| {
                if let (Some((id, token)), Ok(message)) = (&cancel_at, &item) {
                    if message.id == *id {
                        token.cancel();
                    }
                }
                item
            })
            .boxed()
    }

    async fn fetch_by_ids(&self, _handle: &SourceHandle, ids: &[i64]) -> Result<Vec<RawMessage>> {
        Ok(self
            .messages
            .iter()
            .filter(|m| ids.contains(&m.id))
            .cloned()
            .collect())
    }

    async fn download_attachment(
        &self,
        _handle: &SourceHandle,
        message: &RawMessage,
        dest: &Path,
    ) -> DownloadOutcome {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);

        if !self.download_delay.is_zero() {
            tokio::time::sleep(self.download_delay).await;
        }

        let script = {
            let mut scripts = self.scripts.lock().unwrap();
            scripts.get_mut(&message.id).and_then(VecDeque::pop_front)
        };

        let outcome = match script {
            Some(Script::Outcome(outcome)) => outcome,
            Some(Script::PhantomDone) => DownloadOutcome::Done(dest.to_path_buf()),
            None => match tokio::fs::write(dest, b"payload").await {
                Ok(()) => DownloadOutcome::Done(dest.to_path_buf()),
                Err(e) => DownloadOutcome::Failed(e.to_string()),
            },
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        outcome
    }
}

/// A message with no sender, attachment, or counters
pub(crate) fn plain_message(id: i64) -> RawMessage {
    RawMessage {
        id,
        date: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::seconds(id),
        sender: None,
        text: format!("message {id}"),
        attachment: None,
        reply_to_id: None,
        author_signature: None,
        view_count: None,
        forward_count: None,
        reactions: Vec::new(),
    }
}

/// A message carrying an attachment of the given kind
pub(crate) fn attachment_message(
    id: i64,
    kind: AttachmentKind,
    file_name: Option<&str>,
    file_ext: Option<&str>,
) -> RawMessage {
    RawMessage {
        attachment: Some(RawAttachment {
            kind,
            file_name: file_name.map(str::to_string),
            file_ext: file_ext.map(str::to_string),
        }),
        ..plain_message(id)
    }
}

/// A message from a user-like sender with reactions, for parser round-trips
pub(crate) fn rich_message(id: i64) -> RawMessage {
    RawMessage {
        sender: Some(RawSender {
            id: 77,
            display_name: Some("Mock User".to_string()),
            handle: Some("mock_user".to_string()),
            is_user: true,
        }),
        view_count: Some(10),
        forward_count: Some(2),
        reactions: vec![RawReaction {
            symbol: "👍".to_string(),
            count: 4,
        }],
        ..plain_message(id)
    }
}
