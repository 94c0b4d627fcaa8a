//! The recorder: a round tripper that remembers its last few exchanges

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use hyper::{Request, Response};
use tracing::{debug, warn};

use crate::config::Config;
use crate::dump::{Dump, WireDump};
use crate::error::{CaptureError, DumpError, TransportError};
use crate::exchange::{Capture, Exchange};
use crate::redact::{Redactor, RedactorSet};
use crate::transport::{HyperTransport, RoundTripper};
use crate::{GhostwireError, Result};

/// Number of exchanges kept when no size is configured
pub const DEFAULT_HISTORY_SIZE: usize = 3;

/// Largest accepted history size
pub const MAX_HISTORY_SIZE: usize = 4096;

/// Fixed size ring of exchanges
///
/// `next` is the slot written next, which is also the oldest surviving (or
/// an unused) slot.
struct Ring {
    slots: Vec<Option<Arc<Exchange>>>,
    next: usize,
}

impl Ring {
    /// # Panics
    ///
    /// Panics if `size` is 0; callers validate with [`validate_history_size`]
    fn new(size: usize) -> Self {
        assert!(size > 0, "history size must be > 0");

        Self {
            slots: vec![None; size],
            next: 0,
        }
    }

    /// Store `exchange`, overwriting the oldest slot, and return the slot used
    fn push(&mut self, exchange: Arc<Exchange>) -> usize {
        let slot = self.next;
        self.slots[slot] = Some(exchange);
        self.next = (slot + 1) % self.slots.len();
        slot
    }

    /// Exchanges in insertion order, oldest first
    fn iter(&self) -> impl Iterator<Item = &Arc<Exchange>> {
        let (newer, older) = self.slots.split_at(self.next);
        older.iter().chain(newer).flatten()
    }

    fn latest(&self) -> Option<&Arc<Exchange>> {
        let size = self.slots.len();
        self.slots[(self.next + size - 1) % size].as_ref()
    }
}

/// Records recent round trips made through an underlying [`RoundTripper`]
///
/// Every call to [`round_trip`](Recorder::round_trip) is delegated unchanged
/// and its outcome is stored in a fixed size ring. Reads take the same lock
/// as writes, so [`history`](Recorder::history) always sees whole exchanges.
pub struct Recorder<T = HyperTransport> {
    transport: Arc<T>,
    ring: Mutex<Ring>,
    redactors: Arc<RedactorSet>,
    dumper: Arc<dyn Dump>,
}

impl Recorder<HyperTransport> {
    /// Start configuring a recorder around the shared hyper transport
    #[must_use]
    pub fn builder() -> RecorderBuilder<HyperTransport> {
        RecorderBuilder::new()
    }
}

impl Default for Recorder<HyperTransport> {
    fn default() -> Self {
        Self::new(HyperTransport::shared())
    }
}

impl<T: RoundTripper> Recorder<T> {
    /// Wrap `transport` with default settings
    #[must_use]
    pub fn new(transport: Arc<T>) -> Self {
        Self::from_parts(
            transport,
            DEFAULT_HISTORY_SIZE,
            Redactor::identity(),
            Redactor::identity(),
            Arc::new(WireDump::default()),
        )
    }

    // `history_size` must be in 1..=MAX_HISTORY_SIZE; `build` validates it
    fn from_parts(
        transport: Arc<T>,
        history_size: usize,
        request_redactor: Redactor,
        response_redactor: Redactor,
        dumper: Arc<dyn Dump>,
    ) -> Self {
        Self {
            transport,
            ring: Mutex::new(Ring::new(history_size)),
            redactors: Arc::new(RedactorSet::new(request_redactor, response_redactor)),
            dumper,
        }
    }

    /// Send `request` through the underlying transport and record the exchange
    ///
    /// The result is exactly what the underlying transport returned. Problems
    /// while capturing (absent messages, dump failures, dump panics) are only
    /// recorded on the exchange.
    ///
    /// # Errors
    ///
    /// Returns the underlying transport's error, unchanged
    pub async fn round_trip(
        &self,
        request: Option<Request<Bytes>>,
    ) -> std::result::Result<Response<Bytes>, TransportError> {
        let mut capture = Capture::begin(Arc::clone(&self.redactors));

        capture.set_request(match &request {
            Some(request) => self.dump("request", |d| d.dump_request(request)),
            None => Err(CaptureError::RequestAbsent),
        });

        let method = request.as_ref().map(|r| r.method().clone());
        let result = self.transport.round_trip(request).await;

        match &result {
            Ok(response) => {
                capture.set_response(self.dump("response", |d| {
                    d.dump_response_for(method.as_ref(), response)
                }));
            }
            Err(e) => {
                capture.set_round_trip_error(e.clone());
                capture.set_response(Err(CaptureError::ResponseAbsent));
            }
        }

        self.insert(capture.finish());

        result
    }

    fn dump<F>(&self, what: &str, dump: F) -> std::result::Result<Vec<u8>, CaptureError>
    where
        F: FnOnce(&dyn Dump) -> std::result::Result<Vec<u8>, DumpError>,
    {
        match panic::catch_unwind(AssertUnwindSafe(|| dump(self.dumper.as_ref()))) {
            Ok(Ok(bytes)) => Ok(bytes),
            Ok(Err(e)) => {
                warn!("Failed to dump {}: {}", what, e);
                Err(CaptureError::Dump(e))
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!("Dumping {} panicked: {}", what, message);
                Err(CaptureError::DumpPanicked(message))
            }
        }
    }

    fn insert(&self, exchange: Exchange) {
        let success = exchange.is_success();
        let duration = exchange.duration();

        let slot = self.lock().push(Arc::new(exchange));

        debug!(
            "Recorded exchange in slot {} (duration: {}, success: {})",
            slot, duration, success
        );
    }
}

impl<T> Recorder<T> {
    fn lock(&self) -> MutexGuard<'_, Ring> {
        self.ring.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Recorded exchanges, oldest first
    #[must_use]
    pub fn history(&self) -> Vec<Arc<Exchange>> {
        self.lock().iter().cloned().collect()
    }

    /// Most recently recorded exchange
    #[must_use]
    pub fn latest(&self) -> Option<Arc<Exchange>> {
        self.lock().latest().cloned()
    }

    /// Number of exchanges currently held
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().iter().count()
    }

    /// True until the first exchange is recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of exchanges held
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.lock().slots.len()
    }

    /// The wrapped transport
    #[must_use]
    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Replace the request redactor; applies to exchanges already recorded
    pub fn set_request_redactor(&self, redactor: Redactor) {
        self.redactors.set_request(redactor);
    }

    /// Replace the response redactor; applies to exchanges already recorded
    pub fn set_response_redactor(&self, redactor: Redactor) {
        self.redactors.set_response(redactor);
    }

    /// Every recorded exchange rendered for humans, oldest first
    #[must_use]
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl<T> fmt::Display for Recorder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for exchange in self.history() {
            writeln!(f, "{exchange}")?;
        }
        Ok(())
    }
}

impl<T> fmt::Debug for Recorder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recorder")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl<T: RoundTripper> RoundTripper for Recorder<T> {
    fn round_trip(
        &self,
        request: Option<Request<Bytes>>,
    ) -> impl Future<Output = std::result::Result<Response<Bytes>, TransportError>> + Send {
        Recorder::round_trip(self, request)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Configures and builds a [`Recorder`]
pub struct RecorderBuilder<T = HyperTransport> {
    transport: Arc<T>,
    history_size: usize,
    request_redactor: Redactor,
    response_redactor: Redactor,
    dumper: Arc<dyn Dump>,
}

impl RecorderBuilder<HyperTransport> {
    /// Builder with every option at its default
    #[must_use]
    pub fn new() -> Self {
        Self {
            transport: HyperTransport::shared(),
            history_size: DEFAULT_HISTORY_SIZE,
            request_redactor: Redactor::identity(),
            response_redactor: Redactor::identity(),
            dumper: Arc::new(WireDump::default()),
        }
    }

    /// Builder seeded from a loaded configuration
    ///
    /// # Errors
    ///
    /// Returns error if a redaction pattern is invalid
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new()
            .history_size(config.history_size)
            .request_redactor(config.redaction.request_redactor()?)
            .response_redactor(config.redaction.response_redactor()?)
            .dumper(WireDump {
                include_body: config.dump.include_body,
            }))
    }
}

impl Default for RecorderBuilder<HyperTransport> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: RoundTripper> RecorderBuilder<T> {
    /// Use `transport` as the underlying round tripper
    #[must_use]
    pub fn transport<U: RoundTripper>(self, transport: Arc<U>) -> RecorderBuilder<U> {
        RecorderBuilder {
            transport,
            history_size: self.history_size,
            request_redactor: self.request_redactor,
            response_redactor: self.response_redactor,
            dumper: self.dumper,
        }
    }

    /// Number of exchanges to keep
    #[must_use]
    pub fn history_size(mut self, size: usize) -> Self {
        self.history_size = size;
        self
    }

    /// Redactor applied to request dumps when read
    #[must_use]
    pub fn request_redactor(mut self, redactor: Redactor) -> Self {
        self.request_redactor = redactor;
        self
    }

    /// Redactor applied to response dumps when read
    #[must_use]
    pub fn response_redactor(mut self, redactor: Redactor) -> Self {
        self.response_redactor = redactor;
        self
    }

    /// Replace the wire dumper
    #[must_use]
    pub fn dumper(mut self, dumper: impl Dump + 'static) -> Self {
        self.dumper = Arc::new(dumper);
        self
    }

    /// Build the recorder
    ///
    /// # Errors
    ///
    /// Returns error if the history size is zero or above [`MAX_HISTORY_SIZE`]
    pub fn build(self) -> Result<Recorder<T>> {
        validate_history_size(self.history_size)?;

        Ok(Recorder::from_parts(
            self.transport,
            self.history_size,
            self.request_redactor,
            self.response_redactor,
            self.dumper,
        ))
    }
}

/// Check a history size against the accepted range
///
/// # Errors
///
/// Returns error if `size` is zero or above [`MAX_HISTORY_SIZE`]
pub fn validate_history_size(size: usize) -> Result<()> {
    if size == 0 || size > MAX_HISTORY_SIZE {
        return Err(GhostwireError::InvalidHistorySize {
            size,
            max: MAX_HISTORY_SIZE,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers every request with its sequence number as the body
    struct Counter {
        calls: AtomicUsize,
    }

    impl Counter {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl RoundTripper for Counter {
        fn round_trip(
            &self,
            _request: Option<Request<Bytes>>,
        ) -> impl Future<Output = std::result::Result<Response<Bytes>, TransportError>> + Send
        {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Ok(Response::new(Bytes::from(n.to_string()))) }
        }
    }

    fn request(path: &str) -> Option<Request<Bytes>> {
        Some(
            Request::builder()
                .uri(format!("http://example.com{path}"))
                .body(Bytes::new())
                .unwrap(),
        )
    }

    fn bodies<T>(recorder: &Recorder<T>) -> Vec<String> {
        recorder
            .history()
            .iter()
            .map(|e| {
                let response = e.response();
                let body = response.rsplit(|&b| b == b'\n').next().unwrap_or_default();
                String::from_utf8_lossy(body).into_owned()
            })
            .collect()
    }

    #[test]
    fn test_ring_order_before_and_after_wrap() {
        let mut ring = Ring::new(3);
        let redactors = Arc::new(RedactorSet::default());
        let mut pushed = Vec::new();

        for _ in 0..5 {
            let exchange = Arc::new(Capture::begin(Arc::clone(&redactors)).finish());
            pushed.push(Arc::clone(&exchange));
            ring.push(exchange);

            let held: Vec<_> = ring.iter().cloned().collect();
            let expected = &pushed[pushed.len().saturating_sub(3)..];
            assert_eq!(held.len(), expected.len());
            for (a, b) in held.iter().zip(expected) {
                assert!(Arc::ptr_eq(a, b));
            }
            assert!(Arc::ptr_eq(ring.latest().unwrap(), pushed.last().unwrap()));
        }
    }

    #[test]
    #[should_panic(expected = "history size must be > 0")]
    fn test_ring_zero_size_panic() {
        let _ = Ring::new(0);
    }

    #[tokio::test]
    async fn test_default_capacity() {
        let recorder = Recorder::new(Counter::new());

        assert_eq!(recorder.capacity(), DEFAULT_HISTORY_SIZE);
        assert!(recorder.is_empty());
        assert!(recorder.latest().is_none());
        assert_eq!(recorder.render(), "");
    }

    #[tokio::test]
    async fn test_keeps_most_recent_exchanges() {
        let recorder = Recorder::new(Counter::new());

        for i in 0..5 {
            recorder.round_trip(request(&format!("/{i}"))).await.unwrap();
        }

        assert_eq!(recorder.len(), 3);
        assert_eq!(bodies(&recorder), ["3", "4", "5"]);
    }

    #[tokio::test]
    async fn test_partially_filled_ring() {
        let recorder = Recorder::builder()
            .transport(Counter::new())
            .history_size(4)
            .build()
            .unwrap();

        recorder.round_trip(request("/a")).await.unwrap();
        recorder.round_trip(request("/b")).await.unwrap();

        assert_eq!(bodies(&recorder), ["1", "2"]);
        assert_eq!(recorder.latest().unwrap().response(), recorder.history()[1].response());
    }

    #[test]
    fn test_builder_rejects_bad_sizes() {
        let zero = Recorder::builder().transport(Counter::new()).history_size(0).build();
        assert!(matches!(
            zero,
            Err(GhostwireError::InvalidHistorySize { size: 0, .. })
        ));

        let huge = Recorder::builder()
            .transport(Counter::new())
            .history_size(MAX_HISTORY_SIZE + 1)
            .build();
        assert!(huge.is_err());
    }

    #[tokio::test]
    async fn test_recorder_stacks_as_round_tripper() {
        let inner = Arc::new(Recorder::new(Counter::new()));
        let outer = Recorder::new(Arc::clone(&inner));

        outer.round_trip(request("/")).await.unwrap();

        assert_eq!(inner.len(), 1);
        assert_eq!(outer.len(), 1);
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(payload.as_ref()), "static");

        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");

        let payload: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic payload");
    }
}
