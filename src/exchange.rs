//! Captured request/response exchanges

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, TimeDelta, Utc};

use crate::error::{CaptureError, TransportError};
use crate::redact::RedactorSet;

/// One recorded round trip
///
/// Holds the raw dumps, the errors met while capturing them, the error
/// returned by the underlying round tripper and the start/end times. Dumps are
/// redacted on every read using the recorder's current redactors.
pub struct Exchange {
    start: DateTime<Utc>,
    end: DateTime<Utc>,

    request: Option<Bytes>,
    response: Option<Bytes>,

    request_error: Option<CaptureError>,
    response_error: Option<CaptureError>,

    round_trip_error: Option<TransportError>,

    redactors: Arc<RedactorSet>,
}

impl Exchange {
    /// Redacted request bytes, empty if the request was not captured
    #[must_use]
    pub fn request(&self) -> Vec<u8> {
        match &self.request {
            Some(raw) if !raw.is_empty() => self.redactors.request().apply(raw),
            _ => Vec::new(),
        }
    }

    /// Redacted response bytes, empty if the response was not captured
    #[must_use]
    pub fn response(&self) -> Vec<u8> {
        match &self.response {
            Some(raw) if !raw.is_empty() => self.redactors.response().apply(raw),
            _ => Vec::new(),
        }
    }

    /// Whether request bytes were captured at all
    #[must_use]
    pub fn has_request(&self) -> bool {
        self.request.is_some()
    }

    /// Whether response bytes were captured at all
    #[must_use]
    pub fn has_response(&self) -> bool {
        self.response.is_some()
    }

    /// Error met while capturing the request
    #[must_use]
    pub fn request_error(&self) -> Option<&CaptureError> {
        self.request_error.as_ref()
    }

    /// Error met while capturing the response
    #[must_use]
    pub fn response_error(&self) -> Option<&CaptureError> {
        self.response_error.as_ref()
    }

    /// Error returned by the underlying round tripper
    #[must_use]
    pub fn round_trip_error(&self) -> Option<&TransportError> {
        self.round_trip_error.as_ref()
    }

    /// True when no slot holds an error
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.request_error.is_none()
            && self.response_error.is_none()
            && self.round_trip_error.is_none()
    }

    /// When the round trip started
    #[must_use]
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// When the round trip finished
    #[must_use]
    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// `end - start`
    #[must_use]
    pub fn duration(&self) -> TimeDelta {
        self.end - self.start
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let duration = self.duration();

        writeln!(f, "*** Request ***")?;
        writeln!(f, "\"{}\"", self.request().escape_ascii())?;
        writeln!(f)?;
        writeln!(f, "err: {}", Slot(self.request_error.as_ref()))?;
        writeln!(f)?;
        writeln!(f, "*** Response ***")?;
        writeln!(f, "\"{}\"", self.response().escape_ascii())?;
        writeln!(f)?;
        writeln!(f, "err: {}", Slot(self.response_error.as_ref()))?;
        writeln!(f)?;
        writeln!(f, "*** Round trip ***")?;
        writeln!(f)?;
        writeln!(f, "start: {}", self.start.to_rfc3339())?;
        writeln!(f, "end: {}", self.end.to_rfc3339())?;
        match duration.to_std() {
            Ok(d) => writeln!(f, "duration: {d:?}")?,
            Err(_) => writeln!(f, "duration: {duration}")?,
        }
        writeln!(f)?;
        writeln!(f, "err: {}", Slot(self.round_trip_error.as_ref()))?;
        writeln!(f)?;
        write!(f, "***")
    }
}

impl fmt::Debug for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exchange")
            .field("start", &self.start)
            .field("end", &self.end)
            .field("request_len", &self.request.as_ref().map(Bytes::len))
            .field("response_len", &self.response.as_ref().map(Bytes::len))
            .field("request_error", &self.request_error)
            .field("response_error", &self.response_error)
            .field("round_trip_error", &self.round_trip_error)
            .finish_non_exhaustive()
    }
}

struct Slot<'a, E>(Option<&'a E>);

impl<E: fmt::Display> fmt::Display for Slot<'_, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(e) => fmt::Display::fmt(e, f),
            None => f.write_str("none"),
        }
    }
}

/// An exchange still being captured
pub(crate) struct Capture {
    start: DateTime<Utc>,
    request: Option<Bytes>,
    response: Option<Bytes>,
    request_error: Option<CaptureError>,
    response_error: Option<CaptureError>,
    round_trip_error: Option<TransportError>,
    redactors: Arc<RedactorSet>,
}

impl Capture {
    pub(crate) fn begin(redactors: Arc<RedactorSet>) -> Self {
        Self {
            start: Utc::now(),
            request: None,
            response: None,
            request_error: None,
            response_error: None,
            round_trip_error: None,
            redactors,
        }
    }

    pub(crate) fn set_request(&mut self, outcome: Result<Vec<u8>, CaptureError>) {
        match outcome {
            Ok(bytes) => self.request = Some(Bytes::from(bytes)),
            Err(e) => self.request_error = Some(e),
        }
    }

    pub(crate) fn set_response(&mut self, outcome: Result<Vec<u8>, CaptureError>) {
        match outcome {
            Ok(bytes) => self.response = Some(Bytes::from(bytes)),
            Err(e) => self.response_error = Some(e),
        }
    }

    pub(crate) fn set_round_trip_error(&mut self, error: TransportError) {
        self.round_trip_error = Some(error);
    }

    pub(crate) fn finish(self) -> Exchange {
        Exchange {
            start: self.start,
            end: Utc::now(),
            request: self.request,
            response: self.response,
            request_error: self.request_error,
            response_error: self.response_error,
            round_trip_error: self.round_trip_error,
            redactors: self.redactors,
        }
    }
}
