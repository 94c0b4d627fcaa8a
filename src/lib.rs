//! Ghostwire - HTTP round-trip recorder for troubleshooting
//!
//! Wraps a [`RoundTripper`] and keeps the last few request/response exchanges
//! (wire dumps, timings, errors) in a fixed size ring for later inspection.
//! Redaction of the dumps happens when they are read, never when captured.
//!
//! ```no_run
//! use ghostwire::{Recorder, Redactor};
//!
//! # async fn run() -> ghostwire::Result<()> {
//! let recorder = Recorder::builder()
//!     .history_size(5)
//!     .request_redactor(Redactor::headers(["Authorization"], "[REDACTED]"))
//!     .build()?;
//!
//! let request = hyper::Request::get("http://example.com/").body(bytes::Bytes::new()).ok();
//! let _ = recorder.round_trip(request).await;
//!
//! println!("{recorder}");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::cargo)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::cast_possible_truncation,
    clippy::multiple_crate_versions
)]

pub mod config;
pub mod dump;
pub mod error;
pub mod exchange;
pub mod recorder;
pub mod redact;
pub mod transport;

pub use config::Config;
pub use dump::{Dump, WireDump};
pub use error::{CaptureError, DumpError, GhostwireError, Result, TransportError};
pub use exchange::Exchange;
pub use recorder::{Recorder, RecorderBuilder, DEFAULT_HISTORY_SIZE, MAX_HISTORY_SIZE};
pub use redact::{Redactor, DEFAULT_PLACEHOLDER};
pub use transport::{HyperTransport, RoundTripper};
