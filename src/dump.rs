//! Rendering of requests and responses to HTTP/1.x wire bytes

use bytes::Bytes;
use hyper::header::{HeaderMap, CONTENT_LENGTH, HOST, TRANSFER_ENCODING};
use hyper::{Method, Request, Response, StatusCode, Version};

use crate::error::DumpError;

/// Turns messages into the bytes stored on an exchange
///
/// Implementations may fail; failures are recorded on the exchange and never
/// reach the caller.
pub trait Dump: Send + Sync {
    /// Dump an outgoing request
    ///
    /// # Errors
    ///
    /// Returns error if the request cannot be rendered
    fn dump_request(&self, request: &Request<Bytes>) -> Result<Vec<u8>, DumpError>;

    /// Dump a received response
    ///
    /// # Errors
    ///
    /// Returns error if the response cannot be rendered
    fn dump_response(&self, response: &Response<Bytes>) -> Result<Vec<u8>, DumpError>;

    /// Dump a response knowing the method of the request that produced it
    ///
    /// `method` is `None` when no request was sent. Defaults to
    /// [`dump_response`](Dump::dump_response).
    ///
    /// # Errors
    ///
    /// Returns error if the response cannot be rendered
    fn dump_response_for(
        &self,
        _method: Option<&Method>,
        response: &Response<Bytes>,
    ) -> Result<Vec<u8>, DumpError> {
        self.dump_response(response)
    }
}

/// HTTP/1.x wire format dumper
#[derive(Debug, Clone, Copy)]
pub struct WireDump {
    /// Include message bodies
    pub include_body: bool,
}

impl Default for WireDump {
    fn default() -> Self {
        Self { include_body: true }
    }
}

impl WireDump {
    /// Dumper that omits bodies
    #[must_use]
    pub fn headers_only() -> Self {
        Self {
            include_body: false,
        }
    }
}

impl Dump for WireDump {
    fn dump_request(&self, request: &Request<Bytes>) -> Result<Vec<u8>, DumpError> {
        let body = request.body();
        check_content_length(request.headers(), body, false)?;

        let host = match request.headers().get(HOST) {
            Some(_) => None,
            None => Some(
                request
                    .uri()
                    .authority()
                    .map(|a| a.as_str().to_string())
                    .ok_or(DumpError::MissingHost)?,
            ),
        };

        let target = request
            .uri()
            .path_and_query()
            .map_or("/", |pq| pq.as_str());

        let mut out = Vec::with_capacity(256 + body.len());
        out.extend_from_slice(request.method().as_str().as_bytes());
        out.push(b' ');
        out.extend_from_slice(target.as_bytes());
        out.push(b' ');
        out.extend_from_slice(version_str(request.version()).as_bytes());
        out.extend_from_slice(b"\r\n");

        if let Some(host) = host {
            write_header(&mut out, b"Host", host.as_bytes());
        }
        write_headers(&mut out, request.headers(), body);
        out.extend_from_slice(b"\r\n");

        if self.include_body {
            write_body(&mut out, request.headers(), body);
        }

        Ok(out)
    }

    fn dump_response(&self, response: &Response<Bytes>) -> Result<Vec<u8>, DumpError> {
        self.dump_response_for(None, response)
    }

    fn dump_response_for(
        &self,
        method: Option<&Method>,
        response: &Response<Bytes>,
    ) -> Result<Vec<u8>, DumpError> {
        let body = response.body();
        // HEAD answers and 1xx/204/304 carry no body whatever Content-Length says
        let bodiless = method == Some(&Method::HEAD) || !status_allows_body(response.status());
        check_content_length(response.headers(), body, bodiless)?;

        let status = response.status();
        let mut out = Vec::with_capacity(256 + body.len());
        out.extend_from_slice(version_str(response.version()).as_bytes());
        out.push(b' ');
        out.extend_from_slice(status.as_str().as_bytes());
        if let Some(reason) = status.canonical_reason() {
            out.push(b' ');
            out.extend_from_slice(reason.as_bytes());
        }
        out.extend_from_slice(b"\r\n");

        write_headers(&mut out, response.headers(), body);
        out.extend_from_slice(b"\r\n");

        if self.include_body {
            write_body(&mut out, response.headers(), body);
        }

        Ok(out)
    }
}

/// Wire version string; HTTP/2 and later are written as HTTP/1.1
fn version_str(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "HTTP/0.9",
        Version::HTTP_10 => "HTTP/1.0",
        _ => "HTTP/1.1",
    }
}

fn status_allows_body(status: StatusCode) -> bool {
    !(status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED)
}

fn is_chunked(headers: &HeaderMap) -> bool {
    headers
        .get_all(TRANSFER_ENCODING)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .last()
        .is_some_and(|coding| coding.trim().eq_ignore_ascii_case("chunked"))
}

/// A framed body (Transfer-Encoding) or an empty body on a bodiless message
/// is not checked against Content-Length.
fn check_content_length(
    headers: &HeaderMap,
    body: &Bytes,
    bodiless: bool,
) -> Result<(), DumpError> {
    let Some(value) = headers.get(CONTENT_LENGTH) else {
        return Ok(());
    };
    if headers.contains_key(TRANSFER_ENCODING) || (bodiless && body.is_empty()) {
        return Ok(());
    }

    let declared = value
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .ok_or_else(|| {
            DumpError::InvalidContentLength(String::from_utf8_lossy(value.as_bytes()).into_owned())
        })?;
    let actual = body.len() as u64;

    if declared == actual {
        Ok(())
    } else {
        Err(DumpError::ContentLengthMismatch { declared, actual })
    }
}

fn write_headers(out: &mut Vec<u8>, headers: &HeaderMap, body: &Bytes) {
    for (name, value) in headers {
        write_header(out, canonical_name(name.as_str()).as_bytes(), value.as_bytes());
    }

    if !body.is_empty()
        && !headers.contains_key(CONTENT_LENGTH)
        && !headers.contains_key(TRANSFER_ENCODING)
    {
        write_header(out, b"Content-Length", body.len().to_string().as_bytes());
    }
}

/// Body as it goes on the wire; chunked messages get a single chunk
fn write_body(out: &mut Vec<u8>, headers: &HeaderMap, body: &Bytes) {
    if !is_chunked(headers) {
        out.extend_from_slice(body);
        return;
    }

    if !body.is_empty() {
        out.extend_from_slice(format!("{:x}\r\n", body.len()).as_bytes());
        out.extend_from_slice(body);
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"0\r\n\r\n");
}

fn write_header(out: &mut Vec<u8>, name: &[u8], value: &[u8]) {
    out.extend_from_slice(name);
    out.extend_from_slice(b": ");
    out.extend_from_slice(value);
    out.extend_from_slice(b"\r\n");
}

/// `content-type` -> `Content-Type`
fn canonical_name(name: &str) -> String {
    let mut upper = true;
    name.chars()
        .map(|c| {
            let mapped = if upper { c.to_ascii_uppercase() } else { c };
            upper = c == '-';
            mapped
        })
        .collect()
}
