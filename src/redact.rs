//! Redactors scrub captured bytes before they are handed out
//!
//! A [`Redactor`] is a total `(bytes) -> bytes` function. Recorders hold one
//! for requests and one for responses and apply them every time an exchange is
//! read, never at capture time.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use regex::bytes::{NoExpand, Regex};

use crate::{GhostwireError, Result};

/// Placeholder substituted by the built-in redactors
pub const DEFAULT_PLACEHOLDER: &str = "[REDACTED]";

type RedactFn = dyn Fn(&[u8]) -> Vec<u8> + Send + Sync;

/// Byte scrubbing function
#[derive(Clone)]
pub struct Redactor {
    func: Arc<RedactFn>,
}

impl Redactor {
    /// Wrap a caller supplied function
    ///
    /// The function must not fail; if it cannot process its input it should
    /// return a fixed placeholder instead.
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(&[u8]) -> Vec<u8> + Send + Sync + 'static,
    {
        Self {
            func: Arc::new(func),
        }
    }

    /// Returns its input unchanged
    #[must_use]
    pub fn identity() -> Self {
        Self::new(<[u8]>::to_vec)
    }

    /// Replace every occurrence of each literal secret with `placeholder`
    #[must_use]
    pub fn literals<I, S>(secrets: I, placeholder: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        let secrets: Vec<Vec<u8>> = secrets
            .into_iter()
            .map(|s| s.as_ref().to_vec())
            .filter(|s| !s.is_empty())
            .collect();
        let placeholder = placeholder.as_bytes().to_vec();

        Self::new(move |input| {
            secrets.iter().fold(input.to_vec(), |acc, secret| {
                replace_all(&acc, secret, &placeholder)
            })
        })
    }

    /// Replace every match of each byte pattern with `placeholder`
    ///
    /// # Errors
    ///
    /// Returns error if any pattern fails to compile
    pub fn patterns<I, S>(patterns: I, placeholder: &str) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let compiled = patterns
            .into_iter()
            .map(|p| {
                let p = p.as_ref();
                Regex::new(p).map_err(|e| GhostwireError::InvalidPattern {
                    pattern: p.to_string(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let placeholder = placeholder.as_bytes().to_vec();

        Ok(Self::new(move |input| {
            compiled.iter().fold(input.to_vec(), |acc, re| {
                re.replace_all(&acc, NoExpand(&placeholder)).into_owned()
            })
        }))
    }

    /// Replace the value of each named header in a wire dump
    ///
    /// Names match ASCII case-insensitively. Only the head (everything before
    /// the first blank line) is touched.
    #[must_use]
    pub fn headers<I, S>(names: I, placeholder: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names: Vec<String> = names.into_iter().map(|n| n.as_ref().to_string()).collect();
        let placeholder = placeholder.as_bytes().to_vec();

        Self::new(move |input| redact_header_values(input, &names, &placeholder))
    }

    /// Apply several redactors in order
    #[must_use]
    pub fn chain<I>(redactors: I) -> Self
    where
        I: IntoIterator<Item = Redactor>,
    {
        let redactors: Vec<Redactor> = redactors.into_iter().collect();
        match redactors.len() {
            0 => Self::identity(),
            1 => redactors.into_iter().next().unwrap_or_default(),
            _ => Self::new(move |input| {
                redactors
                    .iter()
                    .fold(input.to_vec(), |acc, redactor| redactor.apply(&acc))
            }),
        }
    }

    /// Run the redactor over `input`
    #[must_use]
    pub fn apply(&self, input: &[u8]) -> Vec<u8> {
        (self.func)(input)
    }
}

impl Default for Redactor {
    fn default() -> Self {
        Self::identity()
    }
}

impl fmt::Debug for Redactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Redactor").finish_non_exhaustive()
    }
}

/// Request and response redactors shared between a recorder and its exchanges
#[derive(Debug, Default)]
pub(crate) struct RedactorSet {
    request: RwLock<Redactor>,
    response: RwLock<Redactor>,
}

impl RedactorSet {
    pub(crate) fn new(request: Redactor, response: Redactor) -> Self {
        Self {
            request: RwLock::new(request),
            response: RwLock::new(response),
        }
    }

    pub(crate) fn request(&self) -> Redactor {
        self.request
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn response(&self) -> Redactor {
        self.response
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn set_request(&self, redactor: Redactor) {
        *self.request.write().unwrap_or_else(PoisonError::into_inner) = redactor;
    }

    pub(crate) fn set_response(&self, redactor: Redactor) {
        *self.response.write().unwrap_or_else(PoisonError::into_inner) = redactor;
    }
}

fn replace_all(haystack: &[u8], needle: &[u8], replacement: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(haystack.len());
    let mut rest = haystack;

    while let Some(pos) = find(rest, needle) {
        out.extend_from_slice(&rest[..pos]);
        out.extend_from_slice(replacement);
        rest = &rest[pos + needle.len()..];
    }
    out.extend_from_slice(rest);

    out
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn redact_header_values(input: &[u8], names: &[String], placeholder: &[u8]) -> Vec<u8> {
    let head_len = find(input, b"\r\n\r\n").map_or(input.len(), |pos| pos + 2);
    let (head, body) = input.split_at(head_len);

    let mut out = Vec::with_capacity(input.len());
    for line in head.split_inclusive(|&b| b == b'\n') {
        match line.iter().position(|&b| b == b':') {
            Some(colon) if is_named(&line[..colon], names) => {
                let ending: &[u8] = if line.ends_with(b"\r\n") {
                    b"\r\n"
                } else if line.ends_with(b"\n") {
                    b"\n"
                } else {
                    b""
                };
                out.extend_from_slice(&line[..=colon]);
                out.push(b' ');
                out.extend_from_slice(placeholder);
                out.extend_from_slice(ending);
            }
            _ => out.extend_from_slice(line),
        }
    }
    out.extend_from_slice(body);

    out
}

fn is_named(name: &[u8], names: &[String]) -> bool {
    let start = name.iter().position(|b| !b.is_ascii_whitespace());
    let end = name.iter().rposition(|b| !b.is_ascii_whitespace());
    let name = match (start, end) {
        (Some(start), Some(end)) => &name[start..=end],
        _ => return false,
    };
    names
        .iter()
        .any(|n| n.as_bytes().eq_ignore_ascii_case(name))
}
