//! Typed header values and the ordered, case-insensitive header map.

use crate::resource::ChannelIdentifier;
use smallvec::SmallVec;
use std::fmt;

/// `Channel-Identifier`
pub const CHANNEL_IDENTIFIER: &str = "Channel-Identifier";
/// `Content-Length`
pub const CONTENT_LENGTH: &str = "Content-Length";
/// `Content-Type`
pub const CONTENT_TYPE: &str = "Content-Type";
/// `Completion-Cause`
pub const COMPLETION_CAUSE: &str = "Completion-Cause";
/// `Completion-Reason`
pub const COMPLETION_REASON: &str = "Completion-Reason";
/// `Active-Request-Id-List`
pub const ACTIVE_REQUEST_ID_LIST: &str = "Active-Request-Id-List";

/// Headers carrying a non-negative decimal integer
pub const INTEGER_HEADERS: &[&str] = &[
    CONTENT_LENGTH,
    "No-Input-Timeout",
    "Recognition-Timeout",
    "Speech-Complete-Timeout",
    "Speech-Incomplete-Timeout",
    "Dtmf-Interdigit-Timeout",
    "Dtmf-Term-Timeout",
    "N-Best-List-Length",
    "Hotword-Max-Duration",
    "Hotword-Min-Duration",
    "Max-Time",
    "Final-Silence",
];

/// Headers carrying `true` / `false`
pub const BOOLEAN_HEADERS: &[&str] = &[
    "Kill-On-Barge-In",
    "Save-Waveform",
    "Early-No-Match",
    "Start-Input-Timers",
    "Ver-Buffer-Utterance",
    "New-Audio-Channel",
    "Clear-Dtmf-Buffer",
    "Abort-Model",
    "Abort-Verification",
];

/// Headers carrying a finite decimal number
pub const FLOAT_HEADERS: &[&str] = &["Confidence-Threshold", "Sensitivity-Level", "Speed-Vs-Accuracy"];

/// `Completion-Cause` value: numeric cause plus its name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompletionCause {
    /// Numeric cause (rendered as three digits)
    pub code: u16,
    /// Cause name, e.g. `success` or `no-match`
    pub name: String,
}

impl CompletionCause {
    /// Create a completion cause
    pub fn new(code: u16, name: impl Into<String>) -> Self {
        Self {
            code,
            name: name.into(),
        }
    }
}

impl fmt::Display for CompletionCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03} {}", self.code, self.name)
    }
}

/// A parsed header value
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    /// Opaque text
    Text(String),
    /// `Channel-Identifier`
    ChannelIdentifier(ChannelIdentifier),
    /// Non-negative integer
    Integer(u64),
    /// Boolean flag
    Boolean(bool),
    /// Finite decimal number
    Float(f64),
    /// `Completion-Cause`
    CompletionCause(CompletionCause),
    /// `Active-Request-Id-List`
    RequestIdList(Vec<u64>),
}

impl HeaderValue {
    /// Text payload, if this is an opaque value
    pub fn as_text(&self) -> Option<&str> {
        match self {
            HeaderValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Channel identifier payload
    pub fn as_channel_identifier(&self) -> Option<&ChannelIdentifier> {
        match self {
            HeaderValue::ChannelIdentifier(id) => Some(id),
            _ => None,
        }
    }

    /// Integer payload
    pub fn as_integer(&self) -> Option<u64> {
        match self {
            HeaderValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Boolean payload
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            HeaderValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Float payload
    pub fn as_float(&self) -> Option<f64> {
        match self {
            HeaderValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Completion cause payload
    pub fn as_completion_cause(&self) -> Option<&CompletionCause> {
        match self {
            HeaderValue::CompletionCause(c) => Some(c),
            _ => None,
        }
    }

    /// Request id list payload
    pub fn as_request_id_list(&self) -> Option<&[u64]> {
        match self {
            HeaderValue::RequestIdList(ids) => Some(ids),
            _ => None,
        }
    }
}

/// Canonical wire text of the value
impl fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderValue::Text(s) => f.write_str(s),
            HeaderValue::ChannelIdentifier(id) => write!(f, "{}", id),
            HeaderValue::Integer(n) => write!(f, "{}", n),
            HeaderValue::Boolean(b) => f.write_str(if *b { "true" } else { "false" }),
            HeaderValue::Float(v) => write!(f, "{}", v),
            HeaderValue::CompletionCause(c) => write!(f, "{}", c),
            HeaderValue::RequestIdList(ids) => {
                for (i, id) in ids.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}", id)?;
                }
                Ok(())
            }
        }
    }
}

impl From<&str> for HeaderValue {
    fn from(value: &str) -> Self {
        HeaderValue::Text(value.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(value: String) -> Self {
        HeaderValue::Text(value)
    }
}

impl From<u64> for HeaderValue {
    fn from(value: u64) -> Self {
        HeaderValue::Integer(value)
    }
}

impl From<bool> for HeaderValue {
    fn from(value: bool) -> Self {
        HeaderValue::Boolean(value)
    }
}

impl From<f64> for HeaderValue {
    fn from(value: f64) -> Self {
        HeaderValue::Float(value)
    }
}

impl From<ChannelIdentifier> for HeaderValue {
    fn from(value: ChannelIdentifier) -> Self {
        HeaderValue::ChannelIdentifier(value)
    }
}

impl From<CompletionCause> for HeaderValue {
    fn from(value: CompletionCause) -> Self {
        HeaderValue::CompletionCause(value)
    }
}

/// Ordered header mapping with case-insensitive names and no duplicates.
///
/// Names keep the spelling of their first insertion; wire order follows
/// insertion order.
#[derive(Debug, Clone, Default)]
pub struct HeaderMap {
    entries: SmallVec<[(String, HeaderValue); 8]>,
}

impl HeaderMap {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of headers
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(n, _)| n.eq_ignore_ascii_case(name))
    }

    /// Look up a header value by name
    pub fn get(&self, name: &str) -> Option<&HeaderValue> {
        self.position(name).map(|i| &self.entries[i].1)
    }

    /// Whether a header is present
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Insert or replace a header, keeping its original position on replace.
    /// Returns the previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<HeaderValue>) -> Option<HeaderValue> {
        let name = name.into();
        let value = value.into();
        match self.position(&name) {
            Some(i) => Some(std::mem::replace(&mut self.entries[i].1, value)),
            None => {
                self.entries.push((name, value));
                None
            }
        }
    }

    /// Append a header that must not already be present. On a duplicate the
    /// value is handed back and the map is unchanged.
    pub fn try_append(&mut self, name: impl Into<String>, value: HeaderValue) -> Result<(), HeaderValue> {
        let name = name.into();
        if self.contains(&name) {
            return Err(value);
        }
        self.entries.push((name, value));
        Ok(())
    }

    /// Remove a header
    pub fn remove(&mut self, name: &str) -> Option<HeaderValue> {
        self.position(name).map(|i| self.entries.remove(i).1)
    }

    /// Iterate in wire order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &HeaderValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }
}

/// Map equality: same names (case-insensitive) with equal values, in any order
impl PartialEq for HeaderMap {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(name, value)| other.get(name) == Some(value))
    }
}
