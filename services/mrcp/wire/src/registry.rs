//! Header type registry.
//!
//! Maps header names (case-insensitive) to a parser/formatter pair. Names
//! with no registration are handled as opaque trimmed text, so parsing an
//! unknown header never fails.

use crate::error::IllegalValue;
use crate::header::{
    CompletionCause, HeaderValue, ACTIVE_REQUEST_ID_LIST, BOOLEAN_HEADERS, CHANNEL_IDENTIFIER,
    COMPLETION_CAUSE, FLOAT_HEADERS, INTEGER_HEADERS,
};
use crate::resource::ChannelIdentifier;
use once_cell::sync::{Lazy, OnceCell};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Parser/formatter for one header value syntax
pub trait HeaderValueFactory: Send + Sync {
    /// Parse trimmed wire text into a typed value
    fn parse(&self, name: &str, raw: &str) -> Result<HeaderValue, IllegalValue>;

    /// Render a value as wire text
    fn format(&self, value: &HeaderValue) -> String {
        value.to_string()
    }
}

/// Opaque text; always succeeds
#[derive(Debug, Clone, Copy, Default)]
pub struct TextFactory;

impl HeaderValueFactory for TextFactory {
    fn parse(&self, _name: &str, raw: &str) -> Result<HeaderValue, IllegalValue> {
        Ok(HeaderValue::Text(raw.trim().to_string()))
    }
}

/// `<channel-id>@<resource-type>`
#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelIdentifierFactory;

impl HeaderValueFactory for ChannelIdentifierFactory {
    fn parse(&self, name: &str, raw: &str) -> Result<HeaderValue, IllegalValue> {
        raw.parse::<ChannelIdentifier>()
            .map(HeaderValue::ChannelIdentifier)
            .map_err(|e| IllegalValue::new(name, raw, e.reason))
    }
}

fn parse_digits(name: &str, raw: &str, token: &str) -> Result<u64, IllegalValue> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return Err(IllegalValue::new(name, raw, "expected a non-negative decimal integer"));
    }
    token
        .parse::<u64>()
        .map_err(|e| IllegalValue::new(name, raw, e.to_string()))
}

/// Non-negative decimal integer
#[derive(Debug, Clone, Copy, Default)]
pub struct IntegerFactory;

impl HeaderValueFactory for IntegerFactory {
    fn parse(&self, name: &str, raw: &str) -> Result<HeaderValue, IllegalValue> {
        parse_digits(name, raw, raw.trim()).map(HeaderValue::Integer)
    }
}

/// `true` / `false`, case-insensitive
#[derive(Debug, Clone, Copy, Default)]
pub struct BooleanFactory;

impl HeaderValueFactory for BooleanFactory {
    fn parse(&self, name: &str, raw: &str) -> Result<HeaderValue, IllegalValue> {
        let token = raw.trim();
        if token.eq_ignore_ascii_case("true") {
            Ok(HeaderValue::Boolean(true))
        } else if token.eq_ignore_ascii_case("false") {
            Ok(HeaderValue::Boolean(false))
        } else {
            Err(IllegalValue::new(name, raw, "expected true or false"))
        }
    }
}

/// Finite decimal number
#[derive(Debug, Clone, Copy, Default)]
pub struct FloatFactory;

impl HeaderValueFactory for FloatFactory {
    fn parse(&self, name: &str, raw: &str) -> Result<HeaderValue, IllegalValue> {
        let token = raw.trim();
        // f64::from_str also takes "inf" and "NaN"
        if !token
            .bytes()
            .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'-' | b'+' | b'e' | b'E'))
        {
            return Err(IllegalValue::new(name, raw, "expected a decimal number"));
        }
        match token.parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(HeaderValue::Float(v)),
            Ok(_) => Err(IllegalValue::new(name, raw, "value is not finite")),
            Err(e) => Err(IllegalValue::new(name, raw, e.to_string())),
        }
    }
}

/// `<3-digit code> <name>`
#[derive(Debug, Clone, Copy, Default)]
pub struct CompletionCauseFactory;

impl HeaderValueFactory for CompletionCauseFactory {
    fn parse(&self, name: &str, raw: &str) -> Result<HeaderValue, IllegalValue> {
        let value = raw.trim();
        let (code, cause) = value
            .split_once(char::is_whitespace)
            .ok_or_else(|| IllegalValue::new(name, raw, "expected '<code> <name>'"))?;
        if code.len() != 3 {
            return Err(IllegalValue::new(name, raw, "cause code must have three digits"));
        }
        let code = parse_digits(name, raw, code)?;
        let cause = cause.trim();
        if cause.is_empty() {
            return Err(IllegalValue::new(name, raw, "blank cause name"));
        }
        Ok(HeaderValue::CompletionCause(CompletionCause::new(code as u16, cause)))
    }
}

/// Comma-separated request ids
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestIdListFactory;

impl HeaderValueFactory for RequestIdListFactory {
    fn parse(&self, name: &str, raw: &str) -> Result<HeaderValue, IllegalValue> {
        let ids = raw
            .trim()
            .split(',')
            .map(|id| parse_digits(name, raw, id.trim()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(HeaderValue::RequestIdList(ids))
    }
}

/// Header name → value syntax
pub struct HeaderRegistry {
    factories: HashMap<String, Arc<dyn HeaderValueFactory>>,
    fallback: TextFactory,
}

impl HeaderRegistry {
    /// Registry with no registrations; every header is opaque text
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
            fallback: TextFactory,
        }
    }

    /// Registry with the standard MRCPv2 header set
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(CHANNEL_IDENTIFIER, ChannelIdentifierFactory);
        for name in INTEGER_HEADERS {
            registry.register(name, IntegerFactory);
        }
        for name in BOOLEAN_HEADERS {
            registry.register(name, BooleanFactory);
        }
        for name in FLOAT_HEADERS {
            registry.register(name, FloatFactory);
        }
        registry.register(COMPLETION_CAUSE, CompletionCauseFactory);
        registry.register(ACTIVE_REQUEST_ID_LIST, RequestIdListFactory);
        registry
    }

    /// Register a factory; a later registration for the same name replaces it
    pub fn register(&mut self, name: &str, factory: impl HeaderValueFactory + 'static) {
        self.factories
            .insert(name.to_ascii_lowercase(), Arc::new(factory));
    }

    /// Whether a name has an explicit registration
    pub fn is_registered(&self, name: &str) -> bool {
        self.factories.contains_key(&name.to_ascii_lowercase())
    }

    fn factory(&self, name: &str) -> &dyn HeaderValueFactory {
        match self.factories.get(&name.to_ascii_lowercase()) {
            Some(factory) => factory.as_ref(),
            None => &self.fallback,
        }
    }

    /// Parse a raw header value
    pub fn parse_value(&self, name: &str, raw: &str) -> Result<HeaderValue, IllegalValue> {
        self.factory(name).parse(name, raw)
    }

    /// Format a header value as wire text
    pub fn format_value(&self, name: &str, value: &HeaderValue) -> String {
        self.factory(name).format(value)
    }
}

impl Default for HeaderRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl fmt::Debug for HeaderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.factories.keys().collect();
        names.sort();
        f.debug_struct("HeaderRegistry").field("registered", &names).finish()
    }
}

static GLOBAL_REGISTRY: OnceCell<Arc<HeaderRegistry>> = OnceCell::new();
static STANDARD_REGISTRY: Lazy<Arc<HeaderRegistry>> = Lazy::new(|| Arc::new(HeaderRegistry::standard()));

/// Install the process-wide registry. Fails (returning the argument) if one
/// was already installed.
pub fn install_global(registry: Arc<HeaderRegistry>) -> Result<(), Arc<HeaderRegistry>> {
    GLOBAL_REGISTRY.set(registry)
}

/// The installed process-wide registry, or the standard set if none was installed
pub fn global() -> Arc<HeaderRegistry> {
    GLOBAL_REGISTRY
        .get()
        .cloned()
        .unwrap_or_else(|| STANDARD_REGISTRY.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceType;

    fn round_trip(registry: &HeaderRegistry, name: &str, raw: &str) -> String {
        let value = registry.parse_value(name, raw).unwrap();
        registry.format_value(name, &value)
    }

    #[test]
    fn test_unknown_header_is_text() {
        let registry = HeaderRegistry::standard();
        assert!(!registry.is_registered("Vendor-Specific-Parameters"));
        let value = registry
            .parse_value("Vendor-Specific-Parameters", "  com.example.foo=1 ")
            .unwrap();
        assert_eq!(value, HeaderValue::Text("com.example.foo=1".into()));
    }

    #[test]
    fn test_channel_identifier_header() {
        let registry = HeaderRegistry::standard();
        let value = registry
            .parse_value("channel-identifier", "12345@SPEECHRECOG")
            .unwrap();
        let id = value.as_channel_identifier().unwrap();
        assert_eq!(id.resource_type(), ResourceType::SpeechRecog);
        assert_eq!(registry.format_value(CHANNEL_IDENTIFIER, &value), "12345@speechrecog");

        for bad in ["a@b@c", "", "12345speechrecog"] {
            let err = registry.parse_value(CHANNEL_IDENTIFIER, bad).unwrap_err();
            assert_eq!(err.name, CHANNEL_IDENTIFIER);
            assert_eq!(err.value, bad);
        }
    }

    #[test]
    fn test_integer_headers() {
        let registry = HeaderRegistry::standard();
        assert_eq!(round_trip(&registry, "Content-Length", "0042"), "42");
        assert_eq!(round_trip(&registry, "no-input-timeout", "5000"), "5000");
        assert!(registry.parse_value("Content-Length", "-1").is_err());
        assert!(registry.parse_value("Content-Length", "+1").is_err());
        assert!(registry.parse_value("N-Best-List-Length", "two").is_err());
        assert!(registry.parse_value("Max-Time", "").is_err());
    }

    #[test]
    fn test_boolean_headers() {
        let registry = HeaderRegistry::standard();
        assert_eq!(round_trip(&registry, "Kill-On-Barge-In", "TRUE"), "true");
        assert_eq!(round_trip(&registry, "save-waveform", "False"), "false");
        assert!(registry.parse_value("Early-No-Match", "yes").is_err());
    }

    #[test]
    fn test_float_headers() {
        let registry = HeaderRegistry::standard();
        assert_eq!(round_trip(&registry, "Confidence-Threshold", "0.50"), "0.5");
        assert_eq!(round_trip(&registry, "Sensitivity-Level", "1.0"), "1");
        assert!(registry.parse_value("Speed-Vs-Accuracy", "NaN").is_err());
        assert!(registry.parse_value("Speed-Vs-Accuracy", "inf").is_err());
        assert!(registry.parse_value("Speed-Vs-Accuracy", "fast").is_err());
    }

    #[test]
    fn test_completion_cause_header() {
        let registry = HeaderRegistry::standard();
        let value = registry.parse_value(COMPLETION_CAUSE, "000 success").unwrap();
        assert_eq!(
            value.as_completion_cause(),
            Some(&CompletionCause::new(0, "success"))
        );
        assert_eq!(round_trip(&registry, COMPLETION_CAUSE, "001   no-match"), "001 no-match");
        assert!(registry.parse_value(COMPLETION_CAUSE, "1 no-match").is_err());
        assert!(registry.parse_value(COMPLETION_CAUSE, "001").is_err());
        assert!(registry.parse_value(COMPLETION_CAUSE, "abc no-match").is_err());
    }

    #[test]
    fn test_request_id_list_header() {
        let registry = HeaderRegistry::standard();
        let value = registry.parse_value(ACTIVE_REQUEST_ID_LIST, "1, 2 ,3").unwrap();
        assert_eq!(value.as_request_id_list(), Some(&[1u64, 2, 3][..]));
        assert_eq!(registry.format_value(ACTIVE_REQUEST_ID_LIST, &value), "1,2,3");
        assert!(registry.parse_value(ACTIVE_REQUEST_ID_LIST, "1,,2").is_err());
    }

    #[test]
    fn test_later_registration_replaces() {
        let mut registry = HeaderRegistry::standard();
        registry.register("content-length", TextFactory);
        assert_eq!(
            registry.parse_value("Content-Length", "abc").unwrap(),
            HeaderValue::Text("abc".into())
        );
    }

    #[test]
    fn test_global_defaults_to_standard() {
        let registry = global();
        assert!(registry.is_registered(CHANNEL_IDENTIFIER));
    }
}
