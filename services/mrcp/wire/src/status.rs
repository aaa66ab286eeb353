//! Response status codes.

use std::fmt;
use std::str::FromStr;

use crate::error::TokenError;

/// Status code class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// 2xx
    Success,
    /// 4xx
    ClientError,
    /// 5xx
    ServerError,
    /// Anything else
    Unknown,
}

/// Response status code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    /// 200
    Success,
    /// 201
    SuccessSomeOptionalHeadersIgnored,
    /// 401
    MethodNotAllowed,
    /// 402
    MethodNotValidInState,
    /// 403
    UnsupportedHeader,
    /// 404
    IllegalValueForHeader,
    /// 405
    ResourceNotAllocated,
    /// 406
    MandatoryHeaderMissing,
    /// 407
    OperationFailed,
    /// 408
    UnrecognizedMessageEntity,
    /// 409
    UnsupportedHeaderValue,
    /// 410
    NonMonotonicSequenceNumber,
    /// 501
    ServerInternalError,
    /// 502
    ProtocolVersionNotSupported,
    /// 503
    ProxyTimeout,
    /// 504
    MessageTooLarge,
    /// Any other three-digit code
    Other(u16),
}

impl StatusCode {
    /// Numeric code
    pub fn code(&self) -> u16 {
        match self {
            StatusCode::Success => 200,
            StatusCode::SuccessSomeOptionalHeadersIgnored => 201,
            StatusCode::MethodNotAllowed => 401,
            StatusCode::MethodNotValidInState => 402,
            StatusCode::UnsupportedHeader => 403,
            StatusCode::IllegalValueForHeader => 404,
            StatusCode::ResourceNotAllocated => 405,
            StatusCode::MandatoryHeaderMissing => 406,
            StatusCode::OperationFailed => 407,
            StatusCode::UnrecognizedMessageEntity => 408,
            StatusCode::UnsupportedHeaderValue => 409,
            StatusCode::NonMonotonicSequenceNumber => 410,
            StatusCode::ServerInternalError => 501,
            StatusCode::ProtocolVersionNotSupported => 502,
            StatusCode::ProxyTimeout => 503,
            StatusCode::MessageTooLarge => 504,
            StatusCode::Other(code) => *code,
        }
    }

    /// Map a numeric code onto the vocabulary
    pub fn from_code(code: u16) -> Self {
        match code {
            200 => StatusCode::Success,
            201 => StatusCode::SuccessSomeOptionalHeadersIgnored,
            401 => StatusCode::MethodNotAllowed,
            402 => StatusCode::MethodNotValidInState,
            403 => StatusCode::UnsupportedHeader,
            404 => StatusCode::IllegalValueForHeader,
            405 => StatusCode::ResourceNotAllocated,
            406 => StatusCode::MandatoryHeaderMissing,
            407 => StatusCode::OperationFailed,
            408 => StatusCode::UnrecognizedMessageEntity,
            409 => StatusCode::UnsupportedHeaderValue,
            410 => StatusCode::NonMonotonicSequenceNumber,
            501 => StatusCode::ServerInternalError,
            502 => StatusCode::ProtocolVersionNotSupported,
            503 => StatusCode::ProxyTimeout,
            504 => StatusCode::MessageTooLarge,
            other => StatusCode::Other(other),
        }
    }

    /// Status class
    pub fn class(&self) -> StatusClass {
        match self.code() {
            200..=299 => StatusClass::Success,
            400..=499 => StatusClass::ClientError,
            500..=599 => StatusClass::ServerError,
            _ => StatusClass::Unknown,
        }
    }

    /// 2xx
    pub fn is_success(&self) -> bool {
        self.class() == StatusClass::Success
    }

    /// Symbolic name, `None` for codes outside the vocabulary
    pub fn description(&self) -> Option<&'static str> {
        Some(match self {
            StatusCode::Success => "STATUS_SUCCESS",
            StatusCode::SuccessSomeOptionalHeadersIgnored => {
                "STATUS_SUCCESS_SOME_OPTIONAL_HEADERS_IGNORED"
            }
            StatusCode::MethodNotAllowed => "STATUS_METHOD_NOT_ALLOWED",
            StatusCode::MethodNotValidInState => "STATUS_METHOD_NOT_VALID_IN_STATE",
            StatusCode::UnsupportedHeader => "STATUS_UNSUPPORTED_HEADER",
            StatusCode::IllegalValueForHeader => "STATUS_ILLEGAL_VALUE_FOR_HEADER",
            StatusCode::ResourceNotAllocated => "STATUS_RESOURCE_NOT_ALLOCATED",
            StatusCode::MandatoryHeaderMissing => "STATUS_MANDATORY_HEADER_MISSING",
            StatusCode::OperationFailed => "STATUS_OPERATION_FAILED",
            StatusCode::UnrecognizedMessageEntity => "STATUS_UNRECOGNIZED_MESSAGE_ENTITY",
            StatusCode::UnsupportedHeaderValue => "STATUS_UNSUPPORTED_HEADER_VALUE",
            StatusCode::NonMonotonicSequenceNumber => "STATUS_NON_MONOTONIC_SEQUENCE_NUMBER",
            StatusCode::ServerInternalError => "STATUS_SERVER_INTERNAL_ERROR",
            StatusCode::ProtocolVersionNotSupported => "STATUS_PROTOCOL_VERSION_NOT_SUPPORTED",
            StatusCode::ProxyTimeout => "STATUS_PROXY_TIMEOUT",
            StatusCode::MessageTooLarge => "STATUS_MESSAGE_TOO_LARGE",
            StatusCode::Other(_) => return None,
        })
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}", self.code())
    }
}

/// Parses the three-digit start-line token
impl FromStr for StatusCode {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim();
        if token.is_empty() {
            return Err(TokenError::Blank);
        }
        if token.len() != 3 || !token.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TokenError::Unknown(token.to_string()));
        }
        token
            .parse::<u16>()
            .map(StatusCode::from_code)
            .map_err(|_| TokenError::Unknown(token.to_string()))
    }
}
