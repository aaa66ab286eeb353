//! Start-line vocabularies: method names, event names and request states.
//!
//! Methods and events are open vocabularies: any token outside the fixed
//! MRCPv2 set is carried verbatim in an `Other` variant. Parsing is
//! case-insensitive and rejects blank input with [`TokenError::Blank`]
//! instead of defaulting to `Other`.

use crate::error::TokenError;
use crate::resource::ResourceFamily;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Request method token
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MethodName {
    /// SET-PARAMS (all resources)
    SetParams,
    /// GET-PARAMS (all resources)
    GetParams,
    /// SPEAK
    Speak,
    /// STOP
    Stop,
    /// PAUSE
    Pause,
    /// RESUME
    Resume,
    /// BARGE-IN-OCCURRED
    BargeInOccurred,
    /// CONTROL
    Control,
    /// DEFINE-LEXICON
    DefineLexicon,
    /// DEFINE-GRAMMAR
    DefineGrammar,
    /// RECOGNIZE
    Recognize,
    /// INTERPRET
    Interpret,
    /// GET-RESULT
    GetResult,
    /// START-INPUT-TIMERS
    StartInputTimers,
    /// START-PHRASE-ENROLLMENT
    StartPhraseEnrollment,
    /// ENROLLMENT-ROLLBACK
    EnrollmentRollback,
    /// END-PHRASE-ENROLLMENT
    EndPhraseEnrollment,
    /// MODIFY-PHRASE
    ModifyPhrase,
    /// DELETE-PHRASE
    DeletePhrase,
    /// RECORD
    Record,
    /// START-SESSION
    StartSession,
    /// END-SESSION
    EndSession,
    /// QUERY-VOICEPRINT
    QueryVoiceprint,
    /// DELETE-VOICEPRINT
    DeleteVoiceprint,
    /// VERIFY
    Verify,
    /// VERIFY-FROM-BUFFER
    VerifyFromBuffer,
    /// VERIFY-ROLLBACK
    VerifyRollback,
    /// CLEAR-BUFFER
    ClearBuffer,
    /// GET-INTERMEDIATE-RESULT
    GetIntermediateResult,
    /// Extension method, carried verbatim
    Other(String),
}

impl MethodName {
    /// Every method of the fixed vocabulary
    pub const KNOWN: [MethodName; 29] = [
        MethodName::SetParams,
        MethodName::GetParams,
        MethodName::Speak,
        MethodName::Stop,
        MethodName::Pause,
        MethodName::Resume,
        MethodName::BargeInOccurred,
        MethodName::Control,
        MethodName::DefineLexicon,
        MethodName::DefineGrammar,
        MethodName::Recognize,
        MethodName::Interpret,
        MethodName::GetResult,
        MethodName::StartInputTimers,
        MethodName::StartPhraseEnrollment,
        MethodName::EnrollmentRollback,
        MethodName::EndPhraseEnrollment,
        MethodName::ModifyPhrase,
        MethodName::DeletePhrase,
        MethodName::Record,
        MethodName::StartSession,
        MethodName::EndSession,
        MethodName::QueryVoiceprint,
        MethodName::DeleteVoiceprint,
        MethodName::Verify,
        MethodName::VerifyFromBuffer,
        MethodName::VerifyRollback,
        MethodName::ClearBuffer,
        MethodName::GetIntermediateResult,
    ];

    /// Wire token
    pub fn as_str(&self) -> &str {
        match self {
            MethodName::SetParams => "SET-PARAMS",
            MethodName::GetParams => "GET-PARAMS",
            MethodName::Speak => "SPEAK",
            MethodName::Stop => "STOP",
            MethodName::Pause => "PAUSE",
            MethodName::Resume => "RESUME",
            MethodName::BargeInOccurred => "BARGE-IN-OCCURRED",
            MethodName::Control => "CONTROL",
            MethodName::DefineLexicon => "DEFINE-LEXICON",
            MethodName::DefineGrammar => "DEFINE-GRAMMAR",
            MethodName::Recognize => "RECOGNIZE",
            MethodName::Interpret => "INTERPRET",
            MethodName::GetResult => "GET-RESULT",
            MethodName::StartInputTimers => "START-INPUT-TIMERS",
            MethodName::StartPhraseEnrollment => "START-PHRASE-ENROLLMENT",
            MethodName::EnrollmentRollback => "ENROLLMENT-ROLLBACK",
            MethodName::EndPhraseEnrollment => "END-PHRASE-ENROLLMENT",
            MethodName::ModifyPhrase => "MODIFY-PHRASE",
            MethodName::DeletePhrase => "DELETE-PHRASE",
            MethodName::Record => "RECORD",
            MethodName::StartSession => "START-SESSION",
            MethodName::EndSession => "END-SESSION",
            MethodName::QueryVoiceprint => "QUERY-VOICEPRINT",
            MethodName::DeleteVoiceprint => "DELETE-VOICEPRINT",
            MethodName::Verify => "VERIFY",
            MethodName::VerifyFromBuffer => "VERIFY-FROM-BUFFER",
            MethodName::VerifyRollback => "VERIFY-ROLLBACK",
            MethodName::ClearBuffer => "CLEAR-BUFFER",
            MethodName::GetIntermediateResult => "GET-INTERMEDIATE-RESULT",
            MethodName::Other(name) => name,
        }
    }

    /// Whether a request with this method may allocate a channel the session
    /// has not seen yet
    pub fn is_registration_capable(&self) -> bool {
        matches!(
            self,
            MethodName::SetParams
                | MethodName::GetParams
                | MethodName::Speak
                | MethodName::DefineLexicon
                | MethodName::DefineGrammar
                | MethodName::Recognize
                | MethodName::Interpret
                | MethodName::Record
                | MethodName::StartSession
                | MethodName::StartPhraseEnrollment
        )
    }

    /// Whether the method belongs to the vocabulary of a resource family
    pub fn is_applicable_to(&self, family: ResourceFamily) -> bool {
        use MethodName::*;
        match self {
            SetParams | GetParams | Stop => true,
            Speak | Pause | Resume | BargeInOccurred | Control | DefineLexicon => {
                family == ResourceFamily::Synthesizer
            }
            DefineGrammar | Recognize | Interpret | GetResult | StartPhraseEnrollment
            | EnrollmentRollback | EndPhraseEnrollment | ModifyPhrase | DeletePhrase => {
                family == ResourceFamily::Recognizer
            }
            StartInputTimers => family != ResourceFamily::Synthesizer,
            Record => family == ResourceFamily::Recorder,
            StartSession | EndSession | QueryVoiceprint | DeleteVoiceprint | Verify
            | VerifyFromBuffer | VerifyRollback | ClearBuffer | GetIntermediateResult => {
                family == ResourceFamily::Verifier
            }
            Other(_) => false,
        }
    }
}

impl fmt::Display for MethodName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MethodName {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim();
        if token.is_empty() {
            return Err(TokenError::Blank);
        }
        Ok(MethodName::KNOWN
            .iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(token))
            .cloned()
            .unwrap_or_else(|| MethodName::Other(token.to_string())))
    }
}

/// Event name token
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventName {
    /// SPEECH-MARKER
    SpeechMarker,
    /// SPEAK-COMPLETE
    SpeakComplete,
    /// START-OF-INPUT
    StartOfInput,
    /// RECOGNITION-COMPLETE
    RecognitionComplete,
    /// INTERPRETATION-COMPLETE
    InterpretationComplete,
    /// RECORD-COMPLETE
    RecordComplete,
    /// VERIFICATION-COMPLETE
    VerificationComplete,
    /// Extension event, carried verbatim
    Other(String),
}

impl EventName {
    /// Every event of the fixed vocabulary
    pub const KNOWN: [EventName; 7] = [
        EventName::SpeechMarker,
        EventName::SpeakComplete,
        EventName::StartOfInput,
        EventName::RecognitionComplete,
        EventName::InterpretationComplete,
        EventName::RecordComplete,
        EventName::VerificationComplete,
    ];

    /// Wire token
    pub fn as_str(&self) -> &str {
        match self {
            EventName::SpeechMarker => "SPEECH-MARKER",
            EventName::SpeakComplete => "SPEAK-COMPLETE",
            EventName::StartOfInput => "START-OF-INPUT",
            EventName::RecognitionComplete => "RECOGNITION-COMPLETE",
            EventName::InterpretationComplete => "INTERPRETATION-COMPLETE",
            EventName::RecordComplete => "RECORD-COMPLETE",
            EventName::VerificationComplete => "VERIFICATION-COMPLETE",
            EventName::Other(name) => name,
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventName {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim();
        if token.is_empty() {
            return Err(TokenError::Blank);
        }
        Ok(EventName::KNOWN
            .iter()
            .find(|e| e.as_str().eq_ignore_ascii_case(token))
            .cloned()
            .unwrap_or_else(|| EventName::Other(token.to_string())))
    }
}

/// Completion state of a request.
///
/// Ordered: `Pending < InProgress < Complete`. `Complete` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RequestState {
    /// PENDING
    #[serde(rename = "PENDING")]
    Pending,
    /// IN-PROGRESS
    #[serde(rename = "IN-PROGRESS")]
    InProgress,
    /// COMPLETE
    #[serde(rename = "COMPLETE")]
    Complete,
}

impl RequestState {
    /// Wire token
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestState::Pending => "PENDING",
            RequestState::InProgress => "IN-PROGRESS",
            RequestState::Complete => "COMPLETE",
        }
    }

    /// No further message is expected after this state
    pub fn is_terminal(&self) -> bool {
        *self == RequestState::Complete
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestState {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim();
        if token.is_empty() {
            return Err(TokenError::Blank);
        }
        [
            RequestState::Pending,
            RequestState::InProgress,
            RequestState::Complete,
        ]
        .into_iter()
        .find(|state| state.as_str().eq_ignore_ascii_case(token))
        .ok_or_else(|| TokenError::Unknown(token.to_string()))
    }
}
