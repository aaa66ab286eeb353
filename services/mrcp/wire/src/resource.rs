//! Resource types and channel identifiers.

use crate::error::{IllegalValue, TokenError};
use crate::header::CHANNEL_IDENTIFIER;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Media resource type addressed by a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    /// speechrecog
    SpeechRecog,
    /// dtmfrecog
    DtmfRecog,
    /// speechsynth
    SpeechSynth,
    /// basicsynth
    BasicSynth,
    /// speakverify
    SpeakVerify,
    /// recorder
    Recorder,
}

/// Group of resource types sharing one method vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceFamily {
    /// speechrecog, dtmfrecog
    Recognizer,
    /// speechsynth, basicsynth
    Synthesizer,
    /// recorder
    Recorder,
    /// speakverify
    Verifier,
}

impl ResourceType {
    /// All resource types
    pub const ALL: [ResourceType; 6] = [
        ResourceType::SpeechRecog,
        ResourceType::DtmfRecog,
        ResourceType::SpeechSynth,
        ResourceType::BasicSynth,
        ResourceType::SpeakVerify,
        ResourceType::Recorder,
    ];

    /// Canonical (lowercase) wire token
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::SpeechRecog => "speechrecog",
            ResourceType::DtmfRecog => "dtmfrecog",
            ResourceType::SpeechSynth => "speechsynth",
            ResourceType::BasicSynth => "basicsynth",
            ResourceType::SpeakVerify => "speakverify",
            ResourceType::Recorder => "recorder",
        }
    }

    /// Method vocabulary family
    pub fn family(&self) -> ResourceFamily {
        match self {
            ResourceType::SpeechRecog | ResourceType::DtmfRecog => ResourceFamily::Recognizer,
            ResourceType::SpeechSynth | ResourceType::BasicSynth => ResourceFamily::Synthesizer,
            ResourceType::SpeakVerify => ResourceFamily::Verifier,
            ResourceType::Recorder => ResourceFamily::Recorder,
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim();
        if token.is_empty() {
            return Err(TokenError::Blank);
        }
        ResourceType::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(token))
            .ok_or_else(|| TokenError::Unknown(token.to_string()))
    }
}

/// `<channel-id>@<resource-type>`
///
/// The channel id is stored trimmed, so derived equality and hashing agree
/// with the canonical wire form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelIdentifier {
    channel_id: String,
    resource_type: ResourceType,
}

impl ChannelIdentifier {
    /// Create a channel identifier, rejecting a blank channel id
    pub fn new(channel_id: impl AsRef<str>, resource_type: ResourceType) -> Result<Self, IllegalValue> {
        let raw = channel_id.as_ref();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(IllegalValue::new(
                CHANNEL_IDENTIFIER,
                format!("{}@{}", raw, resource_type),
                "blank channel id",
            ));
        }
        if trimmed.contains('@') || trimmed.chars().any(char::is_whitespace) {
            return Err(IllegalValue::new(
                CHANNEL_IDENTIFIER,
                format!("{}@{}", raw, resource_type),
                "channel id is not a single token",
            ));
        }
        Ok(Self {
            channel_id: trimmed.to_string(),
            resource_type,
        })
    }

    /// Channel id part
    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    /// Resource type part
    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }
}

impl fmt::Display for ChannelIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.channel_id, self.resource_type)
    }
}

impl FromStr for ChannelIdentifier {
    type Err = IllegalValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim();
        let mut parts = value.split('@');
        let (channel_id, resource) = match (parts.next(), parts.next(), parts.next()) {
            (Some(id), Some(resource), None) => (id, resource),
            _ => {
                return Err(IllegalValue::new(
                    CHANNEL_IDENTIFIER,
                    s,
                    "expected exactly one '@' separator",
                ))
            }
        };

        let resource_type = resource
            .parse::<ResourceType>()
            .map_err(|e| IllegalValue::new(CHANNEL_IDENTIFIER, s, e.to_string()))?;

        ChannelIdentifier::new(channel_id, resource_type)
            .map_err(|e| IllegalValue::new(CHANNEL_IDENTIFIER, s, e.reason))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_resource_type_tokens() {
        assert_eq!(ResourceType::SpeechRecog.to_string(), "speechrecog");
        assert_eq!("SPEAKVERIFY".parse::<ResourceType>().unwrap(), ResourceType::SpeakVerify);
        assert_eq!("BasicSynth".parse::<ResourceType>().unwrap(), ResourceType::BasicSynth);
        assert!("fax".parse::<ResourceType>().is_err());
        assert_eq!("".parse::<ResourceType>(), Err(TokenError::Blank));
    }

    #[test]
    fn test_resource_families() {
        assert_eq!(ResourceType::DtmfRecog.family(), ResourceFamily::Recognizer);
        assert_eq!(ResourceType::BasicSynth.family(), ResourceFamily::Synthesizer);
        assert_eq!(ResourceType::SpeakVerify.family(), ResourceFamily::Verifier);
        assert_eq!(ResourceType::Recorder.family(), ResourceFamily::Recorder);
    }

    #[test]
    fn test_channel_identifier_parse() {
        let id: ChannelIdentifier = "12345@speechrecog".parse().unwrap();
        assert_eq!(id.channel_id(), "12345");
        assert_eq!(id.resource_type(), ResourceType::SpeechRecog);
        assert_eq!(id.to_string(), "12345@speechrecog");

        let upper: ChannelIdentifier = "12345@SPEECHRECOG".parse().unwrap();
        assert_eq!(upper, id);
        assert_eq!(upper.to_string(), "12345@speechrecog");
    }

    #[test]
    fn test_channel_identifier_whitespace() {
        let id: ChannelIdentifier = "  test123@dtmfrecog  ".parse().unwrap();
        assert_eq!(id.channel_id(), "test123");
        assert_eq!(id.resource_type(), ResourceType::DtmfRecog);

        let built = ChannelIdentifier::new("  12345  ", ResourceType::SpeechRecog).unwrap();
        assert_eq!(built.to_string(), "12345@speechrecog");
    }

    #[test]
    fn test_channel_identifier_invalid() {
        for bad in ["12345speechrecog", "a@b@c", "", "@speechrecog", "   @speechrecog", "12345@fax"] {
            let err = bad.parse::<ChannelIdentifier>().unwrap_err();
            assert_eq!(err.name, CHANNEL_IDENTIFIER);
            assert_eq!(err.value, bad);
        }
        assert!(ChannelIdentifier::new("", ResourceType::Recorder).is_err());
        assert!(ChannelIdentifier::new("a b", ResourceType::Recorder).is_err());
    }

    #[test]
    fn test_channel_identifier_equality() {
        let a = ChannelIdentifier::new("1", ResourceType::SpeechSynth).unwrap();
        let b: ChannelIdentifier = "1@speechsynth".parse().unwrap();
        let c = ChannelIdentifier::new("2", ResourceType::SpeechSynth).unwrap();
        let d = ChannelIdentifier::new("1", ResourceType::BasicSynth).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);

        let set: HashSet<_> = [a, b, c, d].into_iter().collect();
        assert_eq!(set.len(), 3);
    }
}
