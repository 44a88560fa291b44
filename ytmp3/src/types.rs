use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Extension of every artifact the service produces.
pub const AUDIO_EXTENSION: &str = "mp3";

/// Title reported when the source does not provide one.
pub const UNKNOWN_TITLE: &str = "Unknown Title";

/// Target MP3 bitrate in kbps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Quality {
    Kbps128,
    #[default]
    Kbps192,
    Kbps320,
}

impl Quality {
    pub fn kbps(self) -> u32 {
        match self {
            Quality::Kbps128 => 128,
            Quality::Kbps192 => 192,
            Quality::Kbps320 => 320,
        }
    }

    /// Parse a JSON value as sent by clients: `"192"` or `192`. Values are
    /// matched exactly; padded strings such as `" 192 "` are rejected.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, Error> {
        match value {
            serde_json::Value::String(s) => s.parse(),
            serde_json::Value::Number(n) => n.to_string().parse(),
            other => Err(Error::InvalidQuality(other.to_string())),
        }
    }
}

impl FromStr for Quality {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "128" => Ok(Quality::Kbps128),
            "192" => Ok(Quality::Kbps192),
            "320" => Ok(Quality::Kbps320),
            other => Err(Error::InvalidQuality(other.to_string())),
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kbps())
    }
}

/// A finished conversion: the stored artifact plus display metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertedAudio {
    /// Generated `<uuid>.mp3` name of the stored artifact.
    pub filename: String,
    pub title: String,
    pub thumbnail: Option<String>,
    /// Source duration in seconds.
    pub duration: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_default_is_192() {
        assert_eq!(Quality::default(), Quality::Kbps192);
        assert_eq!(Quality::default().kbps(), 192);
    }

    #[test]
    fn test_quality_parse_accepted_values() {
        assert_eq!("128".parse::<Quality>().unwrap(), Quality::Kbps128);
        assert_eq!("192".parse::<Quality>().unwrap(), Quality::Kbps192);
        assert_eq!("320".parse::<Quality>().unwrap(), Quality::Kbps320);
    }

    #[test]
    fn test_quality_parse_rejects_others() {
        for bad in ["999", "0", "", "256", "192k", "high", "-128", " 192 ", "192\n", "\t320"] {
            let err = bad.parse::<Quality>().unwrap_err();
            assert!(matches!(err, Error::InvalidQuality(_)), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_quality_from_json() {
        assert_eq!(
            Quality::from_json(&serde_json::json!("320")).unwrap(),
            Quality::Kbps320
        );
        assert_eq!(
            Quality::from_json(&serde_json::json!(128)).unwrap(),
            Quality::Kbps128
        );
        assert!(Quality::from_json(&serde_json::json!(192.5)).is_err());
        assert!(Quality::from_json(&serde_json::json!(null)).is_err());
        assert!(Quality::from_json(&serde_json::json!(["192"])).is_err());
        assert!(Quality::from_json(&serde_json::json!(" 192 ")).is_err());
    }
}
