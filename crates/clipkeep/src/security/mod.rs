//! Sensitive-data classification for captured text.
//!
//! Classification runs in two layers:
//!
//! - **Structural rules**: a fixed table of regexes for known credential
//!   formats (vendor API tokens, PEM headers, connection strings, auth
//!   headers, ...), each mapped to a [`ThreatType`] and a confidence.
//!
//! - **Heuristics**: context-aware checks for password-looking words, long
//!   opaque tokens, sensitive environment variables and URLs carrying query
//!   parameters. Source code turns most of these off.
//!
//! The [`ThreatMemory`] remembers content the user has dismissed so it does
//! not raise notifications again.
//!
//! # Example
//!
//! ```
//! use clipkeep::security::{SecurityClassifier, ThreatLevel, ThreatType};
//!
//! let classifier = SecurityClassifier::new();
//!
//! assert!(classifier.classify("Hello world").is_empty());
//!
//! let threats = classifier.classify(&format!("ghp_{}", "a".repeat(36)));
//! assert!(threats.iter().any(|t| t.threat_type == ThreatType::ApiKey));
//! assert_eq!(ThreatLevel::from_threats(&threats), ThreatLevel::High);
//! ```

mod classifier;
mod heuristics;
mod memory;
mod patterns;

use serde::{Deserialize, Serialize};

pub use classifier::SecurityClassifier;
pub use heuristics::Heuristics;
pub use memory::{ThreatMemory, ThreatMemoryStats, ThreatRecord};
pub use patterns::{builtin_rules, ThreatRule};

/// Matches at or below this confidence are discarded.
pub const MIN_CONFIDENCE: f32 = 0.5;

/// Confidence at or above which a threat level is `High`.
pub const HIGH_CONFIDENCE: f32 = 0.9;

/// Confidence at or above which a threat level is `Medium`.
pub const MEDIUM_CONFIDENCE: f32 = 0.7;

/// Confidence a credential must exceed to count as high risk.
pub const HIGH_RISK_CONFIDENCE: f32 = 0.8;

/// The kind of sensitive data detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatType {
    /// A vendor API key.
    ApiKey,
    /// A JSON Web Token.
    Jwt,
    /// An OpenSSH private key.
    SshKey,
    /// A PEM or PGP private key.
    PrivateKey,
    /// A PEM certificate.
    Certificate,
    /// A connection string with embedded credentials.
    DatabaseUrl,
    /// A bearer or basic authorization header.
    AuthHeader,
    /// A generic secret assignment.
    Secret,
    /// A password or password-looking string.
    Password,
    /// A long opaque token.
    Token,
    /// A sensitive environment variable assignment.
    EnvSecret,
    /// A URL carrying several query parameters.
    UnsafeUrl,
    /// A hex digest.
    Hash,
    /// A UUID.
    Uuid,
}

impl ThreatType {
    /// All threat types.
    pub const ALL: [Self; 14] = [
        Self::ApiKey,
        Self::Jwt,
        Self::SshKey,
        Self::PrivateKey,
        Self::Certificate,
        Self::DatabaseUrl,
        Self::AuthHeader,
        Self::Secret,
        Self::Password,
        Self::Token,
        Self::EnvSecret,
        Self::UnsafeUrl,
        Self::Hash,
        Self::Uuid,
    ];

    /// The string stored in the database.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ApiKey => "api_key",
            Self::Jwt => "jwt",
            Self::SshKey => "ssh_key",
            Self::PrivateKey => "private_key",
            Self::Certificate => "certificate",
            Self::DatabaseUrl => "database_url",
            Self::AuthHeader => "auth_header",
            Self::Secret => "secret",
            Self::Password => "password",
            Self::Token => "token",
            Self::EnvSecret => "env_secret",
            Self::UnsafeUrl => "unsafe_url",
            Self::Hash => "hash",
            Self::Uuid => "uuid",
        }
    }

    /// Parse the database representation.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == value)
    }
}

impl std::fmt::Display for ThreatType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ThreatType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unknown threat type: {s}"))
    }
}

/// A single classification finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Threat {
    /// What kind of data was found.
    pub threat_type: ThreatType,
    /// How sure the classifier is, in `[0, 1]`.
    pub confidence: f32,
    /// Human-readable explanation.
    pub reason: String,
}

impl Threat {
    /// Create a new threat.
    #[must_use]
    pub fn new(threat_type: ThreatType, confidence: f32, reason: impl Into<String>) -> Self {
        Self {
            threat_type,
            confidence: confidence.clamp(0.0, 1.0),
            reason: reason.into(),
        }
    }
}

/// Severity stored with each history item.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ThreatLevel {
    /// Nothing detected.
    #[default]
    None,
    /// Detected at low confidence.
    Low,
    /// Detected at medium confidence.
    Medium,
    /// Detected at high confidence.
    High,
}

impl ThreatLevel {
    /// Map a confidence to a level.
    #[must_use]
    pub fn from_confidence(confidence: f32) -> Self {
        if confidence >= HIGH_CONFIDENCE {
            Self::High
        } else if confidence >= MEDIUM_CONFIDENCE {
            Self::Medium
        } else {
            Self::Low
        }
    }

    /// The level for a classification result, from its highest confidence.
    #[must_use]
    pub fn from_threats(threats: &[Threat]) -> Self {
        highest_confidence(threats).map_or(Self::None, |t| Self::from_confidence(t.confidence))
    }

    /// Whether items at this level are considered safe entries.
    #[must_use]
    pub fn is_safe(&self) -> bool {
        matches!(self, Self::None | Self::Low)
    }

    /// The string stored in the database.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    /// Parse the database representation.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "none" => Some(Self::None),
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

impl std::fmt::Display for ThreatLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether any threat is a high-confidence credential.
#[must_use]
pub fn is_high_risk(threats: &[Threat]) -> bool {
    threats.iter().any(|t| {
        t.confidence > HIGH_RISK_CONFIDENCE
            && matches!(
                t.threat_type,
                ThreatType::Jwt | ThreatType::ApiKey | ThreatType::SshKey | ThreatType::PrivateKey
            )
    })
}

/// The threat with the highest confidence; the first one wins ties.
#[must_use]
pub fn highest_confidence(threats: &[Threat]) -> Option<&Threat> {
    threats.iter().fold(None, |best, t| match best {
        Some(b) if b.confidence >= t.confidence => Some(b),
        _ => Some(t),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threat_type_round_trip_names() {
        for t in ThreatType::ALL {
            assert_eq!(ThreatType::parse(t.as_str()), Some(t));
        }
        assert_eq!(ThreatType::parse("nope"), None);
        assert_eq!("api_key".parse::<ThreatType>(), Ok(ThreatType::ApiKey));
    }

    #[test]
    fn test_threat_type_serialize() {
        let json = serde_json::to_string(&ThreatType::DatabaseUrl).unwrap();
        assert_eq!(json, "\"database_url\"");
    }

    #[test]
    fn test_threat_level_from_confidence() {
        assert_eq!(ThreatLevel::from_confidence(0.99), ThreatLevel::High);
        assert_eq!(ThreatLevel::from_confidence(0.9), ThreatLevel::High);
        assert_eq!(ThreatLevel::from_confidence(0.85), ThreatLevel::Medium);
        assert_eq!(ThreatLevel::from_confidence(0.7), ThreatLevel::Medium);
        assert_eq!(ThreatLevel::from_confidence(0.6), ThreatLevel::Low);
    }

    #[test]
    fn test_threat_level_from_threats() {
        assert_eq!(ThreatLevel::from_threats(&[]), ThreatLevel::None);
        let threats = vec![
            Threat::new(ThreatType::Hash, 0.55, "digest"),
            Threat::new(ThreatType::Password, 0.8, "password"),
        ];
        assert_eq!(ThreatLevel::from_threats(&threats), ThreatLevel::Medium);
    }

    #[test]
    fn test_threat_level_ordering() {
        assert!(ThreatLevel::None < ThreatLevel::Low);
        assert!(ThreatLevel::Low < ThreatLevel::Medium);
        assert!(ThreatLevel::Medium < ThreatLevel::High);
    }

    #[test]
    fn test_threat_level_safety() {
        assert!(ThreatLevel::None.is_safe());
        assert!(ThreatLevel::Low.is_safe());
        assert!(!ThreatLevel::Medium.is_safe());
        assert!(!ThreatLevel::High.is_safe());
    }

    #[test]
    fn test_threat_level_parse() {
        for level in [
            ThreatLevel::None,
            ThreatLevel::Low,
            ThreatLevel::Medium,
            ThreatLevel::High,
        ] {
            assert_eq!(ThreatLevel::parse(level.as_str()), Some(level));
        }
        assert_eq!(ThreatLevel::parse("severe"), None);
    }

    #[test]
    fn test_threat_confidence_clamped() {
        assert!((Threat::new(ThreatType::Token, 1.5, "x").confidence - 1.0).abs() < f32::EPSILON);
        assert!(Threat::new(ThreatType::Token, -1.0, "x").confidence.abs() < f32::EPSILON);
    }

    #[test]
    fn test_is_high_risk() {
        assert!(is_high_risk(&[Threat::new(ThreatType::Jwt, 0.95, "jwt")]));
        // Confidence must exceed 0.8.
        assert!(!is_high_risk(&[Threat::new(ThreatType::ApiKey, 0.8, "key")]));
        // Only credential types count.
        assert!(!is_high_risk(&[Threat::new(ThreatType::DatabaseUrl, 0.9, "db")]));
        assert!(!is_high_risk(&[]));
    }

    #[test]
    fn test_highest_confidence_first_wins_ties() {
        let threats = vec![
            Threat::new(ThreatType::Secret, 0.75, "first"),
            Threat::new(ThreatType::Password, 0.8, "second"),
            Threat::new(ThreatType::EnvSecret, 0.8, "third"),
        ];
        assert_eq!(highest_confidence(&threats).unwrap().reason, "second");
        assert!(highest_confidence(&[]).is_none());
    }
}
