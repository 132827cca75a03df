//! Context-aware heuristics that complement the structural rules.

use regex::{Regex, RegexSet};

use super::{Threat, ThreatType};

/// Confidence for a password-looking string.
const PASSWORD_CONFIDENCE: f32 = 0.7;

/// Confidence for a long opaque token in prose.
const TOKEN_CONFIDENCE: f32 = 0.65;

/// Confidence for a long opaque token inside source code.
const CODE_TOKEN_CONFIDENCE: f32 = 0.55;

/// Confidence for a sensitive environment variable assignment.
const ENV_SECRET_CONFIDENCE: f32 = 0.85;

/// Confidence for a URL with several query parameters.
const UNSAFE_URL_CONFIDENCE: f32 = 0.6;

/// Single-word passwords must be this long, in characters.
const PASSWORD_LENGTH: std::ops::RangeInclusive<usize> = 8..=40;

/// Long tokens must be this long, in characters.
const TOKEN_LENGTH: std::ops::RangeInclusive<usize> = 32..=256;

/// Environment variable names treated as sensitive.
const SENSITIVE_ENV_NAMES: &[&str] = &[
    "PASSWORD",
    "PASSWD",
    "PASS",
    "SECRET",
    "SECRET_KEY",
    "API_KEY",
    "APIKEY",
    "ACCESS_KEY",
    "ACCESS_TOKEN",
    "AUTH_TOKEN",
    "TOKEN",
    "PRIVATE_KEY",
    "CLIENT_SECRET",
    "DATABASE_URL",
    "CREDENTIALS",
];

/// Query parameter names that hint at credentials in a URL.
const SUSPICIOUS_PARAMS: &[&str] = &[
    "token",
    "access_token",
    "api_key",
    "apikey",
    "key",
    "secret",
    "password",
    "pass",
    "auth",
    "session",
    "sig",
    "signature",
    "code",
];

/// Character classes present in a word.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct CharClasses {
    upper: bool,
    lower: bool,
    digit: bool,
    symbol: bool,
}

impl CharClasses {
    fn of(word: &str) -> Self {
        let mut classes = Self::default();
        for c in word.chars() {
            if c.is_uppercase() {
                classes.upper = true;
            } else if c.is_lowercase() {
                classes.lower = true;
            } else if c.is_ascii_digit() {
                classes.digit = true;
            } else if !c.is_whitespace() {
                classes.symbol = true;
            }
        }
        classes
    }

    fn count(self) -> usize {
        [self.upper, self.lower, self.digit, self.symbol]
            .into_iter()
            .filter(|present| *present)
            .count()
    }
}

/// Compiled heuristic checks.
#[derive(Debug)]
pub struct Heuristics {
    code_indicators: RegexSet,
    benign_shapes: RegexSet,
    bare_url: Regex,
    url: Regex,
    env_assignment: Regex,
}

impl Heuristics {
    /// Compile the heuristics.
    ///
    /// # Panics
    ///
    /// Panics if a built-in regex is invalid.
    #[must_use]
    pub fn new() -> Self {
        Self {
            code_indicators: RegexSet::new([
                r"(?m)^\s*(?:fn|function|const|let|var|class|struct|impl|mod|use|import|export|def|async|pub|public|private|static|interface|enum|trait|return|package|#include|#define)\b",
                r"(?m)(?:^|\s)//",
                r"/\*|\*/",
                r"(?m)^\s*#\s",
                r"\)\s*\{",
                r"(?m)[{;]\s*$",
                r"->|=>",
                r"\w::\w",
                r"#!?\[",
                r"\w\(\)",
                r"[!=]==?|&&|\|\|",
                r"</?[a-z][a-z0-9]*(?:\s[^>]*)?>",
            ])
            .expect("Invalid code indicator regex"),
            benign_shapes: RegexSet::new([
                // URLs
                r"^[A-Za-z][A-Za-z0-9+.-]*://\S+$",
                r"^www\.\S+$",
                // File paths
                r"^(?:~|\.{1,2})?/\S*$",
                r"^[A-Za-z]:\\\S*$",
                // Hex digests
                r"^(?:0x)?[0-9A-Fa-f]{16,}$",
                // Dotted versions and package names
                r"^v?\d+(?:\.\d+)+(?:[-+][0-9A-Za-z.-]+)?$",
                r"^@?[A-Za-z_][\w-]*(?:[./][A-Za-z_][\w-]*)+(?:@[\w.^~-]+)?$",
                // UUIDs
                r"^[0-9A-Fa-f]{8}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{12}$",
            ])
            .expect("Invalid benign shape regex"),
            bare_url: Regex::new(r"^[A-Za-z][A-Za-z0-9+.-]*://[^\s?]+$")
                .expect("Invalid URL regex"),
            url: Regex::new(r"[A-Za-z][A-Za-z0-9+.-]*://\S+").expect("Invalid URL regex"),
            env_assignment: Regex::new(r"(?m)(?:^|\s)(?:export\s+)?([A-Z][A-Z0-9_]*)=\S")
                .expect("Invalid env assignment regex"),
        }
    }

    /// Count the distinct code indicators present.
    #[must_use]
    pub fn code_indicator_count(&self, content: &str) -> usize {
        self.code_indicators.matches(content).iter().count()
    }

    /// Whether the content looks like source code.
    ///
    /// Two indicators are enough; a single one also needs multi-line content
    /// or more than 100 bytes.
    #[must_use]
    pub fn is_source_code(&self, content: &str) -> bool {
        match self.code_indicator_count(content) {
            0 => false,
            1 => content.contains('\n') || content.len() > 100,
            _ => true,
        }
    }

    /// Whether a single word has a shape that is never a password.
    #[must_use]
    pub fn is_benign_word(&self, word: &str) -> bool {
        self.benign_shapes.is_match(word)
    }

    /// Flag content that looks like a password.
    #[must_use]
    pub fn password_like(&self, content: &str) -> Option<Threat> {
        let content = content.trim();
        if self.bare_url.is_match(content) {
            return None;
        }

        let words: Vec<&str> = content.split_whitespace().collect();
        match words.as_slice() {
            [] => None,
            [word] => {
                if self.is_benign_word(word) {
                    return None;
                }
                let classes = CharClasses::of(word).count();
                let len = word.chars().count();
                (classes >= 3 && PASSWORD_LENGTH.contains(&len)).then(|| {
                    Threat::new(
                        ThreatType::Password,
                        PASSWORD_CONFIDENCE,
                        format!("Password-like string mixing {classes} character classes"),
                    )
                })
            }
            words => words
                .iter()
                .find(|word| !self.is_benign_word(word) && CharClasses::of(word).count() == 4)
                .map(|_| {
                    Threat::new(
                        ThreatType::Password,
                        PASSWORD_CONFIDENCE,
                        "Password-like word mixing all character classes",
                    )
                }),
        }
    }

    /// Flag a single long opaque token.
    #[must_use]
    pub fn long_token(&self, content: &str, in_code: bool) -> Option<Threat> {
        let word = content.trim();
        if word.is_empty() || word.chars().any(char::is_whitespace) {
            return None;
        }

        let len = word.chars().count();
        if !TOKEN_LENGTH.contains(&len) {
            return None;
        }

        let mut alnum = 0usize;
        for c in word.chars() {
            if c.is_ascii_alphanumeric() {
                alnum += 1;
            } else if !matches!(c, '_' | '-' | '.') {
                return None;
            }
        }

        // alnum / len >= 0.9
        if alnum * 10 < len * 9 {
            return None;
        }

        let confidence = if in_code {
            CODE_TOKEN_CONFIDENCE
        } else {
            TOKEN_CONFIDENCE
        };
        Some(Threat::new(
            ThreatType::Token,
            confidence,
            format!("Long opaque token ({len} characters)"),
        ))
    }

    /// Flag assignments to sensitive environment variables.
    #[must_use]
    pub fn sensitive_env_var(&self, content: &str) -> Option<Threat> {
        self.env_assignment
            .captures_iter(content)
            .filter_map(|caps| caps.get(1))
            .map(|name| name.as_str())
            .find(|name| is_sensitive_env_name(name))
            .map(|name| {
                Threat::new(
                    ThreatType::EnvSecret,
                    ENV_SECRET_CONFIDENCE,
                    format!("Sensitive environment variable {name}"),
                )
            })
    }

    /// Flag URLs that carry two or more query parameters.
    #[must_use]
    pub fn unsafe_url(&self, content: &str) -> Option<Threat> {
        let url = self
            .url
            .find_iter(content)
            .map(|m| m.as_str())
            .find(|url| url.contains('?') && url.contains('&'))?;

        let suspicious: Vec<&str> = query_param_names(url)
            .filter(|name| {
                SUSPICIOUS_PARAMS
                    .iter()
                    .any(|s| name.eq_ignore_ascii_case(s))
            })
            .collect();

        let reason = if suspicious.is_empty() {
            "URL with multiple query parameters".to_string()
        } else {
            format!(
                "URL with multiple query parameters including {}",
                suspicious.join(", ")
            )
        };
        Some(Threat::new(
            ThreatType::UnsafeUrl,
            UNSAFE_URL_CONFIDENCE,
            reason,
        ))
    }
}

impl Default for Heuristics {
    fn default() -> Self {
        Self::new()
    }
}

fn is_sensitive_env_name(name: &str) -> bool {
    SENSITIVE_ENV_NAMES.iter().any(|sensitive| {
        name == *sensitive
            || name
                .strip_suffix(sensitive)
                .is_some_and(|prefix| prefix.ends_with('_'))
    })
}

fn query_param_names(url: &str) -> impl Iterator<Item = &str> {
    url.split_once('?')
        .map(|(_, query)| query.split('#').next().unwrap_or_default())
        .unwrap_or_default()
        .split('&')
        .filter_map(|pair| pair.split('=').next())
        .filter(|name| !name.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heuristics() -> Heuristics {
        Heuristics::new()
    }

    #[test]
    fn test_char_classes() {
        assert_eq!(CharClasses::of("abc").count(), 1);
        assert_eq!(CharClasses::of("aB3").count(), 3);
        assert_eq!(CharClasses::of("aB3!").count(), 4);
    }

    #[test]
    fn test_password_single_word() {
        let h = heuristics();
        assert!(h.password_like("Tr0ub4dor").is_some());
        assert!(h.password_like("hunter2!x").is_some());
        // Too short.
        assert!(h.password_like("aB3!").is_none());
        // Only two classes.
        assert!(h.password_like("alllowercase123").is_none());
    }

    #[test]
    fn test_password_multi_word() {
        let h = heuristics();
        assert!(h.password_like("Hello world").is_none());
        assert!(h.password_like("my login is P4ss!word today").is_some());
        // Three classes is not enough with several words.
        assert!(h.password_like("Meet at Room42 please").is_none());
    }

    #[test]
    fn test_password_skips_benign_shapes() {
        let h = heuristics();
        assert!(h.password_like("https://Example.com/Path_1").is_none());
        assert!(h.password_like("/home/User/file_1.txt").is_none());
        assert!(h.password_like("v1.2.3-Beta4").is_none());
        assert!(h.password_like("com.Example.App_2").is_none());
        assert!(h.password_like("550E8400-e29b-41d4-a716-446655440000").is_none());
    }

    #[test]
    fn test_source_code_detection() {
        let h = heuristics();
        assert!(h.is_source_code("fn main() {\n    println!(\"hi\");\n}"));
        assert!(h.is_source_code("if (a === b && c) { run(); }"));
        assert!(!h.is_source_code("Hello world"));
        assert!(!h.is_source_code("see https://example.com for details"));
    }

    #[test]
    fn test_single_indicator_needs_context() {
        let h = heuristics();
        assert_eq!(h.code_indicator_count("a -> b"), 1);
        assert!(!h.is_source_code("a -> b"));
        assert!(h.is_source_code("a -> b\nand then c"));
    }

    #[test]
    fn test_long_token() {
        let h = heuristics();
        let token = "a1b2c3d4e5f6g7h8i9j0k1l2m3n4o5p6q7";
        let threat = h.long_token(token, false).unwrap();
        assert_eq!(threat.threat_type, ThreatType::Token);
        assert!((threat.confidence - TOKEN_CONFIDENCE).abs() < f32::EPSILON);

        let threat = h.long_token(token, true).unwrap();
        assert!((threat.confidence - CODE_TOKEN_CONFIDENCE).abs() < f32::EPSILON);
    }

    #[test]
    fn test_long_token_rejects() {
        let h = heuristics();
        // Too short.
        assert!(h.long_token("abc123", false).is_none());
        // Contains whitespace.
        assert!(h.long_token(&format!("{} {}", "a".repeat(20), "b".repeat(20)), false).is_none());
        // Disallowed symbol.
        assert!(h.long_token(&format!("{}/{}", "a".repeat(20), "b".repeat(20)), false).is_none());
        // Too many separators.
        assert!(h.long_token(&"ab-".repeat(12), false).is_none());
    }

    #[test]
    fn test_sensitive_env_var() {
        let h = heuristics();
        assert!(h.sensitive_env_var("export API_KEY=abc").is_some());
        assert!(h.sensitive_env_var("GITHUB_TOKEN=xyz").is_some());
        assert!(h.sensitive_env_var("HOME=/root\nDB_PASSWORD=secret").is_some());
        assert!(h.sensitive_env_var("PATH=/usr/bin").is_none());
        assert!(h.sensitive_env_var("TOKENIZER=fast").is_none());
    }

    #[test]
    fn test_unsafe_url() {
        let h = heuristics();
        let threat = h
            .unsafe_url("https://example.com/cb?code=abc&state=xyz")
            .unwrap();
        assert_eq!(threat.threat_type, ThreatType::UnsafeUrl);
        assert!(threat.reason.contains("code"));

        let threat = h.unsafe_url("https://example.com/?a=1&b=2").unwrap();
        assert!(!threat.reason.contains("including"));

        assert!(h.unsafe_url("https://example.com/?a=1").is_none());
        assert!(h.unsafe_url("no url here & there?").is_none());
    }

    #[test]
    fn test_query_param_names() {
        let names: Vec<_> = query_param_names("https://x.io/p?a=1&token=2&=3#frag").collect();
        assert_eq!(names, vec!["a", "token"]);
    }
}
