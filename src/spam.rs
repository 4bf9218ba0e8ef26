//! # Spam and Broadcast-Noise Filtering
//!
//! Rejects transcripts that are recognizable broadcast filler rather than
//! genuine caller speech: subscription requests, video sign-offs, channel
//! self-identification, notification prompts. Speech recognition models
//! hallucinate these phrases on silence and background TV audio, so the
//! filter sits between transcription and translation, and runs again on the
//! translated text with a smaller display-language pattern set to catch
//! phrases that only become visible after translation.
//!
//! The rule lists are data, not code: [`SpamRules`] deserializes from TOML,
//! so deployments can extend the lists without rebuilding. The built-in
//! defaults cover English, Japanese, Korean, and Arabic plus a set of known
//! broadcaster names.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::error::{RelayError, RelayResult};

/// Loadable spam classification rules.
///
/// `exact_phrases` are matched against the whole lowercased, trimmed
/// transcript. `transcript_patterns` are regexes applied to the same
/// normalized transcript. `translation_patterns` apply to the translated
/// (display-language) text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpamRules {
    #[serde(default)]
    pub exact_phrases: Vec<String>,
    #[serde(default)]
    pub transcript_patterns: Vec<String>,
    #[serde(default)]
    pub translation_patterns: Vec<String>,
}

impl Default for SpamRules {
    fn default() -> Self {
        Self {
            exact_phrases: [
                "thank you for watching",
                "thanks for watching",
                "please subscribe",
                "subscribe to my channel",
                "like and subscribe",
                "don't forget to subscribe",
                "hit the bell icon",
                "smash that like button",
                "see you in the next video",
                "see you next time",
                "catch you in the next one",
                "until next time",
                "see you soon",
                "thanks for tuning in",
                "stay tuned",
                "coming up next",
                "i am from mbc",
                "i'm from mbc",
                "this is mbc",
                "you're watching",
                "you are watching",
                "welcome back",
                "coming up",
                "mbc",
                "mbc1",
                "mbc2",
                "mbc3",
                "mbc4",
                "al arabiya",
                "alarabiya",
                "aljazeera",
                "al jazeera",
                "bbc arabic",
                "france 24",
                "dw arabic",
                "rt arabic",
                "sputnik",
                "cnbc arabia",
                "sky news arabia",
                "alhurra",
                "al hurra",
                "dubai tv",
                "abu dhabi tv",
                "saudi tv",
                "lbc",
                "mtv lebanon",
                "al mayadeen",
                "alhayat",
                "al hayat",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            transcript_patterns: [
                // Subscription requests
                r"please\s+subscribe",
                r"subscribe\s+(to|on|in)",
                r"don'?t\s+forget\s+to\s+subscribe",
                r"make\s+sure\s+to\s+subscribe",
                r"remember\s+to\s+subscribe",
                r"hit\s+(the\s+)?bell",
                r"smash\s+(that\s+)?like",
                r"like\s+and\s+subscribe",
                r"subscribe\s+and\s+like",
                // Sign-offs
                r"thank\s+you\s+(for\s+watching|so\s+much)",
                r"thanks\s+(for\s+watching|guys)",
                r"see\s+you\s+(next|in\s+the\s+next|later|soon|tomorrow)",
                r"catch\s+you\s+(next|later)",
                r"until\s+next\s+time",
                r"stay\s+tuned",
                r"coming\s+up\s+(next|after)",
                r"watch\s+(this\s+)?next",
                r"check\s+out\s+(this|my)",
                // Links and comments
                r"link\s+in\s+(the\s+)?description",
                r"comment\s+below",
                r"let\s+me\s+know\s+in\s+(the\s+)?comment",
                // Broadcast self-identification
                r"(i\s+am|i'm|this\s+is)\s+(from\s+)?mbc",
                r"mbc\s+(presents|news)",
                r"^mbc\d*$",
                r"breaking\s+news",
                r"stay\s+with\s+us",
                r"you'?re\s+watching",
                r"welcome\s+(back|to)",
                // Japanese
                r"チャンネル登録",
                r"お願い.*します",
                r"ご視聴.*ありがとう",
                r"高評価",
                r"コメント.*ください",
                // Korean
                r"구독",
                r"좋아요",
                r"감사합니다",
                // Arabic
                r"اشترك",
                r"لا تنسى الاشتراك",
                // General
                r"enjoy\s+your\s+meal",
                r"share\s+this\s+video",
                r"turn\s+on\s+notifications",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            translation_patterns: [
                r"يرجى\s+الاشتراك",
                r"اشترك\s+في\s+القناة",
                r"شكر.*لمشاهدة",
                r"شكر.*لك.*مشاهد",
                r"لا\s+تنسى\s+الاشتراك",
                r"اضغط.*الجرس",
                r"ضع.*لايك",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl SpamRules {
    /// Load rules from a TOML file, replacing the defaults entirely.
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> RelayResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            RelayError::Config(format!(
                "cannot read spam rules file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        toml::from_str(&raw)
            .map_err(|e| RelayError::Config(format!("invalid spam rules file: {}", e)))
    }
}

/// Compiled spam classifier.
pub struct SpamFilter {
    exact: HashSet<String>,
    transcript: Vec<Regex>,
    translation: Vec<Regex>,
}

impl SpamFilter {
    /// Compile a rule set. Fails on an invalid pattern so a broken rules
    /// file is caught at startup rather than silently skipping rules.
    pub fn compile(rules: &SpamRules) -> RelayResult<Self> {
        let compile_all = |patterns: &[String]| -> RelayResult<Vec<Regex>> {
            patterns
                .iter()
                .map(|p| {
                    Regex::new(p)
                        .map_err(|e| RelayError::Config(format!("bad spam pattern {:?}: {}", p, e)))
                })
                .collect()
        };

        Ok(Self {
            exact: rules
                .exact_phrases
                .iter()
                .map(|p| p.trim().to_lowercase())
                .collect(),
            transcript: compile_all(&rules.transcript_patterns)?,
            translation: compile_all(&rules.translation_patterns)?,
        })
    }

    /// Compile the built-in default rules. Infallible: the defaults are
    /// known-good patterns.
    pub fn default_rules() -> Self {
        Self::compile(&SpamRules::default()).expect("built-in spam rules must compile")
    }

    /// Stage 1 + 2: should this raw transcript be rejected?
    pub fn rejects_transcript(&self, text: &str) -> bool {
        let normalized = text.trim().to_lowercase();
        if self.exact.contains(normalized.as_str()) {
            return true;
        }
        self.transcript.iter().any(|re| re.is_match(&normalized))
    }

    /// Translated-text stage: should this translation be rejected?
    pub fn rejects_translation(&self, text: &str) -> bool {
        self.translation.iter().any(|re| re.is_match(text))
    }
}
