//! Deep-link grounding.
//!
//! The assistant may only link titles whose identifiers came back from a
//! lookup in the same turn. [`GroundingValidator`] enforces that on the final
//! text: every deep link of the configured scheme is checked against the
//! turn's [`GroundingLedger`] and removed when it was not grounded.

use std::sync::LazyLock;

use omega_core::errors::ErrorKind;
use omega_core::media::{GroundedReference, MediaKind};
use regex::Regex;
use serde::Serialize;
use tracing::warn;

/// Markdown links and bare `scheme://` URLs.
///
/// Markdown targets may be wrapped in `<...>` and followed by a quoted or
/// parenthesized title.
static LINK_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r#"\[(?P<label>[^\]\n]*)\]\(\s*(?:<(?P<angled>[^>\n]*)>|(?P<target>[^)\s]*))"#,
        r#"(?:\s+(?:"[^"\n]*"|'[^'\n]*'|\([^)\n]*\)))?\s*\)"#,
        r#"|(?P<bare>[A-Za-z][A-Za-z0-9+.\-]*://[^\s()\[\]<>"']+)"#,
    ))
    .expect("valid regex")
});

/// Sentence punctuation that may follow a bare link without belonging to it.
const TRAILING_PUNCTUATION: [char; 6] = ['.', ',', ';', ':', '!', '?'];

/// Renders `<scheme>://<kind>/<canonical_id>` links.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeepLinkFormat {
    scheme: String,
}

impl DeepLinkFormat {
    pub fn new(scheme: &str) -> Self {
        Self {
            scheme: scheme.trim().trim_end_matches("://").to_lowercase(),
        }
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn link(&self, reference: &GroundedReference) -> String {
        format!(
            "{}://{}/{}",
            self.scheme, reference.media_kind, reference.canonical_id
        )
    }

    /// Parses the part after `://` into kind and identifier.
    ///
    /// The identifier must be written exactly as [`link`](Self::link) renders
    /// it, so leading zeros are rejected.
    fn parse_target(path: &str) -> Option<(MediaKind, u64)> {
        let (kind, id) = path.split_once('/')?;
        let kind = match kind {
            "movie" => MediaKind::Movie,
            "show" => MediaKind::Show,
            _ => return None,
        };
        if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let canonical_id: u64 = id.parse().ok()?;
        (canonical_id.to_string() == id).then_some((kind, canonical_id))
    }
}

impl Default for DeepLinkFormat {
    fn default() -> Self {
        Self::new("void")
    }
}

/// References grounded by successful lookups during one turn.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroundingLedger {
    references: Vec<GroundedReference>,
}

impl GroundingLedger {
    pub fn record(&mut self, reference: GroundedReference) {
        if !self.contains(reference.media_kind, reference.canonical_id) {
            self.references.push(reference);
        }
    }

    pub fn contains(&self, kind: MediaKind, canonical_id: u64) -> bool {
        self.references
            .iter()
            .any(|r| r.media_kind == kind && r.canonical_id == canonical_id)
    }

    pub fn references(&self) -> &[GroundedReference] {
        &self.references
    }

    pub fn into_references(self) -> Vec<GroundedReference> {
        self.references
    }

    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }
}

/// Why a link was removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StripReason {
    /// Well formed, but no lookup this turn produced the identifier
    Ungrounded,
    /// Uses the deep-link scheme without a valid `kind/id` path
    Malformed,
}

/// A deep link removed from the final text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StrippedLink {
    /// The link target as the model wrote it
    pub link: String,
    /// Label text kept in place of a markdown link
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub reason: StripReason,
}

impl StrippedLink {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::UngroundedReference
    }
}

/// Final text after validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedText {
    pub text: String,
    pub stripped: Vec<StrippedLink>,
}

enum LinkCheck {
    /// Not a deep link of our scheme; left untouched
    Foreign,
    Grounded,
    Rejected(StripReason),
}

/// Strips deep links the turn did not ground.
#[derive(Debug, Clone, Default)]
pub struct GroundingValidator {
    format: DeepLinkFormat,
}

impl GroundingValidator {
    pub fn new(format: DeepLinkFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> &DeepLinkFormat {
        &self.format
    }

    fn check(&self, target: &str, ledger: &GroundingLedger) -> LinkCheck {
        let Some((scheme, path)) = target.split_once("://") else {
            return LinkCheck::Foreign;
        };
        if !scheme.eq_ignore_ascii_case(self.format.scheme()) {
            return LinkCheck::Foreign;
        }
        match DeepLinkFormat::parse_target(path) {
            Some((kind, id)) if ledger.contains(kind, id) => LinkCheck::Grounded,
            Some(_) => LinkCheck::Rejected(StripReason::Ungrounded),
            None => LinkCheck::Rejected(StripReason::Malformed),
        }
    }

    /// Checks every deep link in `text` against `ledger`.
    ///
    /// A rejected markdown link is replaced by its label; a rejected bare
    /// link is removed together with one adjacent space.
    pub fn validate(&self, text: &str, ledger: &GroundingLedger) -> ValidatedText {
        let mut output = String::with_capacity(text.len());
        let mut stripped = Vec::new();
        let mut last = 0;

        for caps in LINK_PATTERN.captures_iter(text) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            output.push_str(&text[last..whole.start()]);
            last = whole.end();

            if let Some(target) = caps.name("angled").or_else(|| caps.name("target")) {
                let target = target.as_str().trim();
                let label = caps.name("label").map_or("", |m| m.as_str());
                match self.check(target, ledger) {
                    LinkCheck::Foreign | LinkCheck::Grounded => output.push_str(whole.as_str()),
                    LinkCheck::Rejected(reason) => {
                        warn!("Stripping {reason:?} link '{target}' (label '{label}')");
                        output.push_str(label);
                        stripped.push(StrippedLink {
                            link: target.to_string(),
                            label: Some(label.to_string()),
                            reason,
                        });
                    }
                }
            } else if let Some(bare) = caps.name("bare") {
                let raw = bare.as_str();
                let link = raw.trim_end_matches(TRAILING_PUNCTUATION);
                let tail = &raw[link.len()..];
                match self.check(link, ledger) {
                    LinkCheck::Foreign | LinkCheck::Grounded => output.push_str(raw),
                    LinkCheck::Rejected(reason) => {
                        warn!("Stripping {reason:?} link '{link}'");
                        let next_is_space = text[last..].starts_with(char::is_whitespace);
                        if output.ends_with(' ') && (next_is_space || !tail.is_empty()) {
                            output.pop();
                        }
                        output.push_str(tail);
                        stripped.push(StrippedLink {
                            link: link.to_string(),
                            label: None,
                            reason,
                        });
                    }
                }
            }
        }
        output.push_str(&text[last..]);

        ValidatedText {
            text: output,
            stripped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> GroundingLedger {
        let mut ledger = GroundingLedger::default();
        ledger.record(GroundedReference {
            display_title: "The Expanse".to_string(),
            canonical_id: 63639,
            media_kind: MediaKind::Show,
            year: Some(2015),
        });
        ledger
    }

    #[test]
    fn test_grounded_link_kept_and_ungrounded_stripped() {
        let validator = GroundingValidator::default();
        let text = "Try [The Expanse](void://show/63639) or [The Wire](void://show/9999).";

        let validated = validator.validate(text, &ledger());

        assert_eq!(validated.text, "Try [The Expanse](void://show/63639) or The Wire.");
        assert_eq!(
            validated.stripped,
            vec![StrippedLink {
                link: "void://show/9999".to_string(),
                label: Some("The Wire".to_string()),
                reason: StripReason::Ungrounded,
            }]
        );
        assert_eq!(validated.stripped[0].kind(), ErrorKind::UngroundedReference);
    }

    #[test]
    fn test_kind_must_match_the_lookup() {
        let validated = GroundingValidator::default()
            .validate("[The Expanse](void://movie/63639)", &ledger());
        assert_eq!(validated.text, "The Expanse");
        assert_eq!(validated.stripped[0].reason, StripReason::Ungrounded);
    }

    #[test]
    fn test_bare_links_are_checked() {
        let validator = GroundingValidator::default();

        let kept = validator.validate("Watch void://show/63639 tonight", &ledger());
        let removed = validator.validate("Watch void://show/9999 tonight", &ledger());
        let trailing = validator.validate("Watch void://movie/1.", &ledger());

        assert_eq!(kept.text, "Watch void://show/63639 tonight");
        assert!(kept.stripped.is_empty());
        assert_eq!(removed.text, "Watch tonight");
        assert_eq!(removed.stripped[0].label, None);
        assert_eq!(trailing.text, "Watch.");
        assert_eq!(trailing.stripped[0].link, "void://movie/1");
    }

    #[test]
    fn test_malformed_links_are_stripped() {
        let validated = GroundingValidator::default().validate(
            "[A](void://show/abc) [B](void://podcast/12) [C](VOID://show/) [D](void://show/63639/extra)",
            &ledger(),
        );
        assert_eq!(validated.text, "A B C D");
        assert!(
            validated
                .stripped
                .iter()
                .all(|link| link.reason == StripReason::Malformed)
        );
    }

    #[test]
    fn test_angle_bracket_and_titled_targets_are_checked() {
        let validator = GroundingValidator::default();

        let angled = validator.validate("[The Wire](<void://show/9999>)", &ledger());
        let titled = validator.validate(r#"[The Wire](void://show/9999 "The Wire")"#, &ledger());
        let kept = validator.validate("[The Expanse](< void://show/63639 >)", &ledger());

        assert_eq!(angled.text, "The Wire");
        assert_eq!(angled.stripped[0].link, "void://show/9999");
        assert_eq!(angled.stripped[0].reason, StripReason::Ungrounded);
        assert_eq!(titled.text, "The Wire");
        assert_eq!(titled.stripped.len(), 1);
        assert_eq!(kept.text, "[The Expanse](< void://show/63639 >)");
        assert!(kept.stripped.is_empty());
    }

    #[test]
    fn test_identifier_must_be_written_canonically() {
        let validated = GroundingValidator::default().validate(
            "[The Expanse](void://show/063639) or void://show/0063639 tonight",
            &ledger(),
        );
        assert_eq!(validated.text, "The Expanse or tonight");
        assert_eq!(validated.stripped.len(), 2);
        assert!(
            validated
                .stripped
                .iter()
                .all(|link| link.reason == StripReason::Malformed)
        );
    }

    #[test]
    fn test_other_schemes_are_left_alone() {
        let validator = GroundingValidator::default();
        let text = "See [TMDB](https://www.themoviedb.org/tv/63639) and https://trakt.tv, [notes](#top)";

        let validated = validator.validate(text, &GroundingLedger::default());

        assert_eq!(validated.text, text);
        assert!(validated.stripped.is_empty());
    }

    #[test]
    fn test_custom_scheme() {
        let validator = GroundingValidator::new(DeepLinkFormat::new("Omega://"));
        assert_eq!(validator.format().scheme(), "omega");

        let validated = validator.validate(
            "[The Expanse](omega://show/63639) [Old](void://show/9999)",
            &ledger(),
        );
        assert_eq!(validated.text, "[The Expanse](omega://show/63639) [Old](void://show/9999)");
        assert!(validated.stripped.is_empty());
    }

    #[test]
    fn test_ledger_ignores_duplicates() {
        let mut ledger = ledger();
        ledger.record(ledger.references()[0].clone());
        assert_eq!(ledger.references().len(), 1);
        assert!(ledger.contains(MediaKind::Show, 63639));
        assert!(!ledger.contains(MediaKind::Movie, 63639));
    }

    #[test]
    fn test_link_rendering() {
        let references = ledger().into_references();
        assert_eq!(DeepLinkFormat::default().link(&references[0]), "void://show/63639");
    }
}
