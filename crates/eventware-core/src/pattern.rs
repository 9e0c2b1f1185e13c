//! Event names and wildcard patterns.
//!
//! Event names are dot-delimited sequences of non-empty segments such as
//! `a.series.of.events`. A [`Pattern`] has the same shape, except that any
//! segment may be the wildcard token `*`, which matches exactly one arbitrary
//! segment at that position.
//!
//! ```rust,ignore
//! use eventware_core::{EventName, Pattern};
//!
//! let pattern: Pattern = "*.b.c".parse()?;
//! let name: EventName = "a.b.c".parse()?;
//!
//! assert!(pattern.matches(&name));
//! assert!(!pattern.matches(&"a.b".parse()?));
//! ```

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Separator between segments.
pub const DELIMITER: char = '.';

/// Segment token matching any single segment.
pub const WILDCARD: &str = "*";

/// Errors produced when parsing event names or patterns.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    /// The input string was empty.
    #[error("event name must not be empty")]
    Empty,

    /// One of the dot-separated segments was empty.
    #[error("empty segment at position {position} in '{input}'")]
    EmptySegment {
        /// The rejected input.
        input: String,
        /// Zero-based index of the empty segment.
        position: usize,
    },
}

fn split_segments(input: &str) -> Result<Vec<&str>, PatternError> {
    if input.is_empty() {
        return Err(PatternError::Empty);
    }

    input
        .split(DELIMITER)
        .enumerate()
        .map(|(position, segment)| {
            if segment.is_empty() {
                Err(PatternError::EmptySegment {
                    input: input.to_owned(),
                    position,
                })
            } else {
                Ok(segment)
            }
        })
        .collect()
}

// =============================================================================
// EventName
// =============================================================================

/// A concrete, validated event name.
///
/// Event names are immutable and case-sensitive. A `*` segment carries no
/// special meaning here and is compared literally.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventName {
    raw: String,
    segments: Vec<String>,
}

impl EventName {
    /// Parses and validates an event name.
    pub fn parse(input: &str) -> Result<Self, PatternError> {
        let segments = split_segments(input)?
            .into_iter()
            .map(str::to_owned)
            .collect();
        Ok(Self {
            raw: input.to_owned(),
            segments,
        })
    }

    /// Returns the full dotted name.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Returns the individual segments.
    pub fn segments(&self) -> impl ExactSizeIterator<Item = &str> {
        self.segments.iter().map(String::as_str)
    }

    /// Returns the number of segments.
    pub fn arity(&self) -> usize {
        self.segments.len()
    }
}

impl FromStr for EventName {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for EventName {
    type Error = PatternError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

// =============================================================================
// Pattern
// =============================================================================

/// A single pattern segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// Matches only an identical segment.
    Literal(String),
    /// Matches any one segment.
    Wildcard,
}

impl Segment {
    fn matches(&self, segment: &str) -> bool {
        match self {
            Self::Literal(literal) => literal == segment,
            Self::Wildcard => true,
        }
    }
}

/// A dot-delimited pattern whose segments may be wildcards.
///
/// Patterns have a fixed arity and only match event names with the same
/// number of segments. There is no multi-segment wildcard.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pattern {
    raw: String,
    segments: Vec<Segment>,
}

impl Pattern {
    /// Parses a pattern, rejecting empty segments.
    pub fn parse(input: &str) -> Result<Self, PatternError> {
        let segments = split_segments(input)?
            .into_iter()
            .map(|segment| {
                if segment == WILDCARD {
                    Segment::Wildcard
                } else {
                    Segment::Literal(segment.to_owned())
                }
            })
            .collect();
        Ok(Self {
            raw: input.to_owned(),
            segments,
        })
    }

    /// Returns the pattern text as written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Returns the parsed segments.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Returns the number of segments.
    pub fn arity(&self) -> usize {
        self.segments.len()
    }

    /// Returns `true` if the pattern contains no wildcard segment.
    pub fn is_concrete(&self) -> bool {
        !self.segments.contains(&Segment::Wildcard)
    }

    /// Converts a wildcard-free pattern into the event name it matches.
    pub fn to_event_name(&self) -> Option<EventName> {
        if self.is_concrete() {
            EventName::parse(&self.raw).ok()
        } else {
            None
        }
    }

    /// Returns `true` if this pattern matches `name`.
    pub fn matches(&self, name: &EventName) -> bool {
        matches(self, name)
    }
}

impl FromStr for Pattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for Pattern {
    type Error = PatternError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

// =============================================================================
// Matching
// =============================================================================

/// Decides whether `pattern` matches `name`.
///
/// Differing segment counts never match. Otherwise every literal pattern
/// segment must equal the corresponding name segment, and wildcard segments
/// accept anything.
pub fn matches(pattern: &Pattern, name: &EventName) -> bool {
    pattern.arity() == name.arity()
        && pattern
            .segments
            .iter()
            .zip(name.segments())
            .all(|(expected, actual)| expected.matches(actual))
}

/// String convenience for [`matches`]. Malformed input never matches.
pub fn matches_str(pattern: &str, name: &str) -> bool {
    match (Pattern::parse(pattern), EventName::parse(name)) {
        (Ok(pattern), Ok(name)) => matches(&pattern, &name),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_event_name() {
        let name = EventName::parse("a.series.of.events").unwrap();
        assert_eq!(name.arity(), 4);
        assert_eq!(name.segments().collect::<Vec<_>>(), ["a", "series", "of", "events"]);
        assert_eq!(name.to_string(), "a.series.of.events");
    }

    #[test]
    fn test_reject_empty_segments() {
        assert_eq!(EventName::parse(""), Err(PatternError::Empty));
        for input in ["a..b", ".a", "a."] {
            assert!(matches!(
                EventName::parse(input),
                Err(PatternError::EmptySegment { .. })
            ));
            assert!(Pattern::parse(input).is_err());
        }

        let err = Pattern::parse("a..b").unwrap_err();
        assert_eq!(
            err,
            PatternError::EmptySegment {
                input: "a..b".into(),
                position: 1
            }
        );
    }

    #[test]
    fn test_literal_and_wildcard_segments() {
        assert!(matches_str("a.b.c", "a.b.c"));
        assert!(matches_str("*.b.c", "a.b.c"));
        assert!(matches_str("a.*.c", "a.x.c"));
        assert!(matches_str("*.*.*", "x.y.z"));
        assert!(!matches_str("a.b.c", "a.b.d"));
        assert!(!matches_str("*.b.c", "a.x.c"));
    }

    #[test]
    fn test_case_sensitive() {
        assert!(!matches_str("A.b", "a.b"));
    }

    #[test]
    fn test_arity_must_match() {
        assert!(!matches_str("*", "a.b"));
        assert!(!matches_str("a.*", "a"));
        assert!(!matches_str("a.b", "a.b.c"));
        assert!(!matches_str("*.*", "a.b.c"));
    }

    #[test]
    fn test_wildcard_in_name_is_literal() {
        assert!(matches_str("a.*", "a.*"));
        assert!(matches_str("a.b.*", "a.b.*"));
        assert!(!matches_str("a.b", "a.*"));
    }

    #[test]
    fn test_malformed_never_matches() {
        assert!(!matches_str("a..b", "a.x.b"));
        assert!(!matches_str("a.*", ""));
    }

    #[test]
    fn test_concrete_pattern() {
        let concrete = Pattern::parse("math.add").unwrap();
        assert!(concrete.is_concrete());
        assert_eq!(
            concrete.to_event_name(),
            Some(EventName::parse("math.add").unwrap())
        );

        let wild = Pattern::parse("math.*").unwrap();
        assert!(!wild.is_concrete());
        assert_eq!(wild.to_event_name(), None);
    }

    #[test]
    fn test_match_equals_segmentwise_rule() {
        let patterns = ["a.b", "*.b", "a.*", "*.*", "a.b.c", "*.b.c", "a"];
        let names = ["a.b", "x.b", "a.x", "a.b.c", "q.b.c", "a", "b"];

        for p in patterns {
            for n in names {
                let pattern = Pattern::parse(p).unwrap();
                let name = EventName::parse(n).unwrap();
                let expected = pattern.arity() == name.arity()
                    && pattern.segments().iter().zip(name.segments()).all(
                        |(seg, actual)| match seg {
                            Segment::Wildcard => true,
                            Segment::Literal(l) => l == actual,
                        },
                    );
                assert_eq!(matches(&pattern, &name), expected, "{p} vs {n}");
            }
        }
    }
}
