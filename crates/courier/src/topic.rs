// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Topic patterns.
//!
//! A pattern is an ordered list of tokens parsed from a slash-separated
//! path. Tokens are literals, the single-token wildcard `+`, or the
//! multi-token wildcard `*` (one **or more** tokens, never zero).
//!
//! Subscriptions may carry wildcards; publications must be concrete.

use std::fmt;

/// One pattern token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Token {
    Literal(String),
    /// `+` - exactly one concrete token.
    Single,
    /// `*` - one or more concrete tokens.
    Multi,
}

impl Token {
    fn is_wildcard(&self) -> bool {
        !matches!(self, Token::Literal(_))
    }
}

/// Pattern construction errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatternError {
    #[error("pattern is empty")]
    Empty,
    #[error("adjacent wildcard tokens")]
    AdjacentWildcards,
}

/// Parsed, immutable topic pattern.
///
/// Equality and hashing are token-wise, so a pattern can key the registry's
/// reverse index directly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicPattern {
    tokens: Vec<Token>,
}

impl TopicPattern {
    /// Parse a slash-separated path.
    ///
    /// Runs of separators collapse, so `a//b` parses like `a/b`. Fails on
    /// input that tokenizes to nothing and on two adjacent wildcards.
    pub fn parse(input: &str) -> Result<Self, PatternError> {
        let tokens: Vec<Token> = input
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(|segment| match segment {
                "+" => Token::Single,
                "*" => Token::Multi,
                literal => Token::Literal(literal.to_owned()),
            })
            .collect();

        if tokens.is_empty() {
            return Err(PatternError::Empty);
        }
        if tokens
            .windows(2)
            .any(|pair| pair[0].is_wildcard() && pair[1].is_wildcard())
        {
            return Err(PatternError::AdjacentWildcards);
        }

        Ok(TopicPattern { tokens })
    }

    /// Whether the pattern contains no wildcards.
    pub fn is_concrete(&self) -> bool {
        !self.tokens.iter().any(Token::is_wildcard)
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Match this (possibly wildcard) pattern against a concrete one.
    ///
    /// `*` is variable-width, so the walk explores every split; the first
    /// successful alternative wins.
    ///
    /// # Panics
    ///
    /// Panics if `concrete` carries wildcards - that is a programming error
    /// on the caller's side, not a recoverable condition.
    pub fn matches(&self, concrete: &TopicPattern) -> bool {
        assert!(
            concrete.is_concrete(),
            "matches() requires a concrete right-hand side"
        );
        matches_from(&self.tokens, &concrete.tokens)
    }
}

fn matches_from(pattern: &[Token], concrete: &[Token]) -> bool {
    let Some((head, rest)) = pattern.split_first() else {
        return concrete.is_empty();
    };

    match head {
        Token::Literal(literal) => match concrete.split_first() {
            Some((Token::Literal(token), tail)) => literal == token && matches_from(rest, tail),
            _ => false,
        },
        Token::Single => match concrete.split_first() {
            Some((_, tail)) => matches_from(rest, tail),
            None => false,
        },
        // One or more tokens: try every non-empty prefix length.
        Token::Multi => (1..=concrete.len()).any(|taken| matches_from(rest, &concrete[taken..])),
    }
}

impl fmt::Display for TopicPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, token) in self.tokens.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            match token {
                Token::Literal(literal) => f.write_str(literal)?,
                Token::Single => f.write_str("+")?,
                Token::Multi => f.write_str("*")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(input: &str) -> TopicPattern {
        TopicPattern::parse(input).expect("pattern should parse")
    }

    #[test]
    fn test_parse_simple_path() {
        let pat = pattern("temp/floor1/room");
        assert_eq!(pat.tokens().len(), 3);
        assert!(pat.is_concrete());
        assert_eq!(pat.to_string(), "temp/floor1/room");
    }

    #[test]
    fn test_parse_collapses_separator_runs() {
        assert_eq!(pattern("a//b"), pattern("a/b"));
        assert_eq!(pattern("/a/b/"), pattern("a/b"));
        assert_eq!(pattern("///a"), pattern("a"));
    }

    #[test]
    fn test_parse_rejects_empty_input() {
        assert_eq!(TopicPattern::parse(""), Err(PatternError::Empty));
        assert_eq!(TopicPattern::parse("///"), Err(PatternError::Empty));
    }

    #[test]
    fn test_parse_rejects_adjacent_wildcards() {
        for input in ["+/+", "+/*", "*/+", "*/*", "a/+/*/b"] {
            assert_eq!(
                TopicPattern::parse(input),
                Err(PatternError::AdjacentWildcards),
                "input {:?} should be rejected",
                input
            );
        }
    }

    #[test]
    fn test_parse_keeps_separated_wildcards() {
        let pat = pattern("+/a/*");
        assert!(!pat.is_concrete());
        assert_eq!(pat.to_string(), "+/a/*");
    }

    #[test]
    fn test_wildcard_only_inside_whole_token() {
        // `a+` and `*b` are literals, not wildcards.
        let pat = pattern("a+/*b");
        assert!(pat.is_concrete());
    }

    #[test]
    fn test_match_reflexive_for_concrete() {
        for input in ["a", "a/b", "temp/floor1/room"] {
            let pat = pattern(input);
            assert!(pat.matches(&pat), "{:?} should match itself", input);
        }
    }

    #[test]
    fn test_match_literal_mismatch() {
        assert!(!pattern("a/b").matches(&pattern("a/c")));
        assert!(!pattern("a/b").matches(&pattern("a")));
        assert!(!pattern("a").matches(&pattern("a/b")));
    }

    #[test]
    fn test_match_single_wildcard() {
        let pat = pattern("a/+/c");
        assert!(pat.matches(&pattern("a/x/c")));
        assert!(pat.matches(&pattern("a/longtoken/c")));
        assert!(!pat.matches(&pattern("a/c")));
        assert!(!pat.matches(&pattern("a/x/y/c")));
    }

    #[test]
    fn test_match_multi_wildcard() {
        let pat = pattern("a/*/c");
        assert!(pat.matches(&pattern("a/x/c")));
        assert!(pat.matches(&pattern("a/x/y/c")));
        assert!(pat.matches(&pattern("a/x/y/z/c")));
        assert!(!pat.matches(&pattern("a/c")));
    }

    #[test]
    fn test_match_trailing_multi() {
        let pat = pattern("temp/*");
        assert!(pat.matches(&pattern("temp/floor1")));
        assert!(pat.matches(&pattern("temp/floor1/room")));
        assert!(!pat.matches(&pattern("temp")));
        assert!(!pat.matches(&pattern("hum/floor1")));
    }

    #[test]
    fn test_match_multi_needs_backtracking() {
        // The first `x` after `*` is a dead end; the walk must explore the
        // later split to find the match.
        let pat = pattern("*/x/y");
        assert!(pat.matches(&pattern("a/x/z/x/y")));
        assert!(!pat.matches(&pattern("x/y")));
    }

    #[test]
    #[should_panic(expected = "concrete")]
    fn test_match_panics_on_wildcard_rhs() {
        pattern("a/b").matches(&pattern("a/+"));
    }

    #[test]
    fn test_hash_is_token_wise() {
        use std::collections::HashSet;

        let mut set = HashSet::new();
        set.insert(pattern("a/+/c"));
        assert!(set.contains(&pattern("a/+/c")));
        assert!(set.contains(&pattern("a//+/c")));
        assert!(!set.contains(&pattern("a/b/c")));
    }
}
