//! Artifact references: shell-glob matching, pattern overlap, and workflow-state
//! inference from paths.
//!
//! Glob syntax: `*` (any run within one segment), `?` (one char), `[abc]`,
//! `[a-z]`, `[!x]` / `[^x]` classes, `\x` escapes, and `**` as a whole segment
//! (zero or more segments). Nothing but `**` crosses a `/`. Matching is
//! case-sensitive.

use crate::error::{Result, WfmailError};
use crate::types::WorkflowState;
use regex::Regex;

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
enum ClassItem {
    Char(char),
    Range(char, char),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Lit(char),
    Any,
    Star,
    Class { items: Vec<ClassItem>, negated: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Globstar,
    Parts(Vec<Token>),
}

fn normalize(s: &str) -> &str {
    s.trim().trim_start_matches("./")
}

fn tokenize_segment(seg: &str) -> Vec<Token> {
    let chars: Vec<char> = seg.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' => {
                // Collapse runs; `**` inside a segment is just `*`.
                if tokens.last() != Some(&Token::Star) {
                    tokens.push(Token::Star);
                }
                i += 1;
            }
            '?' => {
                tokens.push(Token::Any);
                i += 1;
            }
            '\\' if i + 1 < chars.len() => {
                tokens.push(Token::Lit(chars[i + 1]));
                i += 2;
            }
            '[' => match parse_class(&chars, i) {
                Some((token, next)) => {
                    tokens.push(token);
                    i = next;
                }
                // Unterminated class: the bracket is literal, as in the shell.
                None => {
                    tokens.push(Token::Lit('['));
                    i += 1;
                }
            },
            c => {
                tokens.push(Token::Lit(c));
                i += 1;
            }
        }
    }
    tokens
}

fn parse_class(chars: &[char], open: usize) -> Option<(Token, usize)> {
    let mut i = open + 1;
    let negated = matches!(chars.get(i), Some('!') | Some('^'));
    if negated {
        i += 1;
    }
    let mut items = Vec::new();
    let mut first = true;
    while i < chars.len() {
        let c = chars[i];
        if c == ']' && !first {
            return Some((Token::Class { items, negated }, i + 1));
        }
        first = false;
        if i + 2 < chars.len() && chars[i + 1] == '-' && chars[i + 2] != ']' {
            items.push(ClassItem::Range(c, chars[i + 2]));
            i += 3;
        } else {
            items.push(ClassItem::Char(c));
            i += 1;
        }
    }
    None
}

fn segments(pattern: &str) -> Vec<Segment> {
    normalize(pattern)
        .split('/')
        .map(|seg| {
            if seg == "**" {
                Segment::Globstar
            } else {
                Segment::Parts(tokenize_segment(seg))
            }
        })
        .collect()
}

impl Token {
    fn to_regex(&self) -> String {
        match self {
            Token::Lit(c) => regex::escape(&c.to_string()),
            Token::Any => "[^/]".to_string(),
            Token::Star => "[^/]*".to_string(),
            Token::Class { items, negated } => {
                let mut out = String::from(if *negated { "[^/" } else { "[" });
                for item in items {
                    match item {
                        ClassItem::Char(c) => out.push_str(&escape_class_char(*c)),
                        ClassItem::Range(a, b) => {
                            out.push_str(&escape_class_char(*a));
                            out.push('-');
                            out.push_str(&escape_class_char(*b));
                        }
                    }
                }
                out.push(']');
                if *negated {
                    out
                } else {
                    // A positive class still never matches '/'.
                    format!("[[^/]&&{out}]")
                }
            }
        }
    }

    /// Could one character satisfy both tokens? Classes are compared loosely
    /// (any two classes are assumed to intersect).
    fn compatible(&self, other: &Token) -> bool {
        match (self, other) {
            (Token::Lit(a), Token::Lit(b)) => a == b,
            (Token::Lit(c), Token::Class { .. }) => other.class_contains(*c),
            (Token::Class { .. }, Token::Lit(c)) => self.class_contains(*c),
            _ => true,
        }
    }

    fn class_contains(&self, c: char) -> bool {
        let Token::Class { items, negated } = self else {
            return false;
        };
        if c == '/' {
            return false;
        }
        let hit = items.iter().any(|item| match item {
            ClassItem::Char(x) => *x == c,
            ClassItem::Range(a, b) => (*a..=*b).contains(&c),
        });
        hit != *negated
    }
}

fn escape_class_char(c: char) -> String {
    match c {
        '\\' | ']' | '[' | '^' | '-' | '&' | '~' => format!("\\{c}"),
        _ => c.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Pattern
// ---------------------------------------------------------------------------

/// A compiled artifact glob.
#[derive(Debug, Clone)]
pub struct Pattern {
    raw: String,
    segments: Vec<Segment>,
    regex: Regex,
}

impl Pattern {
    pub fn new(pattern: &str) -> Result<Self> {
        let segments = segments(pattern);
        let mut re = String::from("^");
        let last = segments.len().saturating_sub(1);
        for (i, seg) in segments.iter().enumerate() {
            match seg {
                Segment::Globstar if i == last => re.push_str(".*"),
                Segment::Globstar => re.push_str("(?:[^/]+/)*"),
                Segment::Parts(tokens) => {
                    for t in tokens {
                        re.push_str(&t.to_regex());
                    }
                    if i != last {
                        re.push('/');
                    }
                }
            }
        }
        re.push('$');
        let regex = Regex::new(&re).map_err(|e| WfmailError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            raw: pattern.to_string(),
            segments,
            regex,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// True when the pattern contains no wildcard at all.
    pub fn is_literal(&self) -> bool {
        self.segments.iter().all(|s| match s {
            Segment::Globstar => false,
            Segment::Parts(tokens) => tokens.iter().all(|t| matches!(t, Token::Lit(_))),
        })
    }

    pub fn matches(&self, path: &str) -> bool {
        self.regex.is_match(normalize(path))
    }

    /// True if some concrete path could match both patterns.
    pub fn overlaps(&self, other: &Pattern) -> bool {
        let (a, b) = (&self.segments, &other.segments);
        let mut memo = vec![None; (a.len() + 1) * (b.len() + 1)];
        overlap_segments(a, b, 0, 0, &mut memo)
    }
}

/// Convenience wrapper: do the two glob patterns (or literal paths) overlap?
pub fn overlaps(a: &str, b: &str) -> bool {
    let (a, b) = (segments(a), segments(b));
    let mut memo = vec![None; (a.len() + 1) * (b.len() + 1)];
    overlap_segments(&a, &b, 0, 0, &mut memo)
}

fn overlap_segments(
    a: &[Segment],
    b: &[Segment],
    i: usize,
    j: usize,
    memo: &mut [Option<bool>],
) -> bool {
    let slot = i * (b.len() + 1) + j;
    if let Some(hit) = memo[slot] {
        return hit;
    }
    let hit = match (a.get(i), b.get(j)) {
        (None, None) => true,
        (Some(Segment::Globstar), _) => {
            overlap_segments(a, b, i + 1, j, memo)
                || (j < b.len() && overlap_segments(a, b, i, j + 1, memo))
        }
        (_, Some(Segment::Globstar)) => {
            overlap_segments(a, b, i, j + 1, memo)
                || (i < a.len() && overlap_segments(a, b, i + 1, j, memo))
        }
        (Some(Segment::Parts(x)), Some(Segment::Parts(y))) => {
            overlap_tokens(x, y) && overlap_segments(a, b, i + 1, j + 1, memo)
        }
        _ => false,
    };
    memo[slot] = Some(hit);
    hit
}

fn overlap_tokens(x: &[Token], y: &[Token]) -> bool {
    let mut memo = vec![None; (x.len() + 1) * (y.len() + 1)];
    overlap_tokens_at(x, y, 0, 0, &mut memo)
}

fn overlap_tokens_at(
    x: &[Token],
    y: &[Token],
    p: usize,
    q: usize,
    memo: &mut [Option<bool>],
) -> bool {
    let slot = p * (y.len() + 1) + q;
    if let Some(hit) = memo[slot] {
        return hit;
    }
    let hit = match (x.get(p), y.get(q)) {
        (None, None) => true,
        (Some(Token::Star), _) => {
            overlap_tokens_at(x, y, p + 1, q, memo)
                || (q < y.len() && overlap_tokens_at(x, y, p, q + 1, memo))
        }
        (_, Some(Token::Star)) => {
            overlap_tokens_at(x, y, p, q + 1, memo)
                || (p < x.len() && overlap_tokens_at(x, y, p + 1, q, memo))
        }
        (Some(s), Some(t)) => s.compatible(t) && overlap_tokens_at(x, y, p + 1, q + 1, memo),
        _ => false,
    };
    memo[slot] = Some(hit);
    hit
}

// ---------------------------------------------------------------------------
// State inference
// ---------------------------------------------------------------------------

/// Infer an artifact's workflow state from the directory it sits in: the last
/// directory segment that names a state wins (`specs/proposed/auth.md` → proposed).
/// Pure; never touches the filesystem.
pub fn derive_state(path: &str) -> Option<WorkflowState> {
    let path = normalize(path);
    let dirs = match path.rsplit_once('/') {
        Some((dirs, _file)) => dirs,
        None => return None,
    };
    dirs.rsplit('/').find_map(|seg| seg.parse::<WorkflowState>().ok())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
