//! Compiles BRE/ERE pattern text into a `regex::bytes::Regex` and applies
//! substitution replacement templates.
//!
//! Pattern space bytes are not guaranteed to be valid UTF-8 (they may
//! contain arbitrary bytes, including embedded record terminators after
//! `N`/`G`), so matching is done with `regex::bytes::Regex` rather than the
//! `str`-based `regex::Regex` the rest of the workspace's text tools use.

use std::collections::HashMap;
use std::rc::Rc;

use regex::bytes::{Captures, Regex, RegexBuilder};

use crate::error::{SedError, SedResult};

/// Which metacharacter convention a pattern's source text follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Dialect {
    #[default]
    Basic,
    Extended,
}

/// Per-compilation modifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct RegexFlags {
    pub case_insensitive: bool,
    pub multi_line: bool,
}

type CacheKey = (String, Dialect, bool, bool);

/// A small compiled-pattern cache, keyed on source text, dialect, and
/// flags, shared for the lifetime of one run.
#[derive(Default)]
pub struct RegexCache {
    entries: HashMap<CacheKey, Rc<Regex>>,
}

impl RegexCache {
    pub fn new() -> Self {
        RegexCache::default()
    }

    /// Compiles `source` under `dialect`/`flags`, reusing a cached regex if
    /// this exact combination was already compiled.
    pub fn compile(
        &mut self,
        source: &str,
        dialect: Dialect,
        flags: RegexFlags,
    ) -> SedResult<Rc<Regex>> {
        let key: CacheKey = (
            source.to_string(),
            dialect,
            flags.case_insensitive,
            flags.multi_line,
        );
        if let Some(regex) = self.entries.get(&key) {
            return Ok(regex.clone());
        }
        let ere_source = match dialect {
            Dialect::Basic => bre_to_ere(source),
            Dialect::Extended => source.to_string(),
        };
        let regex = RegexBuilder::new(&ere_source)
            .case_insensitive(flags.case_insensitive)
            .multi_line(flags.multi_line)
            .build()
            .map_err(|e| SedError::RegexCompile {
                pattern: source.to_string(),
                message: e.to_string(),
            })?;
        let regex = Rc::new(regex);
        self.entries.insert(key, regex.clone());
        Ok(regex)
    }
}

/// Translates a basic regular expression to extended form by swapping the
/// escaped/unescaped status of `( ) { } | ? +`, leaving bracket expressions
/// (`[...]`) untouched so their contents are never reinterpreted.
pub fn bre_to_ere(pattern: &str) -> String {
    const SWAPPED: &[char] = &['(', ')', '{', '}', '|', '?', '+'];
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len());
    let mut i = 0;
    let mut in_bracket = false;
    let mut bracket_literal_boundary = 0usize;

    while i < chars.len() {
        let c = chars[i];

        if in_bracket {
            out.push(c);
            if c == ']' && i >= bracket_literal_boundary {
                in_bracket = false;
            }
            i += 1;
            continue;
        }

        if c == '[' {
            in_bracket = true;
            out.push(c);
            i += 1;
            if i < chars.len() && chars[i] == '^' {
                out.push('^');
                i += 1;
            }
            // A `]` appearing immediately (optionally after `^`) is a
            // literal member of the bracket expression, not its close.
            bracket_literal_boundary = i + 1;
            if i < chars.len() && chars[i] == ']' {
                out.push(']');
                i += 1;
            }
            continue;
        }

        if c == '\\' && i + 1 < chars.len() {
            let next = chars[i + 1];
            if next == '\\' {
                out.push('\\');
                out.push('\\');
            } else if SWAPPED.contains(&next) {
                // escaped-metachar in BRE means literal; becomes a bare
                // metachar in ERE.
                out.push(next);
            } else {
                out.push('\\');
                out.push(next);
            }
            i += 2;
            continue;
        }

        if SWAPPED.contains(&c) {
            // bare in BRE means literal; becomes escaped in ERE.
            out.push('\\');
            out.push(c);
            i += 1;
            continue;
        }

        out.push(c);
        i += 1;
    }
    out
}

#[derive(Clone, Copy)]
enum CaseMode {
    None,
    UpperOne,
    LowerOne,
    UpperAll,
    LowerAll,
}

fn push_transformed(out: &mut Vec<u8>, mode: &mut CaseMode, bytes: &[u8]) {
    for &b in bytes {
        let transformed = match *mode {
            CaseMode::None => b,
            CaseMode::UpperOne => {
                *mode = CaseMode::None;
                b.to_ascii_uppercase()
            }
            CaseMode::LowerOne => {
                *mode = CaseMode::None;
                b.to_ascii_lowercase()
            }
            CaseMode::UpperAll => b.to_ascii_uppercase(),
            CaseMode::LowerAll => b.to_ascii_lowercase(),
        };
        out.push(transformed);
    }
}

/// Expands a replacement template (`\1`-`\9`, `&`, `\&`, `\\`, and the
/// `\l \u \L \U \E` case-folding escapes) against a successful match.
pub fn expand_replacement(template: &str, caps: &Captures) -> Vec<u8> {
    let mut out = Vec::new();
    let mut mode = CaseMode::None;
    let chars: Vec<char> = template.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c == '\\' && i + 1 < chars.len() {
            let next = chars[i + 1];
            match next {
                '1'..='9' => {
                    let idx = next.to_digit(10).unwrap() as usize;
                    if let Some(m) = caps.get(idx) {
                        push_transformed(&mut out, &mut mode, m.as_bytes());
                    }
                    i += 2;
                }
                '&' => {
                    push_transformed(&mut out, &mut mode, b"&");
                    i += 2;
                }
                '\\' => {
                    push_transformed(&mut out, &mut mode, b"\\");
                    i += 2;
                }
                'l' => {
                    mode = CaseMode::LowerOne;
                    i += 2;
                }
                'u' => {
                    mode = CaseMode::UpperOne;
                    i += 2;
                }
                'L' => {
                    mode = CaseMode::LowerAll;
                    i += 2;
                }
                'U' => {
                    mode = CaseMode::UpperAll;
                    i += 2;
                }
                'E' => {
                    mode = CaseMode::None;
                    i += 2;
                }
                other => {
                    let mut buf = [0u8; 4];
                    push_transformed(&mut out, &mut mode, other.encode_utf8(&mut buf).as_bytes());
                    i += 2;
                }
            }
            continue;
        }
        if c == '&' {
            if let Some(m) = caps.get(0) {
                push_transformed(&mut out, &mut mode, m.as_bytes());
            }
            i += 1;
            continue;
        }
        let mut buf = [0u8; 4];
        push_transformed(&mut out, &mut mode, c.encode_utf8(&mut buf).as_bytes());
        i += 1;
    }
    out
}

/// Applies a substitution, replacing the `nth` match onward (`nth` is
/// 1-based; pass `1` for "first match") and, if `global` is set, every
/// match after that. Returns the rewritten bytes and how many replacements
/// were actually performed.
pub fn substitute(
    regex: &Regex,
    input: &[u8],
    replacement: &str,
    global: bool,
    nth: usize,
) -> (Vec<u8>, usize) {
    let nth = nth.max(1);
    let mut out = Vec::with_capacity(input.len());
    let mut last_end = 0usize;
    let mut match_idx = 0usize;
    let mut count = 0usize;

    for caps in regex.captures_iter(input) {
        let m = caps.get(0).expect("capture group 0 always matches");
        match_idx += 1;
        if match_idx < nth {
            continue;
        }
        out.extend_from_slice(&input[last_end..m.start()]);
        out.extend_from_slice(&expand_replacement(replacement, &caps));
        last_end = m.end();
        count += 1;
        if !global {
            break;
        }
    }
    out.extend_from_slice(&input[last_end..]);
    (out, count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bre_to_ere_swaps_parens_and_braces() {
        assert_eq!(bre_to_ere(r"\(a\)\{2\}"), "(a){2}");
        assert_eq!(bre_to_ere(r"(a){2}"), r"\(a\)\{2\}");
    }

    #[test]
    fn bre_to_ere_swaps_alternation_and_quantifiers() {
        assert_eq!(bre_to_ere(r"a\|b\+c\?"), "a|b+c?");
        assert_eq!(bre_to_ere("a|b+c?"), r"a\|b\+c\?");
    }

    #[test]
    fn bre_to_ere_preserves_bracket_expressions() {
        assert_eq!(bre_to_ere(r"[a(b)]"), "[a(b)]");
        assert_eq!(bre_to_ere(r"[]a)]"), "[]a)]");
        assert_eq!(bre_to_ere(r"[^])(]"), "[^])(]");
    }

    #[test]
    fn bre_to_ere_handles_escaped_backslash() {
        assert_eq!(bre_to_ere(r"a\\b"), r"a\\b");
    }

    #[test]
    fn substitute_first_match_only() {
        let mut cache = RegexCache::new();
        let re = cache
            .compile("a", Dialect::Basic, RegexFlags::default())
            .unwrap();
        let (out, count) = substitute(&re, b"aaa", "b", false, 1);
        assert_eq!(out, b"baa");
        assert_eq!(count, 1);
    }

    #[test]
    fn substitute_nth_match() {
        let mut cache = RegexCache::new();
        let re = cache
            .compile("a", Dialect::Basic, RegexFlags::default())
            .unwrap();
        let (out, count) = substitute(&re, b"aaa", "b", false, 2);
        assert_eq!(out, b"aba");
        assert_eq!(count, 1);
    }

    #[test]
    fn substitute_nth_and_global() {
        let mut cache = RegexCache::new();
        let re = cache
            .compile("a", Dialect::Basic, RegexFlags::default())
            .unwrap();
        let (out, count) = substitute(&re, b"aaa", "b", true, 2);
        assert_eq!(out, b"abb");
        assert_eq!(count, 2);
    }

    #[test]
    fn expand_replacement_handles_case_folding() {
        let mut cache = RegexCache::new();
        let re = cache
            .compile(r"\(a*\)", Dialect::Basic, RegexFlags::default())
            .unwrap();
        let caps = re.captures(b"aaa").unwrap();
        assert_eq!(expand_replacement(r"\U\1\E!", &caps), b"AAA!");
    }

    #[test]
    fn ampersand_is_whole_match() {
        let mut cache = RegexCache::new();
        let re = cache
            .compile("o", Dialect::Basic, RegexFlags::default())
            .unwrap();
        let (out, _) = substitute(&re, b"hello", "[&]", true, 1);
        assert_eq!(out, b"hell[o]");
    }

    proptest::proptest! {
        /// `bre_to_ere` only ever swaps meta/literal status of a fixed set of
        /// bytes; it must never panic, regardless of how malformed or
        /// unbalanced the input pattern text is (unterminated bracket
        /// expressions, dangling backslashes, ...).
        #[test]
        fn bre_to_ere_never_panics(pattern in ".{0,64}") {
            let _ = bre_to_ere(&pattern);
        }

        /// Translating a pattern to the other dialect and back is a no-op
        /// when the pattern contains none of the bytes whose meaning
        /// depends on bracket-expression context in a way the translator
        /// can't round-trip (a lone, unterminated `[`).
        #[test]
        fn bre_to_ere_round_trips_without_brackets(pattern in "[^\\[\\]]{0,32}") {
            let once = bre_to_ere(&pattern);
            let twice = bre_to_ere(&once);
            proptest::prop_assert_eq!(pattern, twice);
        }
    }
}
