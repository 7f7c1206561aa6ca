//! Tokenizer: normalize lines into kinded tokens (§4.2).

use serde::{Deserialize, Serialize};

/// Default maximum token length; tokens longer than this are dropped.
pub const DEFAULT_MAX_TOKEN_LEN: usize = 128;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Ident,
    Word,
    Compound,
    Symbol,
    Keyword,
}

/// A single emitted token occurrence: its stored key and kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenOccurrence {
    pub key: String,
    pub kind: TokenKind,
    pub line: u32,
}

/// Result of tokenizing a whole file's lines.
#[derive(Debug, Default)]
pub struct TokenizeResult {
    /// All distinct tokens with a kind, keyed by stored key.
    pub occurrences: Vec<TokenOccurrence>,
    /// Count of ident + word + compound occurrences (§4.2, used for size
    /// normalization in §4.9).
    pub eligible_token_count: u32,
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}
fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Split an identifier into camelCase / PascalCase / snake_case sub-parts.
/// `retryCount` -> ["retry", "Count"]; `RETRY_COUNT` -> ["RETRY", "COUNT"].
fn split_ident_boundaries(ident: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let bytes = ident.as_bytes();
    let mut start = 0usize;
    let chars: Vec<char> = ident.chars().collect();
    let mut i = 0usize;
    while i < chars.len() {
        if chars[i] == '_' {
            if i > start {
                parts.push(&ident[byte_off(&chars, start)..byte_off(&chars, i)]);
            }
            i += 1;
            start = i;
            continue;
        }
        // camelCase / PascalCase boundary: lower->upper, or acronym->Word (XMLParser -> XML, Parser)
        if i > start && chars[i].is_uppercase() {
            let prev_lower = chars[i - 1].is_lowercase() || chars[i - 1].is_ascii_digit();
            let next_lower = chars.get(i + 1).is_some_and(|c| c.is_lowercase());
            if prev_lower || (next_lower && i > start) {
                parts.push(&ident[byte_off(&chars, start)..byte_off(&chars, i)]);
                start = i;
            }
        }
        i += 1;
    }
    if start < chars.len() {
        parts.push(&ident[byte_off(&chars, start)..]);
    }
    let _ = bytes;
    parts.into_iter().filter(|p| !p.is_empty()).collect()
}

fn byte_off(chars: &[char], char_idx: usize) -> usize {
    chars[..char_idx].iter().map(|c| c.len_utf8()).sum()
}

/// Emit an identifier as an `Ident`, plus (if it splits into camelCase/
/// snake_case sub-parts) a `Compound` for the whole thing and an `Ident` per
/// part (§4.2).
fn push_ident_and_parts(out: &mut Vec<TokenOccurrence>, ident: &str, max_len: usize, line_no: u32) {
    if ident.len() > max_len {
        return;
    }
    out.push(TokenOccurrence { key: ident.to_string(), kind: TokenKind::Ident, line: line_no });
    let parts = split_ident_boundaries(ident);
    if parts.len() > 1 {
        out.push(TokenOccurrence { key: ident.to_string(), kind: TokenKind::Compound, line: line_no });
        for p in parts {
            if p.len() <= max_len {
                out.push(TokenOccurrence { key: p.to_string(), kind: TokenKind::Ident, line: line_no });
            }
        }
    }
}

/// Tokenize a single line, appending occurrences to `out`. `line_no` is
/// 1-indexed. `in_word_context` controls whether bare `word` tokens (used in
/// markdown/comment text) are emitted in addition to idents.
fn tokenize_line(line: &str, line_no: u32, in_word_context: bool, max_len: usize, out: &mut Vec<TokenOccurrence>) {
    let chars: Vec<char> = line.chars().collect();
    let n = chars.len();
    let mut i = 0usize;
    while i < n {
        let c = chars[i];
        if in_word_context && c.is_alphabetic() {
            let start = i;
            i += 1;
            while i < n && (chars[i].is_alphabetic() || chars[i] == '\'') {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            if word.chars().count() >= 2 && word.len() <= max_len {
                out.push(TokenOccurrence { key: word.to_lowercase(), kind: TokenKind::Word, line: line_no });
            }
            continue;
        }

        if is_ident_start(c) {
            let start = i;
            i += 1;
            while i < n && is_ident_continue(chars[i]) {
                i += 1;
            }
            let ident: String = chars[start..i].iter().collect();

            // dotted/scoped compound form: A.B / A::B
            let mut j = i;
            let mut compound_end = i;
            let mut saw_scope = false;
            let mut segments: Vec<(usize, usize)> = vec![(start, i)];
            loop {
                if j < n && chars[j] == '.' && chars.get(j + 1).is_some_and(|c| is_ident_start(*c)) {
                    let part_start = j + 1;
                    let mut k = part_start + 1;
                    while k < n && is_ident_continue(chars[k]) {
                        k += 1;
                    }
                    j = k;
                    compound_end = k;
                    saw_scope = true;
                    segments.push((part_start, k));
                } else if j + 1 < n && chars[j] == ':' && chars[j + 1] == ':' && chars.get(j + 2).is_some_and(|c| is_ident_start(*c)) {
                    let part_start = j + 2;
                    let mut k = part_start + 1;
                    while k < n && is_ident_continue(chars[k]) {
                        k += 1;
                    }
                    j = k;
                    compound_end = k;
                    saw_scope = true;
                    segments.push((part_start, k));
                } else {
                    break;
                }
            }

            if saw_scope {
                let compound: String = chars[start..compound_end].iter().collect();
                if compound.len() <= max_len {
                    out.push(TokenOccurrence { key: compound, kind: TokenKind::Compound, line: line_no });
                }
                // §4.2: the dotted/scoped compound is emitted *in addition to*
                // its parts, so each segment still gets its own ident (and,
                // if itself camelCase/snake_case, its own compound+parts).
                for (seg_start, seg_end) in segments {
                    let segment: String = chars[seg_start..seg_end].iter().collect();
                    push_ident_and_parts(out, &segment, max_len, line_no);
                }
                i = compound_end;
                continue;
            }

            push_ident_and_parts(out, &ident, max_len, line_no);
            continue;
        }

        if !c.is_whitespace() && !c.is_alphanumeric() {
            // symbol: not indexed into postings, but still observed by callers
            // that want kind detection (e.g. block adapters deciding comment-ness).
            out.push(TokenOccurrence { key: c.to_string(), kind: TokenKind::Symbol, line: line_no });
        }
        i += 1;
    }
}

/// Tokenize an ordered sequence of lines (§4.2).
///
/// `in_word_context` should be true for markdown/text files (and comment
/// bodies) so bare `word` tokens are emitted; false for code where only
/// identifiers matter.
pub fn tokenize_lines(lines: &[String], in_word_context: bool) -> TokenizeResult {
    tokenize_lines_with_max_len(lines, in_word_context, DEFAULT_MAX_TOKEN_LEN)
}

pub fn tokenize_lines_with_max_len(lines: &[String], in_word_context: bool, max_len: usize) -> TokenizeResult {
    let mut occurrences = Vec::new();
    for (idx, line) in lines.iter().enumerate() {
        tokenize_line(line, (idx + 1) as u32, in_word_context, max_len, &mut occurrences);
    }
    let eligible_token_count = occurrences
        .iter()
        .filter(|o| matches!(o.kind, TokenKind::Ident | TokenKind::Word | TokenKind::Compound))
        .count() as u32;
    TokenizeResult { occurrences, eligible_token_count }
}

/// Tokenize a single query string (used by expansion, §4.8) — always in
/// word context so bare prose terms work, and lower-cases idents for lookup
/// convenience at the call site.
pub fn tokenize_query(text: &str) -> Vec<TokenOccurrence> {
    tokenize_lines_with_max_len(&[text.to_string()], true, DEFAULT_MAX_TOKEN_LEN).occurrences
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ident_basic() {
        let r = tokenize_lines(&["foo bar".to_string()], false);
        let keys: Vec<_> = r.occurrences.iter().map(|o| o.key.as_str()).collect();
        assert!(keys.contains(&"foo"));
        assert!(keys.contains(&"bar"));
    }

    #[test]
    fn camel_case_split() {
        let r = tokenize_lines(&["retryCount".to_string()], false);
        let idents: Vec<_> = r.occurrences.iter()
            .filter(|o| o.kind == TokenKind::Ident)
            .map(|o| o.key.as_str()).collect();
        assert!(idents.contains(&"retry"));
        assert!(idents.contains(&"Count"));
        let compounds: Vec<_> = r.occurrences.iter()
            .filter(|o| o.kind == TokenKind::Compound)
            .map(|o| o.key.as_str()).collect();
        assert!(compounds.contains(&"retryCount"));
    }

    #[test]
    fn snake_case_split() {
        let r = tokenize_lines(&["retry_count".to_string()], false);
        let idents: Vec<_> = r.occurrences.iter()
            .filter(|o| o.kind == TokenKind::Ident)
            .map(|o| o.key.as_str()).collect();
        assert!(idents.contains(&"retry"));
        assert!(idents.contains(&"count"));
    }

    #[test]
    fn dotted_compound() {
        let r = tokenize_lines(&["Retry.WithBackoff".to_string()], false);
        let compounds: Vec<_> = r.occurrences.iter()
            .filter(|o| o.kind == TokenKind::Compound)
            .map(|o| o.key.as_str()).collect();
        assert!(compounds.contains(&"Retry.WithBackoff"));

        // the compound is emitted *in addition to* its parts (§4.2), so a
        // query for either segment alone still matches.
        let idents: Vec<_> = r.occurrences.iter()
            .filter(|o| o.kind == TokenKind::Ident)
            .map(|o| o.key.as_str()).collect();
        assert!(idents.contains(&"Retry"));
        assert!(idents.contains(&"WithBackoff"));
    }

    #[test]
    fn scoped_compound() {
        let r = tokenize_lines(&["std::collections::HashMap".to_string()], false);
        let compounds: Vec<_> = r.occurrences.iter()
            .filter(|o| o.kind == TokenKind::Compound)
            .map(|o| o.key.as_str()).collect();
        assert!(compounds.iter().any(|c| c.contains("::")));

        let idents: Vec<_> = r.occurrences.iter()
            .filter(|o| o.kind == TokenKind::Ident)
            .map(|o| o.key.as_str()).collect();
        assert!(idents.contains(&"std"));
        assert!(idents.contains(&"collections"));
        assert!(idents.contains(&"HashMap"));
    }

    #[test]
    fn word_tokens_lowercased_in_markdown() {
        let r = tokenize_lines(&["Retry With Backoff".to_string()], true);
        let words: Vec<_> = r.occurrences.iter()
            .filter(|o| o.kind == TokenKind::Word)
            .map(|o| o.key.as_str()).collect();
        assert!(words.contains(&"retry"));
        assert!(words.contains(&"with"));
        assert!(words.contains(&"backoff"));
    }

    #[test]
    fn word_tokens_min_length_two() {
        let r = tokenize_lines(&["a bb ccc".to_string()], true);
        let words: Vec<_> = r.occurrences.iter()
            .filter(|o| o.kind == TokenKind::Word)
            .map(|o| o.key.as_str()).collect();
        assert!(!words.contains(&"a"));
        assert!(words.contains(&"bb"));
    }

    #[test]
    fn symbols_not_kept_as_ident_or_word() {
        let r = tokenize_lines(&["a + b".to_string()], false);
        assert!(r.occurrences.iter().any(|o| o.kind == TokenKind::Symbol && o.key == "+"));
    }

    #[test]
    fn eligible_count_excludes_symbols() {
        let r = tokenize_lines(&["foo + bar".to_string()], false);
        // foo, bar: 2 idents eligible; '+' symbol not eligible.
        assert_eq!(r.eligible_token_count, 2);
    }

    #[test]
    fn token_too_long_is_dropped() {
        let long = "a".repeat(200);
        let r = tokenize_lines_with_max_len(&[long.clone()], false, 128);
        assert!(r.occurrences.iter().all(|o| o.key != long));
    }

    proptest::proptest! {
        #[test]
        fn prop_word_tokens_always_lowercase(input in "\\PC{1,200}") {
            let r = tokenize_lines(&[input], true);
            for o in r.occurrences.iter().filter(|o| o.kind == TokenKind::Word) {
                proptest::prop_assert_eq!(&o.key, &o.key.to_lowercase());
            }
        }

        #[test]
        fn prop_deterministic(input in "\\PC{1,200}") {
            let r1 = tokenize_lines(&[input.clone()], true);
            let r2 = tokenize_lines(&[input], true);
            proptest::prop_assert_eq!(r1.occurrences.len(), r2.occurrences.len());
        }
    }
}
