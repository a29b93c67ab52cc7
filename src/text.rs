//! Pattern matching over rendered SQL text.
//!
//! Everything here works on canonical text produced by [`crate::render`]:
//! string literals are single quoted and keywords are upper case.

use std::sync::LazyLock;

use regex::Regex;

use crate::functions::{FUNCTIONS, FunctionSpec};

static FUNCTION_PATTERNS: LazyLock<Vec<(&'static FunctionSpec, Regex)>> = LazyLock::new(|| {
    FUNCTIONS
        .iter()
        .map(|function| {
            let pattern = Regex::new(&format!(r"(?i)\b{}\s*\(", function.name)).unwrap();
            (function, pattern)
        })
        .collect()
});

static CASE_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bCASE\b").unwrap());

/// Replaces the content of quoted string literals with spaces, keeping byte
/// offsets intact.
pub fn mask_string_literals(text: &str) -> String {
    let mut masked = String::with_capacity(text.len());
    let mut in_string = false;
    for c in text.chars() {
        if c == '\'' {
            // '' inside a literal toggles twice and stays masked
            in_string = !in_string;
            masked.push(c);
        } else if in_string {
            masked.extend(std::iter::repeat_n(' ', c.len_utf8()));
        } else {
            masked.push(c);
        }
    }
    masked
}

/// Replaces the content of backtick quoted identifiers with `_`, keeping the
/// backticks and byte offsets intact. String literals are left as they are.
pub fn mask_quoted_identifiers(text: &str) -> String {
    let mut masked = String::with_capacity(text.len());
    let mut in_string = false;
    let mut in_identifier = false;
    for c in text.chars() {
        match c {
            '\'' if !in_identifier => {
                in_string = !in_string;
                masked.push(c);
            }
            '`' if !in_string => {
                // `` inside an identifier toggles twice and stays masked
                in_identifier = !in_identifier;
                masked.push(c);
            }
            _ if in_identifier => masked.extend(std::iter::repeat_n('_', c.len_utf8())),
            _ => masked.push(c),
        }
    }
    masked
}

/// Replaces everything between a top-level pair of parentheses with spaces,
/// keeping the parentheses themselves and byte offsets intact.
pub fn mask_parenthesized(text: &str) -> String {
    let mut masked = String::with_capacity(text.len());
    let mut open = 0usize;
    for c in text.chars() {
        match c {
            '(' => {
                if open == 0 {
                    masked.push(c);
                } else {
                    masked.push(' ');
                }
                open += 1;
            }
            ')' if open > 0 => {
                open -= 1;
                if open == 0 {
                    masked.push(c);
                } else {
                    masked.push(' ');
                }
            }
            _ if open > 0 => masked.extend(std::iter::repeat_n(' ', c.len_utf8())),
            _ => masked.push(c),
        }
    }
    masked
}

/// Allow-listed functions called in `text`, in allow-list order.
pub fn functions_in_text(text: &str) -> Vec<&'static FunctionSpec> {
    let masked = mask_string_literals(text);
    FUNCTION_PATTERNS
        .iter()
        .filter(|(_, pattern)| pattern.is_match(&masked))
        .map(|(function, _)| *function)
        .collect()
}

pub fn calls_function(text: &str, name: &str) -> bool {
    let masked = mask_string_literals(text);
    FUNCTION_PATTERNS
        .iter()
        .any(|(function, pattern)| function.name == name && pattern.is_match(&masked))
}

pub fn mentions_case(text: &str) -> bool {
    CASE_PATTERN.is_match(&mask_string_literals(text))
}
