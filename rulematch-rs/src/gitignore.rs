//! CODEOWNERS path patterns.
//!
//! CODEOWNERS files follow `.gitignore` rules, which differ from the globs used
//! by ownership and grouping rules: a pattern without an inner slash may match
//! at any directory level, a trailing slash only matches directories, and a
//! trailing `/*` only matches direct children. These patterns are compiled by
//! [`path_to_regex`] and never by [`crate::glob`].

use regex::{Regex, RegexBuilder};
use tracing::warn;

use crate::glob::REGEX_SIZE_LIMIT;

/// A compiled CODEOWNERS path pattern.
#[derive(Debug, Clone)]
pub struct CodeownersPattern {
    pattern: String,
    regex: Option<Regex>,
}

impl CodeownersPattern {
    pub fn new(pattern: &str) -> CodeownersPattern {
        let pattern = pattern.trim();
        let regex = path_to_regex(pattern).and_then(|regex| {
            RegexBuilder::new(&regex)
                .size_limit(REGEX_SIZE_LIMIT)
                .build()
                .map_err(|err| warn!(pattern_len = pattern.len(), %err, "pattern never matches"))
                .ok()
        });
        CodeownersPattern {
            pattern: pattern.to_owned(),
            regex,
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Search `path` for a match. An empty pattern, or one too large to
    /// compile, matches nothing.
    pub fn is_match(&self, path: &str) -> bool {
        self.regex.as_ref().map_or(false, |re| re.is_match(path))
    }
}

pub fn codeowners_match(path: &str, pattern: &str) -> bool {
    CodeownersPattern::new(pattern).is_match(path)
}

/// Translate a CODEOWNERS path pattern into an (unanchored) regular
/// expression. Returns `None` for the empty pattern.
pub fn path_to_regex(pattern: &str) -> Option<String> {
    if pattern.is_empty() {
        return None;
    }
    // A leading backslash matches a file or directory literally named `\`
    if pattern.starts_with('\\') {
        return Some(r"\\(?:\z|/)".to_owned());
    }

    let chars = pattern.chars().collect::<Vec<_>>();
    let anchored = matches!(
        chars.iter().position(|&c| c == '/'),
        Some(pos) if pos != chars.len() - 1
    );
    let mut regex = String::from(if anchored { r"\A" } else { r"(?:\A|/)" });

    let matches_dir = chars.last() == Some(&'/');
    let mut end = chars.len();
    while matches_dir && end > 0 && chars[end - 1] == '/' {
        end -= 1;
    }
    let chars = &chars[..end];

    // `dir/*` only matches entries directly inside `dir`
    let trailing_slash_star = end > 1 && chars[end - 1] == '*' && chars[end - 2] == '/';

    let mut i = 0;
    // Anchored patterns may or may not start with a slash
    if anchored && chars.first() == Some(&'/') {
        regex.push_str("/?");
        i = 1;
    }

    while i < chars.len() {
        match chars[i] {
            '*' if chars.get(i + 1) == Some(&'*') => {
                let left_bounded = i == 0 || chars[i - 1] == '/';
                let right_bounded = matches!(chars.get(i + 2), None | Some('/'));
                if left_bounded && right_bounded {
                    // The separator after `**` is consumed along with it
                    regex.push_str(".*");
                    i += 3;
                } else {
                    regex.push_str("[^/]*");
                    i += 1;
                }
            }
            '*' => {
                regex.push_str("[^/]*");
                i += 1;
            }
            '?' => {
                regex.push_str("[^/]");
                i += 1;
            }
            c => {
                if regex_syntax::is_meta_character(c) {
                    regex.push('\\');
                }
                regex.push(c);
                i += 1;
            }
        }
    }

    if matches_dir {
        regex.push('/');
    } else if trailing_slash_star {
        regex.push_str(r"\z");
    } else {
        regex.push_str(r"(?:\z|/)");
    }
    Some(regex)
}
