use std::borrow::Cow;

use memchr::memmem;
use tracing::warn;

/// Upper bound on the compiled size of a pattern's regex. Patterns past it
/// match nothing.
pub const REGEX_SIZE_LIMIT: usize = 10 * (1 << 20);

/// Flags controlling how a glob pattern is compiled and matched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct GlobOptions {
    /// Treat a `**` path segment as "any number of segments" and keep `*`
    /// inside a single segment.
    pub doublestar: bool,
    /// Compare the lowercased pattern against the lowercased value.
    pub ignorecase: bool,
    /// Treat `\` as `/` and also try the value with a leading `/`.
    pub path_normalize: bool,
}

impl GlobOptions {
    pub const fn new() -> Self {
        Self {
            doublestar: false,
            ignorecase: false,
            path_normalize: false,
        }
    }

    pub const fn doublestar(mut self, yes: bool) -> Self {
        self.doublestar = yes;
        self
    }

    pub const fn ignorecase(mut self, yes: bool) -> Self {
        self.ignorecase = yes;
        self
    }

    pub const fn path_normalize(mut self, yes: bool) -> Self {
        self.path_normalize = yes;
        self
    }
}

/// A compiled glob pattern. Any string is a valid glob, so compilation never
/// fails.
#[derive(Debug, Clone)]
pub struct Glob {
    pattern: String,
    options: GlobOptions,
    condition: MatchCondition,
}

impl Glob {
    pub fn new(pattern: &str, options: GlobOptions) -> Glob {
        let mut normalized = if options.ignorecase {
            pattern.to_lowercase()
        } else {
            pattern.to_owned()
        };
        if options.path_normalize {
            normalized = normalized.replace('\\', "/");
        }
        let condition = MatchCondition::new(&normalized, options.doublestar);
        Glob {
            pattern: pattern.to_owned(),
            options,
            condition,
        }
    }

    /// The pattern as written, before case folding or normalization.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn options(&self) -> GlobOptions {
        self.options
    }

    pub fn is_match(&self, value: &str) -> bool {
        let mut value = Cow::Borrowed(value);
        if self.options.ignorecase {
            value = Cow::Owned(value.to_lowercase());
        }
        if self.options.path_normalize && value.contains('\\') {
            value = Cow::Owned(value.replace('\\', "/"));
        }

        if self.condition.is_match(&value) {
            return true;
        }
        self.options.path_normalize
            && !value.starts_with('/')
            && self.condition.is_match(&format!("/{value}"))
    }
}

/// Compile and match in one go. Prefer holding on to a [`Glob`] when the same
/// pattern is used repeatedly.
pub fn glob_match(value: &str, pattern: &str, options: GlobOptions) -> bool {
    Glob::new(pattern, options).is_match(value)
}

// Most patterns in rule files are literals or have a single leading or
// trailing star, so we avoid the regex engine for those.
#[derive(Debug, Clone)]
enum MatchCondition {
    Never,
    Unconditional,
    Literal(String),
    Prefix(String),
    Suffix(String),
    Contains(String),
    Regex(regex::Regex),
}

impl MatchCondition {
    fn new(glob: &str, doublestar: bool) -> Self {
        let has_specials = glob.contains(|c| matches!(c, '?' | '[' | '\\'));
        if has_specials || (doublestar && glob.contains('*')) {
            return compile(glob, doublestar);
        }

        let inner = glob.trim_matches('*');
        if inner.contains('*') {
            return compile(glob, doublestar);
        }
        if inner.is_empty() && !glob.is_empty() {
            return Self::Unconditional;
        }

        match (glob.starts_with('*'), glob.ends_with('*')) {
            (false, false) => Self::Literal(inner.to_owned()),
            (false, true) => Self::Prefix(inner.to_owned()),
            (true, false) => Self::Suffix(inner.to_owned()),
            (true, true) => Self::Contains(inner.to_owned()),
        }
    }

    fn is_match(&self, candidate: &str) -> bool {
        match self {
            Self::Never => false,
            Self::Unconditional => true,
            Self::Literal(literal) => candidate == literal,
            Self::Prefix(prefix) => candidate.starts_with(prefix.as_str()),
            Self::Suffix(suffix) => candidate.ends_with(suffix.as_str()),
            Self::Contains(needle) => {
                memmem::find(candidate.as_bytes(), needle.as_bytes()).is_some()
            }
            Self::Regex(re) => re.is_match(candidate),
        }
    }
}

fn compile(glob: &str, doublestar: bool) -> MatchCondition {
    let regex = translate(glob, doublestar);
    match regex::RegexBuilder::new(&regex)
        .size_limit(REGEX_SIZE_LIMIT)
        .build()
    {
        Ok(re) => MatchCondition::Regex(re),
        Err(err) => {
            warn!(pattern_len = glob.len(), %err, "glob never matches");
            MatchCondition::Never
        }
    }
}

/// Translate a glob into an anchored regular expression.
///
/// Without `doublestar`, `*` matches any run of characters, separators
/// included. With `doublestar`, `*` stays within one path segment and a `**`
/// segment spans any number of segments (`**/` may match none at all). `?`
/// never matches `/`. `[...]` is a character class (`[!...]` negates) and
/// `\` escapes the next character.
pub fn translate(pattern: &str, doublestar: bool) -> String {
    let chars = pattern.chars().collect::<Vec<_>>();
    let mut regex = String::from(r"(?s)\A");
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        i += 1;
        match c {
            '*' if doublestar && chars.get(i) == Some(&'*') => {
                let segment_start = i == 1 || chars[i - 2] == '/';
                match chars.get(i + 1) {
                    None if segment_start => {
                        regex.push_str(".*");
                        i += 1;
                    }
                    Some('/') if segment_start => {
                        regex.push_str("(?:.*/)?");
                        i += 2;
                    }
                    _ => {
                        while chars.get(i) == Some(&'*') {
                            i += 1;
                        }
                        regex.push_str("[^/]*");
                    }
                }
            }
            '*' if doublestar => regex.push_str("[^/]*"),
            '*' => regex.push_str(".*"),
            '?' => regex.push_str("[^/]"),
            '[' => match translate_class(&chars[i..]) {
                Some((class, consumed)) => {
                    regex.push_str(&class);
                    i += consumed;
                }
                None => regex.push_str(r"\["),
            },
            '\\' => match chars.get(i) {
                Some(&escaped) => {
                    push_literal(&mut regex, escaped);
                    i += 1;
                }
                None => regex.push_str(r"\\"),
            },
            _ => push_literal(&mut regex, c),
        }
    }
    regex.push_str(r"\z");
    regex
}

// Translates the body of a `[...]` class, starting right after the opening
// bracket. Returns the regex class and the number of pattern characters
// consumed (closing bracket included), or `None` if the class is never closed.
fn translate_class(chars: &[char]) -> Option<(String, usize)> {
    let mut j = 0;
    let negated = chars.first() == Some(&'!');
    if negated {
        j += 1;
    }
    // A `]` right after the opening bracket is a literal member
    if chars.get(j) == Some(&']') {
        j += 1;
    }
    let close = j + chars[j.min(chars.len())..].iter().position(|&c| c == ']')?;
    let body = &chars[usize::from(negated)..close];

    let mut members = String::new();
    let mut k = 0;
    while k < body.len() {
        if k + 2 < body.len() && body[k + 1] == '-' {
            let (lo, hi) = (body[k], body[k + 2]);
            // Empty ranges match nothing
            if lo <= hi {
                push_class_member(&mut members, lo);
                members.push('-');
                push_class_member(&mut members, hi);
            }
            k += 3;
        } else {
            push_class_member(&mut members, body[k]);
            k += 1;
        }
    }

    let class = match (members.is_empty(), negated) {
        (true, true) => ".".to_owned(),
        (true, false) => r"[^\s\S]".to_owned(),
        (false, true) => format!("[^{members}]"),
        (false, false) => format!("[{members}]"),
    };
    Some((class, close + 1))
}

fn push_class_member(class: &mut String, c: char) {
    if regex_syntax::is_meta_character(c) {
        class.push('\\');
    }
    class.push(c);
}

fn push_literal(regex: &mut String, c: char) {
    if regex_syntax::is_meta_character(c) {
        regex.push('\\');
    }
    regex.push(c);
}
