use thiserror::Error;

use super::{Matcher, MatcherType, Owner, OwnerType, Rule, TAG_PREFIX};

/// Parse ownership rule text into rules.
///
/// Each non-empty line that does not start with `#` is a rule of the form
/// `[type:]pattern owner...`, where the type defaults to `path` and owners
/// prefixed with `#` are teams. Patterns may be double-quoted, in which case
/// backslash escapes are decoded. Parsing stops at the first error.
pub fn parse_rules(source: &str) -> Result<Vec<Rule>, ParseError> {
    Parser::new(source).parse()
}

/// An error encountered while parsing ownership rules, with the location of
/// the offending input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (line {line}, column {column})")]
pub struct ParseError {
    pub message: String,
    /// 1-based line number.
    pub line: usize,
    /// 1-based column, counted in characters.
    pub column: usize,
    pub span: Span,
}

/// Start and end byte offsets of a span of rule text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span(pub usize, pub usize);

impl From<(usize, usize)> for Span {
    fn from((start, end): (usize, usize)) -> Self {
        Span(start, end)
    }
}

const MATCHER_TYPES: &[(&str, MatcherType)] = &[
    ("url", MatcherType::Url),
    ("path", MatcherType::Path),
    ("module", MatcherType::Module),
    ("codeowners", MatcherType::Codeowners),
];

struct Parser<'a> {
    source: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        Self { source, pos: 0 }
    }

    fn parse(mut self) -> Result<Vec<Rule>, ParseError> {
        let mut rules = Vec::new();
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some('\r' | '\n') => {
                    self.next();
                }
                Some('#') => self.skip_comment(),
                Some(_) => rules.push(self.parse_rule()?),
                None => break,
            }
        }
        Ok(rules)
    }

    fn skip_comment(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\r' || c == '\n' {
                break;
            }
            self.next();
        }
    }

    fn parse_rule(&mut self) -> Result<Rule, ParseError> {
        let kind = self.parse_matcher_type();
        let pattern = self.parse_pattern()?;

        let mut owners = Vec::new();
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some('\r' | '\n') | None => break,
                Some(_) => owners.push(self.parse_owner()?),
            }
        }
        if owners.is_empty() {
            return Err(self.error("expected owner", self.pos));
        }

        Ok(Rule::new(Matcher::new(kind, pattern), owners))
    }

    // An unrecognized prefix is not an error: it is part of a `path` pattern.
    fn parse_matcher_type(&mut self) -> MatcherType {
        let rest = &self.source[self.pos..];
        for (name, kind) in MATCHER_TYPES {
            if rest.strip_prefix(name).map_or(false, |r| r.starts_with(':')) {
                self.pos += name.len() + 1;
                return kind.clone();
            }
        }

        if let Some(tag) = rest.strip_prefix(TAG_PREFIX) {
            let name_len = tag
                .find(|c: char| c == ':' || c.is_whitespace())
                .unwrap_or(tag.len());
            if name_len > 0 && tag[name_len..].starts_with(':') {
                self.pos += TAG_PREFIX.len() + name_len + 1;
                return MatcherType::Tag(tag[..name_len].to_owned());
            }
        }

        MatcherType::Path
    }

    fn parse_pattern(&mut self) -> Result<String, ParseError> {
        if self.peek() == Some('"') {
            if let Some(pattern) = self.parse_quoted()? {
                return Ok(pattern);
            }
        }
        let pattern = self.parse_word();
        if pattern.is_empty() {
            return Err(self.error("expected pattern", self.pos));
        }
        Ok(pattern.to_owned())
    }

    // Returns `None`, without consuming anything, when the closing quote is
    // missing. The text is then read as an unquoted word.
    fn parse_quoted(&mut self) -> Result<Option<String>, ParseError> {
        let start = self.pos;
        let mut chars = self.source[start + 1..].char_indices();
        let mut raw_end = None;
        while let Some((i, c)) = chars.next() {
            match c {
                '"' => {
                    raw_end = Some(start + 1 + i);
                    break;
                }
                '\\' => {
                    chars.next();
                }
                '\r' | '\n' => break,
                _ => {}
            }
        }
        let Some(raw_end) = raw_end else {
            return Ok(None);
        };

        let raw = &self.source[start + 1..raw_end];
        let decoded = decode_escapes(raw)
            .map_err(|offset| self.error("invalid escape sequence", start + 1 + offset))?;
        self.pos = raw_end + 1;
        Ok(Some(decoded))
    }

    fn parse_owner(&mut self) -> Result<Owner, ParseError> {
        let kind = if self.eat('#') {
            OwnerType::Team
        } else {
            OwnerType::User
        };
        let identifier = self.parse_word();
        if identifier.is_empty() {
            return Err(self.error("expected owner", self.pos));
        }
        Ok(Owner::new(kind, identifier))
    }

    fn parse_word(&mut self) -> &'a str {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                break;
            }
            self.next();
        }
        &self.source[start..self.pos]
    }

    fn error(&self, message: impl Into<String>, pos: usize) -> ParseError {
        let before = &self.source[..pos];
        let line_start = before.rfind('\n').map_or(0, |i| i + 1);
        ParseError {
            message: message.into(),
            line: before.matches('\n').count() + 1,
            column: before[line_start..].chars().count() + 1,
            span: (pos, pos).into(),
        }
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.next();
            true
        } else {
            false
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(' ' | '\t') = self.peek() {
            self.next();
        }
    }

    fn peek(&self) -> Option<char> {
        self.source[self.pos..].chars().next()
    }

    fn next(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }
}

/// Decode the backslash escapes of a quoted pattern: the usual single
/// character escapes, `\xHH`, `\uHHHH`, `\UHHHHHHHH` and octal `\ooo`. Unknown
/// escapes are kept as written. On failure returns the byte offset of the
/// offending backslash.
fn decode_escapes(raw: &str) -> Result<String, usize> {
    let mut decoded = String::with_capacity(raw.len());
    let mut chars = raw.char_indices().peekable();
    while let Some((offset, c)) = chars.next() {
        if c != '\\' {
            decoded.push(c);
            continue;
        }
        let Some((_, escape)) = chars.next() else {
            return Err(offset);
        };
        let simple = match escape {
            '\\' => Some('\\'),
            '"' => Some('"'),
            '\'' => Some('\''),
            'n' => Some('\n'),
            't' => Some('\t'),
            'r' => Some('\r'),
            'a' => Some('\x07'),
            'b' => Some('\x08'),
            'f' => Some('\x0c'),
            'v' => Some('\x0b'),
            _ => None,
        };
        if let Some(c) = simple {
            decoded.push(c);
            continue;
        }

        let code = match escape {
            'x' | 'u' | 'U' => {
                let len = match escape {
                    'x' => 2,
                    'u' => 4,
                    _ => 8,
                };
                let mut digits = String::with_capacity(len);
                for _ in 0..len {
                    match chars.next_if(|(_, c)| c.is_ascii_hexdigit()) {
                        Some((_, c)) => digits.push(c),
                        None => return Err(offset),
                    }
                }
                u32::from_str_radix(&digits, 16).map_err(|_| offset)?
            }
            '0'..='7' => {
                let mut code = escape.to_digit(8).unwrap_or_default();
                for _ in 0..2 {
                    match chars.next_if(|(_, c)| c.is_digit(8)) {
                        Some((_, c)) => code = code * 8 + c.to_digit(8).unwrap_or_default(),
                        None => break,
                    }
                }
                code
            }
            other => {
                decoded.push('\\');
                decoded.push(other);
                continue;
            }
        };
        decoded.push(char::from_u32(code).ok_or(offset)?);
    }
    Ok(decoded)
}
