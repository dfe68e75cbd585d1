use crate::error::EnhancerError;

use super::{matchers::Match, registry::MatcherRegistry};

/// Parse a line of matcher expressions such as
/// `path:**/vendor/** [ function:main ] | !app:yes`.
pub fn parse_matchers(source: &str, registry: &MatcherRegistry) -> Result<Vec<Match>, EnhancerError> {
    Parser::new(source, registry).parse()
}

struct Parser<'a> {
    source: &'a str,
    pos: usize,
    registry: &'a MatcherRegistry,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str, registry: &'a MatcherRegistry) -> Self {
        Self {
            source,
            pos: 0,
            registry,
        }
    }

    fn parse(mut self) -> Result<Vec<Match>, EnhancerError> {
        let mut matchers = Vec::new();
        loop {
            self.skip_whitespace();
            if self.peek().is_none() {
                break;
            }
            matchers.push(self.parse_matcher()?);
        }
        if matchers.is_empty() {
            return Err(self.error("expected matcher"));
        }
        Ok(matchers)
    }

    fn parse_matcher(&mut self) -> Result<Match, EnhancerError> {
        match self.peek() {
            Some('[') => {
                self.next();
                let inner = self.parse_bracketed()?;
                self.skip_whitespace();
                self.expect('|')?;
                Ok(Match::Caller(Box::new(inner)))
            }
            Some('|') => {
                self.next();
                self.skip_whitespace();
                self.expect('[')?;
                let inner = self.parse_bracketed()?;
                Ok(Match::Callee(Box::new(inner)))
            }
            _ => self.parse_frame_matcher(),
        }
    }

    // Parses `<matcher> ]`, the opening bracket having been consumed.
    fn parse_bracketed(&mut self) -> Result<Match, EnhancerError> {
        self.skip_whitespace();
        let inner = self.parse_matcher()?;
        self.skip_whitespace();
        self.expect(']')?;
        Ok(inner)
    }

    fn parse_frame_matcher(&mut self) -> Result<Match, EnhancerError> {
        let negated = self.eat('!');
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' || c == '.' {
                self.next();
            } else {
                break;
            }
        }
        let key = &self.source[start..self.pos];
        if key.is_empty() {
            return Err(self.error("expected matcher key"));
        }
        if !self.eat(':') {
            return Err(self.error("expected ':'"));
        }

        let pattern = self.parse_argument()?;
        let frame_match = self.registry.frame_match(key, &pattern, negated)?;
        Ok(Match::Frame(frame_match))
    }

    fn parse_argument(&mut self) -> Result<String, EnhancerError> {
        let mut arg = String::new();
        if self.eat('"') {
            loop {
                match self.next() {
                    Some('"') => return Ok(arg),
                    Some('\\') => match self.peek() {
                        Some(c @ ('"' | '\\')) => {
                            self.next();
                            arg.push(c);
                        }
                        _ => arg.push('\\'),
                    },
                    Some(c) => arg.push(c),
                    None => return Err(self.error("unterminated quoted argument")),
                }
            }
        }

        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                break;
            }
            arg.push(c);
            self.next();
        }
        if arg.is_empty() {
            return Err(self.error("expected argument"));
        }
        Ok(arg)
    }

    fn expect(&mut self, expected: char) -> Result<(), EnhancerError> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{expected}'")))
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

    fn error(&self, message: impl Into<String>) -> EnhancerError {
        EnhancerError::InvalidSyntax {
            message: message.into(),
            column: self.source[..self.pos].chars().count() + 1,
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

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(source: &str) -> Result<Vec<String>, EnhancerError> {
        let registry = MatcherRegistry::new();
        parse_matchers(source, &registry)
            .map(|matchers| matchers.iter().map(Match::to_config_structure).collect())
    }

    #[test]
    fn test_parser() {
        let examples = [
            ("function:main", vec!["fmain"]),
            ("  stack.function:main  ", vec!["fmain"]),
            ("path:**/*.py !app:yes", vec!["p**/*.py", "!a1"]),
            ("family:native,javascript", vec!["FNJ"]),
            ("[ function:main ] | module:app", vec!["[fmain]|", "mapp"]),
            ("module:app | [ !function:helper ]", vec!["mapp", "|[!fhelper]"]),
            ("[ [ function:a ] | ] |", vec!["[[fa]|]|"]),
            ("value:\"two words\"", vec!["vtwo words"]),
            ("value:\"say \\\"hi\\\"\"", vec!["vsay \"hi\""]),
            ("function:a\\*b", vec!["fa\\*b"]),
        ];

        for (source, expected) in examples {
            assert_eq!(
                encoded(source).unwrap(),
                expected,
                "result mismatch for `{}`",
                source
            );
        }
    }

    #[test]
    fn test_parse_errors() {
        let examples = [
            ("", "expected matcher", 1),
            ("function", "expected ':'", 9),
            ("function:", "expected argument", 10),
            (":main", "expected matcher key", 1),
            ("[ function:main ]", "expected '|'", 18),
            ("[ function:main |", "expected ']'", 17),
            ("| function:main", "expected '['", 3),
            ("value:\"open", "unterminated quoted argument", 12),
        ];

        for (source, message, column) in examples {
            assert_eq!(
                encoded(source).unwrap_err(),
                EnhancerError::InvalidSyntax {
                    message: message.to_owned(),
                    column,
                },
                "error mismatch for `{}`",
                source
            );
        }
    }

    #[test]
    fn test_unknown_key() {
        assert_eq!(
            encoded("filename:foo.py").unwrap_err(),
            EnhancerError::UnknownMatcher {
                key: "filename".into()
            }
        );
    }
}
