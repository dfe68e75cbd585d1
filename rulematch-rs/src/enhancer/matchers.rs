use std::{collections::BTreeSet, fmt, sync::Arc};

use crate::{
    cache::{CacheOp, MatchCache},
    error::EnhancerError,
    glob::{Glob, GlobOptions},
};

use super::{
    frame::{ExceptionData, MatchFrame},
    registry::MatcherRegistry,
};

/// The frame or exception field a [`FrameMatch`] inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MatchField {
    Path,
    Function,
    Module,
    Family,
    Package,
    App,
    Type,
    Value,
    Mechanism,
    Category,
}

impl MatchField {
    pub const ALL: [MatchField; 10] = [
        MatchField::Path,
        MatchField::Function,
        MatchField::Module,
        MatchField::Family,
        MatchField::Package,
        MatchField::App,
        MatchField::Type,
        MatchField::Value,
        MatchField::Mechanism,
        MatchField::Category,
    ];

    /// Look up a field by matcher key. Accepts the short field names as well
    /// as the `stack.*` and `error.*` aliases.
    pub fn from_key(key: &str) -> Option<MatchField> {
        let field = match key {
            "path" | "stack.abs_path" => MatchField::Path,
            "function" | "stack.function" => MatchField::Function,
            "module" | "stack.module" => MatchField::Module,
            "package" | "stack.package" => MatchField::Package,
            "type" | "error.type" => MatchField::Type,
            "value" | "error.value" => MatchField::Value,
            "mechanism" | "error.mechanism" => MatchField::Mechanism,
            "family" => MatchField::Family,
            "app" => MatchField::App,
            "category" => MatchField::Category,
            _ => return None,
        };
        Some(field)
    }

    pub fn name(self) -> &'static str {
        match self {
            MatchField::Path => "path",
            MatchField::Function => "function",
            MatchField::Module => "module",
            MatchField::Family => "family",
            MatchField::Package => "package",
            MatchField::App => "app",
            MatchField::Type => "type",
            MatchField::Value => "value",
            MatchField::Mechanism => "mechanism",
            MatchField::Category => "category",
        }
    }

    /// One-character code used in the compact encoding.
    pub fn code(self) -> char {
        match self {
            MatchField::Path => 'p',
            MatchField::Function => 'f',
            MatchField::Module => 'm',
            MatchField::Family => 'F',
            MatchField::Package => 'P',
            MatchField::App => 'a',
            MatchField::Type => 't',
            MatchField::Value => 'v',
            MatchField::Mechanism => 'M',
            MatchField::Category => 'c',
        }
    }

    pub fn from_code(code: char) -> Option<MatchField> {
        MatchField::ALL.into_iter().find(|field| field.code() == code)
    }
}

impl fmt::Display for MatchField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

const FAMILIES: &[(&str, char)] = &[("native", 'N'), ("javascript", 'J'), ("all", 'a')];

fn family_code(family: &str) -> Option<char> {
    FAMILIES
        .iter()
        .find(|(name, _)| *name == family)
        .map(|&(_, code)| code)
}

fn family_name(code: char) -> Option<&'static str> {
    FAMILIES
        .iter()
        .find(|(_, c)| *c == code)
        .map(|&(name, _)| name)
}

/// Parse a rule boolean. Anything unrecognized is `None`.
pub fn rule_bool(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "1" | "yes" | "true" => Some(true),
        "0" | "no" | "false" => Some(false),
        _ => None,
    }
}

const UNKNOWN: &str = "<unknown>";

/// Everything a matcher may look at besides the frame index.
#[derive(Debug, Clone, Copy)]
pub struct FrameContext<'a> {
    pub frames: &'a [MatchFrame],
    pub platform: &'a str,
    pub exception: &'a ExceptionData,
}

#[derive(Debug)]
enum FieldTest {
    PathLike(Glob),
    Glob(Glob),
    Family(BTreeSet<String>),
    InApp(Option<bool>),
}

/// A matcher on a single field of the frame at the evaluated index.
///
/// Instances are immutable; obtain them through a [`MatcherRegistry`] so that
/// each distinct (field, pattern, negated) triple is compiled once.
#[derive(Debug)]
pub struct FrameMatch {
    field: MatchField,
    pattern: String,
    negated: bool,
    test: FieldTest,
}

impl FrameMatch {
    pub fn new(field: MatchField, pattern: &str, negated: bool) -> FrameMatch {
        let (pattern, test) = match field {
            MatchField::Path | MatchField::Package => {
                let pattern = pattern.to_lowercase();
                let glob = Glob::new(
                    &pattern,
                    GlobOptions::new().doublestar(true).path_normalize(true),
                );
                (pattern, FieldTest::PathLike(glob))
            }
            MatchField::Family => (
                pattern.to_owned(),
                FieldTest::Family(pattern.split(',').map(str::to_owned).collect()),
            ),
            MatchField::App => (pattern.to_owned(), FieldTest::InApp(rule_bool(pattern))),
            _ => (
                pattern.to_owned(),
                FieldTest::Glob(Glob::new(pattern, GlobOptions::new())),
            ),
        };
        FrameMatch {
            field,
            pattern,
            negated,
            test,
        }
    }

    pub fn field(&self) -> MatchField {
        self.field
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn negated(&self) -> bool {
        self.negated
    }

    pub fn matches_frame(&self, ctx: &FrameContext<'_>, idx: usize, cache: &mut MatchCache) -> bool {
        let matched = ctx
            .frames
            .get(idx)
            .map_or(false, |frame| self.positive_match(frame, ctx.exception, cache));
        matched != self.negated
    }

    fn positive_match(
        &self,
        frame: &MatchFrame,
        exception: &ExceptionData,
        cache: &mut MatchCache,
    ) -> bool {
        match &self.test {
            FieldTest::PathLike(glob) => {
                let value = match self.field {
                    MatchField::Package => frame.package.as_deref(),
                    _ => frame.path.as_deref(),
                };
                value.map_or(false, |value| {
                    cache.glob_match(CacheOp::PathLikeMatch, glob, value)
                })
            }
            FieldTest::Family(families) => {
                families.contains("all")
                    || frame
                        .family
                        .as_ref()
                        .map_or(false, |family| families.contains(family))
            }
            FieldTest::InApp(expected) => expected.is_some() && *expected == frame.in_app,
            FieldTest::Glob(glob) => {
                let value = match self.field {
                    MatchField::Function => frame.function.as_deref(),
                    MatchField::Module => frame.module.as_deref(),
                    MatchField::Category => frame.category.as_deref(),
                    // Missing exception data can be matched with `<unknown>`
                    _ => Some(exception_field(self.field, exception).unwrap_or(UNKNOWN)),
                };
                value.map_or(false, |value| {
                    cache.glob_match(CacheOp::GlobMatch, glob, value)
                })
            }
        }
    }

    /// Compact encoding: `[!]<field code><argument>`.
    pub fn to_config_structure(&self) -> String {
        let arg = match self.field {
            MatchField::Family => self.pattern.split(',').filter_map(family_code).collect(),
            MatchField::App => match rule_bool(&self.pattern) {
                Some(true) => "1".to_owned(),
                Some(false) => "0".to_owned(),
                None => String::new(),
            },
            _ => self.pattern.clone(),
        };
        let negation = if self.negated { "!" } else { "" };
        format!("{negation}{}{arg}", self.field.code())
    }

    pub fn description(&self) -> String {
        let negation = if self.negated { "!" } else { "" };
        let bare = self
            .pattern
            .split_whitespace()
            .eq(std::iter::once(self.pattern.as_str()));
        if bare {
            format!("{negation}{}:{}", self.field, self.pattern)
        } else {
            format!("{negation}{}:\"{}\"", self.field, self.pattern)
        }
    }
}

fn exception_field(field: MatchField, exception: &ExceptionData) -> Option<&str> {
    let value = match field {
        MatchField::Type => exception.ty.as_deref(),
        MatchField::Value => exception.value.as_deref(),
        MatchField::Mechanism => exception.mechanism_type.as_deref(),
        _ => None,
    };
    value.filter(|v| !v.is_empty())
}

/// A frame matcher, possibly shifted to the caller or callee of the evaluated
/// frame. Frames are ordered as in event payloads, callers first, so the
/// caller of frame `idx` sits at `idx - 1` and its callee at `idx + 1`.
#[derive(Debug, Clone)]
pub enum Match {
    Frame(Arc<FrameMatch>),
    Caller(Box<Match>),
    Callee(Box<Match>),
}

impl Match {
    pub fn matches_frame(&self, ctx: &FrameContext<'_>, idx: usize, cache: &mut MatchCache) -> bool {
        match self {
            Match::Frame(inner) => inner.matches_frame(ctx, idx, cache),
            Match::Caller(inner) => idx > 0 && inner.matches_frame(ctx, idx - 1, cache),
            Match::Callee(inner) => {
                idx + 1 < ctx.frames.len() && inner.matches_frame(ctx, idx + 1, cache)
            }
        }
    }

    pub fn to_config_structure(&self) -> String {
        match self {
            Match::Frame(inner) => inner.to_config_structure(),
            Match::Caller(inner) => format!("[{}]|", inner.to_config_structure()),
            Match::Callee(inner) => format!("|[{}]", inner.to_config_structure()),
        }
    }

    /// Decode the compact form produced by [`Match::to_config_structure`],
    /// compiling frame matchers through `registry`.
    pub fn from_config_structure(
        encoded: &str,
        registry: &MatcherRegistry,
    ) -> Result<Match, EnhancerError> {
        if let Some(inner) = encoded.strip_prefix("|[").and_then(|s| s.strip_suffix(']')) {
            let inner = Match::from_config_structure(inner, registry)?;
            return Ok(Match::Callee(Box::new(inner)));
        }
        if let Some(inner) = encoded.strip_prefix('[').and_then(|s| s.strip_suffix("]|")) {
            let inner = Match::from_config_structure(inner, registry)?;
            return Ok(Match::Caller(Box::new(inner)));
        }

        let (negated, rest) = match encoded.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, encoded),
        };
        let mut chars = rest.chars();
        let code = chars.next().ok_or_else(|| EnhancerError::UnknownMatcher {
            key: String::new(),
        })?;
        let field = MatchField::from_code(code).ok_or_else(|| EnhancerError::UnknownMatcher {
            key: code.to_string(),
        })?;
        let arg = chars.as_str();
        let pattern = match field {
            MatchField::Family => arg.chars().filter_map(family_name).collect::<Vec<_>>().join(","),
            _ => arg.to_owned(),
        };
        Ok(Match::Frame(registry.get_or_compile(field, &pattern, negated)))
    }

    pub fn description(&self) -> String {
        match self {
            Match::Frame(inner) => inner.description(),
            Match::Caller(inner) => format!("[ {} ] |", inner.description()),
            Match::Callee(inner) => format!("| [ {} ]", inner.description()),
        }
    }
}

impl fmt::Display for Match {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description())
    }
}
