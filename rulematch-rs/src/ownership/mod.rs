//! Issue ownership rules: `type:pattern owner...` lines that assign events to
//! users and teams.

pub mod codeowners;
pub mod parser;
pub mod resolver;
pub mod schema;

use std::{fmt, str::FromStr};

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::OwnershipError,
    event::{find_stack_frames, tag_alias, DefaultMunger, FrameData, FrameMunger},
    gitignore::CodeownersPattern,
    glob::{Glob, GlobOptions},
};

/// Version of the JSON schema produced by [`schema::dump_schema`].
pub const VERSION: u32 = 1;

const TAG_PREFIX: &str = "tags.";

/// What part of an event a [`Matcher`] looks at.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum MatcherType {
    Url,
    Path,
    Module,
    Codeowners,
    /// `tags.<name>`
    Tag(String),
}

impl FromStr for MatcherType {
    type Err = OwnershipError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "url" => Ok(MatcherType::Url),
            "path" => Ok(MatcherType::Path),
            "module" => Ok(MatcherType::Module),
            "codeowners" => Ok(MatcherType::Codeowners),
            _ => match s.strip_prefix(TAG_PREFIX) {
                Some(name) if !name.is_empty() => Ok(MatcherType::Tag(name.to_owned())),
                _ => Err(OwnershipError::UnknownMatcherType(s.to_owned())),
            },
        }
    }
}

impl TryFrom<String> for MatcherType {
    type Error = OwnershipError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<MatcherType> for String {
    fn from(kind: MatcherType) -> Self {
        kind.to_string()
    }
}

impl fmt::Display for MatcherType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatcherType::Url => f.write_str("url"),
            MatcherType::Path => f.write_str("path"),
            MatcherType::Module => f.write_str("module"),
            MatcherType::Codeowners => f.write_str("codeowners"),
            MatcherType::Tag(name) => write!(f, "{TAG_PREFIX}{name}"),
        }
    }
}

#[derive(Debug, Clone)]
enum CompiledPattern {
    Glob(Glob),
    Codeowners(CodeownersPattern),
}

impl CompiledPattern {
    fn is_match(&self, value: &str) -> bool {
        match self {
            CompiledPattern::Glob(glob) => glob.is_match(value),
            CompiledPattern::Codeowners(pattern) => pattern.is_match(value),
        }
    }
}

/// A `type:pattern` pair tested against a whole event.
///
/// The pattern is compiled on first use and kept for the lifetime of the
/// matcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Matcher {
    #[serde(rename = "type")]
    kind: MatcherType,
    pattern: String,
    #[serde(skip)]
    compiled: OnceCell<CompiledPattern>,
}

impl Matcher {
    pub fn new(kind: MatcherType, pattern: impl Into<String>) -> Matcher {
        Matcher {
            kind,
            pattern: pattern.into(),
            compiled: OnceCell::new(),
        }
    }

    pub fn kind(&self) -> &MatcherType {
        &self.kind
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    fn compiled(&self) -> &CompiledPattern {
        self.compiled.get_or_init(|| {
            let options = GlobOptions::new().ignorecase(true);
            match self.kind {
                MatcherType::Codeowners => {
                    CompiledPattern::Codeowners(CodeownersPattern::new(&self.pattern))
                }
                MatcherType::Path | MatcherType::Module => {
                    CompiledPattern::Glob(Glob::new(&self.pattern, options.path_normalize(true)))
                }
                MatcherType::Url | MatcherType::Tag(_) => {
                    CompiledPattern::Glob(Glob::new(&self.pattern, options))
                }
            }
        })
    }

    /// Test an event, using [`DefaultMunger`] to find filenames.
    pub fn test(&self, event: &Value) -> bool {
        self.test_with(event, &DefaultMunger)
    }

    pub fn test_with<M: FrameMunger + ?Sized>(&self, event: &Value, munger: &M) -> bool {
        match &self.kind {
            MatcherType::Url => self.test_url(event),
            MatcherType::Path | MatcherType::Codeowners => {
                let (frames, keys) = munger.munge(event);
                self.test_frames(&frames, keys.as_slice())
            }
            MatcherType::Module => self.test_frames(&find_stack_frames(event), &["module"][..]),
            MatcherType::Tag(name) => self.test_tag(event, name),
        }
    }

    fn test_url(&self, event: &Value) -> bool {
        event
            .pointer("/request/url")
            .and_then(Value::as_str)
            .filter(|url| !url.is_empty())
            .map_or(false, |url| self.compiled().is_match(url))
    }

    fn test_frames<K: AsRef<str>>(&self, frames: &[FrameData], keys: &[K]) -> bool {
        let compiled = self.compiled();
        frames.iter().any(|frame| {
            keys.iter().any(|key| {
                frame
                    .get(key.as_ref())
                    .and_then(Value::as_str)
                    .filter(|value| !value.is_empty())
                    .map_or(false, |value| compiled.is_match(value))
            })
        })
    }

    fn test_tag(&self, event: &Value, tag: &str) -> bool {
        let compiled = self.compiled();
        let field_matches = |name: &str, value: &Value| {
            value.as_str().map_or(false, |value| {
                tag.strip_suffix(name)
                    .map_or(false, |rest| rest.ends_with('.'))
                    && compiled.is_match(value)
            })
        };

        // The user interface is inspected before the `user` tags. Unknown
        // user fields are collected under `data`, one level deeper.
        if tag.starts_with("user.") {
            if let Some(user) = event.get("user").and_then(Value::as_object) {
                for (key, value) in user {
                    if field_matches(key.as_str(), value) {
                        return true;
                    }
                    if key == "data"
                        && value.as_object().map_or(false, |data| {
                            data.iter().any(|(k, v)| field_matches(k.as_str(), v))
                        })
                    {
                        return true;
                    }
                }
            }
        }

        let alias = tag_alias(tag);
        event_tags(event).any(|(key, value)| (key == tag || key == alias) && compiled.is_match(value))
    }
}

// Tags are stored as `[key, value]` pairs, but a plain object is accepted too.
fn event_tags(event: &Value) -> impl Iterator<Item = (&str, &str)> {
    let tags = event.get("tags");
    let pairs = tags
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|pair| match pair.as_array()?.as_slice() {
            [key, value] => Some((key.as_str()?, value.as_str()?)),
            _ => None,
        });
    let object = tags
        .and_then(Value::as_object)
        .into_iter()
        .flatten()
        .filter_map(|(key, value)| Some((key.as_str(), value.as_str()?)));
    pairs.chain(object)
}

impl PartialEq for Matcher {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.pattern == other.pattern
    }
}

impl Eq for Matcher {}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.kind)?;
        if needs_quoting(&self.pattern) {
            write!(f, "\"{}\"", self.pattern.replace('\\', "\\\\").replace('"', "\\\""))
        } else {
            f.write_str(&self.pattern)
        }
    }
}

fn needs_quoting(pattern: &str) -> bool {
    pattern.is_empty() || pattern.starts_with('"') || pattern.contains(char::is_whitespace)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OwnerType {
    User,
    Team,
}

/// A user or team named by a rule. User identifiers are lowercased on
/// construction; team slugs are kept as written.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "OwnerRepr")]
pub struct Owner {
    #[serde(rename = "type")]
    kind: OwnerType,
    identifier: String,
}

#[derive(Deserialize)]
struct OwnerRepr {
    #[serde(rename = "type")]
    kind: OwnerType,
    identifier: String,
}

impl From<OwnerRepr> for Owner {
    fn from(repr: OwnerRepr) -> Self {
        Owner::new(repr.kind, repr.identifier)
    }
}

impl Owner {
    pub fn new(kind: OwnerType, identifier: impl Into<String>) -> Owner {
        let identifier = identifier.into();
        let identifier = match kind {
            OwnerType::User => identifier.to_lowercase(),
            OwnerType::Team => identifier,
        };
        Owner { kind, identifier }
    }

    pub fn user(identifier: impl Into<String>) -> Owner {
        Owner::new(OwnerType::User, identifier)
    }

    pub fn team(identifier: impl Into<String>) -> Owner {
        Owner::new(OwnerType::Team, identifier)
    }

    pub fn kind(&self) -> OwnerType {
        self.kind
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            OwnerType::User => f.write_str(&self.identifier),
            OwnerType::Team => write!(f, "#{}", self.identifier),
        }
    }
}

/// One line of an ownership file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub matcher: Matcher,
    pub owners: Vec<Owner>,
}

impl Rule {
    pub fn new(matcher: Matcher, owners: Vec<Owner>) -> Rule {
        Rule { matcher, owners }
    }

    pub fn test(&self, event: &Value) -> bool {
        self.matcher.test(event)
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.matcher)?;
        for owner in &self.owners {
            write!(f, " {owner}")?;
        }
        Ok(())
    }
}
