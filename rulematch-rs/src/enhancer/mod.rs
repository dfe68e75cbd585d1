//! Stack frame matchers used by grouping enhancement rules.
//!
//! A matcher inspects one field of the frame at a given index, optionally
//! shifted to its caller or callee. Matchers are compiled once per rule set
//! through a [`MatcherRegistry`] and evaluated through a [`MatchCache`] that
//! lives for a single matching pass.
//!
//! [`MatchCache`]: crate::cache::MatchCache

mod frame;
mod matchers;
mod parser;
mod registry;

use std::fmt;

use crate::{cache::MatchCache, error::EnhancerError};

pub use self::frame::{family_for_platform, ExceptionData, MatchFrame};
pub use self::matchers::{rule_bool, FrameContext, FrameMatch, Match, MatchField};
pub use self::parser::parse_matchers;
pub use self::registry::MatcherRegistry;

/// The matchers of one enhancement rule. A frame matches when every matcher
/// matches it.
#[derive(Debug, Clone)]
pub struct MatcherList {
    matchers: Vec<Match>,
}

impl MatcherList {
    pub fn new(matchers: Vec<Match>) -> Self {
        Self { matchers }
    }

    pub fn parse(source: &str, registry: &MatcherRegistry) -> Result<Self, EnhancerError> {
        parse_matchers(source, registry).map(Self::new)
    }

    /// Rebuild a list from the compact encoding of each matcher.
    pub fn from_config_structure<S: AsRef<str>>(
        encoded: &[S],
        registry: &MatcherRegistry,
    ) -> Result<Self, EnhancerError> {
        encoded
            .iter()
            .map(|e| Match::from_config_structure(e.as_ref(), registry))
            .collect::<Result<Vec<_>, _>>()
            .map(Self::new)
    }

    pub fn to_config_structure(&self) -> Vec<String> {
        self.matchers.iter().map(Match::to_config_structure).collect()
    }

    pub fn matchers(&self) -> &[Match] {
        &self.matchers
    }

    pub fn matches_frame(&self, ctx: &FrameContext<'_>, idx: usize, cache: &mut MatchCache) -> bool {
        self.matchers
            .iter()
            .all(|matcher| matcher.matches_frame(ctx, idx, cache))
    }

    /// Indices of every frame in `ctx` that this list matches.
    pub fn matching_frames(&self, ctx: &FrameContext<'_>, cache: &mut MatchCache) -> Vec<usize> {
        (0..ctx.frames.len())
            .filter(|&idx| self.matches_frame(ctx, idx, cache))
            .collect()
    }
}

impl fmt::Display for MatcherList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let descriptions = self
            .matchers
            .iter()
            .map(Match::description)
            .collect::<Vec<_>>();
        f.write_str(&descriptions.join(" "))
    }
}
