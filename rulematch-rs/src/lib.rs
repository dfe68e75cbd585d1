//! Rule matching for error events: stack frame matchers for grouping
//! enhancements and issue ownership rules, including rules converted from
//! CODEOWNERS files.

pub mod cache;
pub mod enhancer;
pub mod error;
pub mod event;
pub mod gitignore;
pub mod glob;
pub mod ownership;

pub use cache::{CacheOp, MatchCache};
pub use enhancer::{Match, MatcherList, MatcherRegistry};
pub use error::{EnhancerError, OwnershipError};
pub use ownership::{
    parser::{parse_rules, ParseError},
    resolver::{MatchPolicy, RuleResolver},
    schema::{dump_schema, load_schema, Schema},
    Matcher, MatcherType, Owner, OwnerType, Rule,
};
