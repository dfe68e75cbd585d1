use std::{
    collections::{BTreeMap, BTreeSet, HashSet},
    fmt,
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::{
    error::OwnershipError,
    event::{DefaultMunger, FrameMunger},
};

use super::{
    parser::parse_rules,
    schema::{dump_schema, load_schema, Schema},
    Owner, OwnerType, Rule,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorKind {
    User,
    Team,
}

/// A concrete user or team an [`Owner`] resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Actor {
    pub id: u64,
    #[serde(rename = "type")]
    pub kind: ActorKind,
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            ActorKind::User => "user",
            ActorKind::Team => "team",
        };
        write!(f, "{kind}:{}", self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UserIdentity {
    pub id: u64,
    pub emails: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TeamIdentity {
    pub id: u64,
    pub slug: String,
}

/// Looks up the users and teams that owners refer to. Lookups may block;
/// the resolver calls each method at most once per resolution.
pub trait IdentityResolver {
    /// Users having any of `emails` among their addresses. Each returned
    /// identity lists all of the user's addresses.
    fn users_by_email(&self, emails: &[&str]) -> Vec<UserIdentity>;

    fn teams_by_slug(&self, slugs: &[&str]) -> Vec<TeamIdentity>;
}

/// An in-memory [`IdentityResolver`], typically loaded from JSON:
/// `{"users": [{"id": 1, "emails": [...]}], "teams": [{"id": 2, "slug": "..."}]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Directory {
    #[serde(default)]
    pub users: Vec<UserIdentity>,
    #[serde(default)]
    pub teams: Vec<TeamIdentity>,
}

impl IdentityResolver for Directory {
    fn users_by_email(&self, emails: &[&str]) -> Vec<UserIdentity> {
        let wanted = emails
            .iter()
            .map(|e| e.to_lowercase())
            .collect::<HashSet<_>>();
        self.users
            .iter()
            .filter(|user| user.emails.iter().any(|e| wanted.contains(&e.to_lowercase())))
            .cloned()
            .collect()
    }

    fn teams_by_slug(&self, slugs: &[&str]) -> Vec<TeamIdentity> {
        self.teams
            .iter()
            .filter(|team| slugs.contains(&team.slug.as_str()))
            .cloned()
            .collect()
    }
}

/// Resolve owners to actors. Users are looked up by any of their email
/// addresses, ignoring case; teams by exact slug. Owners that resolve to
/// nothing map to `None`.
pub fn resolve_actors<'a, R>(
    owners: impl IntoIterator<Item = &'a Owner>,
    resolver: &R,
) -> BTreeMap<Owner, Option<Actor>>
where
    R: IdentityResolver + ?Sized,
{
    let owners = owners.into_iter().collect::<BTreeSet<_>>();
    if owners.is_empty() {
        return BTreeMap::new();
    }

    let identifiers = |kind: OwnerType| {
        owners
            .iter()
            .filter(|o| o.kind() == kind)
            .map(|o| o.identifier())
            .collect::<Vec<_>>()
    };
    let users = identifiers(OwnerType::User);
    let teams = identifiers(OwnerType::Team);

    let mut actors = BTreeMap::new();
    if !users.is_empty() {
        for user in resolver.users_by_email(&users) {
            for email in &user.emails {
                let actor = Actor {
                    id: user.id,
                    kind: ActorKind::User,
                };
                actors.insert((OwnerType::User, email.to_lowercase()), actor);
            }
        }
    }
    if !teams.is_empty() {
        for team in resolver.teams_by_slug(&teams) {
            let actor = Actor {
                id: team.id,
                kind: ActorKind::Team,
            };
            actors.insert((OwnerType::Team, team.slug), actor);
        }
    }

    owners
        .into_iter()
        .map(|owner| {
            let actor = actors
                .get(&(owner.kind(), owner.identifier().to_owned()))
                .copied();
            (owner.clone(), actor)
        })
        .collect()
}

/// Which of the matching rules contribute owners.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MatchPolicy {
    FirstMatch,
    /// The last matching rule wins, as in CODEOWNERS files.
    LastMatch,
    #[default]
    AllMatches,
}

impl FromStr for MatchPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "first" => Ok(MatchPolicy::FirstMatch),
            "last" => Ok(MatchPolicy::LastMatch),
            "all" => Ok(MatchPolicy::AllMatches),
            _ => Err(format!("unknown match policy '{s}', expected first, last or all")),
        }
    }
}

impl fmt::Display for MatchPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MatchPolicy::FirstMatch => "first",
            MatchPolicy::LastMatch => "last",
            MatchPolicy::AllMatches => "all",
        })
    }
}

/// Owners resolved for one event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub actors: Vec<Actor>,
    pub unresolved: Vec<Owner>,
}

/// An ordered list of ownership rules evaluated against events.
#[derive(Debug, Clone)]
pub struct RuleResolver {
    rules: Vec<Rule>,
    policy: MatchPolicy,
}

impl RuleResolver {
    pub fn new(rules: Vec<Rule>, policy: MatchPolicy) -> Self {
        Self { rules, policy }
    }

    pub fn from_schema(schema: &Value, policy: MatchPolicy) -> Result<Self, OwnershipError> {
        Ok(Self::new(load_schema(schema)?, policy))
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn policy(&self) -> MatchPolicy {
        self.policy
    }

    pub fn matching_rules(&self, event: &Value) -> Vec<(usize, &Rule)> {
        self.matching_rules_with(event, &DefaultMunger)
    }

    /// The rules whose matcher accepts `event`, with their indices, filtered
    /// by the match policy.
    pub fn matching_rules_with<M>(&self, event: &Value, munger: &M) -> Vec<(usize, &Rule)>
    where
        M: FrameMunger + ?Sized,
    {
        let mut matching = self
            .rules
            .iter()
            .enumerate()
            .filter(|(_, rule)| rule.matcher.test_with(event, munger));

        let selected: Vec<_> = match self.policy {
            MatchPolicy::FirstMatch => matching.next().into_iter().collect(),
            MatchPolicy::LastMatch => matching.last().into_iter().collect(),
            MatchPolicy::AllMatches => matching.collect(),
        };
        for (idx, rule) in &selected {
            debug!(rule = idx, matcher = %rule.matcher, "ownership rule matched");
        }
        selected
    }

    /// Owners of the matching rules, without duplicates, in rule order.
    pub fn owners(&self, event: &Value) -> Vec<&Owner> {
        let mut seen = HashSet::new();
        self.matching_rules(event)
            .into_iter()
            .flat_map(|(_, rule)| &rule.owners)
            .filter(|owner| seen.insert(*owner))
            .collect()
    }

    /// Resolve the owners of the matching rules. Every owner is looked up
    /// before unresolved ones are reported.
    pub fn resolve<R>(&self, event: &Value, resolver: &R) -> Resolution
    where
        R: IdentityResolver + ?Sized,
    {
        let owners = self.owners(event);
        let resolved = resolve_actors(owners.iter().copied(), resolver);

        let mut resolution = Resolution::default();
        for owner in owners {
            match resolved.get(owner).copied().flatten() {
                Some(actor) if !resolution.actors.contains(&actor) => resolution.actors.push(actor),
                Some(_) => {}
                None => resolution.unresolved.push(owner.clone()),
            }
        }
        if !resolution.unresolved.is_empty() {
            debug!(unresolved = ?resolution.unresolved, "owners could not be resolved");
        }
        resolution
    }
}

/// Parse rule text into a schema, checking that every owner resolves.
///
/// Fails with the sorted list of unresolved owners (teams as `#slug`) when any
/// owner is unknown.
pub fn create_schema_from_issue_owners<R>(
    issue_owners: &str,
    resolver: &R,
) -> Result<Schema, OwnershipError>
where
    R: IdentityResolver + ?Sized,
{
    let rules = parse_rules(issue_owners)?;
    let schema = dump_schema(&rules);

    let actors = resolve_actors(rules.iter().flat_map(|rule| &rule.owners), resolver);
    let mut bad_actors = actors
        .iter()
        .filter(|(_, actor)| actor.is_none())
        .map(|(owner, _)| owner.to_string())
        .collect::<Vec<_>>();
    if !bad_actors.is_empty() {
        bad_actors.sort();
        debug!(?bad_actors, "rejecting ownership rules with unknown owners");
        return Err(OwnershipError::InvalidOwners(bad_actors));
    }

    Ok(schema)
}
