//! Admin configuration: per-interface role, the
//! proxy-instance-wide rule-matching policy, the static rule list, and
//! the group-membership interval that drives source lifetime.
//!
//! Loaded in two stages, the way routing daemons with TOML-driven startup
//! config typically do it: a `serde`-deserialized `RawConfig` that
//! mirrors the TOML file's shape with string interface names, then
//! `AdminConfig::try_from_raw` which resolves names to OS interface
//! indices and validates the result.

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;

use crate::time::Duration;
use crate::wire::{Address, AdminFilter, AdminFilterKind, InterfaceId, SourceMatch, SourceSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Upstream,
    Downstream,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleMatchingPolicy {
    First,
    Mutex,
}

/// Matches either a specific value or the family-wildcard: a pattern
/// matches a single value or the wildcard of that family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pattern<T> {
    Wildcard,
    Exact(T),
}

impl<T: PartialEq> Pattern<T> {
    pub fn matches(&self, value: &T) -> bool {
        match self {
            Pattern::Wildcard => true,
            Pattern::Exact(v) => v == value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminRule {
    pub interface: Pattern<InterfaceId>,
    pub direction: Direction,
    pub kind: AdminFilterKind,
    pub group: Pattern<Address>,
    pub source: SourceMatchPattern,
}

/// A rule's source pattern: the family wildcard, or one specific source
/// address. Kept distinct from [`Pattern`] because it feeds directly into
/// `wire::SourceMatch` rather than a plain equality test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceMatchPattern {
    Wildcard,
    Exact(Address),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError(pub String);

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "configuration error: {}", self.0)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ConfigError {}

impl From<ConfigError> for crate::error::Error {
    fn from(e: ConfigError) -> crate::error::Error {
        crate::error::Error::PolicyError(e.0)
    }
}

/// The TOML-shaped, not-yet-validated configuration. Interface names are
/// plain strings here because the OS hasn't been asked to resolve them
/// yet; [`AdminConfig::try_from_raw`] does that resolution.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfig {
    pub rule_matching_policy: RawPolicy,
    pub group_membership_interval_secs: i64,
    #[serde(default)]
    pub source_lifetime_secs: Option<i64>,
    #[serde(default, rename = "interface")]
    pub interfaces: Vec<RawInterface>,
    #[serde(default, rename = "rule")]
    pub rules: Vec<RawRule>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RawPolicy {
    First,
    Mutex,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawInterface {
    pub name: String,
    pub role: Role,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawRule {
    pub interface: String,
    pub direction: Direction,
    pub kind: RawKind,
    pub group: String,
    pub source: String,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RawKind {
    Whitelist,
    Blacklist,
}

impl RawConfig {
    pub fn parse(text: &str) -> Result<RawConfig, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError(format!("malformed configuration: {}", e)))
    }
}

fn parse_address_pattern(text: &str) -> Result<Pattern<Address>, ConfigError> {
    if text == "*" {
        Ok(Pattern::Wildcard)
    } else {
        text.parse::<std::net::IpAddr>()
            .map(|ip| Pattern::Exact(Address::from(ip)))
            .map_err(|e| ConfigError(format!("invalid address pattern {:?}: {}", text, e)))
    }
}

fn parse_source_pattern(text: &str) -> Result<SourceMatchPattern, ConfigError> {
    if text == "*" {
        Ok(SourceMatchPattern::Wildcard)
    } else {
        text.parse::<std::net::IpAddr>()
            .map(|ip| SourceMatchPattern::Exact(Address::from(ip)))
            .map_err(|e| ConfigError(format!("invalid source pattern {:?}: {}", text, e)))
    }
}

/// Validated, OS-resolved admin configuration. Immutable for
/// the lifetime of a run.
#[derive(Debug, Clone)]
pub struct AdminConfig {
    interfaces: BTreeMap<InterfaceId, Role>,
    policy: RuleMatchingPolicy,
    rules: Vec<AdminRule>,
    group_membership_interval: Duration,
    source_lifetime: Duration,
}

impl AdminConfig {
    /// Resolve `raw` against `resolve`, a caller-supplied interface-name
    /// lookup (backed by `if_nametoindex` in the daemon binary, by a
    /// fixed map in tests). Rejects, as a startup-fatal [`ConfigError`],
    /// two rules that apply to the same (interface pattern, direction)
    /// with conflicting `AdminFilterKind` — the filter-merge combinators
    /// only have a defined meaning for a single filter per direction.
    pub fn try_from_raw<F>(raw: RawConfig, mut resolve: F) -> Result<AdminConfig, ConfigError>
    where
        F: FnMut(&str) -> Option<InterfaceId>,
    {
        if raw.group_membership_interval_secs <= 0 {
            return Err(ConfigError("group_membership_interval_secs must be positive".into()));
        }

        let mut interfaces = BTreeMap::new();
        for iface in &raw.interfaces {
            let id = resolve(&iface.name).ok_or_else(|| ConfigError(format!("unknown interface {:?}", iface.name)))?;
            interfaces.insert(id, iface.role);
        }

        let mut rules = Vec::with_capacity(raw.rules.len());
        for rule in &raw.rules {
            let interface = if rule.interface == "*" {
                Pattern::Wildcard
            } else {
                let id = resolve(&rule.interface).ok_or_else(|| ConfigError(format!("unknown interface {:?}", rule.interface)))?;
                Pattern::Exact(id)
            };
            rules.push(AdminRule {
                interface,
                direction: rule.direction,
                kind: match rule.kind {
                    RawKind::Whitelist => AdminFilterKind::Whitelist,
                    RawKind::Blacklist => AdminFilterKind::Blacklist,
                },
                group: parse_address_pattern(&rule.group)?,
                source: parse_source_pattern(&rule.source)?,
            });
        }

        reject_conflicting_rules(&rules)?;

        let group_membership_interval = Duration::from_secs(raw.group_membership_interval_secs);
        let source_lifetime = match raw.source_lifetime_secs {
            Some(secs) if secs > 0 => Duration::from_secs(secs),
            Some(_) => return Err(ConfigError("source_lifetime_secs must be positive".into())),
            None => group_membership_interval,
        };

        Ok(AdminConfig {
            interfaces,
            policy: match raw.rule_matching_policy {
                RawPolicy::First => RuleMatchingPolicy::First,
                RawPolicy::Mutex => RuleMatchingPolicy::Mutex,
            },
            rules,
            group_membership_interval,
            source_lifetime,
        })
    }

    pub fn role(&self, interface: InterfaceId) -> Option<Role> {
        self.interfaces.get(&interface).copied()
    }

    pub fn upstreams(&self) -> Vec<InterfaceId> {
        self.interfaces
            .iter()
            .filter(|(_, role)| **role == Role::Upstream)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn downstreams(&self) -> Vec<InterfaceId> {
        self.interfaces
            .iter()
            .filter(|(_, role)| **role == Role::Downstream)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn policy(&self) -> RuleMatchingPolicy {
        self.policy
    }

    pub fn group_membership_interval(&self) -> Duration {
        self.group_membership_interval
    }

    pub fn source_lifetime(&self) -> Duration {
        self.source_lifetime
    }

    /// Compose every rule matching `(interface, direction, group)` into a
    /// single `AdminFilter`, or [`AdminFilter::accept_all`] if none match —
    /// absence of a rule must not restrict anything.
    pub fn filter_for(&self, interface: InterfaceId, direction: Direction, group: Address) -> AdminFilter {
        let matching: Vec<&AdminRule> = self
            .rules
            .iter()
            .filter(|r| r.direction == direction && r.interface.matches(&interface) && r.group.matches(&group))
            .collect();

        if matching.is_empty() {
            return AdminFilter::accept_all();
        }

        let kind = matching[0].kind;
        let mut sources = SourceSet::new();
        let mut wildcard = false;
        for rule in &matching {
            match &rule.source {
                SourceMatchPattern::Wildcard => wildcard = true,
                SourceMatchPattern::Exact(addr) => {
                    sources.insert(*addr);
                }
            }
        }

        AdminFilter {
            kind,
            sources: if wildcard { SourceMatch::Wildcard } else { SourceMatch::Specific(sources) },
        }
    }

    /// Every rule's `(interface pattern, direction)` this config carries,
    /// in declaration order.
    pub fn rules(&self) -> &[AdminRule] {
        &self.rules
    }
}

fn reject_conflicting_rules(rules: &[AdminRule]) -> Result<(), ConfigError> {
    let mut kinds: BTreeMap<(Option<u32>, Direction), AdminFilterKind> = BTreeMap::new();
    for rule in rules {
        let key = (
            match &rule.interface {
                Pattern::Wildcard => None,
                Pattern::Exact(id) => Some(id.get()),
            },
            rule.direction,
        );
        match kinds.get(&key) {
            Some(existing) if *existing != rule.kind => {
                return Err(ConfigError(format!(
                    "conflicting whitelist/blacklist rules for the same interface pattern and direction {:?}",
                    rule.direction
                )));
            }
            _ => {
                kinds.insert(key, rule.kind);
            }
        }
    }
    Ok(())
}
