use std::fmt;

use super::{Address, SourceSet};

/// `(mode, sources)` in IGMPv3/MLDv2 semantics: in `Include`,
/// exactly the listed sources are accepted; in `Exclude`, every source
/// except the listed ones is accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterState {
    Include(SourceSet),
    Exclude(SourceSet),
}

impl FilterState {
    /// `INCLUDE{}` — accepts nothing. The identity element of [`merge`]
    /// and the natural "no membership reported" starting point.
    pub fn empty_include() -> FilterState {
        FilterState::Include(SourceSet::new())
    }

    pub fn sources(&self) -> &SourceSet {
        match self {
            FilterState::Include(s) | FilterState::Exclude(s) => s,
        }
    }

    pub fn accepts(&self, source: &Address) -> bool {
        match self {
            FilterState::Include(s) => s.contains(source),
            FilterState::Exclude(s) => !s.contains(source),
        }
    }
}

impl fmt::Display for FilterState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FilterState::Include(s) => write!(f, "INCLUDE{}", s),
            FilterState::Exclude(s) => write!(f, "EXCLUDE{}", s),
        }
    }
}

/// Whether an admin rule's source pattern is a specific set or the
/// family-wildcard "match all" marker. The wildcard source (`*`) never
/// appears in a database Source Record; it may only appear inside admin
/// rules. Keeping this as its own case — rather than inserting the
/// all-zeros address into a `SourceSet` — is what makes that invariant a
/// type-level fact instead of a convention callers must honor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceMatch {
    Wildcard,
    Specific(SourceSet),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminFilterKind {
    Whitelist,
    Blacklist,
}

/// One administrator-supplied filter, already narrowed to a single
/// direction/interface/group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminFilter {
    pub kind: AdminFilterKind,
    pub sources: SourceMatch,
}

impl AdminFilter {
    pub fn whitelist(sources: SourceSet) -> AdminFilter {
        AdminFilter {
            kind: AdminFilterKind::Whitelist,
            sources: SourceMatch::Specific(sources),
        }
    }

    pub fn blacklist(sources: SourceSet) -> AdminFilter {
        AdminFilter {
            kind: AdminFilterKind::Blacklist,
            sources: SourceMatch::Specific(sources),
        }
    }

    /// The filter that admits everything: `WHITELIST{*}`. Used whenever no
    /// admin rule matches a given (interface, direction, group) — absence
    /// of a rule must not restrict anything.
    pub fn accept_all() -> AdminFilter {
        AdminFilter {
            kind: AdminFilterKind::Whitelist,
            sources: SourceMatch::Wildcard,
        }
    }

    /// Wildcard elimination: `WHITELIST{*} -> BLACKLIST{}`,
    /// `BLACKLIST{*} -> WHITELIST{}`. Specific-source filters pass through
    /// unchanged.
    fn normalized(&self) -> (AdminFilterKind, SourceSet) {
        match (&self.kind, &self.sources) {
            (AdminFilterKind::Whitelist, SourceMatch::Wildcard) => {
                (AdminFilterKind::Blacklist, SourceSet::new())
            }
            (AdminFilterKind::Blacklist, SourceMatch::Wildcard) => {
                (AdminFilterKind::Whitelist, SourceSet::new())
            }
            (kind, SourceMatch::Specific(set)) => (*kind, set.clone()),
        }
    }
}

/// Membership merge: union of listeners.
///
/// |into \ from | INCLUDE(A)     | EXCLUDE(B)     |
/// |------------|----------------|----------------|
/// | INCLUDE(X) | INCLUDE(X∪A)   | EXCLUDE(B\X)   |
/// | EXCLUDE(Y) | EXCLUDE(Y\A)   | EXCLUDE(Y∩B)   |
pub fn merge(into: &FilterState, from: &FilterState) -> FilterState {
    match (into, from) {
        (FilterState::Include(x), FilterState::Include(a)) => FilterState::Include(x.union(a)),
        (FilterState::Include(x), FilterState::Exclude(b)) => FilterState::Exclude(b.difference(x)),
        (FilterState::Exclude(y), FilterState::Include(a)) => FilterState::Exclude(y.difference(a)),
        (FilterState::Exclude(y), FilterState::Exclude(b)) => FilterState::Exclude(y.intersection(b)),
    }
}

/// Filter merge: apply an admin filter to a `FilterState`, after
/// wildcard elimination.
///
/// |into \ filter | WHITELIST(W)   | BLACKLIST(B)   |
/// |---------------|----------------|----------------|
/// | INCLUDE(X)    | INCLUDE(X∩W)   | INCLUDE(X\B)   |
/// | EXCLUDE(Y)    | INCLUDE(W\Y)   | EXCLUDE(Y∪B)   |
pub fn filter_merge(state: &FilterState, filter: &AdminFilter) -> FilterState {
    let (kind, set) = filter.normalized();
    match (state, kind) {
        (FilterState::Include(x), AdminFilterKind::Whitelist) => FilterState::Include(x.intersection(&set)),
        (FilterState::Include(x), AdminFilterKind::Blacklist) => FilterState::Include(x.difference(&set)),
        (FilterState::Exclude(y), AdminFilterKind::Whitelist) => FilterState::Include(set.difference(y)),
        (FilterState::Exclude(y), AdminFilterKind::Blacklist) => FilterState::Exclude(y.union(&set)),
    }
}

/// Remainder: what the filter rejected, carried forward to the next
/// upstream under policy FIRST.
///
/// |state \ filter | WHITELIST(W)   | BLACKLIST(B)   |
/// |----------------|----------------|----------------|
/// | INCLUDE(X)     | INCLUDE(X\W)   | INCLUDE(X∩B)   |
/// | EXCLUDE(Y)     | EXCLUDE(Y∪W)   | INCLUDE(B\Y)   |
pub fn filter_remainder(state: &FilterState, filter: &AdminFilter) -> FilterState {
    let (kind, set) = filter.normalized();
    match (state, kind) {
        (FilterState::Include(x), AdminFilterKind::Whitelist) => FilterState::Include(x.difference(&set)),
        (FilterState::Include(x), AdminFilterKind::Blacklist) => FilterState::Include(x.intersection(&set)),
        (FilterState::Exclude(y), AdminFilterKind::Whitelist) => FilterState::Exclude(y.union(&set)),
        (FilterState::Exclude(y), AdminFilterKind::Blacklist) => FilterState::Include(set.difference(y)),
    }
}
