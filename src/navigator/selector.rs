//! Revision selectors.

use crate::error::LedgerError;
use crate::types::{RevisionId, RevisionNumber};
use std::fmt;
use std::str::FromStr;

/// Which revision of a lineage to resolve.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum RevisionSelector {
    /// Revision with this number.
    Number(RevisionNumber),
    /// Revision with this identifier; must belong to the lineage.
    Id(RevisionId),
    /// Lowest visible number.
    First,
    /// Highest visible number.
    Last,
    /// The ancestor immediately before the newest revision, i.e. `Back(1)`.
    ///
    /// This is relative to the stored revisions, not to the live entity, so a
    /// lineage with a single revision has no `Previous`.
    Previous,
    /// `k` steps back from the newest revision. `Back(0)` is `Last`.
    Back(u64),
    /// Newest revision carrying this label.
    Label(String),
}

impl From<RevisionNumber> for RevisionSelector {
    fn from(number: RevisionNumber) -> Self {
        RevisionSelector::Number(number)
    }
}

impl From<RevisionId> for RevisionSelector {
    fn from(id: RevisionId) -> Self {
        RevisionSelector::Id(id)
    }
}

impl FromStr for RevisionSelector {
    type Err = LedgerError;

    /// Accepts `first`, `last`, `previous` (each optionally prefixed with
    /// `:`), a bare number, `id:<n>`, `~<k>` and `label:<name>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let token = s.strip_prefix(':').unwrap_or(s);

        match token {
            "first" => return Ok(RevisionSelector::First),
            "last" => return Ok(RevisionSelector::Last),
            "previous" => return Ok(RevisionSelector::Previous),
            _ => {}
        }

        if let Some(label) = token.strip_prefix("label:") {
            if label.is_empty() {
                return Err(LedgerError::InvalidSelector(s.to_string()));
            }
            return Ok(RevisionSelector::Label(label.to_string()));
        }

        if let Some(id) = token.strip_prefix("id:") {
            return parse_u64(id, s).map(|id| RevisionSelector::Id(RevisionId(id)));
        }

        if let Some(steps) = token.strip_prefix('~') {
            return parse_u64(steps, s).map(RevisionSelector::Back);
        }

        match parse_u64(token, s)? {
            0 => Err(LedgerError::InvalidSelector(format!(
                "{}: revision numbers start at 1",
                s
            ))),
            n => Ok(RevisionSelector::Number(RevisionNumber(n))),
        }
    }
}

impl fmt::Display for RevisionSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RevisionSelector::Number(n) => write!(f, "{}", n),
            RevisionSelector::Id(id) => write!(f, "id:{}", id),
            RevisionSelector::First => write!(f, ":first"),
            RevisionSelector::Last => write!(f, ":last"),
            RevisionSelector::Previous => write!(f, ":previous"),
            RevisionSelector::Back(k) => write!(f, "~{}", k),
            RevisionSelector::Label(label) => write!(f, "label:{}", label),
        }
    }
}

fn parse_u64(digits: &str, original: &str) -> Result<u64, LedgerError> {
    digits
        .parse::<u64>()
        .map_err(|_| LedgerError::InvalidSelector(original.to_string()))
}
