//! Errors raised while building rules.
//!
//! Construction-time problems are fatal for the rule being built and
//! bubble up to the translation layer. Note that *unification* failure is
//! never an error anywhere in sceptre; only malformed rule structure is.

use std::fmt;

use sceptre_algebra::{Event, EventKind};

use crate::snapshot::SnapshotId;

/// A structural defect detected while finalising a rule.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleConstructionError {
    /// `leak` events conclude attacks; they can never be required.
    LeakAsPremise { event: Event },

    /// The conclusion category is reserved for premises (`init`, `new`).
    InvalidResultKind { kind: EventKind },

    /// The declared result already appears among the premises, making the
    /// rule an immediate tautology.
    ResultAmongPremises { event: Event },

    /// The snapshot ordering links contain a cycle.
    OrderingCycle,

    /// A premise or link referenced a snapshot the factory never issued.
    UnknownSnapshot { id: SnapshotId },

    /// A state-transferring rule was finalised without any transfer.
    NoTransfers,

    /// A state-consistent rule was requested while transfers were staged,
    /// or vice versa.
    ConflictingConclusions,
}

impl fmt::Display for RuleConstructionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleConstructionError::LeakAsPremise { event } => {
                write!(f, "'{}' cannot be a premise: leak events only conclude", event)
            }
            RuleConstructionError::InvalidResultKind { kind } => {
                write!(f, "events tagged '{}' cannot be a rule result", kind.tag())
            }
            RuleConstructionError::ResultAmongPremises { event } => {
                write!(f, "result '{}' already appears among the premises", event)
            }
            RuleConstructionError::OrderingCycle => {
                write!(f, "snapshot ordering links form a cycle")
            }
            RuleConstructionError::UnknownSnapshot { id } => {
                write!(f, "snapshot id {} was not issued by this factory", id)
            }
            RuleConstructionError::NoTransfers => {
                write!(f, "a state-transferring rule needs at least one transfer")
            }
            RuleConstructionError::ConflictingConclusions => {
                write!(f, "rule declares both a result event and state transfers")
            }
        }
    }
}

impl std::error::Error for RuleConstructionError {}

/// Result alias for rule construction.
pub type RuleResult<T> = Result<T, RuleConstructionError>;
