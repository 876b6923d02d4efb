//! # sceptre-rules
//!
//! The stateful Horn rule system at the centre of sceptre.
//!
//! A [`Rule`] couples premises (events witnessed by snapshots), a
//! [`SnapshotTree`] describing the required state trace, a guard, and
//! either a result event (*state-consistent*) or a set of cell mutations
//! (*state-transferring*). The operations the reasoning engine is built
//! from all live here:
//!
//! - [`Rule::implies`] — subsumption, used to prune redundant rules;
//! - [`Rule::compose_with`] — premise splicing with snapshot-tree merge;
//! - [`Rule::transfer_applied_to`] — extending a consistent rule's trace
//!   by a mutation step;
//! - [`RuleFactory`] — the single-use, category-checked rule builder;
//! - [`HornClause`] — the rank-annotated pure clauses handed to the query
//!   engine, with provenance for attack reconstruction;
//! - [`text`] — the human-readable rule syntax used by diagnostics and
//!   tests.

pub mod error;
pub mod factory;
pub mod horn;
pub mod rule;
pub mod snapshot;
pub mod text;

pub use error::{RuleConstructionError, RuleResult};
pub use factory::RuleFactory;
pub use horn::{combined_rank, rank_allows, ClauseOrigin, HornClause, UNIVERSAL_RANK};
pub use rule::{Premise, Rule, RuleConclusion};
pub use snapshot::{Snapshot, SnapshotId, SnapshotTree, TraceLink};
pub use text::{parse_rule, parse_rules, TextParseError};
