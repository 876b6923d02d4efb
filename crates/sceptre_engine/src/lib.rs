//! # sceptre-engine
//!
//! The session and query engine: the part of sceptre that decides whether
//! the attacker wins.
//!
//! Given a [`Translation`](sceptre_translate::Translation) (initial cell
//! states, stateful Horn rules, queries), the engine
//!
//! 1. **elaborates** the initial states into [`Nession`]s — finite
//!    symbolic executions — applying state-transferring rules in
//!    knit-pattern groups so commuting mutations do not multiply the
//!    search;
//! 2. **extracts** rank-annotated [`HornClause`]s from every nession by
//!    matching each state-consistent rule's snapshot constraints against
//!    the frames;
//! 3. **resolves** the query backwards, first rank-obliviously against
//!    the universal clauses (the global check), then rank-respectingly
//!    per nession;
//! 4. reconstructs an [`Attack`] chain from clause provenance when a
//!    derivation closes.
//!
//! The engine is cooperative: [`QueryEngine::step`] advances one unit and
//! the embedder drives, observes through [`Callbacks`], and may cancel at
//! any time through a [`CancelHandle`]. Absence of an attack is a normal
//! completion.

pub mod attack;
pub mod elaborate;
pub mod engine;
pub mod extract;
pub mod knit;
pub mod nession;
pub mod query;

pub use attack::{Attack, AttackReport};
pub use elaborate::{elaborate, MAX_NESSIONS};
pub use engine::{Callbacks, CancelHandle, QueryEngine, QueryOutcome, StepStatus};
pub use extract::{global_clause, nession_clauses};
pub use knit::knit_groups;
pub use nession::{Frame, FrameState, Nession, TransferInstance, TransferTarget};
pub use query::{resolve_query, Resolution, DEFAULT_CLAUSE_BUDGET};
