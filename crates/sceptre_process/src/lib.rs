//! # sceptre-process
//!
//! The applied-pi process model: what the reader produces, and what the
//! translator consumes.
//!
//! - [`Network`] — declaration tables plus the top-level [`Process`];
//! - [`Term`]/[`Pattern`] — unresolved source shapes;
//! - [`Comparison`] — `if` conditions, with positivisation;
//! - [`resolver`] — type checking, macro inlining, α-renaming, branch-id
//!   assignment and term resolution into algebra messages;
//! - [`BranchCondition`]/[`BranchRestrictionSet`] — the compiled form of
//!   branch conditions, a (substitution, guard) pair per alternative.

pub mod comparison;
pub mod error;
pub mod network;
pub mod process;
pub mod resolver;
pub mod term;

pub use comparison::{
    compile_comparison, normalise, BranchCondition, BranchRestrictionSet, Comparison,
    ResolvedComparison, ResolvedDestructor,
};
pub use error::{InvalidComparisonError, ResolveError, ResolveResult};
pub use network::{
    ConstDecl, Destructor, EventDecl, FreeDecl, FunDecl, MacroDecl, Network, Query, TableDecl,
};
pub use process::Process;
pub use resolver::{resolve, ResolvedKind, ResolvedNetwork, ResolvedPattern, ResolvedProcess};
pub use term::{Pattern, Term};
