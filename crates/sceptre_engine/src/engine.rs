//! The cooperative query engine.
//!
//! The engine is an explicit state machine: [`QueryEngine::step`]
//! processes one unit of work — elaboration, the global check, or one
//! nession's assessment — and returns whether anything remains. A driver
//! (here, [`QueryEngine::execute`]) loops over `step`, which keeps the
//! reasoning single-threaded while letting an embedder interleave UI
//! updates and honour cancellation between units.
//!
//! Callback order is guaranteed: `on_nessions_generated` once, then
//! `on_global_attack` at most once, then `on_attack_assessed` once per
//! nession in generation order, then `on_completion` exactly once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info};

use sceptre_algebra::{Message, State};
use sceptre_rules::{HornClause, Rule, UNIVERSAL_RANK};
use sceptre_translate::Translation;

use crate::attack::Attack;
use crate::elaborate::elaborate;
use crate::extract::{global_clause, nession_clauses};
use crate::nession::Nession;
use crate::query::{resolve_query, Resolution, DEFAULT_CLAUSE_BUDGET};

/// What one [`QueryEngine::step`] call accomplished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    /// Work remains; call `step` again.
    Progress,
    /// The engine has completed (or was cancelled).
    Done,
}

/// A shareable cancel switch. Setting it is idempotent; the engine polls
/// it between nessions and inside resolution loops.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    fn flag(&self) -> &AtomicBool {
        &self.0
    }
}

/// The final verdict of a query run.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOutcome {
    /// The first attack found, if any. Absence of an attack is a normal
    /// completion, not an error.
    pub attack: Option<Attack>,
    pub nessions_generated: usize,
    pub nessions_assessed: usize,
    pub cancelled: bool,
}

/// Observers for the run. All are optional.
#[derive(Default)]
pub struct Callbacks<'a> {
    pub on_nessions_generated: Option<Box<dyn FnMut(usize) + 'a>>,
    pub on_global_attack: Option<Box<dyn FnMut(&Attack) + 'a>>,
    pub on_attack_assessed: Option<Box<dyn FnMut(usize, Option<&Attack>) + 'a>>,
    pub on_completion: Option<Box<dyn FnMut(&QueryOutcome) + 'a>>,
}

#[derive(Clone, Copy)]
enum Phase {
    Elaborate,
    GlobalCheck,
    Nession(usize),
    Completion,
    Finished,
}

/// The backward-resolution engine for one secrecy query.
pub struct QueryEngine {
    initial_states: Vec<State>,
    query: Message,
    transfers: Vec<Rule>,
    consistent: Vec<Rule>,
    global_clauses: Vec<HornClause>,
    elaboration_limit: usize,
    clause_budget: usize,
    cancel: CancelHandle,
    phase: Phase,
    nessions: Vec<Nession>,
    counter: u32,
    attack: Option<Attack>,
    assessed: usize,
}

impl QueryEngine {
    /// Builds an engine from explicit parts.
    pub fn new(
        initial_states: Vec<State>,
        query: Message,
        rules: Vec<Rule>,
        elaboration_limit: usize,
    ) -> QueryEngine {
        let (transfers, consistent): (Vec<Rule>, Vec<Rule>) =
            rules.into_iter().partition(Rule::is_transferring);
        let global_clauses: Vec<HornClause> =
            consistent.iter().filter_map(global_clause).collect();
        QueryEngine {
            initial_states,
            query,
            transfers,
            consistent,
            global_clauses,
            elaboration_limit,
            clause_budget: DEFAULT_CLAUSE_BUDGET,
            cancel: CancelHandle::default(),
            phase: Phase::Elaborate,
            nessions: Vec::new(),
            counter: 0,
            attack: None,
            assessed: 0,
        }
    }

    /// Builds an engine for one query of a translation, using its
    /// recommended elaboration depth.
    pub fn for_translation(translation: &Translation, query: Message) -> QueryEngine {
        QueryEngine::new(
            translation.initial_states.clone(),
            query,
            translation.rules.clone(),
            translation.recommended_depth,
        )
    }

    /// Overrides the clause budget per resolution run.
    pub fn with_clause_budget(mut self, budget: usize) -> QueryEngine {
        self.clause_budget = budget;
        self
    }

    /// Overrides the elaboration depth (the translator's recommendation
    /// is only a heuristic).
    pub fn with_elaboration_limit(mut self, limit: usize) -> QueryEngine {
        self.elaboration_limit = limit;
        self
    }

    /// A handle that cancels this engine from anywhere.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Requests cancellation; idempotent.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Processes one unit of work.
    pub fn step(&mut self, callbacks: &mut Callbacks<'_>) -> StepStatus {
        match self.phase {
            Phase::Elaborate => {
                self.nessions = elaborate(
                    &self.initial_states,
                    &self.transfers,
                    &self.consistent,
                    self.elaboration_limit,
                );
                info!("elaborated {} nessions", self.nessions.len());
                if let Some(cb) = &mut callbacks.on_nessions_generated {
                    cb(self.nessions.len());
                }
                self.phase = Phase::GlobalCheck;
                StepStatus::Progress
            }

            Phase::GlobalCheck => {
                let resolution = self.resolve(&self.global_clauses.clone(), UNIVERSAL_RANK);
                if let Some(derivation) = resolution.derivation {
                    let attack = Attack {
                        query: self.query.clone(),
                        derivation,
                        nession: None,
                    };
                    info!("global attack on {}", self.query);
                    if let Some(cb) = &mut callbacks.on_global_attack {
                        cb(&attack);
                    }
                    self.attack = Some(attack);
                }
                self.phase = if self.cancel.is_cancelled() {
                    Phase::Completion
                } else {
                    Phase::Nession(0)
                };
                StepStatus::Progress
            }

            Phase::Nession(index) => {
                if index >= self.nessions.len() || self.cancel.is_cancelled() {
                    self.phase = Phase::Completion;
                    return StepStatus::Progress;
                }
                let nession = self.nessions[index].clone();
                let mut clauses =
                    nession_clauses(&nession, &self.consistent, &mut self.counter);
                clauses.extend(self.global_clauses.iter().cloned());
                let goal_rank = nession.depth() as i64;
                let resolution = self.resolve(&clauses, goal_rank);
                let attack = resolution.derivation.map(|derivation| Attack {
                    query: self.query.clone(),
                    derivation,
                    nession: Some(index),
                });
                debug!(
                    "nession {}: {} clauses, attack {}",
                    index,
                    clauses.len(),
                    attack.is_some()
                );
                if let Some(cb) = &mut callbacks.on_attack_assessed {
                    cb(index, attack.as_ref());
                }
                if self.attack.is_none() {
                    self.attack = attack;
                }
                self.assessed += 1;
                self.phase = Phase::Nession(index + 1);
                StepStatus::Progress
            }

            Phase::Completion => {
                let outcome = self.outcome();
                if let Some(cb) = &mut callbacks.on_completion {
                    cb(&outcome);
                }
                self.phase = Phase::Finished;
                StepStatus::Done
            }

            Phase::Finished => StepStatus::Done,
        }
    }

    fn resolve(&self, clauses: &[HornClause], goal_rank: i64) -> Resolution {
        resolve_query(
            &self.query,
            clauses,
            goal_rank,
            self.clause_budget,
            self.cancel.flag(),
        )
    }

    /// The verdict so far.
    pub fn outcome(&self) -> QueryOutcome {
        QueryOutcome {
            attack: self.attack.clone(),
            nessions_generated: self.nessions.len(),
            nessions_assessed: self.assessed,
            cancelled: self.cancel.is_cancelled(),
        }
    }

    /// Drives `step` to completion and returns the outcome.
    pub fn execute(&mut self, callbacks: &mut Callbacks<'_>) -> QueryOutcome {
        while self.step(callbacks) == StepStatus::Progress {}
        self.outcome()
    }

    /// Convenience: run with no observers.
    pub fn run(&mut self) -> QueryOutcome {
        self.execute(&mut Callbacks::default())
    }
}
