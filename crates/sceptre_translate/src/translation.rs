//! Translation output.

use serde::Serialize;

use sceptre_algebra::{Message, State};
use sceptre_rules::Rule;

/// Everything the query engine needs: the initial cell states, the full
/// rule set (attacker base plus generated socket rules), the secrecy
/// queries, and the elaboration depth hint.
#[derive(Debug, Clone, PartialEq)]
pub struct Translation {
    pub initial_states: Vec<State>,
    pub rules: Vec<Rule>,
    pub queries: Vec<Message>,
    /// Sum of the per-rule depth hints, plus one slack step. A heuristic
    /// bound on useful elaboration, not a termination guarantee; callers
    /// may override it.
    pub recommended_depth: usize,
}

impl Translation {
    /// The state-transferring rules of the set.
    pub fn transfer_rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter().filter(|r| r.is_transferring())
    }

    /// The state-consistent rules of the set.
    pub fn consistent_rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter().filter(|r| !r.is_transferring())
    }

    /// A serialisable summary for logs and embedders.
    pub fn report(&self) -> TranslationReport {
        TranslationReport {
            initial_states: self.initial_states.iter().map(State::to_string).collect(),
            rule_count: self.rules.len(),
            transfer_rule_count: self.transfer_rules().count(),
            queries: self.queries.iter().map(Message::to_string).collect(),
            recommended_depth: self.recommended_depth,
            rules: self.rules.iter().map(Rule::to_string).collect(),
        }
    }
}

/// The stringly summary of a [`Translation`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranslationReport {
    pub initial_states: Vec<String>,
    pub rule_count: usize,
    pub transfer_rule_count: usize,
    pub queries: Vec<String>,
    pub recommended_depth: usize,
    pub rules: Vec<String>,
}
