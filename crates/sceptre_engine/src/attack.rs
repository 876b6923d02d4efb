//! Attacks: successful derivations of the query.

use serde::Serialize;

use sceptre_algebra::Message;
use sceptre_rules::HornClause;

/// A completed attack: the premise-free derivation of the query, with the
/// nession (if any) that supplied the ranked clauses.
#[derive(Debug, Clone, PartialEq)]
pub struct Attack {
    pub query: Message,
    /// The final, premise-free clause; its provenance unwinds into the
    /// full chain.
    pub derivation: HornClause,
    /// Index of the nession the attack was found in; `None` for a global
    /// attack.
    pub nession: Option<usize>,
}

impl Attack {
    /// The source clauses used, in discharge order.
    pub fn chain(&self) -> Vec<&HornClause> {
        self.derivation.provenance_chain()
    }

    /// A serialisable rendering for logs and embedders.
    pub fn report(&self) -> AttackReport {
        AttackReport {
            query: self.query.to_string(),
            nession: self.nession,
            chain: self.chain().iter().map(|c| c.to_string()).collect(),
        }
    }
}

/// The stringly summary of an [`Attack`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttackReport {
    pub query: String,
    pub nession: Option<usize>,
    pub chain: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use sceptre_rules::ClauseOrigin;

    #[test]
    fn report_renders_the_chain() {
        let base = HornClause::new(vec![], Message::name("a"));
        let goal = HornClause::new(vec![Message::name("a")], Message::name("a"))
            .with_origin(ClauseOrigin::Query);
        let mut counter = 0;
        let derivation = goal
            .resolved_with(0, &base, &mut counter)
            .expect("the fact discharges the goal");
        assert!(derivation.is_fact());
        let attack = Attack {
            query: Message::name("a"),
            derivation,
            nession: None,
        };
        let report = attack.report();
        assert_eq!(report.query, "a[]");
        // The chain unwinds to the base fact and the goal clause.
        assert_eq!(report.chain.len(), 2);
    }
}
