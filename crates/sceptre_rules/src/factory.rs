//! The rule factory.
//!
//! A [`RuleFactory`] is a single-use builder: premises, registered states
//! (returning [`SnapshotId`] handles), ordering links, transfers, guard
//! clauses and an optional label are accumulated, then one of the two
//! `create_*` calls validates the whole, produces the [`Rule`] and resets
//! the factory for the next rule. Factories are never shared; every
//! translation concern drives its own.

use sceptre_algebra::{Event, EventKind, Guard, Message, State};

use crate::error::{RuleConstructionError, RuleResult};
use crate::rule::{Premise, Rule, RuleConclusion};
use crate::snapshot::{SnapshotId, SnapshotTree, TraceLink};

/// Accumulates the parts of one rule.
#[derive(Debug, Default)]
pub struct RuleFactory {
    label: Option<String>,
    premises: Vec<Premise>,
    tree: SnapshotTree,
    guard: Guard,
    transfers_staged: bool,
}

impl RuleFactory {
    pub fn new() -> RuleFactory {
        RuleFactory::default()
    }

    /// Names the rule under construction.
    pub fn set_label(&mut self, label: impl Into<String>) {
        self.label = Some(label.into());
    }

    /// Registers a required state, returning its snapshot handle.
    pub fn register_state(&mut self, state: State) -> SnapshotId {
        self.tree.register(state)
    }

    /// Adds a premise with no snapshot witness.
    pub fn add_premise(&mut self, event: Event) -> RuleResult<()> {
        self.add_premise_at(event, &[])
    }

    /// Adds a premise witnessed by the given snapshots.
    pub fn add_premise_at(&mut self, event: Event, snapshots: &[SnapshotId]) -> RuleResult<()> {
        if event.kind == EventKind::Leak {
            return Err(RuleConstructionError::LeakAsPremise { event });
        }
        for id in snapshots {
            if self.tree.get(*id).is_none() {
                return Err(RuleConstructionError::UnknownSnapshot { id: *id });
            }
        }
        let premise = Premise::with_snapshots(event, snapshots.to_vec());
        if !self.premises.contains(&premise) {
            self.premises.push(premise);
        }
        Ok(())
    }

    /// Declares `earlier` to be at or before `later`.
    pub fn link_later(&mut self, earlier: SnapshotId, later: SnapshotId) -> RuleResult<()> {
        self.tree.link(earlier, later, TraceLink::LaterThan)
    }

    /// Declares `later` to follow `earlier` by exactly one transition.
    pub fn link_modified_once(&mut self, earlier: SnapshotId, later: SnapshotId) -> RuleResult<()> {
        self.tree.link(earlier, later, TraceLink::ModifiedOnce)
    }

    /// Stages a mutation of the snapshot's cell to `target`.
    pub fn set_transfer(&mut self, id: SnapshotId, target: State) -> RuleResult<()> {
        self.tree.set_transfer(id, target)?;
        self.transfers_staged = true;
        Ok(())
    }

    /// Adds the guard constraint `left ~/> right`.
    pub fn add_guard(&mut self, left: Message, right: Message) {
        self.guard.forbid(left, right);
    }

    /// Unions a whole guard into the rule's.
    pub fn add_guard_set(&mut self, guard: &Guard) {
        self.guard = self.guard.union(guard);
    }

    /// Finalises a state-consistent rule concluding `result`.
    pub fn create_consistent(&mut self, result: Event) -> RuleResult<Rule> {
        if self.transfers_staged {
            self.reset();
            return Err(RuleConstructionError::ConflictingConclusions);
        }
        if result.kind == EventKind::Init {
            self.reset();
            return Err(RuleConstructionError::InvalidResultKind { kind: result.kind });
        }
        if self.premises.iter().any(|p| p.event == result) {
            self.reset();
            return Err(RuleConstructionError::ResultAmongPremises { event: result });
        }
        self.tree.assert_acyclic().map_err(|e| {
            self.reset();
            e
        })?;
        let rule = Rule {
            label: self.label.take(),
            premises: std::mem::take(&mut self.premises),
            snapshots: std::mem::take(&mut self.tree),
            guard: std::mem::take(&mut self.guard),
            conclusion: RuleConclusion::Consistent { result },
        };
        self.reset();
        Ok(rule)
    }

    /// Finalises a state-transferring rule from the staged transfers.
    pub fn create_transferring(&mut self) -> RuleResult<Rule> {
        if !self.transfers_staged {
            self.reset();
            return Err(RuleConstructionError::NoTransfers);
        }
        self.tree.assert_acyclic().map_err(|e| {
            self.reset();
            e
        })?;
        let rule = Rule {
            label: self.label.take(),
            premises: std::mem::take(&mut self.premises),
            snapshots: std::mem::take(&mut self.tree),
            guard: std::mem::take(&mut self.guard),
            conclusion: RuleConclusion::Transferring,
        };
        self.reset();
        Ok(rule)
    }

    fn reset(&mut self) {
        self.label = None;
        self.premises.clear();
        self.tree = SnapshotTree::new();
        self.guard = Guard::empty();
        self.transfers_staged = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_a_plain_consistent_rule() {
        let mut factory = RuleFactory::new();
        factory.add_premise(Event::know(Message::var("x"))).unwrap();
        factory.add_premise(Event::know(Message::var("y"))).unwrap();
        let rule = factory
            .create_consistent(Event::know(Message::func(
                "enc",
                vec![Message::var("x"), Message::var("y")],
            )))
            .expect("valid rule");
        assert_eq!(rule.premises.len(), 2);
        assert!(!rule.is_transferring());
    }

    #[test]
    fn builds_a_transferring_rule() {
        let mut factory = RuleFactory::new();
        let s = factory.register_state(State::new("cell", Message::name("a")));
        factory.set_transfer(s, State::new("cell", Message::name("b"))).unwrap();
        let rule = factory.create_transferring().expect("valid transfer rule");
        assert!(rule.is_transferring());
        assert_eq!(rule.transfers().len(), 1);
    }

    #[test]
    fn leak_premise_is_rejected() {
        let mut factory = RuleFactory::new();
        let err = factory.add_premise(Event::leak(Message::name("s"))).unwrap_err();
        assert!(matches!(err, RuleConstructionError::LeakAsPremise { .. }));
    }

    #[test]
    fn init_result_is_rejected() {
        let mut factory = RuleFactory::new();
        let err = factory
            .create_consistent(Event::init(Message::name("s")))
            .unwrap_err();
        assert!(matches!(err, RuleConstructionError::InvalidResultKind { .. }));
    }

    #[test]
    fn result_among_premises_is_rejected() {
        let mut factory = RuleFactory::new();
        factory.add_premise(Event::know(Message::name("a"))).unwrap();
        let err = factory
            .create_consistent(Event::know(Message::name("a")))
            .unwrap_err();
        assert!(matches!(err, RuleConstructionError::ResultAmongPremises { .. }));
    }

    #[test]
    fn transferring_without_transfers_is_rejected() {
        let mut factory = RuleFactory::new();
        factory.register_state(State::new("cell", Message::name("a")));
        let err = factory.create_transferring().unwrap_err();
        assert_eq!(err, RuleConstructionError::NoTransfers);
    }

    #[test]
    fn consistent_with_staged_transfers_is_rejected() {
        let mut factory = RuleFactory::new();
        let s = factory.register_state(State::new("cell", Message::name("a")));
        factory.set_transfer(s, State::new("cell", Message::name("b"))).unwrap();
        let err = factory
            .create_consistent(Event::know(Message::name("m")))
            .unwrap_err();
        assert_eq!(err, RuleConstructionError::ConflictingConclusions);
    }

    #[test]
    fn ordering_cycle_is_rejected() {
        let mut factory = RuleFactory::new();
        let a = factory.register_state(State::new("cell", Message::name("a")));
        let b = factory.register_state(State::new("cell", Message::name("b")));
        factory.link_later(a, b).unwrap();
        factory.link_later(b, a).unwrap();
        let err = factory
            .create_consistent(Event::know(Message::name("m")))
            .unwrap_err();
        assert_eq!(err, RuleConstructionError::OrderingCycle);
    }

    #[test]
    fn witnessing_an_unissued_snapshot_fails() {
        let mut factory = RuleFactory::new();
        let err = factory
            .add_premise_at(Event::know(Message::var("x")), &[4])
            .unwrap_err();
        assert!(matches!(err, RuleConstructionError::UnknownSnapshot { id: 4 }));
    }

    #[test]
    fn factory_resets_after_creation() {
        let mut factory = RuleFactory::new();
        factory.add_premise(Event::know(Message::var("x"))).unwrap();
        factory.set_label("first");
        let first = factory.create_consistent(Event::know(Message::name("a"))).unwrap();
        assert_eq!(first.label.as_deref(), Some("first"));

        let second = factory.create_consistent(Event::know(Message::name("b"))).unwrap();
        assert!(second.label.is_none());
        assert!(second.premises.is_empty());
    }
}
