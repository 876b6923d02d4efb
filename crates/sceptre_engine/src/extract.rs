//! Clause extraction: specialising state-consistent rules against a
//! nession.
//!
//! A consistent rule fires inside a nession when every snapshot it
//! requires can be assigned a frame whose state for that cell unifies
//! with the snapshot's, respecting the rule's ordering links. The result
//! is a [`HornClause`] ranked at the latest frame used, whose premises
//! are the rule's own knowledge premises plus everything the matched
//! states carried.

use sceptre_algebra::{Guard, Message, SigmaFactory};
use sceptre_rules::{ClauseOrigin, HornClause, Rule, SnapshotId, TraceLink, UNIVERSAL_RANK};

use crate::nession::Nession;

/// Converts a stateless consistent rule into a universal clause.
pub fn global_clause(rule: &Rule) -> Option<HornClause> {
    if rule.is_transferring() || !rule.is_stateless() {
        return None;
    }
    let result = rule.result()?;
    let origin = match &rule.label {
        Some(label) => ClauseOrigin::Named { label: label.clone() },
        None => ClauseOrigin::Knowledge,
    };
    Some(
        HornClause::new(
            rule.premises.iter().map(|p| p.event.message.clone()).collect(),
            result.message.clone(),
        )
        .with_guard(rule.guard.clone())
        .with_rank(UNIVERSAL_RANK)
        .with_origin(origin),
    )
}

/// Extracts every rank-annotated clause a nession supports.
pub fn nession_clauses(
    nession: &Nession,
    consistent: &[Rule],
    counter: &mut u32,
) -> Vec<HornClause> {
    let mut out = Vec::new();
    for rule in consistent {
        if rule.is_transferring() || rule.is_stateless() {
            continue;
        }
        let fresh = rule.freshened(counter);
        let snapshot_ids: Vec<SnapshotId> =
            fresh.snapshots.iter().map(|(id, _)| id).collect();
        let empty = Guard::empty();
        let factory = SigmaFactory::new_match(&fresh.guard, &empty);
        let mut assignment: Vec<(SnapshotId, usize)> = Vec::new();
        assign(
            nession,
            &fresh,
            &snapshot_ids,
            0,
            &factory,
            &mut assignment,
            &mut out,
        );
    }
    let mut deduped: Vec<HornClause> = Vec::new();
    for clause in out {
        if !deduped.iter().any(|seen| seen.implies(&clause)) {
            deduped.retain(|seen| !clause.implies(seen));
            deduped.push(clause);
        }
    }
    deduped
}

/// Backtracking assignment of the rule's snapshots to frames.
fn assign(
    nession: &Nession,
    rule: &Rule,
    ids: &[SnapshotId],
    index: usize,
    factory: &SigmaFactory<'_>,
    assignment: &mut Vec<(SnapshotId, usize)>,
    out: &mut Vec<HornClause>,
) {
    if index == ids.len() {
        if let Some(clause) = finish(nession, rule, factory, assignment) {
            out.push(clause);
        }
        return;
    }
    let id = ids[index];
    let node = rule.snapshots.node(id);
    for (frame_idx, frame) in nession.frames.iter().enumerate() {
        let Some(fs) = frame.state_of(&node.state.cell) else {
            continue;
        };
        let mut trial = factory.clone();
        if !trial.unify_terms(&node.state.value, &fs.state.value) {
            continue;
        }
        assignment.push((id, frame_idx));
        if orderings_hold(nession, rule, assignment) {
            assign(nession, rule, ids, index + 1, &trial, assignment, out);
        }
        assignment.pop();
    }
}

/// Checks the rule's ordering links against the partial assignment.
fn orderings_hold(
    nession: &Nession,
    rule: &Rule,
    assignment: &[(SnapshotId, usize)],
) -> bool {
    let frame_of = |id: SnapshotId| assignment.iter().find(|(s, _)| *s == id).map(|(_, f)| *f);
    for (later, node) in rule.snapshots.iter() {
        let Some(later_frame) = frame_of(later) else {
            continue;
        };
        for (earlier, strength) in &node.predecessors {
            let Some(earlier_frame) = frame_of(*earlier) else {
                continue;
            };
            match strength {
                TraceLink::LaterThan => {
                    if earlier_frame > later_frame {
                        return false;
                    }
                }
                TraceLink::ModifiedOnce => {
                    if earlier_frame >= later_frame {
                        return false;
                    }
                    let cell = &node.state.cell;
                    if mutation_count(nession, cell, earlier_frame, later_frame) != 1 {
                        return false;
                    }
                }
            }
        }
    }
    true
}

/// How many times `cell` changed value in frames `(from, to]`.
fn mutation_count(nession: &Nession, cell: &str, from: usize, to: usize) -> usize {
    let mut count = 0;
    for i in (from + 1)..=to {
        let before = nession.frames[i - 1].state_of(cell).map(|fs| &fs.state.value);
        let after = nession.frames[i].state_of(cell).map(|fs| &fs.state.value);
        if before != after {
            count += 1;
        }
    }
    count
}

fn finish(
    nession: &Nession,
    rule: &Rule,
    factory: &SigmaFactory<'_>,
    assignment: &[(SnapshotId, usize)],
) -> Option<HornClause> {
    let sigma = factory.forward_map();
    let mut guard = rule.guard.substituted(&sigma).simplified();

    let mut premises: Vec<Message> = Vec::new();
    for p in &rule.premises {
        let m = sigma.apply(&p.event.message);
        if !premises.contains(&m) {
            premises.push(m);
        }
    }
    let mut rank = UNIVERSAL_RANK;
    for (id, frame_idx) in assignment {
        rank = rank.max(*frame_idx as i64);
        let node = rule.snapshots.node(*id);
        let fs = nession.frames[*frame_idx].state_of(&node.state.cell)?;
        for p in &fs.premises {
            if !premises.contains(p) {
                premises.push(p.clone());
            }
        }
        guard = guard.union(&fs.guard);
    }
    guard = guard.simplified();
    if guard.is_violated() {
        return None;
    }

    let conclusion = sigma.apply(&rule.result()?.message);
    if premises.contains(&conclusion) {
        return None;
    }

    let origin = match &rule.label {
        Some(label) => ClauseOrigin::Named { label: label.clone() },
        None => ClauseOrigin::Frame { frame: rank.max(0) as usize },
    };
    Some(
        HornClause::new(premises, conclusion)
            .with_guard(guard)
            .with_rank(rank)
            .with_origin(origin),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use sceptre_algebra::{Event, State};
    use sceptre_rules::RuleFactory;

    use crate::nession::{Frame, FrameState};

    fn nession_with_frames(frames: Vec<Vec<FrameState>>) -> Nession {
        Nession {
            frames: frames
                .into_iter()
                .map(|states| Frame { states, applied: vec![] })
                .collect(),
        }
    }

    fn observer(cell: &str, value: Message, premise: Option<Message>, result: Message) -> Rule {
        let mut factory = RuleFactory::new();
        let id = factory.register_state(State::new(cell, value));
        if let Some(p) = premise {
            factory.add_premise_at(Event::know(p), &[id]).unwrap();
        }
        factory.create_consistent(Event::know(result)).unwrap()
    }

    #[test]
    fn stateless_rules_become_universal_clauses() {
        let mut factory = RuleFactory::new();
        factory.add_premise(Event::know(Message::var("x"))).unwrap();
        let rule = factory
            .create_consistent(Event::know(Message::func("h", vec![Message::var("x")])))
            .unwrap();
        let clause = global_clause(&rule).expect("stateless rule converts");
        assert_eq!(clause.rank, UNIVERSAL_RANK);
        assert_eq!(clause.premises.len(), 1);
    }

    #[test]
    fn stateful_rules_are_not_global() {
        let rule = observer("cell", Message::var("x"), None, Message::var("x"));
        assert!(global_clause(&rule).is_none());
    }

    #[test]
    fn extraction_ranks_the_clause_at_its_frame() {
        // Frame 0: cell(idle);  frame 1: cell(w(s)).
        let nession = nession_with_frames(vec![
            vec![FrameState::new(State::new("cell", Message::name("idle")))],
            vec![FrameState::new(State::new(
                "cell",
                Message::func("w", vec![Message::name("s")]),
            ))],
        ]);
        let rule = observer(
            "cell",
            Message::func("w", vec![Message::var("x")]),
            Some(Message::name("chan")),
            Message::var("x"),
        );
        let mut counter = 0;
        let clauses = nession_clauses(&nession, &[rule], &mut counter);
        assert_eq!(clauses.len(), 1);
        assert_eq!(clauses[0].rank, 1);
        assert_eq!(clauses[0].conclusion, Message::name("s"));
        assert_eq!(clauses[0].premises, vec![Message::name("chan")]);
    }

    #[test]
    fn carried_state_premises_enter_the_clause() {
        let nession = nession_with_frames(vec![vec![FrameState {
            state: State::new("cell", Message::name("v")),
            premises: vec![Message::name("needed")],
            guard: Guard::empty(),
        }]]);
        let rule = observer("cell", Message::name("v"), None, Message::name("out"));
        let mut counter = 0;
        let clauses = nession_clauses(&nession, &[rule], &mut counter);
        assert_eq!(clauses.len(), 1);
        assert!(clauses[0].premises.contains(&Message::name("needed")));
    }

    #[test]
    fn unmatched_states_yield_no_clause() {
        let nession = nession_with_frames(vec![vec![FrameState::new(State::new(
            "cell",
            Message::name("other"),
        ))]]);
        let rule = observer("cell", Message::name("v"), None, Message::name("out"));
        let mut counter = 0;
        assert!(nession_clauses(&nession, &[rule], &mut counter).is_empty());
    }

    #[test]
    fn ordering_links_restrict_frame_assignments() {
        // cell moves a -> b; a rule requiring b at-or-before a cannot
        // match, while the natural order can.
        let nession = nession_with_frames(vec![
            vec![FrameState::new(State::new("cell", Message::name("a")))],
            vec![FrameState::new(State::new("cell", Message::name("b")))],
        ]);

        let mut factory = RuleFactory::new();
        let first = factory.register_state(State::new("cell", Message::name("a")));
        let second = factory.register_state(State::new("cell", Message::name("b")));
        factory.link_later(first, second).unwrap();
        let natural = factory.create_consistent(Event::know(Message::name("ok"))).unwrap();

        let mut factory = RuleFactory::new();
        let first = factory.register_state(State::new("cell", Message::name("b")));
        let second = factory.register_state(State::new("cell", Message::name("a")));
        factory.link_later(first, second).unwrap();
        let reversed = factory.create_consistent(Event::know(Message::name("no"))).unwrap();

        let mut counter = 0;
        let clauses = nession_clauses(&nession, &[natural, reversed], &mut counter);
        assert_eq!(clauses.len(), 1);
        assert_eq!(clauses[0].conclusion, Message::name("ok"));
    }

    #[test]
    fn modified_once_requires_exactly_one_transition() {
        let nession = nession_with_frames(vec![
            vec![FrameState::new(State::new("cell", Message::name("a")))],
            vec![FrameState::new(State::new("cell", Message::name("b")))],
            vec![FrameState::new(State::new("cell", Message::name("c")))],
        ]);

        let build = |from: &str, to: &str| {
            let mut factory = RuleFactory::new();
            let first = factory.register_state(State::new("cell", Message::name(from)));
            let second = factory.register_state(State::new("cell", Message::name(to)));
            factory.link_modified_once(first, second).unwrap();
            factory
                .create_consistent(Event::know(Message::name(format!("{}to{}", from, to))))
                .unwrap()
        };

        let one_step = build("a", "b");
        let two_steps = build("a", "c");
        let mut counter = 0;
        let clauses = nession_clauses(&nession, &[one_step, two_steps], &mut counter);
        assert_eq!(clauses.len(), 1);
        assert_eq!(clauses[0].conclusion, Message::name("atob"));
    }
}
