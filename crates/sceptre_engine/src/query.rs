//! Backward resolution.
//!
//! The resolver maintains a worklist of partially discharged goals. Each
//! goal premise carries a **rank cap**: the latest frame whose knowledge
//! may discharge it. The caps are what make state-sensitive reasoning
//! sound — a clause valid at frame 2 can only consume knowledge that
//! existed by frame 2, even when the overall query is posed much later.
//! Splicing a frame-ranked clause caps its premises at its own rank;
//! splicing a universal clause propagates the consumed premise's cap.
//!
//! Universal clauses are preferred over frame-specific ones, duplicate
//! goals (up to variable renaming) are dropped, and the whole search is
//! bounded by the number of goals generated. A goal with no premises left
//! is a derivation of the query.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use log::debug;

use rustc_hash::FxHashSet;

use sceptre_algebra::{Guard, Message, SigmaFactory, SigmaMap};
use sceptre_rules::{rank_allows, ClauseOrigin, HornClause, UNIVERSAL_RANK};

/// Default bound on goals generated per resolution run.
pub const DEFAULT_CLAUSE_BUDGET: usize = 20_000;

/// How often the cancel flag is polled, in iterations.
const CANCEL_STRIDE: usize = 64;

/// The outcome of one resolution run.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// The premise-free derivation, if one was found.
    pub derivation: Option<HornClause>,
    pub clauses_generated: usize,
    pub cancelled: bool,
}

/// A partially discharged query: premises with their rank caps, plus the
/// composed clause kept for provenance.
#[derive(Debug, Clone)]
struct Goal {
    premises: Vec<(Message, i64)>,
    guard: Guard,
    derivation: HornClause,
}

impl Goal {
    /// A stable rendering modulo variable renaming, for deduplication.
    fn key(&self) -> String {
        let mut order: Vec<String> = Vec::new();
        for (m, _) in &self.premises {
            collect_vars(m, &mut order);
        }
        let mut sigma = SigmaMap::empty();
        for (i, var) in order.iter().enumerate() {
            sigma.insert(var.clone(), Message::var(format!("_g{}", i)));
        }
        let mut parts: Vec<String> = self
            .premises
            .iter()
            .map(|(m, cap)| format!("{}@{}", sigma.apply(m), cap))
            .collect();
        parts.sort();
        format!("{}|{}", parts.join(","), self.guard.substituted(&sigma))
    }
}

fn collect_vars(message: &Message, out: &mut Vec<String>) {
    match message {
        Message::Variable(v) => {
            if !out.iter().any(|seen| seen == v) {
                out.push(v.clone());
            }
        }
        Message::Function { args, .. } => {
            for a in args {
                collect_vars(a, out);
            }
        }
        Message::Tuple(members) => {
            for m in members {
                collect_vars(m, out);
            }
        }
        _ => {}
    }
}

/// Runs backward resolution for `query` over `clauses`.
///
/// `goal_rank` caps the query itself: the last frame index for a
/// per-nession run, or [`UNIVERSAL_RANK`] for the rank-oblivious global
/// check.
pub fn resolve_query(
    query: &Message,
    clauses: &[HornClause],
    goal_rank: i64,
    budget: usize,
    cancel: &AtomicBool,
) -> Resolution {
    // Universal clauses first: they discharge without pinning the frame.
    let mut ordered: Vec<&HornClause> = clauses.iter().collect();
    ordered.sort_by_key(|c| (c.rank != UNIVERSAL_RANK, c.rank));

    let root = Goal {
        premises: vec![(query.clone(), goal_rank)],
        guard: Guard::empty(),
        derivation: HornClause::new(vec![query.clone()], query.clone())
            .with_rank(goal_rank)
            .with_origin(ClauseOrigin::Query),
    };

    let mut counter: u32 = 0;
    let mut seen: FxHashSet<String> = FxHashSet::default();
    seen.insert(root.key());
    let mut worklist: VecDeque<Goal> = VecDeque::new();
    worklist.push_back(root);
    let mut generated = 0;
    let mut iterations = 0;

    while let Some(current) = worklist.pop_front() {
        iterations += 1;
        if iterations % CANCEL_STRIDE == 0 && cancel.load(Ordering::Relaxed) {
            return Resolution {
                derivation: None,
                clauses_generated: generated,
                cancelled: true,
            };
        }
        if current.premises.is_empty() {
            debug!("derivation found after {} generated goals", generated);
            return Resolution {
                derivation: Some(current.derivation),
                clauses_generated: generated,
                cancelled: false,
            };
        }
        if generated >= budget {
            break;
        }
        for clause in &ordered {
            let Some(next) = discharge_first(&current, clause, &mut counter) else {
                continue;
            };
            generated += 1;
            if !seen.insert(next.key()) {
                continue;
            }
            if next.premises.is_empty() {
                worklist.push_front(next);
            } else {
                worklist.push_back(next);
            }
            if generated >= budget {
                break;
            }
        }
    }

    debug!("no derivation within {} generated goals", generated);
    Resolution {
        derivation: None,
        clauses_generated: generated,
        cancelled: false,
    }
}

/// Discharges the goal's first premise with `clause`, if ranks, guards
/// and unification permit.
fn discharge_first(goal: &Goal, clause: &HornClause, counter: &mut u32) -> Option<Goal> {
    let (premise, cap) = goal.premises.first()?;
    if !rank_allows(clause.rank, *cap) {
        return None;
    }
    let clause = clause.freshened(counter);

    let mut factory = SigmaFactory::new_unify(&clause.guard, &goal.guard);
    if !factory.unify_terms(&clause.conclusion, premise) {
        return None;
    }
    let (fw, bw) = factory.into_maps();
    let sigma = fw.merged(&bw)?;

    let guard = clause
        .guard
        .substituted(&sigma)
        .union(&goal.guard.substituted(&sigma))
        .simplified();
    if guard.is_violated() {
        return None;
    }

    // A frame-ranked clause caps its premises at its own rank; a
    // universal clause inherits the consumed premise's cap.
    let inner_cap = if clause.rank == UNIVERSAL_RANK {
        *cap
    } else {
        clause.rank
    };
    let mut premises: Vec<(Message, i64)> = Vec::new();
    for p in &clause.premises {
        push_premise(&mut premises, sigma.apply(p), inner_cap);
    }
    for (p, c) in goal.premises.iter().skip(1) {
        push_premise(&mut premises, sigma.apply(p), *c);
    }

    // Refuse a step that merely reproduces what it set out to prove.
    let conclusion = sigma.apply(&goal.derivation.conclusion);
    if premises.iter().any(|(m, _)| *m == conclusion) {
        return None;
    }

    let derivation = HornClause {
        premises: premises.iter().map(|(m, _)| m.clone()).collect(),
        conclusion,
        guard: guard.clone(),
        rank: goal.derivation.rank,
        origin: ClauseOrigin::Composition {
            left: Box::new(clause.clone()),
            right: Box::new(goal.derivation.clone()),
        },
    };

    Some(Goal {
        premises,
        guard,
        derivation,
    })
}

/// Adds a premise, merging duplicates onto the strictest cap: one
/// discharge at the earlier frame satisfies both requirements.
fn push_premise(premises: &mut Vec<(Message, i64)>, message: Message, cap: i64) {
    match premises.iter_mut().find(|(q, _)| *q == message) {
        Some(entry) => entry.1 = strictest_cap(entry.1, cap),
        None => premises.push((message, cap)),
    }
}

fn strictest_cap(a: i64, b: i64) -> i64 {
    if a == UNIVERSAL_RANK {
        b
    } else if b == UNIVERSAL_RANK {
        a
    } else {
        a.min(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fact(m: Message) -> HornClause {
        HornClause::new(vec![], m)
    }

    fn no_cancel() -> AtomicBool {
        AtomicBool::new(false)
    }

    #[test]
    fn a_fact_resolves_immediately() {
        let clauses = vec![fact(Message::name("s"))];
        let res = resolve_query(
            &Message::name("s"),
            &clauses,
            UNIVERSAL_RANK,
            DEFAULT_CLAUSE_BUDGET,
            &no_cancel(),
        );
        assert!(res.derivation.is_some());
    }

    #[test]
    fn a_two_step_derivation_is_found() {
        // k(a), k(b) -> k(enc(a, b)); facts a, b; query enc(a, b).
        let clauses = vec![
            HornClause::new(
                vec![Message::var("x"), Message::var("y")],
                Message::func("enc", vec![Message::var("x"), Message::var("y")]),
            ),
            fact(Message::name("a")),
            fact(Message::name("b")),
        ];
        let query = Message::func("enc", vec![Message::name("a"), Message::name("b")]);
        let res = resolve_query(&query, &clauses, UNIVERSAL_RANK, DEFAULT_CLAUSE_BUDGET, &no_cancel());
        let derivation = res.derivation.expect("derivable");
        assert!(derivation.is_fact());
        assert!(derivation.provenance_chain().len() >= 3);
    }

    #[test]
    fn underivable_queries_fail_finitely() {
        let clauses = vec![fact(Message::name("a"))];
        let res = resolve_query(
            &Message::name("s"),
            &clauses,
            UNIVERSAL_RANK,
            DEFAULT_CLAUSE_BUDGET,
            &no_cancel(),
        );
        assert!(res.derivation.is_none());
        assert!(!res.cancelled);
    }

    #[test]
    fn guards_block_banned_instantiations() {
        // [x ~/> a[]] k(x), k(y) -> k(enc(x, y)) with facts a, b.
        let mut guard = Guard::empty();
        guard.forbid(Message::var("x"), Message::name("a"));
        let clauses = vec![
            HornClause::new(
                vec![Message::var("x"), Message::var("y")],
                Message::func("enc", vec![Message::var("x"), Message::var("y")]),
            )
            .with_guard(guard),
            fact(Message::name("a")),
            fact(Message::name("b")),
        ];
        let blocked = Message::func("enc", vec![Message::name("a"), Message::name("b")]);
        let res = resolve_query(&blocked, &clauses, UNIVERSAL_RANK, DEFAULT_CLAUSE_BUDGET, &no_cancel());
        assert!(res.derivation.is_none());

        let allowed = Message::func("enc", vec![Message::name("b"), Message::name("a")]);
        let res = resolve_query(&allowed, &clauses, UNIVERSAL_RANK, DEFAULT_CLAUSE_BUDGET, &no_cancel());
        assert!(res.derivation.is_some());
    }

    #[test]
    fn ranks_gate_frame_specific_knowledge() {
        // The secret is only derivable from a clause valid at frame 2; a
        // goal capped at frame 1 must not use it.
        let clauses = vec![fact(Message::name("s")).with_rank(2)];
        let early = resolve_query(&Message::name("s"), &clauses, 1, DEFAULT_CLAUSE_BUDGET, &no_cancel());
        assert!(early.derivation.is_none());
        let late = resolve_query(&Message::name("s"), &clauses, 2, DEFAULT_CLAUSE_BUDGET, &no_cancel());
        assert!(late.derivation.is_some());
    }

    #[test]
    fn caps_do_not_ratchet_up_through_composition() {
        // An early clause needs k(d) *at its own frame*; d only becomes
        // known later. The late query rank must not launder the early
        // premise.
        let clauses = vec![
            // frame 1: if the attacker knew d by then, the secret leaks.
            HornClause::new(vec![Message::name("d")], Message::name("s")).with_rank(1),
            // frame 5: d becomes known.
            fact(Message::name("d")).with_rank(5),
        ];
        let res = resolve_query(&Message::name("s"), &clauses, 9, DEFAULT_CLAUSE_BUDGET, &no_cancel());
        assert!(res.derivation.is_none());
    }

    #[test]
    fn universal_clauses_propagate_the_consumers_cap() {
        // pair(x, y) is buildable at any time, but its components still
        // have to respect the cap of the premise being discharged.
        let clauses = vec![
            HornClause::new(
                vec![Message::var("x"), Message::var("y")],
                Message::func("pair", vec![Message::var("x"), Message::var("y")]),
            ),
            fact(Message::name("early")).with_rank(1),
            fact(Message::name("late")).with_rank(7),
        ];
        let query = Message::func("pair", vec![Message::name("early"), Message::name("late")]);
        let capped = resolve_query(&query, &clauses, 3, DEFAULT_CLAUSE_BUDGET, &no_cancel());
        assert!(capped.derivation.is_none());
        let open = resolve_query(&query, &clauses, 8, DEFAULT_CLAUSE_BUDGET, &no_cancel());
        assert!(open.derivation.is_some());
    }

    #[test]
    fn budget_bounds_divergent_searches() {
        // k(h(x)) -> k(x) keeps growing goals forever.
        let clauses = vec![HornClause::new(
            vec![Message::func("h", vec![Message::var("x")])],
            Message::var("x"),
        )];
        let res = resolve_query(&Message::name("s"), &clauses, UNIVERSAL_RANK, 50, &no_cancel());
        assert!(res.derivation.is_none());
        assert!(res.clauses_generated <= 51);
    }

    #[test]
    fn renamed_duplicates_are_pruned() {
        // Every pass through h introduces fresh variables; the goal shape
        // stays the same and must be recognised as already seen.
        let clauses = vec![
            HornClause::new(
                vec![Message::func("h", vec![Message::var("x")])],
                Message::var("x"),
            ),
            fact(Message::name("a")),
        ];
        let res = resolve_query(&Message::name("s"), &clauses, UNIVERSAL_RANK, 1_000, &no_cancel());
        assert!(res.derivation.is_none());
        assert!(!res.cancelled);
    }

    #[test]
    fn cancellation_stops_the_loop() {
        let clauses = vec![HornClause::new(
            vec![Message::func("h", vec![Message::var("x")])],
            Message::var("x"),
        )];
        let cancel = AtomicBool::new(true);
        let res = resolve_query(
            &Message::name("s"),
            &clauses,
            UNIVERSAL_RANK,
            DEFAULT_CLAUSE_BUDGET,
            &cancel,
        );
        assert!(res.cancelled || res.derivation.is_none());
    }
}
