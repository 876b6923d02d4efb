//! Rank-annotated Horn clauses.
//!
//! A [`HornClause`] is the pure logical residue of a rule once its state
//! requirements have been discharged against a concrete symbolic
//! execution: premises and conclusion are attacker-knowledge terms, the
//! guard survives, and the `rank` records the nession frame the clause is
//! valid at (`UNIVERSAL_RANK` for frame-independent clauses).
//!
//! Clauses carry their provenance in [`ClauseOrigin`] so that a finished
//! derivation can be unwound into a human-readable attack chain.

use std::fmt;

use sceptre_algebra::{Guard, Message, SigmaFactory, SigmaMap};

/// Rank of clauses valid in every frame.
pub const UNIVERSAL_RANK: i64 = -1;

/// Returns `true` when a clause of rank `provider` may discharge a premise
/// of a clause of rank `consumer`: knowledge is monotone, so anything
/// established at or before the consumer's frame (or universally) counts.
pub fn rank_allows(provider: i64, consumer: i64) -> bool {
    provider == UNIVERSAL_RANK || consumer == UNIVERSAL_RANK || provider <= consumer
}

/// The rank of a clause combining material of ranks `a` and `b`.
pub fn combined_rank(a: i64, b: i64) -> i64 {
    if a == UNIVERSAL_RANK {
        b
    } else if b == UNIVERSAL_RANK {
        a
    } else {
        a.max(b)
    }
}

/// Where a clause came from.
#[derive(Debug, Clone, PartialEq)]
pub enum ClauseOrigin {
    /// Emitted directly from a labelled rule.
    Named { label: String },
    /// Part of the attacker's base knowledge theory.
    Knowledge,
    /// Specialised from a state-consistent rule inside a nession frame.
    Frame { frame: usize },
    /// Produced by resolving `right`'s selected premise with `left`.
    Composition {
        left: Box<HornClause>,
        right: Box<HornClause>,
    },
    /// An instance of `base` under a substitution.
    Substitution { base: Box<HornClause> },
    /// The goal clause the query engine starts from.
    Query,
}

/// A guarded, rank-annotated Horn clause over knowledge terms.
#[derive(Debug, Clone, PartialEq)]
pub struct HornClause {
    pub premises: Vec<Message>,
    pub conclusion: Message,
    pub guard: Guard,
    pub rank: i64,
    pub origin: ClauseOrigin,
}

impl HornClause {
    /// A universal clause with an empty guard.
    pub fn new(premises: Vec<Message>, conclusion: Message) -> HornClause {
        HornClause {
            premises,
            conclusion,
            guard: Guard::empty(),
            rank: UNIVERSAL_RANK,
            origin: ClauseOrigin::Knowledge,
        }
    }

    pub fn with_guard(mut self, guard: Guard) -> HornClause {
        self.guard = guard;
        self
    }

    pub fn with_rank(mut self, rank: i64) -> HornClause {
        self.rank = rank;
        self
    }

    pub fn with_origin(mut self, origin: ClauseOrigin) -> HornClause {
        self.origin = origin;
        self
    }

    /// A clause with no premises left to discharge.
    pub fn is_fact(&self) -> bool {
        self.premises.is_empty()
    }

    /// Applies a substitution to premises, conclusion and guard.
    pub fn substituted(&self, sigma: &SigmaMap) -> HornClause {
        HornClause {
            premises: self.premises.iter().map(|p| sigma.apply(p)).collect(),
            conclusion: sigma.apply(&self.conclusion),
            guard: self.guard.substituted(sigma),
            rank: self.rank,
            origin: self.origin.clone(),
        }
    }

    /// Renames every variable with the shared operation counter.
    pub fn freshened(&self, counter: &mut u32) -> HornClause {
        let mut vars: Vec<String> = Vec::new();
        for p in &self.premises {
            for v in p.variables() {
                if !vars.contains(&v) {
                    vars.push(v);
                }
            }
        }
        for v in self.conclusion.variables() {
            if !vars.contains(&v) {
                vars.push(v);
            }
        }
        for (l, r) in self.guard.entries() {
            for v in l.variables().into_iter().chain(r.variables()) {
                if !vars.contains(&v) {
                    vars.push(v);
                }
            }
        }
        vars.sort();
        let mut sigma = SigmaMap::empty();
        for var in vars {
            let base = match var.rfind('-') {
                Some(pos) if var[pos + 1..].chars().all(|c| c.is_ascii_digit()) => &var[..pos],
                _ => var.as_str(),
            };
            sigma.insert(var.clone(), Message::var(format!("{}-{}", base, counter)));
            *counter += 1;
        }
        self.substituted(&sigma)
    }

    /// Does this clause subsume `other`?
    ///
    /// Requires a substitution carrying our premises into a subset of
    /// `other`'s, equal conclusions, a surviving guard, and a rank that
    /// covers every frame `other`'s rank covers.
    pub fn implies(&self, other: &HornClause) -> bool {
        if self.premises.len() > other.premises.len() {
            return false;
        }
        if !(self.rank == UNIVERSAL_RANK || self.rank == other.rank) {
            return false;
        }
        let mut factory = SigmaFactory::new_match(&self.guard, &other.guard);
        if !factory.unify_terms(&self.conclusion, &other.conclusion) {
            return false;
        }
        subset_match(&self.premises, &other.premises, &factory).is_some()
    }

    /// One backward-resolution step: discharge the premise at `index`
    /// using `provider`, whose conclusion must unify with it.
    ///
    /// Both clauses are freshened with the shared counter first. The
    /// result splices `provider`'s premises in place of the discharged
    /// one, unions the guards and combines the ranks; `None` when
    /// unification, guards or ranks refuse, or when the result concludes
    /// one of its own premises.
    pub fn resolved_with(
        &self,
        index: usize,
        provider: &HornClause,
        counter: &mut u32,
    ) -> Option<HornClause> {
        if !rank_allows(provider.rank, self.rank) {
            return None;
        }
        let goal = self.freshened(counter);
        let prov = provider.freshened(counter);
        let premise = goal.premises.get(index)?;

        let mut factory = SigmaFactory::new_unify(&prov.guard, &goal.guard);
        if !factory.unify_terms(&prov.conclusion, premise) {
            return None;
        }
        let (fw, bw) = factory.into_maps();
        let sigma = fw.merged(&bw)?;

        let guard = prov
            .guard
            .substituted(&sigma)
            .union(&goal.guard.substituted(&sigma))
            .simplified();
        if guard.is_violated() {
            return None;
        }

        let mut premises: Vec<Message> = Vec::new();
        for p in &prov.premises {
            let m = sigma.apply(p);
            if !premises.contains(&m) {
                premises.push(m);
            }
        }
        for (i, p) in goal.premises.iter().enumerate() {
            if i == index {
                continue;
            }
            let m = sigma.apply(p);
            if !premises.contains(&m) {
                premises.push(m);
            }
        }

        let conclusion = sigma.apply(&goal.conclusion);
        if premises.contains(&conclusion) {
            return None;
        }

        Some(HornClause {
            premises,
            conclusion,
            guard,
            rank: combined_rank(prov.rank, goal.rank),
            origin: ClauseOrigin::Composition {
                left: Box::new(provider.clone()),
                right: Box::new(self.clone()),
            },
        })
    }

    /// The chain of source clauses under this clause's provenance, leaves
    /// first.
    pub fn provenance_chain(&self) -> Vec<&HornClause> {
        let mut out = Vec::new();
        collect_chain(self, &mut out);
        out
    }
}

fn collect_chain<'a>(clause: &'a HornClause, out: &mut Vec<&'a HornClause>) {
    match &clause.origin {
        ClauseOrigin::Composition { left, right } => {
            collect_chain(left, out);
            collect_chain(right, out);
        }
        ClauseOrigin::Substitution { base } => collect_chain(base, out),
        _ => out.push(clause),
    }
}

/// Backtracking subset match of `ours` into `theirs` under one factory.
fn subset_match<'g>(
    ours: &[Message],
    theirs: &[Message],
    factory: &SigmaFactory<'g>,
) -> Option<SigmaFactory<'g>> {
    let Some((first, rest)) = ours.split_first() else {
        return Some(factory.clone());
    };
    for candidate in theirs {
        let mut trial = factory.clone();
        if trial.unify_terms(first, candidate) {
            if let Some(done) = subset_match(rest, theirs, &trial) {
                return Some(done);
            }
        }
    }
    None
}

impl fmt::Display for HornClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.guard.is_empty() {
            write!(f, "{} ", self.guard)?;
        }
        for (i, p) in self.premises.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "k({})", p)?;
        }
        if !self.premises.is_empty() {
            write!(f, " ")?;
        }
        write!(f, "-> k({})", self.conclusion)?;
        if self.rank != UNIVERSAL_RANK {
            write!(f, " @{}", self.rank)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sceptre_algebra::Message;

    #[test]
    fn resolution_splices_provider_premises() {
        // goal: k(enc(s[], k[])), k(k[]) -> k(s[])
        let goal = HornClause::new(
            vec![
                Message::func("enc", vec![Message::name("s"), Message::name("k")]),
                Message::name("k"),
            ],
            Message::name("s"),
        );
        // provider: k(x), k(y) -> k(enc(x, y))
        let provider = HornClause::new(
            vec![Message::var("x"), Message::var("y")],
            Message::func("enc", vec![Message::var("x"), Message::var("y")]),
        );
        let mut counter = 0;
        let resolved = goal.resolved_with(0, &provider, &mut counter).expect("resolves");
        assert_eq!(resolved.premises.len(), 2);
        assert!(resolved.premises.contains(&Message::name("s")));
        assert!(resolved.premises.contains(&Message::name("k")));
        assert_eq!(resolved.conclusion, Message::name("s"));
    }

    #[test]
    fn resolution_respects_ranks() {
        let goal = HornClause::new(vec![Message::name("a")], Message::name("b")).with_rank(2);
        let early = HornClause::new(vec![], Message::name("a")).with_rank(1);
        let late = HornClause::new(vec![], Message::name("a")).with_rank(5);
        let universal = HornClause::new(vec![], Message::name("a"));
        let mut counter = 0;
        assert!(goal.resolved_with(0, &early, &mut counter).is_some());
        assert!(goal.resolved_with(0, &late, &mut counter).is_none());
        let resolved = goal.resolved_with(0, &universal, &mut counter).unwrap();
        assert_eq!(resolved.rank, 2);
    }

    #[test]
    fn combined_rank_takes_the_later_frame() {
        assert_eq!(combined_rank(UNIVERSAL_RANK, 3), 3);
        assert_eq!(combined_rank(2, UNIVERSAL_RANK), 2);
        assert_eq!(combined_rank(1, 3), 3);
        assert_eq!(combined_rank(UNIVERSAL_RANK, UNIVERSAL_RANK), UNIVERSAL_RANK);
    }

    #[test]
    fn resolution_rejects_guard_violation() {
        let goal = HornClause::new(
            vec![Message::func("h", vec![Message::name("a")])],
            Message::name("ok"),
        );
        let mut guard = Guard::empty();
        guard.forbid(Message::var("x"), Message::name("a"));
        let provider = HornClause::new(
            vec![Message::var("x")],
            Message::func("h", vec![Message::var("x")]),
        )
        .with_guard(guard);
        let mut counter = 0;
        assert!(goal.resolved_with(0, &provider, &mut counter).is_none());
    }

    #[test]
    fn implication_prunes_instances() {
        let general = HornClause::new(
            vec![Message::var("x")],
            Message::func("h", vec![Message::var("x")]),
        );
        let instance = HornClause::new(
            vec![Message::name("a"), Message::name("b")],
            Message::func("h", vec![Message::name("a")]),
        );
        assert!(general.implies(&instance));
        assert!(!instance.implies(&general));
    }

    #[test]
    fn universal_clause_implies_ranked_instance() {
        let general = HornClause::new(vec![], Message::var("x"));
        let ranked = HornClause::new(vec![], Message::name("a")).with_rank(4);
        assert!(general.implies(&ranked));
        assert!(!ranked.implies(&general));
    }

    #[test]
    fn provenance_chain_unwinds_compositions() {
        let base = HornClause::new(vec![], Message::name("a"));
        let goal = HornClause::new(vec![Message::name("a")], Message::name("b"))
            .with_origin(ClauseOrigin::Query);
        let mut counter = 0;
        let resolved = goal.resolved_with(0, &base, &mut counter).unwrap();
        let chain = resolved.provenance_chain();
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn display_includes_rank_and_guard() {
        let mut guard = Guard::empty();
        guard.forbid(Message::var("x"), Message::name("a"));
        let clause = HornClause::new(vec![Message::var("x")], Message::var("x"))
            .with_guard(guard)
            .with_rank(3);
        assert_eq!(clause.to_string(), "[x ~/> a[]] k(x) -> k(x) @3");
    }
}
