//! Stateful Horn rules.
//!
//! A rule couples a set of premises (events, each optionally witnessed by
//! snapshots) with a snapshot tree, a guard, and a conclusion. The
//! conclusion is a tagged variant: *state-consistent* rules conclude an
//! event; *state-transferring* rules conclude the mutations recorded as
//! `transfers_to` on their snapshots.
//!
//! Rule variables are local. Every cross-rule operation (implication,
//! composition, transfer application) freshens both participants first so
//! that their variable sets cannot collide.

use std::fmt;

use rustc_hash::{FxHashMap, FxHashSet};

use sceptre_algebra::{Event, Guard, Message, SigmaFactory, SigmaMap, State};

use crate::snapshot::{SnapshotId, SnapshotTree, TraceLink};

// ============================================================================
// Data model
// ============================================================================

/// A premise: an event, witnessed by zero or more snapshots of the rule's
/// tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Premise {
    pub event: Event,
    pub snapshots: Vec<SnapshotId>,
}

impl Premise {
    pub fn new(event: Event) -> Premise {
        Premise {
            event,
            snapshots: Vec::new(),
        }
    }

    pub fn with_snapshots(event: Event, snapshots: Vec<SnapshotId>) -> Premise {
        Premise { event, snapshots }
    }

    fn substituted(&self, sigma: &SigmaMap) -> Premise {
        Premise {
            event: self.event.substituted(sigma),
            snapshots: self.snapshots.clone(),
        }
    }
}

/// What a rule concludes.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleConclusion {
    /// The rule derives an event whenever premises and trace agree.
    Consistent { result: Event },
    /// The rule mutates the cells whose snapshots carry `transfers_to`.
    Transferring,
}

/// A stateful Horn rule.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub label: Option<String>,
    pub premises: Vec<Premise>,
    pub snapshots: SnapshotTree,
    pub guard: Guard,
    pub conclusion: RuleConclusion,
}

impl Rule {
    pub fn is_transferring(&self) -> bool {
        matches!(self.conclusion, RuleConclusion::Transferring)
    }

    /// The result event of a state-consistent rule.
    pub fn result(&self) -> Option<&Event> {
        match &self.conclusion {
            RuleConclusion::Consistent { result } => Some(result),
            RuleConclusion::Transferring => None,
        }
    }

    /// The mutations of a state-transferring rule.
    pub fn transfers(&self) -> Vec<(SnapshotId, State, State)> {
        self.snapshots
            .transfers()
            .map(|(id, src, tgt)| (id, src.clone(), tgt.clone()))
            .collect()
    }

    /// A rule with neither snapshots nor transfers: already a plain Horn
    /// clause in disguise.
    pub fn is_stateless(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Every variable occurring anywhere in the rule.
    pub fn variables(&self) -> FxHashSet<String> {
        let mut vars = FxHashSet::default();
        for p in &self.premises {
            p.event.message.collect_variables(&mut vars);
        }
        for (_, node) in self.snapshots.iter() {
            node.state.value.collect_variables(&mut vars);
            if let Some(t) = &node.transfers_to {
                t.value.collect_variables(&mut vars);
            }
        }
        for (l, r) in self.guard.entries() {
            l.collect_variables(&mut vars);
            r.collect_variables(&mut vars);
        }
        if let Some(result) = self.result() {
            result.message.collect_variables(&mut vars);
        }
        vars
    }

    /// Applies a substitution to every message in the rule.
    ///
    /// The guard is substituted but *not* checked; callers that may have
    /// concretised guarded variables must inspect
    /// [`Guard::is_violated`] on the result.
    pub fn substituted(&self, sigma: &SigmaMap) -> Rule {
        Rule {
            label: self.label.clone(),
            premises: self.premises.iter().map(|p| p.substituted(sigma)).collect(),
            snapshots: self.snapshots.substituted(sigma),
            guard: self.guard.substituted(sigma),
            conclusion: match &self.conclusion {
                RuleConclusion::Consistent { result } => RuleConclusion::Consistent {
                    result: result.substituted(sigma),
                },
                RuleConclusion::Transferring => RuleConclusion::Transferring,
            },
        }
    }

    /// Renames every variable to one unique to the current operation.
    ///
    /// The counter is shared by all participants of an operation, so two
    /// freshened rules can never collide. A previous freshening suffix is
    /// stripped first to keep names from growing without bound.
    pub fn freshened(&self, counter: &mut u32) -> Rule {
        let mut sigma = SigmaMap::empty();
        let mut vars: Vec<String> = self.variables().into_iter().collect();
        vars.sort();
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

    // ------------------------------------------------------------------------
    // Implication
    // ------------------------------------------------------------------------

    /// Does this rule subsume `other`?
    ///
    /// Holds when a substitution σ exists such that every premise of
    /// σ(self) appears among `other`'s premises with compatible snapshot
    /// witnesses, σ(self)'s ordering constraints hold in `other`'s tree,
    /// the conclusions agree, and σ respects both guards. Returns the
    /// witnessing substitution.
    pub fn implies(&self, other: &Rule) -> Option<SigmaMap> {
        if self.premises.len() > other.premises.len() {
            return None;
        }
        let mut factory = SigmaFactory::new_match(&self.guard, &other.guard);
        match (&self.conclusion, &other.conclusion) {
            (RuleConclusion::Consistent { result: a }, RuleConclusion::Consistent { result: b }) => {
                if a.kind != b.kind || !factory.unify_terms(&a.message, &b.message) {
                    return None;
                }
            }
            (RuleConclusion::Transferring, RuleConclusion::Transferring) => {}
            _ => return None,
        }
        let mut snap_map: FxHashMap<SnapshotId, SnapshotId> = FxHashMap::default();
        let found = self.match_premises_from(0, other, &mut factory, &mut snap_map);
        let factory = found?;
        // Each of our guard constraints must persist in the other rule.
        let sigma = factory.forward_map();
        let residual = self.guard.substituted(&sigma).simplified();
        if residual.is_violated() {
            return None;
        }
        for entry in residual.entries() {
            let held = other
                .guard
                .entries()
                .any(|candidate| candidate == entry);
            if !held {
                return None;
            }
        }
        Some(sigma)
    }

    /// Backtracking premise assignment for [`Rule::implies`].
    fn match_premises_from<'g>(
        &self,
        index: usize,
        other: &Rule,
        factory: &SigmaFactory<'g>,
        snap_map: &mut FxHashMap<SnapshotId, SnapshotId>,
    ) -> Option<SigmaFactory<'g>> {
        if index == self.premises.len() {
            return self
                .match_transfers(other, factory, snap_map)
                .and_then(|f| self.check_orderings(other, snap_map).then_some(f));
        }
        let premise = &self.premises[index];
        for candidate in &other.premises {
            if candidate.event.kind != premise.event.kind {
                continue;
            }
            let mut trial = factory.clone();
            if !trial.unify_terms(&premise.event.message, &candidate.event.message) {
                continue;
            }
            let saved: Vec<_> = snap_map.iter().map(|(k, v)| (*k, *v)).collect();
            if let Some(trial) =
                self.match_snapshot_sets(&premise.snapshots, &candidate.snapshots, other, trial, snap_map)
            {
                if let Some(f) = self.match_premises_from(index + 1, other, &trial, snap_map) {
                    return Some(f);
                }
            }
            snap_map.clear();
            snap_map.extend(saved);
        }
        None
    }

    /// Maps each of our witness snapshots onto one of the candidate's.
    fn match_snapshot_sets<'g>(
        &self,
        ours: &[SnapshotId],
        theirs: &[SnapshotId],
        other: &Rule,
        factory: SigmaFactory<'g>,
        snap_map: &mut FxHashMap<SnapshotId, SnapshotId>,
    ) -> Option<SigmaFactory<'g>> {
        let mut factory = factory;
        'outer: for s in ours {
            if let Some(mapped) = snap_map.get(s) {
                if !theirs.contains(mapped) {
                    return None;
                }
                continue;
            }
            let our_state = &self.snapshots.node(*s).state;
            for t in theirs {
                let their_state = &other.snapshots.node(*t).state;
                if our_state.cell != their_state.cell {
                    continue;
                }
                let mut trial = factory.clone();
                if trial.unify_terms(&our_state.value, &their_state.value) {
                    factory = trial;
                    snap_map.insert(*s, *t);
                    continue 'outer;
                }
            }
            return None;
        }
        Some(factory)
    }

    /// Transferring rules must agree on their mutations.
    fn match_transfers<'g>(
        &self,
        other: &Rule,
        factory: &SigmaFactory<'g>,
        snap_map: &mut FxHashMap<SnapshotId, SnapshotId>,
    ) -> Option<SigmaFactory<'g>> {
        let mut factory = factory.clone();
        'outer: for (sid, src, tgt) in self.snapshots.transfers() {
            if let Some(mapped) = snap_map.get(&sid) {
                let node = other.snapshots.node(*mapped);
                let theirs = node.transfers_to.as_ref()?;
                if !factory.unify_terms(&tgt.value, &theirs.value) || tgt.cell != theirs.cell {
                    return None;
                }
                continue;
            }
            for (tid, src2, tgt2) in other.snapshots.transfers() {
                if src.cell != src2.cell {
                    continue;
                }
                let mut trial = factory.clone();
                if trial.unify_terms(&src.value, &src2.value)
                    && trial.unify_terms(&tgt.value, &tgt2.value)
                    && tgt.cell == tgt2.cell
                {
                    factory = trial;
                    snap_map.insert(sid, tid);
                    continue 'outer;
                }
            }
            return None;
        }
        Some(factory)
    }

    /// Every ordering constraint of ours must hold in the other tree.
    fn check_orderings(&self, other: &Rule, snap_map: &FxHashMap<SnapshotId, SnapshotId>) -> bool {
        for (later, node) in self.snapshots.iter() {
            for (earlier, strength) in &node.predecessors {
                let (Some(a), Some(b)) = (snap_map.get(earlier), snap_map.get(&later)) else {
                    // An unmapped snapshot imposes no constraint we can
                    // translate; require it to be unconstrained here.
                    return false;
                };
                let holds = match strength {
                    TraceLink::LaterThan => other.snapshots.reaches(*a, *b),
                    TraceLink::ModifiedOnce => other.snapshots.reaches_modified_once(*a, *b),
                };
                if !holds {
                    return false;
                }
            }
        }
        true
    }

    // ------------------------------------------------------------------------
    // Composition
    // ------------------------------------------------------------------------

    /// Composes this state-consistent rule into `other`.
    ///
    /// For every premise of `other` that unifies with our result, a new
    /// rule is produced in which that premise has been replaced by our
    /// premises and the snapshot trees are merged, our trace ordered
    /// before the consumed premise's witnesses. Compositions that would
    /// make the conclusion appear among the premises are dropped.
    pub fn compose_with(&self, other: &Rule, counter: &mut u32) -> Vec<Rule> {
        let Some(_) = self.result() else {
            return Vec::new();
        };
        let r1 = self.freshened(counter);
        let r2 = other.freshened(counter);
        let result = r1.result().expect("freshening preserves the conclusion");

        let mut out = Vec::new();
        for (pi, premise) in r2.premises.iter().enumerate() {
            if premise.event.kind != result.kind {
                continue;
            }
            let mut factory = SigmaFactory::new_unify(&r1.guard, &r2.guard);
            if !factory.unify_terms(&result.message, &premise.event.message) {
                continue;
            }
            let (fw, bw) = factory.into_maps();
            let sigma = match fw.merged(&bw) {
                Some(s) => s,
                None => continue,
            };

            let guard = r1
                .guard
                .substituted(&sigma)
                .union(&r2.guard.substituted(&sigma))
                .simplified();
            if guard.is_violated() {
                continue;
            }

            let mut tree = r2.snapshots.substituted(&sigma);
            let offset = tree.merge(&r1.snapshots.substituted(&sigma));

            let mut premises: Vec<Premise> = Vec::new();
            for (qi, q) in r2.premises.iter().enumerate() {
                if qi != pi {
                    premises.push(q.substituted(&sigma));
                }
            }
            for q in &r1.premises {
                premises.push(Premise {
                    event: q.event.substituted(&sigma),
                    snapshots: q.snapshots.iter().map(|s| s + offset).collect(),
                });
            }

            // Our trace must be complete by the time the consumed premise
            // was observed.
            for leaf in r1.snapshots.latest() {
                for witness in &premise.snapshots {
                    let _ = tree.link(leaf + offset, *witness, TraceLink::LaterThan);
                }
            }

            let conclusion = match &r2.conclusion {
                RuleConclusion::Consistent { result } => RuleConclusion::Consistent {
                    result: result.substituted(&sigma),
                },
                RuleConclusion::Transferring => RuleConclusion::Transferring,
            };
            if let RuleConclusion::Consistent { result } = &conclusion {
                if premises.iter().any(|p| p.event == *result) {
                    continue;
                }
            }

            let mut rule = Rule {
                label: None,
                premises,
                snapshots: tree,
                guard,
                conclusion,
            };
            rule.normalise();
            if !out.iter().any(|seen: &Rule| seen == &rule) {
                out.push(rule);
            }
        }
        out
    }

    // ------------------------------------------------------------------------
    // State-transfer application
    // ------------------------------------------------------------------------

    /// Applies this state-transferring rule to a state-consistent rule.
    ///
    /// The consistent rule's trace is extended by one mutation step per
    /// transfer: each transfer's source state must unify with the latest
    /// same-cell snapshot already required (or the cell must be fresh to
    /// the rule), and a new snapshot holding the target state is appended
    /// one modification later. Returns `None` when the consistent rule
    /// needs a state the transfer mutates away from.
    pub fn transfer_applied_to(&self, target: &Rule, counter: &mut u32) -> Option<Rule> {
        if !self.is_transferring() || target.is_transferring() {
            return None;
        }
        let tr = self.freshened(counter);
        let scr = target.freshened(counter);

        let mut factory = SigmaFactory::new_unify(&tr.guard, &scr.guard);
        let mut tree = scr.snapshots.clone();

        // Where each of the transferring rule's snapshots lands in the
        // combined tree.
        let mut remap: FxHashMap<SnapshotId, SnapshotId> = FxHashMap::default();

        for (sid, src, _) in tr.snapshots.transfers() {
            let anchor = scr
                .snapshots
                .latest()
                .into_iter()
                .find(|id| scr.snapshots.node(*id).state.cell == src.cell);
            match anchor {
                Some(existing) => {
                    if !factory.unify_terms(&src.value, &scr.snapshots.node(existing).state.value) {
                        return None;
                    }
                    remap.insert(sid, existing);
                }
                None => {
                    let id = tree.register(src.clone());
                    remap.insert(sid, id);
                }
            }
        }
        // Non-transfer snapshots of the transferring rule come along
        // unchanged.
        for (sid, node) in tr.snapshots.iter() {
            if !remap.contains_key(&sid) {
                let id = tree.register(node.state.clone());
                remap.insert(sid, id);
            }
        }
        for (sid, node) in tr.snapshots.iter() {
            for (pred, strength) in &node.predecessors {
                tree.link(remap[pred], remap[&sid], *strength).ok()?;
            }
        }
        // Append the mutation itself.
        for (sid, _, tgt) in tr.snapshots.transfers() {
            let after = tree.register(tgt.clone());
            tree.link(remap[&sid], after, TraceLink::ModifiedOnce).ok()?;
        }

        let (fw, bw) = factory.into_maps();
        let sigma = fw.merged(&bw)?;

        let guard = tr
            .guard
            .substituted(&sigma)
            .union(&scr.guard.substituted(&sigma))
            .simplified();
        if guard.is_violated() {
            return None;
        }

        let mut premises: Vec<Premise> = scr
            .premises
            .iter()
            .map(|p| p.substituted(&sigma))
            .collect();
        for p in &tr.premises {
            premises.push(Premise {
                event: p.event.substituted(&sigma),
                snapshots: p.snapshots.iter().map(|s| remap[s]).collect(),
            });
        }

        let result = scr.result()?.substituted(&sigma);
        if premises.iter().any(|p| p.event == result) {
            return None;
        }

        let mut rule = Rule {
            label: None,
            premises,
            snapshots: tree.substituted(&sigma),
            guard,
            conclusion: RuleConclusion::Consistent { result },
        };
        rule.normalise();
        Some(rule)
    }

    /// Compresses equal snapshots, prunes trivial ones and deduplicates
    /// premises. Correctness-preserving cleanups applied after cross-rule
    /// operations.
    pub fn normalise(&mut self) {
        let remap = self.snapshots.compress();
        for p in &mut self.premises {
            for s in &mut p.snapshots {
                *s = remap[*s];
            }
            p.snapshots.sort_unstable();
            p.snapshots.dedup();
        }
        let mut referenced: Vec<SnapshotId> = Vec::new();
        for p in &self.premises {
            referenced.extend(p.snapshots.iter().copied());
        }
        let remap = self.snapshots.prune_trivial(&referenced);
        for p in &mut self.premises {
            for s in &mut p.snapshots {
                *s = remap[*s];
            }
        }
        let mut seen: Vec<Premise> = Vec::new();
        for p in self.premises.drain(..) {
            if !seen.contains(&p) {
                seen.push(p);
            }
        }
        self.premises = seen;
    }
}

// ============================================================================
// Rendering
// ============================================================================

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            if let Some(label) = &self.label {
                write!(f, "{} = ", label)?;
            }
            if !self.guard.is_empty() {
                write!(f, "{} ", self.guard)?;
            }
            for (i, p) in self.premises.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", p.event)?;
                if !p.snapshots.is_empty() {
                    write!(f, "(")?;
                    for (j, s) in p.snapshots.iter().enumerate() {
                        if j > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "a{}", s)?;
                    }
                    write!(f, ")")?;
                }
            }
            if !self.premises.is_empty() {
                write!(f, " ")?;
            }
            write!(f, "-[ ")?;
            if !self.snapshots.is_empty() {
                for (i, (id, node)) in self.snapshots.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "({}, a{})", node.state, id)?;
                }
                let mut links = Vec::new();
                for (later, node) in self.snapshots.iter() {
                    for (earlier, strength) in &node.predecessors {
                        let op = match strength {
                            TraceLink::LaterThan => "=<",
                            TraceLink::ModifiedOnce => "<@",
                        };
                        links.push(format!("a{} {} a{}", earlier, op, later));
                    }
                }
                if !links.is_empty() {
                    write!(f, " : {{ {} }}", links.join(", "))?;
                }
                write!(f, " ")?;
            }
            write!(f, "]-> ")?;
            match &self.conclusion {
                RuleConclusion::Consistent { result } => write!(f, "{}", result),
                RuleConclusion::Transferring => {
                    write!(f, "<")?;
                    let mut first = true;
                    for (id, _, tgt) in self.snapshots.transfers() {
                        if !first {
                            write!(f, ", ")?;
                        }
                        first = false;
                        write!(f, "a{}: {}", id, tgt)?;
                    }
                    write!(f, ">")
                }
            }
        }
}
