//! Substitutions and the unification accumulator.
//!
//! A [`SigmaMap`] is the finished product: a finite mapping from variable
//! names to messages. A [`SigmaFactory`] is the working state of a single
//! unification: it accumulates bindings while pairs of terms are walked in
//! parallel, enforcing direction, the occurs check and the guards, and
//! finally yields the forward and backward maps.

use std::fmt;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::guard::Guard;
use crate::message::Message;

// ============================================================================
// SigmaMap
// ============================================================================

/// A finite substitution from variables to messages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SigmaMap {
    map: FxHashMap<String, Message>,
}

impl SigmaMap {
    /// The empty substitution.
    pub fn empty() -> SigmaMap {
        SigmaMap::default()
    }

    /// Builds a substitution from explicit pairs.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, Message)>) -> SigmaMap {
        SigmaMap {
            map: pairs.into_iter().collect(),
        }
    }

    /// Returns `true` if the substitution has no entries.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Number of mapped variables.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Adds or replaces a mapping.
    pub fn insert(&mut self, var: impl Into<String>, value: Message) {
        self.map.insert(var.into(), value);
    }

    /// Looks up the mapping for a variable name.
    pub fn get(&self, var: &str) -> Option<&Message> {
        self.map.get(var)
    }

    /// Iterates over the entries in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Message)> {
        self.map.iter()
    }

    /// Applies the substitution to a message.
    ///
    /// Mapped variables are replaced recursively; binding chains
    /// (`x ↦ y`, `y ↦ t`) are followed to their end. The occurs check
    /// performed at construction time guarantees the chains are acyclic,
    /// which makes application idempotent.
    pub fn apply(&self, message: &Message) -> Message {
        match message {
            Message::Name(_) | Message::Nonce { .. } => message.clone(),
            Message::Variable(v) => match self.map.get(v) {
                Some(t) => self.apply(t),
                None => message.clone(),
            },
            Message::Function { symbol, args } => Message::Function {
                symbol: symbol.clone(),
                args: args.iter().map(|a| self.apply(a)).collect(),
            },
            Message::Tuple(members) => {
                Message::Tuple(members.iter().map(|m| self.apply(m)).collect())
            }
        }
    }

    /// Merges two substitutions, failing when they disagree on a variable.
    ///
    /// Disagreement is syntactic: the same variable mapped to two distinct
    /// messages. Used by branch-condition composition, where conflicting
    /// requirements mean the combined branch is unreachable.
    pub fn merged(&self, other: &SigmaMap) -> Option<SigmaMap> {
        let mut out = self.clone();
        for (k, v) in &other.map {
            match out.map.get(k) {
                Some(existing) if existing != v => return None,
                Some(_) => {}
                None => {
                    out.map.insert(k.clone(), v.clone());
                }
            }
        }
        Some(out)
    }
}

impl fmt::Display for SigmaMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut entries: Vec<_> = self.map.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        write!(f, "{{")?;
        for (i, (k, v)) in entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} -> {}", k, v)?;
        }
        write!(f, "}}")
    }
}

// ============================================================================
// SigmaFactory
// ============================================================================

/// Accumulator for a single (possibly multi-pair) unification.
///
/// All bindings live in one store; which *side's* map an entry ends up in
/// is decided by where the variable occurred, recorded when each term pair
/// is registered. This keeps a variable that happens to appear on both
/// sides a single variable, and lets a chain such as `x ↦ y`, `y ↦ a[]`
/// land in whichever final maps need it.
///
/// Every candidate binding is vetted three ways before it is accepted:
///
/// 1. **Direction** — in asymmetric mode, variables of the right-hand
///    side may never be bound;
/// 2. **Occurs check** — a variable never binds to a term containing it;
/// 3. **Guards** — no accepted binding may make a guarded pair equal
///    under the transitive closure of everything accumulated so far.
#[derive(Clone)]
pub struct SigmaFactory<'g> {
    bindings: FxHashMap<String, Message>,
    left_vars: FxHashSet<String>,
    right_vars: FxHashSet<String>,
    both_ways: bool,
    from_guard: &'g Guard,
    to_guard: &'g Guard,
}

impl<'g> SigmaFactory<'g> {
    /// A factory for symmetric unification under the two guards.
    pub fn new_unify(from_guard: &'g Guard, to_guard: &'g Guard) -> SigmaFactory<'g> {
        SigmaFactory {
            bindings: FxHashMap::default(),
            left_vars: FxHashSet::default(),
            right_vars: FxHashSet::default(),
            both_ways: true,
            from_guard,
            to_guard,
        }
    }

    /// A factory for asymmetric matching: only the left side may bind.
    pub fn new_match(from_guard: &'g Guard, to_guard: &'g Guard) -> SigmaFactory<'g> {
        SigmaFactory {
            bindings: FxHashMap::default(),
            left_vars: FxHashSet::default(),
            right_vars: FxHashSet::default(),
            both_ways: false,
            from_guard,
            to_guard,
        }
    }

    /// Whether the right side may receive bindings.
    pub fn is_symmetric(&self) -> bool {
        self.both_ways
    }

    /// Unifies one term pair under the accumulated bindings.
    ///
    /// May be called repeatedly: later pairs see (and must stay compatible
    /// with) the bindings of earlier pairs. Returns `false` as soon as any
    /// pair fails; the factory should then be discarded.
    pub fn unify_terms(&mut self, left: &Message, right: &Message) -> bool {
        left.collect_variables(&mut self.left_vars);
        right.collect_variables(&mut self.right_vars);
        crate::unify::walk(left, right, self)
    }

    /// Follows top-level binding chains without descending into subterms.
    pub fn shallow_resolve(&self, message: &Message) -> Message {
        let mut current = message.clone();
        while let Message::Variable(v) = &current {
            match self.bindings.get(v) {
                Some(next) => current = next.clone(),
                None => break,
            }
        }
        current
    }

    /// Fully applies the accumulated bindings to a message.
    pub fn full_resolve(&self, message: &Message) -> Message {
        match message {
            Message::Name(_) | Message::Nonce { .. } => message.clone(),
            Message::Variable(v) => match self.bindings.get(v) {
                Some(t) => self.full_resolve(&t.clone()),
                None => message.clone(),
            },
            Message::Function { symbol, args } => Message::Function {
                symbol: symbol.clone(),
                args: args.iter().map(|a| self.full_resolve(a)).collect(),
            },
            Message::Tuple(members) => {
                Message::Tuple(members.iter().map(|m| self.full_resolve(m)).collect())
            }
        }
    }

    /// Attempts to record `var ↦ value`.
    ///
    /// Returns `false` when direction, the occurs check or a guard refuses
    /// the binding. A binding of a variable to itself succeeds without
    /// recording anything.
    pub(crate) fn try_bind(&mut self, var: &str, value: &Message) -> bool {
        if !self.both_ways && self.right_vars.contains(var) {
            return false;
        }
        let resolved = self.full_resolve(value);
        if let Message::Variable(v) = &resolved {
            if v == var {
                return true;
            }
        }
        if resolved.contains_variable(var) {
            return false;
        }
        self.bindings.insert(var.to_string(), resolved);
        if self.violates_guards() {
            self.bindings.remove(var);
            return false;
        }
        true
    }

    fn violates_guards(&self) -> bool {
        self.from_guard
            .entries()
            .chain(self.to_guard.entries())
            .any(|(l, r)| self.full_resolve(l) == self.full_resolve(r))
    }

    /// The forward map: resolved bindings for left-side variables.
    pub fn forward_map(&self) -> SigmaMap {
        self.side_map(&self.left_vars)
    }

    /// The backward map: resolved bindings for right-side variables.
    pub fn backward_map(&self) -> SigmaMap {
        self.side_map(&self.right_vars)
    }

    fn side_map(&self, side: &FxHashSet<String>) -> SigmaMap {
        let mut out = SigmaMap::empty();
        for var in side {
            if self.bindings.contains_key(var) {
                out.insert(var.clone(), self.full_resolve(&Message::Variable(var.clone())));
            }
        }
        out
    }

    /// Finalises the factory into `(forward, backward)` maps.
    pub fn into_maps(self) -> (SigmaMap, SigmaMap) {
        (self.forward_map(), self.backward_map())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;

    #[test]
    fn apply_replaces_recursively() {
        let mut sigma = SigmaMap::empty();
        sigma.insert("x", Message::name("a"));
        let m = Message::func("enc", vec![Message::var("x"), Message::var("y")]);
        let applied = sigma.apply(&m);
        assert_eq!(
            applied,
            Message::func("enc", vec![Message::name("a"), Message::var("y")])
        );
    }

    #[test]
    fn apply_follows_chains() {
        let mut sigma = SigmaMap::empty();
        sigma.insert("x", Message::var("y"));
        sigma.insert("y", Message::name("a"));
        assert_eq!(sigma.apply(&Message::var("x")), Message::name("a"));
    }

    #[test]
    fn apply_is_idempotent() {
        let mut sigma = SigmaMap::empty();
        sigma.insert("x", Message::var("y"));
        sigma.insert("y", Message::func("h", vec![Message::name("a")]));
        let m = Message::tuple(vec![Message::var("x"), Message::var("z")]);
        let once = sigma.apply(&m);
        let twice = sigma.apply(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn merged_rejects_conflicts() {
        let mut a = SigmaMap::empty();
        a.insert("x", Message::name("a"));
        let mut b = SigmaMap::empty();
        b.insert("x", Message::name("b"));
        assert!(a.merged(&b).is_none());

        let mut c = SigmaMap::empty();
        c.insert("y", Message::name("b"));
        let merged = a.merged(&c).expect("disjoint maps merge");
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn chained_bindings_land_in_both_side_maps() {
        let g1 = Guard::empty();
        let g2 = Guard::empty();
        let mut factory = SigmaFactory::new_unify(&g1, &g2);
        let left = Message::tuple(vec![Message::var("x"), Message::var("x")]);
        let right = Message::tuple(vec![Message::var("y"), Message::name("a")]);
        assert!(factory.unify_terms(&left, &right));
        let (fw, bw) = factory.into_maps();
        assert_eq!(fw.apply(&left), bw.apply(&right));
        assert_eq!(fw.apply(&Message::var("x")), Message::name("a"));
        assert_eq!(bw.apply(&Message::var("y")), Message::name("a"));
    }

    #[test]
    fn repeated_pairs_share_bindings() {
        let g1 = Guard::empty();
        let g2 = Guard::empty();
        let mut factory = SigmaFactory::new_unify(&g1, &g2);
        assert!(factory.unify_terms(&Message::var("x"), &Message::name("a")));
        // A second pair must respect the established binding.
        assert!(factory.unify_terms(&Message::var("x"), &Message::var("z")));
        // And a conflicting third pair fails.
        assert!(!factory.unify_terms(&Message::var("x"), &Message::name("b")));
        let (fw, bw) = factory.into_maps();
        assert_eq!(fw.apply(&Message::var("x")), Message::name("a"));
        assert_eq!(bw.apply(&Message::var("z")), Message::name("a"));
    }

    #[test]
    fn guard_violation_rolls_the_binding_back() {
        let mut guard = Guard::empty();
        guard.forbid(Message::var("x"), Message::name("a"));
        let empty = Guard::empty();
        let mut factory = SigmaFactory::new_unify(&guard, &empty);
        assert!(!factory.unify_terms(&Message::var("x"), &Message::name("a")));
        // The factory stays usable for a different binding.
        assert!(factory.unify_terms(&Message::var("x"), &Message::name("b")));
    }

    #[test]
    fn guard_violation_through_chain_is_caught() {
        let mut guard = Guard::empty();
        guard.forbid(Message::var("x"), Message::name("a"));
        let empty = Guard::empty();
        let mut factory = SigmaFactory::new_unify(&guard, &empty);
        assert!(factory.unify_terms(&Message::var("x"), &Message::var("y")));
        // y ↦ a[] would make x equal a[] transitively.
        assert!(!factory.unify_terms(&Message::var("y"), &Message::name("a")));
    }
}
