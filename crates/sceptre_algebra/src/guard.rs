//! Disequality guards.
//!
//! A guard is a set of pairs `x ~/> t`: no substitution considered while
//! the guard is in force may make `x` equal to `t`. Guards compose by
//! union and simplify when substitution concretises their variables.

use std::fmt;

use crate::message::Message;
use crate::sigma::SigmaMap;

/// A set of disequality constraints on substitutions.
///
/// Entries are kept in insertion order (deduplicated), which keeps the
/// rendering of rules stable. The left component is a variable when the
/// guard is first written; substitution may generalise it to an arbitrary
/// message, at which point [`Guard::is_violated`] and
/// [`Guard::simplified`] decide its fate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Guard {
    banned: Vec<(Message, Message)>,
}

impl Guard {
    /// The identity guard: no constraints.
    pub fn empty() -> Guard {
        Guard::default()
    }

    /// Returns `true` if there are no constraints.
    pub fn is_empty(&self) -> bool {
        self.banned.is_empty()
    }

    /// Number of constraints.
    pub fn len(&self) -> usize {
        self.banned.len()
    }

    /// Adds the constraint `left ~/> right` if not already present.
    pub fn forbid(&mut self, left: Message, right: Message) {
        let entry = (left, right);
        if !self.banned.contains(&entry) {
            self.banned.push(entry);
        }
    }

    /// Iterates over the constraint pairs.
    pub fn entries(&self) -> impl Iterator<Item = &(Message, Message)> {
        self.banned.iter()
    }

    /// Set-union composition. The identity is [`Guard::empty`].
    pub fn union(&self, other: &Guard) -> Guard {
        let mut out = self.clone();
        for (l, r) in &other.banned {
            out.forbid(l.clone(), r.clone());
        }
        out
    }

    /// Applies a substitution to every constraint.
    ///
    /// The result may be violated (some pair became equal); callers decide
    /// whether that aborts the surrounding operation.
    pub fn substituted(&self, sigma: &SigmaMap) -> Guard {
        Guard {
            banned: self
                .banned
                .iter()
                .map(|(l, r)| (sigma.apply(l), sigma.apply(r)))
                .collect(),
        }
    }

    /// Returns `true` if any constraint pair is now equal.
    pub fn is_violated(&self) -> bool {
        self.banned.iter().any(|(l, r)| l == r)
    }

    /// Drops constraints that can never fire again.
    ///
    /// A pair whose sides are both ground and distinct holds forever and
    /// carries no further information, as does a pair whose sides can
    /// never be made equal structurally (distinct symbols or arities with
    /// no variable to bridge them).
    pub fn simplified(&self) -> Guard {
        Guard {
            banned: self
                .banned
                .iter()
                .filter(|(l, r)| could_become_equal(l, r))
                .cloned()
                .collect(),
        }
    }
}

/// Conservative structural test: can any substitution make the two sides
/// equal? Used only to discard spent constraints, so erring on the side of
/// `true` is harmless.
fn could_become_equal(a: &Message, b: &Message) -> bool {
    match (a, b) {
        (Message::Variable(_), _) | (_, Message::Variable(_)) => true,
        (Message::Name(x), Message::Name(y)) => x == y,
        (
            Message::Nonce { symbol: sa, origin: oa },
            Message::Nonce { symbol: sb, origin: ob },
        ) => sa == sb && oa == ob,
        (
            Message::Function { symbol: fa, args: xs },
            Message::Function { symbol: fb, args: ys },
        ) => fa == fb && xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| could_become_equal(x, y)),
        (Message::Tuple(xs), Message::Tuple(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| could_become_equal(x, y))
        }
        _ => false,
    }
}

impl fmt::Display for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, (l, r)) in self.banned.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} ~/> {}", l, r)?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_guard_is_identity_for_union() {
        let mut g = Guard::empty();
        g.forbid(Message::var("x"), Message::name("a"));
        assert_eq!(g.union(&Guard::empty()), g);
        assert_eq!(Guard::empty().union(&g), g);
    }

    #[test]
    fn union_deduplicates() {
        let mut g = Guard::empty();
        g.forbid(Message::var("x"), Message::name("a"));
        let u = g.union(&g);
        assert_eq!(u.len(), 1);
    }

    #[test]
    fn substitution_can_violate() {
        let mut g = Guard::empty();
        g.forbid(Message::var("x"), Message::name("a"));
        let mut sigma = SigmaMap::empty();
        sigma.insert("x", Message::name("a"));
        assert!(g.substituted(&sigma).is_violated());
    }

    #[test]
    fn spent_constraints_are_dropped() {
        let mut g = Guard::empty();
        g.forbid(Message::var("x"), Message::name("a"));
        let mut sigma = SigmaMap::empty();
        sigma.insert("x", Message::name("b"));
        let simplified = g.substituted(&sigma).simplified();
        assert!(simplified.is_empty());
    }

    #[test]
    fn live_constraints_survive_simplification() {
        let mut g = Guard::empty();
        g.forbid(
            Message::func("f", vec![Message::var("x")]),
            Message::func("f", vec![Message::name("a")]),
        );
        assert_eq!(g.simplified().len(), 1);
    }

    #[test]
    fn display_form() {
        let mut g = Guard::empty();
        g.forbid(Message::var("x"), Message::name("a"));
        assert_eq!(g.to_string(), "[x ~/> a[]]");
    }
}
