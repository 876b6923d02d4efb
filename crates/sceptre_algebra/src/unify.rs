//! First-order unification over messages.
//!
//! The walk is standard syntactic unification extended with tuples, nonce
//! origins and guard vetting. All binding bookkeeping lives in
//! [`SigmaFactory`]; this module only drives the parallel descent.

use crate::guard::Guard;
use crate::message::Message;
use crate::sigma::{SigmaFactory, SigmaMap};

impl Message {
    /// Symmetric unification under guards.
    ///
    /// On success, returns `(σ_fw, σ_bw)` such that applying `σ_fw` to
    /// `self` and `σ_bw` to `other` yields the same message, and no entry
    /// of either guard has been made equal. Returns `None` on any
    /// mismatch; there is no partial result.
    pub fn unifiable(
        &self,
        other: &Message,
        from_guard: &Guard,
        to_guard: &Guard,
    ) -> Option<(SigmaMap, SigmaMap)> {
        let mut factory = SigmaFactory::new_unify(from_guard, to_guard);
        if factory.unify_terms(self, other) {
            Some(factory.into_maps())
        } else {
            None
        }
    }

    /// Asymmetric unification: only `self` may be substituted.
    ///
    /// Used to match a rule premise (`self`) against a fixed fact
    /// (`other`). Variables occurring in `other` are off limits; an
    /// attempt to bind one fails the whole match.
    pub fn unified_to(&self, other: &Message, guard: &Guard) -> Option<SigmaMap> {
        let to_guard = Guard::empty();
        let mut factory = SigmaFactory::new_match(guard, &to_guard);
        if factory.unify_terms(self, other) {
            Some(factory.forward_map())
        } else {
            None
        }
    }
}

/// The parallel descent. `a` is the forward (left) side.
pub(crate) fn walk(a: &Message, b: &Message, factory: &mut SigmaFactory<'_>) -> bool {
    let a = factory.shallow_resolve(a);
    let b = factory.shallow_resolve(b);
    match (&a, &b) {
        (Message::Variable(x), Message::Variable(y)) if x == y => true,
        (Message::Variable(x), _) => factory.try_bind(x, &b),
        (_, Message::Variable(y)) => factory.try_bind(y, &a),
        (Message::Name(x), Message::Name(y)) => x == y,
        (
            Message::Nonce { symbol: sa, origin: oa },
            Message::Nonce { symbol: sb, origin: ob },
        ) => sa == sb && oa == ob,
        (
            Message::Function { symbol: fa, args: xs },
            Message::Function { symbol: fb, args: ys },
        ) => {
            fa == fb
                && xs.len() == ys.len()
                && xs.iter().zip(ys.iter()).all(|(x, y)| walk(x, y, factory))
        }
        (Message::Tuple(xs), Message::Tuple(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys.iter()).all(|(x, y)| walk(x, y, factory))
        }
        _ => false,
    }
}
