//! Comparisons and branch restrictions.
//!
//! An `if` condition passes through three shapes on its way into the
//! translator:
//!
//! 1. the written [`Comparison`] over source terms, possibly with `not`;
//! 2. its *positivised* form — negations pushed inward by De Morgan until
//!    only `=` and `<>` leaves remain;
//! 3. a [`BranchRestrictionSet`]: for each arm, a list of alternative
//!    [`BranchCondition`]s, each a (substitution, guard) pair. The
//!    substitution carries required unifications, the guard required
//!    disequalities.
//!
//! Destructor rewrite clauses are consulted when an equality involves an
//! opaque destructor application: `dec(v, k) = x` compiles into the
//! correspondence `v = enc(x, k)`.

use std::fmt;

use sceptre_algebra::{Guard, Message, SigmaFactory, SigmaMap};

use crate::error::InvalidComparisonError;
use crate::term::Term;

// ============================================================================
// Source comparisons
// ============================================================================

/// A boolean comparison as written in the source.
#[derive(Debug, Clone, PartialEq)]
pub enum Comparison {
    Equal(Term, Term),
    NotEqual(Term, Term),
    And(Box<Comparison>, Box<Comparison>),
    Or(Box<Comparison>, Box<Comparison>),
    Not(Box<Comparison>),
}

impl Comparison {
    /// Pushes every negation inward until none remain.
    ///
    /// Idempotent: a positive comparison maps to itself.
    pub fn positivise(&self) -> Comparison {
        match self {
            Comparison::Equal(a, b) => Comparison::Equal(a.clone(), b.clone()),
            Comparison::NotEqual(a, b) => Comparison::NotEqual(a.clone(), b.clone()),
            Comparison::And(l, r) => {
                Comparison::And(Box::new(l.positivise()), Box::new(r.positivise()))
            }
            Comparison::Or(l, r) => {
                Comparison::Or(Box::new(l.positivise()), Box::new(r.positivise()))
            }
            Comparison::Not(inner) => inner.positivise().negate_positive(),
        }
    }

    /// The dual of a positive comparison: `=` ↔ `<>`, `and` ↔ `or`.
    ///
    /// A stray `not` is positivised away first, keeping the operation
    /// total.
    pub fn negate_positive(&self) -> Comparison {
        match self {
            Comparison::Equal(a, b) => Comparison::NotEqual(a.clone(), b.clone()),
            Comparison::NotEqual(a, b) => Comparison::Equal(a.clone(), b.clone()),
            Comparison::And(l, r) => {
                Comparison::Or(Box::new(l.negate_positive()), Box::new(r.negate_positive()))
            }
            Comparison::Or(l, r) => {
                Comparison::And(Box::new(l.negate_positive()), Box::new(r.negate_positive()))
            }
            Comparison::Not(inner) => inner.positivise(),
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Comparison::Equal(a, b) => write!(f, "{} = {}", a, b),
            Comparison::NotEqual(a, b) => write!(f, "{} <> {}", a, b),
            Comparison::And(l, r) => write!(f, "({} && {})", l, r),
            Comparison::Or(l, r) => write!(f, "({} || {})", l, r),
            Comparison::Not(inner) => write!(f, "not({})", inner),
        }
    }
}

// ============================================================================
// Resolved comparisons
// ============================================================================

/// A positivised comparison whose terms have been resolved to messages.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedComparison {
    Equal(Message, Message),
    NotEqual(Message, Message),
    And(Box<ResolvedComparison>, Box<ResolvedComparison>),
    Or(Box<ResolvedComparison>, Box<ResolvedComparison>),
}

impl ResolvedComparison {
    fn negated(&self) -> ResolvedComparison {
        match self {
            ResolvedComparison::Equal(a, b) => {
                ResolvedComparison::NotEqual(a.clone(), b.clone())
            }
            ResolvedComparison::NotEqual(a, b) => {
                ResolvedComparison::Equal(a.clone(), b.clone())
            }
            ResolvedComparison::And(l, r) => {
                ResolvedComparison::Or(Box::new(l.negated()), Box::new(r.negated()))
            }
            ResolvedComparison::Or(l, r) => {
                ResolvedComparison::And(Box::new(l.negated()), Box::new(r.negated()))
            }
        }
    }
}

/// A destructor clause with its terms resolved: the head is a function
/// message over clause-local variables, the right-hand side the rewrite
/// result.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedDestructor {
    pub head: Message,
    pub rhs: Message,
}

impl ResolvedDestructor {
    pub fn symbol(&self) -> Option<&str> {
        match &self.head {
            Message::Function { symbol, .. } => Some(symbol),
            _ => None,
        }
    }

    /// Clause-local variables renamed so they can never collide with
    /// process variables.
    fn isolated(&self, stamp: usize) -> ResolvedDestructor {
        let mut sigma = SigmaMap::empty();
        for var in self.head.variables().into_iter().chain(self.rhs.variables()) {
            sigma.insert(var.clone(), Message::var(format!("{}@d{}", var, stamp)));
        }
        ResolvedDestructor {
            head: sigma.apply(&self.head),
            rhs: sigma.apply(&self.rhs),
        }
    }
}

/// Rewrites destructor applications inside `message`, innermost first.
///
/// Clauses are consulted in declaration order; the first whose head
/// matches rewrites the application. Unmatched applications are left
/// opaque.
pub fn normalise(message: &Message, destructors: &[ResolvedDestructor]) -> Message {
    let message = match message {
        Message::Function { symbol, args } => Message::Function {
            symbol: symbol.clone(),
            args: args.iter().map(|a| normalise(a, destructors)).collect(),
        },
        Message::Tuple(members) => {
            Message::Tuple(members.iter().map(|m| normalise(m, destructors)).collect())
        }
        other => other.clone(),
    };
    if let Message::Function { symbol, .. } = &message {
        for (i, clause) in destructors.iter().enumerate() {
            if clause.symbol() != Some(symbol) {
                continue;
            }
            let clause = clause.isolated(i);
            if let Some(sigma) = clause.head.unified_to(&message, &Guard::empty()) {
                return sigma.apply(&clause.rhs);
            }
        }
    }
    message
}

// ============================================================================
// Branch conditions
// ============================================================================

/// One way a branch can be taken: required unifications plus required
/// disequalities.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BranchCondition {
    pub sigma: SigmaMap,
    pub guard: Guard,
}

impl BranchCondition {
    /// The identity condition: no requirements.
    pub fn empty() -> BranchCondition {
        BranchCondition::default()
    }

    pub fn is_empty(&self) -> bool {
        self.sigma.is_empty() && self.guard.is_empty()
    }

    /// Conjunction: substitutions merge (conflict means the combined
    /// branch is unreachable), guards union. `empty` is the identity.
    pub fn and(&self, other: &BranchCondition) -> Option<BranchCondition> {
        Some(BranchCondition {
            sigma: self.sigma.merged(&other.sigma)?,
            guard: self.guard.union(&other.guard),
        })
    }
}

impl fmt::Display for BranchCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.sigma, self.guard)
    }
}

/// The compiled form of one `if`/`let` split: alternatives for the
/// guarded arm and for the else arm. An empty list marks an unreachable
/// arm.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BranchRestrictionSet {
    pub when_true: Vec<BranchCondition>,
    pub when_false: Vec<BranchCondition>,
}

/// Compiles a resolved comparison into branch restrictions.
pub fn compile_comparison(
    comparison: &ResolvedComparison,
    destructors: &[ResolvedDestructor],
) -> Result<BranchRestrictionSet, InvalidComparisonError> {
    Ok(BranchRestrictionSet {
        when_true: conditions_for(comparison, destructors)?,
        when_false: conditions_for(&comparison.negated(), destructors)?,
    })
}

fn conditions_for(
    comparison: &ResolvedComparison,
    destructors: &[ResolvedDestructor],
) -> Result<Vec<BranchCondition>, InvalidComparisonError> {
    match comparison {
        ResolvedComparison::Equal(a, b) => equal_conditions(a, b, destructors),
        ResolvedComparison::NotEqual(a, b) => not_equal_conditions(a, b, destructors),
        ResolvedComparison::And(l, r) => {
            let left = conditions_for(l, destructors)?;
            let right = conditions_for(r, destructors)?;
            let mut out = Vec::new();
            for lc in &left {
                for rc in &right {
                    if let Some(merged) = lc.and(rc) {
                        if !out.contains(&merged) {
                            out.push(merged);
                        }
                    }
                }
            }
            Ok(out)
        }
        ResolvedComparison::Or(l, r) => {
            let mut out = conditions_for(l, destructors)?;
            for c in conditions_for(r, destructors)? {
                if !out.contains(&c) {
                    out.push(c);
                }
            }
            Ok(out)
        }
    }
}

/// Is `symbol` the head of any clause in the set?
fn is_destructor_symbol(symbol: &str, destructors: &[ResolvedDestructor]) -> bool {
    destructors.iter().any(|d| d.symbol() == Some(symbol))
}

fn equal_conditions(
    a: &Message,
    b: &Message,
    destructors: &[ResolvedDestructor],
) -> Result<Vec<BranchCondition>, InvalidComparisonError> {
    let a = normalise(a, destructors);
    let b = normalise(b, destructors);

    // An opaque destructor application equates through its clause: the
    // clause's head arguments constrain ours, its right-hand side must be
    // the other side of the equality.
    for (opaque, other) in [(&a, &b), (&b, &a)] {
        if let Message::Function { symbol, args } = opaque {
            if is_destructor_symbol(symbol, destructors) {
                return destructor_correspondence(symbol, args, other, destructors);
            }
        }
    }

    match a.unifiable(&b, &Guard::empty(), &Guard::empty()) {
        Some((fw, bw)) => {
            let sigma = fw.merged(&bw).unwrap_or(fw);
            Ok(vec![BranchCondition {
                sigma,
                guard: Guard::empty(),
            }])
        }
        None => Err(InvalidComparisonError::Unsatisfiable {
            left: a.to_string(),
            right: b.to_string(),
        }),
    }
}

fn not_equal_conditions(
    a: &Message,
    b: &Message,
    destructors: &[ResolvedDestructor],
) -> Result<Vec<BranchCondition>, InvalidComparisonError> {
    let a = normalise(a, destructors);
    let b = normalise(b, destructors);
    if a == b {
        // Never true: the arm guarded by this condition is unreachable.
        return Ok(Vec::new());
    }
    if a.unifiable(&b, &Guard::empty(), &Guard::empty()).is_none() {
        // Always true: no constraint needed.
        return Ok(vec![BranchCondition::empty()]);
    }
    let mut guard = Guard::empty();
    guard.forbid(a, b);
    Ok(vec![BranchCondition {
        sigma: SigmaMap::empty(),
        guard,
    }])
}

/// `d(args…) = other` via the first clause of `d` that fits.
fn destructor_correspondence(
    symbol: &str,
    args: &[Message],
    other: &Message,
    destructors: &[ResolvedDestructor],
) -> Result<Vec<BranchCondition>, InvalidComparisonError> {
    for (i, clause) in destructors.iter().enumerate() {
        if clause.symbol() != Some(symbol) {
            continue;
        }
        let clause = clause.isolated(i);
        let Message::Function { args: head_args, .. } = &clause.head else {
            continue;
        };
        if head_args.len() != args.len() {
            continue;
        }
        let empty = Guard::empty();
        let empty2 = Guard::empty();
        let mut factory = SigmaFactory::new_unify(&empty, &empty2);
        let mut ok = true;
        for (pattern, actual) in head_args.iter().zip(args.iter()) {
            if !factory.unify_terms(pattern, actual) {
                ok = false;
                break;
            }
        }
        if ok && factory.unify_terms(&clause.rhs, other) {
            let (fw, bw) = factory.into_maps();
            let sigma = match fw.merged(&bw) {
                Some(s) => s,
                None => continue,
            };
            // Only constraints on process variables matter; the clause's
            // own variables were isolated and cannot escape.
            let kept: Vec<(String, Message)> = sigma
                .iter()
                .filter(|(var, _)| !var.contains("@d"))
                .map(|(var, value)| (var.clone(), value.clone()))
                .collect();
            return Ok(vec![BranchCondition {
                sigma: SigmaMap::from_pairs(kept),
                guard: Guard::empty(),
            }]);
        }
    }
    Err(InvalidComparisonError::NoMatchingDestructor {
        term: format!("{}({})", symbol, args.iter().map(|a| a.to_string()).collect::<Vec<_>>().join(", ")),
    })
}
