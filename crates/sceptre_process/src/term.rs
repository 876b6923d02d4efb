//! Source-level terms and binding patterns.
//!
//! These are the shapes the reader produces: names are unresolved
//! references, and no types have been checked yet. The resolver turns
//! [`Term`]s into algebra messages and [`Pattern`]s into resolved binding
//! structures.

use std::fmt;

/// An unresolved term as written in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    /// A reference to a declared name or a bound variable.
    Atom(String),
    /// A function application.
    Call { symbol: String, args: Vec<Term> },
    /// An ordered tuple, written `(t1, t2, …)` in the source.
    Tuple(Vec<Term>),
}

impl Term {
    pub fn atom(name: impl Into<String>) -> Term {
        Term::Atom(name.into())
    }

    pub fn call(symbol: impl Into<String>, args: Vec<Term>) -> Term {
        Term::Call {
            symbol: symbol.into(),
            args,
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Atom(name) => write!(f, "{}", name),
            Term::Call { symbol, args } => {
                write!(f, "{}(", symbol)?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", a)?;
                }
                write!(f, ")")
            }
            Term::Tuple(members) => {
                write!(f, "(")?;
                for (i, m) in members.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", m)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// A binding pattern in `in(c, pat)` or `let pat = …`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pattern {
    /// A typed variable binder.
    Variable { name: String, ty: String },
    /// A tuple of sub-patterns.
    Tuple(Vec<Pattern>),
}

impl Pattern {
    /// All variable names bound by the pattern, left to right.
    pub fn bound_names(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_names(&mut out);
        out
    }

    fn collect_names<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Pattern::Variable { name, .. } => out.push(name),
            Pattern::Tuple(members) => {
                for m in members {
                    m.collect_names(out);
                }
            }
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Variable { name, ty } => write!(f, "{}: {}", name, ty),
            Pattern::Tuple(members) => {
                write!(f, "(")?;
                for (i, m) in members.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", m)?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_forms() {
        let t = Term::call("enc", vec![Term::atom("x"), Term::atom("k")]);
        assert_eq!(t.to_string(), "enc(x, k)");
        let tup = Term::Tuple(vec![Term::atom("a"), Term::atom("b")]);
        assert_eq!(tup.to_string(), "(a, b)");
    }

    #[test]
    fn pattern_bound_names_are_left_to_right() {
        let p = Pattern::Tuple(vec![
            Pattern::Variable { name: "a".into(), ty: "bitstring".into() },
            Pattern::Tuple(vec![Pattern::Variable { name: "b".into(), ty: "key".into() }]),
        ]);
        assert_eq!(p.bound_names(), vec!["a", "b"]);
    }
}
