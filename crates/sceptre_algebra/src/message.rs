//! The message term language.
//!
//! Every value exchanged on a channel, stored in a cell or reasoned about
//! by the attacker is a [`Message`]. The representation is a plain owned
//! tree: children are held in `Vec`s and `Box`es, so a message can never
//! contain a cycle.
//!
//! The textual forms used throughout diagnostics and tests are:
//!
//! | Variant | Form |
//! |---------|------|
//! | Name | `a[]` |
//! | Nonce | `[n]` |
//! | Variable | `x` |
//! | Function | `f(m1, m2)` |
//! | Tuple | `<m1, m2>` |

use std::fmt;

use rustc_hash::FxHashSet;

use crate::sigma::SigmaMap;

/// A symbolic message.
///
/// Names are ground atoms: two names are equal exactly when their symbols
/// are. Nonces additionally carry the identity of the rule instance that
/// generated them, so `[n]` from one replication instance never collides
/// with `[n]` from another. Variables are the only assignable variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Message {
    /// A ground atom, e.g. a declared free name or constant.
    Name(String),
    /// A freshly generated name, tagged with its origin so that fresh
    /// values from distinct generation sites stay distinct.
    Nonce { symbol: String, origin: u32 },
    /// A substitutable variable.
    Variable(String),
    /// A constructor or destructor application with fixed arity.
    Function { symbol: String, args: Vec<Message> },
    /// An ordered tuple. Unifies only with tuples of the same arity or
    /// with variables.
    Tuple(Vec<Message>),
}

impl Message {
    /// Convenience constructor for a ground name.
    pub fn name(symbol: impl Into<String>) -> Message {
        Message::Name(symbol.into())
    }

    /// Convenience constructor for a variable.
    pub fn var(symbol: impl Into<String>) -> Message {
        Message::Variable(symbol.into())
    }

    /// Convenience constructor for a nonce.
    pub fn nonce(symbol: impl Into<String>, origin: u32) -> Message {
        Message::Nonce {
            symbol: symbol.into(),
            origin,
        }
    }

    /// Convenience constructor for a function application.
    pub fn func(symbol: impl Into<String>, args: Vec<Message>) -> Message {
        Message::Function {
            symbol: symbol.into(),
            args,
        }
    }

    /// Convenience constructor for a tuple.
    pub fn tuple(members: Vec<Message>) -> Message {
        Message::Tuple(members)
    }

    /// Returns `true` if no variable occurs anywhere in the message.
    pub fn is_ground(&self) -> bool {
        match self {
            Message::Name(_) | Message::Nonce { .. } => true,
            Message::Variable(_) => false,
            Message::Function { args, .. } => args.iter().all(Message::is_ground),
            Message::Tuple(members) => members.iter().all(Message::is_ground),
        }
    }

    /// Returns `true` if the named variable occurs anywhere in the message.
    pub fn contains_variable(&self, name: &str) -> bool {
        match self {
            Message::Name(_) | Message::Nonce { .. } => false,
            Message::Variable(v) => v == name,
            Message::Function { args, .. } => args.iter().any(|a| a.contains_variable(name)),
            Message::Tuple(members) => members.iter().any(|m| m.contains_variable(name)),
        }
    }

    /// Collects every variable name occurring in the message into `out`.
    pub fn collect_variables(&self, out: &mut FxHashSet<String>) {
        match self {
            Message::Name(_) | Message::Nonce { .. } => {}
            Message::Variable(v) => {
                out.insert(v.clone());
            }
            Message::Function { args, .. } => {
                for a in args {
                    a.collect_variables(out);
                }
            }
            Message::Tuple(members) => {
                for m in members {
                    m.collect_variables(out);
                }
            }
        }
    }

    /// Returns the set of variable names occurring in the message.
    pub fn variables(&self) -> FxHashSet<String> {
        let mut out = FxHashSet::default();
        self.collect_variables(&mut out);
        out
    }

    /// Returns the message with `sigma` applied throughout.
    ///
    /// Application is capture-free and idempotent: mapped values are
    /// themselves resolved, so applying the same map twice is a no-op.
    pub fn substituted(&self, sigma: &SigmaMap) -> Message {
        sigma.apply(self)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Name(symbol) => write!(f, "{}[]", symbol),
            Message::Nonce { symbol, origin: 0 } => write!(f, "[{}]", symbol),
            Message::Nonce { symbol, origin } => write!(f, "[{}.{}]", symbol, origin),
            Message::Variable(symbol) => write!(f, "{}", symbol),
            Message::Function { symbol, args } => {
                write!(f, "{}(", symbol)?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", a)?;
                }
                write!(f, ")")
            }
            Message::Tuple(members) => {
                write!(f, "<")?;
                for (i, m) in members.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", m)?;
                }
                write!(f, ">")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_with_same_symbol_are_equal() {
        assert_eq!(Message::name("c"), Message::name("c"));
        assert_ne!(Message::name("c"), Message::name("d"));
    }

    #[test]
    fn nonces_compare_by_symbol_and_origin() {
        assert_eq!(Message::nonce("n", 3), Message::nonce("n", 3));
        assert_ne!(Message::nonce("n", 3), Message::nonce("n", 4));
        assert_ne!(Message::nonce("n", 3), Message::name("n"));
    }

    #[test]
    fn groundness() {
        assert!(Message::name("a").is_ground());
        assert!(!Message::var("x").is_ground());
        assert!(!Message::func("f", vec![Message::var("x")]).is_ground());
        assert!(Message::tuple(vec![Message::name("a"), Message::nonce("n", 0)]).is_ground());
    }

    #[test]
    fn variable_occurrence_is_found_at_depth() {
        let m = Message::func(
            "enc",
            vec![
                Message::tuple(vec![Message::var("x"), Message::name("a")]),
                Message::var("k"),
            ],
        );
        assert!(m.contains_variable("x"));
        assert!(m.contains_variable("k"));
        assert!(!m.contains_variable("a"));
        let vars = m.variables();
        assert_eq!(vars.len(), 2);
    }

    #[test]
    fn display_forms() {
        assert_eq!(Message::name("a").to_string(), "a[]");
        assert_eq!(Message::nonce("n", 0).to_string(), "[n]");
        assert_eq!(Message::nonce("n", 1).to_string(), "[n.1]");
        assert_eq!(Message::var("x").to_string(), "x");
        assert_eq!(
            Message::func("enc", vec![Message::var("x"), Message::name("k")]).to_string(),
            "enc(x, k[])"
        );
        assert_eq!(
            Message::tuple(vec![Message::var("a"), Message::var("b")]).to_string(),
            "<a, b>"
        );
    }
}
