//! Parsed networks.
//!
//! A [`Network`] is the reader's output: the declaration tables plus the
//! top-level process, exactly as written. Nothing is resolved here; the
//! resolver consumes a network and either produces a resolved process
//! tree or reports why it cannot.

use crate::process::Process;
use crate::term::Term;

/// Builtin types every network knows.
pub const BUILTIN_TYPES: [&str; 3] = ["channel", "bitstring", "bool"];

/// `free name: ty` with optional `[private]`.
#[derive(Debug, Clone, PartialEq)]
pub struct FreeDecl {
    pub name: String,
    pub ty: String,
    pub private: bool,
}

/// `const name: ty`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstDecl {
    pub name: String,
    pub ty: String,
}

/// `fun name(arg_tys): ret_ty` — a constructor.
#[derive(Debug, Clone, PartialEq)]
pub struct FunDecl {
    pub name: String,
    pub arg_types: Vec<String>,
    pub ret_type: String,
}

/// One rewrite clause of a `reduc` declaration.
///
/// `forall x: bitstring, y: key; dec(enc(x, y), y) = x` stores the bound
/// variables, the head (whose symbol names the destructor) and the
/// right-hand side. Several clauses may share one head symbol; rewriting
/// consults them in declaration order and the first match wins.
#[derive(Debug, Clone, PartialEq)]
pub struct Destructor {
    pub forall: Vec<(String, String)>,
    pub head: Term,
    pub rhs: Term,
}

impl Destructor {
    /// The destructor function's name, taken from the head.
    pub fn symbol(&self) -> Option<&str> {
        match &self.head {
            Term::Call { symbol, .. } => Some(symbol),
            _ => None,
        }
    }

    /// The destructor function's arity, taken from the head.
    pub fn arity(&self) -> usize {
        match &self.head {
            Term::Call { args, .. } => args.len(),
            _ => 0,
        }
    }
}

/// `table name(col_tys)`.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDecl {
    pub name: String,
    pub col_types: Vec<String>,
}

/// `event name(arg_tys)`.
#[derive(Debug, Clone, PartialEq)]
pub struct EventDecl {
    pub name: String,
    pub arg_types: Vec<String>,
}

/// `query attacker(t)` or `not attacker(new n)`.
///
/// `fresh` marks the `new n` form, which refers to a nonce bound inside
/// the process rather than a declared name.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub term: Term,
    pub fresh: bool,
}

/// `let name(params) = body` — a process macro.
#[derive(Debug, Clone, PartialEq)]
pub struct MacroDecl {
    pub name: String,
    pub params: Vec<(String, String)>,
    pub body: Process,
}

/// Everything the reader extracts from one source file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Network {
    pub types: Vec<String>,
    pub frees: Vec<FreeDecl>,
    pub consts: Vec<ConstDecl>,
    pub funs: Vec<FunDecl>,
    pub destructors: Vec<Destructor>,
    pub tables: Vec<TableDecl>,
    pub events: Vec<EventDecl>,
    pub queries: Vec<Query>,
    pub not_attacker: Vec<Query>,
    pub settings: Vec<(String, String)>,
    pub macros: Vec<MacroDecl>,
    pub main: Option<Process>,
}

impl Network {
    pub fn new() -> Network {
        Network::default()
    }

    /// Is `name` a declared or builtin type?
    pub fn has_type(&self, name: &str) -> bool {
        BUILTIN_TYPES.contains(&name) || self.types.iter().any(|t| t == name)
    }

    pub fn find_free(&self, name: &str) -> Option<&FreeDecl> {
        self.frees.iter().find(|d| d.name == name)
    }

    pub fn find_const(&self, name: &str) -> Option<&ConstDecl> {
        self.consts.iter().find(|d| d.name == name)
    }

    pub fn find_fun(&self, name: &str) -> Option<&FunDecl> {
        self.funs.iter().find(|d| d.name == name)
    }

    pub fn find_macro(&self, name: &str) -> Option<&MacroDecl> {
        self.macros.iter().find(|d| d.name == name)
    }

    /// All rewrite clauses whose head is `symbol`, in declaration order.
    pub fn destructor_clauses(&self, symbol: &str) -> Vec<&Destructor> {
        self.destructors
            .iter()
            .filter(|d| d.symbol() == Some(symbol))
            .collect()
    }

    /// Is `symbol` a destructor head?
    pub fn is_destructor(&self, symbol: &str) -> bool {
        self.destructors.iter().any(|d| d.symbol() == Some(symbol))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_types_are_always_present() {
        let net = Network::new();
        assert!(net.has_type("channel"));
        assert!(net.has_type("bitstring"));
        assert!(net.has_type("bool"));
        assert!(!net.has_type("key"));
    }

    #[test]
    fn declared_types_are_found() {
        let mut net = Network::new();
        net.types.push("key".into());
        assert!(net.has_type("key"));
    }

    #[test]
    fn destructor_clauses_preserve_declaration_order() {
        let mut net = Network::new();
        net.destructors.push(Destructor {
            forall: vec![("x".into(), "bitstring".into())],
            head: Term::call("first", vec![Term::atom("x")]),
            rhs: Term::atom("x"),
        });
        net.destructors.push(Destructor {
            forall: vec![("y".into(), "bitstring".into())],
            head: Term::call("first", vec![Term::atom("y")]),
            rhs: Term::atom("y"),
        });
        assert_eq!(net.destructor_clauses("first").len(), 2);
        assert!(net.is_destructor("first"));
        assert!(!net.is_destructor("enc"));
    }
}
