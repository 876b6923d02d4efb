//! The resolver.
//!
//! Resolution turns a parsed [`Network`] into a [`ResolvedNetwork`]:
//! every term becomes an algebra [`Message`], every binder receives a
//! process-globally unique name, macros are inlined (with recursion
//! detection), comparisons are positivised and compiled into branch
//! restrictions, and every node is assigned a branch id such that two
//! nodes share an id exactly when they lie on the same sequential chain.

use std::fmt;

use rustc_hash::{FxHashMap, FxHashSet};

use sceptre_algebra::Message;

use crate::comparison::{
    compile_comparison, BranchRestrictionSet, Comparison, ResolvedComparison, ResolvedDestructor,
};
use crate::error::{ResolveError, ResolveResult};
use crate::network::{FunDecl, Network};
use crate::process::Process;
use crate::term::{Pattern, Term};

/// The pseudo-type of tuple terms.
const TUPLE_TYPE: &str = "tuple";

// ============================================================================
// Resolved shapes
// ============================================================================

/// A receive or let pattern with resolved, globally unique names.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedPattern {
    Variable(String),
    Tuple(Vec<ResolvedPattern>),
}

impl ResolvedPattern {
    /// The bound variable names, left to right.
    pub fn variables(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect(&mut out);
        out
    }

    fn collect(&self, out: &mut Vec<String>) {
        match self {
            ResolvedPattern::Variable(name) => out.push(name.clone()),
            ResolvedPattern::Tuple(members) => {
                for m in members {
                    m.collect(out);
                }
            }
        }
    }

    /// The pattern as a message: variables stay variables, tuples become
    /// tuples. Matching a received value against the pattern is unifying
    /// with this message.
    pub fn to_message(&self) -> Message {
        match self {
            ResolvedPattern::Variable(name) => Message::var(name.clone()),
            ResolvedPattern::Tuple(members) => {
                Message::tuple(members.iter().map(ResolvedPattern::to_message).collect())
            }
        }
    }
}

impl fmt::Display for ResolvedPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_message())
    }
}

/// A resolved process node annotated with its branch id.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedProcess {
    pub branch: usize,
    pub kind: ResolvedKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedKind {
    Nil,
    New {
        nonce: Message,
        next: Box<ResolvedProcess>,
    },
    In {
        channel: Message,
        pattern: ResolvedPattern,
        next: Box<ResolvedProcess>,
    },
    Out {
        channel: Message,
        message: Message,
        /// Set when the transmitted value itself has channel type; those
        /// sends need the replication fallback when they leave a
        /// replicated scope.
        message_is_channel: bool,
        next: Box<ResolvedProcess>,
    },
    If {
        restriction: BranchRestrictionSet,
        then_branch: Box<ResolvedProcess>,
        else_branch: Box<ResolvedProcess>,
    },
    Let {
        pattern: ResolvedPattern,
        value: Message,
        then_branch: Box<ResolvedProcess>,
        else_branch: Box<ResolvedProcess>,
    },
    Replicate(Box<ResolvedProcess>),
    Parallel(Vec<ResolvedProcess>),
}

/// Everything the translator needs.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedNetwork {
    pub process: ResolvedProcess,
    /// The attacker's secrecy goals.
    pub queries: Vec<Message>,
    /// Names the attacker starts out knowing (public frees and consts).
    pub public_names: Vec<Message>,
    /// Public constructors, for the attacker's construction rules.
    pub constructors: Vec<FunDecl>,
    /// Resolved rewrite clauses, declaration order preserved.
    pub destructors: Vec<ResolvedDestructor>,
}

// ============================================================================
// Resolver
// ============================================================================

#[derive(Debug, Clone)]
struct Binding {
    ty: String,
    message: Message,
}

/// Resolves a parsed network. See the module documentation.
pub fn resolve(network: &Network) -> ResolveResult<ResolvedNetwork> {
    Resolver::new(network)?.run()
}

struct Resolver<'n> {
    network: &'n Network,
    scopes: Vec<FxHashMap<String, Binding>>,
    used_names: FxHashSet<String>,
    destructors: Vec<ResolvedDestructor>,
    /// Destructor symbol → (arity, result type).
    destructor_sigs: FxHashMap<String, (usize, String)>,
    nonce_counter: u32,
    branch_counter: usize,
    macro_stack: Vec<String>,
    /// Source name of each `new` binder → its nonce message.
    fresh_names: FxHashMap<String, Message>,
}

impl<'n> Resolver<'n> {
    fn new(network: &'n Network) -> ResolveResult<Resolver<'n>> {
        let mut resolver = Resolver {
            network,
            scopes: vec![FxHashMap::default()],
            used_names: FxHashSet::default(),
            destructors: Vec::new(),
            destructor_sigs: FxHashMap::default(),
            nonce_counter: 0,
            branch_counter: 0,
            macro_stack: Vec::new(),
            fresh_names: FxHashMap::default(),
        };
        resolver.check_declarations()?;
        resolver.resolve_destructors()?;
        resolver.seed_globals();
        Ok(resolver)
    }

    fn run(mut self) -> ResolveResult<ResolvedNetwork> {
        let main = self.network.main.as_ref().ok_or(ResolveError::MissingProcess)?;
        let root = self.next_branch();
        let process = self.resolve_process(main, root)?;

        let mut queries = Vec::new();
        for q in &self.network.queries {
            queries.push(self.resolve_query(&q.term, q.fresh)?);
        }

        let public_names = self
            .network
            .frees
            .iter()
            .filter(|d| !d.private)
            .map(|d| Message::name(d.name.clone()))
            .chain(self.network.consts.iter().map(|d| Message::name(d.name.clone())))
            .collect();

        Ok(ResolvedNetwork {
            process,
            queries,
            public_names,
            constructors: self.network.funs.clone(),
            destructors: self.destructors,
        })
    }

    // --------------------------------------------------------------------
    // Declarations
    // --------------------------------------------------------------------

    fn check_declarations(&mut self) -> ResolveResult<()> {
        let mut seen: FxHashSet<&str> = FxHashSet::default();
        let names = self
            .network
            .frees
            .iter()
            .map(|d| d.name.as_str())
            .chain(self.network.consts.iter().map(|d| d.name.as_str()))
            .chain(self.network.funs.iter().map(|d| d.name.as_str()))
            .chain(self.network.macros.iter().map(|d| d.name.as_str()))
            .chain(self.network.tables.iter().map(|d| d.name.as_str()))
            .chain(self.network.events.iter().map(|d| d.name.as_str()));
        for name in names {
            if !seen.insert(name) {
                return Err(ResolveError::DuplicateDeclaration { name: name.into() });
            }
            self.used_names.insert(name.to_string());
        }
        for ty in &self.network.types {
            self.used_names.insert(ty.clone());
        }
        for d in &self.network.frees {
            self.check_type(&d.ty)?;
        }
        for d in &self.network.consts {
            self.check_type(&d.ty)?;
        }
        for d in &self.network.funs {
            for t in &d.arg_types {
                self.check_type(t)?;
            }
            self.check_type(&d.ret_type)?;
        }
        for d in &self.network.tables {
            for t in &d.col_types {
                self.check_type(t)?;
            }
        }
        for d in &self.network.events {
            for t in &d.arg_types {
                self.check_type(t)?;
            }
        }
        Ok(())
    }

    fn check_type(&self, name: &str) -> ResolveResult<()> {
        if self.network.has_type(name) {
            Ok(())
        } else {
            Err(ResolveError::UndefinedType { name: name.into() })
        }
    }

    fn resolve_destructors(&mut self) -> ResolveResult<()> {
        for clause in &self.network.destructors {
            let Term::Call { symbol, args } = &clause.head else {
                return Err(ResolveError::UndefinedFunction {
                    name: clause.head.to_string(),
                });
            };
            let mut env: FxHashMap<String, Binding> = FxHashMap::default();
            for (var, ty) in &clause.forall {
                self.check_type(ty)?;
                env.insert(
                    var.clone(),
                    Binding {
                        ty: ty.clone(),
                        message: Message::var(var.clone()),
                    },
                );
            }
            self.scopes.push(env);
            let resolved_args: ResolveResult<Vec<(Message, String)>> =
                args.iter().map(|a| self.resolve_term(a)).collect();
            let rhs = self.resolve_term(&clause.rhs);
            self.scopes.pop();
            let resolved_args = resolved_args?;
            let (rhs, rhs_ty) = rhs?;
            self.destructor_sigs
                .entry(symbol.clone())
                .or_insert((args.len(), rhs_ty));
            self.destructors.push(ResolvedDestructor {
                head: Message::func(
                    symbol.clone(),
                    resolved_args.into_iter().map(|(m, _)| m).collect(),
                ),
                rhs,
            });
        }
        Ok(())
    }

    fn seed_globals(&mut self) {
        let globals = self.scopes.first_mut().expect("global scope");
        for d in &self.network.frees {
            globals.insert(
                d.name.clone(),
                Binding {
                    ty: d.ty.clone(),
                    message: Message::name(d.name.clone()),
                },
            );
        }
        for d in &self.network.consts {
            globals.insert(
                d.name.clone(),
                Binding {
                    ty: d.ty.clone(),
                    message: Message::name(d.name.clone()),
                },
            );
        }
    }

    // --------------------------------------------------------------------
    // Terms
    // --------------------------------------------------------------------

    fn lookup(&self, name: &str) -> Option<&Binding> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    fn resolve_term(&self, term: &Term) -> ResolveResult<(Message, String)> {
        match term {
            Term::Atom(name) => match self.lookup(name) {
                Some(binding) => Ok((binding.message.clone(), binding.ty.clone())),
                None => Err(ResolveError::UndefinedName { name: name.clone() }),
            },
            Term::Call { symbol, args } => {
                if let Some(decl) = self.network.find_fun(symbol) {
                    if decl.arg_types.len() != args.len() {
                        return Err(ResolveError::ArityMismatch {
                            name: symbol.clone(),
                            expected: decl.arg_types.len(),
                            found: args.len(),
                        });
                    }
                    let mut resolved = Vec::new();
                    for (arg, expected) in args.iter().zip(&decl.arg_types) {
                        let (m, ty) = self.resolve_term(arg)?;
                        if &ty != expected && ty != TUPLE_TYPE {
                            return Err(ResolveError::TypeMismatch {
                                context: format!("argument of '{}'", symbol),
                                expected: expected.clone(),
                                found: ty,
                            });
                        }
                        resolved.push(m);
                    }
                    Ok((Message::func(symbol.clone(), resolved), decl.ret_type.clone()))
                } else if let Some((arity, ret_ty)) = self.destructor_sigs.get(symbol) {
                    if *arity != args.len() {
                        return Err(ResolveError::ArityMismatch {
                            name: symbol.clone(),
                            expected: *arity,
                            found: args.len(),
                        });
                    }
                    let mut resolved = Vec::new();
                    for arg in args {
                        resolved.push(self.resolve_term(arg)?.0);
                    }
                    Ok((Message::func(symbol.clone(), resolved), ret_ty.clone()))
                } else {
                    Err(ResolveError::UndefinedFunction { name: symbol.clone() })
                }
            }
            Term::Tuple(members) => {
                let mut resolved = Vec::new();
                for m in members {
                    resolved.push(self.resolve_term(m)?.0);
                }
                Ok((Message::tuple(resolved), TUPLE_TYPE.to_string()))
            }
        }
    }

    fn resolve_channel(&self, term: &Term, context: &str) -> ResolveResult<Message> {
        let (message, ty) = self.resolve_term(term)?;
        if ty != "channel" {
            return Err(ResolveError::TypeMismatch {
                context: context.to_string(),
                expected: "channel".to_string(),
                found: ty,
            });
        }
        Ok(message)
    }

    fn resolve_comparison(&self, comparison: &Comparison) -> ResolveResult<ResolvedComparison> {
        match comparison.positivise() {
            Comparison::Equal(a, b) => Ok(ResolvedComparison::Equal(
                self.resolve_term(&a)?.0,
                self.resolve_term(&b)?.0,
            )),
            Comparison::NotEqual(a, b) => Ok(ResolvedComparison::NotEqual(
                self.resolve_term(&a)?.0,
                self.resolve_term(&b)?.0,
            )),
            Comparison::And(l, r) => Ok(ResolvedComparison::And(
                Box::new(self.resolve_comparison(&l)?),
                Box::new(self.resolve_comparison(&r)?),
            )),
            Comparison::Or(l, r) => Ok(ResolvedComparison::Or(
                Box::new(self.resolve_comparison(&l)?),
                Box::new(self.resolve_comparison(&r)?),
            )),
            Comparison::Not(_) => unreachable!("positivise removes every negation"),
        }
    }

    // --------------------------------------------------------------------
    // Binders
    // --------------------------------------------------------------------

    /// Picks a globally unused name based on `base` and reserves it.
    fn fresh_binder(&mut self, base: &str) -> String {
        if self.used_names.insert(base.to_string()) {
            return base.to_string();
        }
        let mut k = 1;
        loop {
            let candidate = format!("{}_{}", base, k);
            if self.used_names.insert(candidate.clone()) {
                return candidate;
            }
            k += 1;
        }
    }

    fn resolve_pattern(&mut self, pattern: &Pattern) -> ResolveResult<ResolvedPattern> {
        match pattern {
            Pattern::Variable { name, ty } => {
                self.check_type(ty)?;
                let unique = self.fresh_binder(name);
                self.scopes
                    .last_mut()
                    .expect("scope stack is never empty")
                    .insert(
                        name.clone(),
                        Binding {
                            ty: ty.clone(),
                            message: Message::var(unique.clone()),
                        },
                    );
                Ok(ResolvedPattern::Variable(unique))
            }
            Pattern::Tuple(members) => {
                let mut resolved = Vec::new();
                for m in members {
                    resolved.push(self.resolve_pattern(m)?);
                }
                Ok(ResolvedPattern::Tuple(resolved))
            }
        }
    }

    fn next_branch(&mut self) -> usize {
        let id = self.branch_counter;
        self.branch_counter += 1;
        id
    }

    // --------------------------------------------------------------------
    // Processes
    // --------------------------------------------------------------------

    fn resolve_process(&mut self, process: &Process, branch: usize) -> ResolveResult<ResolvedProcess> {
        let kind = match process {
            Process::Nil => ResolvedKind::Nil,

            Process::New { name, ty, next } => {
                self.check_type(ty)?;
                let unique = self.fresh_binder(name);
                let nonce = Message::nonce(unique.clone(), self.nonce_counter);
                self.nonce_counter += 1;
                self.fresh_names.entry(name.clone()).or_insert_with(|| nonce.clone());
                self.scopes.push(FxHashMap::default());
                self.scopes.last_mut().unwrap().insert(
                    name.clone(),
                    Binding {
                        ty: ty.clone(),
                        message: nonce.clone(),
                    },
                );
                let next = self.resolve_process(next, branch)?;
                self.scopes.pop();
                ResolvedKind::New {
                    nonce,
                    next: Box::new(next),
                }
            }

            Process::In { channel, pattern, next } => {
                let channel = self.resolve_channel(channel, "in channel")?;
                self.scopes.push(FxHashMap::default());
                let pattern = self.resolve_pattern(pattern)?;
                let next = self.resolve_process(next, branch)?;
                self.scopes.pop();
                ResolvedKind::In {
                    channel,
                    pattern,
                    next: Box::new(next),
                }
            }

            Process::Out { channel, message, next } => {
                let channel = self.resolve_channel(channel, "out channel")?;
                let (message, ty) = self.resolve_term(message)?;
                let next = self.resolve_process(next, branch)?;
                ResolvedKind::Out {
                    channel,
                    message,
                    message_is_channel: ty == "channel",
                    next: Box::new(next),
                }
            }

            Process::If { condition, then_branch, else_branch } => {
                let resolved = self.resolve_comparison(condition)?;
                let restriction = compile_comparison(&resolved, &self.destructors)?;
                let then_id = self.next_branch();
                let then_branch = self.resolve_process(then_branch, then_id)?;
                let else_id = self.next_branch();
                let else_branch = self.resolve_process(else_branch, else_id)?;
                ResolvedKind::If {
                    restriction,
                    then_branch: Box::new(then_branch),
                    else_branch: Box::new(else_branch),
                }
            }

            Process::Let { pattern, value, then_branch, else_branch } => {
                let (value, _) = self.resolve_term(value)?;
                self.scopes.push(FxHashMap::default());
                let pattern = self.resolve_pattern(pattern)?;
                let then_id = self.next_branch();
                let then_branch = self.resolve_process(then_branch, then_id)?;
                self.scopes.pop();
                let else_id = self.next_branch();
                let else_branch = self.resolve_process(else_branch, else_id)?;
                ResolvedKind::Let {
                    pattern,
                    value,
                    then_branch: Box::new(then_branch),
                    else_branch: Box::new(else_branch),
                }
            }

            Process::Replicate(inner) => {
                let id = self.next_branch();
                ResolvedKind::Replicate(Box::new(self.resolve_process(inner, id)?))
            }

            Process::Parallel(children) => {
                let mut resolved = Vec::new();
                for child in children {
                    let id = self.next_branch();
                    resolved.push(self.resolve_process(child, id)?);
                }
                ResolvedKind::Parallel(resolved)
            }

            Process::Call { name, args } => {
                return self.resolve_macro_call(name, args, branch);
            }
        };
        Ok(ResolvedProcess { branch, kind })
    }

    fn resolve_macro_call(
        &mut self,
        name: &str,
        args: &[Term],
        branch: usize,
    ) -> ResolveResult<ResolvedProcess> {
        let decl = self
            .network
            .find_macro(name)
            .ok_or_else(|| ResolveError::UndefinedMacro { name: name.to_string() })?
            .clone();
        if self.macro_stack.iter().any(|m| m == name) {
            return Err(ResolveError::RecursiveMacro { name: name.to_string() });
        }
        if decl.params.len() != args.len() {
            return Err(ResolveError::ArityMismatch {
                name: name.to_string(),
                expected: decl.params.len(),
                found: args.len(),
            });
        }
        let mut frame: FxHashMap<String, Binding> = FxHashMap::default();
        for ((param, param_ty), arg) in decl.params.iter().zip(args) {
            self.check_type(param_ty)?;
            let (message, ty) = self.resolve_term(arg)?;
            if &ty != param_ty && ty != TUPLE_TYPE {
                return Err(ResolveError::TypeMismatch {
                    context: format!("argument '{}' of macro '{}'", param, name),
                    expected: param_ty.clone(),
                    found: ty,
                });
            }
            frame.insert(
                param.clone(),
                Binding {
                    ty: param_ty.clone(),
                    message,
                },
            );
        }
        self.macro_stack.push(name.to_string());
        self.scopes.push(frame);
        let resolved = self.resolve_process(&decl.body, branch);
        self.scopes.pop();
        self.macro_stack.pop();
        resolved
    }

    // --------------------------------------------------------------------
    // Queries
    // --------------------------------------------------------------------

    fn resolve_query(&self, term: &Term, fresh: bool) -> ResolveResult<Message> {
        if fresh {
            let Term::Atom(name) = term else {
                return Err(ResolveError::UnknownFreshName { name: term.to_string() });
            };
            return self
                .fresh_names
                .get(name)
                .cloned()
                .ok_or_else(|| ResolveError::UnknownFreshName { name: name.clone() });
        }
        Ok(self.resolve_term(term)?.0)
    }
}
