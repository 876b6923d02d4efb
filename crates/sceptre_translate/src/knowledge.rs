//! The attacker's base theory.
//!
//! A Dolev–Yao attacker starts out knowing every public name, can apply
//! every public constructor, can build and take apart tuples, and can run
//! every destructor over terms it knows. These rules are all stateless and
//! rank-universal.

use rustc_hash::FxHashSet;

use sceptre_algebra::{Event, Message};
use sceptre_process::{ResolvedDestructor, ResolvedKind, ResolvedNetwork, ResolvedProcess};
use sceptre_rules::{Rule, RuleConstructionError, RuleFactory};

/// Builds the attacker's base rules for a resolved network.
pub fn attacker_base(resolved: &ResolvedNetwork) -> Vec<Rule> {
    let mut out = Vec::new();
    let mut factory = RuleFactory::new();

    for name in &resolved.public_names {
        factory.set_label(format!("public:{}", name));
        if let Ok(rule) = factory.create_consistent(Event::know(name.clone())) {
            out.push(rule);
        }
    }

    for decl in &resolved.constructors {
        let args: Vec<Message> = (0..decl.arg_types.len())
            .map(|i| Message::var(format!("x{}", i)))
            .collect();
        factory.set_label(format!("build:{}", decl.name));
        for arg in &args {
            factory
                .add_premise(Event::know(arg.clone()))
                .expect("know premises are always admissible");
        }
        if let Ok(rule) =
            factory.create_consistent(Event::know(Message::func(decl.name.clone(), args)))
        {
            out.push(rule);
        }
    }

    for arity in tuple_arities(resolved) {
        let members: Vec<Message> = (0..arity).map(|i| Message::var(format!("x{}", i))).collect();
        factory.set_label(format!("tuple:{}", arity));
        for m in &members {
            factory
                .add_premise(Event::know(m.clone()))
                .expect("know premises are always admissible");
        }
        if let Ok(rule) =
            factory.create_consistent(Event::know(Message::tuple(members.clone())))
        {
            out.push(rule);
        }
        for (i, member) in members.iter().enumerate() {
            factory.set_label(format!("untuple:{}.{}", arity, i));
            factory
                .add_premise(Event::know(Message::tuple(members.clone())))
                .expect("know premises are always admissible");
            if let Ok(rule) = factory.create_consistent(Event::know(member.clone())) {
                out.push(rule);
            }
        }
    }

    for (i, clause) in resolved.destructors.iter().enumerate() {
        if let Some(rule) = destructor_rule(clause, i) {
            out.push(rule);
        }
    }

    out
}

/// `d(p1, …, pn) = r` becomes `k(p1), …, k(pn) -> k(r)`.
///
/// A clause whose result is already one of its premises (an identity
/// rewrite) teaches the attacker nothing and is skipped.
fn destructor_rule(clause: &ResolvedDestructor, index: usize) -> Option<Rule> {
    let Message::Function { symbol, args } = &clause.head else {
        return None;
    };
    let mut factory = RuleFactory::new();
    factory.set_label(format!("reduc:{}:{}", symbol, index));
    for arg in args {
        factory.add_premise(Event::know(arg.clone())).ok()?;
    }
    match factory.create_consistent(Event::know(clause.rhs.clone())) {
        Ok(rule) => Some(rule),
        Err(RuleConstructionError::ResultAmongPremises { .. }) => None,
        Err(_) => None,
    }
}

/// Every tuple arity occurring anywhere in the model: the attacker only
/// needs construction and projection rules for shapes the protocol can
/// produce or consume.
fn tuple_arities(resolved: &ResolvedNetwork) -> Vec<usize> {
    let mut arities = FxHashSet::default();
    collect_process(&resolved.process, &mut arities);
    for q in &resolved.queries {
        collect_message(q, &mut arities);
    }
    for d in &resolved.destructors {
        collect_message(&d.head, &mut arities);
        collect_message(&d.rhs, &mut arities);
    }
    let mut out: Vec<usize> = arities.into_iter().collect();
    out.sort_unstable();
    out
}

fn collect_process(process: &ResolvedProcess, arities: &mut FxHashSet<usize>) {
    match &process.kind {
        ResolvedKind::Nil => {}
        ResolvedKind::New { next, .. } => collect_process(next, arities),
        ResolvedKind::In { pattern, next, .. } => {
            collect_message(&pattern.to_message(), arities);
            collect_process(next, arities);
        }
        ResolvedKind::Out { channel, message, next, .. } => {
            collect_message(channel, arities);
            collect_message(message, arities);
            collect_process(next, arities);
        }
        ResolvedKind::If { then_branch, else_branch, .. } => {
            collect_process(then_branch, arities);
            collect_process(else_branch, arities);
        }
        ResolvedKind::Let { pattern, value, then_branch, else_branch } => {
            collect_message(&pattern.to_message(), arities);
            collect_message(value, arities);
            collect_process(then_branch, arities);
            collect_process(else_branch, arities);
        }
        ResolvedKind::Replicate(inner) => collect_process(inner, arities),
        ResolvedKind::Parallel(children) => {
            for c in children {
                collect_process(c, arities);
            }
        }
    }
}

fn collect_message(message: &Message, arities: &mut FxHashSet<usize>) {
    match message {
        Message::Tuple(members) => {
            arities.insert(members.len());
            for m in members {
                collect_message(m, arities);
            }
        }
        Message::Function { args, .. } => {
            for a in args {
                collect_message(a, arities);
            }
        }
        _ => {}
    }
}
