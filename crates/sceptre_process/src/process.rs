//! The process tree.
//!
//! Processes are what the `process` statement and macro bodies contain:
//! binders, channel actions, branching, replication and parallel
//! composition, with macro calls still unexpanded.

use std::fmt;

use crate::comparison::Comparison;
use crate::term::{Pattern, Term};

/// One node of the (unresolved) process tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Process {
    /// The finished process.
    Nil,
    /// `new x: T; next`.
    New {
        name: String,
        ty: String,
        next: Box<Process>,
    },
    /// `in(c, pat); next`.
    In {
        channel: Term,
        pattern: Pattern,
        next: Box<Process>,
    },
    /// `out(c, t); next`.
    Out {
        channel: Term,
        message: Term,
        next: Box<Process>,
    },
    /// `if cmp then P else Q`.
    If {
        condition: Comparison,
        then_branch: Box<Process>,
        else_branch: Box<Process>,
    },
    /// `let pat = t in P else Q`.
    Let {
        pattern: Pattern,
        value: Term,
        then_branch: Box<Process>,
        else_branch: Box<Process>,
    },
    /// `!P`.
    Replicate(Box<Process>),
    /// `P1 | P2 | …`.
    Parallel(Vec<Process>),
    /// A macro call.
    Call { name: String, args: Vec<Term> },
}

impl Process {
    /// Sequencing helper: `self; next` for the node kinds that continue.
    pub fn then(self, next: Process) -> Process {
        match self {
            Process::New { name, ty, .. } => Process::New {
                name,
                ty,
                next: Box::new(next),
            },
            Process::In { channel, pattern, .. } => Process::In {
                channel,
                pattern,
                next: Box::new(next),
            },
            Process::Out { channel, message, .. } => Process::Out {
                channel,
                message,
                next: Box::new(next),
            },
            other => other,
        }
    }
}

impl fmt::Display for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Process::Nil => write!(f, "0"),
            Process::New { name, ty, next } => write!(f, "new {}: {}; {}", name, ty, next),
            Process::In { channel, pattern, next } => {
                write!(f, "in({}, {}); {}", channel, pattern, next)
            }
            Process::Out { channel, message, next } => {
                write!(f, "out({}, {}); {}", channel, message, next)
            }
            Process::If { condition, then_branch, else_branch } => {
                write!(f, "if {} then ({}) else ({})", condition, then_branch, else_branch)
            }
            Process::Let { pattern, value, then_branch, else_branch } => {
                write!(
                    f,
                    "let {} = {} in ({}) else ({})",
                    pattern, value, then_branch, else_branch
                )
            }
            Process::Replicate(inner) => write!(f, "!({})", inner),
            Process::Parallel(children) => {
                write!(f, "(")?;
                for (i, c) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, " | ")?;
                    }
                    write!(f, "{}", c)?;
                }
                write!(f, ")")
            }
            Process::Call { name, args } => {
                write!(f, "{}(", name)?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", a)?;
                }
                write!(f, ")")
            }
        }
    }
}
