//! Resolution and comparison errors.
//!
//! Both error kinds are fatal for the query being posed: a network that
//! fails to resolve cannot be translated, and a comparison that cannot be
//! compiled invalidates its branch.

use std::fmt;

/// A defect found while resolving a parsed network.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolveError {
    /// A term referenced a name with no declaration in scope.
    UndefinedName { name: String },
    /// A declaration referenced an undeclared type.
    UndefinedType { name: String },
    /// A term applied an undeclared function.
    UndefinedFunction { name: String },
    /// A macro call referenced an unknown macro.
    UndefinedMacro { name: String },
    /// A function or macro was applied to the wrong number of arguments.
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
    },
    /// A term's type did not fit its position.
    TypeMismatch {
        context: String,
        expected: String,
        found: String,
    },
    /// The same name was declared twice.
    DuplicateDeclaration { name: String },
    /// Macro expansion re-entered a macro already being expanded.
    RecursiveMacro { name: String },
    /// The network has no top-level process.
    MissingProcess,
    /// A query referenced `new x` but no such binder exists.
    UnknownFreshName { name: String },
    /// An `if` comparison could not be compiled into branch restrictions.
    Comparison(InvalidComparisonError),
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveError::UndefinedName { name } => write!(f, "undefined name '{}'", name),
            ResolveError::UndefinedType { name } => write!(f, "undefined type '{}'", name),
            ResolveError::UndefinedFunction { name } => write!(f, "undefined function '{}'", name),
            ResolveError::UndefinedMacro { name } => write!(f, "undefined macro '{}'", name),
            ResolveError::ArityMismatch { name, expected, found } => write!(
                f,
                "'{}' expects {} argument(s) but received {}",
                name, expected, found
            ),
            ResolveError::TypeMismatch { context, expected, found } => write!(
                f,
                "{}: expected type '{}' but found '{}'",
                context, expected, found
            ),
            ResolveError::DuplicateDeclaration { name } => {
                write!(f, "'{}' is declared more than once", name)
            }
            ResolveError::RecursiveMacro { name } => {
                write!(f, "macro '{}' expands into itself", name)
            }
            ResolveError::MissingProcess => write!(f, "network has no top-level process"),
            ResolveError::UnknownFreshName { name } => {
                write!(f, "no 'new {}' binder exists for this query", name)
            }
            ResolveError::Comparison(inner) => write!(f, "{}", inner),
        }
    }
}

impl From<InvalidComparisonError> for ResolveError {
    fn from(inner: InvalidComparisonError) -> ResolveError {
        ResolveError::Comparison(inner)
    }
}

impl std::error::Error for ResolveError {}

/// A comparison that cannot be compiled into branch restrictions.
#[derive(Debug, Clone, PartialEq)]
pub enum InvalidComparisonError {
    /// Equality between terms that can never be made equal.
    Unsatisfiable { left: String, right: String },
    /// A destructor application no rewrite clause fits.
    NoMatchingDestructor { term: String },
}

impl fmt::Display for InvalidComparisonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidComparisonError::Unsatisfiable { left, right } => {
                write!(f, "'{}' and '{}' can never be equal", left, right)
            }
            InvalidComparisonError::NoMatchingDestructor { term } => {
                write!(f, "no destructor clause applies to '{}'", term)
            }
        }
    }
}

impl std::error::Error for InvalidComparisonError {}

/// Result alias for resolution.
pub type ResolveResult<T> = Result<T, ResolveError>;
