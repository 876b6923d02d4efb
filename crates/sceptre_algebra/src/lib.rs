//! # sceptre-algebra
//!
//! The symbolic message algebra underpinning sceptre.
//!
//! This crate provides the vocabulary every other layer speaks:
//!
//! - [`Message`] — names, nonces, variables, functions and tuples
//! - [`SigmaMap`] — finite substitutions from variables to messages
//! - [`SigmaFactory`] — the accumulator used while two terms are unified
//! - [`Guard`] — disequality constraints on admissible substitutions
//! - [`Event`] — labelled messages (`know`, `leak`, `accept`, `init`, `new`)
//! - [`State`] — a claim that a named cell holds a value
//!
//! # Unification
//!
//! Unification is offered in two modes on [`Message`]:
//!
//! - [`Message::unifiable`] — symmetric: both sides may be substituted,
//!   yielding a forward and a backward [`SigmaMap`];
//! - [`Message::unified_to`] — asymmetric: only the receiver may be
//!   substituted, used to match a rule premise against a fixed fact.
//!
//! Failure to unify is an ordinary negative result (`None`), never an
//! error. Both modes respect [`Guard`]s and apply the occurs check.

pub mod event;
pub mod guard;
pub mod message;
pub mod sigma;
pub mod state;
mod unify;

pub use event::{Event, EventKind};
pub use guard::Guard;
pub use message::Message;
pub use sigma::{SigmaFactory, SigmaMap};
pub use state::State;
