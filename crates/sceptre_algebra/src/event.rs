//! Labelled messages.
//!
//! Events attach one of five labels to a message. `Know` is the attacker
//! knowledge predicate and by far the most common; `Leak` marks the
//! conclusion of a successful attack; `Accept`, `Init` and `New` are used
//! at the model boundary.

use std::fmt;

use crate::message::Message;
use crate::sigma::SigmaMap;

/// The label of an [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// The attacker knows the message.
    Know,
    /// The message has leaked: the conclusion of an attack.
    Leak,
    /// Model-boundary acceptance marker.
    Accept,
    /// Model-boundary initialisation marker.
    Init,
    /// The message was freshly generated.
    New,
}

impl EventKind {
    /// The one-letter textual tag (`k`, `l`, `a`, `i`, `n`).
    pub fn tag(self) -> char {
        match self {
            EventKind::Know => 'k',
            EventKind::Leak => 'l',
            EventKind::Accept => 'a',
            EventKind::Init => 'i',
            EventKind::New => 'n',
        }
    }
}

/// A labelled message. Equality is by label and message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Event {
    pub kind: EventKind,
    pub message: Message,
}

impl Event {
    pub fn new(kind: EventKind, message: Message) -> Event {
        Event { kind, message }
    }

    pub fn know(message: Message) -> Event {
        Event::new(EventKind::Know, message)
    }

    pub fn leak(message: Message) -> Event {
        Event::new(EventKind::Leak, message)
    }

    pub fn accept(message: Message) -> Event {
        Event::new(EventKind::Accept, message)
    }

    pub fn init(message: Message) -> Event {
        Event::new(EventKind::Init, message)
    }

    pub fn made(message: Message) -> Event {
        Event::new(EventKind::New, message)
    }

    /// Returns the event with the substitution applied to its message.
    pub fn substituted(&self, sigma: &SigmaMap) -> Event {
        Event {
            kind: self.kind,
            message: sigma.apply(&self.message),
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind.tag(), self.message)
    }
}
