//! Cell states.
//!
//! A [`State`] asserts that the cell with a given name holds a value at
//! some point of a trace. Which point is the business of the snapshot
//! machinery in the rule layer; the pair itself is plain data.

use std::fmt;

use crate::message::Message;
use crate::sigma::SigmaMap;

/// A claim that cell `cell` holds `value`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct State {
    pub cell: String,
    pub value: Message,
}

impl State {
    pub fn new(cell: impl Into<String>, value: Message) -> State {
        State {
            cell: cell.into(),
            value,
        }
    }

    /// Returns the state with the substitution applied to its value.
    pub fn substituted(&self, sigma: &SigmaMap) -> State {
        State {
            cell: self.cell.clone(),
            value: sigma.apply(&self.value),
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.cell, self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_form() {
        let s = State::new("store", Message::name("a"));
        assert_eq!(s.to_string(), "store(a[])");
    }

    #[test]
    fn substitution_touches_only_the_value() {
        let mut sigma = SigmaMap::empty();
        sigma.insert("x", Message::name("a"));
        let s = State::new("store", Message::var("x")).substituted(&sigma);
        assert_eq!(s.cell, "store");
        assert_eq!(s.value, Message::name("a"));
    }
}
