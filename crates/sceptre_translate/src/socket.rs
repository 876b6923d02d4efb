//! Sockets: per-branch handles onto channels.
//!
//! A socket identifies one branch's use of a channel in one direction. It
//! owns a state cell whose lifecycle is
//!
//! ```text
//! _Init -> _Waiting(n) -> _Read(m) | _Write(m) -> _Waiting(n') -> … -> _Shut
//! ```
//!
//! where `n` counts completed interactions. Sockets inside a replicated
//! scope are `Infinite`: they share one cell, never count interactions and
//! never shut.

use std::fmt;

use sceptre_algebra::{Message, State};
use sceptre_process::ResolvedPattern;

/// Which way the socket moves data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    fn tag(self) -> &'static str {
        match self {
            Direction::In => "in",
            Direction::Out => "out",
        }
    }
}

/// The branch a socket belongs to. `Infinite` marks a socket under a
/// replication ancestor; it keeps its branch id so distinct replicated
/// branches own distinct cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketBranch {
    Finite(usize),
    Infinite(usize),
}

impl SocketBranch {
    pub fn is_infinite(self) -> bool {
        matches!(self, SocketBranch::Infinite(_))
    }

    pub fn id(self) -> usize {
        match self {
            SocketBranch::Finite(id) | SocketBranch::Infinite(id) => id,
        }
    }

    fn tag(self) -> String {
        match self {
            SocketBranch::Finite(id) => id.to_string(),
            SocketBranch::Infinite(id) => format!("r{}", id),
        }
    }
}

/// A channel endpoint owned by one branch.
#[derive(Debug, Clone, PartialEq)]
pub struct Socket {
    pub channel: Message,
    pub branch: SocketBranch,
    pub direction: Direction,
    /// The receive pattern, for `In` sockets.
    pub pattern: Option<ResolvedPattern>,
}

impl Socket {
    pub fn reader(channel: Message, branch: SocketBranch, pattern: ResolvedPattern) -> Socket {
        Socket {
            channel,
            branch,
            direction: Direction::In,
            pattern: Some(pattern),
        }
    }

    pub fn writer(channel: Message, branch: SocketBranch) -> Socket {
        Socket {
            channel,
            branch,
            direction: Direction::Out,
            pattern: None,
        }
    }

    pub fn is_infinite(&self) -> bool {
        self.branch.is_infinite()
    }

    /// The name of this socket's state cell.
    pub fn cell(&self) -> String {
        format!(
            "{}@{}@{}",
            channel_tag(&self.channel),
            self.direction.tag(),
            self.branch.tag()
        )
    }

    /// The cell holding `value`, as a state.
    pub fn state(&self, value: Message) -> State {
        State::new(self.cell(), value)
    }

    // ------------------------------------------------------------------
    // Lifecycle values
    // ------------------------------------------------------------------

    pub fn initial() -> Message {
        Message::name("_Init")
    }

    pub fn waiting(count: usize) -> Message {
        Message::func("_Waiting", vec![count_tag(count)])
    }

    /// Waiting with an unknown interaction count.
    pub fn waiting_any(count_var: &str) -> Message {
        Message::func("_Waiting", vec![Message::var(count_var)])
    }

    pub fn read(value: Message) -> Message {
        Message::func("_Read", vec![value])
    }

    pub fn write(value: Message) -> Message {
        Message::func("_Write", vec![value])
    }

    pub fn shut() -> Message {
        Message::name("_Shut")
    }
}

impl fmt::Display for Socket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.cell())
    }
}

/// The interaction-count marker `_n<k>`.
pub fn count_tag(count: usize) -> Message {
    Message::name(format!("_n{}", count))
}

/// A printable tag for a channel term, used in cell names.
///
/// Channel terms are atoms in practice (names, nonces or received
/// variables); composite channels fall back to a sanitised rendering.
pub fn channel_tag(channel: &Message) -> String {
    match channel {
        Message::Name(symbol) => symbol.clone(),
        Message::Nonce { symbol, origin } => format!("{}.{}", symbol, origin),
        Message::Variable(symbol) => symbol.clone(),
        other => other
            .to_string()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '.' })
            .collect(),
    }
}
