//! The mutate-rule catalogue.
//!
//! A [`MutateRule`] is an intermediate description of exactly one Horn
//! rule: each arm holds only the data its concern needs, plus the
//! [`BranchCondition`] stacked from enclosing `if`/`let` arms.
//! [`MutateRule::generate`] drives a fresh [`RuleFactory`], applying the
//! condition's substitution to every emitted message and unioning its
//! guard into the rule's.

use sceptre_algebra::{Event, Message};
use sceptre_process::BranchCondition;
use sceptre_rules::{Rule, RuleFactory, RuleResult};

use crate::socket::Socket;

/// The Horn wrapper for a bound process variable: `v@cell(value)`.
pub fn cell_fact(variable: &str, value: Message) -> Message {
    Message::func(format!("{}@cell", variable), vec![value])
}

/// One translation concern, ready to emit one rule.
#[derive(Debug, Clone, PartialEq)]
pub enum MutateRule {
    /// `_Init -> _Waiting(_n0)` for a socket set, optionally requiring
    /// another set to be `_Shut` first.
    OpenSockets {
        open: Vec<Socket>,
        require_shut: Vec<Socket>,
        conditions: BranchCondition,
    },
    /// `_Waiting(count) -> _Shut` for finished finite sockets.
    ShutSockets {
        shut: Vec<(Socket, usize)>,
        conditions: BranchCondition,
    },
    /// From `_Read(pattern)`, publish the cell fact of one pattern
    /// variable.
    Read {
        socket: Socket,
        pattern: Message,
        variable: String,
        conditions: BranchCondition,
    },
    /// `_Waiting(count) -> _Write(value)`, conditional on other sockets'
    /// interaction counts.
    WriteFinite {
        socket: Socket,
        count: usize,
        value: Message,
        premises: Vec<Message>,
        required_waits: Vec<(Socket, usize)>,
        conditions: BranchCondition,
    },
    /// Unconditional `_Waiting(_n0) -> _Write(value)`; replicatable.
    WriteInfinite {
        socket: Socket,
        value: Message,
        premises: Vec<Message>,
        conditions: BranchCondition,
    },
    /// `_Write(v)` on the writer meets `_Waiting` on the reader: the
    /// writer returns to `_Waiting`, the reader moves to `_Read(v)`.
    CrossLinkFinite {
        writer: Socket,
        writer_resume_count: usize,
        reader: Socket,
        conditions: BranchCondition,
    },
    /// The stateless pairing used around replication: premises entail the
    /// reader's cell fact directly.
    CrossLinkInfinite {
        variable: String,
        component: Message,
        premises: Vec<Message>,
        conditions: BranchCondition,
    },
    /// `_Read(_) -> _Waiting(count)`.
    ReadReset {
        socket: Socket,
        count: usize,
        conditions: BranchCondition,
    },
    /// A known channel name plus an observed write leaks the value.
    KnowChannelContent {
        socket: Socket,
        conditions: BranchCondition,
    },
    /// A known channel name lets the attacker inject any known value
    /// into a waiting reader.
    AttackChannel {
        socket: Socket,
        conditions: BranchCondition,
    },
    /// Publish a computed cell fact under the let's condition.
    LetSet {
        variable: String,
        value: Message,
        premises: Vec<Message>,
        conditions: BranchCondition,
    },
    /// A destructor applied inside a cell tag: source cells entail the
    /// destination cell.
    Deconstruction {
        variable: String,
        value: Message,
        premises: Vec<Message>,
        conditions: BranchCondition,
    },
    /// A plain Horn clause.
    Basic {
        premises: Vec<Message>,
        conclusion: Message,
        conditions: BranchCondition,
    },
}

impl MutateRule {
    /// The stacked branch condition.
    pub fn conditions(&self) -> &BranchCondition {
        match self {
            MutateRule::OpenSockets { conditions, .. }
            | MutateRule::ShutSockets { conditions, .. }
            | MutateRule::Read { conditions, .. }
            | MutateRule::WriteFinite { conditions, .. }
            | MutateRule::WriteInfinite { conditions, .. }
            | MutateRule::CrossLinkFinite { conditions, .. }
            | MutateRule::CrossLinkInfinite { conditions, .. }
            | MutateRule::ReadReset { conditions, .. }
            | MutateRule::KnowChannelContent { conditions, .. }
            | MutateRule::AttackChannel { conditions, .. }
            | MutateRule::LetSet { conditions, .. }
            | MutateRule::Deconstruction { conditions, .. }
            | MutateRule::Basic { conditions, .. } => conditions,
        }
    }

    /// How many elaboration steps this concern may consume.
    pub fn depth_hint(&self) -> usize {
        match self {
            MutateRule::OpenSockets { .. } => 1,
            MutateRule::ShutSockets { .. } => 1,
            MutateRule::WriteFinite { .. } | MutateRule::WriteInfinite { .. } => 2,
            MutateRule::CrossLinkFinite { .. } => 1,
            MutateRule::ReadReset { .. } => 1,
            MutateRule::AttackChannel { .. } => 2,
            MutateRule::Read { .. }
            | MutateRule::CrossLinkInfinite { .. }
            | MutateRule::KnowChannelContent { .. }
            | MutateRule::LetSet { .. }
            | MutateRule::Deconstruction { .. }
            | MutateRule::Basic { .. } => 0,
        }
    }

    /// Builds the Horn rule for this concern.
    pub fn generate(&self) -> RuleResult<Rule> {
        let sigma = &self.conditions().sigma;
        let guard = &self.conditions().guard;
        let mut factory = RuleFactory::new();
        factory.add_guard_set(guard);

        match self {
            MutateRule::OpenSockets { open, require_shut, .. } => {
                factory.set_label(format!(
                    "open:{}",
                    open.iter().map(Socket::cell).collect::<Vec<_>>().join(":")
                ));
                for socket in require_shut {
                    factory.register_state(socket.state(Socket::shut()));
                }
                for socket in open {
                    let id = factory.register_state(socket.state(Socket::initial()));
                    factory.set_transfer(id, socket.state(Socket::waiting(0)))?;
                }
                factory.create_transferring()
            }

            MutateRule::ShutSockets { shut, .. } => {
                factory.set_label(format!(
                    "shut:{}",
                    shut.iter().map(|(s, _)| s.cell()).collect::<Vec<_>>().join(":")
                ));
                for (socket, count) in shut {
                    let id = factory.register_state(socket.state(Socket::waiting(*count)));
                    factory.set_transfer(id, socket.state(Socket::shut()))?;
                }
                factory.create_transferring()
            }

            MutateRule::Read { socket, pattern, variable, .. } => {
                factory.set_label(format!("read:{}:{}", socket.cell(), variable));
                let pattern = sigma.apply(pattern);
                factory.register_state(socket.state(Socket::read(pattern)));
                let value = sigma.apply(&Message::var(variable.clone()));
                let result = cell_fact(variable, value);
                finish_consistent(factory, result)
            }

            MutateRule::WriteFinite {
                socket,
                count,
                value,
                premises,
                required_waits,
                ..
            } => {
                factory.set_label(format!("write:{}:{}", socket.cell(), count));
                for premise in premises {
                    factory.add_premise(Event::know(sigma.apply(premise)))?;
                }
                for (other, at) in required_waits {
                    factory.register_state(other.state(Socket::waiting(*at)));
                }
                let id = factory.register_state(socket.state(Socket::waiting(*count)));
                factory.set_transfer(id, socket.state(Socket::write(sigma.apply(value))))?;
                factory.create_transferring()
            }

            MutateRule::WriteInfinite { socket, value, premises, .. } => {
                factory.set_label(format!("write:{}", socket.cell()));
                for premise in premises {
                    factory.add_premise(Event::know(sigma.apply(premise)))?;
                }
                let id = factory.register_state(socket.state(Socket::waiting(0)));
                factory.set_transfer(id, socket.state(Socket::write(sigma.apply(value))))?;
                factory.create_transferring()
            }

            MutateRule::CrossLinkFinite {
                writer,
                writer_resume_count,
                reader,
                ..
            } => {
                factory.set_label(format!("link:{}>{}", writer.cell(), reader.cell()));
                let carried = Message::var("_cl");
                let w = factory.register_state(writer.state(Socket::write(carried.clone())));
                let resume = if writer.is_infinite() {
                    Socket::waiting(0)
                } else {
                    Socket::waiting(*writer_resume_count)
                };
                factory.set_transfer(w, writer.state(resume))?;
                let r = factory.register_state(reader.state(Socket::waiting_any("_rc")));
                factory.set_transfer(r, reader.state(Socket::read(carried)))?;
                factory.create_transferring()
            }

            MutateRule::CrossLinkInfinite {
                variable,
                component,
                premises,
                ..
            } => {
                factory.set_label(format!("relay:{}", variable));
                for premise in premises {
                    factory.add_premise(Event::know(sigma.apply(premise)))?;
                }
                let result = cell_fact(variable, sigma.apply(component));
                finish_consistent(factory, result)
            }

            MutateRule::ReadReset { socket, count, .. } => {
                factory.set_label(format!("reset:{}", socket.cell()));
                let id = factory.register_state(socket.state(Socket::read(Message::var("_rr"))));
                let resume = if socket.is_infinite() {
                    Socket::waiting(0)
                } else {
                    Socket::waiting(*count)
                };
                factory.set_transfer(id, socket.state(resume))?;
                factory.create_transferring()
            }

            MutateRule::KnowChannelContent { socket, .. } => {
                factory.set_label(format!("eavesdrop:{}", socket.cell()));
                let carried = Message::var("_kc");
                let id = factory.register_state(socket.state(Socket::write(carried.clone())));
                factory.add_premise_at(Event::know(sigma.apply(&socket.channel)), &[id])?;
                factory.create_consistent(Event::know(carried))
            }

            MutateRule::AttackChannel { socket, .. } => {
                factory.set_label(format!("inject:{}", socket.cell()));
                factory.add_premise(Event::know(sigma.apply(&socket.channel)))?;
                let chosen = Message::var("_aj");
                factory.add_premise(Event::know(chosen.clone()))?;
                let id = factory.register_state(socket.state(Socket::waiting_any("_rc")));
                factory.set_transfer(id, socket.state(Socket::read(chosen)))?;
                factory.create_transferring()
            }

            MutateRule::LetSet { variable, value, premises, .. }
            | MutateRule::Deconstruction { variable, value, premises, .. } => {
                factory.set_label(format!("set:{}", variable));
                for premise in premises {
                    factory.add_premise(Event::know(sigma.apply(premise)))?;
                }
                let result = cell_fact(variable, sigma.apply(value));
                finish_consistent(factory, result)
            }

            MutateRule::Basic { premises, conclusion, .. } => {
                factory.set_label("basic");
                for premise in premises {
                    factory.add_premise(Event::know(sigma.apply(premise)))?;
                }
                finish_consistent(factory, sigma.apply(conclusion))
            }
        }
    }
}

fn finish_consistent(mut factory: RuleFactory, result: Message) -> RuleResult<Rule> {
    factory.create_consistent(Event::know(result))
}
