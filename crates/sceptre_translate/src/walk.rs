//! The process-tree walk.
//!
//! Walking a resolved process emits mutate rules per node while carrying a
//! translation frame: the current branch, its interaction counters, the
//! accumulated cell premises, the stacked branch conditions, a replication
//! flag, and the finite sockets the previous control split must shut
//! before this branch's sockets may open.
//!
//! Branch arms guarded by a condition list are walked once per
//! alternative, so every emitted rule holds exactly one
//! [`BranchCondition`]. Channel values transmitted out of a replicated
//! scope are reified into tokens after the walk, and every send or
//! receive that could consume the token is compiled into plain Horn
//! clauses (the ProVerif-style fallback).

use rustc_hash::FxHashMap;

use log::debug;

use sceptre_algebra::{Guard, Message, State};
use sceptre_process::{
    compile_comparison, BranchCondition, ResolvedComparison, ResolvedKind, ResolvedNetwork,
    ResolvedProcess,
};
use sceptre_rules::Rule;

use crate::error::{TranslationError, TranslationResult};
use crate::knowledge::attacker_base;
use crate::mutate::{cell_fact, MutateRule};
use crate::socket::{channel_tag, Direction, Socket, SocketBranch};
use crate::translation::Translation;

/// Translates a resolved network into initial states, rules and queries.
pub fn translate(resolved: &ResolvedNetwork) -> TranslationResult<Translation> {
    Walker::new(resolved).run()
}

/// One `out` encountered during the walk, kept for the fallback pass and
/// the reader check.
#[derive(Debug, Clone)]
struct OutRecord {
    channel: Message,
    message: Message,
    premises: Vec<Message>,
    conditions: BranchCondition,
    replicated: bool,
    message_is_channel: bool,
}

/// One `in` encountered during the walk, kept for the fallback pass.
#[derive(Debug, Clone)]
struct InRecord {
    channel: Message,
    variables: Vec<String>,
    premises: Vec<Message>,
    conditions: BranchCondition,
}

/// The walk context for one branch under one condition path.
#[derive(Debug, Clone)]
struct Frame {
    branch: usize,
    replicated: bool,
    conditions: BranchCondition,
    premises: Vec<Message>,
    counters: FxHashMap<String, usize>,
    parent_shut: Vec<Socket>,
}

struct Walker<'n> {
    resolved: &'n ResolvedNetwork,
    sockets: Vec<Socket>,
    by_branch: FxHashMap<usize, Vec<Socket>>,
    mutates: Vec<MutateRule>,
    out_records: Vec<OutRecord>,
    in_records: Vec<InRecord>,
    /// Channel values reified into tokens: (value, token).
    leaked: Vec<(Message, Message)>,
}

impl<'n> Walker<'n> {
    fn new(resolved: &'n ResolvedNetwork) -> Walker<'n> {
        Walker {
            resolved,
            sockets: Vec::new(),
            by_branch: FxHashMap::default(),
            mutates: Vec::new(),
            out_records: Vec::new(),
            in_records: Vec::new(),
            leaked: Vec::new(),
        }
    }

    fn run(mut self) -> TranslationResult<Translation> {
        self.collect_sockets(&self.resolved.process.clone(), false);

        let initial_states: Vec<State> = self
            .sockets
            .iter()
            .map(|s| s.state(Socket::initial()))
            .collect();

        let root = Frame {
            branch: self.resolved.process.branch,
            replicated: false,
            conditions: BranchCondition::empty(),
            premises: Vec::new(),
            counters: FxHashMap::default(),
            parent_shut: Vec::new(),
        };
        let process = self.resolved.process.clone();
        self.enter_branch(&process, root)?;
        self.emit_fallbacks();
        self.check_readers()?;

        let mut rules = attacker_base(self.resolved);
        let mut seen: Vec<MutateRule> = Vec::new();
        let mut depth = 0;
        for m in self.mutates.drain(..) {
            if seen.contains(&m) {
                continue;
            }
            depth += m.depth_hint();
            rules.push(m.generate()?);
            seen.push(m);
        }
        let mut deduped: Vec<Rule> = Vec::new();
        for r in rules {
            if !deduped.contains(&r) {
                deduped.push(r);
            }
        }
        debug!(
            "translated {} sockets into {} rules, recommended depth {}",
            self.sockets.len(),
            deduped.len(),
            depth + 1
        );

        Ok(Translation {
            initial_states,
            rules: deduped,
            queries: self.resolved.queries.clone(),
            recommended_depth: depth + 1,
        })
    }

    // --------------------------------------------------------------------
    // Pre-pass
    // --------------------------------------------------------------------

    fn socket_branch(&self, branch: usize, replicated: bool) -> SocketBranch {
        if replicated {
            SocketBranch::Infinite(branch)
        } else {
            SocketBranch::Finite(branch)
        }
    }

    fn register_socket(&mut self, socket: Socket) {
        if !self.sockets.iter().any(|s| s.cell() == socket.cell()) {
            self.by_branch
                .entry(socket.branch.id())
                .or_default()
                .push(socket.clone());
            self.sockets.push(socket);
        }
    }

    fn collect_sockets(&mut self, process: &ResolvedProcess, replicated: bool) {
        match &process.kind {
            ResolvedKind::Nil => {}
            ResolvedKind::New { next, .. } => self.collect_sockets(next, replicated),
            ResolvedKind::In { channel, pattern, next } => {
                self.register_socket(Socket::reader(
                    channel.clone(),
                    self.socket_branch(process.branch, replicated),
                    pattern.clone(),
                ));
                self.collect_sockets(next, replicated);
            }
            ResolvedKind::Out { channel, next, .. } => {
                self.register_socket(Socket::writer(
                    channel.clone(),
                    self.socket_branch(process.branch, replicated),
                ));
                self.collect_sockets(next, replicated);
            }
            ResolvedKind::If { then_branch, else_branch, .. } => {
                self.collect_sockets(then_branch, replicated);
                self.collect_sockets(else_branch, replicated);
            }
            ResolvedKind::Let { then_branch, else_branch, .. } => {
                self.collect_sockets(then_branch, replicated);
                self.collect_sockets(else_branch, replicated);
            }
            ResolvedKind::Replicate(inner) => self.collect_sockets(inner, true),
            ResolvedKind::Parallel(children) => {
                for c in children {
                    self.collect_sockets(c, replicated);
                }
            }
        }
    }

    fn branch_sockets(&self, branch: usize) -> Vec<Socket> {
        self.by_branch.get(&branch).cloned().unwrap_or_default()
    }

    fn finite_branch_sockets(&self, branch: usize) -> Vec<Socket> {
        self.branch_sockets(branch)
            .into_iter()
            .filter(|s| !s.is_infinite())
            .collect()
    }

    // --------------------------------------------------------------------
    // Walking
    // --------------------------------------------------------------------

    /// Opens a branch's sockets, then walks its chain.
    fn enter_branch(&mut self, process: &ResolvedProcess, frame: Frame) -> TranslationResult<()> {
        let own = self.branch_sockets(frame.branch);
        if !own.is_empty() {
            self.mutates.push(MutateRule::OpenSockets {
                open: own,
                require_shut: frame.parent_shut.clone(),
                conditions: frame.conditions.clone(),
            });
        }
        self.walk(process, frame)
    }

    /// The sockets a child branch must see shut before opening.
    fn shut_handover(&self, frame: &Frame) -> Vec<Socket> {
        let own = self.finite_branch_sockets(frame.branch);
        if own.is_empty() {
            frame.parent_shut.clone()
        } else {
            own
        }
    }

    fn child_frame(&self, child: &ResolvedProcess, frame: &Frame, replicated: bool) -> Frame {
        Frame {
            branch: child.branch,
            replicated,
            conditions: frame.conditions.clone(),
            premises: frame.premises.clone(),
            counters: FxHashMap::default(),
            parent_shut: self.shut_handover(frame),
        }
    }

    /// Ends the current branch: its finite sockets shut at their final
    /// interaction counts.
    fn close_branch(&mut self, frame: &Frame) {
        if frame.replicated {
            return;
        }
        let shut: Vec<(Socket, usize)> = self
            .finite_branch_sockets(frame.branch)
            .into_iter()
            .map(|s| {
                let count = frame.counters.get(&s.cell()).copied().unwrap_or(0);
                (s, count)
            })
            .collect();
        if !shut.is_empty() {
            self.mutates.push(MutateRule::ShutSockets {
                shut,
                conditions: frame.conditions.clone(),
            });
        }
    }

    fn walk(&mut self, process: &ResolvedProcess, mut frame: Frame) -> TranslationResult<()> {
        match &process.kind {
            ResolvedKind::Nil => {
                self.close_branch(&frame);
                Ok(())
            }

            ResolvedKind::New { next, .. } => self.walk(next, frame),

            ResolvedKind::In { channel, pattern, next } => {
                let socket = Socket::reader(
                    channel.clone(),
                    self.socket_branch(process.branch, frame.replicated),
                    pattern.clone(),
                );
                let cell = socket.cell();
                let count = frame.counters.get(&cell).copied().unwrap_or(0);

                self.mutates.push(MutateRule::AttackChannel {
                    socket: socket.clone(),
                    conditions: frame.conditions.clone(),
                });
                let pattern_message = pattern.to_message();
                for variable in pattern.variables() {
                    self.mutates.push(MutateRule::Read {
                        socket: socket.clone(),
                        pattern: pattern_message.clone(),
                        variable,
                        conditions: frame.conditions.clone(),
                    });
                }
                self.mutates.push(MutateRule::ReadReset {
                    socket: socket.clone(),
                    count: count + 1,
                    conditions: frame.conditions.clone(),
                });

                for variable in pattern.variables() {
                    frame
                        .premises
                        .push(cell_fact(&variable, Message::var(variable.clone())));
                }
                frame.counters.insert(cell, count + 1);
                self.in_records.push(InRecord {
                    channel: channel.clone(),
                    variables: pattern.variables(),
                    premises: frame.premises.clone(),
                    conditions: frame.conditions.clone(),
                });
                self.walk(next, frame)
            }

            ResolvedKind::Out { channel, message, message_is_channel, next } => {
                let socket = Socket::writer(
                    channel.clone(),
                    self.socket_branch(process.branch, frame.replicated),
                );
                let cell = socket.cell();
                let count = frame.counters.get(&cell).copied().unwrap_or(0);

                if socket.is_infinite() {
                    self.mutates.push(MutateRule::WriteInfinite {
                        socket: socket.clone(),
                        value: message.clone(),
                        premises: frame.premises.clone(),
                        conditions: frame.conditions.clone(),
                    });
                } else {
                    let required_waits: Vec<(Socket, usize)> = self
                        .branch_sockets(frame.branch)
                        .into_iter()
                        .filter(|s| s.cell() != cell)
                        .filter_map(|s| {
                            frame.counters.get(&s.cell()).map(|c| (s, *c))
                        })
                        .collect();
                    self.mutates.push(MutateRule::WriteFinite {
                        socket: socket.clone(),
                        count,
                        value: message.clone(),
                        premises: frame.premises.clone(),
                        required_waits,
                        conditions: frame.conditions.clone(),
                    });
                }
                frame.counters.insert(cell, count + 1);

                self.mutates.push(MutateRule::KnowChannelContent {
                    socket: socket.clone(),
                    conditions: frame.conditions.clone(),
                });

                let readers: Vec<Socket> = self
                    .sockets
                    .iter()
                    .filter(|s| s.direction == Direction::In)
                    .filter(|s| {
                        s.channel
                            .unifiable(channel, &Guard::empty(), &Guard::empty())
                            .is_some()
                    })
                    .cloned()
                    .collect();
                for reader in readers {
                    if !socket.is_infinite() && !reader.is_infinite() {
                        self.mutates.push(MutateRule::CrossLinkFinite {
                            writer: socket.clone(),
                            writer_resume_count: count + 1,
                            reader,
                            conditions: frame.conditions.clone(),
                        });
                    } else {
                        let pattern = reader
                            .pattern
                            .as_ref()
                            .expect("in sockets carry patterns")
                            .clone();
                        let pattern_message = pattern.to_message();
                        if let Some((fw, _)) =
                            pattern_message.unifiable(message, &Guard::empty(), &Guard::empty())
                        {
                            for variable in pattern.variables() {
                                self.mutates.push(MutateRule::CrossLinkInfinite {
                                    variable: variable.clone(),
                                    component: fw.apply(&Message::var(variable)),
                                    premises: frame.premises.clone(),
                                    conditions: frame.conditions.clone(),
                                });
                            }
                        }
                    }
                }

                self.out_records.push(OutRecord {
                    channel: channel.clone(),
                    message: message.clone(),
                    premises: frame.premises.clone(),
                    conditions: frame.conditions.clone(),
                    replicated: frame.replicated,
                    message_is_channel: *message_is_channel,
                });
                if frame.replicated && *message_is_channel {
                    let token = channel_token(message);
                    if !self.leaked.iter().any(|(v, _)| v == message) {
                        self.leaked.push((message.clone(), token));
                    }
                }
                self.walk(next, frame)
            }

            ResolvedKind::If { restriction, then_branch, else_branch } => {
                self.close_branch(&frame);
                for condition in &restriction.when_true {
                    if let Some(merged) = frame.conditions.and(condition) {
                        let mut child = self.child_frame(then_branch, &frame, frame.replicated);
                        child.conditions = merged;
                        self.enter_branch(then_branch, child)?;
                    }
                }
                for condition in &restriction.when_false {
                    if let Some(merged) = frame.conditions.and(condition) {
                        let mut child = self.child_frame(else_branch, &frame, frame.replicated);
                        child.conditions = merged;
                        self.enter_branch(else_branch, child)?;
                    }
                }
                Ok(())
            }

            ResolvedKind::Let { pattern, value, then_branch, else_branch } => {
                self.close_branch(&frame);
                let comparison =
                    ResolvedComparison::Equal(value.clone(), pattern.to_message());
                let restriction = compile_comparison(&comparison, &self.resolved.destructors)?;
                let destructive = is_destructor_headed(value, self.resolved);

                for condition in &restriction.when_true {
                    let Some(merged) = frame.conditions.and(condition) else {
                        continue;
                    };
                    for variable in pattern.variables() {
                        let arm = if destructive {
                            MutateRule::Deconstruction {
                                variable: variable.clone(),
                                value: Message::var(variable.clone()),
                                premises: frame.premises.clone(),
                                conditions: merged.clone(),
                            }
                        } else {
                            MutateRule::LetSet {
                                variable: variable.clone(),
                                value: Message::var(variable.clone()),
                                premises: frame.premises.clone(),
                                conditions: merged.clone(),
                            }
                        };
                        self.mutates.push(arm);
                    }
                    let mut child = self.child_frame(then_branch, &frame, frame.replicated);
                    child.conditions = merged;
                    for variable in pattern.variables() {
                        child
                            .premises
                            .push(cell_fact(&variable, Message::var(variable.clone())));
                    }
                    self.enter_branch(then_branch, child)?;
                }
                for condition in &restriction.when_false {
                    if let Some(merged) = frame.conditions.and(condition) {
                        let mut child = self.child_frame(else_branch, &frame, frame.replicated);
                        child.conditions = merged;
                        self.enter_branch(else_branch, child)?;
                    }
                }
                Ok(())
            }

            ResolvedKind::Replicate(inner) => {
                self.close_branch(&frame);
                let child = self.child_frame(inner, &frame, true);
                self.enter_branch(inner, child)
            }

            ResolvedKind::Parallel(children) => {
                self.close_branch(&frame);
                for child in children {
                    let child_frame = self.child_frame(child, &frame, frame.replicated);
                    self.enter_branch(child, child_frame)?;
                }
                Ok(())
            }
        }
    }

    // --------------------------------------------------------------------
    // Replication fallback
    // --------------------------------------------------------------------

    /// Emits the ProVerif-style clauses for channel values that escaped a
    /// replicated scope.
    fn emit_fallbacks(&mut self) {
        let leaked = self.leaked.clone();
        for (value, token) in &leaked {
            // Possessing the token stands for possessing the channel.
            for record in self.out_records.clone() {
                if record.replicated
                    && record.message_is_channel
                    && &record.message == value
                {
                    self.mutates.push(MutateRule::Basic {
                        premises: record.premises.clone(),
                        conclusion: token.clone(),
                        conditions: record.conditions.clone(),
                    });
                }
            }
            // Every send on the token's channel becomes derivable.
            for record in self.out_records.clone() {
                if record
                    .channel
                    .unifiable(value, &Guard::empty(), &Guard::empty())
                    .is_some()
                {
                    let mut premises = record.premises.clone();
                    premises.push(token.clone());
                    self.mutates.push(MutateRule::Basic {
                        premises,
                        conclusion: record.message.clone(),
                        conditions: record.conditions.clone(),
                    });
                }
            }
            // Every receive on it accepts anything the attacker knows.
            for record in self.in_records.clone() {
                if record
                    .channel
                    .unifiable(value, &Guard::empty(), &Guard::empty())
                    .is_some()
                {
                    for variable in &record.variables {
                        let injected = Message::var(format!("{}@atk", variable));
                        let mut premises = record.premises.clone();
                        premises.push(token.clone());
                        premises.push(injected.clone());
                        self.mutates.push(MutateRule::Basic {
                            premises,
                            conclusion: cell_fact(variable, injected),
                            conditions: record.conditions.clone(),
                        });
                    }
                }
            }
        }
    }

    // --------------------------------------------------------------------
    // Model checks
    // --------------------------------------------------------------------

    /// A write on a channel the attacker can never know, with no reader
    /// anywhere, can never be consumed: the model is suspect.
    fn check_readers(&self) -> TranslationResult<()> {
        for record in &self.out_records {
            let public = self.resolved.public_names.contains(&record.channel);
            let has_reader = self.sockets.iter().any(|s| {
                s.direction == Direction::In
                    && s.channel
                        .unifiable(&record.channel, &Guard::empty(), &Guard::empty())
                        .is_some()
            });
            if !public && !has_reader {
                return Err(TranslationError::NoReader {
                    channel: record.channel.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// The reified token standing for a leaked channel value.
fn channel_token(value: &Message) -> Message {
    Message::name(format!("{}@tok", channel_tag(value)))
}

/// Is the value headed by a destructor (so its let is a deconstruction)?
fn is_destructor_headed(value: &Message, resolved: &ResolvedNetwork) -> bool {
    match value {
        Message::Function { symbol, .. } => resolved
            .destructors
            .iter()
            .any(|d| d.symbol() == Some(symbol)),
        _ => false,
    }
}
