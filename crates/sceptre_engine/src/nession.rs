//! Nessions: finite symbolic execution traces.
//!
//! A nession is a list of frames; each frame holds the cell states after
//! one elaboration step together with the transferring rules applied to
//! reach it. States carry the knowledge premises that were required to
//! produce them — an injected read, say, carries `k(channel)` and the
//! injected value — so that clauses extracted later cannot pretend the
//! state came for free.

use sceptre_algebra::{Guard, Message, SigmaFactory, State};
use sceptre_rules::{Rule, TraceLink};

/// A cell state plus the knowledge and constraints that were needed to
/// reach it.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameState {
    pub state: State,
    pub premises: Vec<Message>,
    /// Disequalities the producing transfers were conditioned on; they
    /// travel with the state so extracted clauses keep honouring them.
    pub guard: Guard,
}

impl FrameState {
    pub fn new(state: State) -> FrameState {
        FrameState {
            state,
            premises: Vec::new(),
            guard: Guard::empty(),
        }
    }
}

/// One step of a nession.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Frame {
    pub states: Vec<FrameState>,
    /// The transferring rules applied to move from the previous frame to
    /// this one; empty in the initial frame.
    pub applied: Vec<Rule>,
}

impl Frame {
    pub fn state_of(&self, cell: &str) -> Option<&FrameState> {
        self.states.iter().find(|fs| fs.state.cell == cell)
    }
}

/// A finite symbolic execution: a list of frames.
#[derive(Debug, Clone, PartialEq)]
pub struct Nession {
    pub frames: Vec<Frame>,
}

impl Nession {
    /// A single-frame nession over the initial states.
    pub fn initial(states: &[State]) -> Nession {
        Nession {
            frames: vec![Frame {
                states: states.iter().cloned().map(FrameState::new).collect(),
                applied: Vec::new(),
            }],
        }
    }

    pub fn last_frame(&self) -> &Frame {
        self.frames.last().expect("a nession always has a frame")
    }

    pub fn depth(&self) -> usize {
        self.frames.len() - 1
    }

    /// Applies a group of non-conflicting transfer instances, producing
    /// the successor nession.
    pub fn extended_with(&self, group: &[TransferInstance]) -> Nession {
        let last = self.last_frame();
        let mut states = Vec::new();
        for fs in &last.states {
            let replacement = group
                .iter()
                .flat_map(|inst| inst.targets.iter())
                .find(|target| target.cell == fs.state.cell);
            match replacement {
                Some(target) => states.push(FrameState {
                    state: State::new(target.cell.clone(), target.value.clone()),
                    premises: target.premises.clone(),
                    guard: target.guard.clone(),
                }),
                None => states.push(fs.clone()),
            }
        }
        let mut frames = self.frames.clone();
        frames.push(Frame {
            states,
            applied: group.iter().map(|inst| inst.rule.clone()).collect(),
        });
        Nession { frames }
    }
}

/// One mutation a transfer instance performs.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferTarget {
    pub cell: String,
    pub value: Message,
    pub premises: Vec<Message>,
    pub guard: Guard,
}

/// A transferring rule matched against a concrete frame.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferInstance {
    pub rule: Rule,
    pub mutated_cells: Vec<String>,
    pub targets: Vec<TransferTarget>,
}

/// Matches a transferring rule against the last frame of a nession.
///
/// Every snapshot of the rule must unify (rule side only) with the
/// frame's state for the same cell. A rule relating two snapshots of one
/// cell by `ModifiedOnce` cannot be witnessed inside a single frame and
/// is discarded, as are rules whose guard the match would violate.
/// Carried premises flow: each produced state collects the rule's own
/// premises plus the premises of every state the rule required.
pub fn match_transfer(rule: &Rule, frame: &Frame, counter: &mut u32) -> Option<TransferInstance> {
    if !rule.is_transferring() {
        return None;
    }
    let rule = rule.freshened(counter);
    for (_, node) in rule.snapshots.iter() {
        for (_, strength) in &node.predecessors {
            if *strength == TraceLink::ModifiedOnce {
                return None;
            }
        }
    }

    let empty = Guard::empty();
    let mut factory = SigmaFactory::new_match(&rule.guard, &empty);
    let mut required_premises: Vec<Message> = Vec::new();
    let mut required_guard = Guard::empty();
    for (_, node) in rule.snapshots.iter() {
        let fs = frame.state_of(&node.state.cell)?;
        if !factory.unify_terms(&node.state.value, &fs.state.value) {
            return None;
        }
        for p in &fs.premises {
            if !required_premises.contains(p) {
                required_premises.push(p.clone());
            }
        }
        required_guard = required_guard.union(&fs.guard);
    }
    let sigma = factory.forward_map();

    let guard = rule
        .guard
        .substituted(&sigma)
        .union(&required_guard)
        .simplified();
    if guard.is_violated() {
        return None;
    }

    let mut own_premises: Vec<Message> = Vec::new();
    for p in &rule.premises {
        let m = sigma.apply(&p.event.message);
        if !own_premises.contains(&m) {
            own_premises.push(m);
        }
    }

    let mut targets = Vec::new();
    let mut mutated = Vec::new();
    for (_, src, tgt) in rule.snapshots.transfers() {
        let mut premises = own_premises.clone();
        for p in &required_premises {
            if !premises.contains(p) {
                premises.push(p.clone());
            }
        }
        targets.push(TransferTarget {
            cell: tgt.cell.clone(),
            value: sigma.apply(&tgt.value),
            premises,
            guard: guard.clone(),
        });
        mutated.push(src.cell.clone());
    }
    if targets.is_empty() {
        return None;
    }

    Some(TransferInstance {
        rule: rule.substituted(&sigma),
        mutated_cells: mutated,
        targets,
    })
}
