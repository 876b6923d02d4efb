//! Nession elaboration.
//!
//! Starting from the single-frame nession over the initial states, each
//! step matches every transferring rule against each frontier nession's
//! last frame, partitions the matches with the knit pattern, and advances
//! one successor per group. Nessions with no applicable transfers are
//! complete. The walk is bounded by the elaboration depth and a hard cap
//! on the number of nessions.

use log::{debug, warn};

use rustc_hash::FxHashSet;

use sceptre_algebra::{Message, SigmaMap, State};
use sceptre_rules::Rule;

use crate::knit::knit_groups;
use crate::nession::{match_transfer, FrameState, Nession};

/// Hard cap on simultaneously tracked nessions.
pub const MAX_NESSIONS: usize = 512;

/// Expands the initial states into the set of nessions to assess.
pub fn elaborate(
    initial_states: &[State],
    transfers: &[Rule],
    consistent: &[Rule],
    depth: usize,
) -> Vec<Nession> {
    let mut complete: Vec<Nession> = Vec::new();
    let mut frontier = vec![Nession::initial(initial_states)];
    let mut counter: u32 = 0;
    let mut truncated = false;

    for step in 0..depth {
        if frontier.is_empty() {
            break;
        }
        let mut next: Vec<Nession> = Vec::new();
        let mut next_keys: FxHashSet<String> = FxHashSet::default();
        for nession in frontier.drain(..) {
            let frame = nession.last_frame();
            let instances: Vec<_> = transfers
                .iter()
                .filter_map(|rule| match_transfer(rule, frame, &mut counter))
                .filter(|instance| {
                    // A no-op mutation cannot advance the trace.
                    instance.targets.iter().any(|t| {
                        frame
                            .state_of(&t.cell)
                            .map(|fs| fs.state.value != t.value)
                            .unwrap_or(true)
                    })
                })
                .collect();
            if instances.is_empty() {
                complete.push(nession);
                continue;
            }
            let groups = knit_groups(instances, consistent);
            for group in groups {
                if next.len() + complete.len() >= MAX_NESSIONS {
                    truncated = true;
                    break;
                }
                let extended = nession.extended_with(&group);
                // Interleavings that converge on the same states explore
                // the same futures; one representative suffices.
                if next_keys.insert(frontier_key(&extended.last_frame().states)) {
                    next.push(extended);
                }
            }
        }
        debug!("elaboration step {}: {} frontier nessions", step + 1, next.len());
        frontier = next;
    }

    if truncated {
        warn!(
            "nession frontier truncated at {}; deeper interleavings were dropped",
            MAX_NESSIONS
        );
    }
    complete.extend(frontier);
    complete
}

/// A rendering of the frame states that is stable under the renaming of
/// rule-local variables, so that interleavings differing only in fresh
/// names converge.
fn frontier_key(states: &[FrameState]) -> String {
    let mut order: Vec<String> = Vec::new();
    for fs in states {
        collect_vars(&fs.state.value, &mut order);
        for p in &fs.premises {
            collect_vars(p, &mut order);
        }
    }
    let mut sigma = SigmaMap::empty();
    for (i, var) in order.iter().enumerate() {
        sigma.insert(var.clone(), Message::var(format!("_v{}", i)));
    }
    let mut parts: Vec<String> = Vec::new();
    for fs in states {
        let mut premises: Vec<String> = fs
            .premises
            .iter()
            .map(|p| sigma.apply(p).to_string())
            .collect();
        premises.sort();
        parts.push(format!(
            "{}={}!{}!{}",
            fs.state.cell,
            sigma.apply(&fs.state.value),
            premises.join(","),
            fs.guard.substituted(&sigma)
        ));
    }
    parts.join(";")
}

fn collect_vars(message: &Message, out: &mut Vec<String>) {
    match message {
        Message::Variable(v) => {
            if !out.iter().any(|seen| seen == v) {
                out.push(v.clone());
            }
        }
        Message::Function { args, .. } => {
            for a in args {
                collect_vars(a, out);
            }
        }
        Message::Tuple(members) => {
            for m in members {
                collect_vars(m, out);
            }
        }
        _ => {}
    }
}
