//! The knit pattern: conflict grouping of transfer instances.
//!
//! Applying every applicable transfer in its own nession explodes the
//! search; applying all of them at once loses interleavings that matter.
//! The knit pattern groups instances that provably commute: two transfers
//! conflict when they mutate the same cell, or when some state-consistent
//! rule in the set watches a cell that one of them touches and the other
//! does not (so the order of the two decides whether that rule can fire
//! in between). Non-conflicting instances advance together; each group of
//! conflicting ones forks its own successor.

use rustc_hash::FxHashSet;

use sceptre_rules::Rule;

use crate::nession::TransferInstance;

/// Cells that state-consistent rules observe.
pub fn watched_cells(consistent: &[Rule]) -> FxHashSet<String> {
    let mut cells = FxHashSet::default();
    for rule in consistent {
        for (_, node) in rule.snapshots.iter() {
            cells.insert(node.state.cell.clone());
        }
    }
    cells
}

fn conflicts(
    a: &TransferInstance,
    b: &TransferInstance,
    watched: &FxHashSet<String>,
) -> bool {
    let touched_a: FxHashSet<&str> = a.mutated_cells.iter().map(String::as_str).collect();
    let touched_b: FxHashSet<&str> = b.mutated_cells.iter().map(String::as_str).collect();
    if touched_a.intersection(&touched_b).next().is_some() {
        return true;
    }
    watched.iter().any(|cell| {
        touched_a.contains(cell.as_str()) != touched_b.contains(cell.as_str())
            && (touched_a.contains(cell.as_str()) || touched_b.contains(cell.as_str()))
    })
}

/// Greedily partitions instances into non-conflicting groups.
///
/// Instances are considered in order; each joins the first group it does
/// not conflict with, otherwise it opens a new group. The result is a
/// partition: every instance appears in exactly one group.
pub fn knit_groups(
    instances: Vec<TransferInstance>,
    consistent: &[Rule],
) -> Vec<Vec<TransferInstance>> {
    let watched = watched_cells(consistent);
    let mut groups: Vec<Vec<TransferInstance>> = Vec::new();
    for instance in instances {
        let slot = groups.iter_mut().find(|group| {
            group
                .iter()
                .all(|member| !conflicts(member, &instance, &watched))
        });
        match slot {
            Some(group) => group.push(instance),
            None => groups.push(vec![instance]),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nession::TransferTarget;
    use sceptre_algebra::{Event, Guard, Message, State};
    use sceptre_rules::RuleFactory;

    fn instance(cells: &[&str]) -> TransferInstance {
        let mut factory = RuleFactory::new();
        let mut targets = Vec::new();
        for cell in cells {
            let id = factory.register_state(State::new(*cell, Message::name("a")));
            factory
                .set_transfer(id, State::new(*cell, Message::name("b")))
                .unwrap();
            targets.push(TransferTarget {
                cell: cell.to_string(),
                value: Message::name("b"),
                premises: vec![],
                guard: Guard::empty(),
            });
        }
        TransferInstance {
            rule: factory.create_transferring().unwrap(),
            mutated_cells: cells.iter().map(|c| c.to_string()).collect(),
            targets,
        }
    }

    fn watcher(cell: &str) -> Rule {
        let mut factory = RuleFactory::new();
        factory.register_state(State::new(cell, Message::var("x")));
        factory
            .create_consistent(Event::know(Message::var("x")))
            .unwrap()
    }

    #[test]
    fn same_cell_mutations_conflict() {
        let groups = knit_groups(vec![instance(&["c"]), instance(&["c"])], &[]);
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn unwatched_disjoint_mutations_commute() {
        let groups = knit_groups(vec![instance(&["a"]), instance(&["b"])], &[]);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 2);
    }

    #[test]
    fn a_watcher_on_one_cell_forces_a_split() {
        let consistent = vec![watcher("a")];
        let groups = knit_groups(vec![instance(&["a"]), instance(&["b"])], &consistent);
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn watchers_on_both_cells_still_split() {
        // Each instance touches a watched cell the other does not.
        let consistent = vec![watcher("a"), watcher("b")];
        let groups = knit_groups(vec![instance(&["a"]), instance(&["b"])], &consistent);
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn every_instance_lands_in_exactly_one_group() {
        let consistent = vec![watcher("a")];
        let groups = knit_groups(
            vec![instance(&["a"]), instance(&["b"]), instance(&["c"])],
            &consistent,
        );
        let total: usize = groups.iter().map(Vec::len).sum();
        assert_eq!(total, 3);
    }
}
