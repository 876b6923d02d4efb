//! Stateful rule sets driven straight through the engine, plus the
//! cross-rule operations exercised through the public API.

use sceptre_algebra::{Message, State};
use sceptre_engine::QueryEngine;
use sceptre_rules::{parse_rule, parse_rules};

// =============================================================================
// STATE-SENSITIVE SECRECY
// =============================================================================

// A store starts out holding the secret and is then overwritten. An
// observer that needs the channel name can only report what the store
// held *while the channel was known* — which depends on ranks, not on
// the final state.

fn store_rules() -> &'static str {
    "
    wipe = -[ (store(secret[]), a0) ]-> <a0: store(gone[])>
    peek = k(c[])(a0) -[ (store(x), a0) ]-> k(x)
    -[ ]-> k(c[])
    "
}

fn run(initial: Vec<State>, rules: &str, query: Message) -> Option<sceptre_engine::Attack> {
    let rules = parse_rules(rules).expect("rules parse");
    QueryEngine::new(initial, query, rules, 6).run().attack
}

#[test]
fn test_observed_states_leak_and_unreached_ones_do_not() {
    let initial = vec![State::new("store", Message::name("secret"))];
    assert!(run(initial.clone(), store_rules(), Message::name("secret")).is_some());
    assert!(run(initial.clone(), store_rules(), Message::name("gone")).is_some());
    assert!(run(initial, store_rules(), Message::name("neverheld")).is_none());
}

#[test]
fn test_attack_chains_name_their_rules() {
    let initial = vec![State::new("store", Message::name("secret"))];
    let attack = run(initial, store_rules(), Message::name("secret")).expect("attack");
    let report = attack.report();
    assert!(report
        .chain
        .iter()
        .any(|clause| clause.contains("secret[]")));
    assert!(attack.nession.is_some());
}

// =============================================================================
// CROSS-RULE OPERATIONS
// =============================================================================

#[test]
fn test_composition_through_the_textual_form() {
    let producer = parse_rule("k(x) -[ ]-> k(h(x))").unwrap();
    let consumer = parse_rule("k(h(y)), k(g(y)) -[ ]-> k(f(y))").unwrap();
    let mut counter = 0;
    let composed = producer.compose_with(&consumer, &mut counter);
    assert_eq!(composed.len(), 1);
    let rule = &composed[0];
    // h(y)'s premise was replaced by the producer's own premise.
    assert_eq!(rule.premises.len(), 2);
    assert!(rule.to_string().contains("f("));
}

#[test]
fn test_implication_through_the_textual_form() {
    let general = parse_rule("k(x) -[ ]-> k(h(x))").unwrap();
    let instance = parse_rule("k(a[]) -[ ]-> k(h(a[]))").unwrap();
    assert!(general.implies(&instance).is_some());
    assert!(instance.implies(&general).is_none());
}

#[test]
fn test_transfer_application_through_the_textual_form() {
    let transfer = parse_rule("-[ (store(secret[]), t0) ]-> <t0: store(gone[])>").unwrap();
    let observer = parse_rule("k(c[])(a0) -[ (store(secret[]), a0) ]-> k(done[])").unwrap();
    let mut counter = 0;
    let extended = transfer
        .transfer_applied_to(&observer, &mut counter)
        .expect("the observed state matches the transfer source");
    // The extended trace records the mutation one step after the
    // observation.
    assert!(extended.to_string().contains("store(gone[])"));
    assert!(!extended.is_transferring());
}

#[test]
fn test_transfer_application_rejects_mismatched_states() {
    let transfer = parse_rule("-[ (store(secret[]), t0) ]-> <t0: store(gone[])>").unwrap();
    let observer = parse_rule("k(c[])(a0) -[ (store(other[]), a0) ]-> k(done[])").unwrap();
    let mut counter = 0;
    assert!(transfer.transfer_applied_to(&observer, &mut counter).is_none());
}
