//! The shipped demo models keep their promised verdicts.

use sceptre_engine::QueryEngine;

fn verdict(source: &str) -> bool {
    let network = sceptre_pi::parse_network(source).expect("demo parses");
    let resolved = sceptre_process::resolve(&network).expect("demo resolves");
    let translation = sceptre_translate::translate(&resolved).expect("demo translates");
    let query = translation.queries[0].clone();
    QueryEngine::for_translation(&translation, query)
        .run()
        .attack
        .is_some()
}

#[test]
fn test_public_leak_demo_finds_an_attack() {
    assert!(verdict(include_str!("../../../demos/public_leak.pi")));
}

#[test]
fn test_private_relay_demo_finds_an_attack() {
    assert!(verdict(include_str!("../../../demos/private_relay.pi")));
}

#[test]
fn test_late_leak_demo_finds_no_attack() {
    assert!(!verdict(include_str!("../../../demos/late_leak.pi")));
}

#[test]
fn test_sealed_envelope_demo_finds_no_attack() {
    assert!(!verdict(include_str!("../../../demos/sealed_envelope.pi")));
}

#[test]
fn test_gatekeeper_demo_finds_an_attack_while_the_password_is_public() {
    assert!(verdict(include_str!("../../../demos/gatekeeper.pi")));
}
