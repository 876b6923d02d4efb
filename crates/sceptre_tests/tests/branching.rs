//! Branch conditions end to end: `if` guards decide what leaks.

use sceptre_engine::QueryEngine;

fn attack_found(source: &str) -> bool {
    let _ = env_logger::builder().is_test(true).try_init();
    let network = sceptre_pi::parse_network(source).expect("source parses");
    let resolved = sceptre_process::resolve(&network).expect("network resolves");
    let translation = sceptre_translate::translate(&resolved).expect("network translates");
    let query = translation.queries[0].clone();
    QueryEngine::for_translation(&translation, query)
        .run()
        .attack
        .is_some()
}

// =============================================================================
// PASSWORD-GATED RESPONDER
// =============================================================================

// The responder reveals the secret only when the received value equals
// the password. Whether the attacker wins reduces to whether the
// password itself is available for injection.

#[test]
fn test_public_password_opens_the_gate() {
    let source = "
        free c: channel. free password: bitstring. free s: bitstring [private].
        query attacker(s).
        process in(c, v: bitstring); if v = password then out(c, s).
    ";
    assert!(
        attack_found(source),
        "the attacker can inject the public password and collect the reply"
    );
}

#[test]
fn test_private_password_keeps_the_gate_shut() {
    let source = "
        free c: channel. free password: bitstring [private]. free s: bitstring [private].
        query attacker(s).
        process in(c, v: bitstring); if v = password then out(c, s).
    ";
    assert!(
        !attack_found(source),
        "without the password no injected value satisfies the guard"
    );
}

#[test]
fn test_the_else_arm_is_gated_by_the_disequality() {
    // The else arm leaks a different secret; reaching it needs any value
    // that is *not* the password, which the attacker always has.
    let source = "
        free c: channel. free password: bitstring [private].
        free lure: bitstring [private].
        query attacker(lure).
        process in(c, v: bitstring); if v = password then 0 else out(c, lure).
    ";
    assert!(
        attack_found(source),
        "almost any injected value falls through to the else arm"
    );
}

// =============================================================================
// REPLICATION
// =============================================================================

#[test]
fn test_replicated_sender_still_leaks_on_a_public_channel() {
    let source = "
        free c: channel. free s: bitstring [private].
        query attacker(s).
        process !( out(c, s) | in(c, v: bitstring) ).
    ";
    assert!(attack_found(source), "replication does not hide a public send");
}

#[test]
fn test_replicated_reader_alone_reveals_nothing() {
    let source = "
        free c: channel. free s: bitstring [private].
        query attacker(s).
        process !( in(c, v: bitstring) ).
    ";
    assert!(!attack_found(source), "reading is not leaking");
}
