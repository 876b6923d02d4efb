//! End-to-end secrecy scenarios.
//!
//! Each test feeds a complete source model through the reader, resolver,
//! translator and query engine, and checks the verdict: does the
//! Dolev–Yao attacker learn the queried message?

use sceptre_engine::QueryEngine;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Runs the first query of `source` and reports whether an attack was
/// found.
fn attack_found(source: &str) -> bool {
    init_logging();
    let network = sceptre_pi::parse_network(source).expect("source parses");
    let resolved = sceptre_process::resolve(&network).expect("network resolves");
    let translation = sceptre_translate::translate(&resolved).expect("network translates");
    assert!(!translation.queries.is_empty(), "model declares a query");
    let query = translation.queries[0].clone();
    let mut engine = QueryEngine::for_translation(&translation, query);
    let outcome = engine.run();
    assert!(!outcome.cancelled);
    outcome.attack.is_some()
}

// =============================================================================
// TRIVIAL PUBLIC-CHANNEL LEAK
// =============================================================================

#[test]
fn test_public_channel_leak() {
    let source = "
        free c: channel.  free s: bitstring [private].
        query attacker(s).
        process ( out(c, s) | in(c, v: bitstring) ).
    ";
    assert!(attack_found(source), "a secret sent on a public channel leaks");
}

// =============================================================================
// PRIVATE-CHANNEL RELAY
// =============================================================================

#[test]
fn test_private_channel_relay_leaks_the_payload() {
    let source = "
        free c: channel. free d: channel [private]. free s: bitstring [private].
        query attacker(s).
        process out(d, s) | ( in(d, v: bitstring); out(c, v) ).
    ";
    assert!(
        attack_found(source),
        "the relay republishes the secret on the public channel"
    );
}

// =============================================================================
// FALSE-ATTACK AVOIDANCE
// =============================================================================

#[test]
fn test_late_channel_leak_does_not_expose_earlier_traffic() {
    let source = "
        free c: channel. free d: channel [private]. free s: bitstring [private].
        query attacker(s).
        process out(d, s) | ( in(d, v: bitstring); out(c, d) ).
    ";
    assert!(
        !attack_found(source),
        "d leaks only after the secret was already consumed; s stays safe"
    );
}

#[test]
fn test_the_channel_itself_does_leak_in_the_relay_variant() {
    let source = "
        free c: channel. free d: channel [private]. free s: bitstring [private].
        query attacker(d).
        process out(d, s) | ( in(d, v: bitstring); out(c, d) ).
    ";
    assert!(attack_found(source), "d is republished on the public channel");
}

// =============================================================================
// DESTRUCTORS
// =============================================================================

#[test]
fn test_encryption_under_a_public_key_name_leaks() {
    let source = "
        type key. free c: channel. free theKey: key.
        fun enc(bitstring, key): bitstring.
        reduc forall x: bitstring, y: key; dec(enc(x, y), y) = x.
        query attacker(new value).
        process new value: bitstring; out(c, enc(value, theKey)).
    ";
    assert!(
        attack_found(source),
        "theKey is public, so the ciphertext opens"
    );
}

#[test]
fn test_encryption_under_a_private_key_holds() {
    let source = "
        type key. free c: channel. free theKey: key [private].
        fun enc(bitstring, key): bitstring.
        reduc forall x: bitstring, y: key; dec(enc(x, y), y) = x.
        query attacker(new value).
        process new value: bitstring; out(c, enc(value, theKey)).
    ";
    assert!(!attack_found(source), "without the key the ciphertext is opaque");
}

// =============================================================================
// LET WITH TUPLE DESTRUCTURING
// =============================================================================

#[test]
fn test_tuple_destructuring_forwards_a_component() {
    let source = "
        free pub: channel. free v1, v2: bitstring [private].
        query attacker(v1).
        process new c: channel;
          ( out(c, (v1, v2)) | (in(c, v: bitstring); let (a: bitstring, b: bitstring) = v in out(pub, a)) ).
    ";
    assert!(
        attack_found(source),
        "the first tuple component reaches the public channel"
    );
}

#[test]
fn test_the_unforwarded_component_stays_secret() {
    let source = "
        free pub: channel. free v1, v2: bitstring [private].
        query attacker(v2).
        process new c: channel;
          ( out(c, (v1, v2)) | (in(c, v: bitstring); let (a: bitstring, b: bitstring) = v in out(pub, a)) ).
    ";
    assert!(!attack_found(source), "only the first component is republished");
}

// =============================================================================
// GUARDED RULE SETS (textual form, no process model)
// =============================================================================

fn textual_attack_found(rules: &str, query: sceptre_algebra::Message) -> bool {
    init_logging();
    let rules = sceptre_rules::parse_rules(rules).expect("rules parse");
    let mut engine = QueryEngine::new(Vec::new(), query, rules, 4);
    engine.run().attack.is_some()
}

#[test]
fn test_guarded_comparison_blocks_the_banned_shape() {
    use sceptre_algebra::Message;
    let rules = "
        [x ~/> a[]] k(x), k(y) -[ ]-> k(enc(x, y))
        -[ ]-> k(a[])
        -[ ]-> k(b[])
    ";
    let blocked = Message::func("enc", vec![Message::name("a"), Message::name("b")]);
    assert!(!textual_attack_found(rules, blocked));

    let allowed = Message::func("enc", vec![Message::name("b"), Message::name("a")]);
    assert!(textual_attack_found(rules, allowed));
}
