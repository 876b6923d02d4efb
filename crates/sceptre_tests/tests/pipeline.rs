//! Pipeline integration: reader → resolver → translator.

use sceptre_process::{ResolveError, ResolvedKind};
use sceptre_rules::parse_rule;

fn resolve(source: &str) -> Result<sceptre_process::ResolvedNetwork, ResolveError> {
    let network = sceptre_pi::parse_network(source).expect("source parses");
    sceptre_process::resolve(&network)
}

// =============================================================================
// RESOLVER REJECTION SUITE
// =============================================================================

#[test]
fn test_undefined_name_is_rejected() {
    let err = resolve("free c: channel. process out(c, ghost)").unwrap_err();
    assert!(matches!(err, ResolveError::UndefinedName { .. }));
}

#[test]
fn test_undefined_type_is_rejected() {
    let err = resolve("free k: seeecret. process 0").unwrap_err();
    assert!(matches!(err, ResolveError::UndefinedType { .. }));
}

#[test]
fn test_duplicate_declaration_is_rejected() {
    let err = resolve("free c: channel. free c: channel. process 0").unwrap_err();
    assert!(matches!(err, ResolveError::DuplicateDeclaration { .. }));
}

#[test]
fn test_constructor_arity_is_checked() {
    let err = resolve(
        "free c: channel. fun h(bitstring): bitstring. free x: bitstring.
         process out(c, h(x, x))",
    )
    .unwrap_err();
    assert!(matches!(err, ResolveError::ArityMismatch { .. }));
}

#[test]
fn test_recursive_macros_are_rejected() {
    let err = resolve(
        "free c: channel. free x: bitstring.
         let ping(m: bitstring) = pong(m).
         let pong(m: bitstring) = ping(m).
         process ping(x)",
    )
    .unwrap_err();
    assert!(matches!(err, ResolveError::RecursiveMacro { .. }));
}

#[test]
fn test_channel_positions_are_type_checked() {
    let err = resolve(
        "free c: channel. free s: bitstring.
         process out(s, c)",
    )
    .unwrap_err();
    assert!(matches!(err, ResolveError::TypeMismatch { .. }));
}

// =============================================================================
// MACRO EXPANSION
// =============================================================================

#[test]
fn test_macro_expansion_is_transparent_to_translation() {
    let direct = resolve(
        "free c: channel. free s: bitstring [private].
         query attacker(s).
         process out(c, s)",
    )
    .unwrap();
    let via_macro = resolve(
        "free c: channel. free s: bitstring [private].
         query attacker(s).
         let sender(m: bitstring) = out(c, m).
         process sender(s)",
    )
    .unwrap();
    let shape = |net: &sceptre_process::ResolvedNetwork| match &net.process.kind {
        ResolvedKind::Out { channel, message, .. } => (channel.clone(), message.clone()),
        other => panic!("expected an out node, found {:?}", other),
    };
    assert_eq!(shape(&direct), shape(&via_macro));
}

// =============================================================================
// TRANSLATION SHAPE
// =============================================================================

#[test]
fn test_translation_report_serialises() {
    let resolved = resolve(
        "free c: channel. free s: bitstring [private].
         query attacker(s).
         process ( out(c, s) | in(c, v: bitstring) )",
    )
    .unwrap();
    let translation = sceptre_translate::translate(&resolved).unwrap();
    let report = translation.report();
    let json = serde_json::to_value(&report).expect("report serialises");
    assert_eq!(json["rule_count"], translation.rules.len());
    assert!(json["recommended_depth"].as_u64().unwrap() > 0);
    assert_eq!(json["queries"][0], "s[]");
}

#[test]
fn test_translated_rules_round_trip_through_the_textual_form() {
    let resolved = resolve(
        "free c: channel. free s: bitstring [private].
         query attacker(s).
         process ( out(c, s) | in(c, v: bitstring) )",
    )
    .unwrap();
    let translation = sceptre_translate::translate(&resolved).unwrap();
    for rule in &translation.rules {
        let rendered = rule.to_string();
        let reparsed = parse_rule(&rendered)
            .unwrap_or_else(|e| panic!("'{}' fails to reparse: {}", rendered, e));
        assert_eq!(&reparsed, rule, "round trip of '{}'", rendered);
    }
}

#[test]
fn test_every_query_resolves_to_a_message() {
    let resolved = resolve(
        "free c: channel. free s, t: bitstring [private].
         query attacker(s).
         query attacker(t).
         process ( out(c, s) | in(c, v: bitstring) )",
    )
    .unwrap();
    assert_eq!(resolved.queries.len(), 2);
}
