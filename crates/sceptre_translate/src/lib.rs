//! # sceptre-translate
//!
//! The translator: a resolved applied-pi network in, a [`Translation`]
//! out — initial cell states, stateful Horn rules, secrecy queries and an
//! elaboration depth hint.
//!
//! The pipeline is the classic three steps:
//!
//! 1. a pre-pass assigns every branch its [`Socket`]s (infinite under
//!    replication);
//! 2. a recursive walk over the process tree emits [`MutateRule`]s, each
//!    describing exactly one Horn rule, with branch conditions stacked
//!    from enclosing `if`/`let` arms;
//! 3. each mutate rule generates its rule through a fresh `RuleFactory`,
//!    joined by the attacker's base theory ([`attacker_base`]).
//!
//! Channel values that escape a replicated scope are reified into tokens
//! and their senders and receivers compiled into plain Horn clauses — the
//! ProVerif-style fallback that trades state precision for soundness on
//! unbounded paths.

pub mod error;
pub mod knowledge;
pub mod mutate;
pub mod socket;
pub mod translation;
pub mod walk;

pub use error::{TranslationError, TranslationResult};
pub use knowledge::attacker_base;
pub use mutate::{cell_fact, MutateRule};
pub use socket::{channel_tag, Direction, Socket, SocketBranch};
pub use translation::{Translation, TranslationReport};
pub use walk::translate;

// Integration-level translator tests live in the sceptre-tests crate,
// where the reader is available; the tests here exercise the walk on
// hand-built networks.
#[cfg(test)]
mod tests {
    use super::*;

    use sceptre_algebra::Message;
    use sceptre_process::{
        FreeDecl, Network, Pattern, Process, Query, ResolvedNetwork, Term,
    };

    fn relay_network() -> ResolvedNetwork {
        let mut net = Network::new();
        net.frees.push(FreeDecl { name: "c".into(), ty: "channel".into(), private: false });
        net.frees.push(FreeDecl { name: "s".into(), ty: "bitstring".into(), private: true });
        net.queries.push(Query { term: Term::atom("s"), fresh: false });
        net.main = Some(Process::Parallel(vec![
            Process::Out {
                channel: Term::atom("c"),
                message: Term::atom("s"),
                next: Box::new(Process::Nil),
            },
            Process::In {
                channel: Term::atom("c"),
                pattern: Pattern::Variable { name: "v".into(), ty: "bitstring".into() },
                next: Box::new(Process::Nil),
            },
        ]));
        sceptre_process::resolve(&net).expect("fixture resolves")
    }

    #[test]
    fn translation_covers_both_sockets() {
        let translation = translate(&relay_network()).expect("translates");
        assert_eq!(translation.initial_states.len(), 2);
        assert!(translation
            .initial_states
            .iter()
            .any(|s| s.cell == "c@out@1"));
        assert!(translation
            .initial_states
            .iter()
            .any(|s| s.cell == "c@in@2"));
        assert_eq!(translation.queries, vec![Message::name("s")]);
        assert!(translation.recommended_depth > 4);
    }

    #[test]
    fn translation_emits_open_write_link_and_eavesdrop() {
        let translation = translate(&relay_network()).expect("translates");
        let labels: Vec<String> = translation
            .rules
            .iter()
            .filter_map(|r| r.label.clone())
            .collect();
        assert!(labels.iter().any(|l| l.starts_with("open:c@out@1")));
        assert!(labels.iter().any(|l| l.starts_with("open:c@in@2")));
        assert!(labels.iter().any(|l| l.starts_with("write:c@out@1")));
        assert!(labels.iter().any(|l| l.starts_with("link:c@out@1>c@in@2")));
        assert!(labels.iter().any(|l| l.starts_with("eavesdrop:c@out@1")));
        assert!(labels.iter().any(|l| l.starts_with("inject:c@in@2")));
        assert!(labels.iter().any(|l| l.starts_with("read:c@in@2")));
        assert!(labels.iter().any(|l| l == "public:c[]"));
    }

    #[test]
    fn private_channel_with_no_reader_is_an_error() {
        let mut net = Network::new();
        net.frees.push(FreeDecl { name: "d".into(), ty: "channel".into(), private: true });
        net.frees.push(FreeDecl { name: "s".into(), ty: "bitstring".into(), private: true });
        net.main = Some(Process::Out {
            channel: Term::atom("d"),
            message: Term::atom("s"),
            next: Box::new(Process::Nil),
        });
        let resolved = sceptre_process::resolve(&net).unwrap();
        assert!(matches!(
            translate(&resolved),
            Err(TranslationError::NoReader { .. })
        ));
    }

    #[test]
    fn replicated_sockets_are_infinite() {
        let mut net = Network::new();
        net.frees.push(FreeDecl { name: "c".into(), ty: "channel".into(), private: false });
        net.frees.push(FreeDecl { name: "s".into(), ty: "bitstring".into(), private: true });
        net.main = Some(Process::Replicate(Box::new(Process::Out {
            channel: Term::atom("c"),
            message: Term::atom("s"),
            next: Box::new(Process::Nil),
        })));
        let resolved = sceptre_process::resolve(&net).unwrap();
        let translation = translate(&resolved).expect("translates");
        assert!(translation
            .initial_states
            .iter()
            .any(|s| s.cell.starts_with("c@out@r")));
        let labels: Vec<String> = translation
            .rules
            .iter()
            .filter_map(|r| r.label.clone())
            .collect();
        // Replicated writes are unconditional (no interaction count in
        // the label) and nothing ever shuts the socket.
        assert!(labels.iter().any(|l| l.starts_with("write:c@out@r")));
        assert!(!labels.iter().any(|l| l.starts_with("shut:c@out@r")));
    }
}
