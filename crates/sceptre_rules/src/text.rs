//! The textual rule form.
//!
//! Rules have a compact human-readable syntax used by diagnostics and
//! tests:
//!
//! ```text
//! label = [x ~/> a[]] k(x)(a0), k(y) -[ (cell(v), a0) : { a0 =< a1 } ]-> k(enc(x, y))
//! ```
//!
//! - events: `k`/`know`, `n`/`new`, `l`/`leak`, `a`/`accept`, `i`/`init`;
//! - terms: `a[]` names, `[n]` nonces, bare identifiers for variables,
//!   `f(..)` functions, `<..>` tuples;
//! - a premise's snapshot witnesses follow it parenthesised: `k(m)(a0)`;
//! - the snapshot section lists `(State, aid)` pairs and an optional
//!   ordering block with `=<` (at or later), `<@` (modified once) and
//!   `~` (unified — the two ids are one snapshot);
//! - conclusions are an event, or `<a0: cell(v')>` transfers.
//!
//! [`Rule`]'s `Display` implementation emits this same syntax, so rules
//! round-trip through [`parse_rule`].

use std::fmt;

use sceptre_algebra::{Event, EventKind, Message, State};

use crate::factory::RuleFactory;
use crate::rule::Rule;
use crate::snapshot::SnapshotId;

/// A syntax error in a textual rule, with its byte position.
#[derive(Debug, Clone, PartialEq)]
pub struct TextParseError {
    pub message: String,
    pub position: usize,
}

impl TextParseError {
    fn new(message: impl Into<String>, position: usize) -> TextParseError {
        TextParseError {
            message: message.into(),
            position,
        }
    }
}

impl fmt::Display for TextParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at byte {}", self.message, self.position)
    }
}

impl std::error::Error for TextParseError {}

type TextResult<T> = Result<T, TextParseError>;

// ============================================================================
// Lexer
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    ArrowOpen,  // -[
    ArrowClose, // ]->
    AtOrLater,  // =<
    ModOnce,    // <@
    NotUnify,   // ~/>
    NotEqual,   // =/=
    Unified,    // ~
    Lt,
    Gt,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Equals,
}

fn lex(text: &str) -> TextResult<Vec<(Tok, usize)>> {
    let bytes = text.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        let start = i;
        match c {
            ' ' | '\t' | '\r' | '\n' => {
                i += 1;
            }
            '-' => {
                if bytes.get(i + 1) == Some(&b'[') {
                    out.push((Tok::ArrowOpen, start));
                    i += 2;
                } else {
                    return Err(TextParseError::new("stray '-'", start));
                }
            }
            ']' => {
                if bytes.get(i + 1) == Some(&b'-') && bytes.get(i + 2) == Some(&b'>') {
                    out.push((Tok::ArrowClose, start));
                    i += 3;
                } else {
                    out.push((Tok::RBracket, start));
                    i += 1;
                }
            }
            '=' => {
                if bytes.get(i + 1) == Some(&b'<') {
                    out.push((Tok::AtOrLater, start));
                    i += 2;
                } else if bytes.get(i + 1) == Some(&b'/') && bytes.get(i + 2) == Some(&b'=') {
                    out.push((Tok::NotEqual, start));
                    i += 3;
                } else {
                    out.push((Tok::Equals, start));
                    i += 1;
                }
            }
            '<' => {
                if bytes.get(i + 1) == Some(&b'@') {
                    out.push((Tok::ModOnce, start));
                    i += 2;
                } else {
                    out.push((Tok::Lt, start));
                    i += 1;
                }
            }
            '~' => {
                if bytes.get(i + 1) == Some(&b'/') && bytes.get(i + 2) == Some(&b'>') {
                    out.push((Tok::NotUnify, start));
                    i += 3;
                } else {
                    out.push((Tok::Unified, start));
                    i += 1;
                }
            }
            '>' => {
                out.push((Tok::Gt, start));
                i += 1;
            }
            '(' => {
                out.push((Tok::LParen, start));
                i += 1;
            }
            ')' => {
                out.push((Tok::RParen, start));
                i += 1;
            }
            '[' => {
                out.push((Tok::LBracket, start));
                i += 1;
            }
            '{' => {
                out.push((Tok::LBrace, start));
                i += 1;
            }
            '}' => {
                out.push((Tok::RBrace, start));
                i += 1;
            }
            ',' => {
                out.push((Tok::Comma, start));
                i += 1;
            }
            ':' => {
                out.push((Tok::Colon, start));
                i += 1;
            }
            c if c.is_ascii_alphanumeric() || c == '_' => {
                let mut j = i;
                while j < bytes.len() {
                    let d = bytes[j] as char;
                    if d.is_ascii_alphanumeric() || matches!(d, '_' | '@' | '.' | '\'') {
                        j += 1;
                    } else {
                        break;
                    }
                }
                out.push((Tok::Ident(text[i..j].to_string()), start));
                i = j;
            }
            other => {
                return Err(TextParseError::new(format!("unexpected character '{}'", other), start));
            }
        }
    }
    Ok(out)
}

// ============================================================================
// Parser
// ============================================================================

struct Parser {
    toks: Vec<(Tok, usize)>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn new(text: &str) -> TextResult<Parser> {
        Ok(Parser {
            toks: lex(text)?,
            pos: 0,
            end: text.len(),
        })
    }

    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos).map(|(t, _)| t)
    }

    fn here(&self) -> usize {
        self.toks.get(self.pos).map(|(_, p)| *p).unwrap_or(self.end)
    }

    fn advance(&mut self) -> Option<Tok> {
        let t = self.toks.get(self.pos).map(|(t, _)| t.clone());
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, tok: Tok, what: &str) -> TextResult<()> {
        let at = self.here();
        match self.advance() {
            Some(t) if t == tok => Ok(()),
            _ => Err(TextParseError::new(format!("expected {}", what), at)),
        }
    }

    fn expect_ident(&mut self, what: &str) -> TextResult<String> {
        let at = self.here();
        match self.advance() {
            Some(Tok::Ident(s)) => Ok(s),
            _ => Err(TextParseError::new(format!("expected {}", what), at)),
        }
    }

    fn parse_term(&mut self) -> TextResult<Message> {
        let at = self.here();
        match self.advance() {
            Some(Tok::LBracket) => {
                let symbol = self.expect_ident("nonce symbol")?;
                self.expect(Tok::RBracket, "']' after nonce symbol")?;
                let (symbol, origin) = split_nonce(&symbol);
                Ok(Message::nonce(symbol, origin))
            }
            Some(Tok::Lt) => {
                let mut members = vec![self.parse_term()?];
                while self.peek() == Some(&Tok::Comma) {
                    self.advance();
                    members.push(self.parse_term()?);
                }
                self.expect(Tok::Gt, "'>' closing tuple")?;
                Ok(Message::tuple(members))
            }
            Some(Tok::Ident(symbol)) => match self.peek() {
                Some(Tok::LBracket) => {
                    self.advance();
                    self.expect(Tok::RBracket, "']' after name")?;
                    Ok(Message::name(symbol))
                }
                Some(Tok::LParen) => {
                    self.advance();
                    let mut args = Vec::new();
                    if self.peek() != Some(&Tok::RParen) {
                        args.push(self.parse_term()?);
                        while self.peek() == Some(&Tok::Comma) {
                            self.advance();
                            args.push(self.parse_term()?);
                        }
                    }
                    self.expect(Tok::RParen, "')' closing arguments")?;
                    Ok(Message::func(symbol, args))
                }
                _ => Ok(Message::var(symbol)),
            },
            _ => Err(TextParseError::new("expected a term", at)),
        }
    }

    fn parse_event(&mut self) -> TextResult<Event> {
        let at = self.here();
        let tag = self.expect_ident("event tag")?;
        let kind = match tag.as_str() {
            "k" | "know" => EventKind::Know,
            "n" | "new" => EventKind::New,
            "l" | "leak" => EventKind::Leak,
            "a" | "accept" => EventKind::Accept,
            "i" | "init" => EventKind::Init,
            other => {
                return Err(TextParseError::new(format!("unknown event tag '{}'", other), at));
            }
        };
        self.expect(Tok::LParen, "'(' after event tag")?;
        let message = self.parse_term()?;
        self.expect(Tok::RParen, "')' closing event")?;
        Ok(Event::new(kind, message))
    }
}

/// Alias bookkeeping for `~`-unified snapshot ids.
#[derive(Default)]
struct SnapshotNames {
    declared: Vec<(String, State)>,
    alias: Vec<(String, String)>,
}

impl SnapshotNames {
    fn canonical<'a>(&'a self, name: &'a str) -> &'a str {
        let mut current = name;
        loop {
            match self.alias.iter().find(|(from, _)| from == current) {
                Some((_, to)) => current = to,
                None => return current,
            }
        }
    }
}

/// The origin-tagged nonce form `[sym.origin]`; a bare `[sym]` is origin
/// zero.
fn split_nonce(raw: &str) -> (String, u32) {
    if let Some(pos) = raw.rfind('.') {
        if let Ok(origin) = raw[pos + 1..].parse::<u32>() {
            return (raw[..pos].to_string(), origin);
        }
    }
    (raw.to_string(), 0)
}

/// Reads one rule from its textual form.
pub fn parse_rule(text: &str) -> TextResult<Rule> {
    let mut p = Parser::new(text)?;
    let mut factory = RuleFactory::new();

    // Optional label: everything before the first bare '=' (labels may
    // contain characters that lex as several tokens, so the raw source
    // slice is authoritative). Terms never contain a bare '=', so an
    // unlabelled rule never trips this.
    let mut label_cut = None;
    for (i, (tok, pos)) in p.toks.iter().enumerate() {
        match tok {
            Tok::Equals => {
                label_cut = Some((i, *pos));
                break;
            }
            Tok::ArrowOpen => break,
            _ => {}
        }
    }
    if let Some((index, pos)) = label_cut {
        let label = text[..pos].trim();
        if !label.is_empty() {
            factory.set_label(label);
        }
        p.pos = index + 1;
    }

    // Optional guard.
    if p.peek() == Some(&Tok::LBracket) {
        p.advance();
        loop {
            let left = p.parse_term()?;
            let at = p.here();
            match p.advance() {
                Some(Tok::NotUnify) | Some(Tok::NotEqual) => {}
                _ => return Err(TextParseError::new("expected '~/>' or '=/=' in guard", at)),
            }
            let right = p.parse_term()?;
            factory.add_guard(left, right);
            match p.advance() {
                Some(Tok::Comma) => continue,
                Some(Tok::RBracket) => break,
                _ => return Err(TextParseError::new("expected ',' or ']' in guard", p.here())),
            }
        }
    }

    // Premises (collected; witnesses resolved after the snapshot section).
    let mut premises: Vec<(Event, Vec<String>)> = Vec::new();
    while matches!(p.peek(), Some(Tok::Ident(_))) {
        let event = p.parse_event()?;
        let mut witnesses = Vec::new();
        if p.peek() == Some(&Tok::LParen) {
            p.advance();
            witnesses.push(p.expect_ident("snapshot id")?);
            while p.peek() == Some(&Tok::Comma) {
                p.advance();
                witnesses.push(p.expect_ident("snapshot id")?);
            }
            p.expect(Tok::RParen, "')' closing snapshot witnesses")?;
        }
        premises.push((event, witnesses));
        if p.peek() == Some(&Tok::Comma) {
            p.advance();
        } else {
            break;
        }
    }

    p.expect(Tok::ArrowOpen, "'-['")?;

    // Snapshot associations and orderings.
    let mut names = SnapshotNames::default();
    let mut orderings: Vec<(String, Tok, String)> = Vec::new();
    while p.peek() == Some(&Tok::LParen) {
        p.advance();
        let cell = p.expect_ident("cell name")?;
        p.expect(Tok::LParen, "'(' after cell name")?;
        let value = p.parse_term()?;
        p.expect(Tok::RParen, "')' after cell value")?;
        p.expect(Tok::Comma, "',' before snapshot id")?;
        let aid = p.expect_ident("snapshot id")?;
        p.expect(Tok::RParen, "')' closing snapshot")?;
        if names.declared.iter().any(|(n, _)| n == &aid) {
            return Err(TextParseError::new(format!("snapshot id '{}' declared twice", aid), p.here()));
        }
        names.declared.push((aid, State::new(cell, value)));
        if p.peek() == Some(&Tok::Comma) {
            p.advance();
        }
    }
    if p.peek() == Some(&Tok::Colon) {
        p.advance();
        p.expect(Tok::LBrace, "'{' opening orderings")?;
        loop {
            let left = p.expect_ident("snapshot id")?;
            let at = p.here();
            let op = match p.advance() {
                Some(t @ (Tok::AtOrLater | Tok::ModOnce | Tok::Unified)) => t,
                _ => {
                    return Err(TextParseError::new("expected '=<', '<@' or '~'", at));
                }
            };
            let right = p.expect_ident("snapshot id")?;
            orderings.push((left, op, right));
            match p.advance() {
                Some(Tok::Comma) => continue,
                Some(Tok::RBrace) => break,
                _ => return Err(TextParseError::new("expected ',' or '}' in orderings", p.here())),
            }
        }
    }

    p.expect(Tok::ArrowClose, "']->'")?;

    // Apply '~' aliases before registering.
    for (left, op, right) in &orderings {
        if *op == Tok::Unified {
            let l = names.canonical(left).to_string();
            let r = names.canonical(right).to_string();
            if l != r {
                names.alias.push((r, l));
            }
        }
    }
    let mut ids: Vec<(String, SnapshotId)> = Vec::new();
    for (name, state) in &names.declared {
        let canon = names.canonical(name).to_string();
        match ids.iter().find(|(n, _)| n == &canon) {
            Some(_) => {
                // A unified id must agree with its partner's state.
                let partner = names
                    .declared
                    .iter()
                    .find(|(n, _)| *n == canon)
                    .map(|(_, s)| s);
                if partner != Some(state) {
                    return Err(TextParseError::new(
                        format!("snapshot '{}' unified with a different state", name),
                        0,
                    ));
                }
            }
            None => {
                let id = factory.register_state(state.clone());
                ids.push((canon, id));
            }
        }
    }
    let resolve = |names: &SnapshotNames, ids: &[(String, SnapshotId)], name: &str| -> TextResult<SnapshotId> {
        let canon = names.canonical(name).to_string();
        ids.iter()
            .find(|(n, _)| *n == canon)
            .map(|(_, id)| *id)
            .ok_or_else(|| TextParseError::new(format!("unknown snapshot id '{}'", name), 0))
    };
    for (left, op, right) in &orderings {
        let earlier = resolve(&names, &ids, left)?;
        let later = resolve(&names, &ids, right)?;
        let link = match op {
            Tok::AtOrLater => factory.link_later(earlier, later),
            Tok::ModOnce => factory.link_modified_once(earlier, later),
            _ => Ok(()),
        };
        link.map_err(|e| TextParseError::new(e.to_string(), 0))?;
    }
    for (event, witnesses) in premises {
        let mut snapshot_ids = Vec::new();
        for w in &witnesses {
            snapshot_ids.push(resolve(&names, &ids, w)?);
        }
        factory
            .add_premise_at(event, &snapshot_ids)
            .map_err(|e| TextParseError::new(e.to_string(), 0))?;
    }

    // Conclusion.
    let rule = if p.peek() == Some(&Tok::Lt) {
        p.advance();
        loop {
            let aid = p.expect_ident("snapshot id")?;
            p.expect(Tok::Colon, "':' after snapshot id")?;
            let cell = p.expect_ident("cell name")?;
            p.expect(Tok::LParen, "'(' after cell name")?;
            let value = p.parse_term()?;
            p.expect(Tok::RParen, "')' after cell value")?;
            let id = resolve(&names, &ids, &aid)?;
            factory
                .set_transfer(id, State::new(cell, value))
                .map_err(|e| TextParseError::new(e.to_string(), 0))?;
            match p.advance() {
                Some(Tok::Comma) => continue,
                Some(Tok::Gt) => break,
                _ => return Err(TextParseError::new("expected ',' or '>' in transfers", p.here())),
            }
        }
        factory
            .create_transferring()
            .map_err(|e| TextParseError::new(e.to_string(), 0))?
    } else {
        let result = p.parse_event()?;
        factory
            .create_consistent(result)
            .map_err(|e| TextParseError::new(e.to_string(), 0))?
    };

    if p.peek().is_some() {
        return Err(TextParseError::new("trailing input after rule", p.here()));
    }
    Ok(rule)
}

/// Reads one rule per non-empty line.
pub fn parse_rules(text: &str) -> TextResult<Vec<Rule>> {
    let mut out = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        out.push(parse_rule(trimmed)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::RuleConclusion;
    use sceptre_algebra::Guard;

    #[test]
    fn parses_a_guarded_constructor_rule() {
        let rule = parse_rule("[x ~/> a[]] k(x), k(y) -[ ]-> k(enc(x, y))").unwrap();
        assert_eq!(rule.premises.len(), 2);
        assert_eq!(rule.guard.len(), 1);
        assert_eq!(
            rule.result().unwrap().message,
            Message::func("enc", vec![Message::var("x"), Message::var("y")])
        );
    }

    #[test]
    fn parses_a_fact() {
        let rule = parse_rule("-[ ]-> k(a[])").unwrap();
        assert!(rule.premises.is_empty());
        assert_eq!(rule.result().unwrap().message, Message::name("a"));
    }

    #[test]
    fn parses_a_labelled_rule() {
        let rule = parse_rule("pair = k(x), k(y) -[ ]-> k(<x, y>)").unwrap();
        assert_eq!(rule.label.as_deref(), Some("pair"));
        assert_eq!(
            rule.result().unwrap().message,
            Message::tuple(vec![Message::var("x"), Message::var("y")])
        );
    }

    #[test]
    fn parses_snapshots_and_witnesses() {
        let rule = parse_rule(
            "k(c[])(a0) -[ (store(x), a0), (store(y), a1) : { a0 =< a1 } ]-> k(x)",
        )
        .unwrap();
        assert_eq!(rule.snapshots.len(), 2);
        assert_eq!(rule.premises[0].snapshots.len(), 1);
        let w = rule.premises[0].snapshots[0];
        assert!(rule.snapshots.reaches(w, 1 - w));
    }

    #[test]
    fn parses_modified_once_links() {
        let rule = parse_rule(
            "-[ (cell(a[]), s0), (cell(b[]), s1) : { s0 <@ s1 } ]-> k(done[])",
        )
        .unwrap();
        assert!(rule.snapshots.reaches_modified_once(0, 1));
    }

    #[test]
    fn parses_a_transfer_conclusion() {
        let rule = parse_rule("k(v) -[ (chan(w[]), a0) ]-> <a0: chan(v)>").unwrap();
        assert!(rule.is_transferring());
        let transfers = rule.transfers();
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].2.value, Message::var("v"));
    }

    #[test]
    fn unified_ids_collapse_to_one_snapshot() {
        let rule = parse_rule(
            "-[ (cell(x), a0), (cell(x), a1) : { a0 ~ a1 } ]-> k(x)",
        )
        .unwrap();
        assert_eq!(rule.snapshots.len(), 1);
    }

    #[test]
    fn nonce_and_event_alias_forms() {
        let rule = parse_rule("new([n]) -[ ]-> know(h([n]))").unwrap();
        assert_eq!(rule.premises[0].event.kind, EventKind::New);
        assert_eq!(rule.premises[0].event.message, Message::nonce("n", 0));
    }

    #[test]
    fn rejects_unknown_event_tag() {
        assert!(parse_rule("q(x) -[ ]-> k(x)").is_err());
    }

    #[test]
    fn rejects_unknown_snapshot_reference() {
        assert!(parse_rule("k(x)(a9) -[ (cell(x), a0) ]-> k(x)").is_err());
    }

    #[test]
    fn rejects_trailing_garbage() {
        assert!(parse_rule("-[ ]-> k(a[]) extra").is_err());
    }

    #[test]
    fn parse_rules_reads_one_per_line() {
        let rules = parse_rules(
            "[x ~/> a[]] k(x), k(y) -[ ]-> k(enc(x, y))\n-[ ]-> k(a[])\n-[ ]-> k(b[])\n",
        )
        .unwrap();
        assert_eq!(rules.len(), 3);
    }

    #[test]
    fn display_round_trips() {
        let source = "[x ~/> a[]] k(x), k(y) -[ ]-> k(enc(x, y))";
        let rule = parse_rule(source).unwrap();
        assert_eq!(rule.to_string(), source);
        let reparsed = parse_rule(&rule.to_string()).unwrap();
        assert_eq!(reparsed, rule);
    }

    #[test]
    fn stateful_display_round_trips() {
        let source = "k(c[])(a0) -[ (store(x), a0), (store(y), a1) : { a0 =< a1 } ]-> k(x)";
        let rule = parse_rule(source).unwrap();
        let reparsed = parse_rule(&rule.to_string()).unwrap();
        assert_eq!(reparsed, rule);
    }

    #[test]
    fn labels_with_punctuation_round_trip() {
        let rule = parse_rule("open:c@out@1:c@in@2 = -[ (c@out@1(_Init[]), a0) ]-> <a0: c@out@1(_Waiting(_n0[]))>")
            .unwrap();
        assert_eq!(rule.label.as_deref(), Some("open:c@out@1:c@in@2"));
        let reparsed = parse_rule(&rule.to_string()).unwrap();
        assert_eq!(reparsed, rule);
    }

    #[test]
    fn nonce_origins_survive_round_trip() {
        let rule = parse_rule("-[ ]-> k(enc([n.3], [n]))").unwrap();
        assert_eq!(
            rule.result().unwrap().message,
            Message::func("enc", vec![Message::nonce("n", 3), Message::nonce("n", 0)])
        );
        let reparsed = parse_rule(&rule.to_string()).unwrap();
        assert_eq!(reparsed, rule);
    }

    #[test]
    fn guard_survives_round_trip() {
        let rule = parse_rule("[x ~/> a[], y =/= b[]] k(x), k(y) -[ ]-> k(<x, y>)").unwrap();
        let mut expected = Guard::empty();
        expected.forbid(Message::var("x"), Message::name("a"));
        expected.forbid(Message::var("y"), Message::name("b"));
        assert_eq!(rule.guard, expected);
        assert!(matches!(rule.conclusion, RuleConclusion::Consistent { .. }));
    }
}
