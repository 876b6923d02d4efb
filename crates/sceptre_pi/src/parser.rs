//! Recursive-descent parser for the applied-pi source format.
//!
//! A source file is a sequence of declarations terminated by `.`, with a
//! single top-level `process`. Process operators bind in the usual way:
//! `;` sequences, `!` replicates its operand, `|` is weakest and
//! parenthesised subprocesses reset precedence.

use sceptre_process::{
    Comparison, ConstDecl, Destructor, EventDecl, FreeDecl, FunDecl, MacroDecl, Network, Pattern,
    Process, Query, TableDecl, Term,
};

use crate::error::{ParseError, ParseResult};
use crate::lexer::lex;
use crate::token::{Span, Token};

/// Parses a whole source file into a [`Network`].
pub fn parse_network(source: &str) -> ParseResult<Network> {
    Parser::new(source)?.parse_network()
}

struct Parser {
    toks: Vec<(Token, Span)>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn new(source: &str) -> ParseResult<Parser> {
        Ok(Parser {
            toks: lex(source)?,
            pos: 0,
            end: source.len(),
        })
    }

    // --------------------------------------------------------------------
    // Token plumbing
    // --------------------------------------------------------------------

    fn peek(&self) -> Option<&Token> {
        self.toks.get(self.pos).map(|(t, _)| t)
    }

    fn here(&self) -> Span {
        self.toks
            .get(self.pos)
            .map(|(_, s)| *s)
            .unwrap_or(Span::new(self.end, self.end))
    }

    fn advance(&mut self) -> Option<Token> {
        let t = self.toks.get(self.pos).map(|(t, _)| t.clone());
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, token: Token) -> ParseResult<()> {
        let span = self.here();
        match self.advance() {
            Some(t) if t == token => Ok(()),
            Some(t) => Err(ParseError::new(format!("expected {}, found {}", token, t), span)),
            None => Err(ParseError::new(format!("expected {}", token), span)),
        }
    }

    fn expect_ident(&mut self, what: &str) -> ParseResult<String> {
        let span = self.here();
        match self.advance() {
            Some(Token::Ident(s)) => Ok(s),
            _ => Err(ParseError::new(format!("expected {}", what), span)),
        }
    }

    fn expect_keyword(&mut self, word: &str) -> ParseResult<()> {
        let span = self.here();
        match self.advance() {
            Some(Token::Ident(s)) if s == word => Ok(()),
            _ => Err(ParseError::new(format!("expected '{}'", word), span)),
        }
    }

    fn at_keyword(&self, word: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(s)) if s == word)
    }

    // --------------------------------------------------------------------
    // Statements
    // --------------------------------------------------------------------

    fn parse_network(&mut self) -> ParseResult<Network> {
        let mut net = Network::new();
        while self.peek().is_some() {
            let span = self.here();
            let word = self.expect_ident("a declaration keyword")?;
            match word.as_str() {
                "free" => self.parse_free(&mut net)?,
                "const" => self.parse_const(&mut net)?,
                "type" => {
                    let name = self.expect_ident("type name")?;
                    net.types.push(name);
                    self.expect(Token::Dot)?;
                }
                "fun" => self.parse_fun(&mut net)?,
                "reduc" => self.parse_reduc(&mut net)?,
                "table" => self.parse_table(&mut net)?,
                "event" => self.parse_event(&mut net)?,
                "query" => {
                    let query = self.parse_attacker_query()?;
                    net.queries.push(query);
                    self.expect(Token::Dot)?;
                }
                "not" => {
                    let query = self.parse_attacker_query()?;
                    net.not_attacker.push(query);
                    self.expect(Token::Dot)?;
                }
                "set" => {
                    let key = self.expect_ident("option name")?;
                    self.expect(Token::Equals)?;
                    let value = self.expect_ident("option value")?;
                    net.settings.push((key, value));
                    self.expect(Token::Dot)?;
                }
                "let" => self.parse_macro(&mut net)?,
                "process" => {
                    if net.main.is_some() {
                        return Err(ParseError::new("a second top-level process", span));
                    }
                    let body = self.parse_process()?;
                    if self.peek() == Some(&Token::Dot) {
                        self.advance();
                    }
                    net.main = Some(body);
                }
                other => {
                    return Err(ParseError::new(
                        format!("unknown declaration '{}'", other),
                        span,
                    ));
                }
            }
        }
        Ok(net)
    }

    fn parse_name_list(&mut self) -> ParseResult<Vec<String>> {
        let mut names = vec![self.expect_ident("a name")?];
        while self.peek() == Some(&Token::Comma) {
            self.advance();
            names.push(self.expect_ident("a name")?);
        }
        Ok(names)
    }

    /// `[private]` after a declaration, if present.
    fn parse_private_suffix(&mut self) -> ParseResult<bool> {
        if self.peek() != Some(&Token::LBracket) {
            return Ok(false);
        }
        self.advance();
        self.expect_keyword("private")?;
        self.expect(Token::RBracket)?;
        Ok(true)
    }

    fn parse_free(&mut self, net: &mut Network) -> ParseResult<()> {
        let names = self.parse_name_list()?;
        self.expect(Token::Colon)?;
        let ty = self.expect_ident("type name")?;
        let private = self.parse_private_suffix()?;
        self.expect(Token::Dot)?;
        for name in names {
            net.frees.push(FreeDecl {
                name,
                ty: ty.clone(),
                private,
            });
        }
        Ok(())
    }

    fn parse_const(&mut self, net: &mut Network) -> ParseResult<()> {
        let names = self.parse_name_list()?;
        self.expect(Token::Colon)?;
        let ty = self.expect_ident("type name")?;
        // `[private]` on a const is accepted and ignored: consts are
        // public atoms by definition.
        self.parse_private_suffix()?;
        self.expect(Token::Dot)?;
        for name in names {
            net.consts.push(ConstDecl { name, ty: ty.clone() });
        }
        Ok(())
    }

    fn parse_type_list(&mut self) -> ParseResult<Vec<String>> {
        let mut types = Vec::new();
        if self.peek() != Some(&Token::RParen) {
            types.push(self.expect_ident("type name")?);
            while self.peek() == Some(&Token::Comma) {
                self.advance();
                types.push(self.expect_ident("type name")?);
            }
        }
        Ok(types)
    }

    fn parse_fun(&mut self, net: &mut Network) -> ParseResult<()> {
        let name = self.expect_ident("function name")?;
        self.expect(Token::LParen)?;
        let arg_types = self.parse_type_list()?;
        self.expect(Token::RParen)?;
        self.expect(Token::Colon)?;
        let ret_type = self.expect_ident("type name")?;
        self.expect(Token::Dot)?;
        net.funs.push(FunDecl {
            name,
            arg_types,
            ret_type,
        });
        Ok(())
    }

    fn parse_reduc(&mut self, net: &mut Network) -> ParseResult<()> {
        loop {
            let mut forall = Vec::new();
            if self.at_keyword("forall") {
                self.advance();
                loop {
                    let var = self.expect_ident("variable name")?;
                    self.expect(Token::Colon)?;
                    let ty = self.expect_ident("type name")?;
                    forall.push((var, ty));
                    if self.peek() == Some(&Token::Comma) {
                        self.advance();
                    } else {
                        break;
                    }
                }
                self.expect(Token::Semicolon)?;
            }
            let head = self.parse_term()?;
            self.expect(Token::Equals)?;
            let rhs = self.parse_term()?;
            net.destructors.push(Destructor { forall, head, rhs });
            match self.peek() {
                Some(Token::Comma) | Some(Token::Semicolon) => {
                    self.advance();
                }
                _ => break,
            }
        }
        self.expect(Token::Dot)?;
        Ok(())
    }

    fn parse_table(&mut self, net: &mut Network) -> ParseResult<()> {
        let name = self.expect_ident("table name")?;
        self.expect(Token::LParen)?;
        let col_types = self.parse_type_list()?;
        self.expect(Token::RParen)?;
        self.expect(Token::Dot)?;
        net.tables.push(TableDecl { name, col_types });
        Ok(())
    }

    fn parse_event(&mut self, net: &mut Network) -> ParseResult<()> {
        let name = self.expect_ident("event name")?;
        let mut arg_types = Vec::new();
        if self.peek() == Some(&Token::LParen) {
            self.advance();
            arg_types = self.parse_type_list()?;
            self.expect(Token::RParen)?;
        }
        self.expect(Token::Dot)?;
        net.events.push(EventDecl { name, arg_types });
        Ok(())
    }

    fn parse_attacker_query(&mut self) -> ParseResult<Query> {
        self.expect_keyword("attacker")?;
        self.expect(Token::LParen)?;
        let fresh = if self.at_keyword("new") {
            self.advance();
            true
        } else {
            false
        };
        let term = self.parse_term()?;
        self.expect(Token::RParen)?;
        Ok(Query { term, fresh })
    }

    fn parse_macro(&mut self, net: &mut Network) -> ParseResult<()> {
        let name = self.expect_ident("macro name")?;
        self.expect(Token::LParen)?;
        let mut params = Vec::new();
        if self.peek() != Some(&Token::RParen) {
            loop {
                let pname = self.expect_ident("parameter name")?;
                self.expect(Token::Colon)?;
                let pty = self.expect_ident("type name")?;
                params.push((pname, pty));
                if self.peek() == Some(&Token::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect(Token::RParen)?;
        self.expect(Token::Equals)?;
        let body = self.parse_process()?;
        self.expect(Token::Dot)?;
        net.macros.push(MacroDecl { name, params, body });
        Ok(())
    }

    // --------------------------------------------------------------------
    // Processes
    // --------------------------------------------------------------------

    fn parse_process(&mut self) -> ParseResult<Process> {
        let mut parts = vec![self.parse_basic_process()?];
        while self.peek() == Some(&Token::Pipe) {
            self.advance();
            parts.push(self.parse_basic_process()?);
        }
        Ok(if parts.len() == 1 {
            parts.pop().expect("one part")
        } else {
            Process::Parallel(parts)
        })
    }

    fn parse_basic_process(&mut self) -> ParseResult<Process> {
        let span = self.here();
        match self.peek().cloned() {
            Some(Token::Bang) => {
                self.advance();
                Ok(Process::Replicate(Box::new(self.parse_basic_process()?)))
            }
            Some(Token::LParen) => {
                self.advance();
                let inner = self.parse_process()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(word)) => match word.as_str() {
                "0" => {
                    self.advance();
                    Ok(Process::Nil)
                }
                "new" => {
                    self.advance();
                    let name = self.expect_ident("binder name")?;
                    self.expect(Token::Colon)?;
                    let ty = self.expect_ident("type name")?;
                    let next = self.parse_continuation()?;
                    Ok(Process::New {
                        name,
                        ty,
                        next: Box::new(next),
                    })
                }
                "in" => {
                    self.advance();
                    self.expect(Token::LParen)?;
                    let channel = self.parse_term()?;
                    self.expect(Token::Comma)?;
                    let pattern = self.parse_pattern()?;
                    self.expect(Token::RParen)?;
                    let next = self.parse_continuation()?;
                    Ok(Process::In {
                        channel,
                        pattern,
                        next: Box::new(next),
                    })
                }
                "out" => {
                    self.advance();
                    self.expect(Token::LParen)?;
                    let channel = self.parse_term()?;
                    self.expect(Token::Comma)?;
                    let message = self.parse_term()?;
                    self.expect(Token::RParen)?;
                    let next = self.parse_continuation()?;
                    Ok(Process::Out {
                        channel,
                        message,
                        next: Box::new(next),
                    })
                }
                "if" => {
                    self.advance();
                    let condition = self.parse_comparison()?;
                    self.expect_keyword("then")?;
                    let then_branch = self.parse_basic_process()?;
                    let else_branch = if self.at_keyword("else") {
                        self.advance();
                        self.parse_basic_process()?
                    } else {
                        Process::Nil
                    };
                    Ok(Process::If {
                        condition,
                        then_branch: Box::new(then_branch),
                        else_branch: Box::new(else_branch),
                    })
                }
                "let" => {
                    self.advance();
                    let pattern = self.parse_pattern()?;
                    self.expect(Token::Equals)?;
                    let value = self.parse_term()?;
                    self.expect_keyword("in")?;
                    let then_branch = self.parse_basic_process()?;
                    let else_branch = if self.at_keyword("else") {
                        self.advance();
                        self.parse_basic_process()?
                    } else {
                        Process::Nil
                    };
                    Ok(Process::Let {
                        pattern,
                        value,
                        then_branch: Box::new(then_branch),
                        else_branch: Box::new(else_branch),
                    })
                }
                _ => {
                    let name = self.expect_ident("macro name")?;
                    self.expect(Token::LParen)?;
                    let mut args = Vec::new();
                    if self.peek() != Some(&Token::RParen) {
                        args.push(self.parse_term()?);
                        while self.peek() == Some(&Token::Comma) {
                            self.advance();
                            args.push(self.parse_term()?);
                        }
                    }
                    self.expect(Token::RParen)?;
                    Ok(Process::Call { name, args })
                }
            },
            _ => Err(ParseError::new("expected a process", span)),
        }
    }

    fn parse_continuation(&mut self) -> ParseResult<Process> {
        if self.peek() == Some(&Token::Semicolon) {
            self.advance();
            self.parse_basic_process()
        } else {
            Ok(Process::Nil)
        }
    }

    // --------------------------------------------------------------------
    // Comparisons
    // --------------------------------------------------------------------

    fn parse_comparison(&mut self) -> ParseResult<Comparison> {
        let mut left = self.parse_comparison_conjunction()?;
        while self.peek() == Some(&Token::OrOr) {
            self.advance();
            let right = self.parse_comparison_conjunction()?;
            left = Comparison::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_comparison_conjunction(&mut self) -> ParseResult<Comparison> {
        let mut left = self.parse_comparison_atom()?;
        while self.peek() == Some(&Token::AndAnd) {
            self.advance();
            let right = self.parse_comparison_atom()?;
            left = Comparison::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_comparison_atom(&mut self) -> ParseResult<Comparison> {
        if self.at_keyword("not") {
            self.advance();
            self.expect(Token::LParen)?;
            let inner = self.parse_comparison()?;
            self.expect(Token::RParen)?;
            return Ok(Comparison::Not(Box::new(inner)));
        }
        // `(t1, t2) = u` and `(cmp)` both start with '('; try the term
        // reading first and fall back to a parenthesised comparison.
        let saved = self.pos;
        if let Ok(left) = self.parse_term() {
            match self.peek() {
                Some(Token::Equals) => {
                    self.advance();
                    let right = self.parse_term()?;
                    return Ok(Comparison::Equal(left, right));
                }
                Some(Token::NotEquals) => {
                    self.advance();
                    let right = self.parse_term()?;
                    return Ok(Comparison::NotEqual(left, right));
                }
                _ => {}
            }
        }
        self.pos = saved;
        self.expect(Token::LParen)?;
        let inner = self.parse_comparison()?;
        self.expect(Token::RParen)?;
        Ok(inner)
    }

    // --------------------------------------------------------------------
    // Terms and patterns
    // --------------------------------------------------------------------

    fn parse_term(&mut self) -> ParseResult<Term> {
        let span = self.here();
        match self.advance() {
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    self.advance();
                    let mut args = Vec::new();
                    if self.peek() != Some(&Token::RParen) {
                        args.push(self.parse_term()?);
                        while self.peek() == Some(&Token::Comma) {
                            self.advance();
                            args.push(self.parse_term()?);
                        }
                    }
                    self.expect(Token::RParen)?;
                    Ok(Term::Call { symbol: name, args })
                } else {
                    Ok(Term::Atom(name))
                }
            }
            Some(Token::LParen) => {
                let mut members = vec![self.parse_term()?];
                while self.peek() == Some(&Token::Comma) {
                    self.advance();
                    members.push(self.parse_term()?);
                }
                self.expect(Token::RParen)?;
                Ok(if members.len() == 1 {
                    members.pop().expect("one member")
                } else {
                    Term::Tuple(members)
                })
            }
            _ => Err(ParseError::new("expected a term", span)),
        }
    }

    fn parse_pattern(&mut self) -> ParseResult<Pattern> {
        let span = self.here();
        match self.advance() {
            Some(Token::Ident(name)) => {
                self.expect(Token::Colon)?;
                let ty = self.expect_ident("type name")?;
                Ok(Pattern::Variable { name, ty })
            }
            Some(Token::LParen) => {
                let mut members = vec![self.parse_pattern()?];
                while self.peek() == Some(&Token::Comma) {
                    self.advance();
                    members.push(self.parse_pattern()?);
                }
                self.expect(Token::RParen)?;
                Ok(if members.len() == 1 {
                    members.pop().expect("one member")
                } else {
                    Pattern::Tuple(members)
                })
            }
            _ => Err(ParseError::new("expected a pattern", span)),
        }
    }
}
