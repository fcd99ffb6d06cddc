//! Expression parser.
//!
//! Recursive descent over rewritten formula text. Precedence, loosest first:
//! `?:`, `or`/`||`, `and`/`&&`, comparisons, `+ -`, `* / %`, unary
//! `- + not !`, `^` (right-associative), then calls and primaries.
//! Errors carry the byte offset of the offending input.
//!
//! Every nesting level and every operator appended to a binary chain counts
//! against `MAX_DEPTH`, so the height of the returned tree is bounded and
//! recursive evaluation and drop stay within the stack.

use crate::domain::error::ParseError;
use crate::domain::expr::{BinaryOp, Expr, UnaryOp};

const MAX_DEPTH: usize = 256;

struct Parser<'a> {
    input: &'a str,
    pos: usize,
    depth: usize,
}

fn is_ident_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_'
}

fn is_ident_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            depth: 0,
        }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn error(&self, message: String) -> ParseError {
        ParseError {
            message,
            position: self.pos,
        }
    }

    fn expect_char(&mut self, expected: char) -> Result<(), ParseError> {
        self.skip_whitespace();
        match self.peek() {
            Some(ch) if ch == expected => {
                self.advance();
                Ok(())
            }
            Some(ch) => Err(self.error(format!("expected '{}', found '{}'", expected, ch))),
            None => Err(self.error(format!("expected '{}', found end of input", expected))),
        }
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        let remaining = self.remaining();
        remaining.starts_with(keyword)
            && !remaining[keyword.len()..]
                .chars()
                .next()
                .is_some_and(is_ident_char)
    }

    fn consume_keyword(&mut self, keyword: &str) -> bool {
        if self.peek_keyword(keyword) {
            self.pos += keyword.len();
            true
        } else {
            false
        }
    }

    fn consume_exact(&mut self, s: &str) -> bool {
        if self.remaining().starts_with(s) {
            self.pos += s.len();
            true
        } else {
            false
        }
    }

    fn peek_word(&self) -> String {
        let word: String = self
            .remaining()
            .chars()
            .take_while(|c| is_ident_char(*c))
            .collect();
        if word.is_empty() {
            self.peek()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "end of input".to_string())
        } else {
            word
        }
    }

    fn enter(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(self.error("expression nested too deeply".to_string()));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    /// Release the levels taken by a binary chain and hand back its tree.
    fn close_chain(&mut self, left: Expr, links: usize) -> Result<Expr, ParseError> {
        self.depth -= links;
        Ok(left)
    }

    fn parse_expression(&mut self) -> Result<Expr, ParseError> {
        self.enter()?;
        let expr = self.parse_conditional();
        self.leave();
        expr
    }

    fn parse_conditional(&mut self) -> Result<Expr, ParseError> {
        let condition = self.parse_or()?;
        self.skip_whitespace();
        if self.peek() != Some('?') {
            return Ok(condition);
        }
        self.advance();
        let then = self.parse_expression()?;
        self.expect_char(':')?;
        let otherwise = self.parse_expression()?;
        Ok(Expr::Conditional {
            condition: Box::new(condition),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_and()?;
        let mut links = 0;
        loop {
            self.skip_whitespace();
            if self.consume_exact("||") || self.consume_keyword("or") {
                self.enter()?;
                links += 1;
                let right = self.parse_and()?;
                left = Expr::binary(BinaryOp::Or, left, right);
            } else {
                return self.close_chain(left, links);
            }
        }
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_comparison()?;
        let mut links = 0;
        loop {
            self.skip_whitespace();
            if self.consume_exact("&&") || self.consume_keyword("and") {
                self.enter()?;
                links += 1;
                let right = self.parse_comparison()?;
                left = Expr::binary(BinaryOp::And, left, right);
            } else {
                return self.close_chain(left, links);
            }
        }
    }

    fn comparison_op(&mut self) -> Option<BinaryOp> {
        // Two-character operators first so `<=` is not read as `<`.
        for (text, op) in [
            ("==", BinaryOp::Eq),
            ("!=", BinaryOp::Ne),
            ("<=", BinaryOp::Le),
            (">=", BinaryOp::Ge),
            ("<", BinaryOp::Lt),
            (">", BinaryOp::Gt),
        ] {
            if self.consume_exact(text) {
                return Some(op);
            }
        }
        None
    }

    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_additive()?;
        let mut links = 0;
        loop {
            self.skip_whitespace();
            match self.comparison_op() {
                Some(op) => {
                    self.enter()?;
                    links += 1;
                    let right = self.parse_additive()?;
                    left = Expr::binary(op, left, right);
                }
                None => return self.close_chain(left, links),
            }
        }
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_multiplicative()?;
        let mut links = 0;
        loop {
            self.skip_whitespace();
            let op = match self.peek() {
                Some('+') => BinaryOp::Add,
                Some('-') => BinaryOp::Sub,
                _ => return self.close_chain(left, links),
            };
            self.advance();
            self.enter()?;
            links += 1;
            let right = self.parse_multiplicative()?;
            left = Expr::binary(op, left, right);
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary()?;
        let mut links = 0;
        loop {
            self.skip_whitespace();
            let op = match self.peek() {
                Some('*') => BinaryOp::Mul,
                Some('/') => BinaryOp::Div,
                Some('%') => BinaryOp::Rem,
                _ => return self.close_chain(left, links),
            };
            self.advance();
            self.enter()?;
            links += 1;
            let right = self.parse_unary()?;
            left = Expr::binary(op, left, right);
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        self.enter()?;
        let expr = self.parse_unary_inner();
        self.leave();
        expr
    }

    fn parse_unary_inner(&mut self) -> Result<Expr, ParseError> {
        self.skip_whitespace();
        if self.consume_exact("-") {
            return Ok(Expr::unary(UnaryOp::Neg, self.parse_unary()?));
        }
        if self.consume_exact("+") {
            return Ok(Expr::unary(UnaryOp::Plus, self.parse_unary()?));
        }
        if self.remaining().starts_with('!') && !self.remaining().starts_with("!=") {
            self.advance();
            return Ok(Expr::unary(UnaryOp::Not, self.parse_unary()?));
        }
        if self.consume_keyword("not") {
            return Ok(Expr::unary(UnaryOp::Not, self.parse_unary()?));
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> Result<Expr, ParseError> {
        let base = self.parse_primary()?;
        self.skip_whitespace();
        if self.peek() == Some('^') {
            self.advance();
            let exponent = self.parse_unary()?;
            return Ok(Expr::binary(BinaryOp::Pow, base, exponent));
        }
        Ok(base)
    }

    fn parse_number(&mut self) -> Result<f64, ParseError> {
        let start = self.pos;
        let mut digits = 0;

        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                digits += 1;
                self.advance();
            } else {
                break;
            }
        }
        if self.peek() == Some('.') {
            self.advance();
            while let Some(ch) = self.peek() {
                if ch.is_ascii_digit() {
                    digits += 1;
                    self.advance();
                } else {
                    break;
                }
            }
        }

        if digits == 0 {
            return Err(ParseError {
                message: "expected number".to_string(),
                position: start,
            });
        }

        // Exponent only when digits follow, so `2e` leaves the `e` unread.
        let rest = self.remaining();
        if rest.starts_with(['e', 'E']) {
            let after = &rest[1..];
            let sign_len = usize::from(after.starts_with(['+', '-']));
            if after[sign_len..].starts_with(|c: char| c.is_ascii_digit()) {
                self.pos += 1 + sign_len;
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.advance();
                }
            }
        }

        let num_str = &self.input[start..self.pos];
        num_str.parse::<f64>().map_err(|_| ParseError {
            message: format!("invalid number: {}", num_str),
            position: start,
        })
    }

    fn parse_identifier(&mut self) -> String {
        let start = self.pos;
        while self.peek().is_some_and(is_ident_char) {
            self.advance();
        }
        self.input[start..self.pos].to_string()
    }

    fn parse_call_args(&mut self) -> Result<Vec<Expr>, ParseError> {
        self.expect_char('(')?;
        let mut args = Vec::new();
        self.skip_whitespace();
        if self.peek() == Some(')') {
            self.advance();
            return Ok(args);
        }
        args.push(self.parse_expression()?);
        loop {
            self.skip_whitespace();
            if self.peek() == Some(')') {
                self.advance();
                return Ok(args);
            }
            self.expect_char(',')?;
            args.push(self.parse_expression()?);
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        self.skip_whitespace();

        match self.peek() {
            Some('(') => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect_char(')')?;
                Ok(expr)
            }
            Some(ch) if ch.is_ascii_digit() || ch == '.' => Ok(Expr::Number(self.parse_number()?)),
            Some(ch) if is_ident_start(ch) => {
                let start = self.pos;
                let name = self.parse_identifier();
                match name.as_str() {
                    "and" | "or" | "not" => Err(ParseError {
                        message: format!("expected expression, found '{}'", name),
                        position: start,
                    }),
                    "PI" => Ok(Expr::Number(std::f64::consts::PI)),
                    "E" => Ok(Expr::Number(std::f64::consts::E)),
                    "true" => Ok(Expr::Number(1.0)),
                    "false" => Ok(Expr::Number(0.0)),
                    _ => {
                        self.skip_whitespace();
                        if self.peek() == Some('(') {
                            let args = self.parse_call_args()?;
                            Ok(Expr::Call { name, args })
                        } else {
                            Ok(Expr::Symbol(name))
                        }
                    }
                }
            }
            _ => {
                let word = self.peek_word();
                Err(self.error(format!("expected expression, found '{}'", word)))
            }
        }
    }

    fn parse(&mut self) -> Result<Expr, ParseError> {
        let expr = self.parse_expression()?;
        self.skip_whitespace();
        if self.pos < self.input.len() {
            return Err(self.error(format!(
                "unexpected input after expression: '{}'",
                self.remaining()
            )));
        }
        Ok(expr)
    }
}

pub fn parse(input: &str) -> Result<Expr, ParseError> {
    let mut parser = Parser::new(input);
    parser.parse()
}
