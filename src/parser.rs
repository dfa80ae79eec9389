use std::collections::VecDeque;

use crate::{
    ast::{Arg, Block, Expr, Lit},
    error::{Error, ParseError},
    lexer::{tokenize, Token},
    location::{join, Span},
};

// Binding powers of the operators. Left associative operators need higher right
// precedence, right associative operators need higher left precedence.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Precedence {
    Prefix(u8),
    Infix(u8, u8),
}

pub fn prefix_precedence(op: &str) -> Option<Precedence> {
    match op {
        "!" => Some(Precedence::Prefix(7)),
        "-" => Some(Precedence::Prefix(17)),
        _ => None,
    }
}

pub fn infix_precedence(op: &str) -> Option<Precedence> {
    let (left, right) = match op {
        "<-" => (2, 1),
        "|" | "||" => (3, 4),
        "&" | "&&" => (5, 6),
        "==" | "!=" | "<" | ">" | "<=" | ">=" => (9, 10),
        "+" | "-" => (11, 12),
        "*" | "/" => (13, 14),
        ":" => (15, 16),
        "^" => (20, 19),
        _ => return None,
    };

    Some(Precedence::Infix(left, right))
}

type ParseResult<T> = Result<T, Error>;

pub struct Parser {
    tokens: VecDeque<(Token, Span)>,
    // Span used for errors at the end of input
    end: Span,
    // One entry per open bracket, true when newlines end statements inside it
    newline_modes: Vec<bool>,
}

impl Parser {
    pub fn new(source: &str) -> ParseResult<Parser> {
        Ok(Parser {
            tokens: tokenize(source)?.into(),
            end: source.len()..source.len(),
            newline_modes: Vec::new(),
        })
    }

    fn error<T>(&self, error: ParseError, span: Span) -> ParseResult<T> {
        Err(Error::parse(error, span))
    }

    fn expected<T>(&self, what: &str, span: Span) -> ParseResult<T> {
        self.error(ParseError::ExpectedOneOf(vec![String::from(what)]), span)
    }

    fn newlines_significant(&self) -> bool {
        self.newline_modes.last().copied().unwrap_or(true)
    }

    fn skip_insignificant(&mut self) {
        if !self.newlines_significant() {
            self.skip_newlines();
        }
    }

    fn skip_newlines(&mut self) {
        while let Some((Token::Newline, _)) = self.tokens.front() {
            self.tokens.pop_front();
        }
    }

    // Peek current token
    fn peek(&mut self) -> Option<&Token> {
        self.skip_insignificant();
        self.tokens.front().map(|t| &t.0)
    }

    // Span of current token
    fn span(&mut self) -> Span {
        self.skip_insignificant();
        self.tokens.front().map(|t| t.1.clone()).unwrap_or_else(|| self.end.clone())
    }

    // Advance token stream and return popped (token, span)
    fn next_with_span(&mut self) -> ParseResult<(Token, Span)> {
        self.skip_insignificant();
        match self.tokens.pop_front() {
            Some(result) => Ok(result),
            None => self.error(ParseError::ReachedEnd, self.end.clone()),
        }
    }

    // Consume specific token variant
    fn expect(&mut self, expected: Token) -> ParseResult<Span> {
        let (current, span) = self.next_with_span()?;

        if std::mem::discriminant(&current) == std::mem::discriminant(&expected) {
            Ok(span)
        } else {
            self.expected(&expected.to_string(), span)
        }
    }

    // Parse the contents of a bracket pair. `significant` chooses whether newlines
    // separate statements inside it.
    fn bracketed<T>(&mut self, significant: bool, parse: impl FnOnce(&mut Parser) -> ParseResult<T>) -> ParseResult<T> {
        self.newline_modes.push(significant);
        let result = parse(self);
        self.newline_modes.pop();
        result
    }

    fn is_separator(token: Option<&Token>) -> bool {
        matches!(token, Some(Token::Newline) | Some(Token::Semicolon))
    }

    // Parse statements until `closing` (or end of input when closing is None)
    fn parse_statements(&mut self, closing: Option<Token>) -> ParseResult<Vec<Expr>> {
        let mut statements = Vec::new();

        loop {
            while Parser::is_separator(self.tokens.front().map(|t| &t.0)) {
                self.tokens.pop_front();
            }

            match (self.peek().cloned(), &closing) {
                (None, None) => break,
                (None, Some(_)) => return self.error(ParseError::ReachedEnd, self.end.clone()),
                (Some(token), Some(close)) if token == *close => break,
                _ => (),
            }

            statements.push(self.parse_expr()?);

            let span = self.span();
            match self.tokens.front().map(|t| &t.0) {
                None => (),
                Some(token) if Parser::is_separator(Some(token)) => (),
                Some(token) if Some(token) == closing.as_ref() => (),
                Some(_) => return self.expected("newline or ';'", span),
            }
        }

        Ok(statements)
    }

    pub fn parse_expr(&mut self) -> ParseResult<Expr> {
        self.parse_expr_bp(0)
    }

    fn parse_expr_bp(&mut self, min_bp: u8) -> ParseResult<Expr> {
        let start = self.span();
        let mut lhs = match self.peek() {
            Some(Token::Minus) | Some(Token::Bang) => {
                let op = if self.next_with_span()?.0 == Token::Minus { "-" } else { "!" };
                let r_bp = match prefix_precedence(op) {
                    Some(Precedence::Prefix(r_bp)) => r_bp,
                    _ => 0,
                };
                let operand = self.parse_expr_bp(r_bp)?;
                Expr::call(op, vec![operand])
            }
            _ => self.parse_postfix()?,
        };

        loop {
            let op = match self.peek().and_then(Token::binary_operator) {
                Some(op) => op,
                None => break,
            };
            let (l_bp, r_bp) = match infix_precedence(op) {
                Some(Precedence::Infix(l_bp, r_bp)) => (l_bp, r_bp),
                _ => break,
            };

            if l_bp < min_bp {
                break;
            }

            self.next_with_span()?;
            self.skip_newlines();

            let rhs = self.parse_expr_bp(r_bp)?;
            if op == "<-" && !matches!(lhs, Expr::Sym(_)) {
                let end = self.span();
                return self.error(ParseError::InvalidAssignTarget, join(&start, &end));
            }

            lhs = Expr::call(op, vec![lhs, rhs]);
        }

        Ok(lhs)
    }

    // Atom followed by any number of `$name` accesses
    fn parse_postfix(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_atom()?;

        while let Some(Token::Dollar) = self.peek() {
            self.next_with_span()?;
            let field = match self.next_with_span()? {
                (Token::Identifier(name), _) => name,
                (Token::LitString(name), _) => name,
                (_, span) => return self.expected("field name", span),
            };
            expr = Expr::call("$", vec![expr, Expr::Sym(field)]);
        }

        Ok(expr)
    }

    fn parse_atom(&mut self) -> ParseResult<Expr> {
        let (token, span) = self.next_with_span()?;
        match token {
            Token::LitNull => Ok(Expr::Lit(Lit::Null)),
            Token::LitBool(b) => Ok(Expr::Lit(Lit::Bool(b))),
            Token::LitInteger(n) => Ok(Expr::Lit(Lit::Int(n))),
            Token::LitNumber(n) => Ok(Expr::Lit(Lit::Double(n))),
            Token::LitString(s) => Ok(Expr::Lit(Lit::Str(s))),

            Token::Identifier(name) => {
                // A newline between the name and `(` ends the statement where newlines count
                if let Some((Token::LeftParen, _)) = self.tokens.front() {
                    self.next_with_span()?;
                    let args = self.bracketed(false, Parser::parse_args)?;
                    Ok(Expr::Call { fun: name, args })
                } else {
                    Ok(Expr::Sym(name))
                }
            }

            Token::LeftParen => self.bracketed(false, |parser| {
                let expr = parser.parse_expr()?;
                parser.expect(Token::RightParen)?;
                Ok(expr)
            }),

            Token::LeftBrace => self.bracketed(true, |parser| {
                let statements = parser.parse_statements(Some(Token::RightBrace))?;
                parser.expect(Token::RightBrace)?;
                Ok(Expr::Block(Block::from_exprs(statements)))
            }),

            Token::Unquote => {
                self.expect(Token::LeftParen)?;
                self.bracketed(false, |parser| {
                    let inner = parser.parse_expr()?;
                    parser.expect(Token::RightParen)?;
                    Ok(Expr::Unquote(Box::new(inner)))
                })
            }

            Token::KwIf => self.parse_if(),

            _ => self.expected("identifier, literal, '(' or '{'", span),
        }
    }

    fn parse_if(&mut self) -> ParseResult<Expr> {
        self.expect(Token::LeftParen)?;
        let cond = self.bracketed(false, |parser| {
            let cond = parser.parse_expr()?;
            parser.expect(Token::RightParen)?;
            Ok(cond)
        })?;

        let texpr = self.parse_expr()?;
        let mut args = vec![cond, texpr];

        // `else` on the next line only continues the `if` inside brackets
        let else_follows = if self.newline_modes.is_empty() {
            matches!(self.peek(), Some(Token::KwElse))
        } else {
            matches!(
                self.tokens.iter().map(|t| &t.0).find(|token| **token != Token::Newline),
                Some(Token::KwElse)
            )
        };

        if else_follows {
            self.skip_newlines();
            self.expect(Token::KwElse)?;
            args.push(self.parse_expr()?);
        }

        Ok(Expr::call("if", args))
    }

    fn parse_args(&mut self) -> ParseResult<Vec<Arg>> {
        let mut args = Vec::new();

        loop {
            if let Some(Token::RightParen) = self.peek() {
                self.next_with_span()?;
                return Ok(args);
            }

            let named = matches!(
                (self.tokens.front(), self.tokens.get(1)),
                (Some((Token::Identifier(_), _)), Some((Token::Equal, _)))
                    | (Some((Token::LitString(_), _)), Some((Token::Equal, _)))
            );

            if named {
                let name = match self.next_with_span()? {
                    (Token::Identifier(name), _) | (Token::LitString(name), _) => name,
                    (_, span) => return self.expected("argument name", span),
                };
                self.expect(Token::Equal)?;
                args.push(Arg::named(name, self.parse_expr()?));
            } else {
                args.push(Arg::positional(self.parse_expr()?));
            }

            let (token, span) = self.next_with_span()?;
            match token {
                Token::Comma => continue,
                Token::RightParen => return Ok(args),
                _ => return self.error(ParseError::ExpectedOneOf(vec![String::from("','"), String::from("')'")]), span),
            }
        }
    }
}

// Parse every top-level statement of `source`
pub fn parse(source: &str) -> Result<Vec<Expr>, Error> {
    let mut parser = Parser::new(source)?;
    parser.parse_statements(None)
}

// Parse exactly one expression
pub fn parse_expr(source: &str) -> Result<Expr, Error> {
    let mut statements = parse(source)?;
    match statements.len() {
        1 => Ok(statements.remove(0)),
        0 => Err(Error::parse(ParseError::ReachedEnd, source.len()..source.len())),
        _ => Err(Error::parse(ParseError::TrailingInput, 0..source.len())),
    }
}

// Parse `source` as the body of a block. A source that is a single `{}` block is
// that block.
pub fn parse_block(source: &str) -> Result<Expr, Error> {
    let mut statements = parse(source)?;
    if statements.len() == 1 && matches!(statements[0], Expr::Block(_)) {
        return Ok(statements.remove(0));
    }

    Ok(Expr::block(statements))
}
