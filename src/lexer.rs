use std::fmt::Display;

use logos::Logos;

use crate::{error::{Error, ParseError}, location::Span};

#[derive(Clone, Debug, PartialEq, Default)]
pub enum LexerError {
    #[default]
    Default,
}

#[derive(Clone, Debug, Logos, PartialEq)]
#[logos(skip r"[ \t\r\f]+")]
#[logos(skip r"#[^\n]*")]
#[logos(error = LexerError)]
pub enum Token {
    #[token("if")]
    KwIf,
    #[token("else")]
    KwElse,

    #[regex(r#""([^"\\]|\\.)*""#, |lex| unquote_string(lex.slice()))]
    #[regex(r#"'([^'\\]|\\.)*'"#, |lex| unquote_string(lex.slice()))]
    LitString(String),
    #[regex(r"[0-9]+L", |lex| lex.slice().trim_end_matches('L').parse::<i64>().ok())]
    LitInteger(i64),
    #[regex(r"[0-9]+(\.[0-9]+)?([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    #[token("Inf", |_| f64::INFINITY)]
    #[token("NaN", |_| f64::NAN)]
    LitNumber(f64),
    #[token("TRUE", |_| true)]
    #[token("FALSE", |_| false)]
    LitBool(bool),
    #[token("NULL")]
    LitNull,

    // `..(expr)` marks a sub-expression for unquoting
    #[token("..")]
    Unquote,

    #[token("(")]
    LeftParen,
    #[token(")")]
    RightParen,
    #[token("{")]
    LeftBrace,
    #[token("}")]
    RightBrace,
    #[token(",")]
    Comma,
    #[token(";")]
    Semicolon,
    #[token("=")]
    Equal,
    #[token("$")]
    Dollar,

    #[token("<-")]
    Assign,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("^")]
    Caret,
    #[token(":")]
    Colon,
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<")]
    Less,
    #[token(">")]
    Greater,
    #[token("<=")]
    LessEq,
    #[token(">=")]
    GreaterEq,
    #[token("!")]
    Bang,
    #[token("&")]
    And,
    #[token("&&")]
    AndAnd,
    #[token("|")]
    Or,
    #[token("||")]
    OrOr,

    // Identifiers may contain dots (`as.Date`) but cannot start with one, which keeps
    // `..` free for unquoting. Backticks name operators as functions: `-`(a, b, c)
    #[regex(r"[A-Za-z_][A-Za-z0-9._]*", priority = 1, callback = |lex| lex.slice().to_owned())]
    #[regex(r"`[^`\n]+`", |lex| lex.slice().trim_matches('`').to_owned())]
    Identifier(String),

    #[token("\n")]
    Newline,
}

fn unquote_string(slice: &str) -> Option<String> {
    unescape::unescape(&slice[1..slice.len() - 1])
}

impl Token {
    // Operator name for tokens that can appear between two operands
    pub fn binary_operator(&self) -> Option<&'static str> {
        match self {
            Token::Assign => Some("<-"),
            Token::Plus => Some("+"),
            Token::Minus => Some("-"),
            Token::Star => Some("*"),
            Token::Slash => Some("/"),
            Token::Caret => Some("^"),
            Token::Colon => Some(":"),
            Token::EqEq => Some("=="),
            Token::NotEq => Some("!="),
            Token::Less => Some("<"),
            Token::Greater => Some(">"),
            Token::LessEq => Some("<="),
            Token::GreaterEq => Some(">="),
            Token::And => Some("&"),
            Token::AndAnd => Some("&&"),
            Token::Or => Some("|"),
            Token::OrOr => Some("||"),
            _ => None,
        }
    }
}

pub fn tokenize(source: &str) -> Result<Vec<(Token, Span)>, Error> {
    let mut tokens = Vec::new();

    for (lex, span) in Token::lexer(source).spanned() {
        match lex {
            Ok(token) => tokens.push((token, span)),
            Err(LexerError::Default) => return Err(Error::parse(ParseError::UnknownToken, span)),
        }
    }

    Ok(tokens)
}

impl Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::KwIf => write!(f, "'if'"),
            Token::KwElse => write!(f, "'else'"),
            Token::LitString(_) => write!(f, "string literal"),
            Token::LitInteger(_) => write!(f, "integer literal"),
            Token::LitNumber(_) => write!(f, "number literal"),
            Token::LitBool(_) => write!(f, "logical literal"),
            Token::LitNull => write!(f, "'NULL'"),
            Token::Unquote => write!(f, "'..'"),
            Token::LeftParen => write!(f, "'('"),
            Token::RightParen => write!(f, "')'"),
            Token::LeftBrace => write!(f, "'{{'"),
            Token::RightBrace => write!(f, "'}}'"),
            Token::Comma => write!(f, "','"),
            Token::Semicolon => write!(f, "';'"),
            Token::Equal => write!(f, "'='"),
            Token::Dollar => write!(f, "'$'"),
            Token::Identifier(_) => write!(f, "identifier"),
            Token::Newline => write!(f, "newline"),
            other => match other.binary_operator() {
                Some(op) => write!(f, "'{}'", op),
                None => write!(f, "'!'"),
            },
        }
    }
}
