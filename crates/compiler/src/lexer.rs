//! Hand-written lexer for Ralph source text.

use crate::error::{CompilerError, Result, SourcePos};
use alloy_primitives::{hex, U256};
use std::str::FromStr;

/// Reserved words. `from_str` uses the exact source spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumString, strum::Display)]
pub enum Keyword {
    #[strum(serialize = "let")]
    Let,
    #[strum(serialize = "mut")]
    Mut,
    #[strum(serialize = "return")]
    Return,
    #[strum(serialize = "if")]
    If,
    #[strum(serialize = "else")]
    Else,
    #[strum(serialize = "while")]
    While,
    #[strum(serialize = "for")]
    For,
    #[strum(serialize = "emit")]
    Emit,
    #[strum(serialize = "event")]
    Event,
    #[strum(serialize = "enum")]
    Enum,
    #[strum(serialize = "const")]
    Const,
    #[strum(serialize = "pub")]
    Pub,
    #[strum(serialize = "fn")]
    Fn,
    #[strum(serialize = "extends")]
    Extends,
    #[strum(serialize = "implements")]
    Implements,
    #[strum(serialize = "true")]
    True,
    #[strum(serialize = "false")]
    False,
    #[strum(serialize = "Contract")]
    Contract,
    #[strum(serialize = "Abstract")]
    Abstract,
    #[strum(serialize = "Interface")]
    Interface,
    #[strum(serialize = "TxScript")]
    TxScript,
    #[strum(serialize = "AssetScript")]
    AssetScript,
    #[strum(serialize = "ALPH")]
    Alph,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tok {
    Ident(String),
    Kw(Keyword),
    /// Integer literal; `suffix` is `u`, `i`, or absent.
    Int { value: U256, suffix: Option<char> },
    /// `#…` hex byte string.
    Bytes(Vec<u8>),
    /// `@…` base58 address payload.
    Address(Vec<u8>),
    /// `` `…` `` string, accepted only by `debug!`.
    Str(String),

    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Colon,
    Semi,
    Dot,
    Arrow,
    At,
    Assign,

    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    DoubleStar,
    ModExpOp,
    Shl,
    Shr,
    Amp,
    Pipe,
    Caret,
    PlusPlus,
    AndAnd,
    OrOr,
    Bang,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Tok {
    /// Human-readable form used in "expected X, got Y" messages.
    pub fn describe(&self) -> String {
        match self {
            Self::Ident(name) => format!("\"{name}\""),
            Self::Kw(kw) => format!("\"{kw}\""),
            Self::Int { .. } => "an integer".into(),
            Self::Bytes(_) => "a byte string".into(),
            Self::Address(_) => "an address".into(),
            Self::Str(_) => "a string".into(),
            Self::LParen => "\"(\"".into(),
            Self::RParen => "\")\"".into(),
            Self::LBrace => "\"{\"".into(),
            Self::RBrace => "\"}\"".into(),
            Self::LBracket => "\"[\"".into(),
            Self::RBracket => "\"]\"".into(),
            Self::Comma => "\",\"".into(),
            Self::Colon => "\":\"".into(),
            Self::Semi => "\";\"".into(),
            Self::Dot => "\".\"".into(),
            Self::Arrow => "\"->\"".into(),
            Self::At => "\"@\"".into(),
            Self::Assign => "\"=\"".into(),
            Self::Plus => "\"+\"".into(),
            Self::Minus => "\"-\"".into(),
            Self::Star => "\"*\"".into(),
            Self::Slash => "\"/\"".into(),
            Self::Percent => "\"%\"".into(),
            Self::DoubleStar => "\"**\"".into(),
            Self::ModExpOp => "\"|**|\"".into(),
            Self::Shl => "\"<<\"".into(),
            Self::Shr => "\">>\"".into(),
            Self::Amp => "\"&\"".into(),
            Self::Pipe => "\"|\"".into(),
            Self::Caret => "\"^\"".into(),
            Self::PlusPlus => "\"++\"".into(),
            Self::AndAnd => "\"&&\"".into(),
            Self::OrOr => "\"||\"".into(),
            Self::Bang => "\"!\"".into(),
            Self::EqEq => "\"==\"".into(),
            Self::NotEq => "\"!=\"".into(),
            Self::Lt => "\"<\"".into(),
            Self::Le => "\"<=\"".into(),
            Self::Gt => "\">\"".into(),
            Self::Ge => "\">=\"".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub tok: Tok,
    pub pos: SourcePos,
}

pub struct Lexer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    offset: usize,
    line: u32,
    col: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self { source, bytes: source.as_bytes(), offset: 0, line: 1, col: 1 }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia();
            if self.offset >= self.bytes.len() {
                return Ok(tokens);
            }
            tokens.push(self.next_token()?);
        }
    }

    fn pos(&self) -> SourcePos {
        SourcePos { line: self.line, col: self.col, offset: self.offset }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.offset).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<u8> {
        self.bytes.get(self.offset + ahead).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.offset += 1;
        if b == b'\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(b)
    }

    fn bump_n(&mut self, n: usize) {
        for _ in 0..n {
            self.bump();
        }
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(b) if b.is_ascii_whitespace() => {
                    self.bump();
                }
                Some(b'/') if self.peek_at(1) == Some(b'/') => {
                    while let Some(b) = self.peek() {
                        if b == b'\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                _ => break,
            }
        }
    }

    fn error(&self, message: impl Into<String>, pos: SourcePos) -> CompilerError {
        CompilerError::syntax_at(message, pos, self.source)
    }

    fn next_token(&mut self) -> Result<Token> {
        let pos = self.pos();
        let b = self.peek().expect("skip_trivia leaves a byte");
        let tok = match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'_' => self.ident_or_keyword(),
            b'0'..=b'9' => self.number(pos)?,
            b'#' => self.hex_bytes(pos)?,
            b'@' => self.address_or_at(pos)?,
            b'`' => self.backtick_string(pos)?,
            _ => self.operator(pos)?,
        };
        Ok(Token { tok, pos })
    }

    fn ident_or_keyword(&mut self) -> Tok {
        let start = self.offset;
        while let Some(b) = self.peek() {
            if b.is_ascii_alphanumeric() || b == b'_' {
                self.bump();
            } else {
                break;
            }
        }
        let text = &self.source[start..self.offset];
        match Keyword::from_str(text) {
            Ok(kw) => Tok::Kw(kw),
            Err(_) => Tok::Ident(text.to_string()),
        }
    }

    fn number(&mut self, pos: SourcePos) -> Result<Tok> {
        let start = self.offset;
        while let Some(b) = self.peek() {
            if b.is_ascii_digit() || b == b'_' {
                self.bump();
            } else {
                break;
            }
        }
        let digits: String =
            self.source[start..self.offset].chars().filter(|c| *c != '_').collect();
        let suffix = match self.peek() {
            Some(s @ (b'u' | b'i')) => {
                self.bump();
                Some(s as char)
            }
            _ => None,
        };
        if matches!(self.peek(), Some(b) if b.is_ascii_alphanumeric() || b == b'_') {
            return Err(self.error("Invalid number literal", pos));
        }
        let value = U256::from_str_radix(&digits, 10)
            .map_err(|_| self.error("Integer literal does not fit in 256 bits", pos))?;
        Ok(Tok::Int { value, suffix })
    }

    fn hex_bytes(&mut self, pos: SourcePos) -> Result<Tok> {
        self.bump();
        let start = self.offset;
        while let Some(b) = self.peek() {
            if b.is_ascii_hexdigit() {
                self.bump();
            } else {
                break;
            }
        }
        let text = &self.source[start..self.offset];
        let bytes = hex::decode(text)
            .map_err(|_| self.error(format!("Invalid byte string \"#{text}\""), pos))?;
        Ok(Tok::Bytes(bytes))
    }

    fn address_or_at(&mut self, pos: SourcePos) -> Result<Tok> {
        // Annotation markers (`@using`, `@std`, `@unused`) reuse `@`; an
        // address literal continues with base58 and annotations with a
        // known lowercase word, so try base58 only when the decode sticks.
        self.bump();
        let start = self.offset;
        while let Some(b) = self.peek() {
            if b.is_ascii_alphanumeric() {
                self.bump();
            } else {
                break;
            }
        }
        let text = &self.source[start..self.offset];
        if matches!(text, "using" | "std" | "unused") {
            self.offset = start;
            self.col -= text.len() as u32;
            return Ok(Tok::At);
        }
        if text.is_empty() {
            return Err(self.error("Expected an address after \"@\"", pos));
        }
        let bytes = bs58::decode(text)
            .into_vec()
            .map_err(|_| self.error(format!("Invalid address \"@{text}\""), pos))?;
        Ok(Tok::Address(bytes))
    }

    fn backtick_string(&mut self, pos: SourcePos) -> Result<Tok> {
        self.bump();
        let start = self.offset;
        loop {
            match self.peek() {
                Some(b'`') => {
                    let text = self.source[start..self.offset].to_string();
                    self.bump();
                    return Ok(Tok::Str(text));
                }
                Some(_) => {
                    self.bump();
                }
                None => return Err(self.error("Unterminated string", pos)),
            }
        }
    }

    fn operator(&mut self, pos: SourcePos) -> Result<Tok> {
        let rest = &self.bytes[self.offset..];
        let (tok, len) = match rest {
            [b'|', b'*', b'*', b'|', ..] => (Tok::ModExpOp, 4),
            [b'|', b'|', ..] => (Tok::OrOr, 2),
            [b'&', b'&', ..] => (Tok::AndAnd, 2),
            [b'*', b'*', ..] => (Tok::DoubleStar, 2),
            [b'+', b'+', ..] => (Tok::PlusPlus, 2),
            [b'-', b'>', ..] => (Tok::Arrow, 2),
            [b'<', b'<', ..] => (Tok::Shl, 2),
            [b'>', b'>', ..] => (Tok::Shr, 2),
            [b'<', b'=', ..] => (Tok::Le, 2),
            [b'>', b'=', ..] => (Tok::Ge, 2),
            [b'=', b'=', ..] => (Tok::EqEq, 2),
            [b'!', b'=', ..] => (Tok::NotEq, 2),
            [b'(', ..] => (Tok::LParen, 1),
            [b')', ..] => (Tok::RParen, 1),
            [b'{', ..] => (Tok::LBrace, 1),
            [b'}', ..] => (Tok::RBrace, 1),
            [b'[', ..] => (Tok::LBracket, 1),
            [b']', ..] => (Tok::RBracket, 1),
            [b',', ..] => (Tok::Comma, 1),
            [b':', ..] => (Tok::Colon, 1),
            [b';', ..] => (Tok::Semi, 1),
            [b'.', ..] => (Tok::Dot, 1),
            [b'=', ..] => (Tok::Assign, 1),
            [b'+', ..] => (Tok::Plus, 1),
            [b'-', ..] => (Tok::Minus, 1),
            [b'*', ..] => (Tok::Star, 1),
            [b'/', ..] => (Tok::Slash, 1),
            [b'%', ..] => (Tok::Percent, 1),
            [b'&', ..] => (Tok::Amp, 1),
            [b'|', ..] => (Tok::Pipe, 1),
            [b'^', ..] => (Tok::Caret, 1),
            [b'!', ..] => (Tok::Bang, 1),
            [b'<', ..] => (Tok::Lt, 1),
            [b'>', ..] => (Tok::Gt, 1),
            [b, ..] => {
                return Err(self.error(format!("Unexpected character {:?}", *b as char), pos));
            }
            [] => unreachable!("next_token checked for input"),
        };
        self.bump_n(len);
        Ok(tok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> Vec<Tok> {
        Lexer::new(source).tokenize().unwrap().into_iter().map(|t| t.tok).collect()
    }

    #[test]
    fn numbers_with_separators_and_suffixes() {
        assert_eq!(
            lex("1_000_000 5u 3i"),
            vec![
                Tok::Int { value: U256::from(1_000_000u64), suffix: None },
                Tok::Int { value: U256::from(5u64), suffix: Some('u') },
                Tok::Int { value: U256::from(3u64), suffix: Some('i') },
            ]
        );
    }

    #[test]
    fn annotations_are_not_addresses() {
        assert_eq!(
            lex("@using(updateFields = true)"),
            vec![
                Tok::At,
                Tok::Ident("using".into()),
                Tok::LParen,
                Tok::Ident("updateFields".into()),
                Tok::Assign,
                Tok::Kw(Keyword::True),
                Tok::RParen,
            ]
        );
    }

    #[test]
    fn address_literal_decodes_base58() {
        let toks = lex("@1DrDyTr9RpRsQnDnXo2YRiPzPW4ooHX5LLoqXrqfMrpQH");
        assert!(matches!(&toks[0], Tok::Address(bytes) if !bytes.is_empty()));
    }

    #[test]
    fn modexp_operator_wins_over_pipe() {
        assert_eq!(lex("a |**| b"), vec![
            Tok::Ident("a".into()),
            Tok::ModExpOp,
            Tok::Ident("b".into()),
        ]);
        assert_eq!(lex("a | b || c"), vec![
            Tok::Ident("a".into()),
            Tok::Pipe,
            Tok::Ident("b".into()),
            Tok::OrOr,
            Tok::Ident("c".into()),
        ]);
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(lex("a // comment\nb"), vec![Tok::Ident("a".into()), Tok::Ident("b".into())]);
    }

    #[test]
    fn hex_byte_strings() {
        assert_eq!(lex("#00ff"), vec![Tok::Bytes(vec![0x00, 0xff])]);
        assert!(Lexer::new("#0f0").tokenize().is_err());
    }
}
