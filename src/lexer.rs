//! Source -> token stream, with single-token peek and re-entrant state so
//! `#include` can suspend an outer file and lex a nested one.

use crate::error::{InterpError, Location};
use crate::str_slice::{SourceArena, SourceSlice};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TypeKeyword {
    Void,
    Int,
    Char,
    Float,
    Double,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Token {
    Eof,
    Identifier,
    IntegerConstant,
    FpConstant,
    StringConstant,
    CharacterConstant,
    Type(TypeKeyword),

    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    Comma,
    Semicolon,
    Colon,
    Dot,
    Arrow,

    Assign,
    Plus,
    Minus,
    Asterisk,
    Slash,
    Percent,
    PlusAssign,
    MinusAssign,
    AsteriskAssign,
    SlashAssign,
    PercentAssign,

    Ampersand,
    Pipe,
    Caret,
    Tilde,
    AmpersandAssign,
    PipeAssign,
    CaretAssign,

    Increment,
    Decrement,

    Equal,
    NotEqual,
    LessThan,
    GreaterThan,
    LessEqual,
    GreaterEqual,

    LogicalAnd,
    LogicalOr,
    LogicalNot,

    Do,
    Else,
    For,
    If,
    While,
    Break,
    Switch,
    Case,
    Default,
    Return,

    HashDefine,
    HashInclude,
    /// Only emitted while scanning a preprocessor directive line.
    EndOfLine,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TokenPayload {
    None,
    Ident(SourceSlice),
    Int(i64),
    Float(f64),
    /// Raw (still-escaped) span between the string's quotes. Unescaping
    /// into the heap happens when a `Value` is built from it, per the
    /// resolved Open Question about mutating `const` source text.
    Str(SourceSlice),
    Char(u8),
}

/// `(line, cursor, end, filename)`, plus a sentinel used at intrinsic call
/// sites: when `sentinel` is set the lexer always reports EOF without
/// touching the source buffer, mirroring the original's `End == NULL`
/// marker state.
#[derive(Clone, Copy, Debug)]
pub struct LexState {
    pub source: u32,
    pub pos: u32,
    pub end: u32,
    pub line: u32,
    pub sentinel: bool,
    in_directive: bool,
}

impl LexState {
    pub fn new(source: u32, start: u32, end: u32, line: u32) -> Self {
        LexState { source, pos: start, end, line, sentinel: false, in_directive: false }
    }

    /// The "intrinsic call site" sentinel: forces immediate EOF.
    pub fn intrinsic_sentinel(line: u32) -> Self {
        LexState { source: 0, pos: 0, end: 0, line, sentinel: true, in_directive: false }
    }

    pub fn filename<'a>(&self, arena: &'a SourceArena) -> &'a str {
        if self.sentinel {
            "<intrinsic>"
        } else {
            arena.filename(self.source)
        }
    }

    pub fn loc(&self, arena: &SourceArena) -> Location {
        Location { file: self.filename(arena).to_string(), line: self.line }
    }

    fn err(&self, arena: &SourceArena, msg: impl Into<String>) -> InterpError {
        InterpError::lexical(self.loc(arena), msg)
    }

    fn peek_byte(&self, arena: &SourceArena) -> Option<u8> {
        if self.sentinel || self.pos >= self.end {
            return None;
        }
        Some(arena.text(self.source)[self.pos as usize])
    }

    fn peek_byte_at(&self, arena: &SourceArena, offset: u32) -> Option<u8> {
        let p = self.pos + offset;
        if self.sentinel || p >= self.end {
            return None;
        }
        Some(arena.text(self.source)[p as usize])
    }

    fn advance(&mut self) -> u8 {
        // caller has already checked peek_byte is Some
        self.pos += 1;
        0
    }

    fn bump(&mut self, arena: &SourceArena) -> Option<u8> {
        let b = self.peek_byte(arena)?;
        self.advance();
        if b == b'\n' {
            self.line += 1;
        }
        Some(b)
    }

    fn skip_whitespace_and_comments(&mut self, arena: &SourceArena) -> Result<(), InterpError> {
        loop {
            match self.peek_byte(arena) {
                Some(b' ') | Some(b'\t') | Some(b'\r') => {
                    self.bump(arena);
                }
                Some(b'\n') => {
                    if self.in_directive {
                        return Ok(());
                    }
                    self.bump(arena);
                }
                Some(b'/') if self.peek_byte_at(arena, 1) == Some(b'/') => {
                    while !matches!(self.peek_byte(arena), None | Some(b'\n')) {
                        self.bump(arena);
                    }
                }
                Some(b'/') if self.peek_byte_at(arena, 1) == Some(b'*') => {
                    self.bump(arena);
                    self.bump(arena);
                    loop {
                        match self.peek_byte(arena) {
                            None => return Err(self.err(arena, "unterminated comment")),
                            Some(b'*') if self.peek_byte_at(arena, 1) == Some(b'/') => {
                                self.bump(arena);
                                self.bump(arena);
                                break;
                            }
                            Some(_) => {
                                self.bump(arena);
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn is_ident_start(b: u8) -> bool {
        b.is_ascii_alphabetic() || b == b'_'
    }
    fn is_ident_cont(b: u8) -> bool {
        b.is_ascii_alphanumeric() || b == b'_'
    }

    fn lex_escape(&mut self, arena: &SourceArena) -> Result<u8, InterpError> {
        let c = self.bump(arena).ok_or_else(|| self.err(arena, "unterminated escape"))?;
        Ok(match c {
            b'n' => b'\n',
            b'r' => b'\r',
            b't' => b'\t',
            b'\\' => b'\\',
            b'\'' => b'\'',
            b'"' => b'"',
            b'0' => 0,
            other => return Err(self.err(arena, format!("unknown escape '\\{}'", other as char))),
        })
    }

    /// Advances past whitespace/comments, classifies the next lexeme, and
    /// returns its token plus any payload.
    pub fn get_token(&mut self, arena: &SourceArena) -> Result<(Token, TokenPayload), InterpError> {
        let result = self.get_token_inner(arena);
        #[cfg(feature = "trace-lexer")]
        if let Ok((tok, _)) = &result {
            tracing::trace!(?tok, line = self.line, pos = self.pos, "lexer fetched token");
        }
        result
    }

    fn get_token_inner(&mut self, arena: &SourceArena) -> Result<(Token, TokenPayload), InterpError> {
        if self.sentinel {
            return Ok((Token::Eof, TokenPayload::None));
        }
        self.skip_whitespace_and_comments(arena)?;

        let Some(b) = self.peek_byte(arena) else {
            return Ok((Token::Eof, TokenPayload::None));
        };

        if b == b'\n' {
            debug_assert!(self.in_directive);
            self.bump(arena);
            self.in_directive = false;
            return Ok((Token::EndOfLine, TokenPayload::None));
        }

        if Self::is_ident_start(b) {
            let start = self.pos;
            while self.peek_byte(arena).is_some_and(Self::is_ident_cont) {
                self.bump(arena);
            }
            let slice = SourceSlice { source: self.source, start, len: self.pos - start };
            let word = slice.bytes(arena);
            let tok = match word {
                b"void" => Token::Type(TypeKeyword::Void),
                b"int" => Token::Type(TypeKeyword::Int),
                b"char" => Token::Type(TypeKeyword::Char),
                b"float" => Token::Type(TypeKeyword::Float),
                b"double" => Token::Type(TypeKeyword::Double),
                b"do" => Token::Do,
                b"else" => Token::Else,
                b"for" => Token::For,
                b"if" => Token::If,
                b"while" => Token::While,
                b"break" => Token::Break,
                b"switch" => Token::Switch,
                b"case" => Token::Case,
                b"default" => Token::Default,
                b"return" => Token::Return,
                _ => return Ok((Token::Identifier, TokenPayload::Ident(slice))),
            };
            return Ok((tok, TokenPayload::None));
        }

        if b.is_ascii_digit() {
            let start = self.pos;
            while self.peek_byte(arena).is_some_and(|c| c.is_ascii_digit()) {
                self.bump(arena);
            }
            let mut is_float = false;
            if self.peek_byte(arena) == Some(b'.') {
                is_float = true;
                self.bump(arena);
                while self.peek_byte(arena).is_some_and(|c| c.is_ascii_digit()) {
                    self.bump(arena);
                }
                if matches!(self.peek_byte(arena), Some(b'e') | Some(b'E')) {
                    self.bump(arena);
                    if matches!(self.peek_byte(arena), Some(b'+') | Some(b'-')) {
                        self.bump(arena);
                    }
                    while self.peek_byte(arena).is_some_and(|c| c.is_ascii_digit()) {
                        self.bump(arena);
                    }
                }
            }
            let slice = SourceSlice { source: self.source, start, len: self.pos - start };
            let text = std::str::from_utf8(slice.bytes(arena)).unwrap();
            if is_float {
                let v: f64 = text
                    .parse()
                    .map_err(|_| self.err(arena, format!("malformed floating constant '{text}'")))?;
                return Ok((Token::FpConstant, TokenPayload::Float(v)));
            }
            let v: i64 = text
                .parse()
                .map_err(|_| self.err(arena, format!("numeric overflow in constant '{text}'")))?;
            if v > i32::MAX as i64 {
                return Err(self.err(arena, format!("integer constant '{text}' overflows int")));
            }
            return Ok((Token::IntegerConstant, TokenPayload::Int(v)));
        }

        if b == b'"' {
            self.bump(arena);
            let start = self.pos;
            loop {
                match self.peek_byte(arena) {
                    None => return Err(self.err(arena, "unterminated string constant")),
                    Some(b'"') => break,
                    Some(b'\\') => {
                        self.bump(arena);
                        self.lex_escape(arena)?;
                    }
                    Some(_) => {
                        self.bump(arena);
                    }
                }
            }
            let slice = SourceSlice { source: self.source, start, len: self.pos - start };
            self.bump(arena); // closing quote
            return Ok((Token::StringConstant, TokenPayload::Str(slice)));
        }

        if b == b'\'' {
            self.bump(arena);
            let c = match self.peek_byte(arena) {
                None => return Err(self.err(arena, "unterminated character constant")),
                Some(b'\\') => {
                    self.bump(arena);
                    self.lex_escape(arena)?
                }
                Some(c) => {
                    self.bump(arena);
                    c
                }
            };
            if self.peek_byte(arena) != Some(b'\'') {
                return Err(self.err(arena, "unterminated character constant"));
            }
            self.bump(arena);
            return Ok((Token::CharacterConstant, TokenPayload::Char(c)));
        }

        // preprocessor directives: only meaningful at the start of a line,
        // but the lexer recognizes `#define`/`#include` anywhere a `#`
        // leads, as the original does.
        if b == b'#' {
            self.bump(arena);
            let start = self.pos;
            while self.peek_byte(arena).is_some_and(Self::is_ident_cont) {
                self.bump(arena);
            }
            let slice = SourceSlice { source: self.source, start, len: self.pos - start };
            let word = slice.bytes(arena);
            self.in_directive = true;
            return match word {
                b"define" => Ok((Token::HashDefine, TokenPayload::None)),
                b"include" => Ok((Token::HashInclude, TokenPayload::None)),
                other => {
                    self.in_directive = false;
                    Err(self.err(
                        arena,
                        format!("unsupported preprocessor directive '#{}'", String::from_utf8_lossy(other)),
                    ))
                }
            };
        }

        macro_rules! two {
            ($second:expr, $two_tok:expr, $one_tok:expr) => {{
                self.bump(arena);
                if self.peek_byte(arena) == Some($second) {
                    self.bump(arena);
                    return Ok(($two_tok, TokenPayload::None));
                }
                return Ok(($one_tok, TokenPayload::None));
            }};
        }

        match b {
            b'(' => {
                self.bump(arena);
                Ok((Token::LeftParen, TokenPayload::None))
            }
            b')' => {
                self.bump(arena);
                Ok((Token::RightParen, TokenPayload::None))
            }
            b'{' => {
                self.bump(arena);
                Ok((Token::LeftBrace, TokenPayload::None))
            }
            b'}' => {
                self.bump(arena);
                Ok((Token::RightBrace, TokenPayload::None))
            }
            b'[' => {
                self.bump(arena);
                Ok((Token::LeftBracket, TokenPayload::None))
            }
            b']' => {
                self.bump(arena);
                Ok((Token::RightBracket, TokenPayload::None))
            }
            b',' => {
                self.bump(arena);
                Ok((Token::Comma, TokenPayload::None))
            }
            b';' => {
                self.bump(arena);
                Ok((Token::Semicolon, TokenPayload::None))
            }
            b':' => {
                self.bump(arena);
                Ok((Token::Colon, TokenPayload::None))
            }
            b'.' => {
                self.bump(arena);
                Ok((Token::Dot, TokenPayload::None))
            }
            b'~' => {
                self.bump(arena);
                Ok((Token::Tilde, TokenPayload::None))
            }
            b'!' => two!(b'=', Token::NotEqual, Token::LogicalNot),
            b'=' => two!(b'=', Token::Equal, Token::Assign),
            b'+' => {
                self.bump(arena);
                match self.peek_byte(arena) {
                    Some(b'+') => {
                        self.bump(arena);
                        Ok((Token::Increment, TokenPayload::None))
                    }
                    Some(b'=') => {
                        self.bump(arena);
                        Ok((Token::PlusAssign, TokenPayload::None))
                    }
                    _ => Ok((Token::Plus, TokenPayload::None)),
                }
            }
            b'-' => {
                self.bump(arena);
                match self.peek_byte(arena) {
                    Some(b'-') => {
                        self.bump(arena);
                        Ok((Token::Decrement, TokenPayload::None))
                    }
                    Some(b'=') => {
                        self.bump(arena);
                        Ok((Token::MinusAssign, TokenPayload::None))
                    }
                    Some(b'>') => {
                        self.bump(arena);
                        Ok((Token::Arrow, TokenPayload::None))
                    }
                    _ => Ok((Token::Minus, TokenPayload::None)),
                }
            }
            b'*' => two!(b'=', Token::AsteriskAssign, Token::Asterisk),
            b'/' => two!(b'=', Token::SlashAssign, Token::Slash),
            b'%' => two!(b'=', Token::PercentAssign, Token::Percent),
            b'&' => {
                self.bump(arena);
                match self.peek_byte(arena) {
                    Some(b'&') => {
                        self.bump(arena);
                        Ok((Token::LogicalAnd, TokenPayload::None))
                    }
                    Some(b'=') => {
                        self.bump(arena);
                        Ok((Token::AmpersandAssign, TokenPayload::None))
                    }
                    _ => Ok((Token::Ampersand, TokenPayload::None)),
                }
            }
            b'|' => {
                self.bump(arena);
                match self.peek_byte(arena) {
                    Some(b'|') => {
                        self.bump(arena);
                        Ok((Token::LogicalOr, TokenPayload::None))
                    }
                    Some(b'=') => {
                        self.bump(arena);
                        Ok((Token::PipeAssign, TokenPayload::None))
                    }
                    _ => Ok((Token::Pipe, TokenPayload::None)),
                }
            }
            b'^' => two!(b'=', Token::CaretAssign, Token::Caret),
            b'<' => two!(b'=', Token::LessEqual, Token::LessThan),
            b'>' => two!(b'=', Token::GreaterEqual, Token::GreaterThan),
            other => Err(self.err(arena, format!("stray character '{}'", other as char))),
        }
    }

    /// Identical to `get_token` but discards any payload.
    pub fn get_plain_token(&mut self, arena: &SourceArena) -> Result<Token, InterpError> {
        self.get_token(arena).map(|(t, _)| t)
    }

    /// Looks at the next token without advancing.
    pub fn peek_token(&mut self, arena: &SourceArena) -> Result<(Token, TokenPayload), InterpError> {
        let saved = *self;
        let result = self.get_token(arena);
        *self = saved;
        result
    }

    pub fn peek_plain_token(&mut self, arena: &SourceArena) -> Result<Token, InterpError> {
        self.peek_token(arena).map(|(t, _)| t)
    }

    /// Used only for `#include <...>`: scans a bare angle-bracketed path,
    /// reusing `<`/`>` as brackets rather than comparison operators.
    pub fn lex_include_path(&mut self, arena: &SourceArena) -> Result<SourceSlice, InterpError> {
        self.skip_whitespace_and_comments(arena)?;
        match self.peek_byte(arena) {
            Some(b'"') => {
                let (tok, payload) = self.get_token(arena)?;
                debug_assert_eq!(tok, Token::StringConstant);
                match payload {
                    TokenPayload::Str(s) => Ok(s),
                    _ => unreachable!(),
                }
            }
            Some(b'<') => {
                self.bump(arena);
                let start = self.pos;
                while !matches!(self.peek_byte(arena), None | Some(b'>')) {
                    self.bump(arena);
                }
                if self.peek_byte(arena) != Some(b'>') {
                    return Err(self.err(arena, "unterminated #include <...>"));
                }
                let slice = SourceSlice { source: self.source, start, len: self.pos - start };
                self.bump(arena);
                Ok(slice)
            }
            _ => Err(self.err(arena, "expected \"FILENAME\" or <FILENAME> after #include")),
        }
    }

    /// Skips to (but not past) the next end-of-line token; used after a
    /// directive has been fully parsed but the caller doesn't care about
    /// trailing garbage.
    pub fn skip_to_end_of_line(&mut self, arena: &SourceArena) -> Result<(), InterpError> {
        loop {
            match self.get_token(arena)? {
                (Token::EndOfLine, _) | (Token::Eof, _) => return Ok(()),
                _ => continue,
            }
        }
    }
}

/// Unescapes a raw (still-backslash-escaped) source span into a fresh byte
/// buffer. Resolves the spec's Open Question about mutating `const` source
/// text: we always copy first, per the chosen resolution in `DESIGN.md`.
pub fn unescape(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'\\' && i + 1 < raw.len() {
            let escaped = match raw[i + 1] {
                b'n' => b'\n',
                b'r' => b'\r',
                b't' => b'\t',
                b'\\' => b'\\',
                b'\'' => b'\'',
                b'"' => b'"',
                b'0' => 0,
                other => other,
            };
            out.push(escaped);
            i += 2;
        } else {
            out.push(raw[i]);
            i += 1;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex_all(text: &str) -> Vec<Token> {
        let mut arena = SourceArena::new();
        let id = arena.register("t.c".into(), text.as_bytes().to_vec());
        let len = arena.len(id);
        let mut lex = LexState::new(id, 0, len, 1);
        let mut out = Vec::new();
        loop {
            let (tok, _) = lex.get_token(&arena).unwrap();
            if tok == Token::Eof {
                break;
            }
            out.push(tok);
        }
        out
    }

    #[test]
    fn string_constant_round_trips_escape_free_bytes() {
        let mut arena = SourceArena::new();
        let text = "\"hello world\"";
        let id = arena.register("t.c".into(), text.as_bytes().to_vec());
        let len = arena.len(id);
        let mut lex = LexState::new(id, 0, len, 1);
        let (tok, payload) = lex.get_token(&arena).unwrap();
        assert_eq!(tok, Token::StringConstant);
        match payload {
            TokenPayload::Str(slice) => assert_eq!(slice.bytes(&arena), b"hello world"),
            _ => panic!("expected string payload"),
        }
    }

    #[test]
    fn greedy_operator_disambiguation() {
        let toks = lex_all("a==b<=c&&d++ -= += ->");
        assert_eq!(
            toks,
            vec![
                Token::Identifier,
                Token::Equal,
                Token::Identifier,
                Token::LessEqual,
                Token::Identifier,
                Token::LogicalAnd,
                Token::Identifier,
                Token::Increment,
                Token::MinusAssign,
                Token::PlusAssign,
                Token::Arrow,
            ]
        );
    }

    #[test]
    fn peek_does_not_advance() {
        let mut arena = SourceArena::new();
        let text = "int x;";
        let id = arena.register("t.c".into(), text.as_bytes().to_vec());
        let len = arena.len(id);
        let mut lex = LexState::new(id, 0, len, 1);
        let before = lex.pos;
        let peeked = lex.peek_plain_token(&arena).unwrap();
        assert_eq!(lex.pos, before);
        let got = lex.get_plain_token(&arena).unwrap();
        assert_eq!(peeked, got);
    }

    #[test]
    fn define_enables_end_of_line() {
        let toks = lex_all("#define X 1\nint y;");
        assert_eq!(
            toks,
            vec![
                Token::HashDefine,
                Token::Identifier,
                Token::IntegerConstant,
                Token::EndOfLine,
                Token::Type(TypeKeyword::Int),
                Token::Identifier,
                Token::Semicolon,
            ]
        );
    }
}
