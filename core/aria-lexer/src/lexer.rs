//! Byte stream to token stream.

use rustc_hash::FxHashSet;

use aria_bigint::BigInt;
use aria_diagnostics::{DiagnosticEngine, Msg};
use aria_span::{Span, Srcfile, SrcfileId};

use crate::token::{Keyword, Punct, Token, TokenKind};

/// Lexes `file`'s contents into a token vector ending in an EOF token whose
/// span points one past the last byte. Any lexical error sets the engine's
/// error flag but lexing always continues to EOF, to maximize diagnostics
/// collected in one pass.
pub fn lex(file: &Srcfile, file_id: SrcfileId, diags: &mut DiagnosticEngine) -> Vec<Token> {
    Lexer::new(file, file_id, diags).run()
}

struct Lexer<'a> {
    bytes: &'a [u8],
    file_id: SrcfileId,
    pos: u32,
    diags: &'a mut DiagnosticEngine,
    reported_unknown_bytes: FxHashSet<u8>,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn new(file: &'a Srcfile, file_id: SrcfileId, diags: &'a mut DiagnosticEngine) -> Self {
        Self {
            bytes: file.bytes(),
            file_id,
            pos: 0,
            diags,
            reported_unknown_bytes: FxHashSet::default(),
            tokens: Vec::new(),
        }
    }

    fn run(mut self) -> Vec<Token> {
        loop {
            self.skip_trivia();
            let start = self.pos;
            let Some(b) = self.peek(0) else {
                let span = Span::point(self.file_id, self.pos);
                self.tokens.push(Token::new(TokenKind::Eof, span));
                break;
            };
            match b {
                b'A'..=b'Z' | b'a'..=b'z' | b'_' => self.lex_identifier(start),
                b'0'..=b'9' => self.lex_integer(start),
                b'"' => self.lex_string(start),
                b'\'' => self.lex_char(start),
                b'\t' => self.lex_tab_error(start),
                _ => self.lex_punct_or_unknown(start),
            }
        }
        self.tokens
    }

    fn peek(&self, offset: u32) -> Option<u8> {
        self.bytes.get((self.pos + offset) as usize).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek(0)?;
        self.pos += 1;
        Some(b)
    }

    fn span_from(&self, start: u32) -> Span {
        Span::new(self.file_id, start, self.pos)
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek(0) {
                Some(b' ' | b'\r' | b'\n') => {
                    self.pos += 1;
                }
                Some(b'/') if self.peek(1) == Some(b'/') => {
                    while !matches!(self.peek(0), None | Some(b'\n')) {
                        self.pos += 1;
                    }
                }
                _ => break,
            }
        }
    }

    fn lex_tab_error(&mut self, start: u32) {
        self.pos += 1;
        let span = self.span_from(start);
        self.diags.emit(
            Msg::error("tab characters are not permitted in source files", span)
                .with_thin("use spaces for indentation"),
        );
    }

    fn lex_identifier(&mut self, start: u32) {
        while matches!(self.peek(0), Some(b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_')) {
            self.pos += 1;
        }
        let text = std::str::from_utf8(&self.bytes[start as usize..self.pos as usize])
            .expect("identifier bytes are ASCII")
            .to_string();
        let span = self.span_from(start);
        let kind = match Keyword::classify(&text) {
            Some(kw) => TokenKind::Keyword(kw),
            None => TokenKind::Identifier(text),
        };
        self.tokens.push(Token::new(kind, span));
    }

    /// Decimal digits with `_` as a visual separator: never leading, never
    /// trailing a run. The value is accumulated directly into a `BigInt` as
    /// each digit is seen.
    fn lex_integer(&mut self, start: u32) {
        let mut value = BigInt::zero();
        let mut last_was_digit = true;
        loop {
            match self.peek(0) {
                Some(d @ b'0'..=b'9') => {
                    value.push_decimal_digit(d - b'0');
                    self.pos += 1;
                    last_was_digit = true;
                }
                Some(b'_') if last_was_digit => {
                    self.pos += 1;
                    last_was_digit = false;
                }
                _ => break,
            }
        }
        if !last_was_digit {
            let span = self.span_from(start);
            self.diags.emit(Msg::error(
                "integer literal cannot end with a trailing `_` separator",
                span,
            ));
        }
        if !value.fits_in_register() {
            let span = self.span_from(start);
            self.diags.emit(
                Msg::error("integer literal does not fit in 64 bits", span)
                    .with_thin("comptime integers are range-checked against a 64-bit register"),
            );
        }
        let span = self.span_from(start);
        self.tokens.push(Token::new(TokenKind::Integer(value), span));
    }

    fn lex_string(&mut self, start: u32) {
        self.pos += 1; // opening quote
        let mut bytes = Vec::new();
        loop {
            match self.peek(0) {
                None | Some(b'\n') => {
                    let span = self.span_from(start);
                    self.diags.emit(Msg::error("unterminated string literal", span));
                    break;
                }
                Some(b'"') => {
                    self.pos += 1;
                    break;
                }
                Some(b) => {
                    bytes.push(b);
                    self.pos += 1;
                }
            }
        }
        let span = self.span_from(start);
        self.tokens.push(Token::new(TokenKind::String(bytes), span));
    }

    fn lex_char(&mut self, start: u32) {
        self.pos += 1; // opening quote
        let value = match self.bump() {
            Some(b) => u32::from(b),
            None => 0,
        };
        if self.peek(0) == Some(b'\'') {
            self.pos += 1;
        } else {
            let span = self.span_from(start);
            self.diags.emit(Msg::error("unterminated char literal", span));
        }
        let span = self.span_from(start);
        self.tokens.push(Token::new(TokenKind::Char(value), span));
    }

    fn lex_punct_or_unknown(&mut self, start: u32) {
        let b = self.bump().expect("checked by caller");
        let two = self.peek(0);
        let kind = match (b, two) {
            (b'=', Some(b'=')) => { self.pos += 1; Some(Punct::EqEq) }
            (b'!', Some(b'=')) => { self.pos += 1; Some(Punct::BangEq) }
            (b'<', Some(b'=')) => { self.pos += 1; Some(Punct::Le) }
            (b'>', Some(b'=')) => { self.pos += 1; Some(Punct::Ge) }
            (b'&', Some(b'&')) => { self.pos += 1; Some(Punct::AmpAmp) }
            (b'|', Some(b'|')) => { self.pos += 1; Some(Punct::PipePipe) }
            (b'.', Some(b'*')) => { self.pos += 1; Some(Punct::DotStar) }
            (b'=', _) => Some(Punct::Assign),
            (b'!', _) => Some(Punct::Bang),
            (b'<', _) => Some(Punct::Lt),
            (b'>', _) => Some(Punct::Gt),
            (b'&', _) => Some(Punct::Amp),
            (b'|', _) => Some(Punct::Pipe),
            (b'+', _) => Some(Punct::Plus),
            (b'-', _) => Some(Punct::Minus),
            (b'*', _) => Some(Punct::Star),
            (b'/', _) => Some(Punct::Slash),
            (b'%', _) => Some(Punct::Percent),
            (b'{', _) => Some(Punct::LBrace),
            (b'}', _) => Some(Punct::RBrace),
            (b'[', _) => Some(Punct::LBracket),
            (b']', _) => Some(Punct::RBracket),
            (b'(', _) => Some(Punct::LParen),
            (b')', _) => Some(Punct::RParen),
            (b':', _) => Some(Punct::Colon),
            (b';', _) => Some(Punct::Semicolon),
            (b'.', _) => Some(Punct::Dot),
            (b',', _) => Some(Punct::Comma),
            _ => None,
        };
        let span = self.span_from(start);
        match kind {
            Some(p) => self.tokens.push(Token::new(TokenKind::Punct(p), span)),
            None => {
                if self.reported_unknown_bytes.insert(b) {
                    self.diags.emit(
                        Msg::error(format!("unknown character `{}`", b as char), span).with_thin(
                            "each distinct unrecognized byte is reported only once per file",
                        ),
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aria_span::SrcManager;

    fn lex_str(src: &str) -> (Vec<Token>, DiagnosticEngine) {
        let mut mgr = SrcManager::new();
        let id = mgr.add("t.aria".into(), src.to_string());
        let mut diags = DiagnosticEngine::new();
        let toks = lex(mgr.get(id), id, &mut diags);
        (toks, diags)
    }

    #[test]
    fn keywords_are_classified() {
        let (toks, diags) = lex_str("fn imm mut");
        assert!(!diags.has_errors());
        assert!(matches!(toks[0].kind, TokenKind::Keyword(Keyword::Fn)));
        assert!(matches!(toks[1].kind, TokenKind::Keyword(Keyword::Imm)));
        assert!(matches!(toks[2].kind, TokenKind::Keyword(Keyword::Mut)));
        assert!(toks.last().unwrap().is_eof());
    }

    #[test]
    fn integer_literal_accumulates_bigint() {
        let (toks, diags) = lex_str("1_000_000");
        assert!(!diags.has_errors());
        match &toks[0].kind {
            TokenKind::Integer(v) => assert_eq!(*v, BigInt::parse_decimal("1000000").unwrap()),
            other => panic!("expected integer, got {other:?}"),
        }
    }

    #[test]
    fn trailing_underscore_is_an_error() {
        let (_, diags) = lex_str("1_");
        assert!(diags.has_errors());
    }

    #[test]
    fn longest_match_punctuation() {
        let (toks, _) = lex_str("== != <= >= && || .*");
        let kinds: Vec<_> = toks
            .iter()
            .filter_map(|t| match &t.kind {
                TokenKind::Punct(p) => Some(*p),
                _ => None,
            })
            .collect();
        assert_eq!(
            kinds,
            vec![
                Punct::EqEq,
                Punct::BangEq,
                Punct::Le,
                Punct::Ge,
                Punct::AmpAmp,
                Punct::PipePipe,
                Punct::DotStar,
            ]
        );
    }

    #[test]
    fn unterminated_string_is_reported_once() {
        let (toks, diags) = lex_str("\"abc");
        assert!(diags.has_errors());
        assert!(matches!(toks[0].kind, TokenKind::String(_)));
    }

    #[test]
    fn unknown_byte_reported_once_per_distinct_value() {
        let (_, diags) = lex_str("$ $ $");
        assert_eq!(diags.error_count(), 1);
    }

    #[test]
    fn tab_character_is_rejected() {
        let (_, diags) = lex_str("\tfn");
        assert!(diags.has_errors());
    }

    #[test]
    fn line_comment_runs_to_end_of_line() {
        let (toks, diags) = lex_str("fn // comment\nmut");
        assert!(!diags.has_errors());
        assert!(matches!(toks[0].kind, TokenKind::Keyword(Keyword::Fn)));
        assert!(matches!(toks[1].kind, TokenKind::Keyword(Keyword::Mut)));
    }
}
