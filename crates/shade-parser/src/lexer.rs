//! Hand-written WGSL lexer.
//!
//! Produces a finite token stream with a source span on every token. A
//! malformed character or literal yields one diagnostic and an
//! [`TokenKind::Error`] token; lexing always continues to end of input.

use shade_diag::{DiagnosticList, Location, SourceFile, Span};

use crate::token::{FloatSuffix, IntSuffix, Keyword, Token, TokenKind};

/// Lexes the whole file. The returned stream always ends with an `Eof`
/// token.
pub fn tokenize(file: &SourceFile) -> (Vec<Token>, DiagnosticList) {
    let mut lexer = Lexer::new(file);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token();
        let is_eof = token.kind == TokenKind::Eof;
        tokens.push(token);
        if is_eof {
            break;
        }
    }
    (tokens, lexer.diagnostics)
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    column: u32,
    diagnostics: DiagnosticList,
}

impl Lexer {
    fn new(file: &SourceFile) -> Self {
        Self {
            chars: file.content().chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            diagnostics: DiagnosticList::new(),
        }
    }

    fn location(&self) -> Location {
        Location::new(self.line, self.column)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn next_token(&mut self) -> Token {
        self.skip_trivia();
        let start = self.location();

        let Some(ch) = self.peek() else {
            return self.token(start, TokenKind::Eof);
        };

        if ch == '_' || ch.is_ascii_alphabetic() {
            return self.ident_or_keyword(start);
        }
        if ch.is_ascii_digit() || (ch == '.' && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()))
        {
            return self.number(start);
        }

        self.advance();
        let kind = match ch {
            '&' => self.select2('&', TokenKind::AmpAmp, '=', TokenKind::AmpEqual, TokenKind::Amp),
            '|' => self.select2('|', TokenKind::PipePipe, '=', TokenKind::PipeEqual, TokenKind::Pipe),
            '^' => self.select1('=', TokenKind::XorEqual, TokenKind::Xor),
            '!' => self.select1('=', TokenKind::NotEqual, TokenKind::Bang),
            '=' => self.select1('=', TokenKind::EqualEqual, TokenKind::Equal),
            '+' => self.select2('+', TokenKind::PlusPlus, '=', TokenKind::PlusEqual, TokenKind::Plus),
            '-' => {
                if self.eat('>') {
                    TokenKind::Arrow
                } else {
                    self.select2('-', TokenKind::MinusMinus, '=', TokenKind::MinusEqual, TokenKind::Minus)
                }
            }
            '*' => self.select1('=', TokenKind::StarEqual, TokenKind::Star),
            '/' => self.select1('=', TokenKind::SlashEqual, TokenKind::Slash),
            '%' => self.select1('=', TokenKind::PercentEqual, TokenKind::Percent),
            '<' => {
                if self.eat('<') {
                    self.select1('=', TokenKind::ShiftLeftEqual, TokenKind::ShiftLeft)
                } else {
                    self.select1('=', TokenKind::LessEqual, TokenKind::Less)
                }
            }
            '>' => {
                if self.eat('>') {
                    self.select1('=', TokenKind::ShiftRightEqual, TokenKind::ShiftRight)
                } else {
                    self.select1('=', TokenKind::GreaterEqual, TokenKind::Greater)
                }
            }
            '(' => TokenKind::ParenLeft,
            ')' => TokenKind::ParenRight,
            '[' => TokenKind::BracketLeft,
            ']' => TokenKind::BracketRight,
            '{' => TokenKind::BraceLeft,
            '}' => TokenKind::BraceRight,
            ':' => TokenKind::Colon,
            ';' => TokenKind::Semicolon,
            ',' => TokenKind::Comma,
            '.' => TokenKind::Period,
            '@' => TokenKind::At,
            '~' => TokenKind::Tilde,
            other => {
                let span = Span::new(start, self.location());
                self.diagnostics
                    .add_error(span, format!("invalid character {other:?}"));
                TokenKind::Error
            }
        };
        self.token(start, kind)
    }

    fn token(&self, start: Location, kind: TokenKind) -> Token {
        Token {
            kind,
            span: Span::new(start, self.location()),
        }
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn select1(&mut self, next: char, matched: TokenKind, fallback: TokenKind) -> TokenKind {
        if self.eat(next) {
            matched
        } else {
            fallback
        }
    }

    fn select2(
        &mut self,
        a: char,
        on_a: TokenKind,
        b: char,
        on_b: TokenKind,
        fallback: TokenKind,
    ) -> TokenKind {
        if self.eat(a) {
            on_a
        } else if self.eat(b) {
            on_b
        } else {
            fallback
        }
    }

    /// Skips whitespace and comments. Line comments run to end of line;
    /// block comments nest.
    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.advance();
                }
                Some('/') if self.peek_at(1) == Some('/') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                Some('/') if self.peek_at(1) == Some('*') => {
                    let start = self.location();
                    self.advance();
                    self.advance();
                    let mut depth = 1u32;
                    loop {
                        match (self.peek(), self.peek_at(1)) {
                            (Some('/'), Some('*')) => {
                                self.advance();
                                self.advance();
                                depth += 1;
                            }
                            (Some('*'), Some('/')) => {
                                self.advance();
                                self.advance();
                                depth -= 1;
                                if depth == 0 {
                                    break;
                                }
                            }
                            (Some(_), _) => {
                                self.advance();
                            }
                            (None, _) => {
                                self.diagnostics.add_error(
                                    Span::new(start, self.location()),
                                    "unterminated block comment",
                                );
                                break;
                            }
                        }
                    }
                }
                _ => break,
            }
        }
    }

    fn ident_or_keyword(&mut self, start: Location) -> Token {
        let mut word = String::new();
        while let Some(c) = self.peek() {
            if c == '_' || c.is_ascii_alphanumeric() {
                word.push(c);
                self.advance();
            } else {
                break;
            }
        }
        let kind = if word == "_" {
            TokenKind::Underscore
        } else if let Some(kw) = Keyword::from_str(&word) {
            TokenKind::Keyword(kw)
        } else {
            TokenKind::Ident(word)
        };
        self.token(start, kind)
    }

    fn number(&mut self, start: Location) -> Token {
        if self.peek() == Some('0')
            && matches!(self.peek_at(1), Some('x') | Some('X'))
            && self.peek_at(2).is_some_and(|c| c.is_ascii_hexdigit())
        {
            return self.hex_int(start);
        }

        let mut text = String::new();
        let mut is_float = false;

        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                text.push(c);
                self.advance();
            } else {
                break;
            }
        }
        if self.peek() == Some('.') && self.peek_at(1) != Some('.') {
            is_float = true;
            text.push('.');
            self.advance();
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    text.push(c);
                    self.advance();
                } else {
                    break;
                }
            }
        }
        if matches!(self.peek(), Some('e') | Some('E')) {
            is_float = true;
            text.push('e');
            self.advance();
            if matches!(self.peek(), Some('+') | Some('-')) {
                text.push(self.peek().unwrap_or('+'));
                self.advance();
            }
            let mut saw_digit = false;
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    saw_digit = true;
                    text.push(c);
                    self.advance();
                } else {
                    break;
                }
            }
            if !saw_digit {
                let span = Span::new(start, self.location());
                self.diagnostics
                    .add_error(span, "exponent has no digits");
                return self.token(start, TokenKind::Error);
            }
        }

        match self.peek() {
            Some('f') => {
                self.advance();
                return self.float_token(start, &text, Some(FloatSuffix::F));
            }
            Some('h') => {
                self.advance();
                return self.float_token(start, &text, Some(FloatSuffix::H));
            }
            _ => {}
        }
        if is_float {
            return self.float_token(start, &text, None);
        }

        let suffix = match self.peek() {
            Some('i') => {
                self.advance();
                Some(IntSuffix::I)
            }
            Some('u') => {
                self.advance();
                Some(IntSuffix::U)
            }
            _ => None,
        };
        self.int_token(start, &text, suffix, 10)
    }

    fn hex_int(&mut self, start: Location) -> Token {
        // Consume "0x".
        self.advance();
        self.advance();
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_hexdigit() {
                text.push(c);
                self.advance();
            } else {
                break;
            }
        }
        let suffix = match self.peek() {
            Some('i') => {
                self.advance();
                Some(IntSuffix::I)
            }
            Some('u') => {
                self.advance();
                Some(IntSuffix::U)
            }
            _ => None,
        };
        self.int_token(start, &text, suffix, 16)
    }

    fn int_token(
        &mut self,
        start: Location,
        text: &str,
        suffix: Option<IntSuffix>,
        radix: u32,
    ) -> Token {
        let span = Span::new(start, self.location());
        let parsed = i64::from_str_radix(text, radix).ok();
        let value = match parsed {
            Some(v) => v,
            None => {
                self.diagnostics
                    .add_error(span, format!("integer literal '{text}' is too large"));
                return Token {
                    kind: TokenKind::Error,
                    span,
                };
            }
        };
        let in_range = match suffix {
            Some(IntSuffix::I) => i32::try_from(value).is_ok(),
            Some(IntSuffix::U) => u32::try_from(value).is_ok(),
            None => true,
        };
        if !in_range {
            let ty = if suffix == Some(IntSuffix::I) { "i32" } else { "u32" };
            self.diagnostics.add_error(
                span,
                format!("value {value} cannot be represented as '{ty}'"),
            );
            return Token {
                kind: TokenKind::Error,
                span,
            };
        }
        Token {
            kind: TokenKind::IntLiteral { value, suffix },
            span,
        }
    }

    fn float_token(&mut self, start: Location, text: &str, suffix: Option<FloatSuffix>) -> Token {
        let span = Span::new(start, self.location());
        match text.parse::<f64>() {
            Ok(value) if value.is_finite() => Token {
                kind: TokenKind::FloatLiteral { value, suffix },
                span,
            },
            _ => {
                self.diagnostics
                    .add_error(span, format!("float literal '{text}' is out of range"));
                Token {
                    kind: TokenKind::Error,
                    span,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> (Vec<Token>, DiagnosticList) {
        tokenize(&SourceFile::new("test.wgsl", source))
    }

    fn kinds(source: &str) -> Vec<TokenKind> {
        lex(source).0.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn empty_input() {
        let (tokens, diags) = lex("");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, TokenKind::Eof);
        assert!(diags.is_empty());
    }

    #[test]
    fn keywords_and_idents() {
        assert_eq!(
            kinds("fn main"),
            vec![
                TokenKind::Keyword(Keyword::Fn),
                TokenKind::Ident("main".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn bare_underscore() {
        assert_eq!(
            kinds("_ = _x"),
            vec![
                TokenKind::Underscore,
                TokenKind::Equal,
                TokenKind::Ident("_x".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn integer_literals() {
        assert_eq!(
            kinds("42 7i 3u 0x10 0xFFu"),
            vec![
                TokenKind::IntLiteral { value: 42, suffix: None },
                TokenKind::IntLiteral { value: 7, suffix: Some(IntSuffix::I) },
                TokenKind::IntLiteral { value: 3, suffix: Some(IntSuffix::U) },
                TokenKind::IntLiteral { value: 16, suffix: None },
                TokenKind::IntLiteral { value: 255, suffix: Some(IntSuffix::U) },
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn float_literals() {
        assert_eq!(
            kinds("1.0 0.5f 2e3 1.5e-2 3h 4f .25"),
            vec![
                TokenKind::FloatLiteral { value: 1.0, suffix: None },
                TokenKind::FloatLiteral { value: 0.5, suffix: Some(FloatSuffix::F) },
                TokenKind::FloatLiteral { value: 2000.0, suffix: None },
                TokenKind::FloatLiteral { value: 0.015, suffix: None },
                TokenKind::FloatLiteral { value: 3.0, suffix: Some(FloatSuffix::H) },
                TokenKind::FloatLiteral { value: 4.0, suffix: Some(FloatSuffix::F) },
                TokenKind::FloatLiteral { value: 0.25, suffix: None },
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn i32_overflow_is_diagnosed() {
        let (tokens, diags) = lex("2147483648i");
        assert_eq!(tokens[0].kind, TokenKind::Error);
        assert!(diags.has_errors());
    }

    #[test]
    fn maximal_munch_punctuation() {
        assert_eq!(
            kinds("<< <= < >>= >> >= > -> -- -= &&"),
            vec![
                TokenKind::ShiftLeft,
                TokenKind::LessEqual,
                TokenKind::Less,
                TokenKind::ShiftRightEqual,
                TokenKind::ShiftRight,
                TokenKind::GreaterEqual,
                TokenKind::Greater,
                TokenKind::Arrow,
                TokenKind::MinusMinus,
                TokenKind::MinusEqual,
                TokenKind::AmpAmp,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(
            kinds("a // line comment\nb /* block /* nested */ still */ c"),
            vec![
                TokenKind::Ident("a".into()),
                TokenKind::Ident("b".into()),
                TokenKind::Ident("c".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn unterminated_block_comment() {
        let (tokens, diags) = lex("a /* never closed");
        assert_eq!(tokens[0].kind, TokenKind::Ident("a".into()));
        assert_eq!(tokens.last().map(|t| &t.kind), Some(&TokenKind::Eof));
        assert!(diags.has_errors());
    }

    #[test]
    fn invalid_character_recovers() {
        let (tokens, diags) = lex("a $ b");
        assert_eq!(
            tokens.iter().map(|t| t.kind.clone()).collect::<Vec<_>>(),
            vec![
                TokenKind::Ident("a".into()),
                TokenKind::Error,
                TokenKind::Ident("b".into()),
                TokenKind::Eof,
            ]
        );
        assert_eq!(diags.error_count(), 1);
    }

    #[test]
    fn token_spans_track_lines_and_columns() {
        let (tokens, _) = lex("fn\n  main");
        assert_eq!(tokens[0].span.start, Location::new(1, 1));
        assert_eq!(tokens[0].span.end, Location::new(1, 3));
        assert_eq!(tokens[1].span.start, Location::new(2, 3));
        assert_eq!(tokens[1].span.end, Location::new(2, 7));
    }
}
