//! tern scanner: converts source text into tokens.

use tern_syntax::error::{Error, Result, Stage};
use tern_syntax::token::{Pos, Token, TokenKind};

fn err<T>(pos: Pos, msg: impl Into<String>) -> Result<T> {
    Err(Error::at(Stage::Lex, pos, msg))
}

/// Streaming character scanner producing tokens with positions.
///
/// One character of lookahead plus `peek_next` is enough for every
/// disambiguation in the language; the only extra state is the kind of the
/// last emitted token, which decides whether `-` followed by a digit starts
/// a negative number literal or is a binary minus.
pub struct Scanner {
    src: Vec<char>,
    pos: usize,
    line: usize,
    col: usize,
    last: Option<TokenKind>,
}

/// Token kinds that can end an expression. After one of these, `-digit` is a
/// subtraction, not a negative literal.
fn ends_expr(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::RParen
            | TokenKind::RBrack
            | TokenKind::RBrace
            | TokenKind::Ident
            | TokenKind::Number
            | TokenKind::True
            | TokenKind::False
            | TokenKind::Quoted
    )
}

fn is_digit(c: char) -> bool {
    c.is_ascii_digit()
}

fn is_alpha(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

impl Scanner {
    /// Creates a scanner over the given source text.
    pub fn new(input: &str) -> Self {
        Self {
            src: input.chars().collect(),
            pos: 0,
            line: 1,
            col: 1,
            last: None,
        }
    }

    fn peek(&self) -> Option<char> {
        self.src.get(self.pos).copied()
    }

    fn peek_next(&self) -> Option<char> {
        self.src.get(self.pos + 1).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.src.get(self.pos).copied();
        if let Some(c) = ch {
            self.pos += 1;
            if c == '\n' {
                self.line += 1;
                self.col = 1;
            } else {
                self.col += 1;
            }
        }
        ch
    }

    // Whitespace and `#` line comments never reach the token stream.
    fn skip_blanks(&mut self) {
        while let Some(c) = self.peek() {
            if c == ' ' || c == '\t' || c == '\n' || c == '\r' {
                self.advance();
            } else if c == '#' {
                while let Some(c2) = self.peek() {
                    self.advance();
                    if c2 == '\n' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    /// Scans the entire input into a token vector ending with `Eof`.
    pub fn scan(&mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            self.skip_blanks();
            let pos = Pos {
                line: self.line,
                col: self.col,
            };
            let tok = match self.peek() {
                None => {
                    tokens.push(Token::new(TokenKind::Eof, "", pos));
                    break;
                }
                Some(c) => self.read_token(c, pos)?,
            };
            self.last = Some(tok.kind);
            tokens.push(tok);
        }
        Ok(tokens)
    }

    fn read_token(&mut self, c: char, pos: Pos) -> Result<Token> {
        let tok = match c {
            '(' => self.punct(TokenKind::LParen, pos),
            ')' => self.punct(TokenKind::RParen, pos),
            '[' => self.punct(TokenKind::LBrack, pos),
            ']' => self.punct(TokenKind::RBrack, pos),
            '{' => self.punct(TokenKind::LBrace, pos),
            '}' => self.punct(TokenKind::RBrace, pos),
            ',' => self.punct(TokenKind::Comma, pos),
            ':' => self.punct(TokenKind::Colon, pos),
            ';' => self.punct(TokenKind::Semicolon, pos),
            '=' => self.one_or_eq(TokenKind::Assign, TokenKind::Eq, pos),
            '!' => self.one_or_eq(TokenKind::Bang, TokenKind::Ne, pos),
            '<' => self.one_or_eq(TokenKind::Lt, TokenKind::Le, pos),
            '>' => self.one_or_eq(TokenKind::Gt, TokenKind::Ge, pos),
            '+' => self.one_or_eq(TokenKind::Plus, TokenKind::AddAssign, pos),
            '*' => self.one_or_eq(TokenKind::Star, TokenKind::MulAssign, pos),
            '/' => self.one_or_eq(TokenKind::Slash, TokenKind::DivAssign, pos),
            '%' => self.one_or_eq(TokenKind::Percent, TokenKind::ModAssign, pos),
            '-' => self.read_minus(pos)?,
            '&' => self.pair('&', TokenKind::AndAnd, pos)?,
            '|' => self.pair('|', TokenKind::OrOr, pos)?,
            '.' => self.pair('.', TokenKind::DotDot, pos)?,
            '"' => self.read_quoted(pos)?,
            c if is_digit(c) => self.read_number(pos),
            c if is_alpha(c) => self.read_word(pos),
            other => {
                return err(pos, format!("Unexpected character '{}'", other));
            }
        };
        Ok(tok)
    }

    fn punct(&mut self, kind: TokenKind, pos: Pos) -> Token {
        self.advance();
        Token::new(kind, kind.to_string(), pos)
    }

    // `=` vs `==`, `!` vs `!=`, `+` vs `+=`, and so on.
    fn one_or_eq(&mut self, one: TokenKind, with_eq: TokenKind, pos: Pos) -> Token {
        self.advance();
        if self.peek() == Some('=') {
            self.advance();
            Token::new(with_eq, with_eq.to_string(), pos)
        } else {
            Token::new(one, one.to_string(), pos)
        }
    }

    // `&&`, `||` and `..` require the doubled character.
    fn pair(&mut self, second: char, kind: TokenKind, pos: Pos) -> Result<Token> {
        self.advance();
        if self.peek() == Some(second) {
            self.advance();
            Ok(Token::new(kind, kind.to_string(), pos))
        } else {
            err(pos, format!("Unexpected '{0}' (did you mean '{0}{0}'?)", second))
        }
    }

    // `-` is subtraction, `-=`, `->`, or the sign of a number literal. The
    // literal case fires only when the previous token cannot end an
    // expression (or at the start of the input).
    fn read_minus(&mut self, pos: Pos) -> Result<Token> {
        match self.peek_next() {
            Some('=') => {
                self.advance();
                self.advance();
                Ok(Token::new(TokenKind::SubAssign, "-=", pos))
            }
            Some('>') => {
                self.advance();
                self.advance();
                Ok(Token::new(TokenKind::Arrow, "->", pos))
            }
            Some(c) if is_digit(c) => match self.last {
                Some(kind) if ends_expr(kind) => {
                    self.advance();
                    Ok(Token::new(TokenKind::Minus, "-", pos))
                }
                _ => Ok(self.read_number(pos)),
            },
            _ => {
                self.advance();
                Ok(Token::new(TokenKind::Minus, "-", pos))
            }
        }
    }

    fn read_number(&mut self, pos: Pos) -> Token {
        let mut s = String::new();
        if self.peek() == Some('-') {
            s.push('-');
            self.advance();
        }
        while let Some(c) = self.peek() {
            if is_digit(c) {
                s.push(c);
                self.advance();
            } else {
                break;
            }
        }
        Token::new(TokenKind::Number, s, pos)
    }

    fn read_word(&mut self, pos: Pos) -> Token {
        let mut s = String::new();
        while let Some(c) = self.peek() {
            if is_alpha(c) || is_digit(c) {
                s.push(c);
                self.advance();
            } else {
                break;
            }
        }
        match TokenKind::keyword(&s) {
            Some(kind) => Token::new(kind, s, pos),
            None => Token::new(TokenKind::Ident, s, pos),
        }
    }

    // The literal keeps backslash sequences untouched; the parser dequotes
    // and validates escapes.
    fn read_quoted(&mut self, pos: Pos) -> Result<Token> {
        self.advance();
        let mut s = String::new();
        loop {
            match self.advance() {
                None => return err(pos, "Unterminated string"),
                Some('"') => return Ok(Token::new(TokenKind::Quoted, s, pos)),
                Some('\\') => match self.advance() {
                    None => return err(pos, "Unterminated string"),
                    Some(next) => {
                        s.push('\\');
                        s.push(next);
                    }
                },
                Some(other) => s.push(other),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        Scanner::new(input)
            .scan()
            .expect("scan should succeed")
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    fn scan_err(input: &str) -> String {
        Scanner::new(input).scan().unwrap_err().msg
    }

    #[test]
    fn punctuation_and_operators() {
        assert_eq!(
            kinds("( ) [ ] { } , : ;"),
            vec![
                TokenKind::LParen,
                TokenKind::RParen,
                TokenKind::LBrack,
                TokenKind::RBrack,
                TokenKind::LBrace,
                TokenKind::RBrace,
                TokenKind::Comma,
                TokenKind::Colon,
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
        assert_eq!(
            kinds("= == != < <= > >= += *= /= %="),
            vec![
                TokenKind::Assign,
                TokenKind::Eq,
                TokenKind::Ne,
                TokenKind::Lt,
                TokenKind::Le,
                TokenKind::Gt,
                TokenKind::Ge,
                TokenKind::AddAssign,
                TokenKind::MulAssign,
                TokenKind::DivAssign,
                TokenKind::ModAssign,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn keywords_and_identifiers() {
        assert_eq!(
            kinds("var func if else while for in continue break return"),
            vec![
                TokenKind::Var,
                TokenKind::Func,
                TokenKind::If,
                TokenKind::Else,
                TokenKind::While,
                TokenKind::For,
                TokenKind::In,
                TokenKind::Continue,
                TokenKind::Break,
                TokenKind::Return,
                TokenKind::Eof,
            ]
        );
        assert_eq!(
            kinds("foo _bar baz9"),
            vec![
                TokenKind::Ident,
                TokenKind::Ident,
                TokenKind::Ident,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn minus_before_digit_depends_on_previous_token() {
        // At start of input, `-5` is a number.
        let toks = Scanner::new("-5").scan().unwrap();
        assert_eq!(toks[0].kind, TokenKind::Number);
        assert_eq!(toks[0].literal, "-5");

        // After an expression-ending token, it is a subtraction.
        let toks = Scanner::new("x -5").scan().unwrap();
        assert_eq!(toks[1].kind, TokenKind::Minus);
        assert_eq!(toks[2].kind, TokenKind::Number);
        assert_eq!(toks[2].literal, "5");

        // After an operator, it is again a negative literal.
        let toks = Scanner::new("x + -5").scan().unwrap();
        assert_eq!(toks[2].kind, TokenKind::Number);
        assert_eq!(toks[2].literal, "-5");

        // `->` and `-=` win over the number rule.
        assert_eq!(
            kinds("-> -="),
            vec![TokenKind::Arrow, TokenKind::SubAssign, TokenKind::Eof]
        );
    }

    #[test]
    fn range_dots() {
        assert_eq!(
            kinds("0..10"),
            vec![
                TokenKind::Number,
                TokenKind::DotDot,
                TokenKind::Number,
                TokenKind::Eof
            ]
        );
        assert!(scan_err("a.b").contains("did you mean '..'"));
    }

    #[test]
    fn single_amp_or_pipe_is_an_error() {
        assert!(scan_err("a & b").contains("did you mean '&&'"));
        assert!(scan_err("a | b").contains("did you mean '||'"));
        assert_eq!(
            kinds("a && b || c"),
            vec![
                TokenKind::Ident,
                TokenKind::AndAnd,
                TokenKind::Ident,
                TokenKind::OrOr,
                TokenKind::Ident,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn quoted_strings_keep_raw_escapes() {
        let toks = Scanner::new(r#""a\n\"b""#).scan().unwrap();
        assert_eq!(toks[0].kind, TokenKind::Quoted);
        assert_eq!(toks[0].literal, r#"a\n\"b"#);
        assert!(scan_err("\"open").contains("Unterminated string"));
    }

    #[test]
    fn comments_are_dropped() {
        assert_eq!(
            kinds("1 # comment\n2"),
            vec![TokenKind::Number, TokenKind::Number, TokenKind::Eof]
        );
        assert_eq!(kinds("# only a comment"), vec![TokenKind::Eof]);
    }

    #[test]
    fn positions_are_one_based() {
        let toks = Scanner::new("a\n  bc").scan().unwrap();
        assert_eq!((toks[0].pos.line, toks[0].pos.col), (1, 1));
        assert_eq!((toks[1].pos.line, toks[1].pos.col), (2, 3));
    }

    #[test]
    fn rescanning_emitted_literals_reproduces_the_stream() {
        let src = "var x := 10; # note\nif x >= -2 { x -= 1; } while x in 0..9 { puts(\"hi\"); }";
        let first = Scanner::new(src).scan().unwrap();
        let joined: String = first
            .iter()
            .filter(|t| t.kind != TokenKind::Eof)
            .map(|t| match t.kind {
                TokenKind::Quoted => format!("\"{}\" ", t.literal),
                _ => format!("{} ", t.literal),
            })
            .collect();
        let second = Scanner::new(&joined).scan().unwrap();
        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(&second) {
            assert_eq!(a.kind, b.kind);
            assert_eq!(a.literal, b.literal);
        }
    }

    #[test]
    fn stream_ends_with_exactly_one_eof() {
        let toks = Scanner::new("var x := 1;").scan().unwrap();
        let eofs = toks.iter().filter(|t| t.kind == TokenKind::Eof).count();
        assert_eq!(eofs, 1);
        assert_eq!(toks.last().unwrap().kind, TokenKind::Eof);
    }
}
