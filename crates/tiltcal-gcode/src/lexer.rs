use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", content = "value")]
pub enum TokenKind {
    /// A letter address with an optional numeric operand, e.g. `G0`, `X-1.5`
    /// or the bare `X` of `G28 X`.
    Word {
        letter: char,
        value: Option<Number>,
    },
    /// Any other run of non-whitespace text (`ok`, message payloads).
    Text(String),
    Comment(String),
    Newline,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
#[serde(tag = "kind", content = "value")]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(v) => v as f64,
            Number::Float(v) => v,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum LexError {
    #[error("invalid number '{raw}' at line {line}, column {column}")]
    InvalidNumber {
        line: usize,
        column: usize,
        raw: String,
    },

    #[error("unterminated parenthesized comment starting at line {line}, column {column}")]
    UnterminatedComment { line: usize, column: usize },
}

pub fn lex(input: &str) -> Lexer<'_> {
    Lexer::new(input)
}

pub struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
            line: 1,
            column: 1,
        }
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.chars.next()?;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn eat_while(&mut self, mut keep: impl FnMut(char) -> bool) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if !keep(c) {
                break;
            }
            out.push(c);
            self.bump();
        }
        out
    }
}

impl Iterator for Lexer<'_> {
    type Item = Result<Token, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(ch) = self.peek() {
            let (line, column) = (self.line, self.column);
            let token = |kind| Some(Ok(Token { kind, line, column }));

            if ch.is_ascii_whitespace() {
                self.bump();
                if ch == '\n' {
                    return token(TokenKind::Newline);
                }
                continue;
            }

            if ch == ';' {
                self.bump();
                let text = self.eat_while(|c| c != '\n');
                return token(TokenKind::Comment(text.trim().to_string()));
            }

            if ch == '(' {
                self.bump();
                let text = self.eat_while(|c| c != ')' && c != '\n');
                if self.peek() != Some(')') {
                    return Some(Err(LexError::UnterminatedComment { line, column }));
                }
                self.bump();
                return token(TokenKind::Comment(text.trim().to_string()));
            }

            if ch.is_ascii_alphabetic() {
                self.bump();
                let letter = ch.to_ascii_uppercase();
                match self.peek() {
                    Some(next) if is_number_start(next) => {
                        let start_col = self.column;
                        return match parse_number(self) {
                            Ok(value) => token(TokenKind::Word {
                                letter,
                                value: Some(value),
                            }),
                            Err(raw) => Some(Err(LexError::InvalidNumber {
                                line,
                                column: start_col,
                                raw,
                            })),
                        };
                    }
                    Some(next) if !is_value_terminator(next) => {
                        // Words like `ok` or `Count`
                        let mut raw = String::from(ch);
                        raw.push_str(&self.eat_while(|c| !is_value_terminator(c)));
                        return token(TokenKind::Text(raw));
                    }
                    _ => {
                        return token(TokenKind::Word {
                            letter,
                            value: None,
                        });
                    }
                }
            }

            let raw = self.eat_while(|c| !is_value_terminator(c));
            return token(TokenKind::Text(raw));
        }

        None
    }
}

fn is_number_start(ch: char) -> bool {
    ch.is_ascii_digit() || matches!(ch, '+' | '-' | '.')
}

fn is_value_terminator(ch: char) -> bool {
    ch.is_ascii_whitespace() || matches!(ch, ';' | '(')
}

/// Reads `[+-]digits[.digits]`. Exponents are not accepted so that packed
/// words such as `X10E2` split into `X10` and `E2`.
fn parse_number(lexer: &mut Lexer<'_>) -> Result<Number, String> {
    let mut raw = String::new();
    if let Some(sign) = lexer.peek().filter(|c| matches!(c, '+' | '-')) {
        raw.push(sign);
        lexer.bump();
    }

    let int_part = lexer.eat_while(|c| c.is_ascii_digit());
    raw.push_str(&int_part);

    let mut frac_part = String::new();
    let has_point = lexer.peek() == Some('.');
    if has_point {
        lexer.bump();
        raw.push('.');
        frac_part = lexer.eat_while(|c| c.is_ascii_digit());
        raw.push_str(&frac_part);
    }

    if int_part.is_empty() && frac_part.is_empty() {
        return Err(raw);
    }

    if !has_point && let Ok(int) = raw.parse::<i64>() {
        return Ok(Number::Int(int));
    }

    raw.parse::<f64>().map(Number::Float).map_err(|_| raw)
}
