use crate::lexer::{LexError, Number, Token, TokenKind, lex};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// One line of directives.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Statement {
    pub line: usize,
    pub words: Vec<Word>,
    pub text: Vec<String>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct Word {
    pub letter: char,
    pub value: Option<Number>,
}

/// The command word that leads a statement, e.g. `G0` or `M114`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Code {
    pub letter: char,
    pub number: u32,
}

impl Code {
    pub const fn new(letter: char, number: u32) -> Self {
        Self { letter, number }
    }

    pub const RAPID_MOVE: Code = Code::new('G', 0);
    pub const LINEAR_MOVE: Code = Code::new('G', 1);
    pub const HOME: Code = Code::new('G', 28);
    pub const PROBE: Code = Code::new('G', 30);
    pub const ABSOLUTE: Code = Code::new('G', 90);
    pub const RELATIVE: Code = Code::new('G', 91);
    pub const SET_POSITION: Code = Code::new('G', 92);
    pub const REPORT_POSITION: Code = Code::new('M', 114);
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.letter, self.number)
    }
}

impl Statement {
    /// The leading `G`/`M` word, if it carries a whole number.
    pub fn code(&self) -> Option<Code> {
        let first = self.words.first()?;
        if !matches!(first.letter, 'G' | 'M') {
            return None;
        }
        match first.value? {
            Number::Int(n) => u32::try_from(n).ok().map(|n| Code::new(first.letter, n)),
            Number::Float(_) => None,
        }
    }

    /// Operand words following the command word.
    pub fn operands(&self) -> &[Word] {
        match self.code() {
            Some(_) => &self.words[1..],
            None => &self.words,
        }
    }

    /// Value of the first operand with the given letter.
    pub fn value(&self, letter: char) -> Option<f64> {
        self.operands()
            .iter()
            .find(|w| w.letter == letter)
            .and_then(|w| w.value)
            .map(Number::as_f64)
    }

    /// Whether an operand with the given letter is present, with or without
    /// a value.
    pub fn mentions(&self, letter: char) -> bool {
        self.operands().iter().any(|w| w.letter == letter)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error(transparent)]
    Lex(#[from] LexError),

    #[error("multiple comments on line {line}")]
    MultipleComments { line: usize },
}

/// Parse directives from a string using the lexer.
pub fn parse(input: &str) -> Result<Vec<Statement>, ParseError> {
    parse_tokens(lex(input))
}

/// Parse directives from a token iterator.
pub fn parse_tokens<I>(tokens: I) -> Result<Vec<Statement>, ParseError>
where
    I: IntoIterator<Item = Result<Token, LexError>>,
{
    let mut out = Vec::new();
    let mut current = Statement {
        line: 1,
        words: Vec::new(),
        text: Vec::new(),
        comment: None,
    };

    let flush = |current: &mut Statement, out: &mut Vec<Statement>, next_line: usize| {
        let done = std::mem::replace(
            current,
            Statement {
                line: next_line,
                words: Vec::new(),
                text: Vec::new(),
                comment: None,
            },
        );
        if !done.words.is_empty() || !done.text.is_empty() || done.comment.is_some() {
            out.push(done);
        }
    };

    for token in tokens {
        let token = token?;
        match token.kind {
            TokenKind::Newline => flush(&mut current, &mut out, token.line + 1),
            TokenKind::Comment(text) => {
                if current.comment.is_some() {
                    return Err(ParseError::MultipleComments { line: token.line });
                }
                current.comment = Some(text);
            }
            TokenKind::Word { letter, value } => current.words.push(Word { letter, value }),
            TokenKind::Text(text) => current.text.push(text),
        }
    }

    let last_line = current.line;
    flush(&mut current, &mut out, last_line);
    Ok(out)
}
