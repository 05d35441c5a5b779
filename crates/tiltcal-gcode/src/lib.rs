//! G-code tokenizer, parser and position-report decoding for tiltcal.

mod lexer;
mod parser;
pub mod telemetry;

pub use lexer::{LexError, Lexer, Number, Token, TokenKind, lex};
pub use parser::{Code, ParseError, Statement, Word, parse, parse_tokens};
pub use telemetry::{PositionReport, TelemetryError, parse_position_report};

#[cfg(test)]
mod testing;
