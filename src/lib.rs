pub mod ast;
pub mod lexer;
pub mod parser;
pub mod runtime;

pub use runtime::{Interpreter, Options, RuntimeError, Value};

/// Anything that can go wrong between source text and a finished run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Lex(#[from] lexer::LexerError),

    #[error("{0}")]
    Parse(#[from] parser::ParseError),

    #[error("{0}")]
    Runtime(#[from] RuntimeError),

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for syntax errors raised at end of input, which an interactive
    /// reader can fix by reading another line.
    pub fn is_incomplete(&self) -> bool {
        match self {
            Error::Parse(e) => e.is_incomplete(),
            Error::Lex(e) => e.message.starts_with("unfinished long"),
            _ => false,
        }
    }

    /// The language-level error value, as protected calls see it.
    pub fn value(&self) -> Value {
        match self {
            Error::Runtime(e) => e.value(),
            other => Value::from(other.to_string()),
        }
    }
}
