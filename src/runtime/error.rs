use thiserror::Error;

use super::value::Value;

/// Error taxonomy seen by scripts and hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Type,
    Domain,
    Const,
    Name,
    GotoTarget,
    Raised,
    StackOverflow,
}

/// The single unwind channel of the evaluator. Every failure, including a
/// script calling `error(v)`, travels up the Rust call stack as one of these.
#[derive(Debug, Clone, Error)]
pub enum RuntimeError {
    #[error("{0}")]
    Type(String),

    #[error("{0}")]
    Domain(String),

    #[error("{0}")]
    Const(String),

    #[error("{0}")]
    Name(String),

    #[error("{0}")]
    GotoTarget(String),

    #[error("{}", describe_raised(.0))]
    Raised(Value),

    #[error("stack overflow (more than {0} nested calls)")]
    StackOverflow(usize),

    /// A close handler failed while `previous` was already unwinding.
    #[error("{error}")]
    Chained {
        error: Box<RuntimeError>,
        #[source]
        previous: Box<RuntimeError>,
    },
}

fn describe_raised(value: &Value) -> String {
    match value {
        Value::Str(s) => String::from_utf8_lossy(s).into_owned(),
        Value::Int(_) | Value::Float(_) => value.to_string(),
        other => format!("(error object is a {} value)", other.type_name()),
    }
}

impl RuntimeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RuntimeError::Type(_) => ErrorKind::Type,
            RuntimeError::Domain(_) => ErrorKind::Domain,
            RuntimeError::Const(_) => ErrorKind::Const,
            RuntimeError::Name(_) => ErrorKind::Name,
            RuntimeError::GotoTarget(_) => ErrorKind::GotoTarget,
            RuntimeError::Raised(_) => ErrorKind::Raised,
            RuntimeError::StackOverflow(_) => ErrorKind::StackOverflow,
            RuntimeError::Chained { error, .. } => error.kind(),
        }
    }

    /// The language-level error object: the raised value itself, or the
    /// message as a string for engine-detected errors.
    pub fn value(&self) -> Value {
        match self {
            RuntimeError::Raised(v) => v.clone(),
            RuntimeError::Chained { error, .. } => error.value(),
            other => Value::from(other.to_string()),
        }
    }

    /// Prefix the message with a source position. Raised values are left
    /// untouched; they belong to the script.
    pub fn located(self, file: &str, line: usize) -> Self {
        let prefix = |msg: String| format!("{}:{}: {}", file, line, msg);
        match self {
            RuntimeError::Type(m) => RuntimeError::Type(prefix(m)),
            RuntimeError::Domain(m) => RuntimeError::Domain(prefix(m)),
            RuntimeError::Const(m) => RuntimeError::Const(prefix(m)),
            RuntimeError::Name(m) => RuntimeError::Name(prefix(m)),
            RuntimeError::GotoTarget(m) => RuntimeError::GotoTarget(prefix(m)),
            other => other,
        }
    }

    /// Combine a close-handler failure with the error that was unwinding.
    pub fn chain(self, previous: RuntimeError) -> Self {
        RuntimeError::Chained {
            error: Box::new(self),
            previous: Box::new(previous),
        }
    }
}

pub(crate) fn type_error(msg: impl Into<String>) -> RuntimeError {
    RuntimeError::Type(msg.into())
}

pub(crate) fn domain_error(msg: impl Into<String>) -> RuntimeError {
    RuntimeError::Domain(msg.into())
}
