//! Domain error types.

/// A parse error with position information for formula parsing.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("parse error at position {position}: {message}")]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl ParseError {
    /// Format the error with a caret pointing at the error position in the input.
    ///
    /// `position` is a byte offset; the caret is placed under the character
    /// that starts there, so multi-byte field names still line up.
    pub fn display_with_context(&self, input: &str) -> String {
        let column = input
            .get(..self.position)
            .map(|prefix| prefix.chars().count())
            .unwrap_or_else(|| input.chars().count());
        let caret = " ".repeat(column) + "^";
        format!(
            "{input}\n{caret}\n{err}",
            input = input,
            caret = caret,
            err = self
        )
    }
}

/// A runtime fault while evaluating a parsed expression.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    #[error("unknown symbol '{0}'")]
    UnknownSymbol(String),

    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("function '{name}' expects {expected} argument(s), got {found}")]
    Arity {
        name: String,
        expected: String,
        found: usize,
    },

    #[error("division by zero")]
    DivisionByZero,

    #[error("result is not a finite number")]
    NonFinite,
}

/// Anything that can go wrong turning rewritten formula text into a number.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FormulaError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Eval(#[from] EvalError),
}

/// Top-level error type for tickwatch.
#[derive(Debug, thiserror::Error)]
pub enum TickwatchError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("failed to load workspace from {source_name}: {reason}")]
    WorkspaceLoad { source_name: String, reason: String },

    #[error("invalid entity '{name}': {reason}")]
    EntityInvalid { name: String, reason: String },

    #[error("duplicate entity name: {name}")]
    DuplicateEntityName { name: String },

    #[error("workspace {id} not found")]
    WorkspaceNotFound { id: i64 },

    #[error("no workspaces defined")]
    NoWorkspace,

    #[error(transparent)]
    FormulaParse(#[from] ParseError),

    #[error("invalid formula in '{entity}': {reason}")]
    FormulaInvalid { entity: String, reason: String },

    #[error("feed error at line {line}: {reason}")]
    Feed { line: usize, reason: String },

    #[error("output error: {reason}")]
    Output { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&TickwatchError> for std::process::ExitCode {
    fn from(err: &TickwatchError) -> Self {
        let code: u8 = match err {
            TickwatchError::Io(_) => 1,
            TickwatchError::ConfigParse { .. }
            | TickwatchError::ConfigInvalid { .. } => 2,
            TickwatchError::WorkspaceLoad { .. }
            | TickwatchError::EntityInvalid { .. }
            | TickwatchError::DuplicateEntityName { .. }
            | TickwatchError::WorkspaceNotFound { .. }
            | TickwatchError::NoWorkspace => 3,
            TickwatchError::FormulaParse(_) | TickwatchError::FormulaInvalid { .. } => 4,
            TickwatchError::Feed { .. } | TickwatchError::Output { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
