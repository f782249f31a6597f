//! Error types for tokenizing, parsing and compiling queries.

use thiserror::Error;

use crate::ast::FilterOperator;

/// Errors raised while turning a filter / order-by string into a query plan.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueryError {
    /// Malformed token, e.g. an unterminated string or a stray character.
    #[error("lexical error at {position}: {message}")]
    Lexical { message: String, position: usize },

    /// Grammar violation: unexpected token, unmatched parenthesis, unknown operator.
    #[error("syntax error{}: {message}", fmt_position(.position))]
    Syntax {
        message: String,
        position: Option<usize>,
    },

    #[error("invalid filter property '{0}'")]
    UnresolvedFilterProperty(String),

    #[error("invalid ordering property '{0}'")]
    UnresolvedOrderingProperty(String),

    /// A literal could not be coerced to the declared type of its field.
    #[error("cannot convert '{value}' to {target} for property '{property}': {reason}")]
    Conversion {
        property: String,
        value: String,
        target: String,
        reason: String,
    },

    /// Collection filter applied to a field that is not a sequence.
    #[error("property '{0}' is not a collection")]
    InvalidCollectionTarget(String),

    #[error("operator {operator} cannot be applied to property '{property}': {reason}")]
    UnsupportedOperator {
        property: String,
        operator: FilterOperator,
        reason: String,
    },

    #[error("operator {operator} on property '{property}' expects a single value, got {count}")]
    ValueCount {
        property: String,
        operator: FilterOperator,
        count: usize,
    },
}

fn fmt_position(position: &Option<usize>) -> String {
    match position {
        Some(p) => format!(" at {p}"),
        None => String::new(),
    }
}

impl QueryError {
    pub(crate) fn syntax(message: impl Into<String>, position: Option<usize>) -> Self {
        QueryError::Syntax {
            message: message.into(),
            position,
        }
    }

    /// True for errors caused by malformed input text rather than by the mapping.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            QueryError::Lexical { .. } | QueryError::Syntax { .. } | QueryError::Conversion { .. }
        )
    }
}

/// Result type for query compilation.
pub type Result<T> = std::result::Result<T, QueryError>;
