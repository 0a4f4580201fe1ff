//! Error types for template parsing.

use thiserror::Error;

/// Errors raised while parsing template source.
///
/// Rendering itself is infallible: missing values evaluate to `null` and
/// print as an empty string, so every failure surfaces at parse time.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// A `<%` tag was opened but never closed with `%>`.
    #[error("unterminated template tag starting at byte {offset}")]
    UnterminatedTag {
        /// Byte offset of the opening `<%`.
        offset: usize,
    },

    /// A control tag (`if`, `for`, `else`, `end`) was malformed or misplaced.
    #[error("invalid control tag `{tag}`: {reason}")]
    InvalidControl {
        /// The tag body as written.
        tag: String,
        /// What was wrong with it.
        reason: &'static str,
    },

    /// A block was opened but never closed with `<% end %>`.
    #[error("unclosed `{0}` block")]
    UnclosedBlock(&'static str),

    /// An expression failed to parse.
    #[error("invalid expression `{expr}`: {reason}")]
    InvalidExpression {
        /// Expression source.
        expr: String,
        /// Parser diagnostic.
        reason: String,
    },
}
