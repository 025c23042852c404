// diag.rs — Error taxonomy for argument derivation
//
// Every failure of `ArgumentEngine::handle` is one `ArgError`. Each variant
// carries a stable code; user-facing input errors and internal invariant
// violations are told apart by `ErrorClass`.
//
// Preconditions: none (types only).
// Postconditions: none (types only).
// Failure modes: none.
// Side effects: none.

use std::fmt;

use thiserror::Error;

// ── Diagnostic code ──────────────────────────────────────────────────────

/// A stable diagnostic code (e.g., `E0100`, `I0900`).
///
/// Once assigned, a code must never be reassigned to a different meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiagCode(pub &'static str);

impl fmt::Display for DiagCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub mod codes {
    use super::DiagCode;

    // E01xx: input shape of the call
    pub const E0100: DiagCode = DiagCode("E0100"); // unknown parameter
    pub const E0101: DiagCode = DiagCode("E0101"); // unconsumed input keys
    pub const E0102: DiagCode = DiagCode("E0102"); // composite value for a non-composite
    pub const E0103: DiagCode = DiagCode("E0103"); // value of the wrong type
    pub const E0104: DiagCode = DiagCode("E0104"); // halo-adjusted end overflows

    // E02xx: derivation
    pub const E0200: DiagCode = DiagCode("E0200"); // argument without a value
    pub const E0201: DiagCode = DiagCode("E0201"); // tiling extent unknown

    // E03xx: verification
    pub const E0300: DiagCode = DiagCode("E0300");

    // I09xx: internal
    pub const I0900: DiagCode = DiagCode("I0900");
}

// ── Error class ──────────────────────────────────────────────────────────

/// Whether an error was caused by the caller's input or by a defect in the
/// constructed graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    User,
    Internal,
}

// ── ArgError ─────────────────────────────────────────────────────────────

/// Failure of an argument derivation call. Any of these aborts the whole
/// call; no partial argument mapping is ever returned.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ArgError {
    #[error("parameter '{name}' does not exist in the declared parameters")]
    UnknownParameter { name: String },

    #[error("unknown arguments passed: {}", .names.join(", "))]
    UnknownArguments { names: Vec<String> },

    #[error("parameter '{name}' is not composite but a composite value was passed")]
    NotComposite { name: String },

    #[error("argument '{name}' expects {expected}, got {found}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("argument '{name}' = {value} overflows when offset by {offset}")]
    OutOfRange { name: String, value: i64, offset: i64 },

    #[error("no value supplied or derivable for argument '{name}'")]
    MissingValue { name: String },

    #[error("unable to derive size of dimension '{dim}' from defaults")]
    UnresolvableDimension { dim: String },

    #[error("argument '{name}' = {value} fails check {check}")]
    VerificationFailed {
        name: String,
        check: String,
        value: String,
    },

    #[error("internal: {message}")]
    Internal { message: String },
}

impl ArgError {
    pub fn internal(message: impl Into<String>) -> Self {
        ArgError::Internal {
            message: message.into(),
        }
    }

    pub fn code(&self) -> DiagCode {
        match self {
            ArgError::UnknownParameter { .. } => codes::E0100,
            ArgError::UnknownArguments { .. } => codes::E0101,
            ArgError::NotComposite { .. } => codes::E0102,
            ArgError::TypeMismatch { .. } => codes::E0103,
            ArgError::OutOfRange { .. } => codes::E0104,
            ArgError::MissingValue { .. } => codes::E0200,
            ArgError::UnresolvableDimension { .. } => codes::E0201,
            ArgError::VerificationFailed { .. } => codes::E0300,
            ArgError::Internal { .. } => codes::I0900,
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            ArgError::Internal { .. } => ErrorClass::Internal,
            _ => ErrorClass::User,
        }
    }

    /// Remediation hint, where one is known.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            ArgError::UnresolvableDimension { .. } => Some("provide an explicit value"),
            ArgError::MissingValue { .. } => {
                Some("pass the argument explicitly or supply an array it can be derived from")
            }
            _ => None,
        }
    }

    /// `error[CODE]: message` plus an optional hint line.
    pub fn render(&self) -> String {
        let level = match self.class() {
            ErrorClass::User => "error",
            ErrorClass::Internal => "internal error",
        };
        let mut out = format!("{}[{}]: {}", level, self.code(), self);
        if let Some(hint) = self.hint() {
            out.push_str("\n  hint: ");
            out.push_str(hint);
        }
        out
    }
}
