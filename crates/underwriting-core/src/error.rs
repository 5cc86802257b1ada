use thiserror::Error;

/// Coarse classification of failures, used by command layers to pick a
/// response without matching on every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    ArithmeticPrecondition,
    Internal,
}

#[derive(Debug, Error)]
pub enum UnderwritingError {
    #[error("Invalid input: {field} — {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Arithmetic precondition failed: {field} — {reason}")]
    ArithmeticPrecondition { field: String, reason: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    #[error("No cash-flow data for loan {loan_id}")]
    NoCashFlowData { loan_id: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Division by zero in {context}")]
    DivisionByZero { context: String },

    #[error("Store error: {0}")]
    Store(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl UnderwritingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            UnderwritingError::InvalidInput { .. } => ErrorKind::Validation,
            UnderwritingError::ArithmeticPrecondition { .. } => ErrorKind::ArithmeticPrecondition,
            UnderwritingError::NotFound { .. } | UnderwritingError::NoCashFlowData { .. } => {
                ErrorKind::NotFound
            }
            UnderwritingError::Conflict(_) => ErrorKind::Conflict,
            UnderwritingError::DivisionByZero { .. }
            | UnderwritingError::Store(_)
            | UnderwritingError::SerializationError(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn invalid(field: &str, reason: impl Into<String>) -> Self {
        UnderwritingError::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn precondition(field: &str, reason: impl Into<String>) -> Self {
        UnderwritingError::ArithmeticPrecondition {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for UnderwritingError {
    fn from(e: serde_json::Error) -> Self {
        UnderwritingError::SerializationError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_taxonomy() {
        assert_eq!(
            UnderwritingError::invalid("min_rate", "negative").kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            UnderwritingError::precondition("principal", "zero").kind(),
            ErrorKind::ArithmeticPrecondition
        );
        assert_eq!(
            UnderwritingError::NoCashFlowData {
                loan_id: "L-1".into()
            }
            .kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            UnderwritingError::Conflict("dup".into()).kind(),
            ErrorKind::Conflict
        );
    }

    #[test]
    fn test_no_cash_flow_message() {
        let err = UnderwritingError::NoCashFlowData {
            loan_id: "L-7".into(),
        };
        assert_eq!(err.to_string(), "No cash-flow data for loan L-7");
    }
}
