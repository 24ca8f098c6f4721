// ============================================================================
// Order Validation Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("field '{0}' is required")]
    MissingField(String),

    #[error("field '{field}' must not be negative, got {value}")]
    Negative { field: String, value: i64 },

    #[error("order must contain at least one item")]
    EmptyItems,
}
