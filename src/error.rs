use thiserror::Error;

// ---------------------------------------------------------------------------
// Pipeline errors
// ---------------------------------------------------------------------------

/// Fatal errors raised by the aggregation pipeline.
///
/// An empty selection is *not* an error: aggregation and filtering return an
/// empty table for it. Both variants here abort the current call and carry
/// enough context (which field, which value) to correct the input.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    /// The caller-supplied configuration cannot be applied to the data.
    #[error("configuration error in `{field}` (value `{value}`): {reason}")]
    Configuration {
        field: String,
        value: String,
        reason: String,
    },

    /// The input table does not match the expected schema.
    #[error("schema violation in column `{column}`{}: {reason}", fmt_row(.row))]
    SchemaViolation {
        row: Option<usize>,
        column: String,
        reason: String,
    },
}

fn fmt_row(row: &Option<usize>) -> String {
    match row {
        Some(r) => format!(" at row {r}"),
        None => String::new(),
    }
}

impl PipelineError {
    pub fn configuration(
        field: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        PipelineError::Configuration {
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn schema(row: Option<usize>, column: impl Into<String>, reason: impl Into<String>) -> Self {
        PipelineError::SchemaViolation {
            row,
            column: column.into(),
            reason: reason.into(),
        }
    }
}
