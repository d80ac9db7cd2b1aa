//! Validation Utilities

use validator::ValidationErrors;

use super::error::ChatError;

/// Convert validation errors to ChatError
pub fn validation_error(errors: ValidationErrors) -> ChatError {
    let messages: Vec<String> = errors
        .field_errors()
        .iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| {
                let message = e.message.clone().map(|m| m.to_string()).unwrap_or_default();
                format!("{}: {}", field, message)
            })
        })
        .collect();

    let message = messages
        .into_iter()
        .next()
        .unwrap_or_else(|| "Validation failed".into());

    ChatError::Validation(message)
}
