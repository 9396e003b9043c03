//! Validated JSON extractor.
//!
//! [`ValidateJson`] deserializes like [`Json`] and then runs the body's
//! `validator` rules, answering 400 with one readable message per failure.

use std::borrow::Cow;
use std::collections::HashMap;

use axum::extract::{FromRequest, Request};
use derive_more::{Deref, DerefMut, From};
use serde::de::DeserializeOwned;
use serde_json::Value;
use validator::{Validate, ValidationError, ValidationErrors};

use super::Json;
use crate::handler::{Error, ErrorKind};
use crate::utility::TRACING_TARGET_VALIDATION;

/// JSON extractor that validates the body after deserializing it.
#[must_use]
#[derive(Debug, Clone, Copy, Default, Deref, DerefMut, From)]
pub struct ValidateJson<T>(pub T);

impl<T> ValidateJson<T> {
    #[inline]
    pub fn new(inner: T) -> Self {
        Self(inner)
    }

    #[inline]
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T, S> FromRequest<S> for ValidateJson<T>
where
    T: DeserializeOwned + Validate + 'static,
    S: Send + Sync,
{
    type Rejection = Error<'static>;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(data) = <Json<T> as FromRequest<S>>::from_request(req, state).await?;
        data.validate()?;
        Ok(Self::new(data))
    }
}

type Params = HashMap<Cow<'static, str>, Value>;

fn number(params: &Params, key: &str) -> Option<f64> {
    params.get(key).and_then(Value::as_f64)
}

/// Formats length validation errors; collections count items, text counts characters.
fn format_length_error(field: &str, params: &Params) -> String {
    let unit = if field.ends_with("history") {
        "items"
    } else {
        "characters"
    };

    match (number(params, "min"), number(params, "max")) {
        (Some(min), Some(max)) => format!(
            "Field '{}' must be between {} and {} {} long",
            field, min as u64, max as u64, unit
        ),
        (Some(min), None) => {
            format!("Field '{}' must be at least {} {} long", field, min as u64, unit)
        }
        (None, Some(max)) => {
            format!("Field '{}' must be at most {} {} long", field, max as u64, unit)
        }
        (None, None) => format!("Field '{}' has invalid length", field),
    }
}

fn format_range_error(field: &str, params: &Params) -> String {
    match (number(params, "min"), number(params, "max")) {
        (Some(min), Some(max)) => {
            format!("Field '{}' must be between {} and {}", field, min, max)
        }
        (Some(min), None) => format!("Field '{}' must be at least {}", field, min),
        (None, Some(max)) => format!("Field '{}' must be at most {}", field, max),
        (None, None) => format!("Field '{}' is out of valid range", field),
    }
}

fn format_validation_error(field: &str, error: &ValidationError) -> String {
    if let Some(custom_message) = &error.message {
        return format!("Field '{}': {}", field, custom_message);
    }

    match error.code.as_ref() {
        "length" => format_length_error(field, &error.params),
        "range" => format_range_error(field, &error.params),
        "required" => format!("Field '{}' is required and cannot be empty", field),
        code => format!("Field '{}' failed validation: {}", field, code),
    }
}

impl From<ValidationErrors> for Error<'static> {
    fn from(errors: ValidationErrors) -> Self {
        let mut messages: Vec<String> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, field_errors)| {
                field_errors
                    .iter()
                    .map(move |error| format_validation_error(field, error))
            })
            .collect();
        messages.sort();

        let user_message = match messages.as_slice() {
            [] => "Validation failed".to_owned(),
            [single] => single.clone(),
            multiple => multiple.join(". "),
        };

        tracing::warn!(
            target: TRACING_TARGET_VALIDATION,
            errors = ?errors.field_errors(),
            "request validation failed"
        );

        ErrorKind::BadRequest
            .with_message(user_message)
            .with_resource("request")
    }
}

impl<T> aide::OperationInput for ValidateJson<T>
where
    T: schemars::JsonSchema,
{
    fn operation_input(
        ctx: &mut aide::generate::GenContext,
        operation: &mut aide::openapi::Operation,
    ) {
        Json::<T>::operation_input(ctx, operation);
    }

    fn inferred_early_responses(
        ctx: &mut aide::generate::GenContext,
        operation: &mut aide::openapi::Operation,
    ) -> Vec<(Option<u16>, aide::openapi::Response)> {
        Json::<T>::inferred_early_responses(ctx, operation)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn length_error(min: Option<u64>, max: Option<u64>) -> ValidationError {
        let mut error = ValidationError::new("length");
        if let Some(min) = min {
            error.add_param(Cow::Borrowed("min"), &min);
        }
        if let Some(max) = max {
            error.add_param(Cow::Borrowed("max"), &max);
        }
        error
    }

    #[test]
    fn length_message_counts_characters() {
        let message = format_validation_error("message", &length_error(Some(1), Some(32000)));
        assert_eq!(
            message,
            "Field 'message' must be between 1 and 32000 characters long"
        );
    }

    #[test]
    fn length_message_counts_history_items() {
        let message = format_validation_error("chat_history", &length_error(None, Some(100)));
        assert_eq!(message, "Field 'chat_history' must be at most 100 items long");
    }

    #[test]
    fn custom_message_wins() {
        let error = ValidationError::new("blank").with_message(Cow::Borrowed("must not be blank"));
        assert_eq!(
            format_validation_error("message", &error),
            "Field 'message': must not be blank"
        );
    }

    #[test]
    fn range_message() {
        let mut error = ValidationError::new("range");
        error.add_param(Cow::Borrowed("min"), &json!(0.0));
        error.add_param(Cow::Borrowed("max"), &json!(2.0));
        assert_eq!(
            format_validation_error("temperature", &error),
            "Field 'temperature' must be between 0 and 2"
        );
    }

    #[test]
    fn validation_errors_become_bad_request() {
        let mut errors = ValidationErrors::new();
        errors.add("message", length_error(Some(1), Some(32000)));

        let error = Error::from(errors);
        assert_eq!(error.kind(), ErrorKind::BadRequest);
        assert_eq!(error.resource(), Some("request"));
        assert!(error.message().is_some_and(|m| m.contains("'message'")));
    }
}
