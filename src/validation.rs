use crate::error::AppError;
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::instrument;
use validator::Validate;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ValidationResponse {
    pub status: &'static str,
    pub errors: HashMap<String, Vec<String>>,
}

impl ValidationResponse {
    pub fn new(errors: HashMap<String, Vec<String>>) -> Self {
        Self {
            status: "error",
            errors,
        }
    }

    pub fn with_error(field: &str, message: &str) -> Self {
        let mut errors = HashMap::new();
        errors.insert(field.to_string(), vec![message.to_string()]);
        Self::new(errors)
    }
}

pub trait ToValidationResponse {
    fn to_validation_response(self) -> Custom<Json<ValidationResponse>>;
}

impl ToValidationResponse for AppError {
    #[instrument(skip(self))]
    fn to_validation_response(self) -> Custom<Json<ValidationResponse>> {
        self.log_and_record("API validation error");
        let status = self.status_code();

        let (field, message) = match &self {
            AppError::Database(db_err) => ("database", format!("Database error: {}", db_err)),
            AppError::Authentication(msg) => {
                ("authentication", format!("Authentication error: {}", msg))
            }
            AppError::NotAuthorized(msg) => {
                ("authorization", format!("Permission denied: {}", msg))
            }
            AppError::NotFound(msg) => ("resource", format!("Not found: {}", msg)),
            AppError::Validation(msg) => ("request", msg.clone()),
            AppError::InvalidStateTransition(msg) => ("state", msg.clone()),
            AppError::InvalidScheduleInput(msg) => ("schedule", msg.clone()),
            AppError::PartialFailure(msg) => ("bulk", msg.clone()),
            AppError::Internal(_) => ("server", "Internal server error".to_string()),
        };

        Custom(
            status,
            Json(ValidationResponse::with_error(field, &message)),
        )
    }
}

/// Runs validator-derived constraints on a JSON body and hands back the
/// validated inner value, or the field-keyed envelope.
pub trait JsonValidateExt<T> {
    fn validate_custom(self) -> Result<T, Custom<Json<ValidationResponse>>>;
}

impl<T: Validate> JsonValidateExt<T> for Json<T> {
    fn validate_custom(self) -> Result<T, Custom<Json<ValidationResponse>>> {
        let inner = self.into_inner();
        match inner.validate() {
            Ok(()) => Ok(inner),
            Err(errors) => {
                let mut error_map = HashMap::new();

                for (field, field_errors) in errors.field_errors() {
                    let error_messages: Vec<String> = field_errors
                        .iter()
                        .map(|error| {
                            error
                                .message
                                .clone()
                                .unwrap_or_else(|| "Invalid value".into())
                                .to_string()
                        })
                        .collect();

                    error_map.insert(field.to_string(), error_messages);
                }

                Err(Custom(
                    Status::UnprocessableEntity,
                    Json(ValidationResponse::new(error_map)),
                ))
            }
        }
    }
}

/// Converts engine errors into the envelope so every route surfaces the same
/// shape for every failure kind.
pub trait AppErrorExt<T> {
    fn validate_custom(self) -> Result<T, Custom<Json<ValidationResponse>>>;
}

impl<T> AppErrorExt<T> for Result<T, AppError> {
    fn validate_custom(self) -> Result<T, Custom<Json<ValidationResponse>>> {
        self.map_err(|err| err.to_validation_response())
    }
}
