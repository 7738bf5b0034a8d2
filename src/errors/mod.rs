// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! HTTP-facing error handling.
//!
//! Every error returned by a handler is a [`UserError`]:
//! - a localized message the web UI can show as-is
//! - a reference code (`ERR-YYYYMMDD-XXXXXX`) that also appears in the logs
//!
//! Internal errors surface their raw message. The service is meant to run
//! on a trusted network next to its UI.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use rand::Rng;
use serde::Serialize;

use crate::tool::ToolError;

// =============================================================================
// USER-FACING MESSAGES
// =============================================================================

pub const MSG_MISSING_URL: &str = "URL não fornecida.";
pub const MSG_BAD_SOURCE: &str = "URL inválida ou vídeo indisponível.";
pub const MSG_NO_FORMATS: &str =
    "Não foram encontrados formatos de alta qualidade para este vídeo.";
pub const MSG_INCOMPLETE_DOWNLOAD: &str = "Informações incompletas para download.";
pub const MSG_FILE_NOT_FOUND: &str = "Arquivo não encontrado.";
pub const MSG_JOB_NOT_FOUND: &str = "Tarefa não encontrada.";
pub const MSG_DOWNLOAD_FAILED: &str = "Falha no download";

// =============================================================================
// ERROR REFERENCE CODE GENERATION
// =============================================================================

/// Generate a unique error reference code.
/// Format: ERR-YYYYMMDD-XXXXXX (e.g., ERR-20240115-A3F8K2)
pub fn generate_reference_code() -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
    let date = Utc::now().format("%Y%m%d");
    let mut rng = rand::thread_rng();
    let random: String = (0..6)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect();
    format!("ERR-{}-{}", date, random)
}

// =============================================================================
// USER-FACING ERROR TYPES
// =============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "error_type", rename_all = "snake_case")]
pub enum UserError {
    /// Missing or malformed request fields (400)
    InvalidRequest {
        message: String,
        reference: String,
        field: Option<String>,
    },

    /// The external tool rejected the URL or returned unreadable metadata (400)
    BadSource { message: String, reference: String },

    /// No usable formats, unknown job, or missing file (404)
    NotFound { message: String, reference: String },

    /// Anything else (500)
    InternalError { message: String, reference: String },
}

impl UserError {
    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            UserError::InvalidRequest { .. } | UserError::BadSource { .. } => {
                StatusCode::BAD_REQUEST
            }
            UserError::NotFound { .. } => StatusCode::NOT_FOUND,
            UserError::InternalError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn reference(&self) -> &str {
        match self {
            UserError::InvalidRequest { reference, .. }
            | UserError::BadSource { reference, .. }
            | UserError::NotFound { reference, .. }
            | UserError::InternalError { reference, .. } => reference,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            UserError::InvalidRequest { message, .. }
            | UserError::BadSource { message, .. }
            | UserError::NotFound { message, .. }
            | UserError::InternalError { message, .. } => message,
        }
    }
}

/// JSON body of an error response.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: UserError,
    pub status: u16,
}

impl IntoResponse for UserError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let response = ErrorResponse {
            status: status.as_u16(),
            error: self,
        };

        let body = serde_json::to_string(&response).unwrap_or_else(|_| {
            r#"{"error":{"error_type":"internal_error","message":"Ocorreu um erro interno.","reference":"ERR-FALLBACK"},"status":500}"#.to_string()
        });

        (status, [("content-type", "application/json")], body).into_response()
    }
}

// =============================================================================
// ERROR CONSTRUCTORS (WITH LOGGING)
// =============================================================================

impl UserError {
    /// Create an InvalidRequest error.
    pub fn invalid_request(
        user_message: &str,
        field: Option<&str>,
        internal_details: Option<&str>,
    ) -> Self {
        let reference = generate_reference_code();

        tracing::warn!(
            reference = %reference,
            field = ?field,
            internal_details = internal_details.unwrap_or(""),
            "Invalid request"
        );

        Self::InvalidRequest {
            message: user_message.to_string(),
            reference,
            field: field.map(|s| s.to_string()),
        }
    }

    /// Create a BadSource error from the tool's failure details.
    pub fn bad_source(internal_details: &str) -> Self {
        let reference = generate_reference_code();

        tracing::warn!(
            reference = %reference,
            internal_details = %internal_details,
            "External tool rejected the source"
        );

        Self::BadSource {
            message: MSG_BAD_SOURCE.to_string(),
            reference,
        }
    }

    /// Create a NotFound error with a ready-made user message.
    pub fn not_found(user_message: &str) -> Self {
        let reference = generate_reference_code();

        tracing::info!(
            reference = %reference,
            detail = %user_message,
            "Resource not found"
        );

        Self::NotFound {
            message: user_message.to_string(),
            reference,
        }
    }

    /// Create an InternalError carrying the raw error text.
    pub fn internal_error(internal_error: &str) -> Self {
        let reference = generate_reference_code();

        tracing::error!(
            reference = %reference,
            internal_error = %internal_error,
            "Internal server error"
        );

        Self::InternalError {
            message: format!("Ocorreu um erro interno: {}", internal_error),
            reference,
        }
    }

    /// Create an InternalError for a download that could not be started.
    pub fn download_failed(internal_error: &str) -> Self {
        let reference = generate_reference_code();

        tracing::error!(
            reference = %reference,
            internal_error = %internal_error,
            "Download could not be started"
        );

        Self::InternalError {
            message: format!("{}: {}", MSG_DOWNLOAD_FAILED, internal_error),
            reference,
        }
    }
}

// =============================================================================
// ERROR MAPPING FROM INTERNAL ERRORS
// =============================================================================

impl From<ToolError> for UserError {
    fn from(error: ToolError) -> Self {
        if error.is_source_error() {
            UserError::bad_source(&error.to_string())
        } else {
            UserError::internal_error(&error.to_string())
        }
    }
}

/// Result type that uses UserError for the error variant.
pub type ApiResult<T> = Result<T, UserError>;

// =============================================================================
// TESTS
// =============================================================================
