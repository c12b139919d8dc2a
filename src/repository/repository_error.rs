use crate::error::*;

/// failure taxonomy of the private API client
#[derive(Debug)]
pub enum ApiError {
    /// network-level failure; the request never produced a usable response
    Transport,
    /// non-2xx response that the recovery ladder does not handle
    HttpStatus(u16),
    /// HTTP 2xx whose JSON body carries a top-level error list
    ApiLogic,
    NotFound,
    /// bad input caught before any network call
    Validation,
    /// a write appears to have landed but its id could not be confirmed
    VerificationAmbiguous,
}

impl IServiceError for ApiError {
    fn error_type(&self) -> String {
        use ApiError::*;

        match self {
            Transport => "transport_error",
            HttpStatus(_) => "http_status_error",
            ApiLogic => "api_logic_error",
            NotFound => "not_found",
            Validation => "validation_error",
            VerificationAmbiguous => "verification_ambiguous",
        }
        .to_string()
    }

    fn status_code(&self) -> http::StatusCode {
        use ApiError::*;

        match self {
            Transport => http::StatusCode::BAD_GATEWAY,
            HttpStatus(code) => http::StatusCode::from_u16(*code)
                .unwrap_or(http::StatusCode::INTERNAL_SERVER_ERROR),
            ApiLogic => http::StatusCode::BAD_GATEWAY,
            NotFound => http::StatusCode::NOT_FOUND,
            Validation => http::StatusCode::BAD_REQUEST,
            VerificationAmbiguous => http::StatusCode::ACCEPTED,
        }
    }
}
