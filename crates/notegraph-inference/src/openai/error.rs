//! OpenAI-specific error handling.

use notegraph_core::Error;

/// Which call failed; decides the error variant for generic failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Embeddings,
    ChatCompletions,
}

/// OpenAI-specific error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenAIErrorCode {
    /// Invalid authentication credentials.
    AuthenticationError,
    /// Rate limit exceeded.
    RateLimitExceeded,
    /// Model not found or not available.
    ModelNotFound,
    /// Request too large.
    ContextLengthExceeded,
    /// Server error.
    ServerError,
    /// Unknown error.
    Unknown,
}

impl OpenAIErrorCode {
    /// Determine error code from HTTP status and error type.
    pub fn from_response(status: u16, error_type: &str) -> Self {
        match (status, error_type) {
            (401, _) => Self::AuthenticationError,
            (429, _) => Self::RateLimitExceeded,
            (404, _) | (_, "model_not_found") => Self::ModelNotFound,
            (400, _) if error_type.contains("context_length") => Self::ContextLengthExceeded,
            (500..=599, _) => Self::ServerError,
            _ => Self::Unknown,
        }
    }

    /// Whether the same request may succeed later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimitExceeded | Self::ServerError)
    }
}

/// Convert an API failure to a notegraph error.
pub fn to_notegraph_error(code: OpenAIErrorCode, endpoint: Endpoint, message: &str) -> Error {
    let generic = |msg: String| match endpoint {
        Endpoint::Embeddings => Error::Embedding(msg),
        Endpoint::ChatCompletions => Error::Inference(msg),
    };
    match code {
        OpenAIErrorCode::AuthenticationError => {
            Error::Config(format!("Authentication failed: {}", message))
        }
        OpenAIErrorCode::ModelNotFound => Error::Config(format!("Model not found: {}", message)),
        OpenAIErrorCode::RateLimitExceeded => generic(format!("Rate limit exceeded: {}", message)),
        OpenAIErrorCode::ContextLengthExceeded => {
            generic(format!("Context too long: {}", message))
        }
        OpenAIErrorCode::ServerError => generic(format!("Server error: {}", message)),
        OpenAIErrorCode::Unknown => generic(message.to_string()),
    }
}

/// Convert a transport failure, keeping timeouts distinguishable.
pub fn transport_error(err: reqwest::Error, endpoint: Endpoint) -> Error {
    if err.is_timeout() {
        return Error::Timeout(format!("{:?} request timed out: {}", endpoint, err));
    }
    match endpoint {
        Endpoint::Embeddings => Error::Embedding(format!("Request failed: {}", err)),
        Endpoint::ChatCompletions => Error::Inference(format!("Request failed: {}", err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_from_status() {
        assert_eq!(
            OpenAIErrorCode::from_response(401, "invalid_api_key"),
            OpenAIErrorCode::AuthenticationError
        );
        assert_eq!(
            OpenAIErrorCode::from_response(429, "rate_limit_exceeded"),
            OpenAIErrorCode::RateLimitExceeded
        );
        assert_eq!(
            OpenAIErrorCode::from_response(404, "model_not_found"),
            OpenAIErrorCode::ModelNotFound
        );
        assert_eq!(
            OpenAIErrorCode::from_response(400, "context_length_exceeded"),
            OpenAIErrorCode::ContextLengthExceeded
        );
        assert_eq!(
            OpenAIErrorCode::from_response(502, "bad_gateway"),
            OpenAIErrorCode::ServerError
        );
        assert_eq!(
            OpenAIErrorCode::from_response(418, "im_a_teapot"),
            OpenAIErrorCode::Unknown
        );
    }

    #[test]
    fn test_retryable() {
        assert!(OpenAIErrorCode::RateLimitExceeded.is_retryable());
        assert!(OpenAIErrorCode::ServerError.is_retryable());
        assert!(!OpenAIErrorCode::AuthenticationError.is_retryable());
        assert!(!OpenAIErrorCode::ModelNotFound.is_retryable());
    }

    #[test]
    fn test_endpoint_decides_variant() {
        let err = to_notegraph_error(OpenAIErrorCode::ServerError, Endpoint::Embeddings, "boom");
        assert!(matches!(err, Error::Embedding(_)));
        let err = to_notegraph_error(
            OpenAIErrorCode::ServerError,
            Endpoint::ChatCompletions,
            "boom",
        );
        assert!(matches!(err, Error::Inference(_)));
    }

    #[test]
    fn test_auth_is_config_error() {
        let err = to_notegraph_error(
            OpenAIErrorCode::AuthenticationError,
            Endpoint::ChatCompletions,
            "Invalid key",
        );
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("Authentication failed"));
    }
}
