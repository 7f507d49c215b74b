use thiserror::Error;

/// Typed error enum for remote sync API operations, differentiating failure
/// modes so retry strategy can key off transience.
#[derive(Error, Debug, Clone)]
pub enum SyncApiError {
    /// Authentication failed (401, 403). Permanent until the token refreshes.
    #[error("Authentication failed: {message} (status: {status})")]
    Authentication { status: u16, message: String },

    /// Rate limiting (429). Retried after the server-requested delay.
    #[error("Rate limited: {message} (retry after: {retry_after:?}s)")]
    RateLimit {
        message: String,
        retry_after: Option<u64>,
    },

    /// Conflict (409). The only retryable 4xx.
    #[error("Conflict: {message} (retry after: {retry_after_ms:?}ms)")]
    Conflict {
        message: String,
        retry_after_ms: Option<u64>,
    },

    /// Server error (500+). Transient.
    #[error("Server error: {message} (status: {status})")]
    ServerError { status: u16, message: String },

    /// Other client errors (400-499). Permanent; the operation is dropped.
    #[error("Client error: {message} (status: {status})")]
    ClientError { status: u16, message: String },

    /// Transport failures (timeout, connection refused). Transient.
    #[error("Network error: {0}")]
    Network(String),

    /// Malformed response body.
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("API error: {0}")]
    Other(String),
}

impl SyncApiError {
    /// Whether a retry with the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SyncApiError::Network(_)
                | SyncApiError::ServerError { .. }
                | SyncApiError::RateLimit { .. }
                | SyncApiError::Conflict { .. }
        )
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, SyncApiError::Authentication { .. })
    }

    /// Server-requested delay in seconds, if any.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            SyncApiError::RateLimit { retry_after, .. } => *retry_after,
            SyncApiError::Conflict { retry_after_ms, .. } => {
                retry_after_ms.map(|ms| ms.div_ceil(1000))
            }
            _ => None,
        }
    }

    pub fn from_reqwest(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            SyncApiError::Network(format!("Request timeout: {}", error))
        } else if error.is_connect() {
            SyncApiError::Network(format!("Connection failed: {}", error))
        } else if error.is_request() {
            SyncApiError::Network(format!("Request error: {}", error))
        } else {
            SyncApiError::Other(error.to_string())
        }
    }

    /// Map an HTTP status and body to the right variant. `retry_after` is the
    /// parsed `Retry-After` header, `retry_after_ms` comes from a 409 body.
    pub fn from_status(
        status: u16,
        body: String,
        retry_after: Option<u64>,
        retry_after_ms: Option<u64>,
    ) -> Self {
        match status {
            401 | 403 => SyncApiError::Authentication {
                status,
                message: body,
            },
            429 => SyncApiError::RateLimit {
                message: body,
                retry_after,
            },
            409 => SyncApiError::Conflict {
                message: body,
                retry_after_ms,
            },
            400..=499 => SyncApiError::ClientError {
                status,
                message: body,
            },
            500..=599 => SyncApiError::ServerError {
                status,
                message: body,
            },
            _ => SyncApiError::Other(format!("HTTP {}: {}", status, body)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transience_classification() {
        assert!(SyncApiError::Network("refused".into()).is_transient());
        assert!(
            SyncApiError::ServerError {
                status: 503,
                message: String::new()
            }
            .is_transient()
        );
        assert!(
            SyncApiError::RateLimit {
                message: String::new(),
                retry_after: Some(2)
            }
            .is_transient()
        );
        assert!(
            SyncApiError::Conflict {
                message: String::new(),
                retry_after_ms: None
            }
            .is_transient()
        );
        assert!(
            !SyncApiError::Authentication {
                status: 401,
                message: String::new()
            }
            .is_transient()
        );
        assert!(
            !SyncApiError::ClientError {
                status: 422,
                message: String::new()
            }
            .is_transient()
        );
    }

    #[test]
    fn status_mapping() {
        assert!(SyncApiError::from_status(401, String::new(), None, None).is_auth());
        assert!(matches!(
            SyncApiError::from_status(429, String::new(), Some(7), None),
            SyncApiError::RateLimit {
                retry_after: Some(7),
                ..
            }
        ));
        assert!(matches!(
            SyncApiError::from_status(409, String::new(), None, Some(1500)),
            SyncApiError::Conflict {
                retry_after_ms: Some(1500),
                ..
            }
        ));
        assert!(matches!(
            SyncApiError::from_status(422, String::new(), None, None),
            SyncApiError::ClientError { status: 422, .. }
        ));
    }

    #[test]
    fn conflict_retry_after_rounds_up() {
        let err = SyncApiError::Conflict {
            message: String::new(),
            retry_after_ms: Some(1500),
        };
        assert_eq!(err.retry_after(), Some(2));
    }
}
