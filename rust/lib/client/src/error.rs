/// Request-layer error.
///
/// A 401 is reported as [`ApiError::Unauthorized`] and never retried against
/// another endpoint; the caller decides whether to end the session.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("HTTP {status}: {message}")]
    Server { status: u16, message: String },

    #[error("network: {0}")]
    Network(#[from] reqwest::Error),

    #[error("auth: {0}")]
    Auth(String),

    #[error("decode: {0}")]
    Decode(String),

    #[error("all {attempts} endpoints failed, last: {last}")]
    Exhausted { attempts: usize, last: Box<ApiError> },

    #[error("transport: {0}")]
    Transport(String),
}

impl ApiError {
    pub fn is_unauthorized(&self) -> bool {
        match self {
            ApiError::Unauthorized => true,
            ApiError::Exhausted { last, .. } => last.is_unauthorized(),
            _ => false,
        }
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized => Some(401),
            ApiError::Server { status, .. } => Some(*status),
            ApiError::Network(e) => e.status().map(|s| s.as_u16()),
            ApiError::Exhausted { last, .. } => last.status(),
            _ => None,
        }
    }
}

/// Human-readable message from an error response body.
///
/// Looks at `message`, `detail`, then `error.message`; anything else becomes
/// "Request failed with status N".
pub fn server_message(status: u16, body: &str) -> String {
    let found = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            ["/message", "/detail", "/error/message"]
                .iter()
                .find_map(|p| v.pointer(p).and_then(non_empty_str))
        });
    found.unwrap_or_else(|| format!("Request failed with status {status}"))
}

fn non_empty_str(v: &serde_json::Value) -> Option<String> {
    v.as_str().filter(|s| !s.is_empty()).map(str::to_string)
}
