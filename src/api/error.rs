use thiserror::Error;

/// Failure talking to the remote API.
#[derive(Error, Debug)]
pub enum RemoteError {
  #[error("Request timed out")]
  Timeout,

  #[error("Network error: {0}")]
  Network(#[from] reqwest::Error),

  #[error("Server returned {status}: {body}")]
  Status { status: u16, body: String },

  #[error("Invalid response: {0}")]
  InvalidResponse(String),

  #[error("Invalid URL: {0}")]
  InvalidUrl(#[from] url::ParseError),

  /// The record type has no parent index, so there is no parent-scoped endpoint.
  #[error("{0} records have no parent-scoped endpoint")]
  NoParentEndpoint(&'static str),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl RemoteError {
  fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LENGTH {
      return body.to_string();
    }
    let mut end = MAX_ERROR_BODY_LENGTH;
    while !body.is_char_boundary(end) {
      end -= 1;
    }
    format!(
      "{}... (truncated, {} total bytes)",
      &body[..end],
      body.len()
    )
  }

  pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
    RemoteError::Status {
      status: status.as_u16(),
      body: Self::truncate_body(body),
    }
  }

  /// Whether the server could not be reached or could not serve the request
  /// right now. Anything else is a rejection that retrying won't fix.
  pub fn is_unavailable(&self) -> bool {
    match self {
      RemoteError::Timeout | RemoteError::Network(_) => true,
      RemoteError::Status { status, .. } => *status >= 500 || matches!(*status, 408 | 429),
      _ => false,
    }
  }

  /// Classify a transport error, separating timeouts from other failures.
  pub fn from_transport(e: reqwest::Error) -> Self {
    if e.is_timeout() {
      RemoteError::Timeout
    } else {
      RemoteError::Network(e)
    }
  }
}
