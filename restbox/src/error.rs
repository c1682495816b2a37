//! Error types for REST client operations.
//!
//! Every failure surfaces as one [`Error`]. Transport failures of a coalesced
//! request reach every caller that waited on it, so [`TransportError`] is
//! cloneable; all other errors are local to the request that raised them.

use http::StatusCode;
use restbox_core::{InvalidOptions, TransportError};

use crate::converter::ConversionError;
use crate::response::RestClientResponse;

/// Error type for REST client operations.
///
/// # Examples
///
/// ```no_run
/// use restbox::{Error, RestClient};
/// # async fn run(client: RestClient) {
/// match client.get("/users/42").send().await {
///     Ok(response) => println!("{}", response.status()),
///     Err(Error::ClientStatus { status, response, .. }) => {
///         println!("rejected with {status}: {:?}", response.text());
///     }
///     Err(error) => println!("failed: {error}"),
/// }
/// # }
/// ```
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The transport failed: timeout, connection refused, unknown host.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The server answered with a `4xx` status.
    #[error("client error {status} returned for {uri}")]
    ClientStatus {
        /// Response status.
        status: StatusCode,
        /// Request URI.
        uri: String,
        /// The full response, for inspection.
        response: Box<RestClientResponse>,
    },

    /// The server answered with a `5xx` status.
    #[error("server error {status} returned for {uri}")]
    ServerStatus {
        /// Response status.
        status: StatusCode,
        /// Request URI.
        uri: String,
        /// The full response, for inspection.
        response: Box<RestClientResponse>,
    },

    /// A request or response body could not be converted.
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    /// The request or the client was configured incorrectly.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The client was closed before the request completed.
    #[error("client is closed")]
    Closed,
}

impl From<InvalidOptions> for Error {
    fn from(error: InvalidOptions) -> Self {
        Self::InvalidConfiguration(error.to_string())
    }
}

impl Error {
    /// Returns the status for [`Error::ClientStatus`] and [`Error::ServerStatus`].
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::ClientStatus { status, .. } | Self::ServerStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns the error response for [`Error::ClientStatus`] and
    /// [`Error::ServerStatus`].
    pub fn response(&self) -> Option<&RestClientResponse> {
        match self {
            Self::ClientStatus { response, .. } | Self::ServerStatus { response, .. } => {
                Some(response.as_ref())
            }
            _ => None,
        }
    }

    /// Returns `true` when the request timed out.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Transport(error) if error.is_timeout())
    }
}

/// Result alias for REST client operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;
