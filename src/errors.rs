/*!
Error kinds produced by the token provider and catalog client, and their
single translation into client-facing responses.
*/

pub type Result<T> = std::result::Result<T, GatewayError>;

/// Public message for every failure that isn't a missing playlist.
pub const TRY_LATER: &str = "try later";
pub const PLAYLIST_NOT_FOUND: &str = "playlist not found";

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("configuration error: {0}")]
    Config(String),

    /// `status` is `None` when the exchange never got an http response
    #[error("upstream auth exchange failed (status {status:?}): {body}")]
    Auth { status: Option<u16>, body: String },

    #[error("playlist not found: {0}")]
    NotFound(String),

    #[error("upstream request failed (status {status:?}): {body}")]
    Upstream { status: Option<u16>, body: String },

    #[error("unexpected upstream response shape: {0}")]
    Decode(String),
}

impl GatewayError {
    /// http status returned to the client
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::NotFound(_) => 404,
            GatewayError::Config(_)
            | GatewayError::Auth { .. }
            | GatewayError::Upstream { .. }
            | GatewayError::Decode(_) => 500,
        }
    }

    /// The only text a client ever sees. Upstream bodies and
    /// configuration details stay in the server logs.
    pub fn public_message(&self) -> &'static str {
        match self {
            GatewayError::NotFound(_) => PLAYLIST_NOT_FOUND,
            _ => TRY_LATER,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::Config(_) => "config",
            GatewayError::Auth { .. } => "auth",
            GatewayError::NotFound(_) => "not_found",
            GatewayError::Upstream { .. } => "upstream",
            GatewayError::Decode(_) => "decode",
        }
    }
}
