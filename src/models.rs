use chrono::{DateTime, Utc};

use crate::errors::{GatewayError, Result};

/// Long lived client credentials used for the client-credentials exchange.
#[derive(Clone)]
pub struct Credentials {
    client_id: String,
    client_secret: String,
}

impl Credentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(GatewayError::Config("missing spotify client id".into()));
        }
        if self.client_secret.trim().is_empty() {
            return Err(GatewayError::Config("missing spotify client secret".into()));
        }
        Ok(())
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Value of the `authorization` header sent to the token endpoint
    pub fn basic_auth(&self) -> String {
        let auth = base64::encode(format!("{}:{}", self.client_id, self.client_secret).as_bytes());
        format!("Basic {}", auth)
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BearerToken {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    #[serde(default = "Utc::now")]
    pub obtained_at: DateTime<Utc>,
}

impl BearerToken {
    pub fn authorization(&self) -> String {
        format!("Bearer {}", self.access_token)
    }

    pub fn age(&self) -> chrono::Duration {
        Utc::now().signed_duration_since(self.obtained_at)
    }

    /// A token stamped in the future (clock skew) counts as young
    pub fn younger_than(&self, limit: std::time::Duration) -> bool {
        self.age().to_std().map(|age| age < limit).unwrap_or(true)
    }
}

impl std::fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerToken")
            .field("access_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("obtained_at", &self.obtained_at)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ExternalUrls {
    // local files come back with an empty object
    #[serde(default)]
    pub spotify: Option<String>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Owner {
    pub id: String,
    pub display_name: Option<String>,
    pub external_urls: ExternalUrls,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Artist {
    pub id: Option<String>,
    pub name: String,
    pub external_urls: ExternalUrls,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Album {
    pub id: Option<String>,
    pub name: String,
    pub external_urls: ExternalUrls,
    pub release_date: Option<String>,
    pub artists: Vec<Artist>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Track {
    pub name: String,
    pub duration_ms: u64,
    pub external_urls: ExternalUrls,
    pub artists: Vec<Artist>,
    pub album: Album,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PlaylistItem {
    // null for tracks that were removed from the catalog, kept so
    // positions line up with what spotify reports
    pub track: Option<Track>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Tracks {
    pub items: Vec<PlaylistItem>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Playlist {
    pub id: String,
    pub name: String,
    pub external_urls: ExternalUrls,
    pub owner: Owner,
    pub tracks: Tracks,
}

impl Playlist {
    pub fn track_count(&self) -> usize {
        self.tracks.items.len()
    }
}
