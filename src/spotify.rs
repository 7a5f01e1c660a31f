use std::sync::Arc;

use crate::errors::{GatewayError, Result};
use crate::models::{BearerToken, Playlist};
use crate::transport::{send_with_retry, Transport, UpstreamRequest};
use crate::LOG;

/// Spotify ids are base62, anything else can't name a playlist
pub fn is_valid_playlist_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric())
}

pub struct CatalogClient {
    api_url: String,
    default_playlist_id: String,
    transport: Arc<dyn Transport>,
}

impl CatalogClient {
    pub fn new(
        api_url: impl Into<String>,
        default_playlist_id: impl Into<String>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            default_playlist_id: default_playlist_id.into(),
            transport,
        }
    }

    pub fn default_playlist_id(&self) -> &str {
        &self.default_playlist_id
    }

    pub async fn fetch_default_playlist(&self, token: &BearerToken) -> Result<Playlist> {
        self.fetch_playlist(&self.default_playlist_id, token).await
    }

    pub async fn fetch_playlist(&self, playlist_id: &str, token: &BearerToken) -> Result<Playlist> {
        if !is_valid_playlist_id(playlist_id) {
            return Err(GatewayError::NotFound(playlist_id.to_string()));
        }

        let url = format!("{}/playlists/{}", self.api_url, playlist_id);
        let req = UpstreamRequest::get(url).header("authorization", token.authorization());
        let resp = send_with_retry(self.transport.as_ref(), req)
            .await
            .map_err(|e| GatewayError::Upstream {
                status: None,
                body: e.to_string(),
            })?;

        match resp.status {
            404 => return Err(GatewayError::NotFound(playlist_id.to_string())),
            s if !resp.is_success() => {
                return Err(GatewayError::Upstream {
                    status: Some(s),
                    body: resp.body,
                })
            }
            _ => (),
        }

        let playlist: Playlist = serde_json::from_str(&resp.body)
            .map_err(|e| GatewayError::Decode(format!("playlist {}: {}", playlist_id, e)))?;
        if playlist.id.is_empty() {
            return Err(GatewayError::Decode(format!(
                "playlist {}: empty id",
                playlist_id
            )));
        }
        slog::debug!(
            LOG, "fetched playlist";
            "playlist_id" => playlist_id,
            "tracks" => playlist.track_count(),
        );
        Ok(playlist)
    }
}
