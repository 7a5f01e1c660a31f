/*!
Client-credentials token provider

Exchanges the service's client id/secret for a short lived bearer token
and keeps it in the credential cache until shortly before spotify would
reject it. Requests that queued behind an exchange get its token directly,
checked against the same deadline the cache uses.
*/
use std::sync::Arc;
use std::time::Duration;

use async_mutex::Mutex;
use chrono::Utc;

use crate::cache::CredentialCache;
use crate::errors::{GatewayError, Result};
use crate::models::{BearerToken, Credentials};
use crate::transport::{send_with_retry, Transport, UpstreamRequest};
use crate::LOG;

pub const TOKEN_CACHE_KEY: &str = "spotify:client_credentials_token";
const CLIENT_CREDENTIALS_FORM: &str = "grant_type=client_credentials";

#[derive(serde::Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    token_type: Option<String>,
    expires_in: Option<u64>,
}

/// How long a token with `expires_in` seconds of validity may sit in the cache.
/// Always strictly less than `expires_in`, zero means don't cache.
pub fn cache_ttl(expires_in: u64, margin: u64) -> Duration {
    let ttl = match expires_in.saturating_sub(margin) {
        0 => expires_in / 2,
        ttl => ttl,
    };
    Duration::from_secs(ttl)
}

enum Lookup {
    Hit(BearerToken),
    Miss,
    Unavailable,
}

pub struct TokenProvider {
    credentials: Credentials,
    token_url: String,
    cache: Arc<dyn CredentialCache>,
    transport: Arc<dyn Transport>,
    expiry_margin: u64,
    // only one exchange in flight at a time. Holds the last exchanged token
    // for the requests that queued behind it, cache writes happen unlocked.
    exchange_lock: Mutex<Option<BearerToken>>,
}

impl TokenProvider {
    pub fn new(
        credentials: Credentials,
        token_url: impl Into<String>,
        cache: Arc<dyn CredentialCache>,
        transport: Arc<dyn Transport>,
        expiry_margin: u64,
    ) -> Self {
        Self {
            credentials,
            token_url: token_url.into(),
            cache,
            transport,
            expiry_margin,
            exchange_lock: Mutex::new(None),
        }
    }

    pub async fn get_token(&self) -> Result<BearerToken> {
        self.credentials.validate()?;

        let cache_reachable = match self.cached_token().await {
            Lookup::Hit(token) => return Ok(token),
            Lookup::Miss => true,
            Lookup::Unavailable => false,
        };

        let token = {
            let mut latest = self.exchange_lock.lock().await;
            if let Some(token) = latest.as_ref().filter(|t| self.still_valid(t)) {
                slog::debug!(LOG, "token filled by concurrent exchange");
                return Ok(token.clone());
            }
            // another instance may have refreshed the shared cache meanwhile
            if cache_reachable {
                if let Lookup::Hit(token) = self.cached_token().await {
                    return Ok(token);
                }
            }
            let token = self.exchange().await?;
            *latest = Some(token.clone());
            token
        };
        self.store(&token).await;
        Ok(token)
    }

    fn still_valid(&self, token: &BearerToken) -> bool {
        token.younger_than(cache_ttl(token.expires_in, self.expiry_margin))
    }

    /// Cache failures degrade to an exchange, the cache is never load bearing
    async fn cached_token(&self) -> Lookup {
        match self.cache.get(TOKEN_CACHE_KEY).await {
            Ok(Some(raw)) => match serde_json::from_str::<BearerToken>(&raw) {
                Ok(token) if !token.access_token.is_empty() => {
                    slog::debug!(
                        LOG, "token cache hit";
                        "age_seconds" => token.age().num_seconds(),
                        "expires_in" => token.expires_in,
                    );
                    Lookup::Hit(token)
                }
                Ok(_) => Lookup::Miss,
                Err(e) => {
                    slog::warn!(LOG, "ignoring undecodable cached token"; "error" => e.to_string());
                    Lookup::Miss
                }
            },
            Ok(None) => Lookup::Miss,
            Err(e) => {
                slog::warn!(LOG, "token cache lookup failed, exchanging"; "error" => e.to_string());
                Lookup::Unavailable
            }
        }
    }

    async fn store(&self, token: &BearerToken) {
        let ttl = cache_ttl(token.expires_in, self.expiry_margin);
        if ttl.as_secs() == 0 {
            return;
        }
        let raw = match serde_json::to_string(token) {
            Ok(raw) => raw,
            Err(e) => {
                slog::error!(LOG, "failed serializing token for cache"; "error" => e.to_string());
                return;
            }
        };
        if let Err(e) = self.cache.set(TOKEN_CACHE_KEY, &raw, ttl).await {
            slog::warn!(LOG, "failed caching token"; "error" => e.to_string());
        }
    }

    async fn exchange(&self) -> Result<BearerToken> {
        slog::info!(
            LOG, "exchanging client credentials for token";
            "client_id" => self.credentials.client_id(),
        );
        let req = UpstreamRequest::post(&self.token_url)
            .header("authorization", self.credentials.basic_auth())
            .header("content-type", "application/x-www-form-urlencoded")
            .body(CLIENT_CREDENTIALS_FORM);

        let resp = send_with_retry(self.transport.as_ref(), req)
            .await
            .map_err(|e| GatewayError::Auth {
                status: None,
                body: e.to_string(),
            })?;
        if !resp.is_success() {
            return Err(GatewayError::Auth {
                status: Some(resp.status),
                body: resp.body,
            });
        }

        let parsed: TokenResponse =
            serde_json::from_str(&resp.body).map_err(|e| GatewayError::Auth {
                status: Some(resp.status),
                body: format!("token json parse error {}", e),
            })?;
        let access_token = parsed
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| GatewayError::Auth {
                status: Some(resp.status),
                body: "missing access_token".into(),
            })?;
        let expires_in = parsed
            .expires_in
            .filter(|e| *e > 0)
            .ok_or_else(|| GatewayError::Auth {
                status: Some(resp.status),
                body: "missing or zero expires_in".into(),
            })?;

        Ok(BearerToken {
            access_token,
            token_type: parsed.token_type.unwrap_or_else(|| "Bearer".to_string()),
            expires_in,
            obtained_at: Utc::now(),
        })
    }
}
