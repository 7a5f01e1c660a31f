//! Test doubles for the upstream transport and the credential cache
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::cache::{CacheError, CredentialCache};
use crate::transport::{Transport, TransportError, UpstreamRequest, UpstreamResponse};

type Canned = Result<UpstreamResponse, TransportError>;

/// Replays queued responses in order and records every request it sees.
/// Runs dry with a network error so an unexpected call fails loudly.
#[derive(Default)]
pub struct MockTransport {
    responses: Mutex<VecDeque<Canned>>,
    requests: Mutex<Vec<UpstreamRequest>>,
    delay: Option<Duration>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn push_ok(&self, status: u16, body: &str) {
        self.responses.lock().unwrap().push_back(Ok(UpstreamResponse {
            status,
            body: body.to_string(),
        }));
    }

    pub fn push_err(&self, err: TransportError) {
        self.responses.lock().unwrap().push_back(Err(err));
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<UpstreamRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Transport for MockTransport {
    async fn send(&self, req: UpstreamRequest) -> Result<UpstreamResponse, TransportError> {
        self.requests.lock().unwrap().push(req);
        let next = self.responses.lock().unwrap().pop_front();
        if let Some(delay) = self.delay {
            async_std::task::sleep(delay).await;
        }
        next.unwrap_or_else(|| Err(TransportError::Network("no canned response".into())))
    }
}

/// A store that is always down
#[derive(Default)]
pub struct FailingCache {
    calls: AtomicUsize,
}

impl FailingCache {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl CredentialCache for FailingCache {
    async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(CacheError::Unavailable("connection refused".into()))
    }

    async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<(), CacheError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(CacheError::Unavailable("connection refused".into()))
    }
}

/// A store that answers every call with a timeout, after sleeping for
/// `get_delay` or `set_delay`
#[derive(Default)]
pub struct SlowCache {
    pub get_delay: Duration,
    pub set_delay: Duration,
    calls: AtomicUsize,
}

impl SlowCache {
    pub fn new(get_delay: Duration, set_delay: Duration) -> Self {
        Self {
            get_delay,
            set_delay,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl CredentialCache for SlowCache {
    async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        async_std::task::sleep(self.get_delay).await;
        Err(CacheError::Timeout)
    }

    async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<(), CacheError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        async_std::task::sleep(self.set_delay).await;
        Err(CacheError::Timeout)
    }
}

/// Records the ttl of every `set` so tests can check the safety margin
#[derive(Default)]
pub struct RecordingCache {
    entries: Mutex<Vec<(String, String, Duration)>>,
}

impl RecordingCache {
    pub fn sets(&self) -> Vec<(String, String, Duration)> {
        self.entries.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl CredentialCache for RecordingCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(k, _, _)| k == key)
            .map(|(_, v, _)| v.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        self.entries
            .lock()
            .unwrap()
            .push((key.to_string(), value.to_string(), ttl));
        Ok(())
    }
}

pub const TOKEN_BODY: &str = r#"{"access_token":"abc","token_type":"Bearer","expires_in":3600}"#;

pub fn playlist_body(id: &str, track_names: &[&str]) -> String {
    let items: Vec<serde_json::Value> = track_names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            serde_json::json!({
                "added_at": "2023-01-01T00:00:00Z",
                "track": {
                    "name": name,
                    "duration_ms": 180_000 + i as u64,
                    "external_urls": {"spotify": format!("https://open.spotify.com/track/{}", i)},
                    "artists": [{
                        "id": format!("artist{}", i),
                        "name": format!("Artist {}", i),
                        "external_urls": {"spotify": format!("https://open.spotify.com/artist/{}", i)}
                    }],
                    "album": {
                        "id": format!("album{}", i),
                        "name": format!("Album {}", i),
                        "external_urls": {"spotify": format!("https://open.spotify.com/album/{}", i)},
                        "release_date": "2020-02-02",
                        "artists": []
                    },
                    "popularity": 50
                }
            })
        })
        .collect();
    serde_json::json!({
        "id": id,
        "name": "Test Playlist",
        "public": true,
        "external_urls": {"spotify": format!("https://open.spotify.com/playlist/{}", id)},
        "owner": {
            "id": "owner",
            "display_name": "Owner",
            "external_urls": {"spotify": "https://open.spotify.com/user/owner"}
        },
        "tracks": {"total": items.len(), "items": items}
    })
    .to_string()
}
