/*!
Credential cache

The token provider only needs `get` and `set` with a ttl from whatever
store holds the current bearer token. Expiry of cached entries is
enforced here, by the store.
*/
use std::time::{Duration, Instant};

use async_mutex::Mutex;
use cached::stores::TimedCache;
use cached::Cached;
use redis::aio::MultiplexedConnection;

use crate::LOG;

#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),

    #[error("cache operation timed out")]
    Timeout,
}

#[async_trait::async_trait]
pub trait CredentialCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;
}

#[derive(Clone)]
struct Entry {
    value: String,
    expires: Instant,
}

/// In-process cache used when no shared store is configured.
///
/// `TimedCache` evicts everything older than `max_lifespan`, each entry
/// additionally carries the deadline derived from its own ttl.
pub struct MemoryCache {
    inner: Mutex<TimedCache<String, Entry>>,
}

impl MemoryCache {
    pub fn new(max_lifespan: Duration) -> Self {
        Self {
            inner: Mutex::new(TimedCache::with_lifespan(max_lifespan.as_secs().max(1))),
        }
    }
}

#[async_trait::async_trait]
impl CredentialCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut lock = self.inner.lock().await;
        let key = key.to_string();
        match lock.cache_get(&key) {
            None => return Ok(None),
            Some(entry) if entry.expires > Instant::now() => return Ok(Some(entry.value.clone())),
            Some(_) => {}
        }
        lock.cache_remove(&key);
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut lock = self.inner.lock().await;
        lock.cache_set(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires: Instant::now() + ttl,
            },
        );
        Ok(())
    }
}

/// How long a failed redis is left alone before the next connect attempt
const RETRY_AFTER: Duration = Duration::from_secs(5);

#[derive(Default)]
struct RedisState {
    con: Option<MultiplexedConnection>,
    down_until: Option<Instant>,
}

/// Shared redis store, the same one every gateway instance talks to.
///
/// One multiplexed connection is shared by every request. Each command is
/// bounded by `timeout`, and after any failure the store reports itself
/// unavailable for `RETRY_AFTER` without touching the network, so a hung
/// redis costs at most one timeout per window.
pub struct RedisCache {
    client: redis::Client,
    timeout: Duration,
    state: Mutex<RedisState>,
}

/// Split `host:port`, defaulting to the standard redis port
fn parse_addr(addr: &str) -> anyhow::Result<(String, u16)> {
    let addr = addr.trim();
    match addr.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() => {
            let port = port
                .parse::<u16>()
                .map_err(|e| anyhow::anyhow!("invalid redis port in {:?}: {}", addr, e))?;
            Ok((host.to_string(), port))
        }
        Some(_) => Err(anyhow::anyhow!("invalid redis address {:?}", addr)),
        None if addr.is_empty() => Err(anyhow::anyhow!("empty redis address")),
        None => Ok((addr.to_string(), 6379)),
    }
}

fn get_cmd(key: &str) -> redis::Cmd {
    let mut cmd = redis::cmd("GET");
    cmd.arg(key);
    cmd
}

/// `SET key value EX secs`, redis rejects a zero expiry
fn set_cmd(key: &str, value: &str, ttl: Duration) -> redis::Cmd {
    let mut cmd = redis::cmd("SET");
    cmd.arg(key).arg(value).arg("EX").arg(ttl.as_secs().max(1));
    cmd
}

impl RedisCache {
    /// `timeout` bounds every connect and command
    pub fn open(addr: &str, password: Option<String>, timeout: Duration) -> anyhow::Result<Self> {
        let (host, port) = parse_addr(addr)?;
        let info = redis::ConnectionInfo {
            addr: redis::ConnectionAddr::Tcp(host, port),
            redis: redis::RedisConnectionInfo {
                db: 0,
                username: None,
                password: password.filter(|p| !p.is_empty()),
            },
        };
        let client = redis::Client::open(info)?;
        Ok(Self {
            client,
            timeout,
            state: Mutex::new(RedisState::default()),
        })
    }

    async fn connection(&self) -> Result<MultiplexedConnection, CacheError> {
        let mut state = self.state.lock().await;
        if let Some(until) = state.down_until {
            if Instant::now() < until {
                return Err(CacheError::Unavailable("backing off after a failure".into()));
            }
            state.down_until = None;
        }
        if let Some(con) = &state.con {
            return Ok(con.clone());
        }
        let connect = self.client.get_multiplexed_async_connection();
        let err = match async_std::future::timeout(self.timeout, connect).await {
            Ok(Ok(con)) => {
                state.con = Some(con.clone());
                return Ok(con);
            }
            Ok(Err(e)) => CacheError::Unavailable(e.to_string()),
            Err(_) => CacheError::Timeout,
        };
        state.down_until = Some(Instant::now() + RETRY_AFTER);
        Err(err)
    }

    async fn mark_down(&self) {
        let mut state = self.state.lock().await;
        state.con = None;
        state.down_until = Some(Instant::now() + RETRY_AFTER);
    }

    async fn query<T: redis::FromRedisValue>(&self, cmd: redis::Cmd) -> Result<T, CacheError> {
        let mut con = self.connection().await?;
        let err = match async_std::future::timeout(self.timeout, cmd.query_async::<_, T>(&mut con)).await
        {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => CacheError::Unavailable(e.to_string()),
            Err(_) => CacheError::Timeout,
        };
        slog::warn!(LOG, "redis command failed, pausing cache use"; "error" => err.to_string());
        self.mark_down().await;
        Err(err)
    }

    /// Startup probe, mirrors the connectivity check done before serving
    pub async fn ping(&self) -> Result<(), CacheError> {
        let pong: String = self.query(redis::cmd("PING")).await?;
        if pong != "PONG" {
            return Err(CacheError::Unavailable(format!("unexpected ping reply {}", pong)));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl CredentialCache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.query(get_cmd(key)).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        self.query(set_cmd(key, value, ttl)).await
    }
}
