use slog::o;
use slog::Drain;
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;
use std::{env, fs};

mod cache;
mod errors;
mod logging;
mod models;
mod service;
mod spotify;
#[cfg(test)]
mod testing;
mod token;
mod transport;

fn env_or(k: &str, default: &str) -> String {
    env::var(k).unwrap_or_else(|_| default.to_string())
}

fn env_opt(k: &str) -> Option<String> {
    env::var(k).ok().filter(|v| !v.trim().is_empty())
}

lazy_static::lazy_static! {
    pub static ref CONFIG: Config = Config::load();

    // The "base" logger that all modules should branch off of
    pub static ref BASE_LOG: slog::Logger = {
        let level: slog::Level = CONFIG.log_level
                .parse()
                .unwrap_or(slog::Level::Info);
        if CONFIG.log_format == "pretty" {
            let decorator = slog_term::TermDecorator::new().build();
            let drain = slog_term::CompactFormat::new(decorator).build().fuse();
            let drain = slog_async::Async::new(drain).build().fuse();
            let drain = slog::LevelFilter::new(drain, level).fuse();
            slog::Logger::root(drain, o!())
        } else {
            let drain = slog_json::Json::default(std::io::stderr()).fuse();
            let drain = slog_async::Async::new(drain).build().fuse();
            let drain = slog::LevelFilter::new(drain, level).fuse();
            slog::Logger::root(drain, o!())
        }
    };

    // Base logger
    pub static ref LOG: slog::Logger = BASE_LOG.new(slog::o!("app" => "playlist-gateway"));
}

/// Build a json response. `json => value` serializes `value` with a 200,
/// `status => code, message => msg` produces the `{"error": msg}` body
/// every failure is reported with.
#[macro_export]
macro_rules! resp {
    (json => $obj:expr) => {{
        tide::Response::builder(200)
            .body(tide::Body::from_json(&$obj)?)
            .build()
    }};
    (status => $status:expr, message => $msg:expr) => {{
        tide::Response::builder($status)
            .body(serde_json::json!({ "error": $msg }))
            .build()
    }};
}

pub struct Config {
    pub version: String,
    pub host: String,
    pub port: u16,
    pub log_format: String,
    pub log_level: String,
    pub spotify_client_id: String,
    pub spotify_client_secret: String,
    pub spotify_token_url: String,
    pub spotify_api_url: String,
    pub default_playlist_id: String,
    pub redis_addr: Option<String>,
    pub redis_password: Option<String>,
    pub request_timeout_seconds: u64,
    pub cache_timeout_millis: u64,
    pub token_expiry_margin_seconds: u64,
    pub cors_allow_origin: String,
}
impl Config {
    pub fn load() -> Self {
        let version = fs::File::open("commit_hash.txt")
            .and_then(|mut f| {
                let mut s = String::new();
                f.read_to_string(&mut s)?;
                Ok(s.trim().to_string())
            })
            .unwrap_or_else(|_| "unknown".to_string());
        Self {
            version,
            host: env_or("HOST", "0.0.0.0"),
            port: env_or("PORT", "8080").parse().expect("invalid port"),
            log_format: env_or("LOG_FORMAT", "json")
                .to_lowercase()
                .trim()
                .to_string(),
            log_level: env_or("LOG_LEVEL", "INFO"),
            spotify_client_id: env_or("SPOTIFY_CLIENT_ID", ""),
            spotify_client_secret: env_or("SPOTIFY_CLIENT_SECRET", ""),
            spotify_token_url: env_or(
                "SPOTIFY_TOKEN_URL",
                "https://accounts.spotify.com/api/token",
            ),
            spotify_api_url: env_or("SPOTIFY_API_URL", "https://api.spotify.com/v1"),
            default_playlist_id: env_or("DEFAULT_PLAYLIST_ID", "0cwPcui7aGHkmfHZiD3Hb9"),
            redis_addr: env_opt("REDIS_ADDR"),
            redis_password: env_opt("REDIS_PASSWORD"),
            request_timeout_seconds: env_or("REQUEST_TIMEOUT_SECONDS", "10")
                .parse()
                .expect("invalid request_timeout_seconds"),
            cache_timeout_millis: env_or("CACHE_TIMEOUT_MILLIS", "250")
                .parse()
                .expect("invalid cache_timeout_millis"),
            token_expiry_margin_seconds: env_or("TOKEN_EXPIRY_MARGIN_SECONDS", "60")
                .parse()
                .expect("invalid token_expiry_margin_seconds"),
            cors_allow_origin: env_or("CORS_ALLOW_ORIGIN", "http://localhost:8081"),
        }
    }
    pub fn initialize(&self) -> anyhow::Result<()> {
        slog::info!(
            LOG, "initialized config";
            "version" => &CONFIG.version,
            "host" => &CONFIG.host,
            "port" => &CONFIG.port,
            "log_format" => &CONFIG.log_format,
            "log_level" => &CONFIG.log_level,
            "spotify_api_url" => &CONFIG.spotify_api_url,
            "default_playlist_id" => &CONFIG.default_playlist_id,
            "cache" => if CONFIG.redis_addr.is_some() { "redis" } else { "memory" },
            "request_timeout_seconds" => CONFIG.request_timeout_seconds,
            "cache_timeout_millis" => CONFIG.cache_timeout_millis,
        );
        if self.request_timeout_seconds == 0 {
            anyhow::bail!("REQUEST_TIMEOUT_SECONDS must be greater than zero");
        }
        if self.cache_timeout_millis == 0 {
            anyhow::bail!("CACHE_TIMEOUT_MILLIS must be greater than zero");
        }
        if self.spotify_client_id.is_empty() || self.spotify_client_secret.is_empty() {
            slog::warn!(
                LOG,
                "spotify client credentials are not set, playlist requests will fail"
            );
        }
        Ok(())
    }
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
    pub fn cache_timeout(&self) -> Duration {
        Duration::from_millis(self.cache_timeout_millis)
    }
    pub fn credentials(&self) -> models::Credentials {
        models::Credentials::new(&self.spotify_client_id, &self.spotify_client_secret)
    }
}

/// Pick the token store. Redis is probed once, an unreachable cache is
/// only worth a warning since every lookup already degrades to an exchange.
async fn credential_cache(config: &Config) -> anyhow::Result<Arc<dyn cache::CredentialCache>> {
    match &config.redis_addr {
        Some(addr) => {
            let redis = cache::RedisCache::open(
                addr,
                config.redis_password.clone(),
                config.cache_timeout(),
            )?;
            match redis.ping().await {
                Ok(()) => slog::info!(LOG, "connected to redis"; "addr" => addr),
                Err(e) => slog::warn!(
                    LOG, "redis unavailable, continuing without a shared token cache";
                    "addr" => addr,
                    "error" => e.to_string(),
                ),
            }
            Ok(Arc::new(redis))
        }
        None => {
            slog::info!(LOG, "no REDIS_ADDR set, caching tokens in memory");
            Ok(Arc::new(cache::MemoryCache::new(Duration::from_secs(
                60 * 60,
            ))))
        }
    }
}

#[async_std::main]
async fn main() -> anyhow::Result<()> {
    // try sourcing a .env if one exists
    dotenv::dotenv().ok();
    CONFIG.initialize()?;

    let transport: Arc<dyn transport::Transport> =
        Arc::new(transport::SurfTransport::new(CONFIG.request_timeout()));
    let cache = credential_cache(&CONFIG).await?;
    let ctx = service::Context {
        tokens: Arc::new(token::TokenProvider::new(
            CONFIG.credentials(),
            &CONFIG.spotify_token_url,
            cache,
            transport.clone(),
            CONFIG.token_expiry_margin_seconds,
        )),
        catalog: Arc::new(spotify::CatalogClient::new(
            &CONFIG.spotify_api_url,
            &CONFIG.default_playlist_id,
            transport,
        )),
    };
    service::start(ctx).await
}
