use std::sync::Arc;

use tide::http::headers::HeaderValue;
use tide::security::{CorsMiddleware, Origin};

use crate::errors::GatewayError;
use crate::models::Playlist;
use crate::spotify::CatalogClient;
use crate::token::TokenProvider;
use crate::{resp, CONFIG, LOG};

/// Everything a handler needs, built once in `main` and shared by
/// every request
#[derive(Clone)]
pub struct Context {
    pub tokens: Arc<TokenProvider>,
    pub catalog: Arc<CatalogClient>,
}

pub fn build_app(ctx: Context, allow_origin: &str) -> tide::Result<tide::Server<Context>> {
    let cors = CorsMiddleware::new()
        .allow_origin(Origin::from(allow_origin))
        .allow_methods("GET, POST, PUT, DELETE, OPTIONS".parse::<HeaderValue>()?)
        .allow_headers("Origin, Content-Type, Authorization".parse::<HeaderValue>()?)
        .expose_headers("Content-Length".parse::<HeaderValue>()?)
        .allow_credentials(true)
        .max_age("43200".parse::<HeaderValue>()?);

    let mut app = tide::with_state(ctx);
    app.with(crate::logging::LogMiddleware::new());
    app.with(cors);
    app.at("/status").get(status);
    app.at("/musics").get(musics);
    app.at("/musics/:playlistID").get(playlist);
    Ok(app)
}

pub async fn start(ctx: Context) -> anyhow::Result<()> {
    let app = build_app(ctx, &CONFIG.cors_allow_origin)
        .map_err(|e| anyhow::anyhow!("error building app {}", e))?;
    slog::info!(LOG, "running at {}", CONFIG.listen_addr());
    app.listen(CONFIG.listen_addr()).await?;
    Ok(())
}

#[derive(serde::Serialize)]
struct Status<'a> {
    ok: &'a str,
    version: &'a str,
}

async fn status(_req: tide::Request<Context>) -> tide::Result {
    Ok(resp!(json => Status {
        ok: "ok",
        version: &CONFIG.version
    }))
}

#[derive(serde::Serialize)]
struct PlaylistResponse {
    message: &'static str,
    body: Playlist,
}

/// The well known default playlist
async fn musics(req: tide::Request<Context>) -> tide::Result {
    let ctx = req.state();
    let result = fetch_default(ctx).await;
    playlist_response(ctx.catalog.default_playlist_id(), result)
}

async fn playlist(req: tide::Request<Context>) -> tide::Result {
    let ctx = req.state();
    let id = req.param("playlistID").unwrap_or_default();
    let result = fetch(ctx, id).await;
    playlist_response(id, result)
}

async fn fetch_default(ctx: &Context) -> crate::errors::Result<Playlist> {
    let token = ctx.tokens.get_token().await?;
    ctx.catalog.fetch_default_playlist(&token).await
}

async fn fetch(ctx: &Context, playlist_id: &str) -> crate::errors::Result<Playlist> {
    let token = ctx.tokens.get_token().await?;
    ctx.catalog.fetch_playlist(playlist_id, &token).await
}

fn playlist_response(playlist_id: &str, result: crate::errors::Result<Playlist>) -> tide::Result {
    match result {
        Ok(playlist) => Ok(resp!(json => PlaylistResponse {
            message: "success",
            body: playlist,
        })),
        Err(e) => Ok(error_response(playlist_id, &e)),
    }
}

/// Sole translation point from a core error to what the client sees.
/// Details only ever go to the log.
fn error_response(playlist_id: &str, e: &GatewayError) -> tide::Response {
    let status = e.status_code();
    if status >= 500 {
        slog::error!(
            LOG, "playlist request failed";
            "playlist_id" => playlist_id,
            "kind" => e.kind(),
            "error" => e.to_string(),
        );
    } else {
        slog::info!(
            LOG, "playlist request failed";
            "playlist_id" => playlist_id,
            "kind" => e.kind(),
            "error" => e.to_string(),
        );
    }
    resp!(status => status, message => e.public_message())
}
