use std::time::Instant;

use crate::LOG;

/// Logs every request with a generated request id once the
/// response is ready
#[derive(Debug, Default, Clone)]
pub struct LogMiddleware;

impl LogMiddleware {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl<State: Clone + Send + Sync + 'static> tide::Middleware<State> for LogMiddleware {
    async fn handle(&self, req: tide::Request<State>, next: tide::Next<'_, State>) -> tide::Result {
        let start = Instant::now();
        let request_id = uuid::Uuid::new_v4().simple().to_string();
        let method = req.method().to_string();
        let path = req.url().path().to_string();

        let mut resp = next.run(req).await;
        let status = u16::from(resp.status());
        resp.insert_header("x-request-id", request_id.as_str());

        let elapsed_ms = start.elapsed().as_millis() as u64;
        if status >= 500 {
            slog::error!(
                LOG, "request";
                "request_id" => &request_id,
                "method" => &method,
                "path" => &path,
                "status" => status,
                "elapsed_ms" => elapsed_ms,
            );
        } else {
            slog::info!(
                LOG, "request";
                "request_id" => &request_id,
                "method" => &method,
                "path" => &path,
                "status" => status,
                "elapsed_ms" => elapsed_ms,
            );
        }
        Ok(resp)
    }
}
