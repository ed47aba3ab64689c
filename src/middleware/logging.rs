use axum::http;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Attach HTTP request tracing: one span per request, one line per response.
pub fn add_tracing(router: Router<AppState>) -> Router<AppState> {
    router.layer(
        TraceLayer::new_for_http()
            .make_span_with(|req: &http::Request<_>| {
                tracing::info_span!("request", method = %req.method(), path = req.uri().path())
            })
            .on_response(
                |res: &http::Response<_>, latency: std::time::Duration, _span: &tracing::Span| {
                    tracing::info!(
                        status = res.status().as_u16(),
                        latency_ms = latency.as_millis() as u64,
                        "completed"
                    );
                },
            ),
    )
}
