//! The CRL-over-HTTP server: one route, `GET /crl.pem`, serving the current
//! CRL PEM with `Content-Type: application/x-pem-file`. Grounded in
//! `crl_server.py`, which is itself a single-route HTTP server; reshaped
//! here on `axum` rather than a hand-rolled listener.
//!
//! The CRL never changes during a run (it's regenerated only when the root
//! CA is created, not on a schedule), so the server just serves an
//! immutable [`bytes::Bytes`] handed to it at startup.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use tracing::info;

#[derive(Clone)]
struct CrlState {
    pem: Arc<Bytes>,
}

async fn serve_crl(State(state): State<CrlState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/x-pem-file")],
        (*state.pem).clone(),
    )
}

/// Builds the CRL server's router, serving `pem` at `/crl.pem`.
pub fn router(pem: Bytes) -> Router {
    let state = CrlState { pem: Arc::new(pem) };
    Router::new().route("/crl.pem", get(serve_crl)).with_state(state)
}

/// Binds `addr` and serves the CRL forever (until the process is killed or
/// the returned future is dropped/aborted by the caller).
pub async fn run(addr: SocketAddr, pem: Bytes) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "crl server listening");
    axum::serve(listener, router(pem)).await
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn serves_pem_with_correct_content_type() {
        let app = router(Bytes::from_static(b"-----BEGIN X509 CRL-----\n...\n-----END X509 CRL-----\n"));

        use axum::body::Body;
        use axum::http::Request;
        use tower::ServiceExt;

        let response = app
            .oneshot(Request::builder().uri("/crl.pem").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), axum::http::StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/x-pem-file"
        );
    }
}
