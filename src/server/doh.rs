//! DNS-over-HTTPS server front-end (RFC 8484): a GET with a base64url
//! `dns=` parameter or a POST with an `application/dns-message` body,
//! both capped at 4KiB, served over the same axum stack the teacher
//! uses for its metrics endpoint (`http_server.rs`).

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;
use tracing::warn;

use crate::dns::DnsPacket;

use super::ServerContext;

const MAX_BODY_BYTES: usize = 4096;
const CONTENT_TYPE: &str = "application/dns-message";

#[derive(Deserialize)]
struct DohQuery {
    dns: String,
}

pub fn router(ctx: Arc<ServerContext>) -> Router {
    Router::new()
        .route("/dns-query", get(handle_get).post(handle_post))
        .with_state(ctx)
}

pub async fn run(listener: tokio::net::TcpListener, ctx: Arc<ServerContext>) {
    let app = router(ctx);
    if let Err(err) = axum::serve(listener, app).await {
        tracing::error!(%err, "doh server stopped");
    }
}

async fn handle_get(
    State(ctx): State<Arc<ServerContext>>,
    Query(params): Query<DohQuery>,
    headers: HeaderMap,
) -> Response {
    if params.dns.len() > MAX_BODY_BYTES {
        return StatusCode::PAYLOAD_TOO_LARGE.into_response();
    }
    let Ok(body) = URL_SAFE_NO_PAD.decode(params.dns.as_bytes()) else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    respond_to(&ctx, body, &headers).await
}

async fn handle_post(
    State(ctx): State<Arc<ServerContext>>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Response {
    if body.len() > MAX_BODY_BYTES {
        return StatusCode::PAYLOAD_TOO_LARGE.into_response();
    }
    respond_to(&ctx, body.to_vec(), &headers).await
}

async fn respond_to(ctx: &Arc<ServerContext>, body: Vec<u8>, headers: &HeaderMap) -> Response {
    let request = match DnsPacket::from_wire(&body) {
        Ok(request) => request,
        Err(err) => {
            warn!(%err, "dropping unparsable doh query");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    let client_addr = client_addr_from_forwarded(headers);
    let response = super::process_query(ctx, request, client_addr, None).await;

    let wire = match response.to_wire() {
        Ok(wire) => wire,
        Err(err) => {
            warn!(%err, "failed to encode doh response");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    ([(axum::http::header::CONTENT_TYPE, CONTENT_TYPE)], wire).into_response()
}

/// Reads an operator-trusted `X-Forwarded-For` for client-address-aware
/// pipeline matching when the server sits behind a reverse proxy.
fn client_addr_from_forwarded(headers: &HeaderMap) -> Option<SocketAddr> {
    let value = headers.get("x-forwarded-for")?.to_str().ok()?;
    let first = value.split(',').next()?.trim();
    let ip: std::net::IpAddr = first.parse().ok()?;
    Some(SocketAddr::new(ip, 0))
}
