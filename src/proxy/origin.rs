//! Origin Client
//!
//! Forwards requests to the origin server and tunnels protocol upgrades.

use anyhow::Context;
use axum::{
    body::Body,
    extract::Request,
    http::{request::Parts, StatusCode, Uri},
    response::Response,
};
use hyper_util::rt::TokioIo;
use reqwest::{redirect, Url};
use tracing::{debug, info, warn};

use super::headers::{build_response, inbound_response_headers, outbound_request_headers};
use crate::error::{CacheError, Result};

/// Largest request body forwarded to the origin.
pub const MAX_REQUEST_BODY_BYTES: usize = 32 * 1024 * 1024;

/// Path and query of `uri`, the part requests are keyed and forwarded by.
pub fn request_uri(uri: &Uri) -> &str {
    uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/")
}

// == Origin Client ==
#[derive(Debug, Clone)]
pub struct OriginClient {
    client: reqwest::Client,
    base: Url,
}

impl OriginClient {
    /// Creates a client for the origin at `origin_url`.
    ///
    /// Redirects are not followed; they reach the client as sent.
    pub fn new(origin_url: &str) -> anyhow::Result<Self> {
        let base = Url::parse(origin_url)
            .with_context(|| format!("invalid origin url {:?}", origin_url))?;
        let client = reqwest::Client::builder()
            .redirect(redirect::Policy::none())
            .http1_only()
            .build()
            .context("failed to build origin http client")?;
        Ok(Self { client, base })
    }

    /// Origin URL for a request's path and query.
    pub fn target_url(&self, request_uri: &str) -> Result<Url> {
        let joined = format!("{}{}", self.base.as_str().trim_end_matches('/'), request_uri);
        Url::parse(&joined)
            .map_err(|e| CacheError::InvalidRequest(format!("cannot forward {}: {}", request_uri, e)))
    }

    // == Forward ==
    /// Sends the request to the origin with hop-by-hop headers removed.
    pub async fn forward(&self, parts: &Parts, body: Body) -> Result<reqwest::Response> {
        self.send(parts, body, false).await
    }

    async fn send(&self, parts: &Parts, body: Body, keep_upgrade: bool) -> Result<reqwest::Response> {
        let body = axum::body::to_bytes(body, MAX_REQUEST_BODY_BYTES)
            .await
            .map_err(|e| CacheError::InvalidRequest(format!("failed to read request body: {}", e)))?;

        let url = self.target_url(request_uri(&parts.uri))?;
        let mut builder = self
            .client
            .request(parts.method.clone(), url)
            .headers(outbound_request_headers(&parts.headers, keep_upgrade));
        if !body.is_empty() {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_connect() {
                CacheError::OriginUnavailable(format!("failed to connect to origin: {}", e))
            } else {
                CacheError::OriginUnavailable(format!("origin request failed: {}", e))
            }
        })?;

        debug!(status = %response.status(), method = %parts.method, "origin responded");
        Ok(response)
    }

    // == Tunnel ==
    /// Forwards an upgrade request unmodified and, if the origin switches
    /// protocols, splices the two upgraded connections together.
    ///
    /// When the origin declines the upgrade its response is streamed back
    /// as-is. Nothing on this path is cached.
    pub async fn tunnel(&self, mut request: Request) -> Result<Response> {
        let client_upgrade = hyper::upgrade::on(&mut request);
        let (parts, body) = request.into_parts();
        let upstream = self.send(&parts, body, true).await?;
        let status = upstream.status();

        if status != StatusCode::SWITCHING_PROTOCOLS {
            debug!(%status, "origin declined protocol upgrade");
            let headers = inbound_response_headers(upstream.headers());
            return Ok(build_response(
                status,
                headers,
                Body::from_stream(upstream.bytes_stream()),
            ));
        }

        // 101 keeps Connection/Upgrade so the client completes the switch
        let headers = upstream.headers().clone();
        let uri = parts.uri.clone();
        tokio::spawn(async move {
            let mut origin_io = match upstream.upgrade().await {
                Ok(io) => io,
                Err(err) => {
                    warn!(%uri, error = %err, "origin upgrade failed");
                    return;
                }
            };
            let mut client_io = match client_upgrade.await {
                Ok(upgraded) => TokioIo::new(upgraded),
                Err(err) => {
                    warn!(%uri, error = %err, "client upgrade failed");
                    return;
                }
            };

            info!(%uri, "tunnel established");
            match tokio::io::copy_bidirectional(&mut client_io, &mut origin_io).await {
                Ok((to_origin, to_client)) => {
                    debug!(%uri, to_origin, to_client, "tunnel closed")
                }
                Err(err) => debug!(%uri, error = %err, "tunnel closed with error"),
            }
        });

        Ok(build_response(status, headers, Body::empty()))
    }
}
