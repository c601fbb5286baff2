//! Integration Tests for the Caching Proxy
//!
//! Drives the full router against a real origin server bound to a
//! loopback port.

use std::collections::BTreeMap;
use std::io::Read;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{
        header::{CACHE_CONTROL, CONTENT_ENCODING, CONTENT_TYPE},
        Request, StatusCode,
    },
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use edge_cache::{
    cache::{CacheKey, CacheStore, ManualClock},
    create_router, Config, ProxyState, TtlCache,
};
use flate2::read::GzDecoder;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tower::ServiceExt;

const T0: i64 = 1_700_000_000;
const TTL_SECS: u64 = 60;

// == Origin Server ==

type Hits = Arc<AtomicUsize>;

async fn html(State(hits): State<Hits>) -> impl IntoResponse {
    hits.fetch_add(1, Ordering::SeqCst);
    ([(CONTENT_TYPE, "text/html")], "hello")
}

async fn no_store(State(hits): State<Hits>) -> impl IntoResponse {
    hits.fetch_add(1, Ordering::SeqCst);
    (
        [(CONTENT_TYPE, "text/plain"), (CACHE_CONTROL, "no-store")],
        "fresh",
    )
}

async fn missing(State(hits): State<Hits>) -> impl IntoResponse {
    hits.fetch_add(1, Ordering::SeqCst);
    (StatusCode::NOT_FOUND, "not here")
}

async fn pre_encoded(State(hits): State<Hits>) -> impl IntoResponse {
    hits.fetch_add(1, Ordering::SeqCst);
    (
        [(CONTENT_TYPE, "text/plain"), (CONTENT_ENCODING, "br")],
        &b"\x0b\x02\x80raw"[..],
    )
}

async fn image(State(hits): State<Hits>) -> impl IntoResponse {
    hits.fetch_add(1, Ordering::SeqCst);
    ([(CONTENT_TYPE, "image/png")], &b"\x89PNG\r\n\x1a\n"[..])
}

async fn echo(State(hits): State<Hits>, body: Bytes) -> impl IntoResponse {
    hits.fetch_add(1, Ordering::SeqCst);
    ([(CONTENT_TYPE, "text/plain")], body)
}

async fn spawn_origin() -> (String, Hits) {
    let hits = Hits::default();
    let app = Router::new()
        .route("/foo", get(html))
        .route("/nostore", get(no_store))
        .route("/missing", get(missing))
        .route("/pre", get(pre_encoded))
        .route("/img", get(image))
        .route("/echo", post(echo))
        .with_state(Arc::clone(&hits));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), hits)
}

// == Helper Functions ==

struct Proxy {
    app: Router,
    cache: Arc<TtlCache>,
    clock: Arc<ManualClock>,
    hits: Hits,
}

async fn proxy_with_headers(headers: BTreeMap<String, String>) -> Proxy {
    let (origin_url, hits) = spawn_origin().await;
    let config = Config {
        origin_url,
        headers,
        ..Config::default()
    };

    let clock = Arc::new(ManualClock::new(T0));
    let store = CacheStore::with_clock(Duration::from_secs(TTL_SECS), clock.clone());
    // Long interval so sweeps only happen when a test asks for one
    let cache = Arc::new(TtlCache::start(store, Duration::from_secs(3600)));
    let state = ProxyState::new(Arc::clone(&cache), &config).unwrap();

    Proxy {
        app: create_router(state),
        cache,
        clock,
        hits,
    }
}

async fn proxy() -> Proxy {
    proxy_with_headers(BTreeMap::new()).await
}

impl Proxy {
    async fn get(&self, uri: &str) -> axum::response::Response {
        self.app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    fn origin_hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

fn cache_status(response: &axum::response::Response) -> Option<&str> {
    response
        .headers()
        .get("x-cache-status")
        .map(|v| v.to_str().unwrap())
}

async fn body_bytes(response: axum::response::Response) -> Bytes {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
}

fn gunzip(data: &[u8]) -> String {
    let mut out = String::new();
    GzDecoder::new(data).read_to_string(&mut out).unwrap();
    out
}

// == Miss / Hit / Expire ==

#[tokio::test]
async fn test_miss_then_hit() {
    let proxy = proxy().await;

    let first = proxy.get("/foo").await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(cache_status(&first), Some("miss"));
    assert_eq!(first.headers()[CONTENT_ENCODING], "gzip");
    assert_eq!(first.headers()[CONTENT_TYPE], "text/html");
    assert_eq!(gunzip(&body_bytes(first).await), "hello");

    proxy.cache.flush().await;

    let second = proxy.get("/foo").await;
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(cache_status(&second), Some("hit"));
    assert_eq!(second.headers()[CONTENT_ENCODING], "gzip");
    assert_eq!(second.headers()[CONTENT_TYPE], "text/html");
    assert_eq!(gunzip(&body_bytes(second).await), "hello");

    assert_eq!(proxy.origin_hits(), 1);
}

#[tokio::test]
async fn test_query_string_is_part_of_key() {
    let proxy = proxy().await;

    proxy.get("/foo?page=1").await;
    proxy.cache.flush().await;

    let other = proxy.get("/foo?page=2").await;
    assert_eq!(cache_status(&other), Some("miss"));

    let same = proxy.get("/foo?page=1").await;
    assert_eq!(cache_status(&same), Some("hit"));

    assert_eq!(proxy.origin_hits(), 2);
}

#[tokio::test]
async fn test_entry_expires_after_ttl() {
    let proxy = proxy().await;

    proxy.get("/foo").await;
    proxy.cache.flush().await;
    assert_eq!(cache_status(&proxy.get("/foo").await), Some("hit"));

    proxy.clock.advance(TTL_SECS as i64);

    let expired = proxy.get("/foo").await;
    assert_eq!(cache_status(&expired), Some("miss"));
    assert_eq!(gunzip(&body_bytes(expired).await), "hello");
    proxy.cache.flush().await;

    assert_eq!(cache_status(&proxy.get("/foo").await), Some("hit"));
    assert_eq!(proxy.origin_hits(), 2);

    let stats = proxy.cache.stats();
    assert_eq!(stats.hits, 2);
    assert_eq!(stats.expired, 1);
    assert_eq!(stats.misses, 2);
    assert_eq!(stats.stores, 2);
}

#[tokio::test]
async fn test_sweep_removes_expired_response() {
    let proxy = proxy().await;

    proxy.get("/foo").await;
    proxy.cache.flush().await;
    assert_eq!(proxy.cache.store().len(), 1);

    proxy.clock.advance(TTL_SECS as i64 + 1);
    assert_eq!(proxy.cache.sweep_now(), 1);
    assert!(proxy.cache.store().is_empty());
    assert!(!proxy
        .cache
        .store()
        .has_eviction_record(&CacheKey::derive("/foo")));

    assert_eq!(cache_status(&proxy.get("/foo").await), Some("miss"));
    assert_eq!(proxy.origin_hits(), 2);
}

// == Cacheability ==

#[tokio::test]
async fn test_no_store_is_never_cached() {
    let proxy = proxy().await;

    for _ in 0..2 {
        let response = proxy.get("/nostore").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(cache_status(&response), Some("miss"));
        assert!(!response.headers().contains_key(CONTENT_ENCODING));
        assert_eq!(&body_bytes(response).await[..], b"fresh");
        proxy.cache.flush().await;
    }

    assert_eq!(proxy.origin_hits(), 2);
    assert!(proxy.cache.store().is_empty());
}

#[tokio::test]
async fn test_non_200_is_not_cached() {
    let proxy = proxy().await;

    for _ in 0..2 {
        let response = proxy.get("/missing").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(&body_bytes(response).await[..], b"not here");
        proxy.cache.flush().await;
    }

    assert_eq!(proxy.origin_hits(), 2);
    assert!(proxy.cache.store().is_empty());
}

#[tokio::test]
async fn test_pre_encoded_response_is_stored_as_is() {
    let proxy = proxy().await;

    let miss = proxy.get("/pre").await;
    assert_eq!(miss.headers()[CONTENT_ENCODING], "br");
    assert_eq!(&body_bytes(miss).await[..], b"\x0b\x02\x80raw");
    proxy.cache.flush().await;

    let hit = proxy.get("/pre").await;
    assert_eq!(cache_status(&hit), Some("hit"));
    assert_eq!(hit.headers()[CONTENT_ENCODING], "br");
    assert_eq!(&body_bytes(hit).await[..], b"\x0b\x02\x80raw");
}

#[tokio::test]
async fn test_binary_response_is_not_compressed() {
    let proxy = proxy().await;

    let miss = proxy.get("/img").await;
    assert!(!miss.headers().contains_key(CONTENT_ENCODING));
    assert_eq!(&body_bytes(miss).await[..], b"\x89PNG\r\n\x1a\n");
    proxy.cache.flush().await;

    let hit = proxy.get("/img").await;
    assert_eq!(cache_status(&hit), Some("hit"));
    assert!(!hit.headers().contains_key(CONTENT_ENCODING));
    assert_eq!(hit.headers()[CONTENT_TYPE], "image/png");
    assert_eq!(&body_bytes(hit).await[..], b"\x89PNG\r\n\x1a\n");
}

#[tokio::test]
async fn test_request_body_is_forwarded() {
    let proxy = proxy().await;

    let response = proxy
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/echo")
                .body(Body::from("ping"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_ENCODING], "gzip");
    assert_eq!(gunzip(&body_bytes(response).await), "ping");
}

#[tokio::test]
async fn test_head_response_is_not_cached() {
    let proxy = proxy().await;

    let head = proxy
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("HEAD")
                .uri("/foo")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(head.status(), StatusCode::OK);
    assert_eq!(cache_status(&head), Some("miss"));
    proxy.cache.flush().await;
    assert!(proxy.cache.store().is_empty());

    let get = proxy.get("/foo").await;
    assert_eq!(cache_status(&get), Some("miss"));
    assert_eq!(gunzip(&body_bytes(get).await), "hello");
    proxy.cache.flush().await;

    let hit = proxy.get("/foo").await;
    assert_eq!(cache_status(&hit), Some("hit"));
    assert_eq!(gunzip(&body_bytes(hit).await), "hello");
    assert_eq!(proxy.origin_hits(), 2);
}

// == Static Headers ==

#[tokio::test]
async fn test_static_headers_on_hit_and_miss() {
    let mut headers = BTreeMap::new();
    headers.insert("X-Edge".to_string(), "test".to_string());
    headers.insert("Cache-Control".to_string(), "max-age=900".to_string());
    let proxy = proxy_with_headers(headers).await;

    let miss = proxy.get("/foo").await;
    assert_eq!(miss.headers()["x-edge"], "test");
    assert_eq!(miss.headers()[CACHE_CONTROL], "max-age=900");
    proxy.cache.flush().await;

    let hit = proxy.get("/foo").await;
    assert_eq!(cache_status(&hit), Some("hit"));
    assert_eq!(hit.headers()["x-edge"], "test");
    assert_eq!(hit.headers()[CACHE_CONTROL], "max-age=900");

    // Origin's no-store still decides cacheability before the override
    let bypass = proxy.get("/nostore").await;
    assert_eq!(bypass.headers()[CACHE_CONTROL], "max-age=900");
    proxy.cache.flush().await;
    assert_eq!(cache_status(&proxy.get("/nostore").await), Some("miss"));
}

// == Upgrade Bypass ==

#[tokio::test]
async fn test_upgrade_request_bypasses_cache() {
    let proxy = proxy().await;

    for _ in 0..2 {
        let response = proxy
            .app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/foo")
                    .header("connection", "upgrade")
                    .header("upgrade", "websocket")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(cache_status(&response), None);
        assert_eq!(&body_bytes(response).await[..], b"hello");
        proxy.cache.flush().await;
    }

    assert_eq!(proxy.origin_hits(), 2);
    assert!(proxy.cache.store().is_empty());
}

// == Origin Failures ==

#[tokio::test]
async fn test_unreachable_origin_is_bad_gateway() {
    let config = Config {
        origin_url: "http://127.0.0.1:9".to_string(),
        ..Config::default()
    };
    let cache = Arc::new(TtlCache::start(
        CacheStore::new(Duration::from_secs(TTL_SECS)),
        Duration::from_secs(3600),
    ));
    let app = create_router(ProxyState::new(cache, &config).unwrap());

    let response = app
        .oneshot(Request::builder().uri("/foo").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let json: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert!(json["error"].as_str().unwrap().contains("origin"));
}

// == Upgrade Tunnel ==

const IO_TIMEOUT: Duration = Duration::from_secs(5);

/// Reads one HTTP head byte by byte so nothing after it is consumed.
async fn read_head(stream: &mut TcpStream) -> String {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        let n = stream.read(&mut byte).await.unwrap();
        assert!(n > 0, "connection closed mid-head: {:?}", String::from_utf8_lossy(&head));
        head.push(byte[0]);
    }
    String::from_utf8(head).unwrap()
}

/// Raw TCP origin that switches to an echo protocol when asked to.
async fn spawn_echo_origin() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let head = read_head(&mut socket).await.to_ascii_lowercase();
                if !head.contains("upgrade: echo") {
                    let _ = socket
                        .write_all(b"HTTP/1.1 400 Bad Request\r\ncontent-length: 0\r\n\r\n")
                        .await;
                    return;
                }
                socket
                    .write_all(
                        b"HTTP/1.1 101 Switching Protocols\r\n\
                          connection: upgrade\r\n\
                          upgrade: echo\r\n\r\n",
                    )
                    .await
                    .unwrap();

                let (mut reader, mut writer) = socket.split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
            });
        }
    });

    format!("http://{}", addr)
}

#[tokio::test]
async fn test_upgrade_tunnel_round_trip() {
    let config = Config {
        origin_url: spawn_echo_origin().await,
        ..Config::default()
    };
    let cache = Arc::new(TtlCache::start(
        CacheStore::new(Duration::from_secs(TTL_SECS)),
        Duration::from_secs(3600),
    ));
    let app = create_router(ProxyState::new(Arc::clone(&cache), &config).unwrap());

    // Upgrades need a real connection, not oneshot
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let proxy_addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let mut client = TcpStream::connect(proxy_addr).await.unwrap();
    client
        .write_all(
            b"GET /chat HTTP/1.1\r\n\
              host: edge.test\r\n\
              connection: upgrade\r\n\
              upgrade: echo\r\n\r\n",
        )
        .await
        .unwrap();

    let head = timeout(IO_TIMEOUT, read_head(&mut client)).await.unwrap();
    assert!(head.starts_with("HTTP/1.1 101"), "unexpected head: {}", head);
    assert!(!head.to_ascii_lowercase().contains("x-cache-status"));

    for message in [&b"ping"[..], &b"second frame"[..]] {
        client.write_all(message).await.unwrap();
        let mut echoed = vec![0u8; message.len()];
        timeout(IO_TIMEOUT, client.read_exact(&mut echoed))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(echoed, message);
    }

    cache.flush().await;
    assert!(cache.store().is_empty());
    assert_eq!(cache.stats().stores, 0);
}
