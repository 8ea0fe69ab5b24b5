//! Forwarding engine.
//!
//! [`DeviceProxy::forward`] resolves a device id, checks its host against the
//! allow-list, sends the request with the caller's replayed cookies and
//! returns the response head together with any cookies the device set. The
//! whole call, including a buffered body read, runs under one deadline.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use reqwest::header::{
    HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE, COOKIE, SET_COOKIE, USER_AGENT,
};
use reqwest::{redirect, Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use slideshow_core::config::DEFAULT_UPSTREAM_TIMEOUT;
use slideshow_core::{DeviceRegistry, HostAllowList};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};
use url::Url;

use crate::error::{ProxyError, Result};
use crate::session::CookieJar;

/// User agent sent to every device.
pub const PROXY_USER_AGENT: &str = "Slideshow Manager Proxy";

/// Accept header sent to every device.
pub const UPSTREAM_ACCEPT: &str = "application/json, text/plain, */*";

/// Headers never copied from a device response to the browser.
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

/// Where a single forward is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardPhase {
    Idle,
    Resolving,
    HostChecking,
    Sending,
    Succeeded,
    TimedOut,
    NetworkError,
}

impl ForwardPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Resolving => "resolving",
            Self::HostChecking => "host_checking",
            Self::Sending => "sending",
            Self::Succeeded => "succeeded",
            Self::TimedOut => "timed_out",
            Self::NetworkError => "network_error",
        }
    }
}

impl fmt::Display for ForwardPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who is calling: the unpacked session jar of the browser.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallerContext {
    pub jar: CookieJar,
}

impl CallerContext {
    /// A caller without a session.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// A caller replaying the given jar.
    pub fn with_jar(jar: CookieJar) -> Self {
        Self { jar }
    }

    pub fn has_session(&self) -> bool {
        !self.jar.is_empty()
    }
}

/// One request to forward to a device.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub device_id: String,
    /// Absolute path on the device, e.g. `/api/state`.
    pub path: String,
    pub method: Method,
    pub body: Option<Bytes>,
    /// Caller headers. Only `Content-Type` is forwarded.
    pub headers: HeaderMap,
    pub caller: CallerContext,
}

impl ProxyRequest {
    pub fn new(method: Method, device_id: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            path: path.into(),
            method,
            body: None,
            headers: HeaderMap::new(),
            caller: CallerContext::anonymous(),
        }
    }

    pub fn get(device_id: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(Method::GET, device_id, path)
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serializes `payload` as the body and sets a JSON content type.
    pub fn with_json<T: Serialize + ?Sized>(mut self, payload: &T) -> serde_json::Result<Self> {
        let body = serde_json::to_vec(payload)?;
        self.body = Some(Bytes::from(body));
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(self)
    }

    pub fn with_content_type(mut self, content_type: HeaderValue) -> Self {
        self.headers.insert(CONTENT_TYPE, content_type);
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_caller(mut self, caller: CallerContext) -> Self {
        self.caller = caller;
        self
    }
}

/// Response head from a device. The body has not been read yet.
#[derive(Debug)]
pub struct UpstreamResponse {
    response: reqwest::Response,
    session: CookieJar,
    deadline: Instant,
    timeout: Duration,
}

impl UpstreamResponse {
    pub fn status(&self) -> StatusCode {
        self.response.status()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.response.headers()
    }

    /// Cookies the device set on this response, empty if none.
    pub fn session(&self) -> &CookieJar {
        &self.session
    }

    pub fn content_type(&self) -> Option<&str> {
        content_type(self.response.headers())
    }

    /// Response headers safe to hand to the browser.
    pub fn passthrough_headers(&self) -> HeaderMap {
        passthrough_headers(self.response.headers())
    }

    /// Reads the whole body before the forward's deadline.
    pub async fn bytes(self) -> Result<BufferedResponse> {
        let status = self.response.status();
        let headers = self.response.headers().clone();

        let body = match timeout_at(self.deadline, self.response.bytes()).await {
            Ok(Ok(body)) => body,
            Ok(Err(e)) if e.is_timeout() => return Err(ProxyError::Timeout(self.timeout)),
            Ok(Err(e)) => return Err(ProxyError::Network(e)),
            Err(_) => {
                warn!(timeout_ms = self.timeout.as_millis() as u64, "Device body read timed out");
                return Err(ProxyError::Timeout(self.timeout));
            }
        };

        Ok(BufferedResponse {
            status,
            headers,
            session: self.session,
            body,
        })
    }

    /// Converts into a streamed response for download routes.
    ///
    /// The stream is not bound by the forward's deadline.
    pub fn into_passthrough(self) -> Passthrough {
        let status = self.response.status();
        let headers = passthrough_headers(self.response.headers());
        Passthrough {
            status,
            headers,
            session: self.session,
            body: self.response.bytes_stream().boxed(),
        }
    }
}

/// A fully read device response.
#[derive(Debug, Clone)]
pub struct BufferedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub session: CookieJar,
    pub body: Bytes,
}

impl BufferedResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Turns a non-2xx response into [`ProxyError::Status`].
    pub fn error_for_status(self) -> Result<Self> {
        if self.status.is_success() {
            return Ok(self);
        }
        Err(ProxyError::Status {
            status: self.status,
            body: self.text().trim().to_string(),
            session: self.session,
        })
    }

    /// Decodes a successful JSON response.
    ///
    /// Non-2xx statuses become [`ProxyError::Status`]. An empty 2xx body
    /// decodes to `T::default()`.
    pub fn into_json<T>(self) -> Result<Proxied<T>>
    where
        T: DeserializeOwned + Default,
    {
        let Self {
            status,
            headers,
            session,
            body,
        } = self.error_for_status()?;

        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Proxied {
                status,
                session,
                value: T::default(),
            });
        }

        let content_type = content_type(&headers).unwrap_or_default();
        if !is_json(content_type) {
            return Err(ProxyError::UnexpectedContentType {
                content_type: if content_type.is_empty() {
                    "none".to_string()
                } else {
                    content_type.to_string()
                },
                session,
            });
        }

        match serde_json::from_slice(&body) {
            Ok(value) => Ok(Proxied {
                status,
                session,
                value,
            }),
            Err(source) => Err(ProxyError::Decode { source, session }),
        }
    }
}

/// A decoded device response and the cookies it set.
#[derive(Debug, Clone, PartialEq)]
pub struct Proxied<T> {
    pub status: StatusCode,
    pub session: CookieJar,
    pub value: T,
}

/// A streamed device response.
pub struct Passthrough {
    pub status: StatusCode,
    /// Device headers minus `Set-Cookie` and hop-by-hop headers.
    pub headers: HeaderMap,
    pub session: CookieJar,
    pub body: BoxStream<'static, reqwest::Result<Bytes>>,
}

impl fmt::Debug for Passthrough {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Passthrough")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

/// HTTP client bound to a device registry and host allow-list.
#[derive(Debug, Clone)]
pub struct DeviceProxy {
    registry: Arc<DeviceRegistry>,
    allow_list: Arc<HostAllowList>,
    client: Client,
    timeout: Duration,
}

impl DeviceProxy {
    /// Creates a proxy with the default upstream timeout.
    pub fn new(registry: Arc<DeviceRegistry>, allow_list: Arc<HostAllowList>) -> Result<Self> {
        Self::with_timeout(registry, allow_list, DEFAULT_UPSTREAM_TIMEOUT)
    }

    /// Creates a proxy with a custom upstream timeout.
    pub fn with_timeout(
        registry: Arc<DeviceRegistry>,
        allow_list: Arc<HostAllowList>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .user_agent(PROXY_USER_AGENT)
            .redirect(redirect::Policy::none())
            .build()
            .map_err(ProxyError::Client)?;

        Ok(Self {
            registry,
            allow_list,
            client,
            timeout,
        })
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn allow_list(&self) -> &HostAllowList {
        &self.allow_list
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Sends one request to a device.
    ///
    /// Redirects are returned as-is. Non-2xx statuses are not errors at this
    /// level.
    pub async fn forward(&self, request: ProxyRequest) -> Result<UpstreamResponse> {
        let ProxyRequest {
            device_id,
            path,
            method,
            body,
            headers,
            caller,
        } = request;

        let device = self.registry.get(&device_id).inspect_err(|e| {
            debug!(device = %device_id, phase = %ForwardPhase::Resolving, "Device lookup failed: {}", e);
        })?;

        self.allow_list.check(&device.host).inspect_err(|e| {
            warn!(device = %device.id, phase = %ForwardPhase::HostChecking, "{}", e);
        })?;

        let url = upstream_url(&device.host, &path)?;
        let outbound = outbound_headers(&headers, &caller.jar);

        let mut builder = self.client.request(method.clone(), url.clone()).headers(outbound);
        if let Some(body) = body {
            builder = builder.body(body);
        }

        debug!(
            device = %device.id,
            method = %method,
            path = %url.path(),
            has_session = caller.has_session(),
            phase = %ForwardPhase::Sending,
            "Forwarding request to device"
        );

        let deadline = Instant::now() + self.timeout;
        let response = match timeout_at(deadline, builder.send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) if e.is_timeout() => {
                warn!(device = %device.id, phase = %ForwardPhase::TimedOut, "Device request timed out");
                return Err(ProxyError::Timeout(self.timeout));
            }
            Ok(Err(e)) => {
                warn!(device = %device.id, phase = %ForwardPhase::NetworkError, error = %e, "Device unreachable");
                return Err(ProxyError::Network(e));
            }
            Err(_) => {
                warn!(
                    device = %device.id,
                    timeout_ms = self.timeout.as_millis() as u64,
                    phase = %ForwardPhase::TimedOut,
                    "Device request timed out"
                );
                return Err(ProxyError::Timeout(self.timeout));
            }
        };

        let session = CookieJar::extract(response.headers());
        debug!(
            device = %device.id,
            status = response.status().as_u16(),
            rotated = !session.is_empty(),
            phase = %ForwardPhase::Succeeded,
            "Device responded"
        );

        Ok(UpstreamResponse {
            response,
            session,
            deadline,
            timeout: self.timeout,
        })
    }

    /// Forwards and reads the whole body under the same deadline.
    pub async fn forward_buffered(&self, request: ProxyRequest) -> Result<BufferedResponse> {
        self.forward(request).await?.bytes().await
    }

    /// Forwards and decodes a JSON response.
    pub async fn forward_json<T>(&self, request: ProxyRequest) -> Result<Proxied<T>>
    where
        T: DeserializeOwned + Default,
    {
        self.forward_buffered(request).await?.into_json()
    }
}

/// Joins a device host and path, refusing to leave the device's origin.
fn upstream_url(host: &str, path: &str) -> Result<Url> {
    let base = Url::parse(host).map_err(|e| ProxyError::InvalidUrl(e.to_string()))?;
    let url = base
        .join(path)
        .map_err(|e| ProxyError::InvalidUrl(e.to_string()))?;

    if url.origin() != base.origin() {
        return Err(ProxyError::InvalidUrl(format!(
            "path {path:?} leaves the device origin"
        )));
    }
    Ok(url)
}

fn outbound_headers(caller_headers: &HeaderMap, jar: &CookieJar) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static(UPSTREAM_ACCEPT));
    headers.insert(USER_AGENT, HeaderValue::from_static(PROXY_USER_AGENT));

    if let Some(content_type) = caller_headers.get(CONTENT_TYPE) {
        headers.insert(CONTENT_TYPE, content_type.clone());
    }

    if let Some(cookie) = jar.cookie_header() {
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                headers.insert(COOKIE, value);
            }
            Err(_) => warn!("Stored session is not a valid Cookie header, sending none"),
        }
    }

    headers
}

fn passthrough_headers(upstream: &HeaderMap) -> HeaderMap {
    upstream
        .iter()
        .filter(|(name, _)| {
            **name != SET_COOKIE && !HOP_BY_HOP_HEADERS.contains(&name.as_str())
        })
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

fn content_type(headers: &HeaderMap) -> Option<&str> {
    headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
}

fn is_json(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence == "application/json" || essence.ends_with("+json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::State;
    use axum::http::StatusCode as AxumStatus;
    use axum::response::{AppendHeaders, IntoResponse, Redirect};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use futures::TryStreamExt;
    use serde_json::{json, Value};
    use slideshow_core::{DeviceDefinition, HostGuardError, RegistryError};
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn spawn_upstream(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn proxy_for(host: &str, timeout: Duration) -> DeviceProxy {
        let registry = DeviceRegistry::new(vec![DeviceDefinition::new("lobby", "Lobby", host)]).unwrap();
        DeviceProxy::with_timeout(Arc::new(registry), Arc::new(HostAllowList::allow_all()), timeout)
            .unwrap()
    }

    async fn echo_headers(headers: axum::http::HeaderMap) -> Json<Value> {
        let read = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string);
        Json(json!({
            "cookie": read("cookie"),
            "accept": read("accept"),
            "user_agent": read("user-agent"),
            "content_type": read("content-type"),
            "authorization": read("authorization"),
        }))
    }

    async fn login() -> impl IntoResponse {
        (
            AppendHeaders([
                (axum::http::header::SET_COOKIE, "session=s1; Path=/; HttpOnly"),
                (axum::http::header::SET_COOKIE, "csrf=c1; Expires=Wed, 21 Oct 2026 07:28:00 GMT; Path=/"),
            ]),
            Json(json!({"ok": true})),
        )
    }

    fn upstream_router() -> Router {
        Router::new()
            .route("/echo", get(echo_headers).post(echo_headers))
            .route("/login", post(login))
            .route("/redirect", get(|| async { Redirect::temporary("/elsewhere") }))
            .route("/text", get(|| async { "plain text" }))
            .route("/empty", post(|| async { AxumStatus::NO_CONTENT }))
            .route("/broken", get(|| async {
                ([(axum::http::header::CONTENT_TYPE, "application/json")], "{not json")
            }))
            .route("/denied", get(|| async {
                (
                    AxumStatus::UNAUTHORIZED,
                    [(axum::http::header::SET_COOKIE, "session=; Max-Age=0")],
                    "login required",
                )
            }))
            .route("/slow", get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }))
            .route("/stalled-body", get(|| async {
                let chunks = futures::stream::once(async {
                    Ok::<_, std::convert::Infallible>(Bytes::from_static(b"{\"online\":"))
                })
                .chain(futures::stream::once(async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(Bytes::from_static(b"true}"))
                }));
                (
                    [(axum::http::header::CONTENT_TYPE, "application/json")],
                    axum::body::Body::from_stream(chunks),
                )
            }))
            .route("/download", get(|| async {
                (
                    [
                        (axum::http::header::CONTENT_TYPE, "application/zip"),
                        (axum::http::header::SET_COOKIE, "leak=1"),
                    ],
                    "PK-archive",
                )
            }))
    }

    #[tokio::test]
    async fn replays_session_and_forces_headers() {
        let host = spawn_upstream(upstream_router()).await;
        let proxy = proxy_for(&host, Duration::from_secs(5));

        let mut caller_headers = HeaderMap::new();
        caller_headers.insert(reqwest::header::AUTHORIZATION, HeaderValue::from_static("Bearer x"));
        caller_headers.insert(ACCEPT, HeaderValue::from_static("text/html"));

        let request = ProxyRequest::new(Method::POST, "lobby", "/echo")
            .with_headers(caller_headers)
            .with_json(&json!({"a": 1}))
            .unwrap()
            .with_caller(CallerContext::with_jar(CookieJar::from_entries(["a=1", "b=2"])));

        let echoed: Proxied<Value> = proxy.forward_json(request).await.unwrap();
        assert_eq!(echoed.value["cookie"], "a=1; b=2");
        assert_eq!(echoed.value["accept"], UPSTREAM_ACCEPT);
        assert_eq!(echoed.value["user_agent"], PROXY_USER_AGENT);
        assert_eq!(echoed.value["content_type"], "application/json");
        assert_eq!(echoed.value["authorization"], Value::Null);
    }

    #[tokio::test]
    async fn anonymous_caller_sends_no_cookie() {
        let host = spawn_upstream(upstream_router()).await;
        let proxy = proxy_for(&host, Duration::from_secs(5));

        let echoed: Proxied<Value> = proxy.forward_json(ProxyRequest::get("lobby", "/echo")).await.unwrap();
        assert_eq!(echoed.value["cookie"], Value::Null);
        assert!(echoed.session.is_empty());
    }

    #[tokio::test]
    async fn captures_rotated_cookies() {
        let host = spawn_upstream(upstream_router()).await;
        let proxy = proxy_for(&host, Duration::from_secs(5));

        let response = proxy
            .forward(ProxyRequest::new(Method::POST, "lobby", "/login"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.session().entries(), ["session=s1", "csrf=c1"]);
    }

    #[tokio::test]
    async fn does_not_follow_redirects() {
        let host = spawn_upstream(upstream_router()).await;
        let proxy = proxy_for(&host, Duration::from_secs(5));

        let response = proxy.forward(ProxyRequest::get("lobby", "/redirect")).await.unwrap();
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(
            response.headers().get(reqwest::header::LOCATION).unwrap(),
            "/elsewhere"
        );
    }

    #[tokio::test]
    async fn slow_device_times_out() {
        let host = spawn_upstream(upstream_router()).await;
        let proxy = proxy_for(&host, Duration::from_millis(200));

        let err = proxy.forward(ProxyRequest::get("lobby", "/slow")).await.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(err.phase(), ForwardPhase::TimedOut);
    }

    #[tokio::test]
    async fn stalled_body_shares_the_deadline() {
        let host = spawn_upstream(upstream_router()).await;
        let proxy = proxy_for(&host, Duration::from_millis(300));

        let head = proxy
            .forward(ProxyRequest::get("lobby", "/stalled-body"))
            .await
            .unwrap();
        assert_eq!(head.status(), AxumStatus::OK);
        assert!(head.bytes().await.unwrap_err().is_timeout());

        let err = proxy
            .forward_json::<Value>(ProxyRequest::get("lobby", "/stalled-body"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::Timeout(_)));
    }

    #[tokio::test]
    async fn unreachable_device_is_network_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let proxy = proxy_for(&format!("http://{addr}"), Duration::from_secs(5));
        let err = proxy.forward(ProxyRequest::get("lobby", "/echo")).await.unwrap_err();
        assert!(matches!(err, ProxyError::Network(_)));
        assert_eq!(err.phase(), ForwardPhase::NetworkError);
    }

    #[tokio::test]
    async fn unknown_device_is_rejected() {
        let proxy = proxy_for("http://127.0.0.1:9", Duration::from_secs(1));
        let err = proxy.forward(ProxyRequest::get("ghost", "/api/state")).await.unwrap_err();
        assert!(matches!(err, ProxyError::Registry(RegistryError::NotFound(ref id)) if id == "ghost"));
    }

    #[tokio::test]
    async fn disallowed_host_sends_nothing() {
        let hits = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route(
                "/echo",
                get(|State(hits): State<Arc<AtomicUsize>>| async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    "hit"
                }),
            )
            .with_state(hits.clone());
        let host = spawn_upstream(router).await;

        let registry = DeviceRegistry::new(vec![DeviceDefinition::new("lobby", "Lobby", host.as_str())]).unwrap();
        let proxy = DeviceProxy::new(
            Arc::new(registry),
            Arc::new(HostAllowList::parse("player1.local")),
        )
        .unwrap();

        let err = proxy.forward(ProxyRequest::get("lobby", "/echo")).await.unwrap_err();
        assert!(matches!(
            err,
            ProxyError::Host(HostGuardError::HostNotAllowed(ref host)) if host == "127.0.0.1"
        ));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn status_errors_keep_rotated_cookies() {
        let host = spawn_upstream(upstream_router()).await;
        let proxy = proxy_for(&host, Duration::from_secs(5));

        let err = proxy
            .forward_json::<Value>(ProxyRequest::get("lobby", "/denied"))
            .await
            .unwrap_err();
        match err {
            ProxyError::Status { status, body, session } => {
                assert_eq!(status, StatusCode::UNAUTHORIZED);
                assert_eq!(body, "login required");
                assert_eq!(session.entries(), ["session="]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_json_success_is_rejected() {
        let host = spawn_upstream(upstream_router()).await;
        let proxy = proxy_for(&host, Duration::from_secs(5));

        let err = proxy
            .forward_json::<Value>(ProxyRequest::get("lobby", "/text"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProxyError::UnexpectedContentType { ref content_type, .. } if content_type.starts_with("text/plain")
        ));
    }

    #[tokio::test]
    async fn invalid_json_is_decode_error() {
        let host = spawn_upstream(upstream_router()).await;
        let proxy = proxy_for(&host, Duration::from_secs(5));

        let err = proxy
            .forward_json::<Value>(ProxyRequest::get("lobby", "/broken"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::Decode { .. }));
    }

    #[tokio::test]
    async fn empty_body_decodes_to_default() {
        let host = spawn_upstream(upstream_router()).await;
        let proxy = proxy_for(&host, Duration::from_secs(5));

        let proxied: Proxied<Vec<String>> = proxy
            .forward_json(ProxyRequest::new(Method::POST, "lobby", "/empty"))
            .await
            .unwrap();
        assert_eq!(proxied.status, StatusCode::NO_CONTENT);
        assert!(proxied.value.is_empty());
    }

    #[tokio::test]
    async fn passthrough_strips_set_cookie() {
        let host = spawn_upstream(upstream_router()).await;
        let proxy = proxy_for(&host, Duration::from_secs(5));

        let response = proxy.forward(ProxyRequest::get("lobby", "/download")).await.unwrap();
        let passthrough = response.into_passthrough();

        assert_eq!(passthrough.status, StatusCode::OK);
        assert!(passthrough.headers.get(SET_COOKIE).is_none());
        assert_eq!(passthrough.headers.get(CONTENT_TYPE).unwrap(), "application/zip");
        assert_eq!(passthrough.session.entries(), ["leak=1"]);

        let chunks: Vec<Bytes> = passthrough.body.try_collect().await.unwrap();
        assert_eq!(chunks.concat(), b"PK-archive");
    }

    #[tokio::test]
    async fn repeated_reads_are_identical() {
        let host = spawn_upstream(upstream_router()).await;
        let proxy = proxy_for(&host, Duration::from_secs(5));
        let caller = CallerContext::with_jar(CookieJar::from_entries(["session=s1"]));

        let first: Proxied<Value> = proxy
            .forward_json(ProxyRequest::get("lobby", "/echo").with_caller(caller.clone()))
            .await
            .unwrap();
        let second: Proxied<Value> = proxy
            .forward_json(ProxyRequest::get("lobby", "/echo").with_caller(caller))
            .await
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn url_join_stays_on_device() {
        let url = upstream_url("http://player.local:8080/base/", "/api/state").unwrap();
        assert_eq!(url.as_str(), "http://player.local:8080/api/state");

        assert!(upstream_url("http://player.local", "http://evil.example/x").is_err());
        assert!(upstream_url("not a url", "/api/state").is_err());
    }

    #[test]
    fn json_content_types() {
        assert!(is_json("application/json"));
        assert!(is_json("Application/JSON; charset=utf-8"));
        assert!(is_json("application/problem+json"));
        assert!(!is_json("text/html"));
        assert!(!is_json(""));
    }

    #[test]
    fn hop_by_hop_headers_are_dropped() {
        let mut upstream = HeaderMap::new();
        upstream.insert("connection", HeaderValue::from_static("close"));
        upstream.insert("transfer-encoding", HeaderValue::from_static("chunked"));
        upstream.insert("content-disposition", HeaderValue::from_static("attachment"));

        let headers = passthrough_headers(&upstream);
        assert_eq!(headers.len(), 1);
        assert!(headers.contains_key("content-disposition"));
    }
}
