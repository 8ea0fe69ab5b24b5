//! API route handlers.

use axum::body::{Body, Bytes};
use axum::extract::{Path, Query, State};
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderMap, HeaderValue, Method};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use slideshow_core::{AuditEntry, DeviceDefinition};
use slideshow_proxy::contracts::{
    ActionAck, ContractError, DeviceConfig, DeviceState, InfoScreenToggle, MediaSource,
    PlaybackSettings, PlayerAction, SourcePayload, SourceUpdate,
};
use slideshow_proxy::{
    BufferedResponse, CallerContext, CookieJar, Passthrough, ProxyError, ProxyRequest,
};

use crate::error::{ApiError, Result};
use crate::extract::{preferred_device, Caller};
use crate::models::{
    ActiveDeviceResponse, HealthResponse, LoginRequest, LogoutQuery, LogoutRequest,
    MethodOverride, SuccessResponse,
};
use crate::state::AppState;

const LOGIN_FIELDS_REQUIRED: &str = "Device, username and password are required.";
const LOGIN_FAILED: &str = "Sign-in failed.";
const STATE_FAILED: &str = "Could not load device status.";
const CONFIG_FAILED: &str = "Could not load device configuration.";
const SOURCES_FAILED: &str = "Could not load sources.";
const SOURCE_CREATE_FAILED: &str = "Could not create source.";
const SOURCE_UPDATE_FAILED: &str = "Could not update source.";
const SOURCE_DELETE_FAILED: &str = "Could not delete source.";
const PLAYBACK_FAILED: &str = "Could not save playback settings.";
const ACTION_FAILED: &str = "Action failed.";
const ACTION_NOT_ALLOWED: &str = "Action not allowed.";
const INFO_SCREEN_FAILED: &str = "Could not toggle the info screen.";
const EXPORT_FAILED: &str = "Export failed.";
const IMPORT_FAILED: &str = "Import failed.";
const LOG_FAILED: &str = "Could not download log.";
const PREVIEW_FAILED: &str = "Preview unavailable.";

const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";
const APPLICATION_JSON: &str = "application/json";

/// GET /health - Liveness probe.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        devices: state.registry().len(),
    })
}

/// GET /api/devices - Configured devices in registry order.
pub async fn list_devices(State(state): State<AppState>) -> Json<Vec<DeviceDefinition>> {
    Json(state.registry().list().to_vec())
}

/// GET /api/devices/active - Device read-only views should show.
pub async fn active_device(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Json<ActiveDeviceResponse> {
    let preferred = preferred_device(&headers);
    let device = state
        .registry()
        .default_device(preferred.as_deref())
        .cloned();

    Json(ActiveDeviceResponse { device })
}

/// POST /api/auth/login - Sign in to a device and store its session.
pub async fn login(
    State(state): State<AppState>,
    Caller(caller): Caller,
    body: Bytes,
) -> Result<Response> {
    let request: LoginRequest = serde_json::from_slice(&body).unwrap_or_default();
    let Some((device_id, username, password)) = request.credentials() else {
        return Err(ApiError::BadRequest(LOGIN_FIELDS_REQUIRED.to_string()));
    };

    let form = format!(
        "username={}&password={}",
        urlencoding::encode(username),
        urlencoding::encode(password)
    );
    let upstream = ProxyRequest::new(Method::POST, device_id, "/login")
        .with_body(form)
        .with_content_type(HeaderValue::from_static(FORM_URLENCODED))
        .with_caller(caller);

    let response = state
        .proxy
        .forward_buffered(upstream)
        .await
        .and_then(BufferedResponse::error_for_status)
        .map_err(device_error(&state, LOGIN_FAILED))?;

    info!(
        device = %device_id,
        user = %username,
        cookies = response.session.len(),
        "Signed in to device"
    );
    state
        .audit
        .record(AuditEntry::new(device_id, "auth.login").with_user(username));

    let mut reply = Json(SuccessResponse::ok()).into_response();
    // A new device replaces the previous jar even when it sets no cookies.
    if response.session.is_empty() {
        append_cookie(&mut reply, &state.session.clear());
    } else {
        append_session(&state, &mut reply, &response.session);
    }
    append_cookie(&mut reply, &state.session.marker(device_id));
    Ok(reply)
}

/// POST /api/auth/logout - Best-effort device logout, then clear cookies.
pub async fn logout(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Query(query): Query<LogoutQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request: LogoutRequest = serde_json::from_slice(&body).unwrap_or_default();
    let device_id = request
        .device_id
        .or(query.device)
        .or_else(|| preferred_device(&headers));

    if let Some(device_id) = device_id {
        let upstream =
            ProxyRequest::new(Method::POST, device_id.as_str(), "/logout").with_caller(caller);
        match state.proxy.forward(upstream).await {
            Ok(response) => debug!(
                device = %device_id,
                status = response.status().as_u16(),
                "Device session closed"
            ),
            Err(e) => warn!(device = %device_id, phase = %e.phase(), "Device logout failed: {}", e),
        }
        state.audit.record(AuditEntry::new(device_id, "auth.logout"));
    }

    info!("Signed out");
    let mut reply = Json(SuccessResponse::ok()).into_response();
    append_cookie(&mut reply, &state.session.clear());
    append_cookie(&mut reply, &state.session.clear_marker());
    reply
}

/// GET /api/devices/{device_id}/state
pub async fn device_state(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(device_id): Path<String>,
) -> Result<Response> {
    let request = ProxyRequest::get(device_id, "/api/state").with_caller(caller);
    json_call::<DeviceState>(&state, request, STATE_FAILED).await
}

/// GET /api/devices/{device_id}/config
pub async fn device_config(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(device_id): Path<String>,
) -> Result<Response> {
    let request = ProxyRequest::get(device_id, "/api/config").with_caller(caller);
    json_call::<DeviceConfig>(&state, request, CONFIG_FAILED).await
}

/// GET /api/devices/{device_id}/sources
pub async fn list_sources(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(device_id): Path<String>,
) -> Result<Response> {
    let request = ProxyRequest::get(device_id, "/api/sources").with_caller(caller);
    json_call::<Vec<MediaSource>>(&state, request, SOURCES_FAILED).await
}

/// POST /api/devices/{device_id}/sources
pub async fn create_source(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(device_id): Path<String>,
    body: Bytes,
) -> Result<Response> {
    let payload: SourcePayload = parse_payload(&body)?;
    payload.validate().map_err(invalid_input)?;

    let body = json_body(&payload)?;
    let request = ProxyRequest::new(Method::POST, device_id.as_str(), "/api/sources")
        .with_body(body.clone())
        .with_content_type(HeaderValue::from_static(APPLICATION_JSON))
        .with_caller(caller);

    let reply = ack_call(&state, request, SOURCE_CREATE_FAILED).await?;
    audit(&state, &device_id, "source.create", Some(&body));
    Ok(reply)
}

/// PUT /api/devices/{device_id}/sources/{name}
pub async fn update_source(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path((device_id, name)): Path<(String, String)>,
    body: Bytes,
) -> Result<Response> {
    let payload: SourceUpdate = parse_payload(&body)?;
    payload.validate().map_err(invalid_input)?;

    let body = json_body(&payload)?;
    let request = ProxyRequest::new(Method::PUT, device_id.as_str(), source_path(&name))
        .with_body(body.clone())
        .with_content_type(HeaderValue::from_static(APPLICATION_JSON))
        .with_caller(caller);

    let reply = ack_call(&state, request, SOURCE_UPDATE_FAILED).await?;
    audit(&state, &device_id, "source.update", Some(&body));
    Ok(reply)
}

/// DELETE /api/devices/{device_id}/sources/{name}
pub async fn delete_source(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path((device_id, name)): Path<(String, String)>,
) -> Result<Response> {
    remove_source(&state, caller, device_id, name).await
}

/// POST /api/devices/{device_id}/sources/{name}?_method=DELETE
///
/// HTML forms cannot send DELETE.
pub async fn source_method_override(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path((device_id, name)): Path<(String, String)>,
    Query(query): Query<MethodOverride>,
) -> Result<Response> {
    match query.method.as_deref() {
        Some(method) if method.eq_ignore_ascii_case("DELETE") => {
            remove_source(&state, caller, device_id, name).await
        }
        _ => Err(ApiError::MethodNotAllowed("Not supported.".to_string())),
    }
}

async fn remove_source(
    state: &AppState,
    caller: CallerContext,
    device_id: String,
    name: String,
) -> Result<Response> {
    let request = ProxyRequest::new(Method::DELETE, device_id.as_str(), source_path(&name))
        .with_caller(caller);

    let response = state
        .proxy
        .forward_buffered(request)
        .await
        .and_then(BufferedResponse::error_for_status)
        .map_err(device_error(state, SOURCE_DELETE_FAILED))?;

    audit(state, &device_id, "source.delete", Some(name.as_bytes()));
    Ok(json_response(state, &SuccessResponse::ok(), &response.session))
}

/// PUT /api/devices/{device_id}/playback
pub async fn update_playback(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(device_id): Path<String>,
    body: Bytes,
) -> Result<Response> {
    let payload: PlaybackSettings = parse_payload(&body)?;
    payload.validate().map_err(invalid_input)?;

    let body = json_body(&payload)?;
    let request = ProxyRequest::new(Method::PUT, device_id.as_str(), "/api/playback")
        .with_body(body.clone())
        .with_content_type(HeaderValue::from_static(APPLICATION_JSON))
        .with_caller(caller);

    let reply = ack_call(&state, request, PLAYBACK_FAILED).await?;
    audit(&state, &device_id, "playback.update", Some(&body));
    Ok(reply)
}

/// POST /api/devices/{device_id}/player/{action}
pub async fn player_action(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path((device_id, action)): Path<(String, String)>,
) -> Result<Response> {
    let action: PlayerAction = action
        .parse()
        .map_err(|_| ApiError::BadRequest(ACTION_NOT_ALLOWED.to_string()))?;

    let path = format!("/api/player/{}", action.as_str());
    let request = ProxyRequest::new(Method::POST, device_id.as_str(), path).with_caller(caller);

    let reply = ack_call(&state, request, ACTION_FAILED).await?;
    audit(&state, &device_id, &format!("player.{action}"), None);
    Ok(reply)
}

/// POST /api/devices/{device_id}/player/info-screen
pub async fn info_screen(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(device_id): Path<String>,
    body: Bytes,
) -> Result<Response> {
    let payload: InfoScreenToggle = serde_json::from_slice(&body).map_err(|_| {
        ApiError::BadRequest("Invalid input: `enabled` must be a boolean.".to_string())
    })?;

    let body = json_body(&payload)?;
    let request = ProxyRequest::new(Method::POST, device_id.as_str(), "/api/player/info-screen")
        .with_body(body.clone())
        .with_content_type(HeaderValue::from_static(APPLICATION_JSON))
        .with_caller(caller);

    let reply = ack_call(&state, request, INFO_SCREEN_FAILED).await?;
    audit(&state, &device_id, "player.info_screen", Some(&body));
    Ok(reply)
}

/// GET /api/devices/{device_id}/config/export - Streamed download.
pub async fn export_config(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(device_id): Path<String>,
) -> Result<Response> {
    let request = ProxyRequest::get(device_id, "/config/export").with_caller(caller);
    stream_call(&state, request, EXPORT_FAILED).await
}

/// POST /api/devices/{device_id}/config/import
///
/// The body is forwarded verbatim with the caller's content type, so
/// multipart uploads keep their boundary.
pub async fn import_config(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(device_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    let request = ProxyRequest::new(Method::POST, device_id.as_str(), "/config/import")
        .with_headers(headers)
        .with_body(body.clone())
        .with_caller(caller);

    let reply = ack_call(&state, request, IMPORT_FAILED).await?;
    audit(&state, &device_id, "config.import", Some(&body));
    Ok(reply)
}

/// GET /api/devices/{device_id}/logs/{log_name} - Streamed log download.
pub async fn download_log(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path((device_id, log_name)): Path<(String, String)>,
) -> Result<Response> {
    let path = format!("/logs/{}/download", urlencoding::encode(&log_name));
    let request = ProxyRequest::get(device_id, path).with_caller(caller);
    stream_call(&state, request, LOG_FAILED).await
}

/// GET /api/devices/{device_id}/media/preview/{*path} - Streamed preview.
pub async fn media_preview(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path((device_id, path)): Path<(String, String)>,
) -> Result<Response> {
    let request = ProxyRequest::get(device_id, preview_path(&path)).with_caller(caller);
    stream_call(&state, request, PREVIEW_FAILED).await
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn source_path(name: &str) -> String {
    format!("/api/sources/{}", urlencoding::encode(name))
}

/// Percent-encodes each segment of a catch-all path.
fn preview_path(path: &str) -> String {
    let encoded: Vec<_> = path
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect();
    format!("/media/preview/{}", encoded.join("/"))
}

fn device_error<'a>(
    state: &'a AppState,
    fallback: &'static str,
) -> impl FnOnce(ProxyError) -> ApiError + 'a {
    move |err| ApiError::from_proxy(err, fallback, &state.session)
}

fn parse_payload<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("Invalid input: {e}")))
}

fn invalid_input(err: ContractError) -> ApiError {
    ApiError::BadRequest(format!("Invalid input: {} {}", err.field, err.reason))
}

fn json_body<T: Serialize>(payload: &T) -> Result<Bytes> {
    serde_json::to_vec(payload)
        .map(Bytes::from)
        .map_err(|e| ApiError::Internal {
            message: format!("Failed to encode request: {e}"),
            set_cookie: None,
        })
}

fn audit(state: &AppState, device_id: &str, action: &str, payload: Option<&[u8]>) {
    let mut entry = AuditEntry::new(device_id, action);
    if let Some(payload) = payload {
        entry = entry.with_payload(payload);
    }
    state.audit.record(entry);
}

async fn json_call<T>(state: &AppState, request: ProxyRequest, fallback: &'static str) -> Result<Response>
where
    T: DeserializeOwned + Default + Serialize,
{
    let proxied = state
        .proxy
        .forward_json::<T>(request)
        .await
        .map_err(device_error(state, fallback))?;

    Ok(json_response(state, &proxied.value, &proxied.session))
}

/// Forwards a write and acknowledges it once the device answers 2xx.
///
/// Players answer some writes with plain text; an ack that is not JSON
/// becomes `{}` so the accepted write is not reported as a failure.
async fn ack_call(state: &AppState, request: ProxyRequest, fallback: &'static str) -> Result<Response> {
    let response = state
        .proxy
        .forward_buffered(request)
        .await
        .and_then(BufferedResponse::error_for_status)
        .map_err(device_error(state, fallback))?;

    let ack = serde_json::from_slice::<ActionAck>(&response.body).unwrap_or_else(|e| {
        if !response.body.iter().all(u8::is_ascii_whitespace) {
            debug!(status = response.status.as_u16(), "Device ack is not JSON: {}", e);
        }
        ActionAck::default()
    });

    Ok(json_response(state, &ack, &response.session))
}

async fn stream_call(state: &AppState, request: ProxyRequest, fallback: &'static str) -> Result<Response> {
    let upstream = state
        .proxy
        .forward(request)
        .await
        .map_err(device_error(state, fallback))?;

    let Passthrough {
        status,
        headers,
        session,
        body,
    } = upstream.into_passthrough();

    let mut response = Response::new(Body::from_stream(body));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    append_session(state, &mut response, &session);
    Ok(response)
}

fn json_response<T: Serialize>(state: &AppState, value: &T, session: &CookieJar) -> Response {
    let mut response = Json(value).into_response();
    append_session(state, &mut response, session);
    response
}

/// Re-homes rotated device cookies into the session carrier.
fn append_session(state: &AppState, response: &mut Response, session: &CookieJar) {
    if let Some(cookie) = state.session.set_cookie(session) {
        append_cookie(response, &cookie);
    }
}

fn append_cookie(response: &mut Response, cookie: &str) {
    match HeaderValue::from_str(cookie) {
        Ok(value) => {
            response.headers_mut().append(SET_COOKIE, value);
        }
        Err(_) => warn!("Dropping Set-Cookie value that is not a valid header"),
    }
}
