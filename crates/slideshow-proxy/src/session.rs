//! Session cookie codec.
//!
//! A player hands out its own session cookies on `/login`. Those cookies are
//! never given to the browser directly. Instead they are collected into a
//! [`CookieJar`], packed into a single opaque value, and stored in the
//! application's own HttpOnly session cookie. On later calls the jar is
//! unpacked again and replayed to the player as one `Cookie` header.
//!
//! ```text
//! player Set-Cookie ──extract──▶ CookieJar ──pack──▶ slideshow_manager_session
//!                                    ▲                          │
//!              Cookie: a=1; b=2 ◀─replay─ CookieJar ◀─unpack────┘
//! ```
//!
//! ## Usage
//!
//! ```
//! use reqwest::header::{HeaderMap, HeaderValue, SET_COOKIE};
//! use slideshow_proxy::session::CookieJar;
//!
//! let mut headers = HeaderMap::new();
//! headers.insert(SET_COOKIE, HeaderValue::from_static("a=1; Path=/, b=2; HttpOnly"));
//!
//! let jar = CookieJar::extract(&headers);
//! assert_eq!(jar.entries(), ["a=1", "b=2"]);
//!
//! let packed = jar.pack().unwrap();
//! assert_eq!(CookieJar::unpack(&packed), jar);
//! assert_eq!(jar.cookie_header().as_deref(), Some("a=1; b=2"));
//! ```

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use reqwest::header::{HeaderMap, COOKIE, SET_COOKIE};
use slideshow_core::config::ACTIVE_DEVICE_COOKIE;
use tracing::warn;

/// Ordered `name=value` assignments captured from one player.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieJar {
    entries: Vec<String>,
}

impl CookieJar {
    /// Creates an empty jar.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a jar from raw `name=value` strings, keeping their order.
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entries: entries.into_iter().map(Into::into).collect(),
        }
    }

    /// The stored assignments in replay order.
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Returns true if the jar holds no cookies.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of stored cookies.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Collects the `name=value` part of every `Set-Cookie` header.
    ///
    /// Attributes (`Path`, `Expires`, `SameSite`, ...) are dropped. Missing
    /// headers yield an empty jar.
    pub fn extract(headers: &HeaderMap) -> Self {
        let entries = headers
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(split_set_cookie)
            .filter_map(|segment| segment.split(';').next().map(str::trim))
            .filter(|pair| !pair.is_empty())
            .map(str::to_string)
            .collect();

        Self { entries }
    }

    /// Serializes the jar into one cookie-safe value.
    ///
    /// Returns `None` for an empty jar; no session cookie should be set then.
    pub fn pack(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }

        serde_json::to_vec(&self.entries)
            .ok()
            .map(|json| URL_SAFE_NO_PAD.encode(json))
    }

    /// Restores a jar produced by [`CookieJar::pack`].
    ///
    /// A bare JSON array is accepted as well. Anything malformed yields an
    /// empty jar so the caller simply has to sign in again.
    pub fn unpack(value: &str) -> Self {
        let value = value.trim().trim_matches('"');
        if value.is_empty() {
            return Self::new();
        }

        let json = if value.starts_with('[') {
            Some(value.as_bytes().to_vec())
        } else {
            URL_SAFE_NO_PAD.decode(value).ok()
        };

        let entries = json.and_then(|json| serde_json::from_slice::<Vec<String>>(&json).ok());

        match entries {
            Some(entries) if entries.iter().all(|entry| is_replayable(entry)) => {
                Self { entries }
            }
            _ => {
                warn!("Ignoring malformed stored session cookie");
                Self::new()
            }
        }
    }

    /// Value for the outbound `Cookie` header, or `None` to send no header.
    pub fn cookie_header(&self) -> Option<String> {
        if self.is_empty() {
            None
        } else {
            Some(self.entries.join("; "))
        }
    }
}

/// Splits a combined `Set-Cookie` value into individual cookies.
///
/// A comma only separates two cookies when the text after it, up to the next
/// `;`, contains `=`. Commas inside attribute values such as
/// `Expires=Wed, 21 Oct 2015 07:28:00 GMT` are kept.
pub fn split_set_cookie(value: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;

    for (index, ch) in value.char_indices() {
        if ch != ',' {
            continue;
        }

        let rest = &value[index + 1..];
        let token_end = rest.find(|c: char| c == ';' || c == ',').unwrap_or(rest.len());
        if rest[..token_end].contains('=') {
            parts.push(&value[start..index]);
            start = index + 1;
        }
    }

    parts.push(&value[start..]);
    parts
}

fn is_replayable(entry: &str) -> bool {
    !entry.is_empty() && entry.bytes().all(|b| (0x20..0x7f).contains(&b) && b != b';')
}

/// Looks up a cookie by name in the request's `Cookie` headers.
pub fn find_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(|header| cookie_value(header, name))
        .map(str::to_string)
}

/// Looks up a cookie by name in one `Cookie` header value.
pub fn cookie_value<'a>(cookie_header: &'a str, name: &str) -> Option<&'a str> {
    cookie_header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key.trim() == name).then_some(value.trim())
    })
}

/// The application's own session carrier cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    name: String,
}

impl SessionCookie {
    /// Creates a carrier with the given cookie name.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// The cookie name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reads and unpacks the caller's jar from request headers.
    pub fn read(&self, headers: &HeaderMap) -> CookieJar {
        find_cookie(headers, &self.name)
            .map(|value| CookieJar::unpack(&value))
            .unwrap_or_default()
    }

    /// `Set-Cookie` value storing the jar. `None` when the jar is empty.
    pub fn set_cookie(&self, jar: &CookieJar) -> Option<String> {
        jar.pack().map(|packed| {
            format!(
                "{}={}; Path=/; HttpOnly; Secure; SameSite=Lax",
                self.name, packed
            )
        })
    }

    /// `Set-Cookie` value that deletes the carrier.
    pub fn clear(&self) -> String {
        format!(
            "{}=; Path=/; Max-Age=0; HttpOnly; Secure; SameSite=Lax",
            self.name
        )
    }

    /// `Set-Cookie` value for the active-device marker.
    ///
    /// The marker is readable by scripts and only picks a default device for
    /// read-only views.
    pub fn marker(&self, device_id: &str) -> String {
        format!(
            "{}={}; Path=/; SameSite=Lax",
            ACTIVE_DEVICE_COOKIE,
            urlencoding::encode(device_id)
        )
    }

    /// `Set-Cookie` value that deletes the active-device marker.
    pub fn clear_marker(&self) -> String {
        format!("{}=; Path=/; Max-Age=0; SameSite=Lax", ACTIVE_DEVICE_COOKIE)
    }
}

/// Reads the active-device marker from request headers.
pub fn read_active_device(headers: &HeaderMap) -> Option<String> {
    find_cookie(headers, ACTIVE_DEVICE_COOKIE)
        .and_then(|value| urlencoding::decode(&value).ok().map(|id| id.into_owned()))
        .filter(|id| !id.is_empty())
}
