//! Ephemeral per-attempt portal state. Never persisted.

use crate::app::ports::HttpRequest;

/// Header set sent by a mobile browser; portals tend to serve their
/// simplest login page to it.
pub const MOBILE_BROWSER_HEADERS: [(&str, &str); 4] = [
    ("Content-Type", "application/x-www-form-urlencoded"),
    ("Connection", "keep-alive"),
    (
        "Accept",
        "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
    ),
    (
        "User-Agent",
        "Mozilla/5.0 (iPhone; CPU OS 12_4_8 like Mac OS X) AppleWebKit/605.1.15 \
         (KHTML, like Gecko) FxiOS/29.0  Mobile/15E148 Safari/605.1.15",
    ),
];

/// Cookie sent before the portal has issued a session cookie.
pub const INITIAL_COOKIE: &str = "div=1";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub login: String,
    pub password: String,
}

/// Headers, cookie, credentials and redirect target for one login attempt.
#[derive(Debug, Clone)]
pub struct CaptivePortalSession {
    origin: String,
    cookie: String,
    pub credentials: Option<Credentials>,
    pub redirect: Option<String>,
}

impl CaptivePortalSession {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            cookie: INITIAL_COOKIE.to_owned(),
            credentials: None,
            redirect: None,
        }
    }

    pub fn cookie(&self) -> &str {
        &self.cookie
    }

    /// Adopt a `Set-Cookie` value, keeping only the `name=value` part.
    pub fn adopt_cookie(&mut self, set_cookie: &str) {
        let pair = set_cookie.split(';').next().unwrap_or_default().trim();
        self.cookie = pair.to_owned();
    }

    /// Attach the session header set to `req`.
    pub fn decorate(&self, req: HttpRequest) -> HttpRequest {
        req.headers(MOBILE_BROWSER_HEADERS)
            .header("Origin", self.origin.as_str())
            .header("Cookie", self.cookie.as_str())
    }
}
