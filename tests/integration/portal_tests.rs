//! Captive-portal flows driven end to end over a scripted HTTP backend.

use cwa_sensor::app::ports::{HttpResponse, Method};
use cwa_sensor::config::{PortalConfig, PortalProvider};
use cwa_sensor::error::NetworkError;
use cwa_sensor::portal::{
    CaptivePortalAuthenticator, FormResubmissionAdapter, SubscriptionFlowAdapter,
};

use super::mocks::ScriptedHttp;

const PROBE: &str = "http://probe.test/hotspot-detect.html";
const MARKER: &str = "<HTML><HEAD><TITLE>Success</TITLE></HEAD><BODY>Success</BODY></HTML>";

const LOGIN: &str = "https://hotspot.test/auth/login.php";
const ENTRY: &str = "https://portal.test/?dst=x";
const API: &str = "https://portal.test/portal_api.php";

const INTERCEPT_PAGE: &str = r#"<html><body><form action="/auth/login.php" method="post">
<input type="hidden" name="a" value="1">
<input type="checkbox" name="termsOK">
<input type="hidden" name="b" value="2">
</form></body></html>"#;

fn marker_probe() -> HttpResponse {
    HttpResponse::ok(format!("{MARKER}\n"))
}

// ── Probe ─────────────────────────────────────────────────────

#[test]
fn open_network_needs_one_request() {
    let auth = CaptivePortalAuthenticator::new(PROBE, MARKER, None);
    let mut http = ScriptedHttp::new(Box::new(|_| Ok(marker_probe())));

    assert!(auth.ensure_online(&mut http));
    assert_eq!(http.requests.len(), 1);
    assert_eq!(http.requests[0].url, PROBE);
    assert_eq!(http.requests[0].method, Method::Get);
}

#[test]
fn intercepted_probe_without_provider_is_offline() {
    let cfg = PortalConfig {
        provider: PortalProvider::None,
        probe_url: PROBE.into(),
        ..Default::default()
    };
    let auth = CaptivePortalAuthenticator::from_config(&cfg);
    let mut http = ScriptedHttp::new(Box::new(|_| Ok(HttpResponse::ok(INTERCEPT_PAGE))));

    assert!(!auth.ensure_online(&mut http));
    assert_eq!(http.requests.len(), 1);
}

// ── Form resubmission ─────────────────────────────────────────

fn form_auth() -> CaptivePortalAuthenticator {
    CaptivePortalAuthenticator::new(
        PROBE,
        MARKER,
        Some(Box::new(FormResubmissionAdapter::new(
            LOGIN,
            "https://hotspot.test",
        ))),
    )
}

#[test]
fn form_portal_resubmits_hidden_fields_and_follows_refresh() {
    let auth = form_auth();
    let mut http = ScriptedHttp::new(Box::new(|req| match req.url.as_str() {
        PROBE => Ok(HttpResponse::ok(INTERCEPT_PAGE)),
        LOGIN => Ok(HttpResponse::ok(
            r#"<meta http-equiv="refresh" content="0;url=http://10.0.0.1/logon?u=x&amp;res=ok">"#,
        )),
        _ => Ok(HttpResponse::ok("welcome")),
    }));

    assert!(auth.ensure_online(&mut http));
    assert_eq!(http.requests.len(), 3);

    let login = &http.requests[1];
    assert_eq!(login.method, Method::Post);
    assert_eq!(
        login.body_text(),
        "termsOK=1&button=kostenlos+einloggen&a=1&b=2"
    );
    assert_eq!(login.header_value("Cookie"), Some("div=1"));
    assert_eq!(login.header_value("Origin"), Some("https://hotspot.test"));
    assert_eq!(
        login.header_value("Content-Type"),
        Some("application/x-www-form-urlencoded")
    );

    assert_eq!(http.requests[2].url, "http://10.0.0.1/logon?u=x&res=ok");
}

#[test]
fn form_portal_without_refresh_fails() {
    let auth = form_auth();
    let mut http = ScriptedHttp::new(Box::new(|req| match req.url.as_str() {
        PROBE => Ok(HttpResponse::ok(INTERCEPT_PAGE)),
        _ => Ok(HttpResponse::ok("<html>try again</html>")),
    }));

    assert!(!auth.ensure_online(&mut http));
    assert_eq!(http.requests.len(), 2);
}

#[test]
fn form_portal_transport_error_fails() {
    let auth = form_auth();
    let mut http = ScriptedHttp::new(Box::new(|req| match req.url.as_str() {
        PROBE => Ok(HttpResponse::ok(INTERCEPT_PAGE)),
        _ => Err(NetworkError::Timeout),
    }));

    assert!(!auth.ensure_online(&mut http));
}

// ── Subscription flow ─────────────────────────────────────────

fn subscription_backend(validity: u32) -> ScriptedHttp {
    ScriptedHttp::new(Box::new(move |req| {
        if req.url == PROBE {
            return Ok(HttpResponse::ok("<html>redirecting</html>"));
        }
        if req.url == ENTRY {
            return Ok(HttpResponse {
                status: 302,
                headers: vec![(
                    "Set-Cookie".into(),
                    "PHPSESSID=s3ss; path=/; HttpOnly".into(),
                )],
                body: Vec::new(),
            });
        }
        let body = req.body_text();
        if body.starts_with("action=init") {
            Ok(HttpResponse::ok("{}"))
        } else if body.starts_with("action=subscribe") {
            Ok(HttpResponse::ok(
                r#"{"info":{"subscribe":{"login":"u 42","password":"p&w=1"}}}"#,
            ))
        } else if body.starts_with("action=authenticate") {
            Ok(HttpResponse::ok(format!(
                r#"{{"user":{{"validity":{{"value":{validity}}}}}}}"#
            )))
        } else {
            Ok(HttpResponse {
                status: 400,
                ..Default::default()
            })
        }
    }))
}

fn subscription_auth() -> CaptivePortalAuthenticator {
    CaptivePortalAuthenticator::new(
        PROBE,
        MARKER,
        Some(Box::new(SubscriptionFlowAdapter::new(
            ENTRY,
            API,
            "https://portal.test/",
        ))),
    )
}

#[test]
fn subscription_flow_logs_in_with_granted_credentials() {
    let auth = subscription_auth();
    let mut http = subscription_backend(15);

    assert!(auth.ensure_online(&mut http));
    assert_eq!(http.requests.len(), 5);

    let entry = &http.requests[1];
    assert_eq!(entry.url, ENTRY);
    assert!(!entry.follow_redirects);
    assert_eq!(entry.header_value("Cookie"), Some("div=1"));

    for api in &http.requests[2..] {
        assert_eq!(api.url, API);
        assert_eq!(api.method, Method::Post);
        assert_eq!(api.header_value("Cookie"), Some("PHPSESSID=s3ss"));
        assert_eq!(api.header_value("Origin"), Some("https://portal.test/"));
    }

    let authenticate = http.requests[4].body_text();
    assert!(authenticate.contains("login=u%2042&password=p%26w%3D1&"));
}

#[test]
fn subscription_flow_rejects_short_validity() {
    let auth = subscription_auth();
    let mut http = subscription_backend(5);

    assert!(!auth.ensure_online(&mut http));
    assert_eq!(http.requests.len(), 5);
}

#[test]
fn subscription_flow_without_cookie_stops_at_entry() {
    let auth = subscription_auth();
    let mut http = ScriptedHttp::new(Box::new(|req| {
        if req.url == PROBE {
            Ok(HttpResponse::ok("<html>redirecting</html>"))
        } else {
            Ok(HttpResponse {
                status: 302,
                ..Default::default()
            })
        }
    }));

    assert!(!auth.ensure_online(&mut http));
    assert_eq!(http.requests.len(), 2);
}
