//! Anonymous subscribe-then-authenticate portal (access.network).
//!
//! ```text
//! GET  /?dst=…          (no redirects)  → Set-Cookie becomes the session cookie
//! POST portal_api.php   action=init
//! POST portal_api.php   action=subscribe     → info.subscribe.{login,password}
//! POST portal_api.php   action=authenticate  → user.validity.value > 10
//! ```

use log::info;
use serde_json::Value;

use crate::app::ports::{HttpPort, HttpRequest, HttpResponse};
use crate::error::{Error, ProtocolError};

use super::PortalAdapter;
use super::session::{CaptivePortalSession, Credentials};

/// Granted session validity must exceed this for the login to count.
pub const MIN_VALIDITY: f64 = 10.0;

const INIT_BODY: &str = "action=init&free_urls=";
const SUBSCRIBE_BODY: &str = "action=subscribe&type=one&connect_policy_accept=false\
    &user_login=&user_password=&user_password_confirm=&email_address=&prefix=&phone=\
    &policy_accept=false&gender=&interests=";

pub struct SubscriptionFlowAdapter {
    entry_url: String,
    api_url: String,
    origin: String,
}

impl SubscriptionFlowAdapter {
    pub fn new(
        entry_url: impl Into<String>,
        api_url: impl Into<String>,
        origin: impl Into<String>,
    ) -> Self {
        Self {
            entry_url: entry_url.into(),
            api_url: api_url.into(),
            origin: origin.into(),
        }
    }

    fn api_call(
        &self,
        session: &CaptivePortalSession,
        http: &mut dyn HttpPort,
        body: String,
    ) -> Result<HttpResponse, Error> {
        let req = session.decorate(HttpRequest::post(self.api_url.as_str(), body));
        Ok(http.execute(&req)?)
    }
}

impl Default for SubscriptionFlowAdapter {
    fn default() -> Self {
        Self::new(
            "https://controller.access.network/?dst=http%3A%2F%2Fcaptive.apple.com%2F",
            "https://controller.access.network/portal_api.php",
            "https://controller.access.network/",
        )
    }
}

impl PortalAdapter for SubscriptionFlowAdapter {
    fn name(&self) -> &'static str {
        "subscription-flow"
    }

    fn origin(&self) -> &str {
        &self.origin
    }

    fn authenticate(
        &self,
        session: &mut CaptivePortalSession,
        _probe: &HttpResponse,
        http: &mut dyn HttpPort,
    ) -> Result<(), Error> {
        let entry = session.decorate(HttpRequest::get(self.entry_url.as_str()).without_redirects());
        let resp = http.execute(&entry)?;
        let set_cookie = resp
            .header("Set-Cookie")
            .ok_or(ProtocolError::MissingHeader("Set-Cookie"))?;
        session.adopt_cookie(set_cookie);
        info!("Portal: got session cookie");

        self.api_call(session, http, INIT_BODY.to_owned())?;

        let resp = self.api_call(session, http, SUBSCRIBE_BODY.to_owned())?;
        let creds = parse_credentials(&resp.body)?;
        info!("Portal: subscribed as {}", creds.login);

        let body = format!(
            "action=authenticate&login={}&password={}&policy_accept=false&from_ajax=true&wispr_mode=false",
            urlencoding::encode(&creds.login),
            urlencoding::encode(&creds.password),
        );
        session.credentials = Some(creds);
        let resp = self.api_call(session, http, body)?;

        let validity = parse_validity(&resp.body)?;
        info!("Portal: granted validity {}", validity);
        if validity > MIN_VALIDITY {
            Ok(())
        } else {
            Err(ProtocolError::InsufficientValidity.into())
        }
    }
}

fn parse_json(body: &[u8]) -> Result<Value, ProtocolError> {
    serde_json::from_slice(body).map_err(|_| ProtocolError::MalformedJson)
}

/// `info.subscribe.login` / `info.subscribe.password` of a subscribe answer.
pub fn parse_credentials(body: &[u8]) -> Result<Credentials, ProtocolError> {
    let json = parse_json(body)?;
    let field = |ptr: &str, name: &'static str| {
        json.pointer(ptr)
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or(ProtocolError::MissingField(name))
    };
    Ok(Credentials {
        login: field("/info/subscribe/login", "info.subscribe.login")?,
        password: field("/info/subscribe/password", "info.subscribe.password")?,
    })
}

/// `user.validity.value` of an authenticate answer.
pub fn parse_validity(body: &[u8]) -> Result<f64, ProtocolError> {
    parse_json(body)?
        .pointer("/user/validity/value")
        .and_then(Value::as_f64)
        .ok_or(ProtocolError::MissingField("user.validity.value"))
}
