//! Hidden-form resubmission portal (hotsplots).
//!
//! 1. Scrape every hidden `<input>` name/value pair from the intercepted
//!    probe page.
//! 2. POST them back, behind two fixed fields, to the login endpoint.
//! 3. Follow the `<meta http-equiv="refresh">` target from the answer.

use log::{debug, info};

use crate::app::ports::{HttpPort, HttpRequest, HttpResponse};
use crate::error::{Error, ProtocolError};

use super::PortalAdapter;
use super::session::CaptivePortalSession;

const HIDDEN_INPUT: &str = "<input type=\"hidden\" name=\"";
const VALUE_ATTR: &str = "value=\"";
const META_REFRESH: &str = "<meta http-equiv=\"refresh\" content=\"0;url=";

/// Fields the portal expects ahead of the scraped ones.
pub const FIXED_FIELDS: [&str; 2] = ["termsOK=1", "button=kostenlos+einloggen"];

pub struct FormResubmissionAdapter {
    login_url: String,
    origin: String,
}

impl FormResubmissionAdapter {
    pub fn new(login_url: impl Into<String>, origin: impl Into<String>) -> Self {
        Self {
            login_url: login_url.into(),
            origin: origin.into(),
        }
    }
}

impl Default for FormResubmissionAdapter {
    fn default() -> Self {
        Self::new(
            "https://www.hotsplots.de/auth/login.php",
            "https://www.hotsplots.de",
        )
    }
}

impl PortalAdapter for FormResubmissionAdapter {
    fn name(&self) -> &'static str {
        "form-resubmission"
    }

    fn origin(&self) -> &str {
        &self.origin
    }

    fn authenticate(
        &self,
        session: &mut CaptivePortalSession,
        probe: &HttpResponse,
        http: &mut dyn HttpPort,
    ) -> Result<(), Error> {
        let body = build_form_body(&probe.text());
        debug!("Portal: form body {}", body);

        let login = session.decorate(HttpRequest::post(self.login_url.as_str(), body));
        let answer = http.execute(&login)?;
        info!("Portal: submitted login form");

        let target = find_meta_refresh(&answer.text())
            .ok_or(ProtocolError::MissingPattern("meta refresh"))?;
        session.redirect = Some(target.clone());

        http.execute(&HttpRequest::get(target))?;
        info!("Portal: followed second-stage redirect");
        Ok(())
    }
}

/// Hidden-input `(name, value)` pairs, left to right, non-overlapping.
/// Values are passed through as they appear in the markup.
pub fn scrape_hidden_fields(html: &str) -> Vec<(&str, &str)> {
    let mut fields = Vec::new();
    let mut cursor = 0;
    while let Some(found) = html[cursor..].find(HIDDEN_INPUT) {
        let name_start = cursor + found + HIDDEN_INPUT.len();
        let Some(name_len) = html[name_start..].find('"') else {
            break;
        };
        let name_end = name_start + name_len;
        let Some(value_at) = html[name_end..].find(VALUE_ATTR) else {
            break;
        };
        let value_start = name_end + value_at + VALUE_ATTR.len();
        let Some(value_len) = html[value_start..].find('"') else {
            break;
        };
        let value_end = value_start + value_len;
        fields.push((&html[name_start..name_end], &html[value_start..value_end]));
        cursor = value_end;
    }
    fields
}

/// Fixed fields followed by every scraped pair, joined with `&`.
pub fn build_form_body(html: &str) -> String {
    FIXED_FIELDS
        .iter()
        .map(|f| (*f).to_owned())
        .chain(
            scrape_hidden_fields(html)
                .into_iter()
                .map(|(n, v)| format!("{n}={v}")),
        )
        .collect::<Vec<_>>()
        .join("&")
}

/// Redirect target of a zero-delay meta refresh, `&amp;` unescaped.
pub fn find_meta_refresh(html: &str) -> Option<String> {
    let start = html.find(META_REFRESH)? + META_REFRESH.len();
    let len = html[start..].find('"')?;
    Some(html[start..start + len].replace("&amp;", "&"))
}
