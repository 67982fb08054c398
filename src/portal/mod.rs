//! Captive-portal detection and login.
//!
//! ```text
//!  ensure_online ──GET probe──▶ body == marker? ──yes──▶ true
//!                                     │ no
//!                                     ▼
//!                         PortalAdapter::authenticate(fresh session)
//!                                     │
//!                              Ok ──▶ true   Err ──▶ false
//! ```
//!
//! The provider is a strategy object chosen from [`PortalConfig`]; adding a
//! provider means adding a [`PortalAdapter`] impl and a
//! [`PortalProvider`] variant, nothing else.

pub mod form;
pub mod session;
pub mod subscription;

use log::{info, warn};

use crate::app::ports::{HttpPort, HttpRequest, HttpResponse};
use crate::config::{PortalConfig, PortalProvider};
use crate::error::Error;

pub use form::FormResubmissionAdapter;
pub use session::{CaptivePortalSession, Credentials};
pub use subscription::SubscriptionFlowAdapter;

/// One provider's login state machine.
pub trait PortalAdapter {
    fn name(&self) -> &'static str;

    /// Origin header value for this provider's requests.
    fn origin(&self) -> &str;

    /// Run the login flow. `probe` is the intercepted probe response.
    fn authenticate(
        &self,
        session: &mut CaptivePortalSession,
        probe: &HttpResponse,
        http: &mut dyn HttpPort,
    ) -> Result<(), Error>;
}

pub struct CaptivePortalAuthenticator {
    probe_url: String,
    success_marker: String,
    adapter: Option<Box<dyn PortalAdapter>>,
}

impl CaptivePortalAuthenticator {
    pub fn new(
        probe_url: impl Into<String>,
        success_marker: impl Into<String>,
        adapter: Option<Box<dyn PortalAdapter>>,
    ) -> Self {
        Self {
            probe_url: probe_url.into(),
            success_marker: success_marker.into(),
            adapter,
        }
    }

    pub fn from_config(cfg: &PortalConfig) -> Self {
        let adapter: Option<Box<dyn PortalAdapter>> = match cfg.provider {
            PortalProvider::None => None,
            PortalProvider::FormResubmission => Some(Box::new(FormResubmissionAdapter::default())),
            PortalProvider::SubscriptionFlow => Some(Box::new(SubscriptionFlowAdapter::default())),
        };
        Self::new(cfg.probe_url.as_str(), cfg.success_marker.as_str(), adapter)
    }

    /// `true` once real egress is available. Holds no state between calls.
    pub fn ensure_online(&self, http: &mut dyn HttpPort) -> bool {
        let probe = match http.execute(&HttpRequest::get(self.probe_url.as_str())) {
            Ok(r) => r,
            Err(e) => {
                warn!("Portal: probe failed ({})", e);
                return false;
            }
        };

        if self.is_success(&probe) {
            info!("Portal: no captive portal in place");
            return true;
        }

        let Some(adapter) = self.adapter.as_deref() else {
            warn!("Portal: probe intercepted and no provider configured");
            return false;
        };

        info!("Portal: intercepted, running {} login", adapter.name());
        let mut session = CaptivePortalSession::new(adapter.origin());
        match adapter.authenticate(&mut session, &probe, http) {
            Ok(()) => {
                info!("Portal: {} login succeeded", adapter.name());
                true
            }
            Err(e) => {
                warn!("Portal: {} login failed ({})", adapter.name(), e);
                false
            }
        }
    }

    /// Byte-exact marker match. Trailing ASCII whitespace is ignored since
    /// the probe server terminates its body with a newline.
    fn is_success(&self, probe: &HttpResponse) -> bool {
        trim_ascii_end(&probe.body) == self.success_marker.as_bytes()
    }
}

fn trim_ascii_end(b: &[u8]) -> &[u8] {
    let end = b
        .iter()
        .rposition(|c| !c.is_ascii_whitespace())
        .map_or(0, |i| i + 1);
    &b[..end]
}
