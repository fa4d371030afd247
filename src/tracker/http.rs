//! HTTP tracker client.
//!
//! Blocking `ureq` transport with bearer-token auth and a per-request
//! timeout. Repeated 401/403 warnings are collapsed to one per run to keep
//! nightly logs readable.

use std::collections::HashSet;
use std::path::Path;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::core::config::TrackerSettings;
use crate::core::paths::as_portable_string;
use crate::sidecar::schema::Sidecar;
use crate::tracker::{LookupOutcome, PostOutcome, StatusTag, Tracker};

pub struct HttpTracker {
    agent: ureq::Agent,
    base_url: String,
    token: Option<String>,
    /// Auth codes already warned about this run.
    warned_auth: Mutex<HashSet<u16>>,
}

impl HttpTracker {
    #[must_use]
    pub fn new(settings: &TrackerSettings) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(settings.timeout)
            .build();
        Self {
            agent,
            base_url: settings.base_url.clone(),
            token: settings.api_token.clone(),
            warned_auth: Mutex::new(HashSet::new()),
        }
    }

    fn authorize(&self, request: ureq::Request) -> ureq::Request {
        match &self.token {
            Some(token) => request.set("Authorization", &format!("Bearer {token}")),
            None => request,
        }
    }

    /// Warn about an auth failure at most once per code per run.
    fn note_auth_failure(&self, code: u16, context: &str) {
        if self.warned_auth.lock().insert(code) {
            warn!(http_code = code, context, "tracker rejected credentials");
        }
    }

    fn classify_error(&self, err: &ureq::Error, context: &str) -> (StatusTag, Option<u16>) {
        match err {
            ureq::Error::Status(code, _) => {
                let tag = StatusTag::from_http(*code);
                if tag == StatusTag::Unauthorized {
                    self.note_auth_failure(*code, context);
                } else {
                    debug!(http_code = code, context, "tracker returned failure status");
                }
                (tag, Some(*code))
            }
            ureq::Error::Transport(transport) => {
                debug!(context, error = %transport, "tracker transport failure");
                (StatusTag::Error, None)
            }
        }
    }
}

impl Tracker for HttpTracker {
    fn lookup(&self, asset_path: &Path) -> LookupOutcome {
        let url = format!("{}/asset/asset-search", self.base_url);
        let request = self
            .authorize(self.agent.get(&url))
            .query("path", &as_portable_string(asset_path));

        match request.call() {
            Ok(response) => {
                let http_code = response.status();
                let asset_id = response
                    .into_json::<Value>()
                    .ok()
                    .and_then(|body| body.get("asset_id").cloned())
                    .and_then(|id| match id {
                        Value::String(s) if !s.is_empty() => Some(s),
                        _ => None,
                    });
                LookupOutcome {
                    asset_id,
                    status: StatusTag::Ok,
                    http_code: Some(http_code),
                }
            }
            Err(err) => {
                let (status, http_code) = self.classify_error(&err, "lookup");
                LookupOutcome {
                    asset_id: None,
                    status,
                    http_code,
                }
            }
        }
    }

    fn post_result(&self, asset_id: &str, sidecar: &Sidecar) -> PostOutcome {
        let url = format!("{}/asset/qc", self.base_url);
        let body = match serde_json::to_value(sidecar) {
            Ok(mut value) => {
                if let Value::Object(map) = &mut value {
                    map.insert("asset_id".to_string(), Value::String(asset_id.to_string()));
                }
                value
            }
            Err(error) => {
                warn!(%error, "sidecar did not serialize for tracker post");
                return PostOutcome {
                    status: StatusTag::Error,
                    http_code: None,
                };
            }
        };

        match self.authorize(self.agent.post(&url)).send_json(body) {
            Ok(response) => PostOutcome {
                status: StatusTag::Ok,
                http_code: Some(response.status()),
            },
            Err(err) => {
                let (status, http_code) = self.classify_error(&err, "post_result");
                PostOutcome { status, http_code }
            }
        }
    }
}
