//! # Bridge configuration and upstream credentials.
//!
//! Two records live here:
//!
//! 1. [`BridgeConfig`] — runtime knobs for the bridge manager (topic
//!    namespace, hand-off queue capacity).
//! 2. [`Credentials`] — the static four-field credential record required to
//!    authenticate against the upstream service. All four fields are
//!    mandatory; there is no partial or degraded mode.
//!
//! ## Sentinel values
//! - `event_queue = 0` is clamped to 1 by [`BridgeConfig::event_queue_clamped`].

use serde::Deserialize;
use std::path::Path;

use crate::error::BridgeError;

/// Runtime configuration for the bridge manager.
///
/// ## Field semantics
/// - `namespace`: topic prefix under which bridged events are published
///   (`"<namespace>/<source>"`).
/// - `event_queue`: capacity of the bounded hand-off queue between the
///   receive loop and the fan-out loop. Small on purpose: it only needs to
///   absorb momentary fan-out stalls, never to buffer a backlog.
#[derive(Clone, Debug)]
pub struct BridgeConfig {
    /// Topic prefix for published events.
    pub namespace: String,

    /// Hand-off queue capacity between receive and fan-out (min 1; clamped).
    pub event_queue: usize,
}

impl BridgeConfig {
    /// Returns the hand-off queue capacity clamped to a minimum of 1.
    #[inline]
    pub fn event_queue_clamped(&self) -> usize {
        self.event_queue.max(1)
    }
}

impl Default for BridgeConfig {
    /// Default configuration:
    ///
    /// - `namespace = "$stream"`
    /// - `event_queue = 2`
    fn default() -> Self {
        Self {
            namespace: "$stream".to_string(),
            event_queue: 2,
        }
    }
}

/// Static credential record for the upstream service.
///
/// Deserializes from the camelCase JSON shape of the secrets file:
///
/// ```json
/// {
///   "consumerKey": "...",
///   "consumerSecret": "...",
///   "accessToken": "...",
///   "accessSecret": "..."
/// }
/// ```
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    /// Application consumer key.
    #[serde(default)]
    pub consumer_key: String,
    /// Application consumer secret.
    #[serde(default)]
    pub consumer_secret: String,
    /// Account access token.
    #[serde(default)]
    pub access_token: String,
    /// Account access secret.
    #[serde(default)]
    pub access_secret: String,
}

impl Credentials {
    /// Validates that every credential field is present and non-empty.
    ///
    /// Returns [`BridgeError::Config`] naming the first offending field.
    /// Validation failure is fatal for initialization: callers must not
    /// construct a transport from partially filled credentials.
    pub fn validate(&self) -> Result<(), BridgeError> {
        let fields: [(&'static str, &str); 4] = [
            ("consumer_key", &self.consumer_key),
            ("consumer_secret", &self.consumer_secret),
            ("access_token", &self.access_token),
            ("access_secret", &self.access_secret),
        ];
        for (field, value) in fields {
            if value.is_empty() {
                return Err(BridgeError::Config { field });
            }
        }
        Ok(())
    }

    /// Reads, parses, and validates the credentials file at `path`.
    ///
    /// I/O and parse failures surface as [`BridgeError::ConfigRead`];
    /// missing/empty fields surface as [`BridgeError::Config`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, BridgeError> {
        let bytes = std::fs::read(path).map_err(|e| BridgeError::ConfigRead {
            reason: e.to_string(),
        })?;
        let creds: Credentials =
            serde_json::from_slice(&bytes).map_err(|e| BridgeError::ConfigRead {
                reason: e.to_string(),
            })?;
        creds.validate()?;
        Ok(creds)
    }
}
