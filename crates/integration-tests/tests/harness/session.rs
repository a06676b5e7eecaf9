//! Session wiring against a [`MockGateway`]

use std::time::Duration;

use himmi_client::{ControlPlaneClient, GatewayClient, PricingInfo, Timeouts};
use himmi_config::Config;
use himmi_session::{BalanceTracker, CompletionSession, PreferenceRecorder, TurnRequest};
use secrecy::SecretString;

use super::mock_gateway::MockGateway;

pub const API_KEY: &str = "sk-or-v1-integration";

/// Builder for sessions talking to the mock
pub struct SessionBuilder<'a> {
    mock: &'a MockGateway,
    request_timeout: Option<Duration>,
    user_id: Option<u64>,
}

impl<'a> SessionBuilder<'a> {
    pub fn new(mock: &'a MockGateway) -> Self {
        Self {
            mock,
            request_timeout: None,
            user_id: None,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_user(mut self, user_id: u64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn control_plane(&self) -> ControlPlaneClient {
        ControlPlaneClient::new(self.mock.base_url()).unwrap()
    }

    pub fn build(self) -> CompletionSession {
        let gateway = GatewayClient::new(
            self.mock.base_url(),
            Timeouts {
                request: self.request_timeout,
                connect: Some(Duration::from_secs(5)),
            },
        )
        .unwrap();

        let control_plane = self.control_plane();
        let session =
            CompletionSession::new(gateway).with_preference_recorder(PreferenceRecorder::new(control_plane.clone()));

        match self.user_id {
            Some(user_id) => session.with_balance_tracker(BalanceTracker::new(control_plane, user_id)),
            None => session,
        }
    }
}

/// Write `toml` to a temporary `himmi.toml` and load it
pub fn load_config(toml: &str) -> Config {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("himmi.toml");
    std::fs::write(&path, toml).unwrap();

    Config::load(&path).unwrap()
}

/// Session wired from configuration the way the playground binary does it
pub fn session_from_config(config: &Config) -> CompletionSession {
    let gateway = GatewayClient::new(
        config.gateway.base_url.clone(),
        Timeouts {
            request: config.gateway.request_timeout().unwrap(),
            connect: Some(config.gateway.connect_timeout().unwrap()),
        },
    )
    .unwrap();

    let control_plane = ControlPlaneClient::new(config.control_plane.base_url.clone()).unwrap();
    let session = CompletionSession::new(gateway)
        .with_key_prefix(config.gateway.api_key_prefix.clone())
        .with_preference_recorder(PreferenceRecorder::new(control_plane.clone()));

    match config.playground.user_id {
        Some(user_id) => session.with_balance_tracker(BalanceTracker::new(control_plane, user_id)),
        None => session,
    }
}

/// A turn for `gpt-4o` priced like the mock catalog
pub fn turn(text: &str) -> TurnRequest {
    TurnRequest {
        text: text.to_owned(),
        model: "gpt-4o".to_owned(),
        pricing: PricingInfo::new(2.5, 10.0),
        api_key: SecretString::from(API_KEY),
        shadow_mode: false,
    }
}
