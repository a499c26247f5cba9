use std::{fs, path::Path, time::Duration};

use serde::Deserialize;
use tracing::warn;
use url::Url;

use crate::{error::ChannelError, session::AuthToken};

const SETTINGS_FILE: &str = "client.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    pub server_url: String,
    pub hub_path: String,
    pub request_timeout_secs: Option<u64>,
    pub event_buffer: usize,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8000".into(),
            hub_path: "/ws/hub".into(),
            request_timeout_secs: None,
            event_buffer: 1024,
        }
    }
}

impl ClientSettings {
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    pub fn event_capacity(&self) -> usize {
        self.event_buffer.max(1)
    }

    /// Websocket URL of the hub, with the bearer token in the `token` query parameter.
    pub fn live_channel_url(&self, token: &AuthToken) -> Result<Url, ChannelError> {
        let base = self.server_url.trim().trim_end_matches('/');
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            return Err(ChannelError::InvalidServerUrl(self.server_url.clone()));
        };

        let hub_path = self.hub_path.trim();
        let separator = if hub_path.starts_with('/') { "" } else { "/" };
        let mut url = Url::parse(&format!("{ws_base}{separator}{hub_path}"))?;
        url.query_pairs_mut().append_pair("token", token.expose());
        Ok(url)
    }
}

pub fn load_settings() -> ClientSettings {
    load_settings_from(Path::new(SETTINGS_FILE), |key| std::env::var(key).ok())
}

pub fn load_settings_from(path: &Path, env: impl Fn(&str) -> Option<String>) -> ClientSettings {
    let mut settings = match fs::read_to_string(path) {
        Ok(raw) => match toml::from_str::<ClientSettings>(&raw) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(path = %path.display(), %err, "ignoring malformed settings file");
                ClientSettings::default()
            }
        },
        Err(_) => ClientSettings::default(),
    };

    if let Some(v) = env("CHAT_SERVER_URL") {
        settings.server_url = v;
    }
    if let Some(v) = env("APP__SERVER_URL") {
        settings.server_url = v;
    }

    if let Some(v) = env("APP__HUB_PATH") {
        settings.hub_path = v;
    }

    if let Some(v) = env("APP__REQUEST_TIMEOUT_SECS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.request_timeout_secs = Some(parsed);
        }
    }

    if let Some(v) = env("APP__EVENT_BUFFER") {
        if let Ok(parsed) = v.parse::<usize>() {
            settings.event_buffer = parsed;
        }
    }

    settings
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
