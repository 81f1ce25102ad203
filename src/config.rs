use std::path::PathBuf;

use url::Url;

use crate::error::ClientError;
use crate::gateway::{GatewaySettings, DEFAULT_APP_ID, DEFAULT_LOGIN_ROUTE};

pub const DEFAULT_SERVER: &str = "http://localhost:8080";
const STATE_DIR_NAME: &str = "ledgerlock";

/// `<config dir>/ledgerlock`, e.g. `~/.config/ledgerlock` on Linux.
pub fn default_state_dir() -> Result<PathBuf, ClientError> {
    let base = dirs::config_dir().ok_or(ClientError::ConfigDirNotFound)?;
    Ok(base.join(STATE_DIR_NAME))
}

/// Resolved client settings, after flags and environment.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server: Url,
    pub state_dir: PathBuf,
    pub app_id: String,
    pub login_route: String,
}

impl ClientConfig {
    /// `state_dir` of `None` falls back to [`default_state_dir`].
    pub fn resolve(
        server: Url,
        state_dir: Option<PathBuf>,
        app_id: Option<String>,
        login_route: Option<String>,
    ) -> Result<Self, ClientError> {
        let state_dir = match state_dir {
            Some(dir) => dir,
            None => default_state_dir()?,
        };
        Ok(Self {
            server,
            state_dir,
            app_id: non_empty(app_id).unwrap_or_else(|| DEFAULT_APP_ID.to_string()),
            login_route: non_empty(login_route).unwrap_or_else(|| DEFAULT_LOGIN_ROUTE.to_string()),
        })
    }

    pub fn gateway_settings(&self) -> GatewaySettings {
        GatewaySettings {
            app_id: self.app_id.clone(),
            login_route: self.login_route.clone(),
            ..GatewaySettings::default()
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
