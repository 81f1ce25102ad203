//! Display theme preference, stored next to the credentials but independent of
//! them: teardown never touches it.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::ClientError;
use crate::storage::{SecretStorage, THEME_KEY};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Theme {
    #[default]
    System,
    Light,
    Dark,
}

impl Theme {
    pub fn as_str(self) -> &'static str {
        match self {
            Theme::System => "system",
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown theme '{0}' (expected system, light or dark)")]
pub struct UnknownTheme(String);

impl FromStr for Theme {
    type Err = UnknownTheme;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "system" => Ok(Theme::System),
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            _ => Err(UnknownTheme(s.to_string())),
        }
    }
}

pub struct Preferences {
    storage: Arc<dyn SecretStorage>,
}

impl Preferences {
    pub fn new(storage: Arc<dyn SecretStorage>) -> Self {
        Self { storage }
    }

    /// Stored theme; missing or unrecognized values read as [`Theme::System`].
    pub fn theme(&self) -> Theme {
        self.storage
            .get(THEME_KEY)
            .and_then(|value| value.parse().ok())
            .unwrap_or_default()
    }

    pub fn set_theme(&self, theme: Theme) -> Result<(), ClientError> {
        self.storage
            .set(THEME_KEY, theme.as_str())
            .map_err(|source| ClientError::Storage {
                key: THEME_KEY.to_string(),
                source,
            })
    }
}
