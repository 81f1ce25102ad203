//! Session bootstrap: ordered, de-duplicated load of application state after
//! login, plus login/logout.
//!
//! The load sequence is session identity, configuration, expenses, recurring
//! expenses. A failed load leaves whatever was already fetched in place; it is
//! not rolled back.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::ClientError;
use crate::gateway::{Gateway, Navigator};
use crate::transport::{RequestOptions, Transport};

pub const SESSION_PATH: &str = "/api/v1/session";
pub const CONFIG_PATH: &str = "/config";
pub const EXPENSES_PATH: &str = "/expenses";
pub const RECURRING_PATH: &str = "/recurring-expenses";
pub const LOGIN_PATH: &str = "/api/v1/user/login";
pub const LOGOUT_PATH: &str = "/api/v1/user/logout";

pub const DEFAULT_CURRENCY: &str = "usd";
pub const DEFAULT_START_DATE: u32 = 1;

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

/// Server configuration. Field names are accepted in either camelCase or the
/// capitalized form the server emits for untagged structs.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(alias = "Categories")]
    pub categories: Option<Vec<String>>,
    #[serde(alias = "Currency")]
    pub currency: Option<String>,
    #[serde(rename = "startDate", alias = "StartDate")]
    pub start_date: Option<u32>,
}

#[derive(Deserialize, Debug)]
struct AuthResponse {
    token: String,
    #[serde(default)]
    user: Option<UserProfile>,
}

#[derive(Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppState {
    pub initialized: bool,
    pub loading: bool,
    pub user: Option<UserProfile>,
    pub expenses: Vec<Value>,
    pub categories: Vec<String>,
    pub currency: String,
    pub start_date: u32,
    pub tags: Vec<String>,
    pub recurring_expenses: Vec<Value>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            initialized: false,
            loading: false,
            user: None,
            expenses: Vec::new(),
            categories: Vec::new(),
            currency: DEFAULT_CURRENCY.to_string(),
            start_date: DEFAULT_START_DATE,
            tags: Vec::new(),
            recurring_expenses: Vec::new(),
        }
    }
}

/// Records from a list endpoint: a bare array, or an object wrapping the
/// array under `expenses`. Anything else is an empty list.
pub fn extract_records(data: Value) -> Vec<Value> {
    match data {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("expenses") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

/// Distinct tags across all records, in first-seen order.
pub fn extract_tags(records: &[Value]) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    let names = records
        .iter()
        .filter_map(|record| record.get("tags").and_then(Value::as_array))
        .flatten()
        .filter_map(Value::as_str);
    for tag in names {
        if !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    }
    tags
}

pub struct SessionBootstrap<T, N> {
    gateway: Arc<Gateway<T, N>>,
    state: Mutex<AppState>,
}

impl<T: Transport, N: Navigator> SessionBootstrap<T, N> {
    pub fn new(gateway: Arc<Gateway<T, N>>) -> Self {
        Self {
            gateway,
            state: Mutex::new(AppState::default()),
        }
    }

    pub fn gateway(&self) -> &Arc<Gateway<T, N>> {
        &self.gateway
    }

    fn state(&self) -> MutexGuard<'_, AppState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> AppState {
        self.state().clone()
    }

    /// Populate state after login. Returns immediately when already
    /// initialized or when another load is in flight.
    ///
    /// On failure `loading` is cleared and `initialized` stays false, so the
    /// next call starts over from the session step.
    pub fn load_initial_data(&self) -> Result<(), ClientError> {
        {
            let mut state = self.state();
            if state.initialized || state.loading {
                debug!(
                    initialized = state.initialized,
                    loading = state.loading,
                    "initial load skipped"
                );
                return Ok(());
            }
            state.loading = true;
        }

        let result = self.run_initial_load();

        let mut state = self.state();
        state.loading = false;
        match &result {
            Ok(()) => {
                state.initialized = true;
                info!(
                    expenses = state.expenses.len(),
                    recurring = state.recurring_expenses.len(),
                    "initial data loaded"
                );
            }
            Err(e) => warn!(error = %e, "initial data load failed"),
        }
        result
    }

    fn run_initial_load(&self) -> Result<(), ClientError> {
        self.load_session()?;
        self.load_config()?;
        self.refresh_expenses()?;
        self.refresh_recurring_expenses()
    }

    pub fn load_session(&self) -> Result<(), ClientError> {
        let user: UserProfile = self.gateway.get_json(SESSION_PATH, "session")?;
        self.state().user = Some(user);
        Ok(())
    }

    pub fn load_config(&self) -> Result<(), ClientError> {
        let config: AppConfig = self.gateway.get_json(CONFIG_PATH, "configuration")?;
        let mut state = self.state();
        state.categories = config.categories.unwrap_or_default();
        state.currency = config
            .currency
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());
        state.start_date = config
            .start_date
            .filter(|d| *d > 0)
            .unwrap_or(DEFAULT_START_DATE);
        Ok(())
    }

    pub fn refresh_expenses(&self) -> Result<(), ClientError> {
        let data: Value = self.gateway.get_json(EXPENSES_PATH, "expenses")?;
        let expenses = extract_records(data);
        let mut state = self.state();
        state.tags = extract_tags(&expenses);
        state.expenses = expenses;
        Ok(())
    }

    /// Non-2xx leaves an empty list rather than failing; transport and
    /// authorization errors still propagate.
    pub fn refresh_recurring_expenses(&self) -> Result<(), ClientError> {
        let response = self.gateway.get(RECURRING_PATH)?;
        let recurring = if response.is_success() {
            extract_records(response.parse_json()?)
        } else {
            debug!(
                status = response.status().as_u16(),
                "recurring expenses unavailable"
            );
            Vec::new()
        };
        self.state().recurring_expenses = recurring;
        Ok(())
    }

    pub fn reset(&self) {
        *self.state() = AppState::default();
    }

    pub fn is_admin(&self) -> bool {
        self.state()
            .user
            .as_ref()
            .is_some_and(|user| user.role == "admin")
    }

    pub fn add_category_locally(&self, category: &str) {
        let mut state = self.state();
        if !state.categories.iter().any(|c| c == category) {
            state.categories.push(category.to_string());
        }
    }

    /// Exchange email and password for a session token and store it.
    ///
    /// A 401 here means a wrong password, not an expired session, so it
    /// leaves stored credentials alone and returns
    /// [`ClientError::InvalidCredentials`].
    pub fn login(&self, email: &str, password: &str) -> Result<UserProfile, ClientError> {
        let options = RequestOptions::new(Method::POST).json(&Credentials { email, password })?;
        let response = self.gateway.exchange(LOGIN_PATH, &options)?;
        if response.status() == StatusCode::UNAUTHORIZED {
            warn!(email, "sign-in rejected");
            return Err(ClientError::InvalidCredentials);
        }
        if !response.is_success() {
            return Err(ClientError::FetchFailed {
                resource: "login",
                status: response.status().as_u16(),
            });
        }
        let auth: AuthResponse = response.parse_json()?;
        self.gateway.credentials().set_session_token(&auth.token)?;

        let user = auth.user.unwrap_or_default();
        self.state().user = Some(user.clone());
        info!(email = %user.email, "signed in");
        Ok(user)
    }

    /// Revoke the session server-side, then tear down local credentials and
    /// state whatever the server said.
    pub fn logout(&self) -> Result<(), ClientError> {
        let remote = self
            .gateway
            .request(LOGOUT_PATH, &RequestOptions::new(Method::POST));
        let local = self.gateway.credentials().teardown();
        self.reset();
        info!("signed out");

        match remote {
            Ok(response) if !response.is_success() => {
                warn!(status = response.status().as_u16(), "server did not revoke session");
                local
            }
            // Unauthorized already tore everything down; that is a sign-out too.
            Ok(_) | Err(ClientError::Unauthorized { .. }) => local,
            Err(e) => Err(e),
        }
    }
}
