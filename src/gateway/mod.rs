//! Request gateway: the only path from application code to the network.
//!
//! Every call gets the application marker header, the bearer token and the
//! cipher header injected (unless the caller supplied its own). A `401`
//! response tears down all credential state and redirects to the login route
//! before the call fails with [`ClientError::Unauthorized`]; every other
//! status is handed back untouched.

use std::sync::{Arc, Mutex, PoisonError};

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::credentials::CredentialContext;
use crate::error::ClientError;
use crate::transport::{Request, RequestOptions, Response, Transport};

pub const REQUESTED_WITH: HeaderName = HeaderName::from_static("x-requested-with");
pub const ENCRYPTION_KEY: HeaderName = HeaderName::from_static("x-encryption-key");

pub const DEFAULT_APP_ID: &str = "ExpenseOwl";
pub const DEFAULT_LOGIN_ROUTE: &str = "/login";

/// Where the user is and where to send them. The browser equivalent is
/// `window.location`.
pub trait Navigator: Send + Sync {
    /// Current path and query, used as the post-login return target.
    fn location(&self) -> String;

    fn redirect(&self, url: &str);
}

/// Navigator with a fixed location that remembers redirects instead of
/// performing them.
pub struct RecordingNavigator {
    location: String,
    redirects: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            redirects: Mutex::new(Vec::new()),
        }
    }

    pub fn redirects(&self) -> Vec<String> {
        self.redirects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Navigator for RecordingNavigator {
    fn location(&self) -> String {
        self.location.clone()
    }

    fn redirect(&self, url: &str) {
        self.redirects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(url.to_string());
    }
}

#[derive(Debug, Clone)]
pub struct GatewaySettings {
    /// Value of `X-Requested-With`.
    pub app_id: String,
    pub login_route: String,
    /// Headers every request starts from; caller headers override them.
    pub default_headers: HeaderMap,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        Self {
            app_id: DEFAULT_APP_ID.to_string(),
            login_route: DEFAULT_LOGIN_ROUTE.to_string(),
            default_headers,
        }
    }
}

/// `<login_route>?redirect=<form-urlencoded location>`
pub fn login_redirect(login_route: &str, location: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(location.as_bytes()).collect();
    format!("{login_route}?redirect={encoded}")
}

fn sensitive(name: &str, value: &str) -> Result<HeaderValue, ClientError> {
    let mut value =
        HeaderValue::from_str(value).map_err(|_| ClientError::InvalidHeader(name.to_string()))?;
    value.set_sensitive(true);
    Ok(value)
}

pub struct Gateway<T, N> {
    credentials: Arc<CredentialContext>,
    transport: T,
    navigator: N,
    settings: GatewaySettings,
}

impl<T: Transport, N: Navigator> Gateway<T, N> {
    pub fn new(credentials: Arc<CredentialContext>, transport: T, navigator: N) -> Self {
        Self::with_settings(credentials, transport, navigator, GatewaySettings::default())
    }

    pub fn with_settings(
        credentials: Arc<CredentialContext>,
        transport: T,
        navigator: N,
        settings: GatewaySettings,
    ) -> Self {
        Self {
            credentials,
            transport,
            navigator,
            settings,
        }
    }

    pub fn credentials(&self) -> &Arc<CredentialContext> {
        &self.credentials
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn navigator(&self) -> &N {
        &self.navigator
    }

    /// Build the outgoing request without sending it. `options` is only read.
    pub fn prepare(&self, target: &str, options: &RequestOptions) -> Result<Request, ClientError> {
        let mut headers = self.settings.default_headers.clone();
        for name in options.headers.keys() {
            headers.remove(name);
        }
        for (name, value) in &options.headers {
            headers.append(name.clone(), value.clone());
        }

        if !headers.contains_key(&REQUESTED_WITH) {
            let app_id = HeaderValue::from_str(&self.settings.app_id)
                .map_err(|_| ClientError::InvalidHeader(REQUESTED_WITH.to_string()))?;
            headers.insert(REQUESTED_WITH, app_id);
        }

        if !headers.contains_key(AUTHORIZATION) {
            if let Some(token) = self.credentials.session_token() {
                headers.insert(
                    AUTHORIZATION,
                    sensitive(AUTHORIZATION.as_str(), &format!("Bearer {token}"))?,
                );
            }
        }

        if !headers.contains_key(&ENCRYPTION_KEY) {
            if let Some(cipher) = self.credentials.cipher() {
                headers.insert(ENCRYPTION_KEY, sensitive(ENCRYPTION_KEY.as_str(), &cipher)?);
            }
        }

        Ok(Request {
            method: options.method.clone(),
            target: target.to_string(),
            headers,
            body: options.body.clone(),
        })
    }

    pub fn request(&self, target: &str, options: &RequestOptions) -> Result<Response, ClientError> {
        let request = self.prepare(target, options)?;
        debug!(method = %request.method, target, "dispatching request");

        let response = self.transport.execute(&request)?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(self.reject_unauthorized());
        }
        debug!(target, status = response.status().as_u16(), "response received");
        Ok(response)
    }

    /// Send without the 401 policy. For calls that present credentials
    /// instead of a session, where 401 means the credentials were wrong.
    pub fn exchange(&self, target: &str, options: &RequestOptions) -> Result<Response, ClientError> {
        let request = self.prepare(target, options)?;
        debug!(method = %request.method, target, "dispatching credential exchange");
        self.transport.execute(&request)
    }

    pub fn get(&self, target: &str) -> Result<Response, ClientError> {
        self.request(target, &RequestOptions::default())
    }

    pub fn send_json<B: Serialize + ?Sized>(
        &self,
        method: Method,
        target: &str,
        body: &B,
    ) -> Result<Response, ClientError> {
        self.request(target, &RequestOptions::new(method).json(body)?)
    }

    /// GET `target` and decode a successful JSON body. Non-2xx becomes
    /// [`ClientError::FetchFailed`] naming `resource`.
    pub fn get_json<R: DeserializeOwned>(
        &self,
        target: &str,
        resource: &'static str,
    ) -> Result<R, ClientError> {
        let response = self.get(target)?;
        if !response.is_success() {
            return Err(ClientError::FetchFailed {
                resource,
                status: response.status().as_u16(),
            });
        }
        response.parse_json()
    }

    fn reject_unauthorized(&self) -> ClientError {
        // Teardown always clears memory; a durable delete failure is already
        // logged and must not mask the authorization failure.
        let _ = self.credentials.teardown();

        let redirect = login_redirect(&self.settings.login_route, &self.navigator.location());
        info!(redirect = %redirect, "unauthorized response, credentials cleared");
        self.navigator.redirect(&redirect);
        ClientError::Unauthorized { redirect }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use crate::transport::memory::MemoryTransport;
    use serde_json::json;

    fn gateway() -> Gateway<MemoryTransport, RecordingNavigator> {
        let ctx = Arc::new(CredentialContext::new(Arc::new(MemoryStorage::new())));
        Gateway::new(ctx, MemoryTransport::new(), RecordingNavigator::new("/table?month=3"))
    }

    fn header<'a>(request: &'a Request, name: &str) -> Option<&'a str> {
        request.headers.get(name).and_then(|v| v.to_str().ok())
    }

    #[test]
    fn login_redirect_encodes_location() {
        assert_eq!(
            login_redirect("/login", "/table?month=3"),
            "/login?redirect=%2Ftable%3Fmonth%3D3"
        );
        assert_eq!(login_redirect("/login", "/"), "/login?redirect=%2F");
    }

    #[test]
    fn anonymous_request_has_marker_only() {
        let gw = gateway();
        let request = gw.prepare("/config", &RequestOptions::default()).expect("prepare");
        assert_eq!(header(&request, "x-requested-with"), Some("ExpenseOwl"));
        assert_eq!(header(&request, "accept"), Some("application/json"));
        assert!(request.headers.get(AUTHORIZATION).is_none());
        assert!(request.headers.get(&ENCRYPTION_KEY).is_none());
    }

    #[test]
    fn credentials_are_injected() {
        let gw = gateway();
        gw.credentials().set_session_token("tok-123").expect("token");
        gw.credentials().set_cipher("correct-horse").expect("cipher");

        let request = gw.prepare("/expenses", &RequestOptions::default()).expect("prepare");
        assert_eq!(header(&request, "authorization"), Some("Bearer tok-123"));
        assert_eq!(header(&request, "x-encryption-key"), Some("correct-horse"));
        assert!(request.headers.get(AUTHORIZATION).is_some_and(|v| v.is_sensitive()));
    }

    #[test]
    fn caller_headers_win() {
        let gw = gateway();
        gw.credentials().set_session_token("tok-123").expect("token");
        gw.credentials().set_cipher("correct-horse").expect("cipher");

        let options = RequestOptions::default()
            .header(AUTHORIZATION, HeaderValue::from_static("Bearer other"))
            .header(REQUESTED_WITH, HeaderValue::from_static("Importer"))
            .header(ENCRYPTION_KEY, HeaderValue::from_static("override"))
            .header(ACCEPT, HeaderValue::from_static("text/csv"));
        let request = gw.prepare("/export/csv", &options).expect("prepare");

        assert_eq!(header(&request, "authorization"), Some("Bearer other"));
        assert_eq!(header(&request, "x-requested-with"), Some("Importer"));
        assert_eq!(header(&request, "x-encryption-key"), Some("override"));
        assert_eq!(header(&request, "accept"), Some("text/csv"));
    }

    #[test]
    fn repeated_caller_headers_are_all_kept() {
        let gw = gateway();
        let mut options = RequestOptions::default();
        options
            .headers
            .append(ACCEPT, HeaderValue::from_static("text/csv"));
        options
            .headers
            .append(ACCEPT, HeaderValue::from_static("application/pdf"));

        let request = gw.prepare("/export", &options).expect("prepare");
        let accepted: Vec<&str> = request
            .headers
            .get_all(ACCEPT)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        assert_eq!(accepted, vec!["text/csv", "application/pdf"]);
    }

    #[test]
    fn send_json_sets_body_and_content_type() {
        let gw = gateway();
        gw.transport().respond_status("/expense", 201);

        let response = gw
            .send_json(Method::PUT, "/expense", &json!({"amount": -12.5}))
            .expect("send");
        assert_eq!(response.status(), StatusCode::CREATED);

        let sent = gw.transport().last_request().expect("request");
        assert_eq!(sent.method, Method::PUT);
        assert_eq!(header(&sent, "content-type"), Some("application/json"));
        assert_eq!(sent.body.as_deref(), Some(&br#"{"amount":-12.5}"#[..]));
    }

    #[test]
    fn exchange_passes_401_through_untouched() {
        let gw = gateway();
        gw.credentials().set_session_token("tok-123").expect("token");
        gw.credentials().set_cipher("correct-horse").expect("cipher");
        gw.transport().respond_status("/api/v1/user/login", 401);

        let options = RequestOptions::new(Method::POST);
        let response = gw.exchange("/api/v1/user/login", &options).expect("exchange");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(gw.credentials().cipher().as_deref(), Some("correct-horse"));
        assert_eq!(gw.credentials().session_token().as_deref(), Some("tok-123"));
        assert!(gw.navigator().redirects().is_empty());
    }

    #[test]
    fn caller_options_are_not_modified() {
        let gw = gateway();
        gw.credentials().set_session_token("tok-123").expect("token");
        let options = RequestOptions::new(Method::POST)
            .json(&json!({"amount": 1}))
            .expect("json");
        let before = options.headers.clone();

        gw.request("/expense", &options).expect("request");
        gw.request("/expense", &options).expect("request");

        assert_eq!(options.headers, before);
        assert_eq!(gw.transport().requests().len(), 2);
    }

    #[test]
    fn control_characters_in_cipher_are_rejected() {
        let gw = gateway();
        gw.credentials().set_cipher("line\nbreak").expect("cipher");
        let err = gw.prepare("/config", &RequestOptions::default()).unwrap_err();
        assert!(matches!(err, ClientError::InvalidHeader(ref h) if h == "x-encryption-key"));
    }

    #[test]
    fn non_2xx_is_returned_as_is() {
        let gw = gateway();
        gw.credentials().set_session_token("tok-123").expect("token");
        gw.transport().respond_status("/expense/delete", 403);

        let response = gw.get("/expense/delete").expect("403 is not a gateway error");
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(gw.credentials().session_token().as_deref(), Some("tok-123"));
    }

    #[test]
    fn unauthorized_tears_down_and_redirects() {
        let gw = gateway();
        gw.credentials().set_session_token("tok-123").expect("token");
        gw.credentials().set_cipher("correct-horse").expect("cipher");
        gw.credentials().derived_key().expect("derive");
        gw.transport().respond_status("/expenses", 401);

        let err = gw.get("/expenses").unwrap_err();
        match err {
            ClientError::Unauthorized { redirect } => {
                assert_eq!(redirect, "/login?redirect=%2Ftable%3Fmonth%3D3");
            }
            other => panic!("expected Unauthorized, got {other:?}"),
        }

        assert_eq!(gw.credentials().session_token(), None);
        assert_eq!(gw.credentials().cipher(), None);
        assert!(!gw.credentials().key_cache().has_cached_key());
        assert_eq!(
            gw.navigator().redirects(),
            vec!["/login?redirect=%2Ftable%3Fmonth%3D3".to_string()]
        );
    }

    #[test]
    fn network_failure_keeps_credentials() {
        let gw = gateway();
        gw.credentials().set_session_token("tok-123").expect("token");
        gw.transport().fail("/config", "connection reset");

        let err = gw.get("/config").unwrap_err();
        assert!(matches!(err, ClientError::NetworkFailure(_)));
        assert_eq!(gw.credentials().session_token().as_deref(), Some("tok-123"));
        assert!(gw.navigator().redirects().is_empty());
    }

    #[test]
    fn custom_settings_apply() {
        let ctx = Arc::new(CredentialContext::new(Arc::new(MemoryStorage::new())));
        let settings = GatewaySettings {
            app_id: "ledgerlock".to_string(),
            login_route: "/signin".to_string(),
            default_headers: HeaderMap::new(),
        };
        let gw = Gateway::with_settings(
            ctx,
            MemoryTransport::new(),
            RecordingNavigator::new("/"),
            settings,
        );
        gw.transport().respond_status("/config", 401);

        let request = gw.prepare("/config", &RequestOptions::default()).expect("prepare");
        assert_eq!(header(&request, "x-requested-with"), Some("ledgerlock"));
        assert!(request.headers.get(ACCEPT).is_none());

        let err = gw.get("/config").unwrap_err();
        assert!(matches!(err, ClientError::Unauthorized { ref redirect } if redirect == "/signin?redirect=%2F"));
    }

    #[test]
    fn get_json_maps_non_2xx_to_fetch_failed() {
        let gw = gateway();
        gw.transport().respond_status("/config", 500);
        let err = gw.get_json::<serde_json::Value>("/config", "configuration").unwrap_err();
        assert!(matches!(
            err,
            ClientError::FetchFailed { resource: "configuration", status: 500 }
        ));
    }
}
