pub mod cipher;
pub mod envelope;
pub mod fetch;
pub mod login;
pub mod sync;
pub mod theme;
pub mod whoami;

use std::io::{self, IsTerminal, Read};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Context;
use owo_colors::{OwoColorize, Stream::Stderr};
use url::Url;
use zeroize::Zeroizing;

use ledgerlock::config::ClientConfig;
use ledgerlock::credentials::CredentialContext;
use ledgerlock::envelope::EnvelopeCodec;
use ledgerlock::error::ClientError;
use ledgerlock::gateway::{Gateway, Navigator};
use ledgerlock::preferences::Preferences;
use ledgerlock::session::SessionBootstrap;
use ledgerlock::storage::{FileStorage, SecretStorage};
use ledgerlock::transport::HttpTransport;

use crate::cli::{Cli, Commands};

pub const DASHBOARD_ROUTE: &str = "/";
pub const SETTINGS_ROUTE: &str = "/settings";

/// Navigator for a terminal: there is no page to leave, so a redirect becomes
/// a notice on stderr pointing at the sign-in command and the web route.
pub struct TerminalNavigator {
    server: Url,
    location: Mutex<String>,
}

impl TerminalNavigator {
    pub fn new(server: Url) -> Self {
        Self {
            server,
            location: Mutex::new("/".to_string()),
        }
    }

    /// Record where the user is, so a 401 can send them back there after
    /// signing in. `main` sets it from [`web_route`] before dispatch.
    pub fn set_location(&self, target: &str) {
        *self.location.lock().unwrap_or_else(PoisonError::into_inner) = target.to_string();
    }
}

impl Navigator for TerminalNavigator {
    fn location(&self) -> String {
        self.location
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn redirect(&self, url: &str) {
        let web = format!("{}{}", self.server.as_str().trim_end_matches('/'), url);
        eprintln!(
            "{}",
            "Session expired. Credentials on this machine have been cleared."
                .if_supports_color(Stderr, |t| t.yellow())
        );
        eprintln!("Sign in again with 'ledgerlock login' or at {web}");
    }
}

/// Everything a command needs, wired from the resolved configuration.
pub struct Client {
    pub config: ClientConfig,
    pub storage: Arc<FileStorage>,
    pub session: SessionBootstrap<HttpTransport, TerminalNavigator>,
}

impl Client {
    pub fn from_cli(cli: &Cli) -> anyhow::Result<Self> {
        let config = ClientConfig::resolve(
            cli.server.clone(),
            cli.state_dir.clone(),
            cli.app_id.clone(),
            cli.login_route.clone(),
        )?;
        let storage = Arc::new(FileStorage::new(config.state_dir.clone()));
        let credentials = Arc::new(CredentialContext::new(storage.clone()));
        let transport = HttpTransport::new(config.server.clone())
            .context("Failed to build HTTP client")?;
        let gateway = Gateway::with_settings(
            credentials,
            transport,
            TerminalNavigator::new(config.server.clone()),
            config.gateway_settings(),
        );
        Ok(Self {
            session: SessionBootstrap::new(Arc::new(gateway)),
            storage,
            config,
        })
    }

    pub fn gateway(&self) -> &Gateway<HttpTransport, TerminalNavigator> {
        self.session.gateway()
    }

    pub fn credentials(&self) -> &Arc<CredentialContext> {
        self.gateway().credentials()
    }

    pub fn codec(&self) -> EnvelopeCodec {
        EnvelopeCodec::new(Arc::clone(self.credentials()))
    }

    pub fn preferences(&self) -> Preferences {
        let storage: Arc<dyn SecretStorage> = self.storage.clone();
        Preferences::new(storage)
    }
}

/// Web route a command stands in for. `fetch` returns to its own target.
pub fn web_route(command: &Commands) -> &str {
    match command {
        Commands::Fetch(args) => &args.target,
        Commands::Whoami | Commands::Cipher(_) | Commands::Theme(_) => SETTINGS_ROUTE,
        Commands::Login(_)
        | Commands::Logout
        | Commands::Encrypt(_)
        | Commands::Decrypt(_)
        | Commands::Sync => DASHBOARD_ROUTE,
    }
}

/// Recovery hint for a failure, if there is a specific one.
pub fn hint(err: &ClientError) -> Option<&'static str> {
    match err {
        ClientError::Unauthorized { .. } => Some("Run 'ledgerlock login' to sign in again."),
        ClientError::InvalidCredentials => Some("Check the email and password, then try again."),
        ClientError::DecryptionFailure(_) => Some(
            "Re-enter the passphrase with 'ledgerlock cipher set'. Data sealed under another passphrase cannot be opened.",
        ),
        ClientError::CryptoUnavailable(_) => Some("Key derivation failed. Try again."),
        ClientError::NetworkFailure(_) => {
            Some("Check that the server given by --server is reachable, then try again.")
        }
        ClientError::FetchFailed { .. } => Some("The server refused the request. Try again later."),
        ClientError::Storage { .. } | ClientError::ConfigDirNotFound => {
            Some("Point --state-dir (or LEDGERLOCK_STATE_DIR) at a writable directory.")
        }
        ClientError::Serialization(_) | ClientError::InvalidHeader(_) => None,
    }
}

pub fn print_hint(err: &anyhow::Error) {
    let hint = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<ClientError>())
        .and_then(hint);
    if let Some(hint) = hint {
        eprintln!("{}", hint.if_supports_color(Stderr, |t| t.cyan()));
    }
}

/// Contents of `path`, or all of stdin for `-`.
pub fn read_input(path: &str) -> anyhow::Result<String> {
    if path == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read stdin")?;
        Ok(buf)
    } else {
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {path}"))
    }
}

pub fn prompt_text(prompt: &str) -> anyhow::Result<String> {
    if !io::stdin().is_terminal() {
        anyhow::bail!("{prompt} is required in non-interactive mode");
    }
    dialoguer::Input::<String>::new()
        .with_prompt(prompt)
        .interact_text()
        .map_err(|e| anyhow::anyhow!("{prompt} prompt failed: {e}"))
}

pub fn prompt_secret(prompt: &str, confirm: Option<&str>) -> anyhow::Result<Zeroizing<String>> {
    if !io::stdin().is_terminal() {
        anyhow::bail!("{prompt} is required in non-interactive mode; pass it via flag or environment");
    }
    let mut password = dialoguer::Password::new().with_prompt(prompt);
    if let Some(confirm) = confirm {
        password = password.with_confirmation(confirm, "Values don't match");
    }
    let value = password
        .interact()
        .map_err(|e| anyhow::anyhow!("{prompt} prompt failed: {e}"))?;
    Ok(Zeroizing::new(value))
}
