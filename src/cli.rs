use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use url::Url;

use ledgerlock::config::DEFAULT_SERVER;
use ledgerlock::preferences::Theme;

#[derive(Parser)]
#[command(name = "ledgerlock", version, about = "Credential and envelope-encryption client for ExpenseOwl")]
pub struct Cli {
    /// ExpenseOwl server root
    #[arg(long, env = "LEDGERLOCK_SERVER", default_value = DEFAULT_SERVER, global = true)]
    pub server: Url,

    /// Directory holding the session token, cipher and preferences
    /// (default: <config dir>/ledgerlock)
    #[arg(long, env = "LEDGERLOCK_STATE_DIR", value_name = "DIR", global = true)]
    pub state_dir: Option<PathBuf>,

    /// Value sent in X-Requested-With
    #[arg(long, env = "LEDGERLOCK_APP_ID", global = true)]
    pub app_id: Option<String>,

    /// Route the server redirects to when the session expires
    #[arg(long, global = true)]
    pub login_route: Option<String>,

    /// Debug logging on stderr (overrides RUST_LOG)
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sign in and store the session token
    Login(LoginArgs),
    /// Sign out and clear the token and cipher
    Logout,
    /// Manage the encryption passphrase
    #[command(subcommand)]
    Cipher(CipherCommand),
    /// Seal a JSON payload into an envelope
    Encrypt(EncryptArgs),
    /// Open an envelope and print the JSON payload
    Decrypt(DecryptArgs),
    /// Send one request through the gateway and print the response
    Fetch(FetchArgs),
    /// Load session, configuration and expenses and print a summary
    Sync,
    /// Show the signed-in user and credential status
    Whoami,
    /// Show or set the display theme
    Theme(ThemeArgs),
}

#[derive(Args)]
pub struct LoginArgs {
    /// Account email (prompted if omitted)
    #[arg(long, short = 'e')]
    pub email: Option<String>,

    /// Account password (prompted if omitted)
    #[arg(long, env = "LEDGERLOCK_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

#[derive(Subcommand)]
pub enum CipherCommand {
    /// Store the passphrase (prompted if not given)
    Set(CipherSetArgs),
    /// Remove the stored passphrase
    Clear,
    /// Report whether a passphrase is stored
    Status,
}

#[derive(Args)]
pub struct CipherSetArgs {
    /// Passphrase value
    #[arg(long, env = "LEDGERLOCK_CIPHER", hide_env_values = true)]
    pub value: Option<String>,
}

#[derive(Args)]
pub struct EncryptArgs {
    /// JSON file to read (use - for stdin)
    #[arg(value_name = "PATH", default_value = "-")]
    pub input: String,
}

#[derive(Args)]
pub struct DecryptArgs {
    /// Envelope string (read from stdin if omitted)
    #[arg(value_name = "ENVELOPE")]
    pub envelope: Option<String>,
}

#[derive(Args)]
pub struct FetchArgs {
    /// Path and query relative to the server root, e.g. /expenses
    #[arg(value_name = "TARGET")]
    pub target: String,

    /// HTTP method
    #[arg(long, short = 'X', default_value = "GET")]
    pub method: String,

    /// JSON request body
    #[arg(long, short = 'd', value_name = "JSON")]
    pub data: Option<String>,
}

#[derive(Args)]
pub struct ThemeArgs {
    /// New theme: system, light or dark
    #[arg(value_name = "THEME")]
    pub theme: Option<Theme>,
}
