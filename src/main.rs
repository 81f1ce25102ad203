mod cli;
mod commands;

use clap::Parser;
use cli::{CipherCommand, Cli, Commands};
use tracing_subscriber::EnvFilter;

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = commands::Client::from_cli(&cli).and_then(|client| {
        client
            .gateway()
            .navigator()
            .set_location(commands::web_route(&cli.command));
        dispatch(&client, &cli.command)
    });

    if let Err(e) = &result {
        commands::print_hint(e);
    }
    result
}

fn dispatch(client: &commands::Client, command: &Commands) -> anyhow::Result<()> {
    match command {
        Commands::Login(args) => commands::login::run_login(client, args),
        Commands::Logout => commands::login::run_logout(client),
        Commands::Cipher(CipherCommand::Set(args)) => commands::cipher::run_set(client, args),
        Commands::Cipher(CipherCommand::Clear) => commands::cipher::run_clear(client),
        Commands::Cipher(CipherCommand::Status) => commands::cipher::run_status(client),
        Commands::Encrypt(args) => commands::envelope::run_encrypt(client, args),
        Commands::Decrypt(args) => commands::envelope::run_decrypt(client, args),
        Commands::Fetch(args) => commands::fetch::run_fetch(client, args),
        Commands::Sync => commands::sync::run_sync(client),
        Commands::Whoami => commands::whoami::run_whoami(client),
        Commands::Theme(args) => commands::theme::run_theme(client, args),
    }
}
