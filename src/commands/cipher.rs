use anyhow::Context;
use owo_colors::{OwoColorize, Stream::Stdout};
use zeroize::Zeroizing;

use ledgerlock::credentials::normalize_secret;

use crate::cli::CipherSetArgs;
use crate::commands::{prompt_secret, Client};

pub fn run_set(client: &Client, args: &CipherSetArgs) -> anyhow::Result<()> {
    let value = match &args.value {
        Some(value) => Zeroizing::new(value.clone()),
        None => prompt_secret("Encryption passphrase", Some("Confirm passphrase"))?,
    };
    if normalize_secret(&value).is_none() {
        anyhow::bail!("Passphrase cannot be empty. Use 'ledgerlock cipher clear' to remove it.");
    }

    client
        .credentials()
        .set_cipher(&value)
        .context("Failed to store passphrase")?;
    println!(
        "{}",
        "Passphrase stored.".if_supports_color(Stdout, |t| t.green())
    );
    println!("State dir:   {}", client.config.state_dir.display());
    println!();
    println!("Keep it safe: there is no way to recover data sealed under a lost passphrase.");
    Ok(())
}

pub fn run_clear(client: &Client) -> anyhow::Result<()> {
    client
        .credentials()
        .clear_cipher()
        .context("Failed to remove passphrase")?;
    println!("Passphrase cleared.");
    Ok(())
}

pub fn run_status(client: &Client) -> anyhow::Result<()> {
    if client.credentials().cipher().is_some() {
        println!(
            "Passphrase:  {}",
            "set".if_supports_color(Stdout, |t| t.green())
        );
    } else {
        println!(
            "Passphrase:  {}",
            "not set".if_supports_color(Stdout, |t| t.yellow())
        );
    }
    Ok(())
}
