use anyhow::Context;
use owo_colors::{OwoColorize, Stream::Stdout};

use crate::commands::Client;

pub fn run_whoami(client: &Client) -> anyhow::Result<()> {
    if client.credentials().session_token().is_none() {
        println!(
            "{}",
            "Not signed in. Run 'ledgerlock login'.".if_supports_color(Stdout, |t| t.yellow())
        );
        return Ok(());
    }

    client
        .session
        .load_session()
        .context("Failed to load session")?;
    let user = client.session.snapshot().user.unwrap_or_default();
    let name = format!("{} {}", user.first_name, user.last_name);

    println!("Email:       {}", user.email);
    println!("Name:        {}", name.trim());
    println!("Role:        {}", if user.role.is_empty() { "user" } else { user.role.as_str() });
    println!("Server:      {}", client.config.server);
    println!(
        "Passphrase:  {}",
        if client.credentials().cipher().is_some() { "set" } else { "not set" }
    );
    println!("State dir:   {}", client.config.state_dir.display());
    Ok(())
}
