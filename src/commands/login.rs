use anyhow::Context;
use owo_colors::{OwoColorize, Stream::Stdout};
use zeroize::Zeroizing;

use crate::cli::LoginArgs;
use crate::commands::{prompt_secret, prompt_text, Client};

pub fn run_login(client: &Client, args: &LoginArgs) -> anyhow::Result<()> {
    let email = match &args.email {
        Some(email) => email.trim().to_string(),
        None => prompt_text("Email")?,
    };
    let password = match &args.password {
        Some(password) => Zeroizing::new(password.clone()),
        None => prompt_secret("Password", None)?,
    };

    let user = client
        .session
        .login(&email, &password)
        .context("Sign-in failed")?;

    let shown = if user.email.is_empty() { &email } else { &user.email };
    println!(
        "{}",
        format!("Signed in as {shown}").if_supports_color(Stdout, |t| t.green())
    );
    if client.session.is_admin() {
        println!("Role:        admin");
    }
    if client.credentials().cipher().is_none() {
        println!();
        println!("Next: run 'ledgerlock cipher set' to unlock encrypted data.");
    }
    Ok(())
}

pub fn run_logout(client: &Client) -> anyhow::Result<()> {
    client.session.logout().context("Sign-out failed")?;
    println!(
        "{}",
        "Signed out. Session token and passphrase cleared."
            .if_supports_color(Stdout, |t| t.green())
    );
    Ok(())
}
