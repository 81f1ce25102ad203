use anyhow::Context;

use crate::cli::ThemeArgs;
use crate::commands::Client;

pub fn run_theme(client: &Client, args: &ThemeArgs) -> anyhow::Result<()> {
    let preferences = client.preferences();
    match args.theme {
        Some(theme) => {
            preferences
                .set_theme(theme)
                .context("Failed to save theme")?;
            println!("Theme set to {theme}.");
        }
        None => println!("{}", preferences.theme()),
    }
    Ok(())
}
