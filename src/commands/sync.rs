use anyhow::Context;
use comfy_table::{Cell, Color, Table};

use ledgerlock::session::AppState;

use crate::commands::Client;

/// Run the bootstrap sequence and summarize what was loaded.
pub fn run_sync(client: &Client) -> anyhow::Result<()> {
    client
        .session
        .load_initial_data()
        .context("Sync failed")?;

    let state = client.session.snapshot();
    println!("{}", summary_table(&state, client.credentials().cipher().is_some()));
    Ok(())
}

fn summary_table(state: &AppState, cipher_set: bool) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["Item", "Value"]);

    let user = state
        .user
        .as_ref()
        .map(|u| u.email.clone())
        .unwrap_or_default();
    let role = state
        .user
        .as_ref()
        .map(|u| u.role.clone())
        .unwrap_or_default();

    table.add_row(vec![Cell::new("User"), Cell::new(user)]);
    table.add_row(vec![
        Cell::new("Role"),
        if role == "admin" {
            Cell::new(&role).fg(Color::Yellow)
        } else {
            Cell::new(&role)
        },
    ]);
    table.add_row(vec![Cell::new("Currency"), Cell::new(state.currency.to_uppercase())]);
    table.add_row(vec![Cell::new("Month starts on"), Cell::new(state.start_date)]);
    table.add_row(vec![
        Cell::new("Categories"),
        Cell::new(state.categories.join(", ")),
    ]);
    table.add_row(vec![Cell::new("Expenses"), Cell::new(state.expenses.len())]);
    table.add_row(vec![
        Cell::new("Recurring"),
        Cell::new(state.recurring_expenses.len()),
    ]);
    table.add_row(vec![Cell::new("Tags"), Cell::new(state.tags.join(", "))]);
    table.add_row(vec![
        Cell::new("Passphrase"),
        if cipher_set {
            Cell::new("set").fg(Color::Green)
        } else {
            Cell::new("not set").fg(Color::Yellow)
        },
    ]);
    table
}
