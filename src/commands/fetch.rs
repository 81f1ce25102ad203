use anyhow::Context;
use owo_colors::{OwoColorize, Stream::Stderr};
use reqwest::Method;
use serde_json::Value;

use ledgerlock::transport::RequestOptions;

use crate::cli::FetchArgs;
use crate::commands::Client;

pub fn run_fetch(client: &Client, args: &FetchArgs) -> anyhow::Result<()> {
    let method = Method::from_bytes(args.method.to_ascii_uppercase().as_bytes())
        .with_context(|| format!("Invalid HTTP method '{}'", args.method))?;

    let gateway = client.gateway();
    let response = match &args.data {
        Some(data) => {
            let body: Value = serde_json::from_str(data).context("--data is not valid JSON")?;
            gateway.send_json(method, &args.target, &body)
        }
        None => gateway.request(&args.target, &RequestOptions::new(method)),
    }
    .with_context(|| format!("Request to {} failed", args.target))?;

    let status = response.status();
    let line = format!("{} {}", args.method.to_ascii_uppercase(), status);
    if response.is_success() {
        eprintln!("{}", line.if_supports_color(Stderr, |t| t.green()));
    } else {
        eprintln!("{}", line.if_supports_color(Stderr, |t| t.red()));
    }

    match response.parse_json::<Value>() {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => {
            let text = response.text();
            if !text.is_empty() {
                println!("{text}");
            }
        }
    }
    Ok(())
}
