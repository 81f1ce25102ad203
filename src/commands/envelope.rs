use anyhow::Context;
use serde_json::Value;

use crate::cli::{DecryptArgs, EncryptArgs};
use crate::commands::{read_input, Client};

const NO_CIPHER: &str = "No passphrase set. Run 'ledgerlock cipher set' first.";

/// Seal a JSON document. A top-level `blob` field is dropped before sealing.
pub fn run_encrypt(client: &Client, args: &EncryptArgs) -> anyhow::Result<()> {
    let raw = read_input(&args.input)?;
    let payload: Value = serde_json::from_str(&raw).context("Input is not valid JSON")?;

    let envelope = client
        .codec()
        .encrypt(&payload)
        .context("Encryption failed")?
        .ok_or_else(|| anyhow::anyhow!(NO_CIPHER))?;
    println!("{envelope}");
    Ok(())
}

pub fn run_decrypt(client: &Client, args: &DecryptArgs) -> anyhow::Result<()> {
    let envelope = match &args.envelope {
        Some(envelope) => envelope.clone(),
        None => read_input("-")?,
    };

    let payload = client
        .codec()
        .decrypt(Some(envelope.trim()))
        .context("Decryption failed")?
        .ok_or_else(|| anyhow::anyhow!(NO_CIPHER))?;
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}
