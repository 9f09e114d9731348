//! `seqrets card` subcommands over the file-backed card emulator
//!
//! Every invocation is a fresh process, so commands on a PIN-protected card
//! verify the PIN first (flag, env or prompt).

use anyhow::{Context, Result};
use clap::Subcommand;
use secrecy::SecretString;
use std::path::{Path, PathBuf};

use seqrets_card::{CardService, FileTransport};
use seqrets_core::config::{expand_tilde, SeqretsConfig};
use seqrets_core::{CardStatus, DataType, ReaderState, Share};
use seqrets_crypto::EncryptedVaultFile;

#[derive(Subcommand, Debug)]
pub enum CardAction {
    /// List readers and the state of their cards
    List,
    /// Insert a blank emulated card into a reader
    Insert { reader: String },
    /// Show one card's status
    Status { reader: String },
    /// Set the PIN on a card that has none
    SetPin {
        reader: String,
        #[arg(long, env = "SEQRETS_PIN", hide_env_values = true)]
        pin: Option<String>,
    },
    /// Check a PIN (counts towards the attempt limit)
    Verify {
        reader: String,
        #[arg(long, env = "SEQRETS_PIN", hide_env_values = true)]
        pin: Option<String>,
    },
    /// Replace the PIN
    ChangePin { reader: String },
    /// Store a Qard on the card
    WriteShare {
        reader: String,
        share: PathBuf,
        #[arg(long, short = 'l')]
        label: Option<String>,
        #[arg(long, env = "SEQRETS_PIN", hide_env_values = true)]
        pin: Option<String>,
    },
    /// Store a vault file on the card
    WriteVault {
        reader: String,
        vault: PathBuf,
        #[arg(long, short = 'l')]
        label: Option<String>,
        #[arg(long, env = "SEQRETS_PIN", hide_env_values = true)]
        pin: Option<String>,
    },
    /// Print or save what the card holds
    Read {
        reader: String,
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
        #[arg(long, env = "SEQRETS_PIN", hide_env_values = true)]
        pin: Option<String>,
    },
    /// Clear the stored data
    Erase {
        reader: String,
        #[arg(long, env = "SEQRETS_PIN", hide_env_values = true)]
        pin: Option<String>,
    },
    /// Wipe everything, including a blocked PIN
    Reset {
        reader: String,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

pub fn service(config: &SeqretsConfig) -> CardService<FileTransport> {
    let transport = FileTransport::new(
        expand_tilde(&config.card.emulator_dir),
        config.card.capacity_bytes,
    );
    CardService::from_config(transport, &config.card)
}

fn prompt_pin(label: &str) -> Result<SecretString> {
    let pin = rpassword::prompt_password(label).context("reading PIN")?;
    Ok(SecretString::from(pin))
}

fn pin_or_prompt(arg: Option<&str>, label: &str) -> Result<SecretString> {
    match arg {
        Some(pin) => Ok(SecretString::from(pin.to_string())),
        None => prompt_pin(label),
    }
}

/// Verify the PIN when the card has one and this process has not.
pub async fn unlock(
    service: &CardService<FileTransport>,
    reader: &str,
    pin: Option<&str>,
) -> Result<()> {
    let status = service
        .get_status(reader)
        .await
        .with_context(|| format!("querying {reader}"))?;
    if status.state == ReaderState::Disconnected {
        anyhow::bail!("no card in {reader}");
    }
    if status.pin_set && !status.pin_verified {
        let pin = pin_or_prompt(pin, &format!("PIN for {reader}: "))?;
        service
            .verify_pin(reader, pin)
            .await
            .with_context(|| format!("verifying PIN on {reader}"))?;
    }
    Ok(())
}

fn print_status(reader: &str, status: &CardStatus) {
    let state = match status.state {
        ReaderState::Disconnected => "no card",
        ReaderState::Connected => "connected",
        ReaderState::Blocked => "BLOCKED",
    };
    println!("{reader}: {state}");
    if status.state == ReaderState::Disconnected {
        return;
    }
    println!(
        "  pin:       {}",
        if status.pin_set {
            format!("set ({} attempts left)", status.attempts_remaining)
        } else {
            "not set".to_string()
        }
    );
    if status.has_data {
        println!(
            "  data:      {} \"{}\" ({} bytes)",
            status.data_type, status.label, status.data_length
        );
    } else if status.pin_set && !status.pin_verified {
        println!("  data:      (verify PIN to inspect)");
    } else {
        println!("  data:      empty");
    }
}

fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

pub async fn run(config: &SeqretsConfig, action: CardAction) -> Result<()> {
    let service = service(config);

    match action {
        CardAction::List => {
            let readers = service.list_readers().await.context("listing readers")?;
            if readers.is_empty() {
                println!(
                    "No readers. Insert an emulated card with `seqrets card insert <reader>` ({})",
                    expand_tilde(&config.card.emulator_dir).display()
                );
            }
            for reader in readers {
                let status = service.get_status(&reader).await?;
                print_status(&reader, &status);
            }
        }
        CardAction::Insert { reader } => {
            let dir = expand_tilde(&config.card.emulator_dir);
            service
                .transport()
                .insert_blank(&reader)
                .with_context(|| format!("inserting card into {reader}"))?;
            println!("Blank card inserted into {reader} ({})", dir.display());
        }
        CardAction::Status { reader } => {
            let status = service.get_status(&reader).await?;
            print_status(&reader, &status);
        }
        CardAction::SetPin { reader, pin } => {
            let pin = match pin {
                Some(pin) => SecretString::from(pin),
                None => {
                    let first = rpassword::prompt_password("New PIN: ").context("reading PIN")?;
                    let again =
                        rpassword::prompt_password("Confirm PIN: ").context("reading PIN")?;
                    if first != again {
                        anyhow::bail!("PINs do not match");
                    }
                    SecretString::from(first)
                }
            };
            service.set_pin(&reader, pin).await?;
            println!("PIN set on {reader}");
        }
        CardAction::Verify { reader, pin } => {
            let pin = pin_or_prompt(pin.as_deref(), "PIN: ")?;
            service.verify_pin(&reader, pin).await?;
            println!("PIN correct");
        }
        CardAction::ChangePin { reader } => {
            let old = prompt_pin("Current PIN: ")?;
            let new = prompt_pin("New PIN: ")?;
            service.change_pin(&reader, old, new).await?;
            println!("PIN changed on {reader}");
        }
        CardAction::WriteShare { reader, share, label, pin } => {
            let share = Share::from_json(&read_text(&share)?)
                .with_context(|| format!("parsing {}", share.display()))?;
            let label = label.unwrap_or_else(|| format!("{} #{}", share.label(), share.index()));
            unlock(&service, &reader, pin.as_deref()).await?;
            service.write_share_to_card(&reader, share, &label).await?;
            println!("Qard written to {reader} as \"{label}\"");
        }
        CardAction::WriteVault { reader, vault, label, pin } => {
            let json = read_text(&vault)?;
            let parsed = EncryptedVaultFile::from_json(&json)
                .with_context(|| format!("parsing {}", vault.display()))?;
            let label = label.unwrap_or_else(|| parsed.sharing.label.clone());
            unlock(&service, &reader, pin.as_deref()).await?;
            service.write_vault_to_card(&reader, json, &label).await?;
            println!("Vault written to {reader} as \"{label}\"");
        }
        CardAction::Read { reader, output, pin } => {
            unlock(&service, &reader, pin.as_deref()).await?;
            let data = service.read_card(&reader).await?;
            if data.data_type == DataType::Empty {
                println!("{reader}: empty");
                return Ok(());
            }
            match output {
                Some(path) => {
                    std::fs::write(&path, data.data.as_bytes())
                        .with_context(|| format!("writing {}", path.display()))?;
                    println!(
                        "{} \"{}\" written to {}",
                        data.data_type,
                        data.label,
                        path.display()
                    );
                }
                None => println!("{}", data.data),
            }
        }
        CardAction::Erase { reader, pin } => {
            unlock(&service, &reader, pin.as_deref()).await?;
            service.erase_card(&reader).await?;
            println!("{reader}: data erased");
        }
        CardAction::Reset { reader, yes } => {
            if !yes {
                eprint!("Wipe the card in {reader} including its PIN? Type 'reset': ");
                let mut answer = String::new();
                std::io::stdin()
                    .read_line(&mut answer)
                    .context("reading confirmation")?;
                if answer.trim() != "reset" {
                    anyhow::bail!("aborted");
                }
            }
            service.factory_reset(&reader).await?;
            println!("{reader}: factory reset");
        }
    }
    Ok(())
}
