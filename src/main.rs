use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr};
use tracing::{debug, info, warn};

use haven_e2ee::config::AppConfig;
use haven_e2ee::crypto::{decrypt_message, encrypt_message, verify_message_authenticity, PublicKey};
use haven_e2ee::identity::KeyManager;
use haven_e2ee::logging::init_logging;
use haven_e2ee::secure_message::EncryptedMessage;
use haven_e2ee::security::open_storage;

/// Shown for every decryption failure, whatever the cause.
const UNAVAILABLE: &str = "message unavailable";

#[derive(Parser, Debug)]
#[command(name = "haven")]
#[command(author, version, about = "Device identity and end-to-end encrypted envelopes", long_about = None)]
struct Args {
    /// TOML configuration file, layered under HAVEN__* environment variables
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print this device's public key, creating the identity on first use
    Identity,
    /// Encrypt a message and print the envelope as JSON
    Encrypt {
        /// Recipient public key, base64
        #[arg(long)]
        to: String,
        message: String,
    },
    /// Decrypt an envelope read from stdin
    Decrypt {
        /// Refuse envelopes that do not name this sender key (base64)
        #[arg(long)]
        expect_sender: Option<String>,
    },
    /// Delete the stored identity
    Reset,
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;
    let args = Args::parse();

    let config = AppConfig::load(args.config.as_deref()).wrap_err("failed to load configuration")?;
    init_logging(&config.logging);

    match args.command {
        Command::Config => {
            print!("{}", config.to_toml()?);
        }
        Command::Identity => {
            let key_pair = key_manager(&config)?.get_or_create_key_pair().await?;
            println!("{}", key_pair.public_key().to_base64());
        }
        Command::Encrypt { to, message } => {
            let recipient = PublicKey::from_base64(&to).wrap_err("invalid recipient public key")?;
            let key_pair = key_manager(&config)?.get_or_create_key_pair().await?;

            let envelope = encrypt_message(&message, &recipient, key_pair.private_key())?;
            info!(recipient = %recipient.fingerprint(), "message encrypted");
            println!("{}", envelope.to_json()?);
        }
        Command::Decrypt { expect_sender } => {
            let expected = expect_sender
                .as_deref()
                .map(PublicKey::from_base64)
                .transpose()
                .wrap_err("invalid expected sender public key")?;

            let mut input = String::new();
            std::io::stdin()
                .read_to_string(&mut input)
                .wrap_err("failed to read envelope from stdin")?;

            return decrypt(&config, &input, expected.as_ref()).await;
        }
        Command::Reset => {
            key_manager(&config)?.delete_stored_keys().await?;
            println!("identity deleted");
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn key_manager(config: &AppConfig) -> Result<KeyManager> {
    let storage = open_storage(&config.storage).wrap_err("failed to open key storage")?;
    Ok(KeyManager::new(storage))
}

async fn decrypt(config: &AppConfig, input: &str, expected: Option<&PublicKey>) -> Result<ExitCode> {
    let Some(key_pair) = key_manager(config)?.get_stored_key_pair().await? else {
        warn!("no identity on this device");
        eprintln!("{UNAVAILABLE}");
        return Ok(ExitCode::FAILURE);
    };

    let envelope = match EncryptedMessage::from_json(input.trim()) {
        Ok(envelope) => envelope,
        Err(e) => {
            debug!(error = %e, "unreadable envelope");
            eprintln!("{UNAVAILABLE}");
            return Ok(ExitCode::FAILURE);
        }
    };

    if let Some(expected) = expected {
        if !verify_message_authenticity(&envelope, expected) {
            warn!(
                claimed = %envelope.sender_public_key().fingerprint(),
                expected = %expected.fingerprint(),
                "envelope names a different sender key"
            );
            eprintln!("{UNAVAILABLE}");
            return Ok(ExitCode::FAILURE);
        }
    }

    match decrypt_message(&envelope, key_pair.private_key()) {
        Ok(plaintext) => {
            println!("{plaintext}");
            Ok(ExitCode::SUCCESS)
        }
        Err(_) => {
            eprintln!("{UNAVAILABLE}");
            Ok(ExitCode::FAILURE)
        }
    }
}
