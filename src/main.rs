//! Calculator Vault - CLI
//!
//! Desktop front end for the vault core. Each run starts locked and
//! authenticates with `--pin` the way the calculator does after a long-press.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use calc_vault::{CalcVault, Category, VaultConfig};

#[derive(Parser)]
#[command(name = "calc-vault")]
#[command(version = calc_vault::VERSION)]
#[command(about = "Calculator Vault - encrypted file vault behind a calculator")]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, conflicts_with = "data_dir")]
    config: Option<PathBuf>,

    /// Data directory (used when no config file is given)
    #[arg(short, long, default_value = "./calc_vault_data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Set the PIN on first use, or verify it
    Init {
        /// PIN code
        #[arg(short, long)]
        pin: String,
    },

    /// Show vault status
    Status {
        /// PIN code (adds the entry count)
        #[arg(short, long)]
        pin: Option<String>,
    },

    /// Encrypt a file into the vault
    Add {
        /// File to add
        path: PathBuf,

        /// Display name (defaults to the file name)
        #[arg(short, long)]
        name: Option<String>,

        /// MIME type (guessed from the extension if omitted)
        #[arg(short, long)]
        mime: Option<String>,

        /// PIN code
        #[arg(short, long)]
        pin: String,
    },

    /// List vault entries
    List {
        /// Only photos, videos or documents
        #[arg(short, long)]
        category: Option<Category>,

        /// PIN code
        #[arg(short, long)]
        pin: String,
    },

    /// Decrypt an entry
    Reveal {
        /// Entry ID
        id: String,

        /// Copy the plaintext here and wipe the temporary file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// PIN code
        #[arg(short, long)]
        pin: String,
    },

    /// Delete an entry and its ciphertext
    Delete {
        /// Entry ID
        id: String,

        /// PIN code
        #[arg(short, long)]
        pin: String,
    },

    /// Re-encrypt everything under a new PIN
    ChangePin {
        /// Current PIN
        #[arg(short, long)]
        pin: String,

        /// New PIN
        #[arg(short, long)]
        new_pin: String,
    },

    /// Compare the listing with the ciphertext on disk
    Audit {
        /// PIN code
        #[arg(short, long)]
        pin: String,
    },

    /// Wipe all revealed plaintext
    Purge,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn load_config(cli: &Cli) -> Result<VaultConfig> {
    match &cli.config {
        Some(path) => VaultConfig::load(path)
            .with_context(|| format!("loading {}", path.display())),
        None => Ok(VaultConfig::for_data_dir(&cli.data_dir)),
    }
}

/// Long-press + PIN + "="
fn authenticate(vault: &CalcVault, pin: &str) -> Result<()> {
    vault.begin_pin_entry()?;
    let result = vault.submit_pin(pin)?;

    if result.lockout_triggered {
        eprintln!("Calculator crashed.");
        std::process::exit(1);
    }
    if !result.ok {
        bail!("{}", result.message.unwrap_or("Error"));
    }
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    let vault = CalcVault::open_without_biometrics(config)?;

    match cli.command {
        Commands::Init { pin } => {
            let had_pin = vault.status()?.has_pin;
            authenticate(&vault, &pin)?;
            if had_pin {
                println!("🔓 PIN verified");
            } else {
                println!("🔐 PIN set, vault ready at {}", vault.config().data_dir.display());
            }
        }

        Commands::Status { pin } => {
            if let Some(pin) = pin {
                authenticate(&vault, &pin)?;
            }
            let status = vault.status()?;

            println!("📊 Calculator Vault {}", calc_vault::VERSION);
            println!("{:-<40}", "");
            println!("State:             {:?}", status.state);
            println!("PIN set:           {}", status.has_pin);
            println!("Biometric unlock:  {}", status.biometric_enabled);
            if let Some(entries) = status.entries {
                println!("Entries:           {}", entries);
            }
            println!("Ciphertext size:   {} KB", status.vault_bytes / 1024);
        }

        Commands::Add { path, name, mime, pin } => {
            authenticate(&vault, &pin)?;

            let name = match name {
                Some(name) => name,
                None => path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("unknown")
                    .to_string(),
            };
            let mime = mime.unwrap_or_else(|| guess_mime(&path).to_string());

            let entry = vault.add_file(&path, &name, &mime)?;
            println!("✅ Added {} ({}) with ID: {}", entry.name, entry.category().as_str(), entry.id);
        }

        Commands::List { category, pin } => {
            authenticate(&vault, &pin)?;

            let entries = match category {
                Some(category) => vault.entries_in(category)?,
                None => vault.list_entries()?,
            };

            if entries.is_empty() {
                println!("📭 Vault is empty");
            } else {
                println!("🗂️ Entries ({}):", entries.len());
                println!("{:-<60}", "");
                for entry in entries {
                    println!(
                        "{} [{}] {} ({})",
                        entry.id,
                        entry.category().as_str(),
                        entry.name,
                        entry.mime_type
                    );
                }
            }
        }

        Commands::Reveal { id, output, pin } => {
            authenticate(&vault, &pin)?;
            let temp = vault.reveal_file(&id)?;

            match output {
                Some(output) => {
                    std::fs::copy(&temp, &output)
                        .with_context(|| format!("writing {}", output.display()))?;
                    vault.purge_revealed()?;
                    println!("📤 Written to {}", output.display());
                }
                None => {
                    println!("📤 Decrypted to {}", temp.display());
                    println!("   Run `calc-vault purge` when done");
                }
            }
        }

        Commands::Delete { id, pin } => {
            authenticate(&vault, &pin)?;
            vault.delete_file(&id)?;
            println!("🗑️ Deleted {}", id);
        }

        Commands::ChangePin { pin, new_pin } => {
            authenticate(&vault, &pin)?;
            let report = vault.change_pin(&new_pin)?;

            println!("✅ PIN changed, {} file(s) re-encrypted", report.reencrypted);
            for id in &report.skipped {
                println!("⚠️ Skipped unreadable entry {}", id);
            }
        }

        Commands::Audit { pin } => {
            authenticate(&vault, &pin)?;
            let report = vault.audit()?;

            println!("🔍 {} entries, {} blobs", report.entries, report.blobs);
            if report.is_consistent() {
                println!("💚 Listing matches the ciphertext on disk");
            } else {
                for entry in &report.missing_ciphertext {
                    println!("   missing ciphertext: {} ({})", entry.id, entry.name);
                }
                for blob in &report.stray_blobs {
                    println!("   stray blob: {}", blob.display());
                }
            }
        }

        Commands::Purge => {
            let removed = vault.purge_revealed()?;
            println!("🧹 Wiped {} revealed file(s)", removed);
        }
    }

    Ok(())
}

fn guess_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("heic") => "image/heic",
        Some("mp4") => "video/mp4",
        Some("mov") => "video/quicktime",
        Some("mkv") => "video/x-matroska",
        Some("pdf") => "application/pdf",
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
}
