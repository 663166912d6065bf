//! Lockbox - Encrypted personal secrets vault
//!
//! Command-line front end over [`lockbox::Vault`]. Every command unlocks the
//! vault with the passphrase, performs one operation and exits.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use lockbox::{
    config::{LockboxConfig, StorageConfig},
    record::{BankCard, DeleteOutcome, Metadata, Payload, Query, Record, RecordType},
    sync::SyncClient,
    transport::{
        MemoryBinaryRepository, MemoryRecordRepository, RetryPolicy, StaticTokens, SyncServer,
        UserId,
    },
    SyncReport, Vault,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "lockbox")]
#[command(author = "Lockbox Team")]
#[command(version)]
#[command(about = "Encrypted personal secrets vault with multi-agent sync")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "LOCKBOX_CONFIG")]
    config: Option<PathBuf>,

    /// Vault data directory (overrides the configuration)
    #[arg(short, long, env = "LOCKBOX_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Vault passphrase; establishes a new vault if none exists yet
    #[arg(short, long, env = "LOCKBOX_PASSPHRASE", hide_env_values = true)]
    passphrase: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a text note
    AddText {
        text: String,

        /// Metadata tag, repeatable
        #[arg(short, long = "meta", value_parser = parse_meta)]
        meta: Vec<(String, String)>,
    },

    /// Store a login/password pair
    AddCredential {
        login: String,
        password: String,

        /// Metadata tag, repeatable
        #[arg(short, long = "meta", value_parser = parse_meta)]
        meta: Vec<(String, String)>,
    },

    /// Store a payment card
    AddCard {
        number: String,
        holder: String,
        /// Expiry as printed, e.g. 12/29
        expiry: String,
        cvv: String,

        /// Metadata tag, repeatable
        #[arg(short, long = "meta", value_parser = parse_meta)]
        meta: Vec<(String, String)>,
    },

    /// Encrypt a file into the vault
    AddFile {
        path: PathBuf,

        /// Name shown in listings (defaults to the file name)
        #[arg(long)]
        name: Option<String>,

        /// Metadata tag, repeatable
        #[arg(short, long = "meta", value_parser = parse_meta)]
        meta: Vec<(String, String)>,
    },

    /// Replace the contents of a stored file
    ReplaceFile {
        id: i64,
        path: PathBuf,

        /// New display name (defaults to the file name)
        #[arg(long)]
        name: Option<String>,
    },

    /// List records
    List {
        /// Record type: credential, bank_card, text, binary or any
        #[arg(short = 't', long = "type", default_value = "any", value_parser = parse_record_type)]
        record_type: RecordType,

        /// Metadata filter key=value, repeatable; the key `any` matches any tag
        #[arg(short, long = "filter", value_parser = parse_meta)]
        filters: Vec<(String, String)>,
    },

    /// Show one record in full
    Get { id: i64 },

    /// Decrypt a stored file to disk
    ExportFile {
        id: i64,

        /// Output path (defaults to the stored name in the current directory)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Delete a record
    Delete { id: i64 },

    /// Remove attachments no record references
    Gc,

    /// Reconcile with another vault directory through an in-process sync server
    Merge {
        /// Data directory of the other vault (same passphrase)
        other: PathBuf,
    },

    /// Show configuration
    Config {
        /// Show default configuration
        #[arg(long)]
        default: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("lockbox={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    #[cfg(feature = "hardening")]
    lockbox::hardening::disable_core_dumps()?;

    // Load configuration
    let mut config = match &cli.config {
        Some(path) => LockboxConfig::load(path)?,
        None => LockboxConfig::default(),
    };
    if let Some(dir) = cli.data_dir {
        config.storage.data_dir = dir;
    }

    if let Commands::Config { default } = cli.command {
        return show_config(if default { None } else { Some(&config) });
    }

    let Some(passphrase) = cli.passphrase else {
        bail!("a passphrase is required (--passphrase or LOCKBOX_PASSPHRASE)");
    };
    if !Vault::exists(&config) {
        tracing::info!(
            "No vault at {}, establishing a new one",
            config.storage.data_dir.display()
        );
    }
    let mut vault = Vault::open(&config, &passphrase)?;

    match cli.command {
        Commands::AddText { text, meta } => {
            let id = vault.add_text(text, metadata(meta))?;
            println!("Stored text note {}", id);
        }
        Commands::AddCredential {
            login,
            password,
            meta,
        } => {
            let id = vault.add_credential(login, password, metadata(meta))?;
            println!("Stored credential {}", id);
        }
        Commands::AddCard {
            number,
            holder,
            expiry,
            cvv,
            meta,
        } => {
            let card = BankCard {
                number,
                holder,
                expiry,
                cvv,
            };
            let id = vault.add_bank_card(card, metadata(meta))?;
            println!("Stored bank card {}", id);
        }
        Commands::AddFile { path, name, meta } => {
            let bytes = std::fs::read(&path)
                .with_context(|| format!("cannot read {}", path.display()))?;
            let name = display_name(&path, name);
            let id = vault.add_file(name, &bytes, metadata(meta))?;
            println!("Stored file {} ({} bytes)", id, bytes.len());
        }
        Commands::ReplaceFile { id, path, name } => {
            let bytes = std::fs::read(&path)
                .with_context(|| format!("cannot read {}", path.display()))?;
            vault.replace_file(id, display_name(&path, name), &bytes)?;
            println!("Replaced file {}", id);
        }
        Commands::List {
            record_type,
            filters,
        } => {
            let query = filters
                .into_iter()
                .fold(Query::new(record_type), |q, (k, v)| q.filter(k, v));
            let records = vault.query(&query);
            if records.is_empty() {
                println!("No records");
            }
            for record in records {
                println!("{}", summary(record));
            }
        }
        Commands::Get { id } => {
            let record = vault.get(id)?;
            println!("{}", serde_json::to_string_pretty(record)?);
        }
        Commands::ExportFile { id, out } => {
            let (name, bytes) = vault.read_file(id)?;
            let out = out.unwrap_or_else(|| PathBuf::from(&name));
            std::fs::write(&out, &bytes)
                .with_context(|| format!("cannot write {}", out.display()))?;
            println!("Wrote {} ({} bytes)", out.display(), bytes.len());
        }
        Commands::Delete { id } => match vault.delete(id)? {
            DeleteOutcome::Removed => println!("Removed local record {}", id),
            DeleteOutcome::Tombstoned => println!("Deleted {}; deletion syncs to other agents", id),
            DeleteOutcome::Missing => println!("No record {}", id),
        },
        Commands::Gc => {
            let removed = vault.collect_garbage()?;
            println!("Removed {} orphaned attachments", removed);
        }
        Commands::Merge { other } => {
            run_merge(&config, vault, other, &passphrase).await?;
        }
        Commands::Config { .. } => {}
    }

    Ok(())
}

async fn run_merge(
    config: &LockboxConfig,
    mut vault: Vault,
    other_dir: PathBuf,
    passphrase: &str,
) -> Result<()> {
    let mut other_config = config.clone();
    other_config.storage = StorageConfig {
        data_dir: other_dir,
        ..config.storage.clone()
    };
    if !Vault::exists(&other_config) {
        bail!("no vault at {}", other_config.storage.data_dir.display());
    }
    let mut other = Vault::open(&other_config, passphrase)?;

    let reports = merge_vaults(&mut vault, &mut other, config.sync.retry.clone()).await?;
    for (label, report) in ["this vault", "other vault", "this vault"].iter().zip(&reports) {
        if !report.is_clean() {
            tracing::warn!(
                "{}: {} blob and {} record failures",
                label,
                report.blob_failures.len(),
                report.merge.failures.len() + report.ack_failures.len()
            );
        }
    }

    println!(
        "Merged: {} records now in this vault, {} in the other",
        vault.store().len(),
        other.store().len()
    );
    Ok(())
}

/// Sync two vaults through a throwaway in-process server.
///
/// Server ids from earlier merges mean nothing to a new server, so both
/// vaults are detached first and matched up again by origin tag.
async fn merge_vaults(
    vault: &mut Vault,
    other: &mut Vault,
    retry: RetryPolicy,
) -> Result<Vec<SyncReport>> {
    vault.detach()?;
    other.detach()?;

    let token = "local-merge";
    let server = Arc::new(
        SyncServer::new(
            MemoryRecordRepository::new(),
            MemoryBinaryRepository::new(),
            StaticTokens::new().with_token(token, UserId::new("local")),
        )
        .with_retry(retry),
    );
    let client = SyncClient::new(server, token);

    // Seed the server from both sides, then bring the first side up to date
    // with what the second one pushed.
    let first = vault.sync(&client).await?;
    let second = other.sync(&client).await?;
    let last = vault.sync(&client).await?;
    Ok(vec![first, second, last])
}

fn show_config(config: Option<&LockboxConfig>) -> Result<()> {
    let config = config.cloned().unwrap_or_default();
    println!("{}", config.to_toml()?);
    Ok(())
}

fn summary(record: &Record) -> String {
    let detail = match &record.payload {
        Payload::Credential(c) => c.login.clone(),
        Payload::BankCard(card) => {
            let tail: String = card
                .number
                .chars()
                .rev()
                .take(4)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            format!("{} ****{}", card.holder, tail)
        }
        Payload::Text(note) => note.text.lines().next().unwrap_or_default().to_string(),
        Payload::Binary(binary) => binary.display_name.clone(),
    };
    let tags = record
        .metadata
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",");
    format!("{:>6}  {:<10}  {}  [{}]", record.id, record.record_type(), detail, tags)
}

fn metadata(pairs: Vec<(String, String)>) -> Metadata {
    pairs.into_iter().collect()
}

fn display_name(path: &std::path::Path, name: Option<String>) -> String {
    name.or_else(|| {
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
    })
    .unwrap_or_else(|| "file".to_string())
}

fn parse_meta(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) if !k.is_empty() => Ok((k.to_string(), v.to_string())),
        _ => Err(format!("expected key=value, got {:?}", s)),
    }
}

fn parse_record_type(s: &str) -> std::result::Result<RecordType, String> {
    match s.parse::<RecordType>() {
        Ok(RecordType::Undefined) => Err(format!("unknown record type {:?}", s)),
        Ok(record_type) => Ok(record_type),
        Err(never) => match never {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_meta() {
        assert_eq!(
            parse_meta("site=bank").unwrap(),
            ("site".to_string(), "bank".to_string())
        );
        assert_eq!(parse_meta("note=a=b").unwrap().1, "a=b");
        assert!(parse_meta("novalue").is_err());
        assert!(parse_meta("=x").is_err());
    }

    #[test]
    fn test_parse_record_type() {
        assert_eq!(parse_record_type("any").unwrap(), RecordType::Any);
        assert_eq!(parse_record_type("text").unwrap(), RecordType::Text);
        assert!(parse_record_type("nonsense").is_err());
    }

    #[test]
    fn test_summary_masks_card_number() {
        let record = Record::new(Payload::BankCard(BankCard {
            number: "4111111111111111".to_string(),
            holder: "A HOLDER".to_string(),
            expiry: "12/29".to_string(),
            cvv: "123".to_string(),
        }));
        let line = summary(&record);
        assert!(line.contains("****1111"));
        assert!(!line.contains("4111111111111111"));
        assert!(!line.contains("123 "));
    }

    async fn synced_alone(dir: &std::path::Path, text: &str) -> Vault {
        let config = LockboxConfig {
            storage: StorageConfig::in_dir(dir),
            ..LockboxConfig::default()
        };
        let mut vault = Vault::open(&config, "pw").unwrap();
        vault.add_text(text, Metadata::new()).unwrap();

        let server = Arc::new(SyncServer::new(
            MemoryRecordRepository::new(),
            MemoryBinaryRepository::new(),
            StaticTokens::new().with_token("t", UserId::new("me")),
        ));
        vault.sync(&SyncClient::new(server, "t")).await.unwrap();
        assert!(vault.get(0).is_ok());
        vault
    }

    fn texts(vault: &Vault) -> Vec<Payload> {
        let mut texts: Vec<Payload> = vault
            .list(RecordType::Text)
            .into_iter()
            .map(|r| r.payload.clone())
            .collect();
        texts.sort_by_key(|p| format!("{:?}", p));
        texts
    }

    #[tokio::test]
    async fn test_merge_keeps_records_with_colliding_server_ids() {
        let (dir_a, dir_b) = (tempfile::tempdir().unwrap(), tempfile::tempdir().unwrap());
        let mut a = synced_alone(dir_a.path(), "alpha").await;
        let mut b = synced_alone(dir_b.path(), "beta").await;

        merge_vaults(&mut a, &mut b, RetryPolicy::default())
            .await
            .unwrap();

        let expected = vec![Payload::text("alpha"), Payload::text("beta")];
        assert_eq!(texts(&a), expected);
        assert_eq!(texts(&b), expected);

        // Merging again matches records by origin instead of duplicating them
        merge_vaults(&mut a, &mut b, RetryPolicy::default())
            .await
            .unwrap();
        assert_eq!(texts(&a), expected);
        assert_eq!(texts(&b), expected);
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from([
            "lockbox",
            "--passphrase",
            "pw",
            "list",
            "--type",
            "credential",
            "--filter",
            "any=bank",
        ])
        .unwrap();
        match cli.command {
            Commands::List {
                record_type,
                filters,
            } => {
                assert_eq!(record_type, RecordType::Credential);
                assert_eq!(filters, vec![("any".to_string(), "bank".to_string())]);
            }
            _ => panic!("expected list"),
        }
    }
}
