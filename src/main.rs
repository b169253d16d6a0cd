//! HKP keytool CLI
//!
//! Entry point for the `hkp-keytool` command-line tool.

use clap::{Parser, Subcommand};
use hkp_keyring::{
    merge_with_report, read_any, sks_digest, to_armored, EffectiveSettings, MergeContext, Pubkey,
    Settings, Signable,
};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Mutex;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "hkp-keytool")]
#[command(about = "Inspect and merge OpenPGP keyrings the way an HKP server stores them", version)]
struct Cli {
    /// Path to a settings file with a [hockeypuck] table
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Let signature verification take part in self-signature selection
    #[arg(long, global = true)]
    verify_sigs: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List keys in a keyring file with their derived state
    Inspect {
        /// Binary or armored keyring
        file: PathBuf,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Merge the keys of INCOMING into EXISTING and write the result
    Merge {
        existing: PathBuf,
        incoming: PathBuf,

        /// Write ASCII armor instead of binary packets
        #[arg(long)]
        armor: bool,

        /// Output file (default: stdout)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Print the SKS digests of each key
    Digest {
        file: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let settings = match load_settings(&cli) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error loading settings: {}", e);
            process::exit(1);
        }
    };
    if let Err(e) = init_logging(&settings) {
        eprintln!("Error initializing logging: {}", e);
        process::exit(1);
    }
    let ctx = settings.merge_context();

    match cli.command {
        Commands::Inspect { file, json } => run_inspect(&file, json, &ctx),
        Commands::Merge {
            existing,
            incoming,
            armor,
            output,
        } => run_merge(&existing, &incoming, armor, output, &ctx),
        Commands::Digest { file } => run_digest(&file, &ctx),
    }
}

fn load_settings(cli: &Cli) -> Result<Settings, String> {
    let mut overrides = toml::Table::new();
    if cli.verify_sigs {
        let mut openpgp = toml::Table::new();
        openpgp.insert("verifySigs".to_string(), toml::Value::Boolean(true));
        overrides.insert("openpgp".to_string(), toml::Value::Table(openpgp));
    }
    if let Some(level) = &cli.log_level {
        overrides.insert("loglevel".to_string(), toml::Value::String(level.clone()));
    }
    let cli_layer = (!overrides.is_empty()).then(|| toml::Value::Table(overrides));

    EffectiveSettings::build(cli.config.as_deref(), cli_layer)
        .map(|effective| effective.settings)
        .map_err(|e| e.to_string())
}

fn init_logging(settings: &Settings) -> Result<(), String> {
    let level = settings.log_level().map_err(|e| e.to_string())?;
    let builder = tracing_subscriber::fmt().with_max_level(level);

    match &settings.logfile {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| format!("{}: {}", path.display(), e))?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
                .map_err(|e| e.to_string())
        }
        None => builder
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|e| e.to_string()),
    }
}

/// Read a keyring and resolve every key in it, exiting on failure.
fn load_keys(path: &Path, ctx: &MergeContext<'_>) -> Vec<Pubkey> {
    let data = match fs::read(path) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Error reading {}: {}", path.display(), e);
            process::exit(1);
        }
    };
    let mut keys = match read_any(&data) {
        Ok(k) => k,
        Err(e) => {
            eprintln!("Error parsing {}: {}", path.display(), e);
            process::exit(1);
        }
    };
    for key in &mut keys {
        key.recompute(ctx);
    }
    keys
}

fn format_time(time: Option<chrono::DateTime<chrono::Utc>>) -> String {
    time.map(|t| t.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "never".to_string())
}

fn run_inspect(path: &Path, json_output: bool, ctx: &MergeContext<'_>) {
    let keys = load_keys(path, ctx);

    if json_output {
        match serde_json::to_string_pretty(&keys) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error serializing output: {}", e);
                process::exit(1);
            }
        }
        return;
    }

    if keys.is_empty() {
        println!("No keys found in {}", path.display());
        return;
    }

    for key in &keys {
        println!(
            "pub  {}/{}  {}  [{:?}]  expires: {}",
            key.bit_len(),
            key.key_id(),
            key.creation().format("%Y-%m-%d"),
            key.state(),
            format_time(key.expiration()),
        );
        println!("     {}", key.fingerprint());
        for uid in key.user_ids() {
            let primary = key
                .primary_user_id()
                .map(|p| p.scoped_digest() == uid.scoped_digest())
                .unwrap_or(false);
            println!(
                "uid  {}{}  [{:?}]  signatures: {}",
                uid.keywords(),
                if primary { " (primary)" } else { "" },
                uid.state(),
                uid.signatures().len(),
            );
        }
        for uat in key.user_attributes() {
            println!(
                "uat  images: {}  [{:?}]",
                uat.images().count(),
                uat.state()
            );
        }
        for sub in key.subkeys() {
            println!(
                "sub  {}/{}  {}  [{:?}]  expires: {}",
                sub.bit_len(),
                sub.key_id(),
                sub.creation().format("%Y-%m-%d"),
                sub.state(),
                format_time(sub.expiration()),
            );
        }
        println!();
    }
}

fn run_merge(
    existing_path: &Path,
    incoming_path: &Path,
    armor: bool,
    output: Option<PathBuf>,
    ctx: &MergeContext<'_>,
) {
    let mut keys = load_keys(existing_path, ctx);
    let incoming = load_keys(incoming_path, ctx);

    for key in incoming {
        let position = keys
            .iter()
            .position(|k| k.rfingerprint() == key.rfingerprint());
        match position {
            Some(at) => match merge_with_report(&keys[at], &key, ctx) {
                Ok((merged, report)) => {
                    if report.is_unchanged() {
                        info!(fingerprint = %merged.fingerprint(), "nothing new");
                    }
                    if !report.malformed.is_empty() || !report.rejected.is_empty() {
                        warn!(
                            fingerprint = %merged.fingerprint(),
                            malformed = report.malformed.len(),
                            rejected = report.rejected.len(),
                            "merged key carries unusable signatures"
                        );
                    }
                    keys[at] = merged;
                }
                Err(e) => {
                    eprintln!("Error merging {}: {}", key.fingerprint(), e);
                    process::exit(1);
                }
            },
            None => {
                info!(fingerprint = %key.fingerprint(), "adding new key");
                keys.push(key);
            }
        }
    }

    let bytes = if armor {
        match to_armored(&keys) {
            Ok(text) => text.into_bytes(),
            Err(e) => {
                eprintln!("Error armoring output: {}", e);
                process::exit(1);
            }
        }
    } else {
        keys.iter().flat_map(hkp_keyring::keyring::to_bytes).collect()
    };

    match output {
        Some(path) => {
            if let Err(e) = fs::write(&path, &bytes) {
                eprintln!("Error writing {}: {}", path.display(), e);
                process::exit(1);
            }
            eprintln!("Wrote {} key(s) to {}", keys.len(), path.display());
        }
        None => {
            use std::io::Write;
            let stdout = std::io::stdout();
            let mut lock = stdout.lock();
            if let Err(e) = lock.write_all(&bytes).and_then(|_| lock.flush()) {
                eprintln!("Error writing output: {}", e);
                process::exit(1);
            }
        }
    }
}

fn run_digest(path: &Path, ctx: &MergeContext<'_>) {
    for key in load_keys(path, ctx) {
        let digest = sks_digest(&key);
        println!("{}  md5={}  sha256={}", key.fingerprint(), digest.md5, digest.sha256);
    }
}
