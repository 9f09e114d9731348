//! seqrets: split secrets into Qards, protect instructions, restore them
//!
//! Sharing:
//!   split / combine            - raw secret <-> Qards
//!   seal / restore             - instruction file <-> vault + Qards
//!   encrypt / decrypt          - password-only instruction encryption
//!
//! Transport:
//!   qr encode|decode           - SQR1 chunk text for QR codes
//!   card ...                   - smart-card emulator (one file per token)
//!
//! Other:
//!   plan new|show              - inheritance plan documents
//!   config show                - display current configuration

mod card;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use secrecy::SecretString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use zeroize::Zeroizing;

use seqrets_core::config::{expand_tilde, SeqretsConfig};
use seqrets_core::plan::{is_inheritance_plan, today, InheritancePlan};
use seqrets_core::{RawInstruction, Share};
use seqrets_crypto::{
    decrypt, encrypt, mnemonic_to_secret, secret_to_mnemonic, split, EncryptedInstruction,
    KdfParams,
};
use seqrets_recovery::{
    qard_frames, seal_instruction, FileImport, RecoverySession, RestoreStatus, SealOptions,
};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "seqrets",
    version,
    about = "Threshold secret sharing with QR and smart-card transport",
    long_about = "seqrets: split secrets into Qards, seal instructions, and restore them from any mix of files, QR scans and smart cards"
)]
struct Cli {
    /// Path to seqrets.toml configuration file
    #[arg(
        long,
        short = 'c',
        env = "SEQRETS_CONFIG",
        default_value = "~/.config/seqrets/config.toml"
    )]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long, env = "SEQRETS_LOG")]
    log: Option<String>,

    /// Log format; overrides the config file
    #[arg(long, env = "SEQRETS_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

/// Password and keyfile factors for the instruction cipher
#[derive(Args, Debug)]
struct CipherArgs {
    /// Password (prompted when absent)
    #[arg(long, env = "SEQRETS_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Keyfile used as an additional factor
    #[arg(long, short = 'k')]
    keyfile: Option<PathBuf>,
}

/// Sharing layout; falls back to the `[sharing]` config section
#[derive(Args, Debug)]
struct SharingArgs {
    /// Qards required to restore
    #[arg(long, short = 't')]
    threshold: Option<u8>,

    /// Qards to produce
    #[arg(long, short = 'n')]
    shares: Option<u8>,

    /// Label stamped on every Qard
    #[arg(long, short = 'l')]
    label: Option<String>,
}

/// Where restore inputs come from
#[derive(Args, Debug)]
struct InputArgs {
    /// Share or vault files (JSON documents, JSON array, one share per line,
    /// or `split --qr` listings of SQR1 lines)
    files: Vec<PathBuf>,

    /// Emulated card readers to import from
    #[arg(long = "card")]
    cards: Vec<String>,

    /// Card PIN (prompted when a card needs one)
    #[arg(long, env = "SEQRETS_PIN", hide_env_values = true)]
    pin: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Split a secret into Qards
    Split {
        /// File holding the secret (prompted when absent)
        #[arg(long, short = 'i')]
        input: Option<PathBuf>,

        /// Treat the secret as a BIP-39 mnemonic and split its entropy
        #[arg(long)]
        mnemonic: bool,

        #[command(flatten)]
        sharing: SharingArgs,

        /// Write one qard-<n>.json per share instead of printing
        #[arg(long, short = 'o')]
        out_dir: Option<PathBuf>,

        /// Print SQR1 QR frame text for each Qard
        #[arg(long)]
        qr: bool,
    },

    /// Reconstruct a raw secret from Qards
    Combine {
        #[command(flatten)]
        inputs: InputArgs,

        /// Expand the secret back into a BIP-39 mnemonic
        #[arg(long)]
        mnemonic: bool,

        /// Write the secret here instead of printing it
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Encrypt a file under a password (and optional keyfile)
    Encrypt {
        input: PathBuf,

        /// MIME type recorded with the file (guessed from the extension)
        #[arg(long = "type")]
        file_type: Option<String>,

        #[command(flatten)]
        cipher: CipherArgs,

        /// Output path (default: <input>.seqrets.json)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Decrypt a file produced by `encrypt`
    Decrypt {
        input: PathBuf,

        #[command(flatten)]
        cipher: CipherArgs,

        /// Output path (default: the original file name in the current directory)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Encrypt a file into a vault whose key is split into Qards
    Seal {
        input: PathBuf,

        #[arg(long = "type")]
        file_type: Option<String>,

        #[command(flatten)]
        cipher: CipherArgs,

        #[command(flatten)]
        sharing: SharingArgs,

        /// Directory receiving vault.json and qard-<n>.json
        #[arg(long, short = 'o')]
        out_dir: PathBuf,
    },

    /// Restore a sealed vault from Qards
    Restore {
        #[command(flatten)]
        inputs: InputArgs,

        #[command(flatten)]
        cipher: CipherArgs,

        /// Output path (default: the original file name in the current directory)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// QR chunk text
    Qr {
        #[command(subcommand)]
        action: QrAction,
    },

    /// Smart-card storage (file-backed emulator)
    Card {
        #[command(subcommand)]
        action: card::CardAction,
    },

    /// Inheritance plans
    Plan {
        #[command(subcommand)]
        action: PlanAction,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum QrAction {
    /// Split a file into SQR1 frame lines
    Encode {
        input: PathBuf,
        /// Payload bytes per frame (default: qr.max_chunk_size)
        #[arg(long)]
        max_chunk: Option<usize>,
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },
    /// Reassemble SQR1 frame lines (any order)
    Decode {
        input: PathBuf,
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum PlanAction {
    /// Write a blank plan to fill in
    New {
        #[arg(long, short = 'o', default_value = "inheritance-plan.json")]
        output: PathBuf,
    },
    /// Summarize a plan
    Show { input: PathBuf },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = expand_tilde(&cli.config);
    let config = SeqretsConfig::load(&config_path)
        .with_context(|| format!("loading config: {}", config_path.display()))?;

    let level = cli.log.clone().unwrap_or_else(|| config.logging.level.clone());
    let format = cli.log_format.clone().unwrap_or(match config.logging.format.as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Text,
    });
    init_logging(&level, &format);
    info!(version = env!("CARGO_PKG_VERSION"), config = %config_path.display(), "seqrets starting");

    match cli.command {
        Commands::Split { input, mnemonic, sharing, out_dir, qr } => {
            cmd_split(&config, input.as_deref(), mnemonic, &sharing, out_dir.as_deref(), qr)
        }
        Commands::Combine { inputs, mnemonic, output } => {
            cmd_combine(&config, &inputs, mnemonic, output.as_deref()).await
        }
        Commands::Encrypt { input, file_type, cipher, output } => {
            cmd_encrypt(&config, &input, file_type, &cipher, output.as_deref())
        }
        Commands::Decrypt { input, cipher, output } => {
            cmd_decrypt(&input, &cipher, output.as_deref())
        }
        Commands::Seal { input, file_type, cipher, sharing, out_dir } => {
            cmd_seal(&config, &input, file_type, &cipher, &sharing, &out_dir)
        }
        Commands::Restore { inputs, cipher, output } => {
            cmd_restore(&config, &inputs, &cipher, output.as_deref()).await
        }
        Commands::Qr { action: QrAction::Encode { input, max_chunk, output } } => {
            cmd_qr_encode(&config, &input, max_chunk, output.as_deref())
        }
        Commands::Qr { action: QrAction::Decode { input, output } } => {
            cmd_qr_decode(&input, output.as_deref())
        }
        Commands::Card { action } => card::run(&config, action).await,
        Commands::Plan { action: PlanAction::New { output } } => cmd_plan_new(&output),
        Commands::Plan { action: PlanAction::Show { input } } => cmd_plan_show(&input),
        Commands::Config { action: ConfigAction::Show } => cmd_config_show(&config, &config_path),
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── Prompts and file helpers ──────────────────────────────────────────────────

fn read_password(arg: Option<&str>, confirm: bool) -> Result<SecretString> {
    if let Some(pw) = arg {
        return Ok(SecretString::from(pw.to_string()));
    }
    let pw = Zeroizing::new(rpassword::prompt_password("Password: ").context("reading password")?);
    if confirm {
        let again = Zeroizing::new(
            rpassword::prompt_password("Confirm password: ").context("reading password")?,
        );
        if *again != *pw {
            anyhow::bail!("passwords do not match");
        }
    }
    Ok(SecretString::from(pw.to_string()))
}

fn read_keyfile(path: Option<&Path>) -> Result<Option<Zeroizing<Vec<u8>>>> {
    path.map(|p| {
        std::fs::read(p)
            .map(Zeroizing::new)
            .with_context(|| format!("reading keyfile: {}", p.display()))
    })
    .transpose()
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("reading {}", path.display()))
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating directory: {}", parent.display()))?;
    }
    std::fs::write(path, bytes).with_context(|| format!("writing {}", path.display()))
}

/// Output path for a decrypted file: explicit, or the stored name (without
/// any directory part) in the current directory. Never overwrites silently.
fn output_for(explicit: Option<&Path>, stored_name: &str) -> Result<PathBuf> {
    if let Some(p) = explicit {
        return Ok(p.to_path_buf());
    }
    let name = Path::new(stored_name)
        .file_name()
        .context("stored file name is empty")?;
    let path = PathBuf::from(name);
    if path.exists() {
        anyhow::bail!("{} already exists; pass --output", path.display());
    }
    Ok(path)
}

fn guess_file_type(path: &Path) -> String {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "json" => "application/json",
        "txt" | "md" => "text/plain",
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        _ => "application/octet-stream",
    }
    .to_string()
}

fn load_instruction(input: &Path, file_type: Option<String>) -> Result<RawInstruction> {
    let content = Zeroizing::new(read_file(input)?);
    let name = input
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .context("input has no file name")?;
    let file_type = file_type.unwrap_or_else(|| guess_file_type(input));
    Ok(RawInstruction::from_bytes(name, &content, file_type))
}

fn sharing_layout(config: &SeqretsConfig, args: &SharingArgs) -> (usize, usize, String) {
    (
        args.threshold.unwrap_or(config.sharing.default_threshold) as usize,
        args.shares.unwrap_or(config.sharing.default_total_shares) as usize,
        args.label
            .clone()
            .unwrap_or_else(|| config.sharing.default_label.clone()),
    )
}

fn make_spinner(prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{prefix:.bold} {spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn write_qards(out_dir: &Path, shares: &[Share]) -> Result<()> {
    for share in shares {
        let path = out_dir.join(format!("qard-{}.json", share.index()));
        write_file(&path, share.to_json()?.as_bytes())?;
        println!("  qard #{}: {}", share.index(), path.display());
    }
    Ok(())
}

/// A `#` header per Qard followed by its frames. `combine` and `restore`
/// read the listing back as a file input.
fn print_qr(shares: &[Share], max_chunk: usize) -> Result<()> {
    for share in shares {
        let frames = qard_frames(share, max_chunk)?;
        println!("# qard #{} ({} frames)", share.index(), frames.len());
        for frame in frames {
            println!("{frame}");
        }
    }
    Ok(())
}

// ── `seqrets split` ───────────────────────────────────────────────────────────

fn cmd_split(
    config: &SeqretsConfig,
    input: Option<&Path>,
    mnemonic: bool,
    sharing: &SharingArgs,
    out_dir: Option<&Path>,
    qr: bool,
) -> Result<()> {
    let raw = match input {
        Some(path) => Zeroizing::new(read_file(path)?),
        None => Zeroizing::new(
            rpassword::prompt_password("Secret: ")
                .context("reading secret")?
                .into_bytes(),
        ),
    };

    let secret = if mnemonic {
        let words = std::str::from_utf8(&raw).context("mnemonic is not UTF-8")?;
        Zeroizing::new(mnemonic_to_secret(words)?.as_bytes().to_vec())
    } else {
        raw
    };

    let (threshold, total, label) = sharing_layout(config, sharing);
    let shares = split(&secret, threshold, total, &label)?;
    info!(threshold, total, "secret split");

    match out_dir {
        Some(dir) => {
            println!("Split into {total} Qards ({threshold} needed to restore):");
            write_qards(dir, &shares)?;
        }
        None if !qr => {
            for share in &shares {
                println!("{}", share.to_json()?);
            }
        }
        None => {}
    }
    if qr {
        print_qr(&shares, config.qr.max_chunk_size)?;
    }
    Ok(())
}

// ── `seqrets combine` / `seqrets restore` ─────────────────────────────────────

/// Gather every share and vault named on the command line.
async fn collect(config: &SeqretsConfig, inputs: &InputArgs) -> Result<RecoverySession> {
    if inputs.files.is_empty() && inputs.cards.is_empty() {
        anyhow::bail!("no inputs: pass share/vault files or --card <reader>");
    }

    let mut session = RecoverySession::new();
    for path in &inputs.files {
        let bytes = read_file(path)?;
        let report = session
            .submit(&mut FileImport, &bytes)
            .with_context(|| format!("importing {}", path.display()))?;
        println!(
            "  {}: {} added, {} duplicate{}",
            path.display(),
            report.shares_added,
            report.duplicates,
            if report.vault_attached { ", vault" } else { "" }
        );
    }

    if !inputs.cards.is_empty() {
        let service = card::service(config);
        for reader in &inputs.cards {
            card::unlock(&service, reader, inputs.pin.as_deref()).await?;
            let items = seqrets_recovery::CardImport
                .fetch(&service, reader)
                .await
                .with_context(|| format!("reading card in {reader}"))?;
            for item in items {
                session
                    .ingest(item)
                    .with_context(|| format!("importing card in {reader}"))?;
            }
            println!("  card {reader}: imported");
        }
    }

    if let Some(header) = session.header() {
        println!(
            "Collected {} of {} required (set of {}).",
            session.len(),
            header.threshold,
            header.total_shares
        );
    }
    Ok(session)
}

async fn cmd_combine(
    config: &SeqretsConfig,
    inputs: &InputArgs,
    mnemonic: bool,
    output: Option<&Path>,
) -> Result<()> {
    let session = collect(config, inputs).await?;
    if session.vault().is_some() {
        anyhow::bail!("a vault is attached; use `seqrets restore` instead");
    }
    let result = session.restore(None, None);
    let Some(secret) = result.secret else {
        anyhow::bail!(result
            .error
            .unwrap_or_else(|| "reconstruction failed".to_string()));
    };

    if mnemonic {
        let words = Zeroizing::new(secret_to_mnemonic(&secret)?);
        match output {
            Some(path) => write_file(path, words.as_bytes())?,
            None => println!("{}", *words),
        }
        return Ok(());
    }

    match output {
        Some(path) => {
            write_file(path, secret.as_bytes())?;
            println!("Secret written to {} ({} bytes)", path.display(), secret.len());
        }
        None => match std::str::from_utf8(secret.as_bytes()) {
            Ok(text) => println!("{text}"),
            Err(_) => println!("{}", hex::encode(secret.as_bytes())),
        },
    }
    Ok(())
}

async fn cmd_restore(
    config: &SeqretsConfig,
    inputs: &InputArgs,
    cipher: &CipherArgs,
    output: Option<&Path>,
) -> Result<()> {
    let session = collect(config, inputs).await?;
    if session.vault().is_none() {
        anyhow::bail!("no vault among the inputs; use `seqrets combine` for raw secrets");
    }
    if !session.is_ready() {
        let needed = session.remaining().unwrap_or(1);
        anyhow::bail!("need {needed} more Qard(s) to restore");
    }

    let password = read_password(cipher.password.as_deref(), false)?;
    let keyfile = read_keyfile(cipher.keyfile.as_deref())?;

    let pb = make_spinner("restore");
    pb.set_message("deriving key...");
    let result = session.restore(Some(&password), keyfile.as_deref().map(Vec::as_slice));
    pb.finish_and_clear();

    let instruction = match (result.status, result.instruction) {
        (RestoreStatus::InstructionDecrypted, Some(instruction)) => instruction,
        _ => anyhow::bail!(result.error.unwrap_or_else(|| "restore failed".to_string())),
    };
    write_instruction(&instruction, output)
}

fn write_instruction(instruction: &RawInstruction, output: Option<&Path>) -> Result<()> {
    let path = output_for(output, &instruction.file_name)?;
    let content = Zeroizing::new(instruction.content_bytes()?);
    write_file(&path, &content)?;
    println!(
        "Restored {} ({}, {} bytes) to {}",
        instruction.file_name,
        instruction.file_type,
        content.len(),
        path.display()
    );
    if is_inheritance_plan(instruction) {
        println!("This is an inheritance plan; view it with `seqrets plan show {}`", path.display());
    }
    Ok(())
}

// ── `seqrets encrypt` / `seqrets decrypt` ─────────────────────────────────────

fn cmd_encrypt(
    config: &SeqretsConfig,
    input: &Path,
    file_type: Option<String>,
    cipher: &CipherArgs,
    output: Option<&Path>,
) -> Result<()> {
    let instruction = load_instruction(input, file_type)?;
    let password = read_password(cipher.password.as_deref(), true)?;
    let keyfile = read_keyfile(cipher.keyfile.as_deref())?;

    let pb = make_spinner("encrypt");
    pb.set_message("deriving key...");
    let encrypted = encrypt(
        &instruction,
        &password,
        keyfile.as_deref().map(Vec::as_slice),
        &KdfParams::from(&config.crypto),
    )?;
    pb.finish_and_clear();

    let path = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(format!("{}.seqrets.json", input.display())));
    write_file(&path, encrypted.to_json()?.as_bytes())?;
    println!("Encrypted {} → {}", input.display(), path.display());
    if keyfile.is_some() {
        println!("  keyfile required to decrypt");
    }
    Ok(())
}

fn cmd_decrypt(input: &Path, cipher: &CipherArgs, output: Option<&Path>) -> Result<()> {
    let text = String::from_utf8(read_file(input)?).context("input is not UTF-8")?;
    let encrypted = EncryptedInstruction::from_json(&text)
        .with_context(|| format!("parsing {}", input.display()))?;
    if encrypted.requires_keyfile() && cipher.keyfile.is_none() {
        anyhow::bail!("this file was encrypted with a keyfile; pass --keyfile");
    }

    let password = read_password(cipher.password.as_deref(), false)?;
    let keyfile = read_keyfile(cipher.keyfile.as_deref())?;

    let pb = make_spinner("decrypt");
    pb.set_message("deriving key...");
    let result = decrypt(&encrypted, &password, keyfile.as_deref().map(Vec::as_slice));
    pb.finish_and_clear();

    write_instruction(&result?, output)
}

// ── `seqrets seal` ────────────────────────────────────────────────────────────

fn cmd_seal(
    config: &SeqretsConfig,
    input: &Path,
    file_type: Option<String>,
    cipher: &CipherArgs,
    sharing: &SharingArgs,
    out_dir: &Path,
) -> Result<()> {
    let instruction = load_instruction(input, file_type)?;
    let password = read_password(cipher.password.as_deref(), true)?;
    let keyfile = read_keyfile(cipher.keyfile.as_deref())?;

    let (threshold, total_shares, label) = sharing_layout(config, sharing);
    let options = SealOptions {
        threshold,
        total_shares,
        label,
        kdf: KdfParams::from(&config.crypto),
    };

    let pb = make_spinner("seal");
    pb.set_message("deriving key...");
    let exported = seal_instruction(
        &instruction,
        &password,
        keyfile.as_deref().map(Vec::as_slice),
        &options,
    )?;
    pb.finish_and_clear();

    let vault_path = out_dir.join("vault.json");
    write_file(&vault_path, exported.vault.to_json()?.as_bytes())?;
    println!(
        "Sealed {} ({threshold}-of-{total_shares}):",
        input.display()
    );
    println!("  vault:   {}", vault_path.display());
    write_qards(out_dir, &exported.shares)
}

// ── `seqrets qr` ──────────────────────────────────────────────────────────────

fn cmd_qr_encode(
    config: &SeqretsConfig,
    input: &Path,
    max_chunk: Option<usize>,
    output: Option<&Path>,
) -> Result<()> {
    let data = read_file(input)?;
    let frames = seqrets_chunks::encode_text(&data, max_chunk.unwrap_or(config.qr.max_chunk_size))?;
    let text = frames.join("\n") + "\n";
    match output {
        Some(path) => {
            write_file(path, text.as_bytes())?;
            println!("{} frames written to {}", frames.len(), path.display());
        }
        None => print!("{text}"),
    }
    Ok(())
}

fn cmd_qr_decode(input: &Path, output: Option<&Path>) -> Result<()> {
    let text = String::from_utf8(read_file(input)?).context("input is not UTF-8")?;
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .collect();
    let data = seqrets_chunks::decode_text(&lines)
        .with_context(|| format!("decoding {}", input.display()))?;
    match output {
        Some(path) => {
            write_file(path, &data)?;
            println!("{} bytes written to {}", data.len(), path.display());
        }
        None => {
            let text = String::from_utf8(data).context("payload is binary; pass --output")?;
            println!("{text}");
        }
    }
    Ok(())
}

// ── `seqrets plan` ────────────────────────────────────────────────────────────

fn cmd_plan_new(output: &Path) -> Result<()> {
    if output.exists() {
        anyhow::bail!("{} already exists", output.display());
    }
    let plan = InheritancePlan::blank(&today());
    let json = serde_json::to_string_pretty(&plan).context("serializing plan")?;
    write_file(output, json.as_bytes())?;
    println!("Blank plan written to {}", output.display());
    println!("Fill it in, then protect it with `seqrets seal {}`", output.display());
    Ok(())
}

fn cmd_plan_show(input: &Path) -> Result<()> {
    let bytes = read_file(input)?;
    let plan: InheritancePlan = serde_json::from_slice(&bytes)
        .with_context(|| format!("{} is not an inheritance plan", input.display()))?;

    let info = &plan.plan_info;
    println!("Inheritance plan v{}", plan.version);
    println!("  prepared by:  {}", info.prepared_by);
    println!("  created:      {}", info.date_created);
    println!("  updated:      {}", info.last_updated);
    println!("  review:       {}", info.review_schedule);
    println!(
        "  qards:        {} \"{}\"",
        plan.qard_config.configuration, plan.qard_config.label
    );
    for loc in &plan.qard_config.locations {
        println!(
            "    #{}: {} (held by {})",
            loc.qard_number, loc.location, loc.held_by
        );
    }
    println!("  assets:       {}", plan.digital_assets.len());
    for asset in &plan.digital_assets {
        println!("    {} [{}] {}", asset.name, asset.asset_type, asset.platform);
    }
    println!("  contacts:     {}", plan.professional_contacts.len());
    for contact in &plan.professional_contacts {
        println!("    {}: {} {}", contact.role, contact.name, contact.email);
    }
    println!();
    println!("How to restore:");
    println!("{}", plan.how_to_restore);
    if !plan.personal_message.is_empty() {
        println!();
        println!("Personal message:");
        println!("{}", plan.personal_message);
    }
    Ok(())
}

// ── `seqrets config show` ─────────────────────────────────────────────────────

fn cmd_config_show(config: &SeqretsConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();

    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}
