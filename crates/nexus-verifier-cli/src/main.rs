//! nexus-verifier - Operator CLI for the Nexus receipt verifier.
//!
//! Governance operations, single and batch verification against a SQLite
//! policy store, and test-receipt generation.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use nexus_verifier::{DigestLayout, ExecutionHash, FirmwareHash, HardwareId, VerifierConfig};

mod commands;

/// Hardware identity used by `gen-receipt` when `--hw` is not given.
const DEFAULT_TEST_HW: &str = "52fdfc072182654f163f5f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f";
/// Firmware hash used by `gen-receipt` when `--fw` is not given.
const DEFAULT_TEST_FW: &str = "1234567890abcdef1234567890abcdef1234567890abcdef1234567890abcdef";
/// Execution hash used by `gen-receipt` when `--exec` is not given.
const DEFAULT_TEST_EXEC: &str = "deadbeefcafebabe000000000000000000000000000000000000000000000001";

/// nexus-verifier - Canonical receipt verifier
#[derive(Parser, Debug)]
#[command(name = "nexus-verifier")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the SQLite policy database
    #[arg(long, env = "NEXUS_DB", default_value = "nexus-policy.db")]
    db: PathBuf,

    /// Path to a JSON verifier configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Use the chain-scoped layout for this chain id
    #[arg(long)]
    chain_id: Option<u64>,

    /// Digest domain tag
    #[arg(long)]
    domain: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    // === Governance ===
    /// Add a hardware identity to the allowlist
    Authorize {
        /// Hardware identity (hex, optional 0x)
        #[arg(value_parser = parse_hw)]
        hw: HardwareId,
        /// Operator label for the node
        label: String,
    },

    /// Remove a hardware identity from the allowlist
    RevokeNode {
        #[arg(value_parser = parse_hw)]
        hw: HardwareId,
    },

    /// Approve a firmware hash
    Approve {
        #[arg(value_parser = parse_fw)]
        fw: FirmwareHash,
    },

    /// Revoke a firmware hash
    RevokeFirmware {
        #[arg(value_parser = parse_fw)]
        fw: FirmwareHash,
    },

    // === Inspection ===
    /// Print a node's authorization and counter as JSON
    Status {
        #[arg(value_parser = parse_hw)]
        hw: HardwareId,
    },

    /// Print the full policy snapshot as JSON
    Snapshot,

    // === Verification ===
    /// Verify one JSON receipt (exit 0 on accept, 2 on reject)
    Verify {
        /// Receipt file; stdin when omitted
        file: Option<PathBuf>,
    },

    /// Verify a hex-encoded packed batch
    VerifyBatch {
        /// Batch file; stdin when omitted
        file: Option<PathBuf>,
    },

    // === Testing ===
    /// Emit a correctly digested JSON receipt
    GenReceipt {
        #[arg(long, value_parser = parse_hw, default_value = DEFAULT_TEST_HW)]
        hw: HardwareId,
        #[arg(long, value_parser = parse_fw, default_value = DEFAULT_TEST_FW)]
        fw: FirmwareHash,
        #[arg(long, value_parser = parse_exec, default_value = DEFAULT_TEST_EXEC)]
        exec: ExecutionHash,
        #[arg(long, default_value_t = 1)]
        counter: u64,
    },
}

fn parse_hw(s: &str) -> Result<HardwareId, String> {
    HardwareId::from_hex(s).map_err(|e| format!("invalid hardware identity: {e}"))
}

fn parse_fw(s: &str) -> Result<FirmwareHash, String> {
    FirmwareHash::from_hex(s).map_err(|e| format!("invalid firmware hash: {e}"))
}

fn parse_exec(s: &str) -> Result<ExecutionHash, String> {
    ExecutionHash::from_hex(s).map_err(|e| format!("invalid execution hash: {e}"))
}

impl Cli {
    /// Resolve the verifier configuration: file first, then flag overrides.
    fn verifier_config(&self) -> Result<VerifierConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read config {}", path.display()))?;
                serde_json::from_str(&raw)
                    .with_context(|| format!("failed to parse config {}", path.display()))?
            },
            None => VerifierConfig::default(),
        };

        if let Some(layout) = layout_override(self.domain.as_deref(), self.chain_id)? {
            config.layout = layout;
        }
        config.validate().context("invalid verifier configuration")?;
        Ok(config)
    }
}

/// Layout selected by `--domain` / `--chain-id`.
///
/// A chain id alone selects the anchor domain; a domain alone is unscoped.
fn layout_override(domain: Option<&str>, chain_id: Option<u64>) -> Result<Option<DigestLayout>> {
    let layout = match (domain, chain_id) {
        (None, None) => return Ok(None),
        (Some(domain), None) => DigestLayout::unscoped(domain)?,
        (None, Some(chain_id)) => DigestLayout::anchor_v1(chain_id),
        (Some(domain), Some(chain_id)) => DigestLayout::chain_scoped(domain, chain_id)?,
    };
    Ok(Some(layout))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing();

    let config = cli.verifier_config()?;

    let open = || commands::open_verifier(&cli.db, config.clone());

    match cli.command {
        Commands::Authorize { hw, label } => commands::authorize(&open()?, &hw, &label).await,
        Commands::RevokeNode { hw } => commands::revoke_node(&open()?, &hw).await,
        Commands::Approve { fw } => commands::approve(&open()?, &fw).await,
        Commands::RevokeFirmware { fw } => commands::revoke_firmware(&open()?, &fw).await,
        Commands::Status { hw } => commands::status(&open()?, &hw).await,
        Commands::Snapshot => commands::snapshot(&open()?).await,
        Commands::Verify { file } => commands::verify(&open()?, file.as_deref()).await,
        Commands::VerifyBatch { file } => commands::verify_batch(&open()?, file.as_deref()).await,
        Commands::GenReceipt {
            hw,
            fw,
            exec,
            counter,
        } => commands::gen_receipt(&config, hw, fw, exec, counter),
    }
}
