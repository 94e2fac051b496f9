//! Subcommand implementations.

use std::io::Read;
use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use nexus_verifier::core::receipt_to_value;
use nexus_verifier::core::types::strip_hex_prefix;
use nexus_verifier::store::SqlitePolicyStore;
use nexus_verifier::{
    BatchError, BatchReport, DigestLayout, ExecutionHash, FirmwareHash, HardwareId,
    KeccakDigestEngine, Receipt, ReceiptBuilder, Verifier, VerifierConfig,
};

/// Verifier over the on-disk policy store.
pub type CliVerifier = Verifier<SqlitePolicyStore>;

/// Exit code for a rejected receipt.
const EXIT_REJECTED: u8 = 2;

/// Open the policy store at `db` and build a verifier over it.
pub fn open_verifier(db: &Path, config: VerifierConfig) -> Result<CliVerifier> {
    let store = SqlitePolicyStore::open(db)
        .with_context(|| format!("failed to open policy store {}", db.display()))?;
    let verifier = Verifier::new(store, config).context("failed to build verifier")?;
    info!(
        db = %db.display(),
        layout = %verifier.layout().layout_id(),
        "policy store opened"
    );
    Ok(verifier)
}

pub async fn authorize(verifier: &CliVerifier, hw: &HardwareId, label: &str) -> Result<ExitCode> {
    verifier
        .authorize_node(hw, label)
        .await
        .context("failed to authorize node")?;
    println!("authorized {}", hw.to_prefixed_hex());
    Ok(ExitCode::SUCCESS)
}

pub async fn revoke_node(verifier: &CliVerifier, hw: &HardwareId) -> Result<ExitCode> {
    let removed = verifier
        .revoke_node(hw)
        .await
        .context("failed to revoke node")?;
    if removed {
        println!("revoked {}", hw.to_prefixed_hex());
    } else {
        println!("{} was not authorized", hw.to_prefixed_hex());
    }
    Ok(ExitCode::SUCCESS)
}

pub async fn approve(verifier: &CliVerifier, fw: &FirmwareHash) -> Result<ExitCode> {
    verifier
        .approve_firmware(fw)
        .await
        .context("failed to approve firmware")?;
    println!("approved {}", fw.to_prefixed_hex());
    Ok(ExitCode::SUCCESS)
}

pub async fn revoke_firmware(verifier: &CliVerifier, fw: &FirmwareHash) -> Result<ExitCode> {
    let removed = verifier
        .revoke_firmware(fw)
        .await
        .context("failed to revoke firmware")?;
    if removed {
        println!("revoked {}", fw.to_prefixed_hex());
    } else {
        println!("{} was not approved", fw.to_prefixed_hex());
    }
    Ok(ExitCode::SUCCESS)
}

pub async fn status(verifier: &CliVerifier, hw: &HardwareId) -> Result<ExitCode> {
    let status = verifier
        .node_status(hw)
        .await
        .context("failed to read node status")?;
    print_json(&status)?;
    Ok(ExitCode::SUCCESS)
}

pub async fn snapshot(verifier: &CliVerifier) -> Result<ExitCode> {
    let snapshot = verifier
        .snapshot()
        .await
        .context("failed to read policy snapshot")?;
    print_json(&snapshot)?;
    Ok(ExitCode::SUCCESS)
}

pub async fn verify(verifier: &CliVerifier, file: Option<&Path>) -> Result<ExitCode> {
    let input = read_input(file)?;
    let verdict = verifier
        .verify_json(&input)
        .await
        .context("verification could not complete")?;
    print_json(&verdict)?;

    if verdict.is_accepted() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(EXIT_REJECTED))
    }
}

pub async fn verify_batch(verifier: &CliVerifier, file: Option<&Path>) -> Result<ExitCode> {
    let input = read_input(file)?;
    let data = decode_batch_hex(&input)?;

    match verifier.verify_batch(&data).await {
        Ok(report) => {
            print_json(&BatchSummary::from(&report))?;
            Ok(ExitCode::SUCCESS)
        },
        Err(BatchError::StorageUnavailable {
            index,
            partial,
            source,
        }) => {
            print_json(&BatchSummary::from(&partial))?;
            Err(source).with_context(|| format!("batch stopped at record {index}"))
        },
        Err(err) => Err(err).context("batch rejected"),
    }
}

pub fn gen_receipt(
    config: &VerifierConfig,
    hw: HardwareId,
    fw: FirmwareHash,
    exec: ExecutionHash,
    counter: u64,
) -> Result<ExitCode> {
    let receipt = generate_receipt(&config.layout, hw, fw, exec, counter);
    print_json(&receipt_to_value(&receipt))?;
    Ok(ExitCode::SUCCESS)
}

/// Build a receipt sealed under `layout`.
///
/// Receipts for any layout other than the default declare it.
fn generate_receipt(
    layout: &DigestLayout,
    hw: HardwareId,
    fw: FirmwareHash,
    exec: ExecutionHash,
    counter: u64,
) -> Receipt {
    let mut builder = ReceiptBuilder::new(hw, counter).firmware(fw).execution(exec);
    if *layout != DigestLayout::default() {
        builder = builder.declare_layout(layout.layout_id());
    }
    builder.seal(&KeccakDigestEngine::new(layout.clone()))
}

/// Report printed by `verify-batch`.
#[derive(Debug, Serialize)]
struct BatchSummary<'a> {
    records: usize,
    accepted: usize,
    rejected: usize,
    bitset: String,
    outcomes: &'a [nexus_verifier::Verdict],
}

impl<'a> From<&'a BatchReport> for BatchSummary<'a> {
    fn from(report: &'a BatchReport) -> Self {
        Self {
            records: report.len(),
            accepted: report.accepted_count(),
            rejected: report.rejected_count(),
            bitset: format!("0x{}", hex::encode(report.accepted_bitset())),
            outcomes: &report.outcomes,
        }
    }
}

fn decode_batch_hex(input: &str) -> Result<Vec<u8>> {
    let text: String = input.split_whitespace().collect();
    hex::decode(strip_hex_prefix(&text)).context("batch is not valid hex")
}

fn read_input(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display())),
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read stdin")?;
            Ok(buf)
        },
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
