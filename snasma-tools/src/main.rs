use std::{
    fs,
    io::{self, BufRead, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use anyhow::{anyhow, bail, ensure, Context, Result};
use clap::{Args, Parser, Subcommand};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::Serialize;
use snasma_common::{bytes32_from_hex, bytes32_to_hex, fr_to_hex};
use snasma_ledger::{
    config::DEFAULT_TREE_DEPTH, signature, CurvePoint, Domain, Ledger, LedgerConfig, LedgerError,
    SecretKey, Signature, TransactionProof,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_MESSAGE: &str = "abc";
const DEFAULT_SEED: u64 = 0x5eed;

#[derive(Parser)]
#[command(
    name = "snasma-tools",
    about = "Signature samples, ledger simulation and proof inspection for the SNASMA ledger"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print `A.x A.y m R.x R.y s` lines signed by fresh keys.
    MakeSignatures(MakeSignaturesArgs),
    /// Check lines produced by `make-signatures`.
    VerifySignatures(VerifySignaturesArgs),
    /// Run random transfers on a fresh ledger, one JSON proof per line.
    Simulate(SimulateArgs),
    /// Print `from to amount` for each proof line, optionally replaying it.
    InspectProofs(InspectProofsArgs),
}

#[derive(Args)]
struct MakeSignaturesArgs {
    /// Number of signatures to generate.
    #[arg(long)]
    count: usize,
    /// Message to sign (UTF-8).
    #[arg(long, default_value = DEFAULT_MESSAGE)]
    message: String,
    #[arg(long, default_value_t = DEFAULT_SEED)]
    seed: u64,
}

#[derive(Args)]
struct VerifySignaturesArgs {
    /// Maximum number of lines to check.
    #[arg(long)]
    count: usize,
    /// Input file; `-` reads stdin.
    #[arg(long)]
    input: PathBuf,
}

#[derive(Args)]
struct SimulateArgs {
    /// Number of accounts to create.
    #[arg(long)]
    accounts: usize,
    /// Number of transfers to attempt.
    #[arg(long, default_value_t = 1)]
    rounds: usize,
    #[arg(long, default_value_t = DEFAULT_SEED)]
    seed: u64,
    /// JSON `LedgerConfig`; environment overrides apply on top.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Args)]
struct InspectProofsArgs {
    /// Maximum number of proofs to read.
    #[arg(long)]
    count: usize,
    /// Input file; `-` reads stdin.
    #[arg(long)]
    input: PathBuf,
    /// Replay every proof and report failures.
    #[arg(long)]
    verify: bool,
    /// Tree depth the proofs were produced at.
    #[arg(long, default_value_t = DEFAULT_TREE_DEPTH)]
    depth: usize,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,snasma_ledger=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::MakeSignatures(args) => make_signatures(args),
        Commands::VerifySignatures(args) => verify_signatures(args),
        Commands::Simulate(args) => simulate(args),
        Commands::InspectProofs(args) => inspect_proofs(args),
    }
}

/// One line of `make-signatures` output.
struct SignatureSample {
    public_key: CurvePoint,
    message: Vec<u8>,
    signature: Signature,
}

impl SignatureSample {
    fn to_line(&self) -> String {
        format!(
            "{} {} 0x{} {} {} {}",
            bytes32_to_hex(&self.public_key.x),
            bytes32_to_hex(&self.public_key.y),
            hex::encode(&self.message),
            bytes32_to_hex(&self.signature.r.x),
            bytes32_to_hex(&self.signature.r.y),
            bytes32_to_hex(&self.signature.s),
        )
    }

    fn parse(line: &str) -> Result<Self> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        ensure!(fields.len() == 6, "expected 6 fields, got {}", fields.len());
        let message_hex = fields[2].strip_prefix("0x").unwrap_or(fields[2]);
        Ok(Self {
            public_key: CurvePoint {
                x: bytes32_from_hex(fields[0]).context("A.x")?,
                y: bytes32_from_hex(fields[1]).context("A.y")?,
            },
            message: hex::decode(message_hex).context("message")?,
            signature: Signature {
                r: CurvePoint {
                    x: bytes32_from_hex(fields[3]).context("R.x")?,
                    y: bytes32_from_hex(fields[4]).context("R.y")?,
                },
                s: bytes32_from_hex(fields[5]).context("s")?,
            },
        })
    }
}

fn make_signatures(args: MakeSignaturesArgs) -> Result<()> {
    let mut rng = ChaCha20Rng::seed_from_u64(args.seed);
    let message = args.message.into_bytes();
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    for _ in 0..args.count {
        let secret_key = SecretKey::random(&mut rng);
        let sample = SignatureSample {
            public_key: secret_key.public_key(),
            signature: secret_key.sign(Domain::RAW, &message),
            message: message.clone(),
        };
        writeln!(out, "{}", sample.to_line())?;
    }
    out.flush()?;
    Ok(())
}

fn verify_signatures(args: VerifySignaturesArgs) -> Result<()> {
    let reader = open_input(&args.input)?;
    let mut checked = 0usize;
    let mut failed = 0usize;
    for (line_no, line) in data_lines(reader).take(args.count).enumerate() {
        let line = line?;
        let sample = SignatureSample::parse(&line).with_context(|| format!("line {}", line_no + 1))?;
        checked += 1;
        if let Err(err) = signature::try_verify(
            &sample.public_key,
            Domain::RAW,
            &sample.message,
            &sample.signature,
        ) {
            failed += 1;
            warn!(line = line_no + 1, %err, "signature rejected");
        }
    }
    info!(checked, failed, "signature check finished");
    if failed > 0 {
        bail!("{failed} of {checked} signatures failed");
    }
    println!("{checked} signatures ok");
    Ok(())
}

/// Summary line written to stderr after a simulation.
#[derive(Serialize)]
struct SimulationSummary {
    accounts: usize,
    applied: usize,
    rejected: usize,
    root: String,
}

fn simulate(args: SimulateArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    ensure!(args.accounts > 0, "need at least one account");
    ensure!(
        args.accounts as u64 <= config.capacity(),
        "{} accounts do not fit a tree of depth {}",
        args.accounts,
        config.tree_depth
    );

    let mut rng = ChaCha20Rng::seed_from_u64(args.seed);
    let mut ledger = Ledger::new(config).context("failed to create ledger")?;
    let mut keys = Vec::with_capacity(args.accounts);
    for _ in 0..args.accounts {
        let balance = rng.gen_range(1..=1000);
        let (secret_key, _) = ledger.new_account(balance, &mut rng)?;
        keys.push(secret_key);
    }

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let mut applied = 0usize;
    let mut rejected = 0usize;
    for _ in 0..args.rounds {
        let from = rng.gen_range(0..args.accounts);
        let to = rng.gen_range(0..args.accounts);
        let sender = ledger.by_index(from as u32)?.clone();
        let receiver = ledger.by_index(to as u32)?.clone();
        let amount = rng.gen_range(0..=sender.balance);
        let stx = ledger
            .build_transaction(&sender, &receiver, amount)?
            .sign(sender.nonce, &keys[from])?;

        match ledger.apply_transaction(&stx) {
            Ok(proof) => {
                serde_json::to_writer(&mut out, &proof)?;
                writeln!(out)?;
                applied += 1;
            }
            // Receiver overflow or an exhausted nonce is a property of the
            // random draw, not a fault; keep going.
            Err(err @ (LedgerError::BalanceOverflow { .. } | LedgerError::NonceExhausted { .. })) => {
                warn!(%err, "skipping transfer");
                rejected += 1;
            }
            Err(err) => return Err(err).context("transfer failed"),
        }
    }
    out.flush()?;

    let summary = SimulationSummary {
        accounts: ledger.len(),
        applied,
        rejected,
        root: fr_to_hex(&ledger.root()),
    };
    eprintln!("{}", serde_json::to_string(&summary)?);
    Ok(())
}

fn inspect_proofs(args: InspectProofsArgs) -> Result<()> {
    let reader = open_input(&args.input)?;
    let mut failed = 0usize;
    let mut seen = 0usize;
    for (line_no, line) in data_lines(reader).take(args.count).enumerate() {
        let line = line?;
        let proof: TransactionProof = serde_json::from_str(&line)
            .with_context(|| format!("line {} is not a transaction proof", line_no + 1))?;
        seen += 1;
        println!("{}", proof.stx.tx);
        if args.verify {
            if let Err(err) = proof.verify(args.depth) {
                failed += 1;
                warn!(line = line_no + 1, %err, "proof rejected");
            }
        }
    }
    if failed > 0 {
        bail!("{failed} of {seen} proofs failed to replay");
    }
    if args.verify {
        info!(proofs = seen, "all proofs replayed");
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<LedgerConfig> {
    let config = match path {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            LedgerConfig::from_json_str(&raw)
                .with_context(|| format!("failed to parse {}", path.display()))?
        }
        None => LedgerConfig::default(),
    }
    .with_env_overrides();
    config.validate()?;
    Ok(config)
}

fn open_input(path: &Path) -> Result<Box<dyn BufRead>> {
    if path == Path::new("-") {
        return Ok(Box::new(BufReader::new(io::stdin())));
    }
    let file = fs::File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    Ok(Box::new(BufReader::new(file)))
}

/// Non-blank lines, trimmed.
fn data_lines(reader: Box<dyn BufRead>) -> impl Iterator<Item = Result<String>> {
    reader.lines().filter_map(|line| match line {
        Ok(line) if line.trim().is_empty() => None,
        Ok(line) => Some(Ok(line.trim().to_string())),
        Err(err) => Some(Err(anyhow!(err))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_lines_round_trip_and_verify() {
        let secret_key = SecretKey::random(&mut ChaCha20Rng::seed_from_u64(1));
        let sample = SignatureSample {
            public_key: secret_key.public_key(),
            signature: secret_key.sign(Domain::RAW, b"abc"),
            message: b"abc".to_vec(),
        };
        let line = sample.to_line();
        assert_eq!(line.split(' ').count(), 6);
        let parsed = SignatureSample::parse(&line).unwrap();
        assert_eq!(parsed.public_key, sample.public_key);
        assert_eq!(parsed.message, b"abc");
        assert!(signature::verify(
            &parsed.public_key,
            Domain::RAW,
            &parsed.message,
            &parsed.signature
        ));
    }

    #[test]
    fn malformed_sample_lines_are_rejected() {
        assert!(SignatureSample::parse("0x00 0x00").is_err());
        assert!(SignatureSample::parse("a b c d e f").is_err());
    }

    #[test]
    fn data_lines_skip_blanks() {
        let reader: Box<dyn BufRead> = Box::new(io::Cursor::new("a\n\n  b  \n"));
        let lines: Vec<String> = data_lines(reader).collect::<Result<_>>().unwrap();
        assert_eq!(lines, vec!["a", "b"]);
    }
}
