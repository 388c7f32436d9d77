//! DKG ceremony simulator
//!
//! Runs a whole ceremony in-process, playing every participant, and prints a
//! JSON summary of the outcome and of every deposit movement:
//! - honest run ending with a group public key
//! - single-shot private-share complaints, justified or not
//! - enrollment and commit timeouts
//! - interactive binary-search disputes

mod simulation;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use dkg_ceremony::{CeremonyConfig, ComplaintOutcome, DEFAULT_DEPOSIT};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use simulation::Simulation;
use std::path::PathBuf;
use tracing::{info, Level};

/// DKG Sim - ceremony simulator
#[derive(Parser)]
#[command(name = "dkg-sim")]
#[command(about = "Simulate a deposit-backed DKG ceremony")]
#[command(version)]
struct Cli {
    /// Number of participants
    #[arg(short, long, env = "DKG_PARTICIPANTS", default_value_t = 3)]
    n: usize,

    /// Polynomial degree (t + 1 shares reconstruct the key)
    #[arg(short, long, env = "DKG_THRESHOLD", default_value_t = 1)]
    t: usize,

    /// Deposit per participant
    #[arg(short, long, env = "DKG_DEPOSIT", default_value_t = DEFAULT_DEPOSIT)]
    deposit: u128,

    /// JSON ceremony configuration; overrides --n, --t and --deposit
    #[arg(short, long, env = "DKG_CONFIG")]
    config: Option<PathBuf>,

    /// Seed for key and polynomial generation
    #[arg(short, long, env = "DKG_SEED", default_value_t = 0)]
    seed: u64,

    /// Write the final ceremony state to this file
    #[arg(long)]
    snapshot: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Everyone behaves; the ceremony ends with a group key
    Happy,

    /// A participant complains about the share it received
    Complaint {
        /// Complaining participant
        #[arg(long, default_value_t = 1)]
        challenger: usize,

        /// Accused participant
        #[arg(long, default_value_t = 2)]
        accused: usize,

        /// Make the accused actually deal a bad share
        #[arg(long)]
        justified: bool,
    },

    /// Not everyone enrolls before the deadline
    EnrollmentTimeout {
        /// Participants that enroll
        #[arg(long, default_value_t = 1)]
        enrolled: usize,
    },

    /// A participant never posts its commitment
    CommitTimeout {
        /// Participant that stays silent
        #[arg(long, default_value_t = 2)]
        missing: usize,
    },

    /// Challenger and accused settle a disagreement interactively
    Dispute {
        /// Complaining participant
        #[arg(long, default_value_t = 1)]
        challenger: usize,

        /// Accused participant
        #[arg(long, default_value_t = 2)]
        accused: usize,

        /// Coefficient index from which the accused lies about aggregates
        #[arg(long)]
        falsify_from: Option<usize>,

        /// Make the accused deal a bad share to the challenger
        #[arg(long)]
        bad_share: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    info!(
        n = config.n,
        t = config.t,
        deposit = %config.deposit,
        seed = cli.seed,
        "Starting simulation"
    );

    let mut rng = ChaCha20Rng::seed_from_u64(cli.seed);
    let mut sim = Simulation::new(config.clone(), &mut rng)?;

    let scenario = match cli.command {
        Commands::Happy => {
            sim.enroll(config.n)?;
            sim.commit(&[], None)?;
            sim.close_complaint_window()?;
            sim.submit_group_key(1)?;
            sim.finalize()?;
            "happy"
        }
        Commands::Complaint {
            challenger,
            accused,
            justified,
        } => {
            sim.enroll(config.n)?;
            let corrupt = justified.then_some((accused, challenger));
            sim.commit(&[], corrupt)?;
            match sim.private_complaint(challenger, accused)? {
                ComplaintOutcome::Settled(outcome) => {
                    info!(verdict = ?outcome.verdict, guilty = outcome.guilty, "Complaint settled")
                }
                other => bail!("Unexpected complaint outcome: {other:?}"),
            }
            "complaint"
        }
        Commands::EnrollmentTimeout { enrolled } => {
            if enrolled >= config.n {
                bail!("Enrollment only times out with fewer than {} participants", config.n);
            }
            sim.enroll(enrolled)?;
            sim.enrollment_timeout()?;
            "enrollment-timeout"
        }
        Commands::CommitTimeout { missing } => {
            sim.enroll(config.n)?;
            sim.commit(&[missing], None)?;
            sim.commit_timeout()?;
            "commit-timeout"
        }
        Commands::Dispute {
            challenger,
            accused,
            falsify_from,
            bad_share,
        } => {
            sim.enroll(config.n)?;
            let corrupt = bad_share.then_some((accused, challenger));
            sim.commit(&[], corrupt)?;
            let outcome = sim.dispute(challenger, accused, falsify_from)?;
            info!(verdict = ?outcome.verdict, guilty = outcome.guilty, "Dispute settled");
            "dispute"
        }
    };

    if let Some(path) = &cli.snapshot {
        let json = sim.ceremony().snapshot().to_json()?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write snapshot to {}", path.display()))?;
        info!(path = ?path, "Snapshot saved");
    }

    let summary = sim.summary(scenario);
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}

fn load_config(cli: &Cli) -> Result<CeremonyConfig> {
    match &cli.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let config: CeremonyConfig = serde_json::from_str(&json)?;
            config.validate()?;
            Ok(config)
        }
        None => Ok(CeremonyConfig::new(cli.n, cli.t, cli.deposit)?),
    }
}
