//! Command-line entry point for the demodulation pipeline.

use clap::{Parser, Subcommand, ValueEnum};
use demodular::checkpoint::{CheckpointStore, Role, SnapshotRef};
use demodular::config::PipelineConfig;
use demodular::error::{Error, Result};
use demodular::eval::Evaluator;
use demodular::model::{Classifier, LinearClassifier, MaskTranslator, ModelTier, Translator};
use demodular::synth::{demo_sources, ChirpSynth};
use demodular::train::{DirectTrainer, DistillTrainer};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "demodular", version, about = "Neural-enhanced chirp demodulation pipeline")]
struct Cli {
    /// YAML configuration file; defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Seed for model initialization and synthetic data.
    #[arg(long, global = true, default_value_t = 42)]
    seed: u64,

    /// Synthetic batches to generate per run.
    #[arg(long, global = true, default_value_t = 32)]
    demo_batches: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Train the full-capacity pair from scratch.
    Train {
        /// Override the configured iteration count.
        #[arg(long)]
        iters: Option<u64>,
        /// Resume from the latest direct checkpoint instead of a fresh
        /// initialization.
        #[arg(long)]
        resume: bool,
    },
    /// Distill the student pair from the latest direct checkpoint.
    Distill {
        /// Override the configured iteration count.
        #[arg(long)]
        iters: Option<u64>,
    },
    /// Evaluate a trained pair over a synthetic corpus.
    Eval {
        /// Which trained lineage to evaluate.
        #[arg(long, value_enum, default_value_t = EvalRole::Direct)]
        role: EvalRole,
        /// Iteration to load; latest when omitted.
        #[arg(long)]
        iteration: Option<u64>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum EvalRole {
    Direct,
    Student,
}

impl From<EvalRole> for Role {
    fn from(role: EvalRole) -> Self {
        match role {
            EvalRole::Direct => Role::Direct,
            EvalRole::Student => Role::Student,
        }
    }
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error ({}): {err}", err.stage());
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_yaml(path)?,
        None => PipelineConfig::default(),
    };

    let synth = ChirpSynth::new(config.sf, config.bw);
    let sample_len = synth.sample_len();

    println!("Configuration:");
    println!("  spectral: n_fft {} hop {} win {}", config.n_fft, config.hop_length, config.win_length);
    println!("  data: sf {} bw {} Hz, {} classes, batch {}", config.sf, config.bw, config.n_classes, config.batch_size);
    println!("  snr bins: {:?}", config.snr_list);

    match cli.command {
        Command::Train { iters, resume } => {
            if let Some(iters) = iters {
                config = config.with_train_iters(iters);
                config.validate()?;
            }
            let (noisy, clean) = demo_sources(&config, cli.demo_batches, cli.seed)?;
            let mut trainer = DirectTrainer::new(&config, sample_len, cli.seed);
            if resume {
                trainer.resume(SnapshotRef::Latest)?;
            }
            let report = trainer.run(&noisy, &clean)?;
            println!(
                "✓ direct training finished: {} iterations, final loss {:.6}",
                report.iterations,
                report.final_loss.total()
            );
        }
        Command::Distill { iters } => {
            if let Some(iters) = iters {
                config = config.with_train_iters(iters);
                config.validate()?;
            }
            let (noisy, clean) = demo_sources(&config, cli.demo_batches, cli.seed)?;
            let mut trainer = DistillTrainer::new(&config, sample_len, cli.seed)?;
            let report = trainer.run(&noisy, &clean)?;
            println!(
                "✓ distillation finished: {} iterations, final loss {:.6}",
                report.iterations,
                report.final_loss.total()
            );
        }
        Command::Eval { role, iteration } => {
            let role = Role::from(role);
            let which = match iteration {
                Some(i) => SnapshotRef::Iteration(i),
                None => SnapshotRef::Latest,
            };
            let (translator, classifier) = load_models(&config, role, which, sample_len)?;
            // A fresh seed keeps the eval corpus disjoint from training.
            let (noisy, _) = demo_sources(&config, cli.demo_batches, cli.seed.wrapping_add(1000))?;

            let report = Evaluator::new(&config).run(&translator, &classifier, &noisy)?;
            let (metrics_path, scores_path) = report.save(&config)?;
            println!("✓ wrote {}", metrics_path.display());
            println!("✓ wrote {}", scores_path.display());
        }
    }

    Ok(())
}

fn load_models(
    config: &PipelineConfig,
    role: Role,
    which: SnapshotRef,
    sample_len: usize,
) -> Result<(MaskTranslator, LinearClassifier)> {
    let store = CheckpointStore::new(&config.checkpoint_dir);
    let snapshot = store.load_pair(role, which)?;

    let tier = ModelTier::from_str_name(&snapshot.meta.tier).ok_or_else(|| {
        Error::checkpoint(
            &config.checkpoint_dir,
            format!("unknown tier '{}' in checkpoint metadata", snapshot.meta.tier),
        )
    })?;
    let frames = config.frames_for(sample_len);

    let mut translator = MaskTranslator::new(tier, config.n_fft, frames, 0);
    let report = translator.load_state_dict(&snapshot.translator);
    if !report.is_exact() {
        return Err(Error::checkpoint(
            &config.checkpoint_dir,
            format!("translator restore is not exact: {}", report.summary()),
        ));
    }

    let mut classifier =
        LinearClassifier::new(snapshot.meta.n_classes, config.n_fft, frames, 0);
    let report = classifier.load_state_dict(&snapshot.classifier);
    if !report.is_exact() {
        return Err(Error::checkpoint(
            &config.checkpoint_dir,
            format!("classifier restore is not exact: {}", report.summary()),
        ));
    }

    println!(
        "Loaded {} snapshot at iteration {} ({} tier)",
        snapshot.meta.role, snapshot.meta.iteration, snapshot.meta.tier
    );
    Ok((translator, classifier))
}
