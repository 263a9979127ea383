use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;

use sleepdiary_synth::config::{validate_cohort_name, CohortConfig, RunConfig};
use sleepdiary_synth::output::create_timestamped_run_dir;
use sleepdiary_synth::run::run;
use sleepdiary_synth::DegeneratePolicy;

#[derive(Debug, Parser)]
#[command(name = "sleepdiary-synth")]
#[command(about = "Synthetic sleep diary time series from group-level summary statistics")]
struct Cli {
    /// TOML run configuration.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Single parameter CSV; replaces the configured cohorts.
    #[arg(long, requires = "cohort")]
    params: Option<PathBuf>,

    /// Cohort name used with --params.
    #[arg(long, requires = "params")]
    cohort: Option<String>,

    #[arg(long)]
    participants: Option<u32>,

    #[arg(long)]
    days: Option<u32>,

    #[arg(long)]
    seed: Option<u64>,

    #[arg(long, default_value = "output-sleepdiary-synth")]
    outdir: PathBuf,

    /// Also write the enriched diary tables.
    #[arg(long, default_value_t = false)]
    augment: bool,

    /// Abort a cohort on a non-positive time in bed instead of clamping.
    #[arg(long, default_value_t = false)]
    strict: bool,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "sleepdiary_synth=info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn resolve_config(cli: &Cli) -> Result<RunConfig> {
    let mut cfg = match &cli.config {
        Some(path) => RunConfig::from_toml_file(path)
            .with_context(|| format!("failed to load config: {}", path.display()))?,
        None => {
            let mut cfg = RunConfig::default();
            cfg.resolve_relative_to(&PathBuf::from(env!("CARGO_MANIFEST_DIR")));
            cfg
        }
    };

    if let (Some(params), Some(cohort)) = (&cli.params, &cli.cohort) {
        validate_cohort_name(cohort)?;
        cfg.cohorts = vec![CohortConfig {
            name: cohort.clone(),
            parameters: params.clone(),
            seed: None,
        }];
    }
    if let Some(p) = cli.participants {
        cfg.participants = p;
    }
    if let Some(d) = cli.days {
        cfg.days = d;
    }
    if let Some(seed) = cli.seed {
        cfg.seed = seed;
    }
    if cli.augment {
        cfg.augment.enabled = true;
    }
    if cli.strict {
        cfg.degenerate_policy = DegeneratePolicy::Fail;
    }

    cfg.validate().context("invalid run configuration")?;
    Ok(cfg)
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let cfg = resolve_config(&cli)?;
    let run_dir = create_timestamped_run_dir(&cli.outdir)
        .with_context(|| format!("failed to create run directory under {}", cli.outdir.display()))?;

    let report = run(&cfg, &run_dir).context("run failed")?;

    println!("wrote outputs to {}", run_dir.display());
    if !report.failures().is_empty() {
        let names: Vec<&str> = report.failures().iter().map(|f| f.cohort.as_str()).collect();
        bail!("{} cohort(s) failed: {}", names.len(), names.join(", "));
    }
    Ok(())
}
