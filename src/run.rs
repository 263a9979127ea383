//! Whole-run driver: every configured cohort through the pipeline.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use crate::assemble::{AssemblyOptions, TimeSeriesAssembler, TimeSeriesTable};
use crate::augment::{
    augmented_file_names, write_augmented_csv, write_jsonblock_csv, AugmentedRow, Augmenter,
};
use crate::config::{CohortConfig, RunConfig};
use crate::error::Result;
use crate::output::{
    output_file_name, write_manifest_json, CohortFailure, CohortManifest, OutputFormatter,
    RunManifest, OUTPUT_SCHEMA_VERSION,
};
use crate::params::GroupParameters;

#[derive(Debug, Clone)]
pub struct RunReport {
    pub manifest: RunManifest,
    pub manifest_path: PathBuf,
}

impl RunReport {
    pub fn failures(&self) -> &[CohortFailure] {
        &self.manifest.failed
    }
}

fn load_and_generate(
    cfg: &RunConfig,
    cohort: &CohortConfig,
) -> Result<(GroupParameters, TimeSeriesTable, u64)> {
    let group = GroupParameters::load(&cohort.parameters, &cohort.name)?;
    let seed = cfg.cohort_seed(cohort);
    let options = AssemblyOptions {
        seed,
        policy: cfg.degenerate_policy,
        out_of_bed_delay: cfg.out_of_bed_delay,
    };
    let table = TimeSeriesAssembler::new(&group, options)?.generate(cfg.participants, cfg.days)?;
    Ok((group, table, seed))
}

/// Loads parameters and generates the table. Nothing is written.
pub fn generate_cohort(cfg: &RunConfig, cohort: &CohortConfig) -> Result<TimeSeriesTable> {
    load_and_generate(cfg, cohort).map(|(_, table, _)| table)
}

pub fn run_cohort(cfg: &RunConfig, cohort: &CohortConfig, outdir: &Path) -> Result<CohortManifest> {
    let (group, table, seed) = load_and_generate(cfg, cohort)?;

    // Enrichment is computed before anything is written so a failure there
    // does not leave the core file behind on its own.
    let augmented = if cfg.augment.enabled {
        let mut augmenter = Augmenter::new(&cfg.augment, seed)?;
        Some(augmenter.augment(&table)?)
    } else {
        None
    };

    let mut written: Vec<PathBuf> = Vec::new();
    let written_ok = write_cohort_files(
        cohort,
        &group,
        &table,
        augmented.as_deref(),
        outdir,
        &mut written,
    );
    if let Err(err) = written_ok {
        // a failed cohort leaves nothing behind
        for path in &written {
            if let Err(e) = fs::remove_file(path) {
                warn!(path = %path.display(), error = %e, "could not remove output of failed cohort");
            }
        }
        return Err(err);
    }
    let outputs = written.iter().map(|p| p.display().to_string()).collect();

    Ok(CohortManifest {
        summary: table.summary(),
        parameters: cohort.parameters.display().to_string(),
        outputs,
    })
}

fn write_cohort_files(
    cohort: &CohortConfig,
    group: &GroupParameters,
    table: &TimeSeriesTable,
    augmented: Option<&[AugmentedRow]>,
    outdir: &Path,
    written: &mut Vec<PathBuf>,
) -> Result<()> {
    let core_path = outdir.join(output_file_name(&cohort.name, group.duration_family()));
    OutputFormatter::write_csv(&core_path, table)?;
    written.push(core_path);

    if let Some(rows) = augmented {
        let (main_name, block_name) = augmented_file_names(&cohort.name);
        let main_path = outdir.join(main_name);
        write_augmented_csv(&main_path, rows)?;
        written.push(main_path);
        let block_path = outdir.join(block_name);
        write_jsonblock_csv(&block_path, rows)?;
        written.push(block_path);
    }
    Ok(())
}

/// Runs each cohort independently. A failing cohort is recorded and the
/// remaining cohorts still run.
pub fn run(cfg: &RunConfig, outdir: &Path) -> Result<RunReport> {
    cfg.validate()?;

    let mut cohorts = Vec::with_capacity(cfg.cohorts.len());
    let mut failures = Vec::new();
    for cohort in &cfg.cohorts {
        match run_cohort(cfg, cohort, outdir) {
            Ok(manifest) => {
                info!(
                    cohort = %cohort.name,
                    clamped = manifest.summary.clamped_rows,
                    mean_se = manifest.summary.mean_se_pct,
                    "cohort complete"
                );
                cohorts.push(manifest);
            }
            Err(err) => {
                error!(cohort = %cohort.name, error = %err, "cohort failed");
                failures.push(CohortFailure {
                    cohort: cohort.name.clone(),
                    error: err.to_string(),
                });
            }
        }
    }

    let manifest = RunManifest {
        schema_version: OUTPUT_SCHEMA_VERSION.to_string(),
        seed: cfg.seed,
        participants: cfg.participants,
        days: cfg.days,
        augmented: cfg.augment.enabled,
        cohorts,
        failed: failures,
        note: "Synthetic sleep diary data sampled from group-level summary statistics".to_string(),
    };
    let manifest_path = write_manifest_json(outdir, &manifest)?;

    Ok(RunReport {
        manifest,
        manifest_path,
    })
}
