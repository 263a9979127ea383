//! Tabular rendering of a generated cohort and the run manifest.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use csv::Writer;
use serde::Serialize;
use tracing::info;

use crate::assemble::{CohortSummary, ParticipantDay, TimeSeriesTable};
use crate::clock::{format_clock, format_duration};
use crate::error::Result;
use crate::params::DistributionFamily;

pub const OUTPUT_SCHEMA_VERSION: &str = "1.0.0";

/// Column order of the cohort CSV.
pub const COLUMNS: [&str; 26] = [
    "participant",
    "day",
    "lights_off_min",
    "lights_off_clock",
    "sleep_end_min",
    "sleep_end_clock",
    "out_of_bed_min",
    "out_of_bed_clock",
    "midpoint_min",
    "midpoint_clock",
    "final_wake_min",
    "final_wake_clock",
    "sol_min",
    "sol_hhmm",
    "waso_min",
    "waso_hhmm",
    "twt_min",
    "twt_hhmm",
    "tib_min",
    "tib_hhmm",
    "tib_hours",
    "tst_min",
    "tst_hhmm",
    "tst_hours",
    "se_pct",
    "tib_clamped",
];

/// One CSV record. Clock `*_min` values are night-axis minutes, negative
/// before midnight.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormattedRow {
    pub participant: String,
    pub day: u32,
    pub lights_off_min: f64,
    pub lights_off_clock: String,
    pub sleep_end_min: f64,
    pub sleep_end_clock: String,
    pub out_of_bed_min: f64,
    pub out_of_bed_clock: String,
    pub midpoint_min: f64,
    pub midpoint_clock: String,
    pub final_wake_min: f64,
    pub final_wake_clock: String,
    pub sol_min: f64,
    pub sol_hhmm: String,
    pub waso_min: f64,
    pub waso_hhmm: String,
    pub twt_min: f64,
    pub twt_hhmm: String,
    pub tib_min: f64,
    pub tib_hhmm: String,
    pub tib_hours: f64,
    pub tst_min: f64,
    pub tst_hhmm: String,
    pub tst_hours: f64,
    pub se_pct: f64,
    pub tib_clamped: bool,
}

impl From<&ParticipantDay> for FormattedRow {
    fn from(row: &ParticipantDay) -> Self {
        let p = &row.primary;
        let d = &row.derived;
        Self {
            participant: row.participant.code(),
            day: row.day,
            lights_off_min: p.lights_off,
            lights_off_clock: format_clock(p.lights_off),
            sleep_end_min: d.sleep_end,
            sleep_end_clock: format_clock(d.sleep_end),
            out_of_bed_min: d.out_of_bed,
            out_of_bed_clock: format_clock(d.out_of_bed),
            midpoint_min: d.midpoint,
            midpoint_clock: format_clock(d.midpoint),
            final_wake_min: p.final_wake,
            final_wake_clock: format_clock(p.final_wake),
            sol_min: p.sol,
            sol_hhmm: format_duration(p.sol),
            waso_min: p.waso,
            waso_hhmm: format_duration(p.waso),
            twt_min: d.twt,
            twt_hhmm: format_duration(d.twt),
            tib_min: d.tib,
            tib_hhmm: format_duration(d.tib),
            tib_hours: d.tib / 60.0,
            tst_min: d.tst,
            tst_hhmm: format_duration(d.tst),
            tst_hours: d.tst / 60.0,
            se_pct: d.se,
            tib_clamped: d.tib_clamped,
        }
    }
}

pub struct OutputFormatter;

impl OutputFormatter {
    pub fn format(table: &TimeSeriesTable) -> Vec<FormattedRow> {
        table.rows().iter().map(FormattedRow::from).collect()
    }

    pub fn write_csv(path: &Path, table: &TimeSeriesTable) -> Result<()> {
        write_rows_atomic(path, &Self::format(table))?;
        info!(cohort = table.cohort(), path = %path.display(), rows = table.len(), "wrote cohort table");
        Ok(())
    }
}

/// `synthetic_sleepdata_timeseries_{cohort}_{family}_clock.csv`
pub fn output_file_name(cohort: &str, family: DistributionFamily) -> String {
    format!(
        "synthetic_sleepdata_timeseries_{cohort}_{}_clock.csv",
        family.as_str()
    )
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}

/// Serializes `rows` next to `path` and renames into place once flushed. A
/// failure removes the partial file, so `path` either holds a complete table
/// or is left untouched.
pub fn write_rows_atomic<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let tmp = partial_path(path);
    let result = write_rows(&tmp, rows).and_then(|()| fs::rename(&tmp, path).map_err(Into::into));
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

fn write_rows<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut writer = Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
pub struct CohortManifest {
    pub summary: CohortSummary,
    pub parameters: String,
    pub outputs: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CohortFailure {
    pub cohort: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunManifest {
    pub schema_version: String,
    pub seed: u64,
    pub participants: u32,
    pub days: u32,
    pub augmented: bool,
    pub cohorts: Vec<CohortManifest>,
    pub failed: Vec<CohortFailure>,
    pub note: String,
}

pub fn ensure_outdir(outdir: &Path) -> Result<()> {
    fs::create_dir_all(outdir)?;
    Ok(())
}

/// Creates `<base>/<UTC timestamp>`, adding a numeric suffix on collision.
pub fn create_timestamped_run_dir(base: &Path) -> Result<PathBuf> {
    ensure_outdir(base)?;

    let timestamp = Utc::now().format("%Y-%m-%dT%H-%M-%SZ").to_string();
    let mut run_dir = base.join(&timestamp);
    let mut counter = 1_u32;
    while run_dir.exists() {
        run_dir = base.join(format!("{timestamp}-{counter:02}"));
        counter += 1;
    }

    fs::create_dir_all(&run_dir)?;
    Ok(run_dir)
}

pub fn write_manifest_json(outdir: &Path, manifest: &RunManifest) -> Result<PathBuf> {
    let path = outdir.join("manifest.json");
    let payload = serde_json::to_string_pretty(manifest)?;
    fs::write(&path, payload)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assemble::generate;
    use crate::params::{GroupParameters, Variable, VariableParams};

    fn table() -> TimeSeriesTable {
        let group = GroupParameters::from_entries(
            "control",
            [
                (
                    Variable::LightsOff,
                    VariableParams::new(-30.0, 30.0, DistributionFamily::Normal),
                ),
                (
                    Variable::SleepEnd,
                    VariableParams::new(420.0, 40.0, DistributionFamily::Normal),
                ),
                (
                    Variable::Sol,
                    VariableParams::new(20.0, 10.0, DistributionFamily::Gamma),
                ),
                (
                    Variable::Waso,
                    VariableParams::new(12.0, 8.0, DistributionFamily::Gamma),
                ),
            ],
        )
        .unwrap();
        generate(&group, 3, 4, 42).unwrap()
    }

    #[test]
    fn file_name_encodes_cohort_and_family() {
        assert_eq!(
            output_file_name("control", DistributionFamily::Gamma),
            "synthetic_sleepdata_timeseries_control_gamma_clock.csv"
        );
    }

    #[test]
    fn numeric_columns_keep_full_precision() {
        let t = table();
        let rows = OutputFormatter::format(&t);
        assert_eq!(rows.len(), 12);
        let first = &rows[0];
        assert_eq!(first.participant, "Mock_001");
        assert_eq!(first.lights_off_min, t.rows()[0].primary.lights_off);
        assert_eq!(first.lights_off_clock, format_clock(first.lights_off_min));
        assert_eq!(first.tib_hours, t.rows()[0].derived.tib / 60.0);
    }

    #[test]
    fn csv_header_matches_documented_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(output_file_name("control", DistributionFamily::Gamma));
        let t = table();
        OutputFormatter::write_csv(&path, &t).unwrap();
        assert!(!partial_path(&path).exists());

        let mut rdr = csv::Reader::from_path(&path).unwrap();
        let header: Vec<String> = rdr.headers().unwrap().iter().map(str::to_string).collect();
        assert_eq!(header, COLUMNS.to_vec());

        let records: Vec<csv::StringRecord> = rdr.records().map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), t.len());
        let lights_off: f64 = records[0][2].parse().unwrap();
        assert_eq!(lights_off, t.rows()[0].primary.lights_off);
    }

    #[test]
    fn failed_write_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.csv");
        assert!(write_rows_atomic(&path, &OutputFormatter::format(&table())).is_err());
        assert!(!path.exists());
        assert!(!partial_path(&path).exists());
    }

    #[test]
    fn run_dirs_are_unique() {
        let dir = tempfile::tempdir().unwrap();
        let a = create_timestamped_run_dir(dir.path()).unwrap();
        let b = create_timestamped_run_dir(dir.path()).unwrap();
        assert_ne!(a, b);
        assert!(a.is_dir() && b.is_dir());
    }
}
