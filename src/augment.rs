//! Diary enrichment layered over a finished cohort table.
//!
//! None of these fields come from published statistics. They are drawn from
//! plausible fixed distributions on a separate random stream, so enabling
//! enrichment never changes the core sleep values.

use std::path::Path;

use chrono::{Days, NaiveDate};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal, Poisson};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::assemble::{ParticipantDay, TimeSeriesTable};
use crate::clock::format_clock;
use crate::error::{Result, SynthError};
use crate::output::{write_rows_atomic, FormattedRow, COLUMNS};

const AUGMENT_STREAM_SALT: u64 = 0x5EED_D1A2_0000_0001;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AugmentConfig {
    pub enabled: bool,
    pub start_date: String,
    pub email_domain: String,
}

impl Default for AugmentConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            start_date: "2024-03-01".to_string(),
            email_domain: "example.test".to_string(),
        }
    }
}

impl AugmentConfig {
    pub fn parsed_start_date(&self) -> Result<NaiveDate> {
        NaiveDate::parse_from_str(self.start_date.trim(), "%Y-%m-%d")
            .map_err(|_| SynthError::Date(self.start_date.clone()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HabitFields {
    pub sleep_quality: u8,
    pub rested: u8,
    pub physical_activity_min: u32,
    pub caffeine_cups: u32,
    pub medication: Option<String>,
    pub calm_down_min: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AugmentedRow {
    pub core: ParticipantDay,
    pub email: String,
    pub date: NaiveDate,
    pub habits: HabitFields,
}

impl AugmentedRow {
    pub fn date_label(&self) -> String {
        self.date.format("%d/%m/%Y").to_string()
    }
}

struct HabitDistributions {
    sleep_quality: Normal<f64>,
    rested: Normal<f64>,
    activity: Normal<f64>,
    caffeine: Poisson<f64>,
    calm_down: Normal<f64>,
}

impl HabitDistributions {
    fn new() -> Result<Self> {
        let normal = |name: &str, mean: f64, std: f64| {
            Normal::new(mean, std).map_err(|e| SynthError::invalid(name, e.to_string()))
        };
        Ok(Self {
            sleep_quality: normal("sleep_quality", 7.0, 1.5)?,
            rested: normal("rested", 6.5, 1.8)?,
            activity: normal("physical_activity", 50.0, 20.0)?,
            caffeine: Poisson::new(1.2).map_err(|e| SynthError::invalid("caffeine", e.to_string()))?,
            calm_down: normal("calm_down", 45.0, 15.0)?,
        })
    }
}

pub struct Augmenter {
    start_date: NaiveDate,
    email_domain: String,
    dists: HabitDistributions,
    rng: ChaCha8Rng,
}

impl Augmenter {
    pub fn new(config: &AugmentConfig, seed: u64) -> Result<Self> {
        let domain = config.email_domain.trim();
        if domain.is_empty() || domain.contains('@') || domain.contains(char::is_whitespace) {
            return Err(SynthError::InvalidConfig(format!(
                "invalid email domain '{}'",
                config.email_domain
            )));
        }
        Ok(Self {
            start_date: config.parsed_start_date()?,
            email_domain: domain.to_string(),
            dists: HabitDistributions::new()?,
            rng: ChaCha8Rng::seed_from_u64(seed ^ AUGMENT_STREAM_SALT),
        })
    }

    fn draw_habits(&mut self) -> HabitFields {
        let rng = &mut self.rng;
        let d = &self.dists;
        let scale = |v: f64| v.round().clamp(1.0, 10.0) as u8;
        HabitFields {
            sleep_quality: scale(d.sleep_quality.sample(rng)),
            rested: scale(d.rested.sample(rng)),
            physical_activity_min: d.activity.sample(rng).clamp(0.0, 180.0) as u32,
            caffeine_cups: d.caffeine.sample(rng).clamp(0.0, 6.0) as u32,
            medication: None,
            calm_down_min: d.calm_down.sample(rng).clamp(0.0, 120.0) as u32,
        }
    }

    pub fn augment(&mut self, table: &TimeSeriesTable) -> Result<Vec<AugmentedRow>> {
        let mut rows = Vec::with_capacity(table.len());
        for core in table.rows() {
            let date = self
                .start_date
                .checked_add_days(Days::new(u64::from(core.day - 1)))
                .ok_or_else(|| SynthError::Date(format!("{} + {} days", self.start_date, core.day - 1)))?;
            rows.push(AugmentedRow {
                core: *core,
                email: format!("mock_{:03}@{}", core.participant.0, self.email_domain),
                date,
                habits: self.draw_habits(),
            });
        }
        Ok(rows)
    }
}

/// Compact JSON sleep block as exported by diary web forms.
pub fn sleep_json(row: &ParticipantDay) -> serde_json::Value {
    let p = &row.primary;
    let d = &row.derived;
    json!({
        "start": format_clock(p.lights_off),
        "end": format_clock(d.sleep_end),
        "totals": {
            "sl": p.sol.round() as i64,
            "wans": p.waso.round() as i64,
            "twt": d.twt.round() as i64,
            "tib": d.tib.round() as i64,
            "tst": d.tst.round() as i64,
            "se": (d.se * 10.0).round() / 10.0,
        }
    })
}

const HABIT_COLUMNS: [&str; 6] = [
    "sleep_quality",
    "rested",
    "physical_activity_min",
    "caffeine_cups",
    "medication",
    "calm_down_min",
];

fn habit_cells(h: &HabitFields) -> [String; 6] {
    [
        h.sleep_quality.to_string(),
        h.rested.to_string(),
        h.physical_activity_min.to_string(),
        h.caffeine_cups.to_string(),
        h.medication.clone().unwrap_or_default(),
        h.calm_down_min.to_string(),
    ]
}

fn core_cells(row: &FormattedRow) -> Vec<String> {
    vec![
        row.day.to_string(),
        row.lights_off_min.to_string(),
        row.lights_off_clock.clone(),
        row.sleep_end_min.to_string(),
        row.sleep_end_clock.clone(),
        row.out_of_bed_min.to_string(),
        row.out_of_bed_clock.clone(),
        row.midpoint_min.to_string(),
        row.midpoint_clock.clone(),
        row.final_wake_min.to_string(),
        row.final_wake_clock.clone(),
        row.sol_min.to_string(),
        row.sol_hhmm.clone(),
        row.waso_min.to_string(),
        row.waso_hhmm.clone(),
        row.twt_min.to_string(),
        row.twt_hhmm.clone(),
        row.tib_min.to_string(),
        row.tib_hhmm.clone(),
        row.tib_hours.to_string(),
        row.tst_min.to_string(),
        row.tst_hhmm.clone(),
        row.tst_hours.to_string(),
        row.se_pct.to_string(),
        row.tib_clamped.to_string(),
    ]
}

/// Core columns plus email, calendar date and habit fields.
pub fn write_augmented_csv(path: &Path, rows: &[AugmentedRow]) -> Result<()> {
    let mut header: Vec<String> = vec!["participant".into(), "email".into(), "date".into()];
    header.extend(COLUMNS.iter().skip(1).map(|c| c.to_string()));
    header.extend(HABIT_COLUMNS.iter().map(|c| c.to_string()));

    let mut records = Vec::with_capacity(rows.len() + 1);
    records.push(header);
    for row in rows {
        let formatted = FormattedRow::from(&row.core);
        let mut record = vec![formatted.participant.clone(), row.email.clone(), row.date_label()];
        record.extend(core_cells(&formatted));
        record.extend(habit_cells(&row.habits));
        records.push(record);
    }

    write_rows_atomic(path, &records)?;
    info!(path = %path.display(), rows = rows.len(), "wrote augmented table");
    Ok(())
}

/// Identity, date and habit fields with the sleep values folded into one JSON cell.
pub fn write_jsonblock_csv(path: &Path, rows: &[AugmentedRow]) -> Result<()> {
    let mut header: Vec<String> = vec!["participant".into(), "email".into(), "date".into()];
    header.extend(HABIT_COLUMNS.iter().map(|c| c.to_string()));
    header.push("sleep_json".into());

    let mut records = Vec::with_capacity(rows.len() + 1);
    records.push(header);
    for row in rows {
        let mut record = vec![row.core.participant.code(), row.email.clone(), row.date_label()];
        record.extend(habit_cells(&row.habits));
        record.push(sleep_json(&row.core).to_string());
        records.push(record);
    }

    write_rows_atomic(path, &records)?;
    info!(path = %path.display(), rows = rows.len(), "wrote json block table");
    Ok(())
}

pub fn augmented_file_names(cohort: &str) -> (String, String) {
    let base = format!("synthetic_sleepdata_timeseries_{cohort}_augmented");
    (format!("{base}.csv"), format!("{base}_jsonblock_only.csv"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assemble::generate;
    use crate::params::{DistributionFamily, GroupParameters, Variable, VariableParams};

    fn table(days: u32) -> TimeSeriesTable {
        let group = GroupParameters::from_entries(
            "insomnia",
            [
                (
                    Variable::LightsOff,
                    VariableParams::new(-15.0, 45.0, DistributionFamily::Normal),
                ),
                (
                    Variable::SleepEnd,
                    VariableParams::new(410.0, 50.0, DistributionFamily::Normal),
                ),
                (
                    Variable::Sol,
                    VariableParams::new(45.0, 30.0, DistributionFamily::Gamma),
                ),
                (
                    Variable::Waso,
                    VariableParams::new(40.0, 35.0, DistributionFamily::Gamma),
                ),
            ],
        )
        .unwrap();
        generate(&group, 2, days, 42).unwrap()
    }

    #[test]
    fn dates_emails_and_ranges() {
        let t = table(21);
        let mut aug = Augmenter::new(&AugmentConfig::default(), 42).unwrap();
        let rows = aug.augment(&t).unwrap();
        assert_eq!(rows.len(), t.len());
        assert_eq!(rows[0].email, "mock_001@example.test");
        assert_eq!(rows[0].date_label(), "01/03/2024");
        assert_eq!(rows[20].date_label(), "21/03/2024");
        assert_eq!(rows[21].date_label(), "01/03/2024");
        assert_eq!(rows[21].email, "mock_002@example.test");
        for r in &rows {
            assert!((1..=10).contains(&r.habits.sleep_quality));
            assert!((1..=10).contains(&r.habits.rested));
            assert!(r.habits.physical_activity_min <= 180);
            assert!(r.habits.caffeine_cups <= 6);
            assert!(r.habits.calm_down_min <= 120);
            assert!(r.habits.medication.is_none());
        }
    }

    #[test]
    fn enrichment_leaves_core_rows_untouched() {
        let t = table(5);
        let before = t.clone();
        let rows = Augmenter::new(&AugmentConfig::default(), 42)
            .unwrap()
            .augment(&t)
            .unwrap();
        assert_eq!(t, before);
        for (a, core) in rows.iter().zip(t.rows()) {
            assert_eq!(&a.core, core);
        }
        let again = Augmenter::new(&AugmentConfig::default(), 42)
            .unwrap()
            .augment(&t)
            .unwrap();
        assert_eq!(rows, again);
    }

    #[test]
    fn json_block_shape() {
        let t = table(1);
        let v = sleep_json(&t.rows()[0]);
        assert!(v["start"].as_str().unwrap().contains(':'));
        assert!(v["totals"]["tib"].is_i64());
        let se = v["totals"]["se"].as_f64().unwrap();
        assert!((0.0..=100.0).contains(&se));
    }

    #[test]
    fn bad_config_is_rejected() {
        let cfg = AugmentConfig {
            start_date: "03/01/2024".into(),
            ..AugmentConfig::default()
        };
        assert!(matches!(Augmenter::new(&cfg, 1), Err(SynthError::Date(_))));
        let cfg = AugmentConfig {
            email_domain: "a@b".into(),
            ..AugmentConfig::default()
        };
        assert!(Augmenter::new(&cfg, 1).is_err());
    }

    #[test]
    fn writes_both_augmented_files() {
        let dir = tempfile::tempdir().unwrap();
        let t = table(3);
        let rows = Augmenter::new(&AugmentConfig::default(), 7)
            .unwrap()
            .augment(&t)
            .unwrap();
        let (main, block) = augmented_file_names("insomnia");
        write_augmented_csv(&dir.path().join(&main), &rows).unwrap();
        write_jsonblock_csv(&dir.path().join(&block), &rows).unwrap();

        let mut rdr = csv::Reader::from_path(dir.path().join(&main)).unwrap();
        let header = rdr.headers().unwrap().clone();
        assert_eq!(&header[1], "email");
        assert_eq!(header.len(), 3 + COLUMNS.len() - 1 + HABIT_COLUMNS.len());
        assert_eq!(rdr.records().count(), 6);

        let mut rdr = csv::Reader::from_path(dir.path().join(&block)).unwrap();
        let last = rdr.headers().unwrap().iter().last().unwrap().to_string();
        assert_eq!(last, "sleep_json");
        let first = rdr.records().next().unwrap().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&first[first.len() - 1]).unwrap();
        assert!(parsed["totals"].is_object());
    }
}
