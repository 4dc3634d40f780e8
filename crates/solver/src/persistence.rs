//! Run artifacts
//!
//! Everything a run leaves on disk: the workload identity written once at
//! startup, gzip-compressed CSV snapshots of the global observation history
//! rewritten after every iteration, and an append-only JSON-lines record of
//! trust-region events. All artifacts are optional; a solver without a
//! results directory records nothing.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use ndarray::{Array1, Array2};
use serde::Serialize;

use crate::errors::Result;

/// One trust-region event, appended after every iteration.
#[derive(Debug, Clone, Serialize)]
pub struct TrEvent {
    pub n_evals: usize,
    pub dimensionality: usize,
    pub length: f64,
    pub fx_next: f64,
    pub fx_incumbent: f64,
    pub best_observed: f64,
    /// Raw repeated measurements of the incumbent, when on record.
    pub incumbent_repeats: Option<Vec<f64>>,
}

/// Writes run artifacts into one results directory.
#[derive(Debug)]
pub struct RunRecorder {
    dir: PathBuf,
}

impl RunRecorder {
    /// Creates the results directory and records the workload identity.
    pub fn create(dir: impl AsRef<Path>, workload: &str) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        fs::write(dir.join("workload.txt"), workload)?;
        // start each run with a fresh event record
        File::create(dir.join("tr_state.jsonl"))?;
        Ok(RunRecorder { dir })
    }

    /// Snapshots the global history as `results.csv.gz`: one row per
    /// observation, the original-unit configuration followed by its value.
    pub fn write_results(
        &self,
        x_up_global: &Array2<f64>,
        fx_global: &Array1<f64>,
    ) -> Result<()> {
        let file = File::create(self.dir.join("results.csv.gz"))?;
        let mut enc = GzEncoder::new(file, Compression::default());
        for (row, fx) in x_up_global.outer_iter().zip(fx_global.iter()) {
            let mut fields: Vec<String> = row.iter().map(|v| v.to_string()).collect();
            fields.push(fx.to_string());
            writeln!(enc, "{}", fields.join(","))?;
        }
        enc.finish()?;
        Ok(())
    }

    /// Snapshots the repeated-measurement ledger as
    /// `repeated_results.csv.gz`, one configuration's repeats per row.
    pub fn write_repeated_results(&self, fx_repeated: &Array2<f64>) -> Result<()> {
        let file = File::create(self.dir.join("repeated_results.csv.gz"))?;
        let mut enc = GzEncoder::new(file, Compression::default());
        for row in fx_repeated.outer_iter() {
            let fields: Vec<String> = row.iter().map(|v| v.to_string()).collect();
            writeln!(enc, "{}", fields.join(","))?;
        }
        enc.finish()?;
        Ok(())
    }

    /// Appends one trust-region event to `tr_state.jsonl`.
    pub fn append_tr_event(&self, event: &TrEvent) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join("tr_state.jsonl"))?;
        writeln!(file, "{}", serde_json::to_string(event)?)?;
        Ok(())
    }
}
