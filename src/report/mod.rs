//! Report generation for analysis results
//!
//! - **JSON**: every result with its flags, plus a batch summary
//! - **CSV**: one row per file, one column per feature score
//!
//! # Usage
//!
//! ```ignore
//! use rir_unpleasantness::report;
//!
//! // Format follows the extension
//! report::generate("report.json", &results)?;
//! report::generate("report.csv", &results)?;
//! ```

pub mod csv;
pub mod json;

use crate::analyzer::{AnalysisResult, Verdict};
use serde::Serialize;
use std::io;
use std::path::Path;

/// Generate a report in the format matching the file extension (CSV unless
/// the extension is `json`)
pub fn generate<P: AsRef<Path>>(path: P, results: &[AnalysisResult]) -> io::Result<()> {
    let path = path.as_ref();
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    let mut file = std::fs::File::create(path)?;

    match ext.as_str() {
        "json" => json::write(&mut file, results),
        _ => csv::write(&mut file, results),
    }
}

/// Summary statistics for a batch of results
#[derive(Debug, Clone, Default, Serialize)]
pub struct Summary {
    pub total: usize,
    pub ok: usize,
    pub partial: usize,
    pub error: usize,
    /// Mean model rating over the files that have one
    pub mean_rating: Option<f64>,
}

impl Summary {
    pub fn from_results(results: &[AnalysisResult]) -> Self {
        let mut summary = Self {
            total: results.len(),
            ..Self::default()
        };

        for r in results {
            match r.verdict {
                Verdict::Ok => summary.ok += 1,
                Verdict::Partial => summary.partial += 1,
                Verdict::Error => summary.error += 1,
            }
        }

        let ratings: Vec<f64> = results.iter().filter_map(|r| r.rating).collect();
        if !ratings.is_empty() {
            summary.mean_rating = Some(ratings.iter().sum::<f64>() / ratings.len() as f64);
        }

        summary
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    // ==========================================================================
    // SUMMARY STATISTICS TESTS
    // ==========================================================================
    //
    // The Summary struct aggregates verdict counts for a batch of files.
    // It heads the JSON report and the command-line output.
    // ==========================================================================

    pub(crate) fn create_test_result(verdict: Verdict, rating: Option<f64>) -> AnalysisResult {
        AnalysisResult {
            file_path: "/rooms/hall.wav".to_string(),
            file_name: "hall.wav".to_string(),
            channels: 4,
            sample_rate: 48000.0,
            duration_secs: 2.5,
            colouration: Some(0.25),
            flutter_echo: Some(12.5),
            asymmetry: Some(-0.1),
            curvature: Some(0.05),
            hf_damping: None,
            rating,
            verdict,
            flags: vec![],
            error: None,
            details: None,
        }
    }

    #[test]
    fn test_summary_empty() {
        let results: Vec<AnalysisResult> = vec![];
        let summary = Summary::from_results(&results);

        assert_eq!(summary.total, 0);
        assert_eq!(summary.ok, 0);
        assert_eq!(summary.partial, 0);
        assert_eq!(summary.error, 0);
        assert_eq!(summary.mean_rating, None);
    }

    #[test]
    fn test_summary_mixed() {
        let results = vec![
            create_test_result(Verdict::Ok, Some(40.0)),
            create_test_result(Verdict::Ok, Some(60.0)),
            create_test_result(Verdict::Partial, None),
            create_test_result(Verdict::Error, None),
        ];
        let summary = Summary::from_results(&results);

        assert_eq!(summary.total, 4);
        assert_eq!(summary.ok, 2);
        assert_eq!(summary.partial, 1);
        assert_eq!(summary.error, 1);
        assert_eq!(summary.mean_rating, Some(50.0));
    }

    #[test]
    fn test_generate_picks_format_from_extension() {
        let results = vec![create_test_result(Verdict::Ok, None)];
        let dir = tempfile::TempDir::new().unwrap();
        let json_path = dir.path().join("report.json");
        let csv_path = dir.path().join("report.csv");

        generate(&json_path, &results).unwrap();
        generate(&csv_path, &results).unwrap();

        let json = std::fs::read_to_string(&json_path).unwrap();
        let csv = std::fs::read_to_string(&csv_path).unwrap();
        assert!(json.trim_start().starts_with('{'));
        assert!(csv.starts_with("file_path,"));
    }
}
