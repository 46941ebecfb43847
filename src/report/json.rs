//! JSON report: generation time, batch summary and every result

use super::Summary;
use crate::analyzer::AnalysisResult;
use serde::Serialize;
use std::io::{self, Write};

#[derive(Serialize)]
struct Report<'a> {
    generated: String,
    summary: Summary,
    files: &'a [AnalysisResult],
}

pub fn write<W: Write>(writer: &mut W, results: &[AnalysisResult]) -> io::Result<()> {
    let report = Report {
        generated: chrono::Local::now().to_rfc3339(),
        summary: Summary::from_results(results),
        files: results,
    };
    serde_json::to_writer_pretty(&mut *writer, &report)?;
    writeln!(writer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::Verdict;
    use crate::report::tests::create_test_result;

    #[test]
    fn test_json_structure() {
        let mut failed = create_test_result(Verdict::Partial, None);
        failed.flags = vec!["hf_damping:degenerate_window".to_string()];
        let results = vec![create_test_result(Verdict::Ok, Some(42.0)), failed];

        let mut out = Vec::new();
        write(&mut out, &results).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();

        assert_eq!(value["summary"]["total"], 2);
        assert_eq!(value["summary"]["partial"], 1);
        assert_eq!(value["files"][0]["verdict"], "OK");
        assert_eq!(value["files"][0]["rating"], 42.0);
        assert!(value["files"][1]["hf_damping"].is_null());
        assert_eq!(value["files"][1]["flags"][0], "hf_damping:degenerate_window");
        // Details are left out unless collected
        assert!(value["files"][0].get("details").is_none());
        assert!(value["generated"].is_string());
    }
}
