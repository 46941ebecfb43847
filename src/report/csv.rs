//! CSV report, one row per file

use crate::analyzer::AnalysisResult;
use std::io::{self, Write};

const HEADER: &str = "file_path,file_name,verdict,channels,sample_rate,duration_secs,\
colouration,flutter_echo,asymmetry,curvature,hf_damping,rating,flags,error";

/// Quote a field if it contains a separator, quote or newline
fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Empty for a missing score
fn score(value: Option<f64>) -> String {
    value.map(|v| format!("{:.4}", v)).unwrap_or_default()
}

pub fn write<W: Write>(writer: &mut W, results: &[AnalysisResult]) -> io::Result<()> {
    writeln!(writer, "{}", HEADER)?;
    for r in results {
        writeln!(
            writer,
            "{},{},{},{},{},{:.3},{},{},{},{},{},{},{},{}",
            escape(&r.file_path),
            escape(&r.file_name),
            r.verdict,
            r.channels,
            r.sample_rate,
            r.duration_secs,
            score(r.colouration),
            score(r.flutter_echo),
            score(r.asymmetry),
            score(r.curvature),
            score(r.hf_damping),
            score(r.rating),
            escape(&r.flags.join(";")),
            escape(r.error.as_deref().unwrap_or("")),
        )?;
    }
    Ok(())
}
