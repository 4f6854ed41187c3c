use anyhow::{Context, Result};
use log::info;
use regex::Regex;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// A topological connection between two buses. Impedance, length and
/// phasing of the underlying line are not retained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineSegment {
    pub bus1: String,
    pub bus2: String,
}

impl LineSegment {
    pub fn new(bus1: impl Into<String>, bus2: impl Into<String>) -> Self {
        Self {
            bus1: bus1.into(),
            bus2: bus2.into(),
        }
    }
}

/// Removes the phase/node suffix from a bus name (`"A.1.2"` -> `"A"`).
pub fn strip_phase_suffix(bus: &str) -> &str {
    match bus.split_once('.') {
        Some((name, _)) => name,
        None => bus,
    }
}

/// Extracts `bus1`/`bus2` connections from `New Line` statements.
///
/// Statements missing either terminal are skipped. Lines that do not begin
/// with `new line` (case-insensitive) are ignored, including lines with
/// leading whitespace.
pub fn parse_line_segments<R: BufRead>(reader: R) -> Result<Vec<LineSegment>> {
    let bus1_re = Regex::new(r"(?i)bus1=([\w\-\.]+)")?;
    let bus2_re = Regex::new(r"(?i)bus2=([\w\-\.]+)")?;

    let mut segments = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if !line.to_lowercase().starts_with("new line") {
            continue;
        }

        let (Some(m1), Some(m2)) = (bus1_re.captures(&line), bus2_re.captures(&line)) else {
            continue;
        };

        segments.push(LineSegment::new(
            strip_phase_suffix(&m1[1]),
            strip_phase_suffix(&m2[1]),
        ));
    }
    Ok(segments)
}

/// Reads line connectivity from a circuit-description file.
pub fn load_line_segments(path: &Path) -> Result<Vec<LineSegment>> {
    let file =
        File::open(path).with_context(|| format!("unable to open {}", path.display()))?;
    let segments = parse_line_segments(BufReader::new(file))
        .with_context(|| format!("unable to read {}", path.display()))?;
    info!("Loaded {} line segments.", segments.len());
    Ok(segments)
}
