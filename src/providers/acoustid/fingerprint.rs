//! Audio fingerprinting via Chromaprint's `fpcalc` tool.
//!
//! Shelling out to fpcalc beats in-process bindings for portability; the
//! tool ships with every Chromaprint install:
//! - Linux: `apt install libchromaprint-tools`
//! - macOS: `brew install chromaprint`
//! - Windows: `winget install AcoustID.Chromaprint`

use std::path::Path;
use std::process::Command;

use crate::providers::ProviderError;

#[cfg(windows)]
const FPCALC_PATHS: &[&str] = &[
    "fpcalc",
    r"C:\Program Files\Chromaprint\fpcalc.exe",
    r"C:\Program Files (x86)\Chromaprint\fpcalc.exe",
];

#[cfg(not(windows))]
const FPCALC_PATHS: &[&str] = &[
    "fpcalc",
    "/usr/bin/fpcalc",
    "/usr/local/bin/fpcalc",
    "/opt/homebrew/bin/fpcalc",
];

#[derive(Debug, Clone, PartialEq)]
pub struct Fingerprint {
    pub fingerprint: String,
    pub duration_secs: u32,
}

fn find_fpcalc() -> Option<&'static str> {
    FPCALC_PATHS
        .iter()
        .find(|&path| {
            Command::new(path)
                .arg("-version")
                .output()
                .map(|o| o.status.success())
                .unwrap_or(false)
        })
        .map(|v| v as _)
}

pub fn is_fpcalc_available() -> bool {
    find_fpcalc().is_some()
}

/// Fingerprint the given file. A missing fpcalc binary is a configuration
/// problem; a failing run on one file is not.
pub fn generate(path: &Path) -> Result<Option<Fingerprint>, ProviderError> {
    let fpcalc = find_fpcalc().ok_or_else(|| {
        ProviderError::config(
            "fpcalc not found; install Chromaprint (https://acoustid.org/chromaprint)",
        )
    })?;

    let output = Command::new(fpcalc)
        .arg("-json")
        .arg(path)
        .output()
        .map_err(|e| ProviderError::transient(format!("failed to run fpcalc: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        tracing::warn!("fpcalc failed on {}: {}", path.display(), stderr.trim());
        return Ok(None);
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_output(&stdout).map(Some)
}

fn parse_output(json: &str) -> Result<Fingerprint, ProviderError> {
    #[derive(serde::Deserialize)]
    struct FpcalcOutput {
        fingerprint: String,
        duration: f64,
    }

    let parsed: FpcalcOutput = serde_json::from_str(json)
        .map_err(|e| ProviderError::transient(format!("unparseable fpcalc output: {}", e)))?;
    Ok(Fingerprint {
        fingerprint: parsed.fingerprint,
        duration_secs: parsed.duration.round() as u32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fpcalc_json() {
        let json = r#"{"duration": 180.5, "fingerprint": "AQADtNIyRUkkZUqS"}"#;
        let result = parse_output(json).unwrap();
        assert_eq!(result.fingerprint, "AQADtNIyRUkkZUqS");
        assert_eq!(result.duration_secs, 181);
    }

    #[test]
    fn rejects_output_without_fingerprint() {
        assert!(parse_output(r#"{"error": "invalid"}"#).is_err());
    }
}
