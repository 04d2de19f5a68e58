//! OCR through the `tesseract` command-line tool

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use super::TextRecognizer;
use crate::{Error, Result};

/// Runs `tesseract <image> stdout -l <languages>`
pub struct TesseractOcr {
    binary: PathBuf,
    languages: String,
}

impl TesseractOcr {
    /// Find `tesseract` on `PATH`
    ///
    /// # Errors
    ///
    /// Returns error if the binary is not installed
    pub fn locate(languages: &str) -> Result<Self> {
        let binary = which::which("tesseract")
            .map_err(|e| Error::Ocr(format!("tesseract not found: {e}")))?;
        Ok(Self::new(binary, languages))
    }

    #[must_use]
    pub fn new(binary: PathBuf, languages: &str) -> Self {
        Self {
            binary,
            languages: languages.to_string(),
        }
    }
}

impl TextRecognizer for TesseractOcr {
    fn extract_text(&mut self, image: &Path) -> Result<String> {
        let output = Command::new(&self.binary)
            .arg(image)
            .arg("stdout")
            .args(["-l", &self.languages])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| Error::Ocr(format!("failed to spawn tesseract: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Ocr(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(normalize(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Collapse runs of whitespace (including line breaks) into single spaces
#[must_use]
pub fn normalize(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_lines() {
        assert_eq!(normalize("  WHEN YOU\n\nfinally\tsleep \n\x0c"), "WHEN YOU finally sleep");
        assert_eq!(normalize("\n \n"), "");
    }

    #[test]
    fn missing_binary_is_an_error() {
        let mut ocr = TesseractOcr::new(PathBuf::from("/nonexistent/tesseract"), "eng");
        let err = ocr.extract_text(Path::new("x.png")).unwrap_err();
        assert!(matches!(err, Error::Ocr(_)));
    }
}
