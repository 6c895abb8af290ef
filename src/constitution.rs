//! Constitution loading and structural validation
//!
//! The constitution is the project-local principles document every generated
//! artifact must satisfy. It lives at `.acp/templates/constitution.md`, is
//! human-edited, and is read-only from the engine's perspective except
//! during the "edit constitution" remediation branch, which re-reads it
//! before re-validating.

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

use crate::paths::AcpPaths;

/// Top-level sections every constitution must carry.
pub const REQUIRED_SECTIONS: [&str; 2] = ["Core Principles", "Quality Standards"];

/// Errors raised while loading or validating the constitution.
#[derive(Debug, Error)]
pub enum ConstitutionError {
    #[error("constitution not found at {path} (run `acpctl init` to create one)")]
    NotFound { path: Utf8PathBuf },

    #[error("constitution is missing required section '{section}'")]
    MissingSection { section: &'static str },

    #[error("failed to read constitution at {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        source: std::io::Error,
    },
}

/// The governing principles document, parsed once per load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constitution {
    /// Full markdown text, passed verbatim to agents and the validator
    pub text: String,
    /// Principle headings found under the required sections, in document
    /// order
    pub principles: Vec<String>,
}

impl Constitution {
    /// Parse and structurally validate constitution text.
    pub fn parse(text: impl Into<String>) -> Result<Self, ConstitutionError> {
        let text = text.into();

        for section in REQUIRED_SECTIONS {
            if !has_heading(&text, section) {
                return Err(ConstitutionError::MissingSection { section });
            }
        }

        let principles = text
            .lines()
            .filter_map(|line| line.strip_prefix("### "))
            .map(|heading| heading.trim().to_string())
            .filter(|heading| !heading.is_empty())
            .collect();

        Ok(Self { text, principles })
    }

    /// Load the constitution from its well-known path in the workspace.
    pub fn load(paths: &AcpPaths) -> Result<Self, ConstitutionError> {
        Self::load_from(&paths.constitution_path())
    }

    /// Load the constitution from an explicit path.
    pub fn load_from(path: &Utf8Path) -> Result<Self, ConstitutionError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConstitutionError::NotFound {
                    path: path.to_owned(),
                }
            } else {
                ConstitutionError::Io {
                    path: path.to_owned(),
                    source: e,
                }
            }
        })?;
        Self::parse(text)
    }

    /// True if any principle heading contains `name` (case-insensitive).
    /// Used to switch on optional rule families such as licensing.
    #[must_use]
    pub fn has_principle(&self, name: &str) -> bool {
        let needle = name.to_ascii_lowercase();
        self.principles
            .iter()
            .any(|p| p.to_ascii_lowercase().contains(&needle))
    }

    /// Lines of the named principle's section, up to the next heading.
    /// Empty when the principle is absent.
    #[must_use]
    pub fn principle_body(&self, name: &str) -> Vec<&str> {
        let needle = name.to_ascii_lowercase();
        let mut lines = Vec::new();
        let mut inside = false;

        for line in self.text.lines() {
            if let Some(heading) = line.strip_prefix("### ") {
                inside = heading.to_ascii_lowercase().contains(&needle);
                continue;
            }
            if inside && line.starts_with("##") {
                break;
            }
            if inside {
                lines.push(line);
            }
        }
        lines
    }
}

fn has_heading(text: &str, title: &str) -> bool {
    text.lines().any(|line| {
        let trimmed = line.trim_start_matches('#').trim();
        line.starts_with('#') && trimmed.eq_ignore_ascii_case(title)
    })
}
