//! Rule-based governance validation
//!
//! Given a constitution and a candidate artifact tagged by kind, produce a
//! list of [`Violation`]s; an empty list means the gate passes. Detection is
//! pattern-based, never model-based: a curated keyword table for
//! implementation leakage in specs, secret-shape patterns for all artifacts,
//! a required-section schema per artifact kind, and licensing rules driven
//! by the constitution's own "Licensing" principle.

use regex::{Regex, RegexBuilder};
use std::sync::LazyLock;

use crate::constitution::Constitution;
use crate::types::{ArtifactKind, Severity, Violation};

/// Synthetic principle ids for the built-in rules. Real principle names are
/// used when a rule is driven by the constitution itself.
pub const PRINCIPLE_NO_IMPLEMENTATION_DETAILS: &str = "Specifications as First-Class Artifacts";
pub const PRINCIPLE_NO_SECRETS: &str = "Security & Compliance";
pub const PRINCIPLE_REQUIRED_SECTIONS: &str = "Structural Completeness";
pub const PRINCIPLE_LICENSING: &str = "Licensing";

/// Concrete technologies a specification must not name. Specs describe WHAT
/// and WHY; naming a language, framework, database, or cloud service is HOW.
const IMPLEMENTATION_KEYWORDS: &[&str] = &[
    // Languages
    "python",
    "java",
    "javascript",
    "typescript",
    "golang",
    "rust",
    "ruby",
    "kotlin",
    "swift",
    // Frameworks
    "django",
    "flask",
    "fastapi",
    "react",
    "vue",
    "angular",
    "spring",
    "rails",
    "express",
    // Databases
    "postgres",
    "postgresql",
    "mysql",
    "sqlite",
    "mongodb",
    "redis",
    "dynamodb",
    // Protocols and platforms
    "graphql",
    "grpc",
    "kafka",
    "kubernetes",
    "docker",
    // Cloud services
    "aws",
    "azure",
    "gcp",
    "lambda",
    "s3",
    // Libraries
    "numpy",
    "pandas",
    "tensorflow",
    "pytorch",
];

/// The curated keyword table, exposed so other components (e.g. the mock
/// LLM binding) can stay consistent with the validator.
#[must_use]
pub fn implementation_keywords() -> &'static [&'static str] {
    IMPLEMENTATION_KEYWORDS
}

static KEYWORD_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    IMPLEMENTATION_KEYWORDS
        .iter()
        .map(|kw| {
            let re = RegexBuilder::new(&format!(r"\b{kw}\b"))
                .case_insensitive(true)
                .build()
                .expect("valid keyword regex");
            (*kw, re)
        })
        .collect()
});

/// Shapes of common secrets. Any match is a critical violation regardless of
/// artifact kind.
static SECRET_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    let table: &[(&str, &str)] = &[
        ("long hex literal", r"\b[0-9a-f]{32,}\b"),
        ("provider key literal", r#"\bsk-[A-Za-z0-9_-]{16,}"#),
        (
            "credential assignment",
            r#"(?i)\b(api[_-]?key|apikey|secret|password|passwd|pwd|auth[_-]?token|access[_-]?key)\b\s*[:=]\s*["']?[^\s"']{8,}"#,
        ),
    ];
    table
        .iter()
        .map(|(name, pattern)| (*name, Regex::new(pattern).expect("valid secret regex")))
        .collect()
});

/// Required-section schema per artifact kind. Code artifacts and the
/// quickstart have no structural requirements.
fn required_sections(kind: ArtifactKind) -> &'static [&'static str] {
    match kind {
        ArtifactKind::Spec => &["## User Scenarios", "## Requirements", "## Success Criteria"],
        ArtifactKind::Research => &["## Decisions"],
        ArtifactKind::Plan => &["## Summary", "## Project Structure"],
        ArtifactKind::DataModel => &["## Core Entities"],
        ArtifactKind::Contract => &[],
        ArtifactKind::Quickstart
        | ArtifactKind::TestCode
        | ArtifactKind::ImplementationCode => &[],
    }
}

/// Validate one artifact against the constitution and the built-in rules.
/// Returns every violation found; an empty vector means pass.
#[must_use]
pub fn validate_artifact(
    constitution: &Constitution,
    kind: ArtifactKind,
    artifact_name: &str,
    text: &str,
) -> Vec<Violation> {
    let mut violations = Vec::new();

    if kind == ArtifactKind::Spec {
        violations.extend(check_implementation_leakage(artifact_name, text));
    }

    violations.extend(check_secrets(artifact_name, text));
    violations.extend(check_required_sections(kind, artifact_name, text));

    if kind == ArtifactKind::Contract {
        violations.extend(check_contract_shape(artifact_name, text));
    }

    if constitution.has_principle(PRINCIPLE_LICENSING) && kind.is_code() {
        violations.extend(check_licensing(constitution, artifact_name, text));
    }

    violations
}

/// One violation per offending keyword, keyed to the first line it appears
/// on.
fn check_implementation_leakage(artifact_name: &str, text: &str) -> Vec<Violation> {
    let mut violations = Vec::new();

    for (keyword, re) in KEYWORD_PATTERNS.iter() {
        if let Some(m) = re.find(text) {
            violations.push(Violation {
                principle: PRINCIPLE_NO_IMPLEMENTATION_DETAILS.to_string(),
                artifact: artifact_name.to_string(),
                line: Some(line_of(text, m.start())),
                description: format!("specification names a concrete technology: '{keyword}'"),
                suggestion: "Describe the capability without naming technologies; \
                             implementation choices belong in the plan."
                    .to_string(),
                severity: Severity::High,
            });
        }
    }

    violations
}

fn check_secrets(artifact_name: &str, text: &str) -> Vec<Violation> {
    let mut violations = Vec::new();

    for (shape, re) in SECRET_PATTERNS.iter() {
        if let Some(m) = re.find(text) {
            violations.push(Violation {
                principle: PRINCIPLE_NO_SECRETS.to_string(),
                artifact: artifact_name.to_string(),
                line: Some(line_of(text, m.start())),
                description: format!("potential hardcoded secret ({shape}) detected"),
                suggestion: "Remove the literal and load the credential from the \
                             environment or a secret manager."
                    .to_string(),
                severity: Severity::Critical,
            });
        }
    }

    violations
}

fn check_required_sections(kind: ArtifactKind, artifact_name: &str, text: &str) -> Vec<Violation> {
    required_sections(kind)
        .iter()
        .filter(|marker| !text.contains(*marker))
        .map(|marker| Violation {
            principle: PRINCIPLE_REQUIRED_SECTIONS.to_string(),
            artifact: artifact_name.to_string(),
            line: None,
            description: format!(
                "missing required section '{}' for {} artifacts",
                marker.trim_start_matches('#').trim(),
                kind.as_str()
            ),
            suggestion: format!("Add a '{marker}' section following the template"),
            severity: Severity::Medium,
        })
        .collect()
}

/// Contracts carry no markdown sections; they must at least declare an
/// interface surface.
fn check_contract_shape(artifact_name: &str, text: &str) -> Vec<Violation> {
    if text.contains("openapi:") || text.contains("paths:") {
        return Vec::new();
    }
    vec![Violation {
        principle: PRINCIPLE_REQUIRED_SECTIONS.to_string(),
        artifact: artifact_name.to_string(),
        line: None,
        description: "contract declares no interface surface (no 'openapi:' or 'paths:' key)"
            .to_string(),
        suggestion: "Describe the exposed operations as an interface document".to_string(),
        severity: Severity::Medium,
    }]
}

/// Licensing rules are opt-in: the constitution's "Licensing" principle
/// lists prohibited identifiers after a "Prohibited:" marker.
fn check_licensing(
    constitution: &Constitution,
    artifact_name: &str,
    text: &str,
) -> Vec<Violation> {
    let mut violations = Vec::new();

    for line in constitution.principle_body(PRINCIPLE_LICENSING) {
        let Some(rest) = line
            .trim()
            .strip_prefix("Prohibited:")
            .or_else(|| line.trim().strip_prefix("Forbidden:"))
        else {
            continue;
        };
        for ident in rest.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            if let Some(pos) = text.find(ident) {
                violations.push(Violation {
                    principle: PRINCIPLE_LICENSING.to_string(),
                    artifact: artifact_name.to_string(),
                    line: Some(line_of(text, pos)),
                    description: format!("prohibited license identifier '{ident}' referenced"),
                    suggestion: format!(
                        "Replace the dependency; '{ident}' is prohibited by the constitution"
                    ),
                    severity: Severity::High,
                });
            }
        }
    }

    violations
}

/// 1-based line number of a byte offset.
fn line_of(text: &str, offset: usize) -> u32 {
    u32::try_from(text[..offset].matches('\n').count() + 1).unwrap_or(u32::MAX)
}
