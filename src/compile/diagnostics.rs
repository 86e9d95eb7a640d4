//! @ai:module:intent Turn raw compiler stderr into structured diagnostics
//! @ai:module:layer domain
//! @ai:module:public_api CompileDiagnostics, Diagnostic, Severity
//! @ai:module:stateless true

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// @ai:intent Severity of a single compiler message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// @ai:intent One located compiler message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub file: String,
    pub line: u32,
    pub severity: Severity,
    pub message: String,
}

/// @ai:intent Full diagnostic payload of a failed compile
/// @ai:invariant stderr is the complete, unmodified-by-parsing compiler output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileDiagnostics {
    pub stderr: String,
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
}

impl CompileDiagnostics {
    /// @ai:intent Parse nvcc (`file(line): error: msg`) and host-compiler
    ///            (`file:line:col: error: msg`) lines out of stderr
    /// @ai:effects pure
    pub fn from_stderr(stderr: &str) -> Self {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        for diagnostic in stderr.lines().filter_map(parse_line) {
            match diagnostic.severity {
                Severity::Error => errors.push(diagnostic),
                Severity::Warning => warnings.push(diagnostic),
            }
        }

        Self {
            stderr: stderr.to_string(),
            errors,
            warnings,
        }
    }

    /// @ai:intent First error message, for one-line summaries
    /// @ai:effects pure
    pub fn summary(&self) -> &str {
        self.errors
            .first()
            .map(|d| d.message.as_str())
            .unwrap_or_else(|| self.stderr.lines().next().unwrap_or("compiler exited with an error"))
    }
}

fn nvcc_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?P<file>[^\s(][^(]*)\((?P<line>\d+)\): (?P<severity>error|warning)[^:]*: (?P<message>.*)$")
            .unwrap_or_else(|e| panic!("invalid nvcc diagnostic pattern: {e}"))
    })
}

fn host_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?P<file>[^\s:][^:]*):(?P<line>\d+):(?:\d+:)? (?:fatal )?(?P<severity>error|warning): (?P<message>.*)$")
            .unwrap_or_else(|e| panic!("invalid host diagnostic pattern: {e}"))
    })
}

fn parse_line(line: &str) -> Option<Diagnostic> {
    let caps = nvcc_pattern()
        .captures(line)
        .or_else(|| host_pattern().captures(line))?;

    let severity = match &caps["severity"] {
        "error" => Severity::Error,
        _ => Severity::Warning,
    };

    Some(Diagnostic {
        file: caps["file"].to_string(),
        line: caps["line"].parse().ok()?,
        severity,
        message: caps["message"].trim().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parses_nvcc_errors_and_warnings() {
        let stderr = "solution.cu(7): error: identifier \"blockIdxx\" is undefined\n\
                      solution.cu(3): warning #177-D: variable \"tmp\" was declared but never referenced\n\
                      \n\
                      1 error detected in the compilation of \"solution.cu\".\n";

        let diagnostics = CompileDiagnostics::from_stderr(stderr);

        assert_eq!(
            diagnostics.errors,
            vec![Diagnostic {
                file: "solution.cu".to_string(),
                line: 7,
                severity: Severity::Error,
                message: "identifier \"blockIdxx\" is undefined".to_string(),
            }]
        );
        assert_eq!(diagnostics.warnings.len(), 1);
        assert_eq!(diagnostics.warnings[0].line, 3);
        assert_eq!(diagnostics.stderr, stderr);
    }

    #[test]
    fn test_parses_host_compiler_errors() {
        let diagnostics =
            CompileDiagnostics::from_stderr("solution.cu:12:5: error: expected ';' before '}' token");

        assert_eq!(diagnostics.errors.len(), 1);
        assert_eq!(diagnostics.errors[0].line, 12);
        assert_eq!(diagnostics.summary(), "expected ';' before '}' token");
    }

    #[test]
    fn test_unstructured_stderr_still_summarizes() {
        let diagnostics = CompileDiagnostics::from_stderr("nvcc fatal   : Unsupported gpu architecture 'compute_12'");

        assert!(diagnostics.errors.is_empty());
        assert_eq!(
            diagnostics.summary(),
            "nvcc fatal   : Unsupported gpu architecture 'compute_12'"
        );
    }
}
