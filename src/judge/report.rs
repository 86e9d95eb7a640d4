//! @ai:module:intent Collect a run's events into a JSON report
//! @ai:module:layer infrastructure
//! @ai:module:public_api JudgeReport
//! @ai:module:stateless true

use crate::benchmark::BenchmarkResult;
use crate::judge::JudgeProgress;
use crate::sandbox::{RunEvent, RunEvents, TerminalReason};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// @ai:intent Everything a caller learns from one judged submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeReport {
    pub timestamp: String,
    pub device: String,
    pub problem: String,
    pub results: Vec<BenchmarkResult>,
    pub terminal: TerminalReason,
}

impl JudgeReport {
    /// @ai:intent Drain `events` into a report
    /// @ai:post results keep the order the worker produced them
    /// @ai:effects ipc, process:wait
    pub fn collect(device: &str, problem: &str, events: RunEvents<JudgeProgress, BenchmarkResult>) -> Self {
        let (events, terminal) = events.collect_all();
        let results = events
            .into_iter()
            .filter_map(|event| match event {
                RunEvent::Result(result) => Some(result),
                _ => None,
            })
            .collect();

        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            device: device.to_string(),
            problem: problem.to_string(),
            results,
            terminal,
        }
    }

    pub fn is_success(&self) -> bool {
        self.terminal.is_success()
    }

    /// @ai:intent Best throughput across test cases, if any completed
    /// @ai:effects pure
    pub fn peak_gflops(&self) -> Option<f64> {
        self.results.iter().map(|r| r.gflops).reduce(f64::max)
    }

    /// @ai:intent Write the report as pretty JSON
    /// @ai:effects fs:write
    pub fn save(&self, output_path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(output_path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn result(test_id: usize, gflops: f64) -> BenchmarkResult {
        BenchmarkResult {
            name: format!("case {test_id}"),
            test_id,
            gflops,
            sample_count: 3,
            best_runtime_secs: 0.001,
        }
    }

    #[test]
    fn test_collect_pre_terminated_run() {
        let terminal = TerminalReason::Failed {
            stage: "compile".to_string(),
            message: "solution.cu(1): error: expected a declaration".to_string(),
        };

        let report = JudgeReport::collect("T4", "vector-add", RunEvents::terminated(terminal.clone()));

        assert!(report.results.is_empty());
        assert_eq!(report.terminal, terminal);
        assert!(!report.is_success());
        assert_eq!(report.peak_gflops(), None);
        assert!(chrono::DateTime::parse_from_rfc3339(&report.timestamp).is_ok());
    }

    #[test]
    fn test_save_writes_pretty_json() {
        let temp = TempDir::new().unwrap();
        let output = temp.path().join("report.json");

        let report = JudgeReport {
            timestamp: "2026-01-19T00:00:00Z".to_string(),
            device: "H100".to_string(),
            problem: "matmul".to_string(),
            results: vec![result(1, 250.0), result(2, 410.5)],
            terminal: TerminalReason::Completed,
        };
        report.save(&output).unwrap();

        let content = std::fs::read_to_string(&output).unwrap();
        assert!(content.contains("\"status\": \"completed\""));
        let back: JudgeReport = serde_json::from_str(&content).unwrap();
        assert_eq!(back, report);
        assert_eq!(back.peak_gflops(), Some(410.5));
    }
}
