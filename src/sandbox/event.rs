//! @ai:module:intent Events a sandboxed run delivers to its caller
//! @ai:module:layer domain
//! @ai:module:public_api RunEvent, TerminalReason
//! @ai:module:stateless true

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// @ai:intent Why a run ended; carried by the single terminal event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TerminalReason {
    /// The worker sent its completion sentinel.
    Completed,
    /// No event arrived within the per-receive deadline; the worker was killed.
    TimedOut { message: String },
    /// The channel closed without a sentinel.
    Crashed { detail: String },
    /// The work reported a failure at a named stage.
    Failed { stage: String, message: String },
}

impl TerminalReason {
    /// @ai:intent Timeout reason naming the limit that was exceeded
    /// @ai:effects pure
    pub fn timed_out(limit: Duration) -> Self {
        TerminalReason::TimedOut {
            message: format!("Execution exceeded time limit of {:.2}s", limit.as_secs_f64()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TerminalReason::Completed)
    }

    /// @ai:intent Short status name used in logs and reports
    /// @ai:effects pure
    pub fn status(&self) -> &'static str {
        match self {
            TerminalReason::Completed => "completed",
            TerminalReason::TimedOut { .. } => "timed_out",
            TerminalReason::Crashed { .. } => "crashed",
            TerminalReason::Failed { .. } => "failed",
        }
    }
}

impl std::fmt::Display for TerminalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TerminalReason::Completed => write!(f, "completed"),
            TerminalReason::TimedOut { message } => write!(f, "timed out: {message}"),
            TerminalReason::Crashed { detail } => write!(f, "crashed: {detail}"),
            TerminalReason::Failed { stage, message } => write!(f, "{stage} failed: {message}"),
        }
    }
}

/// @ai:intent One event of a run, in worker production order
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent<P, R> {
    Progress(P),
    Result(R),
    Terminal(TerminalReason),
}

impl<P, R> RunEvent<P, R> {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunEvent::Terminal(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_reason_json_is_tagged() {
        let reason = TerminalReason::Failed {
            stage: "compile".to_string(),
            message: "1 error detected".to_string(),
        };

        let json = serde_json::to_value(&reason).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["stage"], "compile");
        assert_eq!(reason.status(), "failed");
        assert_eq!(reason.to_string(), "compile failed: 1 error detected");
    }

    #[test]
    fn test_only_completed_is_success() {
        assert!(TerminalReason::Completed.is_success());
        assert!(!TerminalReason::Crashed {
            detail: "worker terminated by SIGSEGV".to_string()
        }
        .is_success());
        assert!(RunEvent::<(), ()>::Terminal(TerminalReason::Completed).is_terminal());
        assert!(!RunEvent::<u8, ()>::Progress(1).is_terminal());
    }

    #[test]
    fn test_timed_out_message_has_two_decimals() {
        assert_eq!(
            TerminalReason::timed_out(Duration::from_millis(1500)),
            TerminalReason::TimedOut {
                message: "Execution exceeded time limit of 1.50s".to_string()
            }
        );
    }
}
