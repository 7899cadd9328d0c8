use crate::node::{DelayConfig, Protocol};
use crate::profiler::DelayProfile;
use crate::scenario::error::HarnessResult;
use crate::session::VerificationReport;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// What a scenario exercises and the delays its route needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScenarioKind {
    /// One message over a zero-hop route; it must take at least
    /// `min_duration`.
    MessageDelay {
        source: DelayConfig,
        min_duration: Duration,
    },
    /// A profiling batch over a zero-hop route; the residual delay above the
    /// source minimum must look uniform over the source range.
    DelayDistribution { source: DelayConfig, messages: usize },
    /// A byte-exact session round trip through one relay.
    SessionRoundTrip { relay: DelayConfig, protocol: Protocol },
}

impl ScenarioKind {
    /// Mixer delays of the route's nodes, source first.
    pub fn node_delays(&self) -> Vec<DelayConfig> {
        match self {
            ScenarioKind::MessageDelay { source, .. }
            | ScenarioKind::DelayDistribution { source, .. } => {
                vec![*source, DelayConfig::unset()]
            }
            ScenarioKind::SessionRoundTrip { relay, .. } => {
                vec![DelayConfig::unset(), *relay, DelayConfig::unset()]
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpectedOutcome {
    Pass,
    /// The echoed bytes may fail to come back intact without counting as a
    /// regression. Every other failure still fails the scenario.
    Fail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioDescriptor {
    pub name: String,
    pub kind: ScenarioKind,
    pub expected: ExpectedOutcome,
}

impl ScenarioDescriptor {
    pub fn new(name: impl Into<String>, kind: ScenarioKind) -> Self {
        Self {
            name: name.into(),
            kind,
            expected: ExpectedOutcome::Pass,
        }
    }

    pub fn expect_failure(mut self) -> Self {
        self.expected = ExpectedOutcome::Fail;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScenarioOutcome {
    Passed,
    Failed { reason: String },
    ExpectedFailure { reason: String },
}

impl ScenarioOutcome {
    /// Combine what happened with what was expected.
    pub fn judge(expected: ExpectedOutcome, result: &HarnessResult<()>) -> Self {
        match (expected, result) {
            (_, Ok(())) => ScenarioOutcome::Passed,
            (ExpectedOutcome::Fail, Err(e)) if e.is_permitted_failure() => {
                ScenarioOutcome::ExpectedFailure {
                    reason: e.to_string(),
                }
            }
            (_, Err(e)) => ScenarioOutcome::Failed {
                reason: e.to_string(),
            },
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ScenarioOutcome::Passed => "passed",
            ScenarioOutcome::Failed { .. } => "failed",
            ScenarioOutcome::ExpectedFailure { .. } => "expected_failure",
        }
    }

    /// Whether the run matched its expectation.
    pub fn is_success(&self) -> bool {
        !matches!(self, ScenarioOutcome::Failed { .. })
    }
}

impl fmt::Display for ScenarioOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScenarioOutcome::Passed => f.write_str("passed"),
            ScenarioOutcome::Failed { reason } => write!(f, "failed: {reason}"),
            ScenarioOutcome::ExpectedFailure { reason } => write!(f, "expected failure: {reason}"),
        }
    }
}

/// Everything one scenario run produced.
#[derive(Debug, Clone)]
pub struct ScenarioReport {
    pub run_id: Uuid,
    pub name: String,
    pub outcome: ScenarioOutcome,
    pub elapsed: Duration,
    pub profile: Option<DelayProfile>,
    pub verification: Option<VerificationReport>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::error::HarnessError;
    use crate::session::SessionError;

    fn mismatch() -> HarnessResult<()> {
        Err(SessionError::ByteMismatch {
            expected_len: 10,
            actual_len: 4,
            first_difference: Some(4),
        }
        .into())
    }

    fn incomplete() -> HarnessResult<()> {
        Err(SessionError::EchoIncomplete {
            expected_len: 10,
            actual_len: 0,
            error: "read timed out".into(),
        }
        .into())
    }

    #[test]
    fn test_judge_matrix() {
        assert_eq!(
            ScenarioOutcome::judge(ExpectedOutcome::Pass, &Ok(())),
            ScenarioOutcome::Passed
        );
        assert!(matches!(
            ScenarioOutcome::judge(ExpectedOutcome::Pass, &mismatch()),
            ScenarioOutcome::Failed { .. }
        ));
        assert!(matches!(
            ScenarioOutcome::judge(ExpectedOutcome::Fail, &mismatch()),
            ScenarioOutcome::ExpectedFailure { .. }
        ));
        assert!(matches!(
            ScenarioOutcome::judge(ExpectedOutcome::Fail, &incomplete()),
            ScenarioOutcome::ExpectedFailure { .. }
        ));
    }

    #[test]
    fn test_pass_under_expected_failure_is_not_a_regression() {
        let outcome = ScenarioOutcome::judge(ExpectedOutcome::Fail, &Ok(()));
        assert_eq!(outcome, ScenarioOutcome::Passed);
        assert!(outcome.is_success());
    }

    #[test]
    fn test_lifecycle_errors_are_never_expected() {
        let lifecycle: Vec<HarnessResult<()>> = vec![
            Err(HarnessError::NoMatchingNode("min N/A, range N/A".into())),
            Err(SessionError::SessionCountMismatch {
                expected: 0,
                found: 1,
            }
            .into()),
            Err(SessionError::CloseRejected(4000).into()),
            Err(SessionError::OpenFailed("refused".into()).into()),
            Err(HarnessError::ReleaseFailed(1)),
            Err(HarnessError::CheckFailed("too fast".into())),
        ];
        for result in &lifecycle {
            let outcome = ScenarioOutcome::judge(ExpectedOutcome::Fail, result);
            assert!(
                matches!(outcome, ScenarioOutcome::Failed { .. }),
                "{outcome}"
            );
        }
    }

    #[test]
    fn test_route_shapes() {
        let profiling = ScenarioKind::DelayDistribution {
            source: DelayConfig::new(1000, 1000),
            messages: 10,
        };
        assert_eq!(profiling.node_delays().len(), 2);
        assert_eq!(profiling.node_delays()[0], DelayConfig::new(1000, 1000));

        let session = ScenarioKind::SessionRoundTrip {
            relay: DelayConfig::new(10, 5),
            protocol: Protocol::Tcp,
        };
        let delays = session.node_delays();
        assert_eq!(delays.len(), 3);
        assert_eq!(delays[1], DelayConfig::new(10, 5));
        assert_eq!(delays[0], DelayConfig::unset());
    }

    #[test]
    fn test_expected_failure_counts_as_success() {
        let outcome = ScenarioOutcome::ExpectedFailure {
            reason: "broken".into(),
        };
        assert!(outcome.is_success());
        assert_eq!(outcome.label(), "expected_failure");
        assert!(!ScenarioOutcome::Failed { reason: "x".into() }.is_success());
    }
}
