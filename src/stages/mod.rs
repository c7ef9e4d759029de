//! Pipeline stages.
//!
//! Each stage is an idempotent function over the resolved [`BuildConfig`]
//! (and, where commands need routing, the run's [`ExecTarget`]). Stages run
//! in a fixed order; see [`crate::pipeline`].
//!
//! [`BuildConfig`]: crate::config::BuildConfig
//! [`ExecTarget`]: crate::target::ExecTarget

pub mod build;
pub mod clean;
pub mod generate;
pub mod locate;
pub mod populate;

/// How a stage finished when it did not fail outright.
///
/// Fatal failures are `Err` values and abort the pipeline. An `Advisory`
/// outcome records a degraded-but-acceptable result (a missing optional
/// asset, a leftover work tree after a successful build); the driver logs it
/// as a warning and continues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    Ok,
    Advisory(String),
}

impl StageOutcome {
    /// Combine two outcomes, joining advisory reasons.
    pub fn merge(self, other: StageOutcome) -> StageOutcome {
        match (self, other) {
            (StageOutcome::Ok, outcome) => outcome,
            (outcome, StageOutcome::Ok) => outcome,
            (StageOutcome::Advisory(a), StageOutcome::Advisory(b)) => {
                StageOutcome::Advisory(format!("{}; {}", a, b))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_keeps_advisories() {
        let merged = StageOutcome::Ok
            .merge(StageOutcome::Advisory("one".into()))
            .merge(StageOutcome::Ok)
            .merge(StageOutcome::Advisory("two".into()));
        assert_eq!(merged, StageOutcome::Advisory("one; two".into()));
    }

    #[test]
    fn test_merge_ok() {
        assert_eq!(StageOutcome::Ok.merge(StageOutcome::Ok), StageOutcome::Ok);
    }
}
