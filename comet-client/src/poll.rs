//! Bounded polling for asynchronously resolved predictions.
//!
//! The external service never pushes; completion has to be observed. This
//! module owns that loop: fixed starting interval, multiplicative backoff
//! capped at a ceiling, and hard attempt/deadline bounds so a task that never
//! resolves cannot be watched forever.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::{CometClient, Prediction, PredictionStatus};

/// Where the poller reads prediction state from.
///
/// Implemented by [`CometClient`] for direct API access; anything that can
/// produce a [`Prediction`] for an id (a proxy endpoint, a test double)
/// works the same way.
pub trait StatusSource {
    fn fetch(&self, id: &str) -> impl Future<Output = anyhow::Result<Prediction>> + Send;
}

impl StatusSource for CometClient {
    async fn fetch(&self, id: &str) -> anyhow::Result<Prediction> {
        self.get_prediction(id).await
    }
}

#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Delay before the second and subsequent reads.
    pub initial_interval: Duration,
    /// Ceiling for the backed-off interval.
    pub max_interval: Duration,
    /// Interval multiplier applied after every read; values below 1.0 are
    /// treated as 1.0.
    pub backoff: f64,
    /// Maximum number of status reads.
    pub max_attempts: u32,
    /// Wall-clock bound for the whole watch.
    pub deadline: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(2500),
            max_interval: Duration::from_secs(30),
            backoff: 1.5,
            max_attempts: 120,
            deadline: Duration::from_secs(600),
        }
    }
}

/// Terminal result of watching one prediction.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Succeeded { output: Vec<String> },
    Failed { message: String },
    TimedOut,
    Canceled,
}

/// Watch a prediction until it reaches a terminal state or the configured
/// bounds trip.
///
/// A `succeeded` report without any output URL is not terminal: the result
/// is unusable until at least one URL shows up, so the loop keeps reading.
/// Transport errors on individual reads are logged and counted as attempts.
pub async fn poll_until_terminal<S: StatusSource>(
    source: &S,
    id: &str,
    config: &PollConfig,
) -> PollOutcome {
    let started = Instant::now();
    let mut interval = config.initial_interval;

    for attempt in 1..=config.max_attempts {
        match source.fetch(id).await {
            Ok(prediction) => {
                if let Some(outcome) = classify(&prediction) {
                    return outcome;
                }
                debug!(
                    "prediction {} still {:?} (attempt {}/{})",
                    id, prediction.status, attempt, config.max_attempts
                );
            }
            Err(e) => {
                warn!("status read for {} failed (attempt {}): {:#}", id, attempt, e);
            }
        }

        if started.elapsed() + interval >= config.deadline {
            return PollOutcome::TimedOut;
        }
        sleep(interval).await;
        interval = next_interval(interval, config);
    }

    PollOutcome::TimedOut
}

/// Same as [`poll_until_terminal`], raced against a caller-supplied
/// cancellation future (a ctrl-c handler, a timer, a channel close).
pub async fn poll_with_cancel<S: StatusSource>(
    source: &S,
    id: &str,
    config: &PollConfig,
    cancel: impl Future<Output = ()>,
) -> PollOutcome {
    tokio::select! {
        outcome = poll_until_terminal(source, id, config) => outcome,
        _ = cancel => PollOutcome::Canceled,
    }
}

fn classify(prediction: &Prediction) -> Option<PollOutcome> {
    match prediction.status {
        PredictionStatus::Succeeded => {
            let output = prediction.output.clone().unwrap_or_default();
            if output.is_empty() {
                None
            } else {
                Some(PollOutcome::Succeeded { output })
            }
        }
        PredictionStatus::Failed => Some(PollOutcome::Failed {
            message: prediction
                .error_message()
                .unwrap_or_else(|| "prediction failed".to_string()),
        }),
        PredictionStatus::Canceled => Some(PollOutcome::Canceled),
        _ => None,
    }
}

fn next_interval(current: Duration, config: &PollConfig) -> Duration {
    current.mul_f64(config.backoff.max(1.0)).min(config.max_interval)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Replays a scripted sequence of status reads; once exhausted it keeps
    /// reporting `processing`.
    struct ScriptedSource {
        responses: Mutex<VecDeque<anyhow::Result<Prediction>>>,
        calls: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(responses: Vec<anyhow::Result<Prediction>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl StatusSource for ScriptedSource {
        async fn fetch(&self, _id: &str) -> anyhow::Result<Prediction> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(prediction("processing", None)))
        }
    }

    fn prediction(status: &str, output: Option<Vec<&str>>) -> Prediction {
        serde_json::from_value(serde_json::json!({
            "id": "pred_t",
            "status": status,
            "output": output,
        }))
        .unwrap()
    }

    fn fast_config(max_attempts: u32) -> PollConfig {
        PollConfig {
            initial_interval: Duration::from_millis(1),
            max_interval: Duration::from_millis(5),
            backoff: 1.5,
            max_attempts,
            deadline: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn terminates_on_first_succeeded_report_with_output() {
        let source = ScriptedSource::new(vec![
            Ok(prediction("starting", None)),
            Ok(prediction("processing", None)),
            Ok(prediction("succeeded", Some(vec!["https://x/img.png"]))),
        ]);

        let outcome = poll_until_terminal(&source, "pred_t", &fast_config(10)).await;

        assert_eq!(
            outcome,
            PollOutcome::Succeeded {
                output: vec!["https://x/img.png".to_string()]
            }
        );
        // Exactly one read observed the terminal state; no reads after it.
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test]
    async fn failed_status_carries_upstream_message() {
        let source = ScriptedSource::new(vec![Ok(serde_json::from_value(serde_json::json!({
            "id": "pred_t",
            "status": "failed",
            "error": "out of capacity"
        }))
        .unwrap())]);

        let outcome = poll_until_terminal(&source, "pred_t", &fast_config(10)).await;

        assert_eq!(
            outcome,
            PollOutcome::Failed {
                message: "out of capacity".to_string()
            }
        );
    }

    #[tokio::test]
    async fn succeeded_without_output_is_not_terminal() {
        let source = ScriptedSource::new(vec![
            Ok(prediction("succeeded", Some(vec![]))),
            Ok(prediction("succeeded", None)),
        ]);

        let outcome = poll_until_terminal(&source, "pred_t", &fast_config(3)).await;

        assert_eq!(outcome, PollOutcome::TimedOut);
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test]
    async fn transport_errors_are_retried_not_fatal() {
        let source = ScriptedSource::new(vec![
            Err(anyhow::anyhow!("connection reset")),
            Err(anyhow::anyhow!("503")),
            Ok(prediction("succeeded", Some(vec!["https://x/a.png"]))),
        ]);

        let outcome = poll_until_terminal(&source, "pred_t", &fast_config(10)).await;

        assert!(matches!(outcome, PollOutcome::Succeeded { .. }));
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test]
    async fn attempt_limit_bounds_the_watch() {
        let source = ScriptedSource::new(vec![]);

        let outcome = poll_until_terminal(&source, "pred_t", &fast_config(4)).await;

        assert_eq!(outcome, PollOutcome::TimedOut);
        assert_eq!(source.calls(), 4);
    }

    #[tokio::test]
    async fn deadline_bounds_the_watch() {
        let source = ScriptedSource::new(vec![]);
        let config = PollConfig {
            initial_interval: Duration::from_millis(50),
            deadline: Duration::from_millis(10),
            ..fast_config(1000)
        };

        let outcome = poll_until_terminal(&source, "pred_t", &config).await;

        assert_eq!(outcome, PollOutcome::TimedOut);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn cancellation_wins_over_a_pending_watch() {
        let source = ScriptedSource::new(vec![]);

        let outcome =
            poll_with_cancel(&source, "pred_t", &fast_config(1000), std::future::ready(())).await;

        assert_eq!(outcome, PollOutcome::Canceled);
    }

    #[tokio::test]
    async fn external_cancellation_is_terminal() {
        let source = ScriptedSource::new(vec![Ok(prediction("canceled", None))]);

        let outcome = poll_until_terminal(&source, "pred_t", &fast_config(10)).await;

        assert_eq!(outcome, PollOutcome::Canceled);
        assert_eq!(source.calls(), 1);
    }

    #[test]
    fn backoff_is_capped_at_the_ceiling() {
        let config = PollConfig {
            initial_interval: Duration::from_secs(20),
            max_interval: Duration::from_secs(30),
            backoff: 2.0,
            ..PollConfig::default()
        };

        let next = next_interval(config.initial_interval, &config);
        assert_eq!(next, Duration::from_secs(30));

        let again = next_interval(next, &config);
        assert_eq!(again, Duration::from_secs(30));
    }
}
