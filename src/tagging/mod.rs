//! Batch annotation pipeline.
//!
//! Drives a full tagging run end to end: collect unannotated insights,
//! submit one batch to the classifier, poll until it ends, then reconcile
//! every per-item result back into the store. The job id is persisted
//! before the first poll, so a crashed or cancelled run can be picked up
//! later with [`TaggingPipeline::resume`]. Reconciliation is defensive
//! throughout: a malformed response body, an unknown component id, or a
//! sub-floor confidence drops that item (counted in the [`Report`]) and the
//! run continues.

mod prompts;

pub use prompts::{audience_prompt, tagging_prompt};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing::instrument;

use crate::classifier::{
    BatchClassifier, ClassificationRequest, JobId, JobOutcome, JobResultEntry, JobState,
    with_backoff,
};
use crate::config::EngineConfig;
use crate::models::{Insight, InsightId};
use crate::storage::{AnnotationKind, Store};
use crate::{Error, Result};

/// Cooperative cancellation handle for a polling run.
///
/// Cancelling stops the poll loop before the next status check; the
/// external job keeps running and stays resumable by id.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Creates a new, uncancelled flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Outcome summary of one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    /// External job id, when a batch was submitted.
    pub job_id: Option<String>,
    /// Requests submitted in the batch.
    pub submitted: usize,
    /// Insights that received at least one annotation write.
    pub insights_touched: usize,
    /// Methodology tag rows written (zero for audience runs).
    pub tags_written: usize,
    /// Response bodies that failed to parse or validate.
    pub parse_errors: usize,
    /// Tag suggestions dropped for naming an unregistered component.
    pub unknown_component_drops: usize,
    /// Items the classifier reported as errored, expired, or canceled.
    pub errored: usize,
    /// True when the run stopped on a [`CancelFlag`] before reconciling.
    pub cancelled: bool,
}

/// Orchestrates batch annotation runs against a store and a classifier.
pub struct TaggingPipeline<'a> {
    store: &'a Store,
    classifier: &'a dyn BatchClassifier,
    config: &'a EngineConfig,
    cancel: CancelFlag,
}

impl<'a> TaggingPipeline<'a> {
    /// Creates a pipeline over `store` and `classifier`.
    #[must_use]
    pub fn new(
        store: &'a Store,
        classifier: &'a dyn BatchClassifier,
        config: &'a EngineConfig,
    ) -> Self {
        Self {
            store,
            classifier,
            config,
            cancel: CancelFlag::new(),
        }
    }

    /// Replaces the cancellation flag, returning the pipeline for chaining.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Runs a methodology tagging pass.
    ///
    /// Collects insights with no methodology tags (or the whole corpus when
    /// `force` is set, re-tagging everything), submits one batch, polls to
    /// completion, and reconciles. With nothing to collect this is a no-op
    /// that never contacts the classifier.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if no methodology components are registered,
    /// or any error from the classifier or store.
    #[instrument(skip(self), fields(force = force))]
    pub fn run_methodology(&self, force: bool) -> Result<Report> {
        let insights = if force {
            self.store.list_all()?
        } else {
            self.store.list_untagged(AnnotationKind::Methodology)?
        };
        if insights.is_empty() {
            tracing::info!("no insights need methodology tagging");
            return Ok(Report::default());
        }

        let methodologies = self.store.methodology_tree()?;
        if methodologies.iter().all(|m| m.components.is_empty()) {
            return Err(Error::Validation(
                "no methodology components registered; seed methodologies first".to_string(),
            ));
        }

        let requests: Vec<ClassificationRequest> = insights
            .iter()
            .map(|insight| ClassificationRequest {
                custom_id: insight.id.as_str().to_string(),
                prompt: tagging_prompt(insight, &methodologies),
            })
            .collect();

        self.run_batch(AnnotationKind::Methodology, &requests)
    }

    /// Runs an audience classification pass over unclassified insights.
    ///
    /// # Errors
    ///
    /// Returns any error from the classifier or store.
    #[instrument(skip(self))]
    pub fn run_audience(&self) -> Result<Report> {
        let insights = self.store.list_untagged(AnnotationKind::Audience)?;
        if insights.is_empty() {
            tracing::info!("no insights need audience classification");
            return Ok(Report::default());
        }

        let requests: Vec<ClassificationRequest> = insights
            .iter()
            .map(|insight| ClassificationRequest {
                custom_id: insight.id.as_str().to_string(),
                prompt: audience_prompt(insight),
            })
            .collect();

        self.run_batch(AnnotationKind::Audience, &requests)
    }

    /// Resumes polling and reconciliation of a previously submitted job.
    ///
    /// An already reconciled job is a no-op. Reconciliation itself is
    /// idempotent (tag upserts and audience sets replace, never append), so
    /// resuming a job that half-reconciled before a crash is safe.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a job id this store never recorded, or any
    /// error from the classifier or store.
    #[instrument(skip(self), fields(job.id = %job_id))]
    pub fn resume(&self, job_id: &JobId) -> Result<Report> {
        let Some(record) = self.store.get_batch_job(job_id.as_str())? else {
            return Err(Error::Validation(format!(
                "unknown batch job '{job_id}'"
            )));
        };
        if record.state == "done" {
            tracing::info!("job already reconciled");
            return Ok(Report::default());
        }

        let mut report = Report {
            job_id: Some(job_id.as_str().to_string()),
            submitted: record.submitted,
            ..Report::default()
        };
        self.poll_and_reconcile(record.kind, job_id, &mut report)?;
        Ok(report)
    }

    fn run_batch(
        &self,
        kind: AnnotationKind,
        requests: &[ClassificationRequest],
    ) -> Result<Report> {
        let job_id = with_backoff(&self.config.retry, "submit_batch", || {
            self.classifier.submit(requests)
        })?;
        // Persisted before the first poll so a crash here is resumable.
        self.store
            .record_batch_job(job_id.as_str(), kind, requests.len())?;
        tracing::info!(
            job.id = %job_id,
            kind = kind.as_str(),
            submitted = requests.len(),
            "batch submitted"
        );

        let mut report = Report {
            job_id: Some(job_id.as_str().to_string()),
            submitted: requests.len(),
            ..Report::default()
        };
        self.poll_and_reconcile(kind, &job_id, &mut report)?;
        Ok(report)
    }

    fn poll_and_reconcile(
        &self,
        kind: AnnotationKind,
        job_id: &JobId,
        report: &mut Report,
    ) -> Result<()> {
        loop {
            if self.cancel.is_cancelled() {
                tracing::info!(job.id = %job_id, "polling cancelled; job remains resumable");
                report.cancelled = true;
                return Ok(());
            }

            let status = with_backoff(&self.config.retry, "poll_status", || {
                self.classifier.status(job_id)
            })?;
            if status.state == JobState::Ended {
                break;
            }
            tracing::debug!(
                job.id = %job_id,
                processing = status.processing,
                "batch still in progress"
            );
            thread::sleep(Duration::from_millis(self.config.poll_interval_ms));
        }

        let entries = with_backoff(&self.config.retry, "fetch_results", || {
            self.classifier.results(job_id)
        })?;
        match kind {
            AnnotationKind::Methodology => self.reconcile_methodology(&entries, report)?,
            AnnotationKind::Audience => self.reconcile_audience(&entries, report)?,
        }
        self.store.finish_batch_job(job_id.as_str())?;
        tracing::info!(
            job.id = %job_id,
            touched = report.insights_touched,
            parse_errors = report.parse_errors,
            "batch reconciled"
        );
        Ok(())
    }

    fn reconcile_methodology(
        &self,
        entries: &[JobResultEntry],
        report: &mut Report,
    ) -> Result<()> {
        let known = self.store.component_ids()?;

        for entry in entries {
            let text = match &entry.outcome {
                JobOutcome::Succeeded { text } => text,
                JobOutcome::Errored | JobOutcome::Expired | JobOutcome::Canceled => {
                    report.errored += 1;
                    continue;
                },
            };

            let mut tags = match crate::classifier::parse_tag_response(text) {
                Ok(tags) => tags,
                Err(e) => {
                    tracing::warn!(insight.id = %entry.custom_id, "unusable tag response: {e}");
                    report.parse_errors += 1;
                    continue;
                },
            };

            let before = tags.len();
            tags.retain(|(component_id, _)| known.contains(component_id));
            let dropped = before - tags.len();
            if dropped > 0 {
                tracing::warn!(
                    insight.id = %entry.custom_id,
                    dropped,
                    "dropped tags naming unregistered components"
                );
                report.unknown_component_drops += dropped;
            }

            tags.retain(|(_, confidence)| {
                (0.0..=1.0).contains(confidence)
                    && *confidence >= self.config.tag_confidence_floor
            });
            // Keep the most confident suggestions when over the cap.
            tags.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
            tags.truncate(self.config.max_tags_per_insight);

            if tags.is_empty() {
                continue;
            }

            let insight_id = InsightId::new(entry.custom_id.clone());
            let mut written = 0usize;
            for (component_id, confidence) in &tags {
                match self
                    .store
                    .tag_methodology(&insight_id, component_id, *confidence, "classifier")
                {
                    Ok(()) => written += 1,
                    Err(Error::Validation(detail)) => {
                        // Component or insight vanished between the snapshot
                        // and the write; same disposition as an unknown id.
                        tracing::warn!(insight.id = %entry.custom_id, "{detail}");
                        report.unknown_component_drops += 1;
                    },
                    Err(e) => return Err(e),
                }
            }
            if written > 0 {
                report.tags_written += written;
                report.insights_touched += 1;
            }
        }
        Ok(())
    }

    fn reconcile_audience(&self, entries: &[JobResultEntry], report: &mut Report) -> Result<()> {
        for entry in entries {
            let text = match &entry.outcome {
                JobOutcome::Succeeded { text } => text,
                JobOutcome::Errored | JobOutcome::Expired | JobOutcome::Canceled => {
                    report.errored += 1;
                    continue;
                },
            };

            let (roles, confidence, reasoning) =
                match crate::classifier::parse_audience_response(text) {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        tracing::warn!(
                            insight.id = %entry.custom_id,
                            "unusable audience response: {e}"
                        );
                        report.parse_errors += 1;
                        continue;
                    },
                };

            let insight_id = InsightId::new(entry.custom_id.clone());
            match self
                .store
                .set_audience(&insight_id, &roles, confidence, &reasoning)
            {
                Ok(()) => report.insights_touched += 1,
                Err(Error::Validation(detail)) => {
                    // Insight was deleted while the batch was in flight.
                    tracing::warn!(insight.id = %entry.custom_id, "{detail}");
                    report.errored += 1;
                },
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

/// Collects the insights a run of `kind` would submit, without submitting.
///
/// # Errors
///
/// Returns any store read error.
pub fn pending_for(store: &Store, kind: AnnotationKind) -> Result<Vec<Insight>> {
    store.list_untagged(kind)
}
