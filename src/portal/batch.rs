//! Sequential evaluation of a list of courses.

use super::errors::EvaluationStage;
use super::models::Course;
use super::PortalClient;
use std::fmt;
use tracing::{info, warn};

/// What happened to the course a [`Progress`] report is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Started,
    Finished,
    Failed {
        stage: EvaluationStage,
        reason: String,
    },
}

/// One progress report of a batch run. `current` is 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub current: usize,
    pub total: usize,
    pub course: String,
    pub event: ProgressEvent,
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.event {
            ProgressEvent::Started => write!(f, "正在评教: {}", self.course),
            ProgressEvent::Finished => write!(f, "评教完成: {}", self.course),
            ProgressEvent::Failed { stage, reason } => {
                write!(f, "评教失败: {} - {stage}: {reason}", self.course)
            }
        }
    }
}

impl PortalClient {
    /// Evaluate `courses` one after another.
    ///
    /// `on_progress` hears about every course before and after its attempt.
    /// A failing course is reported and skipped; the batch always runs to
    /// the end, pausing `course_delay` after every course.
    pub async fn evaluate_all<F>(&self, courses: &[Course], mut on_progress: F)
    where
        F: FnMut(Progress),
    {
        let total = courses.len();
        let mut failed = 0usize;

        for (i, course) in courses.iter().enumerate() {
            let report = |event| Progress {
                current: i + 1,
                total,
                course: course.name.clone(),
                event,
            };

            on_progress(report(ProgressEvent::Started));

            let event = match self.evaluate_course(course).await {
                Ok(()) => ProgressEvent::Finished,
                Err(e) => {
                    failed += 1;
                    warn!(
                        course = course.name.as_str(),
                        stage = %e.stage,
                        error = %e.source,
                        retryable = e.source.is_retryable(),
                        "Course evaluation failed"
                    );
                    ProgressEvent::Failed {
                        stage: e.stage,
                        reason: e.source.to_string(),
                    }
                }
            };
            on_progress(report(event));

            tokio::time::sleep(self.config.course_delay).await;
        }

        info!(total, failed, "Batch evaluation finished");
    }
}
