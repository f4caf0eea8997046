//! Pending-evaluation listing and the two-phase questionnaire submission.

use super::errors::{CourseError, EvaluationStage};
use super::form::{EvaluationForm, SubmitPhase, TOKEN_FIELD};
use super::json;
use super::models::{Course, EvaluationListResponse, SubmitResponse};
use super::{
    EVALUATION_FORM_PATH, EVALUATION_LIST_PATH, EVALUATION_SAVE_PATH, PortalClient, PortalError,
    ensure_ok,
};
use crate::utils::fmt_duration;
use std::time::Instant;
use tracing::{Instrument, debug, info, info_span};

/// The listing endpoint is asked for one page big enough for any semester.
const LIST_PAGE_SIZE: &str = "30";

impl PortalClient {
    /// Courses still awaiting evaluation, in portal order.
    pub async fn fetch_pending_evaluations(&self) -> Result<Vec<Course>, PortalError> {
        let resp = self
            .post_form(
                self.endpoint(EVALUATION_LIST_PATH)?,
                &[("pageNum", "1"), ("pageSize", LIST_PAGE_SIZE), ("flag", "kt")],
            )
            .await?;
        let body = ensure_ok(resp)?.text().await?;

        let listing: EvaluationListResponse = json::decode(&body, "evaluation list")?;
        let total = listing.data.records.len();
        let pending = listing.into_pending();
        info!(total, pending = pending.len(), "Fetched evaluation list");
        Ok(pending)
    }

    /// GET the questionnaire page of a course.
    pub async fn fetch_form(&self, topic_id: &str) -> Result<String, PortalError> {
        let mut url = self.endpoint(EVALUATION_FORM_PATH)?;
        url.path_segments_mut()
            .map_err(|()| {
                PortalError::Validation(format!(
                    "portal URL cannot take a path: {}",
                    self.config.base_url
                ))
            })?
            .pop_if_empty()
            .push(topic_id);
        let resp = self.get_page(url).await?;
        Ok(resp.text().await?)
    }

    /// Send the questionnaire for one phase.
    ///
    /// A draft answers with the token the final submission must use, which is
    /// returned here; the final submission must come back with
    /// `result: "ok"`.
    pub async fn submit(
        &self,
        form: &EvaluationForm,
        phase: SubmitPhase,
    ) -> Result<Option<String>, PortalError> {
        form.validate()?;
        let token = form.token().unwrap_or_default();

        let mut url = self.endpoint(EVALUATION_SAVE_PATH)?;
        url.query_pairs_mut().append_pair(TOKEN_FIELD, token);

        let resp = self.post_multipart(url, form.to_multipart(phase)).await?;
        let body = resp.text().await?;
        let result: SubmitResponse = json::decode(&body, "submission result")?;

        match phase {
            SubmitPhase::Draft => {
                let token = result.token.filter(|t| !t.is_empty());
                debug!(rotated = token.is_some(), "Draft saved");
                Ok(token)
            }
            SubmitPhase::Final if result.is_ok() => Ok(None),
            SubmitPhase::Final => Err(PortalError::rejected(&body)),
        }
    }

    /// Evaluate one course: fetch the form, answer it, save a draft, wait,
    /// then submit under the rotated token.
    pub async fn evaluate_course(&self, course: &Course) -> Result<(), CourseError> {
        let span = info_span!("evaluate_course", course = %course.name, topic = %course.topic_id);
        async {
            let start = Instant::now();
            let fail = |stage: EvaluationStage| {
                let name = course.name.clone();
                move |source: PortalError| CourseError {
                    course: name,
                    stage,
                    source,
                }
            };

            let html = self
                .fetch_form(&course.topic_id)
                .await
                .map_err(fail(EvaluationStage::FetchForm))?;

            let mut form = EvaluationForm::extract(&html);
            form.validate().map_err(fail(EvaluationStage::ExtractForm))?;
            debug!(fields = form.len(), "Extracted evaluation form");

            if let Some(token) = self
                .submit(&form, SubmitPhase::Draft)
                .await
                .map_err(fail(EvaluationStage::SubmitDraft))?
            {
                form.set_token(&token);
            }

            tokio::time::sleep(self.config.phase_delay).await;

            self.submit(&form, SubmitPhase::Final)
                .await
                .map_err(fail(EvaluationStage::SubmitFinal))?;

            info!(duration = fmt_duration(start.elapsed()), "Course evaluated");
            Ok::<(), CourseError>(())
        }
        .instrument(span)
        .await
    }
}
