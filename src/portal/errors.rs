//! Error types for the portal client.

use std::fmt;

/// Longest raw-body snippet kept on a [`PortalError::Rejected`].
const REJECTED_SNIPPET_LEN: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum PortalError {
    #[error("request to the portal failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("portal returned HTTP {status} for {url}")]
    UnexpectedStatus { url: String, status: u16 },
    #[error("failed to decode {what}")]
    Decode {
        what: &'static str,
        #[source]
        source: anyhow::Error,
    },
    #[error("unexpected page structure: {0}")]
    Parse(String),
    #[error("{0}")]
    Validation(String),
    #[error("incorrect username or password")]
    Credentials,
    #[error("incorrect captcha")]
    Captcha,
    #[error("portal rejected the submission: {body}")]
    Rejected { body: String },
    #[error("session has been closed")]
    SessionClosed,
}

impl PortalError {
    pub(crate) fn rejected(body: &str) -> Self {
        let body = match body.char_indices().nth(REJECTED_SNIPPET_LEN) {
            Some((idx, _)) => format!("{}...", &body[..idx]),
            None => body.to_string(),
        };
        Self::Rejected { body }
    }

    /// Whether retrying the same call could plausibly succeed.
    ///
    /// Transport failures and bad status codes are transient. Everything else
    /// means either the user supplied bad input or the portal markup changed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::UnexpectedStatus { .. })
    }
}

/// The step of a single course evaluation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationStage {
    FetchForm,
    ExtractForm,
    SubmitDraft,
    SubmitFinal,
}

impl fmt::Display for EvaluationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::FetchForm => "fetching the evaluation form",
            Self::ExtractForm => "reading the evaluation form",
            Self::SubmitDraft => "draft submission",
            Self::SubmitFinal => "final submission",
        })
    }
}

/// A per-course failure. Never fatal to a batch.
#[derive(Debug, thiserror::Error)]
#[error("{course}: {stage} failed")]
pub struct CourseError {
    pub course: String,
    pub stage: EvaluationStage,
    #[source]
    pub source: PortalError,
}
