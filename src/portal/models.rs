//! Records exchanged with the portal's JSON endpoints.

use serde::Deserialize;

/// `SFPG` value of a course that still awaits evaluation.
pub const PENDING_FLAG: &str = "0";

/// A course listed by the evaluation endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Course {
    /// Course name (`KCM`).
    #[serde(rename = "KCM", default)]
    pub name: String,
    /// Topic id (`KTID`), which also addresses the evaluation form.
    #[serde(rename = "KTID", default)]
    pub topic_id: String,
    /// Questionnaire code (`WJBM`).
    #[serde(rename = "WJBM", default)]
    pub questionnaire_code: String,
    /// Evaluated flag (`SFPG`); see [`PENDING_FLAG`].
    #[serde(rename = "SFPG", default)]
    pub evaluated_flag: String,
    /// Position in the unfiltered listing returned by the portal.
    #[serde(skip)]
    pub index: usize,
}

impl Course {
    pub fn is_pending(&self) -> bool {
        self.evaluated_flag == PENDING_FLAG
    }
}

/// `{data: {records: [...]}}` envelope of the listing endpoint.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct EvaluationListResponse {
    #[serde(default)]
    pub data: EvaluationListData,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct EvaluationListData {
    #[serde(default)]
    pub records: Vec<Course>,
}

impl EvaluationListResponse {
    /// Keep only pending courses, stamping each with its original position.
    pub fn into_pending(self) -> Vec<Course> {
        self.data
            .records
            .into_iter()
            .enumerate()
            .filter(|(_, course)| course.is_pending())
            .map(|(index, course)| Course { index, ..course })
            .collect()
    }
}

/// Body returned by the save endpoint.
///
/// A draft submission answers with a fresh `token`; a final one with
/// `result: "ok"`.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct SubmitResponse {
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

impl SubmitResponse {
    pub fn is_ok(&self) -> bool {
        self.result.as_deref() == Some("ok")
    }
}
