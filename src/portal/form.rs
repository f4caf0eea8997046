//! Evaluation form extraction and encoding.
//!
//! The questionnaire page is a plain HTML form. We read the inputs that
//! matter, answer every question with its most positive option, and send the
//! result back as `multipart/form-data`.

use super::errors::PortalError;
use html_scraper::{ElementRef, Html, Selector};
use indexmap::IndexMap;
use reqwest::multipart;

pub const TOKEN_FIELD: &str = "tokenValue";
pub const QUESTIONNAIRE_FIELD: &str = "wjbm";
pub const TOPIC_FIELD: &str = "ktid";
pub const PHASE_FIELD: &str = "tjcs";
pub const COMPARE_FIELD: &str = "compare";

/// Checkbox option meaning "none of the above"; never selected.
pub const NONE_OF_THE_ABOVE: &str = "K_以上均无";

/// Placeholder of the 1-100 score inputs.
const SCORE_PLACEHOLDER: &str = "请输入1-100的整数";
const MAX_SCORE: &str = "100";

const COMMENT: &str =
    "这门课程的教学效果很好,老师热爱教学,教学方式生动有趣,课程内容丰富且贴合时代特点。";

/// One form value: most fields carry a single string, checkbox groups several.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormValue {
    Single(String),
    Multiple(Vec<String>),
}

impl From<&str> for FormValue {
    fn from(value: &str) -> Self {
        Self::Single(value.to_string())
    }
}

/// The two submissions every questionnaire needs.
///
/// The portal saves a draft first, hands back a fresh token, and only
/// accepts the final submission under that new token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitPhase {
    Draft,
    Final,
}

impl SubmitPhase {
    /// Value of the `tjcs` field for this phase.
    pub fn marker(self) -> &'static str {
        match self {
            Self::Draft => "0",
            Self::Final => "1",
        }
    }
}

/// A filled-in questionnaire, keyed by field name in page order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvaluationForm {
    fields: IndexMap<String, FormValue>,
}

impl EvaluationForm {
    /// Read the questionnaire in `html` and answer it.
    ///
    /// Fields missing from the page are simply left out; see
    /// [`EvaluationForm::validate`] for the fields a submission cannot do
    /// without.
    pub fn extract(html: &str) -> Self {
        let input_sel = Selector::parse("input").unwrap();
        let comment_sel = Selector::parse("textarea.form-control.value_element").unwrap();

        let document = Html::parse_document(html);
        let mut form = Self::default();

        let inputs: Vec<ElementRef<'_>> = document.select(&input_sel).collect();
        let input_value = |name: &str| {
            inputs
                .iter()
                .find(|input| input.attr("name") == Some(name))
                .map(|input| input.attr("value").unwrap_or_default())
        };

        for name in [TOKEN_FIELD, QUESTIONNAIRE_FIELD, TOPIC_FIELD] {
            if let Some(value) = input_value(name) {
                form.set(name, value);
            }
        }
        form.set(PHASE_FIELD, SubmitPhase::Draft.marker());

        // Radios: the first option of each group is the most positive one
        let mut chosen: IndexMap<&str, &str> = IndexMap::new();
        for input in inputs.iter().filter(|i| has_type(i, "radio")) {
            if let (Some(name), Some(value)) = (input.attr("name"), input.attr("value")) {
                chosen.entry(name).or_insert(value);
            }
        }
        for (name, value) in chosen {
            form.set(name, value);
        }

        // Checkboxes: every substantive option
        let mut checked: IndexMap<&str, Vec<String>> = IndexMap::new();
        for input in inputs.iter().filter(|i| has_type(i, "checkbox")) {
            if let (Some(name), Some(value)) = (input.attr("name"), input.attr("value"))
                && value != NONE_OF_THE_ABOVE
            {
                checked.entry(name).or_default().push(value.to_string());
            }
        }
        for (name, values) in checked {
            form.fields
                .insert(name.to_string(), FormValue::Multiple(values));
        }

        for input in &inputs {
            if input.attr("placeholder") == Some(SCORE_PLACEHOLDER)
                && let Some(name) = input.attr("name")
            {
                form.set(name, MAX_SCORE);
            }
        }

        if let Some(name) = document
            .select(&comment_sel)
            .next()
            .and_then(|area| area.attr("name"))
        {
            form.set(name, COMMENT);
        }

        form.set(COMPARE_FIELD, "");
        form
    }

    pub fn get(&self, name: &str) -> Option<&FormValue> {
        self.fields.get(name)
    }

    /// The single string value of `name`, if it has one.
    pub fn single(&self, name: &str) -> Option<&str> {
        match self.fields.get(name) {
            Some(FormValue::Single(value)) => Some(value),
            _ => None,
        }
    }

    pub fn set(&mut self, name: &str, value: impl Into<FormValue>) {
        self.fields.insert(name.to_string(), value.into());
    }

    pub fn token(&self) -> Option<&str> {
        self.single(TOKEN_FIELD)
    }

    /// Replace the anti-forgery token with the one the portal just issued.
    pub fn set_token(&mut self, token: &str) {
        self.set(TOKEN_FIELD, token);
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FormValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Ensure the token, topic id and questionnaire code are present.
    ///
    /// Their absence means the page no longer looks the way we expect.
    pub fn validate(&self) -> Result<(), PortalError> {
        for name in [TOKEN_FIELD, TOPIC_FIELD, QUESTIONNAIRE_FIELD] {
            if self.single(name).is_none_or(str::is_empty) {
                return Err(PortalError::Parse(format!(
                    "evaluation form has no `{name}` value"
                )));
            }
        }
        Ok(())
    }

    /// Flatten into `(name, value)` pairs, repeating the name of multi-valued
    /// fields, with the phase marker set for `phase`.
    pub fn pairs(&self, phase: SubmitPhase) -> Vec<(String, String)> {
        let mut pairs = Vec::with_capacity(self.fields.len());
        for (name, value) in &self.fields {
            match value {
                _ if name == PHASE_FIELD => {
                    pairs.push((name.clone(), phase.marker().to_string()));
                }
                FormValue::Single(value) => pairs.push((name.clone(), value.clone())),
                FormValue::Multiple(values) => {
                    pairs.extend(values.iter().map(|v| (name.clone(), v.clone())));
                }
            }
        }
        if !self.fields.contains_key(PHASE_FIELD) {
            pairs.push((PHASE_FIELD.to_string(), phase.marker().to_string()));
        }
        pairs
    }

    pub(crate) fn to_multipart(&self, phase: SubmitPhase) -> multipart::Form {
        self.pairs(phase)
            .into_iter()
            .fold(multipart::Form::new(), |form, (name, value)| {
                form.text(name, value)
            })
    }
}

fn has_type(input: &ElementRef<'_>, kind: &str) -> bool {
    input
        .attr("type")
        .is_some_and(|t| t.eq_ignore_ascii_case(kind))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Trimmed-down copy of a real questionnaire page.
    const QUESTIONNAIRE: &str = r#"<html><body>
<form id="saveForm">
  <input type="hidden" id="tokenValue" name="tokenValue" value="9f2c51e0">
  <input type="hidden" name="wjbm" value="0000000264">
  <input type="hidden" name="ktid" value="2024-2025-1-1-304142030-01">
  <input type="hidden" name="tjcs" value="">
  <table>
    <tr><td>
      <input type="text" class="form-control" placeholder="请输入1-100的整数" name="0000000401">
    </td></tr>
    <tr><td>
      <input type="radio" name="0000000402" value="A_完全符合">完全符合
      <input type="radio" name="0000000402" value="B_比较符合">比较符合
      <input type="radio" name="0000000402" value="C_一般">一般
    </td></tr>
    <tr><td>
      <input type="radio" name="0000000403" value="A_完全同意">完全同意
      <input type="radio" name="0000000403" value="E_完全不同意">完全不同意
    </td></tr>
    <tr><td>
      <input type="checkbox" name="0000000404" value="A_任课老师讲课生动">
      <input type="checkbox" name="0000000404" value="B_课堂上开展了有效的研讨互动教学">
      <input type="checkbox" name="0000000404" value="K_以上均无">
    </td></tr>
    <tr><td>
      <textarea name="0000000405" class="form-control value_element" rows="4"></textarea>
    </td></tr>
  </table>
</form>
</body></html>"#;

    #[test]
    fn test_extract_minimal_form() {
        let html = r#"
            <input type="hidden" name="tokenValue" value="tok">
            <input type="radio" name="q1" value="A">
            <input type="radio" name="q1" value="B">
            <input type="checkbox" name="q2" value="X">
            <input type="checkbox" name="q2" value="K_以上均无">
            <input type="text" placeholder="请输入1-100的整数" name="q3">
        "#;
        let form = EvaluationForm::extract(html);
        assert_eq!(form.token(), Some("tok"));
        assert_eq!(form.single("q1"), Some("A"));
        assert_eq!(
            form.get("q2"),
            Some(&FormValue::Multiple(vec!["X".to_string()]))
        );
        assert_eq!(form.single("q3"), Some("100"));
    }

    #[test]
    fn test_extract_realistic_questionnaire() {
        let form = EvaluationForm::extract(QUESTIONNAIRE);

        assert_eq!(form.token(), Some("9f2c51e0"));
        assert_eq!(form.single("wjbm"), Some("0000000264"));
        assert_eq!(form.single("ktid"), Some("2024-2025-1-1-304142030-01"));
        assert_eq!(form.single("tjcs"), Some("0"));
        assert_eq!(form.single("0000000401"), Some("100"));
        assert_eq!(form.single("0000000402"), Some("A_完全符合"));
        assert_eq!(form.single("0000000403"), Some("A_完全同意"));
        assert_eq!(
            form.get("0000000404"),
            Some(&FormValue::Multiple(vec![
                "A_任课老师讲课生动".to_string(),
                "B_课堂上开展了有效的研讨互动教学".to_string(),
            ]))
        );
        assert_eq!(form.single("0000000405"), Some(COMMENT));
        assert_eq!(form.single("compare"), Some(""));
        assert!(form.validate().is_ok());
    }

    #[test]
    fn test_extract_keeps_page_order() {
        let form = EvaluationForm::extract(QUESTIONNAIRE);
        let names: Vec<&str> = form.iter().map(|(name, _)| name).collect();
        assert_eq!(
            names,
            vec![
                "tokenValue",
                "wjbm",
                "ktid",
                "tjcs",
                "0000000402",
                "0000000403",
                "0000000404",
                "0000000401",
                "0000000405",
                "compare",
            ]
        );
    }

    #[test]
    fn test_first_occurrence_of_hidden_field_wins() {
        let html = r#"
            <input type="hidden" name="wjbm" value="first">
            <input type="hidden" name="wjbm" value="second">
        "#;
        assert_eq!(EvaluationForm::extract(html).single("wjbm"), Some("first"));
    }

    #[test]
    fn test_sentinel_only_checkbox_group_is_omitted() {
        let html = r#"<input type="checkbox" name="q9" value="K_以上均无">"#;
        assert_eq!(EvaluationForm::extract(html).get("q9"), None);
    }

    #[test]
    fn test_absent_fields_are_omitted() {
        let form = EvaluationForm::extract("<html><body><p>会话已过期</p></body></html>");
        assert_eq!(form.token(), None);
        assert_eq!(form.get("wjbm"), None);
        // only the fields we always set
        assert_eq!(form.len(), 2);
    }

    #[test]
    fn test_validate_requires_token_topic_and_questionnaire() {
        let mut form = EvaluationForm::extract(QUESTIONNAIRE);
        form.set(TOPIC_FIELD, "");
        let err = form.validate().unwrap_err();
        assert!(matches!(err, PortalError::Parse(ref msg) if msg.contains("ktid")));

        let empty = EvaluationForm::extract("");
        assert!(matches!(empty.validate(), Err(PortalError::Parse(_))));
    }

    #[test]
    fn test_pairs_repeat_checkbox_names_and_mark_phase() {
        let form = EvaluationForm::extract(QUESTIONNAIRE);

        let draft = form.pairs(SubmitPhase::Draft);
        let checkbox: Vec<&str> = draft
            .iter()
            .filter(|(name, _)| name == "0000000404")
            .map(|(_, value)| value.as_str())
            .collect();
        assert_eq!(checkbox.len(), 2);
        assert!(draft.contains(&("tjcs".to_string(), "0".to_string())));

        let final_pairs = form.pairs(SubmitPhase::Final);
        assert!(final_pairs.contains(&("tjcs".to_string(), "1".to_string())));
        assert!(!final_pairs.contains(&("tjcs".to_string(), "0".to_string())));
    }

    #[test]
    fn test_set_token_replaces_in_place() {
        let mut form = EvaluationForm::extract(QUESTIONNAIRE);
        form.set_token("rotated");
        assert_eq!(form.token(), Some("rotated"));
        assert_eq!(form.iter().next().map(|(name, _)| name), Some("tokenValue"));
    }
}
