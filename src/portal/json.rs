//! JSON decoding for portal responses.
//!
//! The portal answers API calls with loosely typed JSON and, when a session
//! has silently expired, with an HTML login page instead. Decode failures
//! therefore carry the serde path and a snippet of the body around the
//! failure so the cause is visible in logs.

use super::errors::PortalError;
use serde::de::DeserializeOwned;

/// Characters of context kept on each side of the failure column.
const SNIPPET_CONTEXT: usize = 15;

/// Decode `body` as `T`, turning failures into [`PortalError::Decode`].
pub fn decode<T: DeserializeOwned>(body: &str, what: &'static str) -> Result<T, PortalError> {
    let de = &mut serde_json::Deserializer::from_str(body);
    serde_path_to_error::deserialize(de).map_err(|err| {
        let inner = err.inner();
        let (line, column) = (inner.line(), inner.column());
        let path = err.path().to_string();

        let msg = inner.to_string();
        let loc = format!(" at line {line} column {column}");
        let reason = describe_mismatch(msg.strip_suffix(&loc).unwrap_or(&msg));

        let mut detail = String::new();
        if !path.is_empty() && path != "." {
            detail.push_str(&format!("at path '{path}': "));
        }
        detail.push_str(&format!(
            "{reason} (line {line} col {column})\n{}",
            snippet(body, line, column)
        ));

        PortalError::Decode {
            what,
            source: anyhow::anyhow!(detail),
        }
    })
}

/// Rephrase serde's "invalid type: X, expected Y" as "expected Y, got X".
fn describe_mismatch(msg: &str) -> String {
    if let Some(rest) = msg.strip_prefix("invalid type: ")
        && let Some((actual, expected)) = rest.split_once(", expected ")
    {
        return format!("expected {expected}, got {actual}");
    }
    msg.to_string()
}

/// A one-line excerpt around `column` with a caret under the failure point.
///
/// Works on characters, not bytes: portal bodies are mostly CJK text.
fn snippet(body: &str, line: usize, column: usize) -> String {
    let target: Vec<char> = body
        .lines()
        .nth(line.saturating_sub(1))
        .unwrap_or("")
        .chars()
        .collect();
    if target.is_empty() {
        return "(empty line)".to_string();
    }

    // serde_json columns count bytes, so map back onto a char index
    let line_str: String = target.iter().collect();
    let byte_idx = column.saturating_sub(1).min(line_str.len());
    let error_idx = line_str
        .char_indices()
        .take_while(|(i, _)| *i < byte_idx)
        .count()
        .min(target.len() - 1);

    let start = error_idx.saturating_sub(SNIPPET_CONTEXT);
    let end = (error_idx + SNIPPET_CONTEXT).min(target.len());
    let excerpt: String = target[start..end].iter().collect();
    let caret = " ".repeat(error_idx - start) + "^";

    format!("...{excerpt}...\n   {caret}")
}
