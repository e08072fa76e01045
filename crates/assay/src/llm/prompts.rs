//! Prompt templates for insight requests.

use crate::input::Row;
use crate::profile::Profile;

/// System instruction shared by every provider.
pub fn system_prompt() -> &'static str {
    "You are a business data analyst. You receive a statistical profile of an \
     uploaded tabular report and a few sample rows. You write a short narrative \
     of the most important findings and rate how informative and healthy the \
     data is. You always answer with a single JSON object and nothing else."
}

/// Build the insight prompt.
///
/// The profile is the primary input; sample rows only illustrate it. The
/// strict variant is used after a response could not be parsed.
pub fn insight_prompt(profile: &Profile, sample: &[Row], strict: bool) -> String {
    let sample_str = if sample.is_empty() {
        "No sample rows available".to_string()
    } else {
        sample
            .iter()
            .map(|row| serde_json::to_string(row).unwrap_or_else(|_| "{}".to_string()))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let format_rules = if strict {
        "Your previous answer could not be parsed. Respond with ONLY the JSON object below: \
         no markdown, no code fences, no commentary. `summary` must be a non-empty string and \
         `insight_score` must be a number between 0 and 100."
    } else {
        "Respond with a JSON object:"
    };

    format!(
        r#"Summarize this business report for a non-technical reader.

## Profile
{}
## Sample Rows
{}

## Task
Write 2-4 sentences covering the key figures, notable distributions and any data
quality concerns (missing values, mixed types). Then give an overall insight score
from 0 (unusable) to 100 (complete, consistent and informative).

{}
{{
  "summary": "Your narrative...",
  "insight_score": 0-100
}}"#,
        profile.summary_text(),
        sample_str,
        format_rules
    )
}
