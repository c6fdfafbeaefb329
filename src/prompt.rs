use lazy_static::lazy_static;
use regex::Regex;

/// Longest question accepted, in characters
pub const MAX_QUESTION_CHARS: usize = 200;

pub const EMPTY_QUESTION: &str = "Please enter a question.";
pub const QUESTION_TOO_LONG: &str = "Question is too long (maximum 200 characters).";

lazy_static! {
    /// ASCII control characters except tab and newline
    static ref CONTROL_CHARS: Regex = Regex::new(r"[\x00-\x08\x0B-\x1F\x7F]").unwrap();
}

/// Instruction sent as the system message with every prompt
pub const SYSTEM_INSTRUCTION: &str = "You are a data analyst for a school. \
Respond only with factual insights from the data, never explain.";

/// Check a submitted question and return the cleaned text
///
/// Control characters (other than newline and tab) are stripped and the
/// result is trimmed before the checks run.
///
/// # Returns
/// * `Ok(String)` - The question to send
/// * `Err(&'static str)` - The message to show instead of an answer
pub fn validate_question(raw: &str) -> Result<String, &'static str> {
    let cleaned = CONTROL_CHARS.replace_all(raw, "");
    let question = cleaned.trim();

    if question.is_empty() {
        return Err(EMPTY_QUESTION);
    }
    if question.chars().count() > MAX_QUESTION_CHARS {
        return Err(QUESTION_TOO_LONG);
    }

    Ok(question.to_string())
}

/// Build the user message for a question about the dataset
///
/// The dataset is embedded verbatim. The question is cut at
/// `MAX_QUESTION_CHARS` characters even if it was not validated first.
pub fn build_prompt(question: &str, dataset_csv: &str) -> String {
    let question: String = question.chars().take(MAX_QUESTION_CHARS).collect();

    format!(
        "Below is the full data from a school's student records CSV file:\n\
         \n\
         {dataset_csv}\n\
         Question: {question}\n\
         \n\
         Answer using only this data. Reply in exactly 4 lines, in this format and nothing else:\n\
         🎯 ANSWER: <the direct answer in one short sentence>\n\
         📊 DATA: <the exact figures from the table that support it>\n\
         ✨ TOP: <the best performing student or class relevant to the question>\n\
         💡 KEY: <one short insight>"
    )
}
