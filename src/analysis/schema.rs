//! Structured result shapes and their validation.
//!
//! Model output is never trusted: raw text is first reduced to a JSON object, then every
//! field is checked for presence, type, enum membership, and range. Out-of-range priorities
//! are rejected rather than clamped.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which analysis a request performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisKind {
    Classification,
    #[serde(rename = "subtask_generation")]
    Subtasks,
}

impl AnalysisKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Classification => "classification",
            Self::Subtasks => "subtask_generation",
        }
    }
}

impl fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("response contains no JSON object")]
    MissingJson,
    #[error("response is not valid JSON: {0}")]
    Malformed(String),
    #[error("expected a JSON object at the top level")]
    NotAnObject,
    #[error("missing field '{0}'")]
    MissingField(&'static str),
    #[error("field '{field}' must be {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },
    #[error("category '{0}' is not one of personal, work, urgent")]
    InvalidCategory(String),
    #[error("priority {0} is outside 1..=5")]
    PriorityOutOfRange(i64),
}

/// Task category. `Other` is only ever produced as a failure default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskCategory {
    Personal,
    Work,
    Urgent,
    Other,
}

impl TaskCategory {
    /// Categories a model may answer with.
    pub const REQUESTABLE: [TaskCategory; 3] = [Self::Personal, Self::Work, Self::Urgent];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Personal => "personal",
            Self::Work => "work",
            Self::Urgent => "urgent",
            Self::Other => "other",
        }
    }

    /// Parse a category returned by a model. `other` is rejected.
    pub fn parse_requested(value: &str) -> Result<Self, SchemaError> {
        Self::REQUESTABLE
            .into_iter()
            .find(|c| c.as_str() == value)
            .ok_or_else(|| SchemaError::InvalidCategory(value.to_string()))
    }
}

impl fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Priority from 1 (very low) to 5 (critical).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Priority(u8);

impl Priority {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;
    /// Medium priority, used for failure defaults.
    pub const MEDIUM: Priority = Priority(3);

    pub fn new(value: i64) -> Result<Self, SchemaError> {
        if (Self::MIN as i64..=Self::MAX as i64).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(SchemaError::PriorityOutOfRange(value))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for Priority {
    type Error = SchemaError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Priority> for u8 {
    fn from(priority: Priority) -> Self {
        priority.0
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub category: TaskCategory,
    pub reasoning: String,
    pub priority: Priority,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtaskSuggestion {
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtaskList {
    /// Suggested execution order.
    pub subtasks: Vec<SubtaskSuggestion>,
    pub reasoning: String,
}

pub const DEFAULT_SUBTASK_REASONING: &str = "Task broken down into actionable steps";

const CLASSIFICATION_CONTRACT: &str = r#"The output must be a JSON object with exactly these fields:
{
  "category": string, one of "personal", "work", "urgent",
  "reasoning": string, a brief explanation (1-2 sentences) for the classification,
  "priority": integer from 1 to 5, where 5 is the highest priority
}
Example: {"category": "work", "reasoning": "Quarterly report for the finance team.", "priority": 4}"#;

const SUBTASKS_CONTRACT: &str = r#"The output must be a JSON object with exactly these fields:
{
  "subtasks": array of objects, ordered logically (what needs to happen first comes first), each with:
    "title": string, a short actionable title (3-8 words) starting with a verb,
    "description": string, a detailed description of what needs to be done,
  "reasoning": string, a brief analysis of how the task was broken down
}
Example: {"subtasks": [{"title": "Research venue options", "description": "List three venues that fit the budget."}], "reasoning": "Venue constrains everything else."}"#;

const CLASSIFICATION_ROLE: &str = "You are a task classification assistant.
Analyze the task and classify it into ONE of these categories:
- 'personal': personal life, hobbies, health, family, self-improvement
- 'work': professional tasks, meetings, projects, career-related
- 'urgent': time-sensitive tasks needing immediate attention (deadlines, emergencies)

Also assign a priority level (1-5) where:
- 5: Critical/Urgent - needs immediate action
- 4: High - important, address soon
- 3: Medium - normal priority
- 2: Low - when time permits
- 1: Very Low - nice to have";

const SUBTASKS_ROLE: &str = "You are a task breakdown assistant.
Analyze the task complexity and break it down into the appropriate number of concrete, actionable subtasks.

Guidelines:
- Generate as many subtasks as needed (simple tasks may need 2-3, complex ones may need 10+)
- Each subtask should be specific and achievable
- Order them logically (what needs to happen first)
- Make subtasks independent when possible
- Use action verbs (Research, Create, Review, etc.)
- Keep titles concise (3-8 words)";

/// A result shape a structured request can produce.
pub trait StructuredOutput: Serialize + Sized + Send {
    const KIND: AnalysisKind;

    /// Role and guidance text opening the system instruction.
    fn role() -> &'static str;

    /// Canonical human-readable description of the output contract.
    fn contract() -> &'static str;

    /// Closing line of the user instruction.
    fn request() -> &'static str;

    /// Validate an already-parsed JSON value.
    fn from_value(value: &Value) -> Result<Self, SchemaError>;

    /// The safe default substituted when a request fails.
    fn fallback(reason: &str) -> Self;

    /// The default a progress stream substitutes when a phase aborts outright.
    fn stream_fallback() -> Self;

    /// One-line description of a successful result, for logs and progress messages.
    fn summary(&self) -> String;
}

impl StructuredOutput for ClassificationResult {
    const KIND: AnalysisKind = AnalysisKind::Classification;

    fn role() -> &'static str {
        CLASSIFICATION_ROLE
    }

    fn contract() -> &'static str {
        CLASSIFICATION_CONTRACT
    }

    fn request() -> &'static str {
        "Classify this task."
    }

    fn from_value(value: &Value) -> Result<Self, SchemaError> {
        let object = value.as_object().ok_or(SchemaError::NotAnObject)?;

        let category = required_str(object, "category")?;
        let category = TaskCategory::parse_requested(category.trim().to_lowercase().as_str())?;
        let reasoning = required_str(object, "reasoning")?.to_string();
        let priority = object
            .get("priority")
            .ok_or(SchemaError::MissingField("priority"))?
            .as_i64()
            .ok_or(SchemaError::WrongType {
                field: "priority",
                expected: "an integer",
            })?;

        Ok(Self {
            category,
            reasoning,
            priority: Priority::new(priority)?,
        })
    }

    fn fallback(reason: &str) -> Self {
        Self {
            category: TaskCategory::Other,
            reasoning: format!("Classification unavailable: {}", reason),
            priority: Priority::MEDIUM,
        }
    }

    fn stream_fallback() -> Self {
        Self {
            category: TaskCategory::Other,
            reasoning: "Classification failed".to_string(),
            priority: Priority::MEDIUM,
        }
    }

    fn summary(&self) -> String {
        format!(
            "Classified as '{}' with priority {}/{}",
            self.category,
            self.priority,
            Priority::MAX
        )
    }
}

impl StructuredOutput for SubtaskList {
    const KIND: AnalysisKind = AnalysisKind::Subtasks;

    fn role() -> &'static str {
        SUBTASKS_ROLE
    }

    fn contract() -> &'static str {
        SUBTASKS_CONTRACT
    }

    fn request() -> &'static str {
        "Break this down into subtasks."
    }

    fn from_value(value: &Value) -> Result<Self, SchemaError> {
        let object = value.as_object().ok_or(SchemaError::NotAnObject)?;

        let items = object
            .get("subtasks")
            .ok_or(SchemaError::MissingField("subtasks"))?
            .as_array()
            .ok_or(SchemaError::WrongType {
                field: "subtasks",
                expected: "an array",
            })?;

        let subtasks = items
            .iter()
            .map(|item| {
                let item = item.as_object().ok_or(SchemaError::WrongType {
                    field: "subtasks",
                    expected: "an array of objects",
                })?;
                Ok(SubtaskSuggestion {
                    title: required_str(item, "title")?.to_string(),
                    description: required_str(item, "description")?.to_string(),
                })
            })
            .collect::<Result<Vec<_>, SchemaError>>()?;

        let reasoning = match object.get("reasoning") {
            None | Some(Value::Null) => DEFAULT_SUBTASK_REASONING.to_string(),
            Some(Value::String(s)) => s.clone(),
            Some(_) => {
                return Err(SchemaError::WrongType {
                    field: "reasoning",
                    expected: "a string",
                })
            }
        };

        Ok(Self {
            subtasks,
            reasoning,
        })
    }

    fn fallback(reason: &str) -> Self {
        Self {
            subtasks: Vec::new(),
            reasoning: format!("Subtask generation unavailable: {}", reason),
        }
    }

    fn stream_fallback() -> Self {
        Self {
            subtasks: Vec::new(),
            reasoning: "Subtask generation failed".to_string(),
        }
    }

    fn summary(&self) -> String {
        format!("Generated {} actionable subtasks", self.subtasks.len())
    }
}

fn required_str<'a>(
    object: &'a serde_json::Map<String, Value>,
    field: &'static str,
) -> Result<&'a str, SchemaError> {
    object
        .get(field)
        .ok_or(SchemaError::MissingField(field))?
        .as_str()
        .ok_or(SchemaError::WrongType {
            field,
            expected: "a string",
        })
}

/// Parse raw model text into `T`.
pub fn parse_output<T: StructuredOutput>(raw: &str) -> Result<T, SchemaError> {
    let value = extract_json(raw)?;
    T::from_value(&value)
}

/// Reduce model text to a JSON value.
///
/// Tried in order: the whole text as a JSON document, the body of the first fenced code
/// block, then the first complete JSON value starting at any `{` in surrounding prose.
pub fn extract_json(raw: &str) -> Result<Value, SchemaError> {
    let trimmed = raw.trim();
    let whole_err = match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => return Ok(value),
        Err(err) => err,
    };

    if let Some(body) = fenced_body(trimmed) {
        if let Ok(value) = serde_json::from_str::<Value>(body) {
            return Ok(value);
        }
    }

    let mut saw_brace = false;
    for (start, _) in trimmed.match_indices('{') {
        saw_brace = true;
        let mut values = serde_json::Deserializer::from_str(&trimmed[start..]).into_iter::<Value>();
        if let Some(Ok(value)) = values.next() {
            return Ok(value);
        }
    }

    if saw_brace {
        Err(SchemaError::Malformed(whole_err.to_string()))
    } else {
        Err(SchemaError::MissingJson)
    }
}

/// Body of the first ``` fenced block, without its language tag.
fn fenced_body(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after_ticks = &text[open + 3..];
    let body_start = after_ticks.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after_ticks[body_start..];
    let close = body.find("```")?;
    Some(body[..close].trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_bare_classification() {
        let result: ClassificationResult = parse_output(
            r#"{"category": "urgent", "reasoning": "Server is down.", "priority": 5}"#,
        )
        .unwrap();
        assert_eq!(result.category, TaskCategory::Urgent);
        assert_eq!(result.priority.get(), 5);
        assert_eq!(result.reasoning, "Server is down.");
    }

    #[test]
    fn test_parse_fenced_block_with_prose() {
        let raw = "Here you go:\n```json\n{\"category\": \"Personal\", \"reasoning\": \"Gym.\", \"priority\": 2}\n```\nHope that helps!";
        let result: ClassificationResult = parse_output(raw).unwrap();
        assert_eq!(result.category, TaskCategory::Personal);
        assert_eq!(result.priority, Priority::new(2).unwrap());
    }

    #[test]
    fn test_parse_object_embedded_in_prose() {
        let raw = "Sure! {\"category\": \"work\", \"reasoning\": \"Report.\", \"priority\": 3} Done.";
        let result: ClassificationResult = parse_output(raw).unwrap();
        assert_eq!(result.category, TaskCategory::Work);
    }

    #[test]
    fn test_code_fence_inside_string_field() {
        let raw = r#"{"subtasks":[{"title":"Add config example","description":"Document it as ```toml\nkey = 1\n``` in the README."}],"reasoning":"docs"}"#;
        let list: SubtaskList = parse_output(raw).unwrap();
        assert_eq!(list.subtasks.len(), 1);
        assert_eq!(list.subtasks[0].title, "Add config example");
        assert!(list.subtasks[0].description.contains("```toml"));
        assert_eq!(list.reasoning, "docs");
    }

    #[test]
    fn test_trailing_prose_with_braces() {
        let raw = "{\"category\":\"work\",\"reasoning\":\"x\",\"priority\":3}\nNote: fields use {braces}.";
        let result: ClassificationResult = parse_output(raw).unwrap();
        assert_eq!(result.category, TaskCategory::Work);
        assert_eq!(result.priority, Priority::MEDIUM);
    }

    #[test]
    fn test_leading_brace_in_prose_is_skipped() {
        let raw = "Use {placeholders} carefully: {\"category\": \"urgent\", \"reasoning\": \"Outage.\", \"priority\": 5}";
        let result: ClassificationResult = parse_output(raw).unwrap();
        assert_eq!(result.category, TaskCategory::Urgent);
    }

    #[test]
    fn test_unbalanced_object_is_malformed() {
        let err = extract_json("Result: {\"category\": \"work\"").unwrap_err();
        assert!(matches!(err, SchemaError::Malformed(_)));
    }

    #[test]
    fn test_priority_out_of_range_is_rejected_not_clamped() {
        let err = parse_output::<ClassificationResult>(
            r#"{"category": "work", "reasoning": "x", "priority": 7}"#,
        )
        .unwrap_err();
        assert_eq!(err, SchemaError::PriorityOutOfRange(7));

        let err = parse_output::<ClassificationResult>(
            r#"{"category": "work", "reasoning": "x", "priority": 0}"#,
        )
        .unwrap_err();
        assert_eq!(err, SchemaError::PriorityOutOfRange(0));
    }

    #[test]
    fn test_other_category_is_not_requestable() {
        let err = parse_output::<ClassificationResult>(
            r#"{"category": "other", "reasoning": "x", "priority": 3}"#,
        )
        .unwrap_err();
        assert_eq!(err, SchemaError::InvalidCategory("other".to_string()));
    }

    #[test]
    fn test_priority_must_be_integer() {
        let err = parse_output::<ClassificationResult>(
            r#"{"category": "work", "reasoning": "x", "priority": "high"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::WrongType { field: "priority", .. }));
    }

    #[test]
    fn test_missing_field() {
        let err =
            parse_output::<ClassificationResult>(r#"{"category": "work", "priority": 3}"#)
                .unwrap_err();
        assert_eq!(err, SchemaError::MissingField("reasoning"));
    }

    #[test]
    fn test_no_json_at_all() {
        let err = parse_output::<ClassificationResult>("I cannot help with that.").unwrap_err();
        assert_eq!(err, SchemaError::MissingJson);
    }

    #[test]
    fn test_subtask_order_preserved() {
        let value = json!({
            "subtasks": [
                {"title": "C step", "description": "third alphabetically, first in order"},
                {"title": "A step", "description": "..."},
                {"title": "B step", "description": "..."}
            ],
            "reasoning": "order matters"
        });
        let list = SubtaskList::from_value(&value).unwrap();
        let titles: Vec<&str> = list.subtasks.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["C step", "A step", "B step"]);
    }

    #[test]
    fn test_subtask_reasoning_defaults() {
        let list = SubtaskList::from_value(&json!({"subtasks": []})).unwrap();
        assert!(list.subtasks.is_empty());
        assert_eq!(list.reasoning, DEFAULT_SUBTASK_REASONING);
    }

    #[test]
    fn test_subtask_missing_description_rejected() {
        let err = SubtaskList::from_value(&json!({"subtasks": [{"title": "Only a title"}]}))
            .unwrap_err();
        assert_eq!(err, SchemaError::MissingField("description"));
    }

    #[test]
    fn test_fallbacks() {
        let classification = ClassificationResult::fallback("timeout");
        assert_eq!(classification.category, TaskCategory::Other);
        assert_eq!(classification.priority, Priority::MEDIUM);
        assert_eq!(classification.reasoning, "Classification unavailable: timeout");

        let subtasks = SubtaskList::fallback("timeout");
        assert!(subtasks.subtasks.is_empty());
        assert_eq!(subtasks.reasoning, "Subtask generation unavailable: timeout");
    }

    #[test]
    fn test_priority_serde() {
        assert_eq!(serde_json::to_value(Priority::MEDIUM).unwrap(), json!(3));
        assert!(serde_json::from_value::<Priority>(json!(9)).is_err());
        assert_eq!(
            serde_json::from_value::<Priority>(json!(1)).unwrap(),
            Priority::new(1).unwrap()
        );
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(
            serde_json::to_value(AnalysisKind::Subtasks).unwrap(),
            json!("subtask_generation")
        );
        assert_eq!(AnalysisKind::Classification.to_string(), "classification");
    }
}
