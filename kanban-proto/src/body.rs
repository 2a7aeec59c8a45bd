//! Response bodies: task collections and error documents.
//!
//! Servers in the wild return the task collection either as a bare JSON
//! array or wrapped HAL-style under `_embedded.<key>`, where the key name
//! depends on the server's model class. [`decode_task_list`] accepts all
//! of these and reports which shape it saw.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::task::{FieldErrors, Task};

/// Collection keys under `_embedded` that are tried first, in order.
pub const KNOWN_COLLECTION_KEYS: &[&str] = &["taskList", "tasks", "taskDocList"];

/// Paging metadata attached to wrapped collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub size: u64,
    pub total_elements: u64,
    pub total_pages: u64,
    pub number: u64,
}

/// How a list response was laid out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListShape {
    /// `[ ... ]`
    BareArray,
    /// `{"_embedded": {"<key>": [ ... ]}}`
    Embedded(String),
    /// Wrapped object with paging data but no `_embedded` (an empty page).
    EmptyPage,
    /// Anything else; the collection resolves to empty.
    Unrecognized,
}

/// A decoded task collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskPage {
    pub tasks: Vec<Task>,
    pub page: Option<PageInfo>,
    pub shape: ListShape,
}

impl TaskPage {
    const fn empty(shape: ListShape, page: Option<PageInfo>) -> Self {
        Self {
            tasks: Vec::new(),
            page,
            shape,
        }
    }
}

/// Decodes a list response body.
///
/// Unrecognized layouts are not an error: they yield an empty page with
/// [`ListShape::Unrecognized`] so the caller can log them.
///
/// # Errors
///
/// Returns an error if the body is not JSON, or if the located collection
/// contains entries that are not tasks.
pub fn decode_task_list(bytes: &[u8]) -> Result<TaskPage, serde_json::Error> {
    let value: Value = serde_json::from_slice(bytes)?;
    match value {
        Value::Array(items) => Ok(TaskPage {
            tasks: decode_items(items)?,
            page: None,
            shape: ListShape::BareArray,
        }),
        Value::Object(mut map) => {
            let page = map
                .remove("page")
                .and_then(|p| serde_json::from_value::<PageInfo>(p).ok());
            let Some(Value::Object(mut embedded)) = map.remove("_embedded") else {
                return Ok(if page.is_some() {
                    TaskPage::empty(ListShape::EmptyPage, page)
                } else {
                    TaskPage::empty(ListShape::Unrecognized, None)
                });
            };
            let Some(key) = collection_key(&embedded) else {
                return Ok(TaskPage::empty(ListShape::Unrecognized, page));
            };
            let Some(Value::Array(items)) = embedded.remove(&key) else {
                return Ok(TaskPage::empty(ListShape::Unrecognized, page));
            };
            Ok(TaskPage {
                tasks: decode_items(items)?,
                page,
                shape: ListShape::Embedded(key),
            })
        }
        _ => Ok(TaskPage::empty(ListShape::Unrecognized, None)),
    }
}

/// Picks the collection key: a known name first, else the only array entry.
fn collection_key(embedded: &serde_json::Map<String, Value>) -> Option<String> {
    if let Some(known) = KNOWN_COLLECTION_KEYS
        .iter()
        .find(|k| embedded.get(**k).is_some_and(Value::is_array))
    {
        return Some((*known).to_string());
    }
    let mut arrays = embedded.iter().filter(|(_, v)| v.is_array());
    match (arrays.next(), arrays.next()) {
        (Some((key, _)), None) => Some(key.clone()),
        _ => None,
    }
}

fn decode_items(items: Vec<Value>) -> Result<Vec<Task>, serde_json::Error> {
    items.into_iter().map(serde_json::from_value).collect()
}

/// Error document returned on non-success responses.
///
/// Generic errors carry only `message`; validation failures (400) also
/// carry `errors`, a field → message map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "FieldErrors::is_empty")]
    pub errors: FieldErrors,
}

impl ErrorBody {
    /// Leniently parses an error body; anything unparseable becomes empty.
    #[must_use]
    pub fn parse(bytes: &[u8]) -> Self {
        serde_json::from_slice(bytes).unwrap_or_default()
    }

    /// A generic error document.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            errors: FieldErrors::new(),
        }
    }

    /// Human summary: the field messages joined, else `message`.
    #[must_use]
    pub fn summary(&self) -> Option<String> {
        if self.errors.is_empty() {
            self.message.clone()
        } else {
            Some(
                self.errors
                    .values()
                    .map(String::as_str)
                    .collect::<Vec<_>>()
                    .join(", "),
            )
        }
    }
}
