use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub const UNTITLED: &str = "Untitled";

#[derive(Debug, Error)]
pub enum OutlineError {
    #[error("outline type mismatch at {path}: expected {expected}, found {found}")]
    TypeMismatch {
        path: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("outline is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// One slide in the outline. Keys the model adds beyond `title`/`points`
/// are kept as-is.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutlinePage {
    fields: Map<String, Value>,
}

impl OutlinePage {
    pub fn new(title: impl Into<String>, points: Vec<String>) -> Self {
        let mut fields = Map::new();
        fields.insert("title".to_string(), Value::String(title.into()));
        fields.insert(
            "points".to_string(),
            Value::Array(points.into_iter().map(Value::String).collect()),
        );
        Self { fields }
    }

    pub fn from_map(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    pub fn title(&self) -> Option<&str> {
        self.fields.get("title").and_then(Value::as_str)
    }

    pub fn part(&self) -> Option<&str> {
        self.fields.get("part").and_then(Value::as_str)
    }

    pub fn points(&self) -> Vec<&str> {
        self.fields
            .get("points")
            .and_then(Value::as_array)
            .map(|rows| rows.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.fields.clone())
    }

    /// Title as shown in the numbered outline. Absent, null and empty titles
    /// show as `Untitled`; a non-string title is shown as its JSON value.
    pub fn display_title(&self) -> Cow<'_, str> {
        match self.fields.get("title") {
            None | Some(Value::Null) => Cow::Borrowed(UNTITLED),
            Some(Value::String(title)) if title.is_empty() => Cow::Borrowed(UNTITLED),
            Some(Value::String(title)) => Cow::Borrowed(title.as_str()),
            Some(other) => Cow::Owned(other.to_string()),
        }
    }

    fn with_part(&self, part: &str) -> Self {
        let mut fields = self.fields.clone();
        fields.insert("part".to_string(), Value::String(part.to_string()));
        Self { fields }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct OutlinePart {
    pub name: String,
    pub pages: Vec<OutlinePage>,
    pub extra: Map<String, Value>,
}

impl OutlinePart {
    pub fn new(name: impl Into<String>, pages: Vec<OutlinePage>) -> Self {
        Self {
            name: name.into(),
            pages,
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutlineItem {
    Part(OutlinePart),
    Page(OutlinePage),
}

impl OutlineItem {
    fn from_value(value: Value, path: String) -> Result<Self, OutlineError> {
        let mut fields = match value {
            Value::Object(fields) => fields,
            other => return Err(mismatch(path, "object", &other)),
        };
        if !(fields.contains_key("part") && fields.contains_key("pages")) {
            return Ok(Self::Page(OutlinePage::from_map(fields)));
        }

        let name = match fields.remove("part").unwrap_or_default() {
            Value::String(name) => name,
            other => return Err(mismatch(format!("{path}.part"), "string", &other)),
        };
        let raw_pages = match fields.remove("pages").unwrap_or_default() {
            Value::Array(rows) => rows,
            other => return Err(mismatch(format!("{path}.pages"), "array", &other)),
        };
        let mut pages = Vec::with_capacity(raw_pages.len());
        for (idx, row) in raw_pages.into_iter().enumerate() {
            match row {
                Value::Object(page) => pages.push(OutlinePage::from_map(page)),
                other => {
                    return Err(mismatch(format!("{path}.pages[{idx}]"), "object", &other));
                }
            }
        }
        Ok(Self::Part(OutlinePart {
            name,
            pages,
            extra: fields,
        }))
    }

    fn to_value(&self) -> Value {
        match self {
            Self::Page(page) => page.to_value(),
            Self::Part(part) => {
                let mut fields = part.extra.clone();
                fields.insert("part".to_string(), Value::String(part.name.clone()));
                fields.insert(
                    "pages".to_string(),
                    Value::Array(part.pages.iter().map(OutlinePage::to_value).collect()),
                );
                Value::Object(fields)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Outline {
    items: Vec<OutlineItem>,
}

impl Outline {
    pub fn new(items: Vec<OutlineItem>) -> Self {
        Self { items }
    }

    pub fn from_pages(pages: Vec<OutlinePage>) -> Self {
        Self {
            items: pages.into_iter().map(OutlineItem::Page).collect(),
        }
    }

    pub fn from_json_str(raw: &str) -> Result<Self, OutlineError> {
        let value: Value = serde_json::from_str(raw)?;
        Self::from_value(value)
    }

    /// Decodes untrusted model output. Anything that is neither a part nor
    /// a page object is rejected rather than coerced.
    pub fn from_value(value: Value) -> Result<Self, OutlineError> {
        let rows = match value {
            Value::Array(rows) => rows,
            other => return Err(mismatch("$".to_string(), "array", &other)),
        };
        let items = rows
            .into_iter()
            .enumerate()
            .map(|(idx, row)| OutlineItem::from_value(row, format!("$[{idx}]")))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { items })
    }

    pub fn items(&self) -> &[OutlineItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn to_value(&self) -> Value {
        Value::Array(self.items.iter().map(OutlineItem::to_value).collect())
    }

    pub fn flatten(&self) -> Vec<OutlinePage> {
        flatten(self)
    }

    pub fn text(&self) -> String {
        outline_text(self)
    }
}

pub fn flatten(outline: &Outline) -> Vec<OutlinePage> {
    let mut pages = Vec::new();
    for item in outline.items() {
        match item {
            OutlineItem::Part(part) => {
                pages.extend(part.pages.iter().map(|page| page.with_part(&part.name)));
            }
            OutlineItem::Page(page) => pages.push(page.clone()),
        }
    }
    pages
}

pub fn outline_text(outline: &Outline) -> String {
    outline
        .items()
        .iter()
        .enumerate()
        .map(|(idx, item)| {
            let label = match item {
                OutlineItem::Part(part) => Cow::Borrowed(part.name.as_str()),
                OutlineItem::Page(page) => page.display_title(),
            };
            format!("{}. {label}", idx + 1)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn mismatch(path: String, expected: &'static str, found: &Value) -> OutlineError {
    OutlineError::TypeMismatch {
        path,
        expected,
        found: json_kind(found),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
