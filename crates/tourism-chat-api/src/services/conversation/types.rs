use serde::Serialize;
use serde_json::Value;

/// One nearest-neighbour hit from the vector index. Lives for a single request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedItem {
    pub id: String,
    pub score: f32,
    pub metadata: ItemMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ItemMetadata {
    pub name: Option<String>,
    pub description: Option<String>,
}

impl ItemMetadata {
    pub fn new(name: Option<&str>, description: Option<&str>) -> Self {
        Self {
            name: name.map(str::to_string),
            description: description.map(str::to_string),
        }
    }

    /// Pick `name` and `description` out of an index metadata object.
    ///
    /// Numbers and booleans are stringified; null, missing and nested values
    /// count as absent.
    pub fn from_json(value: Option<&Value>) -> Self {
        let field = |key: &str| value.and_then(|v| v.get(key)).and_then(scalar_to_string);
        Self {
            name: field("name"),
            description: field("description"),
        }
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
