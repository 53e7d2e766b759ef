//! Payload schema for Qdrant points

use crate::error::{Error, Result};
use crate::models::{ChunkMetadata, IndexEntry, ScoredChunk};
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{ListValue, PointStruct, Struct, Value as QdrantValue};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// A point ready to be upserted to a vector index
#[derive(Debug, Clone, PartialEq)]
pub struct VectorPoint {
    pub chunk_id: String,
    pub vector: Vec<f32>,
    pub payload: ChunkPayload,
}

impl VectorPoint {
    pub fn new(entry: IndexEntry, vector: Vec<f32>) -> Self {
        Self {
            chunk_id: entry.chunk_id,
            vector,
            payload: ChunkPayload {
                text: entry.text,
                metadata: entry.metadata,
            },
        }
    }

    /// Convert to qdrant-client PointStruct
    pub fn to_point_struct(self) -> Result<PointStruct> {
        let payload_map = self.payload.to_qdrant_payload()?;
        Ok(PointStruct::new(self.chunk_id, self.vector, payload_map))
    }
}

/// Payload stored with each chunk: its text plus flattened metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkPayload {
    pub text: String,

    #[serde(flatten)]
    pub metadata: ChunkMetadata,
}

impl ChunkPayload {
    /// Convert to Qdrant payload format
    pub fn to_qdrant_payload(self) -> Result<HashMap<String, QdrantValue>> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map
                .into_iter()
                .map(|(k, v)| (k, json_to_qdrant_value(v)))
                .collect()),
            other => Err(Error::Qdrant(format!(
                "Chunk payload serialized to {} instead of an object",
                other
            ))),
        }
    }

    /// Rebuild from a Qdrant payload
    pub fn from_qdrant_payload(payload: HashMap<String, QdrantValue>) -> Result<Self> {
        let map: Map<String, Value> = payload
            .into_iter()
            .map(|(k, v)| (k, json_from_qdrant_value(v)))
            .collect();
        Self::try_from(map)
    }

    pub fn into_scored(self, chunk_id: String, similarity: f32) -> ScoredChunk {
        ScoredChunk {
            chunk_id,
            text: self.text,
            similarity,
            metadata: self.metadata,
        }
    }
}

impl TryFrom<Map<String, Value>> for ChunkPayload {
    type Error = Error;

    fn try_from(map: Map<String, Value>) -> Result<Self> {
        serde_json::from_value(Value::Object(map))
            .map_err(|e| Error::Qdrant(format!("Unreadable chunk payload: {}", e)))
    }
}

/// Convert serde_json Value to a Qdrant value
pub fn json_to_qdrant_value(v: Value) -> QdrantValue {
    let kind = match v {
        Value::Null => Kind::NullValue(0),
        Value::Bool(b) => Kind::BoolValue(b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Kind::IntegerValue(i),
            None => Kind::DoubleValue(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => Kind::StringValue(s),
        Value::Array(values) => Kind::ListValue(ListValue {
            values: values.into_iter().map(json_to_qdrant_value).collect(),
        }),
        Value::Object(fields) => Kind::StructValue(Struct {
            fields: fields
                .into_iter()
                .map(|(k, v)| (k, json_to_qdrant_value(v)))
                .collect(),
        }),
    };
    QdrantValue { kind: Some(kind) }
}

/// Convert Qdrant value to serde_json Value
pub fn json_from_qdrant_value(v: QdrantValue) -> Value {
    match v.kind {
        Some(Kind::NullValue(_)) => Value::Null,
        Some(Kind::BoolValue(b)) => Value::Bool(b),
        Some(Kind::IntegerValue(i)) => Value::Number(i.into()),
        Some(Kind::DoubleValue(d)) => serde_json::Number::from_f64(d)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Some(Kind::StringValue(s)) => Value::String(s),
        Some(Kind::ListValue(list)) => Value::Array(
            list.values
                .into_iter()
                .map(json_from_qdrant_value)
                .collect(),
        ),
        Some(Kind::StructValue(s)) => Value::Object(
            s.fields
                .into_iter()
                .map(|(k, v)| (k, json_from_qdrant_value(v)))
                .collect(),
        ),
        None => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn sample_payload() -> ChunkPayload {
        ChunkPayload {
            text: "Alice met Bob today.".to_string(),
            metadata: ChunkMetadata {
                owner_id: "alice".to_string(),
                document_id: "doc-456".to_string(),
                chunk_index: 3,
                start_offset: 120,
                end_offset: 140,
                title: Some("Notes".to_string()),
                category: Some("meetings".to_string()),
                tags: vec!["q3".to_string(), "roadmap".to_string()],
                created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                degraded: false,
            },
        }
    }

    #[test]
    fn test_payload_fields_are_flat() {
        let payload = sample_payload().to_qdrant_payload().unwrap();

        assert_eq!(
            payload.get("owner_id").and_then(|v| v.kind.clone()),
            Some(Kind::StringValue("alice".to_string()))
        );
        assert_eq!(
            payload.get("chunk_index").and_then(|v| v.kind.clone()),
            Some(Kind::IntegerValue(3))
        );
        assert_eq!(
            payload.get("degraded").and_then(|v| v.kind.clone()),
            Some(Kind::BoolValue(false))
        );
        assert!(matches!(
            payload.get("tags").and_then(|v| v.kind.clone()),
            Some(Kind::ListValue(_))
        ));
    }

    #[test]
    fn test_payload_survives_qdrant_conversion() {
        let original = sample_payload();
        let restored =
            ChunkPayload::from_qdrant_payload(original.clone().to_qdrant_payload().unwrap())
                .unwrap();
        assert_eq!(restored, original);
    }

    #[test]
    fn test_unreadable_payload_is_an_error() {
        let mut map = Map::new();
        map.insert("text".to_string(), Value::String("orphan".to_string()));
        assert!(ChunkPayload::try_from(map).is_err());
    }
}
