//! Payload serializers.
//!
//! A [`PayloadSerializer`] turns a family's in-memory payload into the bytes
//! embedded in a stored record, and back. Form content is raw text; form
//! schemas are JSON documents.

use std::fmt::Debug;
use std::marker::PhantomData;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{StorageError, StorageResult};

/// Converts payloads to and from stored bytes.
///
/// `deserialize(serialize(v))` must reproduce the observable structure of `v`.
pub trait PayloadSerializer: Send + Sync + Debug {
    /// The in-memory payload type.
    type Value: Send + Sync;

    /// Encodes a payload.
    fn serialize(&self, value: &Self::Value) -> StorageResult<Vec<u8>>;

    /// Decodes a payload.
    fn deserialize(&self, bytes: &[u8]) -> StorageResult<Self::Value>;
}

/// Raw UTF-8 text serializer for form content.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentSerializer;

impl PayloadSerializer for ContentSerializer {
    type Value = String;

    fn serialize(&self, value: &String) -> StorageResult<Vec<u8>> {
        Ok(value.as_bytes().to_vec())
    }

    fn deserialize(&self, bytes: &[u8]) -> StorageResult<String> {
        String::from_utf8(bytes.to_vec()).map_err(|e| {
            StorageError::serialization(format!("content payload is not valid UTF-8: {e}"))
        })
    }
}

/// JSON serializer for any serde type.
pub struct JsonSerializer<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonSerializer<T> {
    /// Creates a serializer.
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonSerializer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for JsonSerializer<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> Debug for JsonSerializer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonSerializer")
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T> PayloadSerializer for JsonSerializer<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    type Value = T;

    fn serialize(&self, value: &T) -> StorageResult<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| {
            StorageError::serialization(format!("failed to serialize JSON payload: {e}"))
        })
    }

    fn deserialize(&self, bytes: &[u8]) -> StorageResult<T> {
        serde_json::from_slice(bytes).map_err(|e| {
            StorageError::serialization(format!("failed to deserialize JSON payload: {e}"))
        })
    }
}

/// Form schema document.
pub type FormSchema = Value;

/// Serializer for form schemas.
pub type SchemaSerializer = JsonSerializer<FormSchema>;

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn test_content_roundtrip() {
        let serializer = ContentSerializer;
        for text in ["", "<h1>Welcome</h1>", "héllo ✓"] {
            let bytes = serializer.serialize(&text.to_string()).unwrap();
            assert_eq!(serializer.deserialize(&bytes).unwrap(), text);
        }
    }

    #[test]
    fn test_content_rejects_invalid_utf8() {
        let err = ContentSerializer.deserialize(&[0xff, 0xfe]).unwrap_err();
        assert_eq!(err.code(), ErrorCode::SerializationError);
    }

    #[test]
    fn test_schema_roundtrip() {
        let serializer = SchemaSerializer::new();
        let schema = json!({
            "fields": [
                {"name": "email", "type": "email", "required": true},
                {"name": "age", "type": "number", "min": 18}
            ],
            "layout": {"columns": 2}
        });
        let bytes = serializer.serialize(&schema).unwrap();
        assert_eq!(serializer.deserialize(&bytes).unwrap(), schema);

        let empty = json!("");
        let bytes = serializer.serialize(&empty).unwrap();
        assert_eq!(serializer.deserialize(&bytes).unwrap(), empty);
    }

    #[test]
    fn test_typed_json_roundtrip() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Field {
            name: String,
            required: bool,
        }

        let serializer = JsonSerializer::<Vec<Field>>::new();
        let fields = vec![Field {
            name: "q1".to_string(),
            required: false,
        }];
        let bytes = serializer.serialize(&fields).unwrap();
        assert_eq!(serializer.deserialize(&bytes).unwrap(), fields);
        assert!(serializer.deserialize(b"{not json").is_err());
    }
}
