use async_trait::async_trait;
use bytes::Bytes;
use mime::Mime;
use serde::Serialize;

use super::BodySource;
use crate::error::Error;

/// A body serialized as `application/json`.
#[derive(Debug, Clone)]
pub struct JsonBody {
    encoded: Bytes,
    cursor: bool,
}

impl JsonBody {
    /// Serializes `value` to JSON.
    pub fn new(value: &impl Serialize) -> Result<Self, Error> {
        let encoded = serde_json::to_vec(value)?;
        Ok(Self {
            encoded: Bytes::from(encoded),
            cursor: false,
        })
    }
}

#[async_trait]
impl BodySource for JsonBody {
    fn content_type(&self) -> Option<Mime> {
        Some(mime::APPLICATION_JSON)
    }

    fn size_hint(&self) -> Option<u64> {
        Some(self.encoded.len() as u64)
    }

    async fn read(&mut self) -> Result<Option<Bytes>, Error> {
        if self.cursor {
            Ok(None)
        } else {
            self.cursor = true;
            Ok(Some(self.encoded.clone()))
        }
    }

    async fn reset(&mut self) -> Result<(), Error> {
        self.cursor = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn encodes_value() {
        let mut body = JsonBody::new(&json!({"a": 1})).unwrap();
        let chunk = body.read().await.unwrap().unwrap();
        assert_eq!(&chunk[..], br#"{"a":1}"#);
    }
}
