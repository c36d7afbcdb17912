use async_trait::async_trait;
use bytes::Bytes;
use mime::Mime;
use serde::Serialize;

use super::BodySource;
use crate::error::Error;

/// A body serialized as `application/x-www-form-urlencoded`.
#[derive(Debug, Clone)]
pub struct FormBody {
    encoded: Bytes,
    cursor: bool,
}

impl FormBody {
    /// Serializes `value` (typically a `HashMap` or a `#[derive(Serialize)]`
    /// struct of string-like fields) as a urlencoded form.
    pub fn new(value: &impl Serialize) -> Result<Self, Error> {
        let encoded = serde_urlencoded::to_string(value)?;
        Ok(Self {
            encoded: Bytes::from(encoded),
            cursor: false,
        })
    }
}

#[async_trait]
impl BodySource for FormBody {
    fn content_type(&self) -> Option<Mime> {
        Some(mime::APPLICATION_WWW_FORM_URLENCODED)
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

    #[tokio::test]
    async fn encodes_pairs() {
        let pairs = [("a", "1"), ("b", "two words")];
        let mut body = FormBody::new(&pairs).unwrap();
        let chunk = body.read().await.unwrap().unwrap();
        assert_eq!(&chunk[..], b"a=1&b=two+words");
    }
}
