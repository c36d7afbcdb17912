use async_trait::async_trait;
use bytes::Bytes;
use mime::Mime;

use super::BodySource;
use crate::error::Error;

/// A body made of bytes already held in memory. Trivially replayable, so
/// redirects always succeed in resetting it.
#[derive(Debug, Clone)]
pub struct BytesBody {
    bytes: Bytes,
    content_type: Option<Mime>,
    cursor: bool,
}

impl BytesBody {
    /// Wraps `bytes`, optionally tagging it with `content_type`.
    pub fn new(bytes: impl Into<Bytes>, content_type: Option<Mime>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type,
            cursor: false,
        }
    }
}

#[async_trait]
impl BodySource for BytesBody {
    fn content_type(&self) -> Option<Mime> {
        self.content_type.clone()
    }

    fn size_hint(&self) -> Option<u64> {
        Some(self.bytes.len() as u64)
    }

    async fn read(&mut self) -> Result<Option<Bytes>, Error> {
        if self.cursor {
            Ok(None)
        } else {
            self.cursor = true;
            Ok(Some(self.bytes.clone()))
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
    async fn reads_once_then_resets() {
        let mut body = BytesBody::new(Bytes::from_static(b"abc"), None);
        assert_eq!(body.read().await.unwrap().unwrap(), Bytes::from_static(b"abc"));
        assert!(body.read().await.unwrap().is_none());
        body.reset().await.unwrap();
        assert_eq!(body.read().await.unwrap().unwrap(), Bytes::from_static(b"abc"));
    }
}
