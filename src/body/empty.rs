use async_trait::async_trait;
use bytes::Bytes;

use super::BodySource;
use crate::error::Error;

/// A body with no content. Synthesizes no `Content-Type` header and reports
/// a size hint of zero, matching the behavior of a GET with no body.
#[derive(Debug, Clone, Copy, Default)]
pub struct Empty;

#[async_trait]
impl BodySource for Empty {
    fn size_hint(&self) -> Option<u64> {
        Some(0)
    }

    async fn read(&mut self) -> Result<Option<Bytes>, Error> {
        Ok(None)
    }

    async fn reset(&mut self) -> Result<(), Error> {
        Ok(())
    }
}
