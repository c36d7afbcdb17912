use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use mime::Mime;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use super::BodySource;
use crate::error::Error;

const CHUNK_SIZE: usize = 64 * 1024;

/// A body streamed from a file on disk, read in fixed-size chunks rather
/// than loaded whole into memory. Replaying after a redirect seeks back to
/// the start of the file.
pub struct FileBody {
    path: PathBuf,
    file: File,
    len: u64,
    content_type: Option<Mime>,
}

impl FileBody {
    /// Opens `path` and reports its current length as the body size.
    pub async fn open(path: impl AsRef<Path>, content_type: Option<Mime>) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).await?;
        let len = file.metadata().await?.len();
        Ok(Self {
            path,
            file,
            len,
            content_type,
        })
    }
}

#[async_trait]
impl BodySource for FileBody {
    fn content_type(&self) -> Option<Mime> {
        self.content_type.clone()
    }

    fn size_hint(&self) -> Option<u64> {
        Some(self.len)
    }

    async fn read(&mut self) -> Result<Option<Bytes>, Error> {
        let mut buf = BytesMut::zeroed(CHUNK_SIZE);
        let n = self.file.read(&mut buf).await?;
        if n == 0 {
            Ok(None)
        } else {
            buf.truncate(n);
            Ok(Some(buf.freeze()))
        }
    }

    async fn reset(&mut self) -> Result<(), Error> {
        self.file.seek(std::io::SeekFrom::Start(0)).await?;
        Ok(())
    }
}

impl std::fmt::Debug for FileBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileBody")
            .field("path", &self.path)
            .field("len", &self.len)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn reads_in_chunks_and_resets() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"the quick brown fox").unwrap();
        tmp.flush().unwrap();

        let mut body = FileBody::open(tmp.path(), Some(mime::TEXT_PLAIN)).await.unwrap();
        assert_eq!(body.size_hint(), Some(20));

        let mut collected = Vec::new();
        while let Some(chunk) = body.read().await.unwrap() {
            collected.extend_from_slice(&chunk);
        }
        assert_eq!(collected, b"the quick brown fox");

        body.reset().await.unwrap();
        let chunk = body.read().await.unwrap().unwrap();
        assert_eq!(&chunk[..], b"the quick brown fox");
    }
}
