//! Body sources for [`Responder::write_stream`](crate::Responder::write_stream).

use std::{
    future::Future,
    io::{self, Cursor},
    path::PathBuf,
    pin::Pin,
    task::{Context, Poll},
};
use tokio::{
    fs::File,
    io::{AsyncRead, ReadBuf},
};

/// A readable body source of known or unknown size.
///
/// The responder opens the device if needed, checks that it is readable and
/// then reads it to the end. A device that cannot be opened or is not
/// readable produces a `500 Internal Server Error` without a body instead.
///
/// # Examples
/// ```
/// use duet_http::Device;
/// use std::io::Cursor;
///
/// fn assert_device<D: Device>(_: &D) {}
///
/// let body = Cursor::new(b"in memory".to_vec());
/// assert_device(&body);
/// assert_eq!(body.size(), Some(9));
/// ```
pub trait Device: AsyncRead + Send + Unpin {
    fn is_open(&self) -> bool {
        true
    }

    /// Called by the responder when [`is_open`](Device::is_open) is `false`.
    fn open(&mut self) -> impl Future<Output = io::Result<()>> + Send {
        async { Ok(()) }
    }

    /// `false` when the device exists but cannot be read from.
    fn is_readable(&self) -> bool {
        true
    }

    /// Total number of bytes, when known up front.
    ///
    /// A known size becomes the `Content-Length`; otherwise the body is
    /// sent chunked on HTTP/1.1.
    fn size(&self) -> Option<u64> {
        None
    }
}

/// A file opened when the response starts streaming.
///
/// ```no_run
/// # async fn handler(mut responder: duet_http::Responder) {
/// use duet_http::{FileDevice, Headers, StatusCode};
///
/// let headers = Headers::from([("Content-Type", "text/plain")]);
/// let _ = responder
///     .write_stream(FileDevice::new("notes.txt"), &headers, StatusCode::OK)
///     .await;
/// # }
/// ```
#[derive(Debug)]
pub struct FileDevice {
    path: PathBuf,
    file: Option<File>,
    size: Option<u64>,
}

impl FileDevice {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
            size: None,
        }
    }
}

impl AsyncRead for FileDevice {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.file.as_mut() {
            Some(file) => Pin::new(file).poll_read(cx, buf),
            None => Poll::Ready(Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "file device is not open",
            ))),
        }
    }
}

impl Device for FileDevice {
    fn is_open(&self) -> bool {
        self.file.is_some()
    }

    async fn open(&mut self) -> io::Result<()> {
        let file = File::open(&self.path).await?;
        let metadata = file.metadata().await?;
        if !metadata.is_file() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"));
        }

        self.size = Some(metadata.len());
        self.file = Some(file);
        Ok(())
    }

    fn is_readable(&self) -> bool {
        self.file.is_some()
    }

    fn size(&self) -> Option<u64> {
        self.size
    }
}

/// Any async reader, optionally with a known size.
#[derive(Debug)]
pub struct ReaderDevice<R> {
    reader: R,
    size: Option<u64>,
}

impl<R: AsyncRead + Send + Unpin> ReaderDevice<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, size: None }
    }

    /// Declares the exact number of bytes the reader yields.
    pub fn with_size(reader: R, size: u64) -> Self {
        Self {
            reader,
            size: Some(size),
        }
    }
}

impl<R: AsyncRead + Send + Unpin> AsyncRead for ReaderDevice<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.reader).poll_read(cx, buf)
    }
}

impl<R: AsyncRead + Send + Unpin> Device for ReaderDevice<R> {
    fn size(&self) -> Option<u64> {
        self.size
    }
}

impl Device for &'static [u8] {
    fn size(&self) -> Option<u64> {
        Some(self.len() as u64)
    }
}

impl<T: AsRef<[u8]> + Send + Unpin> Device for Cursor<T> {
    fn size(&self) -> Option<u64> {
        let total = self.get_ref().as_ref().len() as u64;
        Some(total.saturating_sub(self.position()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn file_device() {
        let path = std::env::temp_dir().join(format!("duet_http_device_{}", std::process::id()));
        tokio::fs::write(&path, b"file body").await.unwrap();

        let mut device = FileDevice::new(&path);
        assert!(!device.is_open());
        assert!(!device.is_readable());

        device.open().await.unwrap();
        assert_eq!(device.size(), Some(9));

        let mut body = Vec::new();
        device.read_to_end(&mut body).await.unwrap();
        assert_eq!(body, b"file body");

        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn missing_file() {
        let mut device = FileDevice::new("/definitely/not/here");
        assert!(device.open().await.is_err());
        assert!(!device.is_open());
    }

    #[test]
    fn sizes() {
        let mut cursor = Cursor::new(vec![0u8; 10]);
        cursor.set_position(4);
        assert_eq!(cursor.size(), Some(6));
        assert_eq!(Device::size(&&b"abc"[..]), Some(3));
        assert_eq!(ReaderDevice::new(&b"abc"[..]).size(), None);
        assert_eq!(ReaderDevice::with_size(&b"abc"[..], 3).size(), Some(3));
    }
}
