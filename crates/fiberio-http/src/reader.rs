//! # StreamingObjectReader
//!
//! Sequential reader over one HTTP GET body. Reads must be contiguous:
//! `read(offset, ..)` is only valid at the current cursor.
//!
//! If the body ends early (connection dropped mid-stream), the reader
//! discards the connection, reissues the GET with `Range: bytes=<cursor>-`
//! and carries on filling the caller's buffer. At most
//! `ReaderOptions::max_reopens` consecutive reopens may go by without new
//! bytes before the read fails with `Aborted`.

use http_body_util::BodyExt;
use hyper::body::{Bytes, Incoming};
use hyper::StatusCode;

use fiberio_core::{kdebug, kwarn, NetError, NetResult};
use fiberio_file::ReadonlyFile;

use crate::error::{from_hyper, is_truncation};
use crate::object_path::ObjectPath;
use crate::pool::{ClientHandle, HttpConnectionPool};
use crate::range::{object_size, range_header};

#[derive(Debug, Clone)]
pub struct ReaderOptions {
    /// Consecutive reopens without progress before giving up.
    pub max_reopens: u32,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self { max_reopens: 5 }
    }
}

pub struct StreamingObjectReader {
    pool: HttpConnectionPool,
    path: String,
    options: ReaderOptions,
    handle: Option<ClientHandle>,
    body: Option<Incoming>,
    /// Part of the last frame not yet handed out.
    pending: Bytes,
    size: Option<u64>,
    cursor: u64,
    done: bool,
    closed: bool,
    consecutive_reopens: u32,
    reopens: u64,
}

impl StreamingObjectReader {
    /// Reader for `path` on `pool`'s server. Nothing is sent until `open`
    /// or the first `read`.
    pub fn new(pool: &HttpConnectionPool, path: impl Into<String>, options: ReaderOptions) -> Self {
        Self::new_at(pool, path, 0, options)
    }

    /// Reader whose cursor starts at `offset`.
    pub fn new_at(
        pool: &HttpConnectionPool,
        path: impl Into<String>,
        offset: u64,
        options: ReaderOptions,
    ) -> Self {
        Self {
            pool: pool.clone(),
            path: path.into(),
            options,
            handle: None,
            body: None,
            pending: Bytes::new(),
            size: None,
            cursor: offset,
            done: false,
            closed: false,
            consecutive_reopens: 0,
            reopens: 0,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    #[inline]
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Total size, known once opened.
    #[inline]
    pub fn known_size(&self) -> Option<u64> {
        self.size
    }

    /// Times the stream was reissued after truncation.
    pub fn reopen_count(&self) -> u64 {
        self.reopens
    }

    pub fn is_done(&self) -> bool {
        self.done && self.pending.is_empty()
    }

    /// Drop the current body; an undrained connection is not reused.
    fn release_stream(&mut self) {
        self.body = None;
        self.pending = Bytes::new();
        if let Some(mut handle) = self.handle.take() {
            if !self.done {
                handle.schedule_reconnect();
            }
        }
    }

    /// Issue the GET at the current cursor and parse the response head.
    pub async fn open(&mut self) -> NetResult<()> {
        if self.closed {
            return Err(NetError::invalid_argument("open on a closed reader"));
        }
        self.release_stream();
        self.done = false;

        let range = (self.cursor > 0).then(|| range_header(self.cursor, None));
        let mut handle = self.pool.acquire().await?;
        let resp = handle.get(&self.path, range.as_deref()).await?;
        let status = resp.status();

        match status {
            StatusCode::OK if self.cursor > 0 => {
                handle.schedule_reconnect();
                return Err(NetError::protocol(format!(
                    "{}: server ignored range request at {}",
                    self.path, self.cursor
                )));
            }
            StatusCode::OK | StatusCode::PARTIAL_CONTENT => {}
            StatusCode::NOT_FOUND => {
                handle.schedule_reconnect();
                return Err(NetError::NotFound(self.path.clone()));
            }
            StatusCode::RANGE_NOT_SATISFIABLE if self.cursor > 0 => {
                handle.schedule_reconnect();
                kdebug!("{}: nothing past {}", self.path, self.cursor);
                self.size.get_or_insert(self.cursor);
                self.done = true;
                return Ok(());
            }
            s => {
                handle.schedule_reconnect();
                return Err(NetError::Http {
                    status: s.as_u16(),
                    reason: s.canonical_reason().unwrap_or("").to_string(),
                });
            }
        }

        if let Some(size) = object_size(status, resp.headers(), self.cursor) {
            match self.size {
                Some(known) if known != size => {
                    handle.schedule_reconnect();
                    return Err(NetError::protocol(format!(
                        "{}: size changed from {} to {}",
                        self.path, known, size
                    )));
                }
                _ => self.size = Some(size),
            }
        }

        kdebug!(
            "{}: opened at {} (size {:?}, status {})",
            self.path,
            self.cursor,
            self.size,
            status.as_u16()
        );
        self.handle = Some(handle);
        self.body = Some(resp.into_body());
        Ok(())
    }

    /// Count a truncation and reopen at the cursor, within budget.
    async fn reopen(&mut self) -> NetResult<()> {
        self.consecutive_reopens += 1;
        if self.consecutive_reopens > self.options.max_reopens {
            kwarn!(
                "{}: giving up at {} after {} reopens without progress",
                self.path,
                self.cursor,
                self.options.max_reopens
            );
            self.release_stream();
            return Err(NetError::Aborted);
        }
        kwarn!("{}: stream truncated at {}; reopening", self.path, self.cursor);
        self.reopens += 1;
        self.open().await
    }

    /// Body finished. Early if the known size was not reached.
    fn body_ended(&self) -> bool {
        match self.size {
            Some(size) => self.cursor >= size,
            None => true,
        }
    }

    /// Read up to `buf.len()` bytes at `offset`, which must equal the cursor.
    ///
    /// Returns 0 at end of object.
    pub async fn read(&mut self, offset: u64, buf: &mut [u8]) -> NetResult<usize> {
        if self.closed {
            return Err(NetError::invalid_argument("read on a closed reader"));
        }
        if offset != self.cursor {
            return Err(NetError::invalid_argument(format!(
                "non-sequential read of {} at offset {} (cursor {})",
                self.path, offset, self.cursor
            )));
        }
        if buf.is_empty() || self.size.is_some_and(|s| self.cursor >= s) {
            return Ok(0);
        }
        if self.body.is_none() && !self.done {
            self.open().await?;
        }

        let mut filled = 0;
        while filled < buf.len() {
            if !self.pending.is_empty() {
                let n = self.pending.len().min(buf.len() - filled);
                let chunk = self.pending.split_to(n);
                buf[filled..filled + n].copy_from_slice(&chunk);
                filled += n;
                self.cursor += n as u64;
                continue;
            }
            if self.done {
                break;
            }
            let Some(body) = self.body.as_mut() else {
                self.reopen().await?;
                continue;
            };

            match body.frame().await {
                Some(Ok(frame)) => {
                    if let Ok(data) = frame.into_data() {
                        if !data.is_empty() {
                            self.consecutive_reopens = 0;
                        }
                        self.pending = data;
                    }
                }
                None if self.body_ended() => {
                    self.done = true;
                    // Fully drained: the connection can go back to the pool.
                    self.body = None;
                    self.handle = None;
                }
                None => self.reopen().await?,
                Some(Err(e)) if is_truncation(&e) => {
                    kdebug!("{}: body error at {}: {}", self.path, self.cursor, e);
                    self.reopen().await?;
                }
                Some(Err(e)) => {
                    self.release_stream();
                    return Err(from_hyper(e));
                }
            }
        }
        Ok(filled)
    }

    /// Finish with the reader. An undrained stream's connection is
    /// scheduled for reconnection rather than drained.
    pub async fn close(&mut self) -> NetResult<()> {
        self.release_stream();
        self.closed = true;
        Ok(())
    }
}

impl ReadonlyFile for StreamingObjectReader {
    async fn read(&mut self, offset: u64, buf: &mut [u8]) -> NetResult<usize> {
        StreamingObjectReader::read(self, offset, buf).await
    }

    async fn close(&mut self) -> NetResult<()> {
        StreamingObjectReader::close(self).await
    }

    fn size(&self) -> u64 {
        self.size.unwrap_or(0)
    }
}

impl Drop for StreamingObjectReader {
    fn drop(&mut self) {
        self.release_stream();
    }
}

/// Open a reader for `gs://bucket/object` on `pool`'s server.
pub async fn open_object_reader(
    pool: &HttpConnectionPool,
    path: &ObjectPath,
    options: ReaderOptions,
) -> NetResult<StreamingObjectReader> {
    let mut reader = StreamingObjectReader::new(pool, path.request_path(), options);
    reader.open().await?;
    Ok(reader)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::PoolConfig;
    use crate::test_server::{TestServer, Truncate};

    fn object(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 % 256) as u8).collect()
    }

    async fn read_all(reader: &mut StreamingObjectReader, chunk: usize) -> NetResult<Vec<u8>> {
        let mut out = Vec::new();
        let mut buf = vec![0u8; chunk];
        loop {
            let n = reader.read(out.len() as u64, &mut buf).await?;
            if n == 0 {
                return Ok(out);
            }
            out.extend_from_slice(&buf[..n]);
        }
    }

    fn pool_for(server: &TestServer) -> HttpConnectionPool {
        HttpConnectionPool::new(server.authority.clone(), PoolConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_uninterrupted_read() {
        let data = object(1000);
        let server = TestServer::start(vec![("/b/o", data.clone())], Truncate::Never).await;
        let pool = pool_for(&server);

        let mut r = StreamingObjectReader::new(&pool, "/b/o", ReaderOptions::default());
        let got = read_all(&mut r, 256).await.unwrap();
        assert_eq!(got, data);
        assert_eq!(r.known_size(), Some(1000));
        assert_eq!(ReadonlyFile::size(&r), 1000);
        assert_eq!(r.reopen_count(), 0);
        assert!(r.is_done());

        // EOF is sticky and costs no further request.
        let mut buf = [0u8; 16];
        assert_eq!(r.read(1000, &mut buf).await.unwrap(), 0);
        assert_eq!(server.requests(), 1);
    }

    #[tokio::test]
    async fn test_resumes_after_truncation() {
        let data = object(1000);
        let server = TestServer::start(vec![("/b/o", data.clone())], Truncate::FirstAt(600)).await;
        let pool = pool_for(&server);

        let mut r = StreamingObjectReader::new(&pool, "/b/o", ReaderOptions::default());
        let mut sizes = Vec::new();
        let mut out = Vec::new();
        let mut buf = [0u8; 256];
        loop {
            let n = r.read(out.len() as u64, &mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            sizes.push(n);
            out.extend_from_slice(&buf[..n]);
        }

        assert_eq!(out, data);
        assert_eq!(sizes, vec![256, 256, 256, 232]);
        assert_eq!(r.reopen_count(), 1);
        assert_eq!(
            server.ranges(),
            vec![None, Some("bytes=600-".to_string())]
        );
    }

    #[tokio::test]
    async fn test_non_sequential_read_is_rejected_without_request() {
        let server = TestServer::start(vec![("/b/o", object(100))], Truncate::Never).await;
        let pool = pool_for(&server);

        let mut r = StreamingObjectReader::new(&pool, "/b/o", ReaderOptions::default());
        let mut buf = [0u8; 10];
        assert!(matches!(
            r.read(5, &mut buf).await,
            Err(NetError::InvalidArgument(_))
        ));
        assert_eq!(server.requests(), 0);

        assert_eq!(r.read(0, &mut buf).await.unwrap(), 10);
        assert!(matches!(
            r.read(0, &mut buf).await,
            Err(NetError::InvalidArgument(_))
        ));
        assert_eq!(server.requests(), 1);
        assert_eq!(r.cursor(), 10);
    }

    #[tokio::test]
    async fn test_missing_object() {
        let server = TestServer::start(vec![], Truncate::Never).await;
        let pool = pool_for(&server);
        let path = ObjectPath::parse("gs://b/missing").unwrap();
        let err = open_object_reader(&pool, &path, ReaderOptions::default())
            .await
            .err()
            .unwrap();
        assert_eq!(err, NetError::NotFound("/b/missing".to_string()));
    }

    #[tokio::test]
    async fn test_open_past_end_is_eof() {
        let server = TestServer::start(vec![("/b/o", object(100))], Truncate::Never).await;
        let pool = pool_for(&server);

        let mut r = StreamingObjectReader::new_at(&pool, "/b/o", 100, ReaderOptions::default());
        let mut buf = [0u8; 10];
        assert_eq!(r.read(100, &mut buf).await.unwrap(), 0);
        assert_eq!(server.ranges(), vec![Some("bytes=100-".to_string())]);
    }

    #[tokio::test]
    async fn test_gives_up_without_progress() {
        let server = TestServer::start(vec![("/b/o", object(100))], Truncate::Always).await;
        let pool = pool_for(&server);

        let mut r = StreamingObjectReader::new(&pool, "/b/o", ReaderOptions { max_reopens: 2 });
        let mut buf = [0u8; 10];
        assert_eq!(r.read(0, &mut buf).await, Err(NetError::Aborted));
        assert_eq!(r.reopen_count(), 2);
        assert_eq!(server.requests(), 3);
    }

    #[tokio::test]
    async fn test_close_mid_stream() {
        let server = TestServer::start(vec![("/b/o", object(1000))], Truncate::Never).await;
        let pool = pool_for(&server);

        let mut r = StreamingObjectReader::new(&pool, "/b/o", ReaderOptions::default());
        let mut buf = [0u8; 10];
        r.read(0, &mut buf).await.unwrap();
        r.close().await.unwrap();
        assert_eq!(pool.idle_count(), 0, "undrained connection must not be pooled");
        assert!(matches!(
            r.read(10, &mut buf).await,
            Err(NetError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_object_path_reader() {
        let data = object(300);
        let server = TestServer::start(vec![("/logs/day/1", data.clone())], Truncate::Never).await;
        let pool = pool_for(&server);

        let path = ObjectPath::parse("gs://logs/day/1").unwrap();
        let mut r = open_object_reader(&pool, &path, ReaderOptions::default())
            .await
            .unwrap();
        assert_eq!(r.known_size(), Some(300));
        assert_eq!(read_all(&mut r, 64).await.unwrap(), data);
    }
}
