//! Path-based open for local files and remote objects.

use std::sync::Arc;

use fiberio_core::{kwarn, NetError, NetResult};
use fiberio_file::{LocalReadFile, ReadonlyFile};
use fiberio_http::{
    is_object_path, open_object_reader, HttpConnectionPool, ObjectPath, ReaderOptions,
    StreamingObjectReader,
};
use fiberio_runtime::BlockingTaskBridge;

/// Either kind of opened file.
pub enum AnyReadFile {
    Local(LocalReadFile),
    Object(StreamingObjectReader),
}

impl ReadonlyFile for AnyReadFile {
    async fn read(&mut self, offset: u64, buf: &mut [u8]) -> NetResult<usize> {
        match self {
            AnyReadFile::Local(f) => f.read(offset, buf).await,
            AnyReadFile::Object(f) => ReadonlyFile::read(f, offset, buf).await,
        }
    }

    async fn close(&mut self) -> NetResult<()> {
        match self {
            AnyReadFile::Local(f) => f.close().await,
            AnyReadFile::Object(f) => ReadonlyFile::close(f).await,
        }
    }

    fn size(&self) -> u64 {
        match self {
            AnyReadFile::Local(f) => f.size(),
            AnyReadFile::Object(f) => ReadonlyFile::size(f),
        }
    }
}

/// Where `open_readonly_file` sends each kind of path.
#[derive(Clone)]
pub struct FileSources {
    pub bridge: Arc<BlockingTaskBridge>,
    /// Object server for `gs://` paths, if any.
    pub objects: Option<HttpConnectionPool>,
    pub reader_options: ReaderOptions,
}

impl FileSources {
    pub fn local(bridge: &Arc<BlockingTaskBridge>) -> Self {
        Self {
            bridge: Arc::clone(bridge),
            objects: None,
            reader_options: ReaderOptions::default(),
        }
    }

    pub fn with_objects(mut self, pool: HttpConnectionPool) -> Self {
        self.objects = Some(pool);
        self
    }
}

/// Open `path` as a local file or, for `gs://bucket/object`, a remote object.
pub async fn open_readonly_file(path: &str, sources: &FileSources) -> NetResult<AnyReadFile> {
    if is_object_path(path) {
        let object = ObjectPath::parse(path)?;
        let pool = sources.objects.as_ref().ok_or_else(|| {
            NetError::invalid_argument(format!("{}: no object server configured", path))
        })?;
        let reader = open_object_reader(pool, &object, sources.reader_options.clone()).await?;
        return Ok(AnyReadFile::Object(reader));
    }
    Ok(AnyReadFile::Local(LocalReadFile::open(path, &sources.bridge).await?))
}

/// Open every path, logging and skipping the ones that fail.
pub async fn open_readonly_files(
    paths: &[String],
    sources: &FileSources,
) -> Vec<(String, AnyReadFile)> {
    let mut opened = Vec::with_capacity(paths.len());
    for path in paths {
        match open_readonly_file(path, sources).await {
            Ok(f) => opened.push((path.clone(), f)),
            Err(e) => kwarn!("skipping {}: {}", path, e),
        }
    }
    opened
}
