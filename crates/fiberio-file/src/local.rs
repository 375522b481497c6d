//! Local file read through the blocking bridge.
//!
//! Every filesystem call runs on a `BlockingTaskBridge` worker; the calling
//! fiber only awaits the result.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fiberio_core::{kdebug, NetError, NetResult};
use fiberio_runtime::BlockingTaskBridge;

use crate::ReadonlyFile;

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
            std::os::unix::fs::FileExt::read_at(file, buf, offset)
        }
    } else if #[cfg(windows)] {
        fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
            std::os::windows::fs::FileExt::seek_read(file, buf, offset)
        }
    } else {
        compile_error!("Unsupported platform");
    }
}

/// Fill `buf` from `offset` until full or EOF.
fn read_full_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    let mut done = 0;
    while done < buf.len() {
        match read_at(file, &mut buf[done..], offset + done as u64) {
            Ok(0) => break,
            Ok(n) => done += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(done)
}

fn map_open_error(path: &Path, e: io::Error) -> NetError {
    if e.kind() == io::ErrorKind::NotFound {
        NetError::NotFound(path.display().to_string())
    } else {
        e.into()
    }
}

pub struct LocalReadFile {
    path: PathBuf,
    file: Option<Arc<File>>,
    size: u64,
    bridge: Arc<BlockingTaskBridge>,
}

impl LocalReadFile {
    /// Open `path` on a bridge worker.
    pub async fn open(path: impl AsRef<Path>, bridge: &Arc<BlockingTaskBridge>) -> NetResult<Self> {
        let path = path.as_ref().to_path_buf();
        let p = path.clone();
        let (file, size) = bridge
            .run(move || -> NetResult<(File, u64)> {
                let file = File::open(&p).map_err(|e| map_open_error(&p, e))?;
                let meta = file.metadata()?;
                if meta.is_dir() {
                    return Err(NetError::invalid_argument(format!(
                        "{} is a directory",
                        p.display()
                    )));
                }
                Ok((file, meta.len()))
            })
            .await??;

        kdebug!("opened {} ({} bytes)", path.display(), size);
        Ok(Self {
            path,
            file: Some(Arc::new(file)),
            size,
            bridge: Arc::clone(bridge),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ReadonlyFile for LocalReadFile {
    async fn read(&mut self, offset: u64, buf: &mut [u8]) -> NetResult<usize> {
        let file = match &self.file {
            Some(f) => Arc::clone(f),
            None => return Err(NetError::invalid_argument("read on a closed file")),
        };
        if buf.is_empty() || offset >= self.size {
            return Ok(0);
        }

        let len = buf.len().min((self.size - offset) as usize);
        let chunk = self
            .bridge
            .run(move || -> io::Result<Vec<u8>> {
                let mut chunk = vec![0u8; len];
                let n = read_full_at(&file, &mut chunk, offset)?;
                chunk.truncate(n);
                Ok(chunk)
            })
            .await??;

        buf[..chunk.len()].copy_from_slice(&chunk);
        Ok(chunk.len())
    }

    async fn close(&mut self) -> NetResult<()> {
        // Last reference closes the descriptor; an in-flight read may hold another.
        self.file.take();
        Ok(())
    }

    fn size(&self) -> u64 {
        self.size
    }
}

impl std::fmt::Debug for LocalReadFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalReadFile")
            .field("path", &self.path)
            .field("size", &self.size)
            .field("open", &self.file.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_file(name: &str, contents: &[u8]) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "fiberio-local-{}-{}",
            std::process::id(),
            name
        ));
        let mut f = File::create(&path).unwrap();
        f.write_all(contents).unwrap();
        path
    }

    fn bridge() -> Arc<BlockingTaskBridge> {
        Arc::new(BlockingTaskBridge::new(2, 8).unwrap())
    }

    #[tokio::test]
    async fn test_read_whole_file_in_chunks() {
        let data: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
        let path = temp_file("chunks", &data);
        let bridge = bridge();

        let mut file = LocalReadFile::open(&path, &bridge).await.unwrap();
        assert_eq!(file.size(), 1000);

        let mut out = Vec::new();
        let mut buf = [0u8; 256];
        loop {
            let n = file.read(out.len() as u64, &mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        assert_eq!(out, data);
        file.close().await.unwrap();
        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn test_random_offsets() {
        let path = temp_file("offsets", b"0123456789");
        let bridge = bridge();
        let mut file = LocalReadFile::open(&path, &bridge).await.unwrap();

        let mut buf = [0u8; 3];
        assert_eq!(file.read(7, &mut buf).await.unwrap(), 3);
        assert_eq!(&buf, b"789");
        assert_eq!(file.read(2, &mut buf).await.unwrap(), 3);
        assert_eq!(&buf, b"234");
        assert_eq!(file.read(9, &mut buf).await.unwrap(), 1);
        assert_eq!(file.read(10, &mut buf).await.unwrap(), 0);
        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let bridge = bridge();
        let err = LocalReadFile::open("/definitely/not/here.bin", &bridge)
            .await
            .unwrap_err();
        assert!(matches!(err, NetError::NotFound(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_read_after_close_fails() {
        let path = temp_file("closed", b"abc");
        let bridge = bridge();
        let mut file = LocalReadFile::open(&path, &bridge).await.unwrap();
        file.close().await.unwrap();
        let mut buf = [0u8; 3];
        assert!(matches!(
            file.read(0, &mut buf).await,
            Err(NetError::InvalidArgument(_))
        ));
        std::fs::remove_file(path).ok();
    }
}
