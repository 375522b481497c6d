//! Copy a file to stdout through fiberio's readers.
//!
//! Local paths are read on the blocking bridge; `gs://bucket/object` paths
//! are streamed from an HTTP object server with transparent reopen on
//! truncation.
//!
//! Usage:
//!     ./target/release/fetch <path> [host:port]
//!
//! Environment:
//!     FIO_OBJECT_SERVER   object server authority (default 127.0.0.1:8080)
//!     FIO_FETCH_CHUNK     read size in bytes (default 65536)

use std::io::Write;
use std::time::Instant;

use fiberio::{
    env_get, env_get_str, init_logging, is_object_path, kerror, kinfo, open_readonly_file, HttpConnectionPool,
    NetError, NetResult, PoolConfig, ReadonlyFile, Runtime, RuntimeConfig,
};

fn run(path: String, authority: String) -> NetResult<u64> {
    let rt = Runtime::new(RuntimeConfig::from_env())?;

    let mut sources = rt.file_sources();
    if is_object_path(&path) {
        let config = PoolConfig {
            connect_timeout: rt.config().connect_timeout,
            ..PoolConfig::default()
        };
        sources = sources.with_objects(HttpConnectionPool::new(authority, config)?);
    }

    let chunk: usize = env_get("FIO_FETCH_CHUNK", 64 * 1024).max(1);
    let bridge = std::sync::Arc::clone(rt.bridge());

    rt.block_on(async move {
        let mut file = open_readonly_file(&path, &sources).await?;
        let mut buf = vec![0u8; chunk];
        let mut offset = 0u64;
        loop {
            let n = file.read(offset, &mut buf).await?;
            if n == 0 {
                break;
            }
            // stdout may block; keep it off the context thread.
            let out = buf[..n].to_vec();
            bridge
                .run(move || std::io::stdout().lock().write_all(&out))
                .await??;
            offset += n as u64;
        }
        file.close().await?;
        bridge.run(|| std::io::stdout().lock().flush()).await??;
        Ok::<u64, NetError>(offset)
    })?
}

fn main() {
    init_logging();
    let args: Vec<String> = std::env::args().collect();
    let Some(path) = args.get(1).cloned() else {
        eprintln!("usage: fetch <path> [host:port]");
        std::process::exit(2);
    };
    let authority = args
        .get(2)
        .cloned()
        .unwrap_or_else(|| env_get_str("FIO_OBJECT_SERVER", "127.0.0.1:8080"));

    let start = Instant::now();
    match run(path.clone(), authority) {
        Ok(bytes) => kinfo!(
            "fetch: {} -> {} bytes in {:.3}s",
            path,
            bytes,
            start.elapsed().as_secs_f64()
        ),
        Err(e) => {
            kerror!("fetch: {}: {}", path, e);
            std::process::exit(1);
        }
    }
}
