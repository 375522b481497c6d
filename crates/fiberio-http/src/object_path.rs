//! `gs://bucket/object` addressing.

use std::fmt;

use fiberio_core::{NetError, NetResult};

pub const OBJECT_PATH_PREFIX: &str = "gs://";

/// True if `path` names a remote object rather than a local file.
pub fn is_object_path(path: &str) -> bool {
    path.starts_with(OBJECT_PATH_PREFIX)
}

/// Bucket + object name pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectPath {
    pub bucket: String,
    pub object: String,
}

impl ObjectPath {
    /// Split `gs://<bucket>/<object>`. Both parts must be non-empty.
    pub fn parse(path: &str) -> NetResult<Self> {
        let rest = path
            .strip_prefix(OBJECT_PATH_PREFIX)
            .ok_or_else(|| NetError::invalid_argument(format!("not an object path: {}", path)))?;
        let (bucket, object) = rest
            .split_once('/')
            .ok_or_else(|| NetError::invalid_argument(format!("missing object name: {}", path)))?;
        if bucket.is_empty() || object.is_empty() {
            return Err(NetError::invalid_argument(format!(
                "empty bucket or object: {}",
                path
            )));
        }
        Ok(Self {
            bucket: bucket.to_string(),
            object: object.to_string(),
        })
    }

    /// Request target on the object server: `/<bucket>/<object>`.
    pub fn request_path(&self) -> String {
        format!("/{}/{}", self.bucket, self.object)
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}/{}", OBJECT_PATH_PREFIX, self.bucket, self.object)
    }
}

impl std::str::FromStr for ObjectPath {
    type Err = NetError;

    fn from_str(s: &str) -> NetResult<Self> {
        Self::parse(s)
    }
}
