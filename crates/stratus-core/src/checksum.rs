//! Content-MD5 computation.
//!
//! Storage services exchange MD5 digests as base64 (`Content-MD5`). The body
//! copy feeds chunks through `ContentMd5` as they stream past; whole-file
//! digests are computed on demand in bounded chunks.

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use md5::{Digest, Md5};
use std::fs::File;
use std::io::Read;
use std::path::Path;

pub(crate) const BUF_SIZE: usize = 64 * 1024;

/// Incremental Content-MD5 hasher.
#[derive(Clone, Default)]
pub struct ContentMd5 {
    hasher: Md5,
}

impl ContentMd5 {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    /// Base64 digest, as sent in the `Content-MD5` header.
    pub fn finish(self) -> String {
        STANDARD.encode(self.hasher.finalize())
    }
}

/// Content-MD5 of an in-memory buffer.
pub fn md5_base64(data: &[u8]) -> String {
    let mut h = ContentMd5::new();
    h.update(data);
    h.finish()
}

/// Content-MD5 of a file, read in chunks to keep memory use bounded.
pub fn md5_base64_path(path: &Path) -> Result<String> {
    let mut f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut hasher = ContentMd5::new();
    let mut buf = vec![0u8; BUF_SIZE];
    loop {
        let n = f
            .read(&mut buf)
            .with_context(|| format!("read {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn md5_empty() {
        assert_eq!(md5_base64(b""), "1B2M2Y8AsgTpgAmY7PhCfg==");
    }

    #[test]
    fn md5_incremental_matches_one_shot() {
        let mut h = ContentMd5::new();
        h.update(b"hello ");
        h.update(b"world");
        assert_eq!(h.finish(), md5_base64(b"hello world"));
        assert_eq!(md5_base64(b"hello world"), "XrY7u+Ae7tCTyyK7j1rNww==");
    }

    #[test]
    fn md5_path_known_content() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"hello world").unwrap();
        f.flush().unwrap();
        assert_eq!(md5_base64_path(f.path()).unwrap(), "XrY7u+Ae7tCTyyK7j1rNww==");
    }
}
