//! OVA archive creation and SHA-256 manifests.
//!
//! An OVA is a plain TAR archive holding the OVF descriptor first, then the
//! files it references, then the manifest.

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use rayon::prelude::*;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Hex SHA-256 digest of a byte slice.
pub fn compute_sha256(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

/// Hex SHA-256 digest of a file, streamed from disk.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|e| Error::io(e, path))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher).map_err(|e| Error::io(e, path))?;
    Ok(format!("{:x}", hasher.finalize()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub name: String,
    pub digest: String,
}

/// Contents of a `.mf` file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hash a list of `(name, path)` files in parallel, keeping their order.
    pub fn from_files(files: &[(String, PathBuf)]) -> Result<Self> {
        let entries = files
            .par_iter()
            .map(|(name, path)| {
                sha256_file(path).map(|digest| ManifestEntry {
                    name: name.clone(),
                    digest,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { entries })
    }

    pub fn push(&mut self, name: impl Into<String>, digest: impl Into<String>) {
        self.entries.push(ManifestEntry {
            name: name.into(),
            digest: digest.into(),
        });
    }

    /// Add an entry ahead of all others (the descriptor goes first).
    pub fn push_front(&mut self, name: impl Into<String>, digest: impl Into<String>) {
        self.entries.insert(
            0,
            ManifestEntry {
                name: name.into(),
                digest: digest.into(),
            },
        );
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    /// Render as `SHA256(name)= digest` lines.
    pub fn to_text(&self) -> String {
        self.entries
            .iter()
            .map(|entry| format!("SHA256({})= {}\n", entry.name, entry.digest))
            .collect()
    }
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

fn file_header(size: u64, mtime: u64) -> tar::Header {
    let mut header = tar::Header::new_ustar();
    header.set_entry_type(tar::EntryType::Regular);
    header.set_size(size);
    header.set_mode(0o644);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mtime(mtime);
    header
}

/// Streams files into an OVA archive.
pub struct OvaWriter<W: Write> {
    builder: tar::Builder<W>,
    mtime: u64,
}

impl<W: Write> OvaWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            builder: tar::Builder::new(writer),
            mtime: now(),
        }
    }

    /// Add a file from memory.
    pub fn add_file(&mut self, name: &str, data: &[u8]) -> Result<()> {
        let mut header = file_header(data.len() as u64, self.mtime);
        self.builder.append_data(&mut header, name, data)?;
        Ok(())
    }

    /// Add a file from disk without reading it into memory.
    pub fn add_path(&mut self, name: &str, path: &Path) -> Result<()> {
        let file = File::open(path).map_err(|e| Error::io(e, path))?;
        let size = file.metadata().map_err(|e| Error::io(e, path))?.len();
        let mut header = file_header(size, self.mtime);
        self.builder
            .append_data(&mut header, name, file)
            .map_err(|e| Error::io(e, path))?;
        Ok(())
    }

    /// Write the end-of-archive marker and hand back the underlying writer.
    pub fn finish(self) -> Result<W> {
        Ok(self.builder.into_inner()?)
    }
}
