//! Loading and saving OVF packages.
//!
//! A package is either a `.ovf` descriptor with its files alongside it, or a
//! `.ova` archive, which is unpacked into a temporary directory for the
//! lifetime of the [`Package`].

use std::fs;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use tempfile::{NamedTempFile, TempDir};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::ova::{compute_sha256, Manifest, OvaWriter};
use crate::ovf::{FileReference, OvfDocument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageFormat {
    Ovf,
    Ova,
}

impl PackageFormat {
    /// Format implied by a path's extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("ovf") => Ok(PackageFormat::Ovf),
            Some("ova") => Ok(PackageFormat::Ova),
            _ => Err(Error::invalid_input(format!(
                "unsupported file type '{}' (expected .ovf or .ova)",
                path.display()
            ))),
        }
    }
}

/// An OVF package opened for editing.
#[derive(Debug)]
pub struct Package {
    source: PathBuf,
    descriptor_name: String,
    /// Directory referenced files are resolved against.
    dir: PathBuf,
    _extracted: Option<TempDir>,
    work: TempDir,
    document: OvfDocument,
}

impl Package {
    pub fn open(path: &Path) -> Result<Self> {
        let format = PackageFormat::from_path(path)?;
        let (dir, descriptor_name, extracted) = match format {
            PackageFormat::Ovf => {
                let name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .ok_or_else(|| {
                        Error::invalid_input(format!("unsupported file path '{}'", path.display()))
                    })?
                    .to_string();
                let dir = match path.parent() {
                    Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                    _ => PathBuf::from("."),
                };
                (dir, name, None)
            }
            PackageFormat::Ova => {
                let extracted = tempfile::tempdir().map_err(Error::io_simple)?;
                let name = unpack_ova(path, extracted.path())?;
                (extracted.path().to_path_buf(), name, Some(extracted))
            }
        };

        let descriptor = dir.join(&descriptor_name);
        let text = fs::read_to_string(&descriptor).map_err(|e| Error::io(e, &descriptor))?;
        let document = OvfDocument::parse(&text)?;
        debug!(
            "loaded {} ({} items, {} profiles)",
            descriptor.display(),
            document.items().len(),
            document.profiles().len()
        );

        Ok(Self {
            source: path.to_path_buf(),
            descriptor_name,
            dir,
            _extracted: extracted,
            work: tempfile::tempdir().map_err(Error::io_simple)?,
            document,
        })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn descriptor_name(&self) -> &str {
        &self.descriptor_name
    }

    pub fn document(&self) -> &OvfDocument {
        &self.document
    }

    pub fn document_mut(&mut self) -> &mut OvfDocument {
        &mut self.document
    }

    /// Scratch directory that lives as long as the package.
    pub fn work_dir(&self) -> &Path {
        self.work.path()
    }

    /// Where the content of a referenced file is read from.
    pub fn file_path(&self, file: &FileReference) -> PathBuf {
        source_path(&self.dir, file)
    }

    /// Write the package to `output`, as an OVA or as a descriptor with its
    /// files alongside, depending on the extension.
    pub fn save(&mut self, output: &Path) -> Result<()> {
        let format = PackageFormat::from_path(output)?;
        let stem = output
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| {
                Error::invalid_input(format!("unsupported output path '{}'", output.display()))
            })?;
        let descriptor_name = format!("{stem}.ovf");
        let manifest_name = format!("{stem}.mf");

        for file in &mut self.document.files {
            let path = source_path(&self.dir, file);
            let size = fs::metadata(&path).map_err(|e| Error::io(e, &path))?.len();
            if file.size != Some(size) {
                debug!("updating size of '{}' to {size}", file.href);
                file.size = Some(size);
            }
        }

        let xml = self.document.to_xml()?;
        let files: Vec<(String, PathBuf)> = self
            .document
            .files()
            .iter()
            .map(|file| (file.href.clone(), source_path(&self.dir, file)))
            .collect();
        let mut manifest = Manifest::from_files(&files)?;
        manifest.push_front(descriptor_name.as_str(), compute_sha256(xml.as_bytes()));

        let parent = match output.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        match format {
            PackageFormat::Ova => {
                let tmp = NamedTempFile::new_in(&parent).map_err(|e| Error::io(e, &parent))?;
                let mut writer = OvaWriter::new(BufWriter::new(tmp));
                writer.add_file(&descriptor_name, xml.as_bytes())?;
                for (name, path) in &files {
                    writer.add_path(name, path)?;
                }
                writer.add_file(&manifest_name, manifest.to_text().as_bytes())?;
                let tmp = writer
                    .finish()?
                    .into_inner()
                    .map_err(|e| Error::io(e.into_error(), output))?;
                tmp.persist(output).map_err(|e| Error::io(e.error, output))?;
            }
            PackageFormat::Ovf => {
                fs::create_dir_all(&parent).map_err(|e| Error::io(e, &parent))?;
                for (name, source) in &files {
                    let dest = parent.join(name);
                    if same_file(source, &dest) {
                        continue;
                    }
                    if let Some(dir) = dest.parent() {
                        fs::create_dir_all(dir).map_err(|e| Error::io(e, dir))?;
                    }
                    fs::copy(source, &dest).map_err(|e| Error::io(e, &dest))?;
                }
                write_atomic(output, xml.as_bytes())?;
                write_atomic(&parent.join(&manifest_name), manifest.to_text().as_bytes())?;
            }
        }

        info!("wrote {}", output.display());
        Ok(())
    }
}

fn source_path(dir: &Path, file: &FileReference) -> PathBuf {
    file.source.clone().unwrap_or_else(|| dir.join(&file.href))
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(parent).map_err(|e| Error::io(e, parent))?;
    std::io::Write::write_all(&mut tmp, data).map_err(|e| Error::io(e, path))?;
    tmp.persist(path).map_err(|e| Error::io(e.error, path))?;
    Ok(())
}

/// Unpack an OVA into `dest`, returning the descriptor's name.
fn unpack_ova(path: &Path, dest: &Path) -> Result<String> {
    let file = fs::File::open(path).map_err(|e| Error::io(e, path))?;
    let mut archive = tar::Archive::new(file);
    archive.set_preserve_mtime(false);
    archive.set_unpack_xattrs(false);

    let mut descriptor = None;
    let mut first = true;
    for entry in archive.entries().map_err(|e| Error::io(e, path))? {
        let mut entry = entry.map_err(|e| Error::io(e, path))?;
        let name = entry
            .path()
            .map_err(|e| Error::io(e, path))?
            .to_string_lossy()
            .into_owned();
        if name.to_ascii_lowercase().ends_with(".ovf") && descriptor.is_none() {
            if !first {
                warn!("descriptor '{name}' is not the first file in {}", path.display());
            }
            descriptor = Some(name.clone());
        }
        first = false;
        if !entry.unpack_in(dest).map_err(|e| Error::io(e, path))? {
            warn!("skipping archive member '{name}' outside the package directory");
        }
    }

    descriptor.ok_or_else(|| {
        Error::invalid_input(format!("no .ovf descriptor found in '{}'", path.display()))
    })
}
