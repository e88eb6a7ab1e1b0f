//! Building bootstrap disk images with external helper programs.
//!
//! ISO images are made with `mkisofs`, `genisoimage` or `xorriso`. VMDK images
//! are made by formatting a raw FAT image with `mkfs.vfat`, filling it with
//! `mtools`, and converting it with `qemu-img`.

use std::env;
use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use crate::error::{Error, Result};
use crate::ovf::schema::DriveKind;

const ISO_TOOLS: [&str; 3] = ["mkisofs", "genisoimage", "xorriso"];
const FAT_TOOLS: [&str; 2] = ["mkfs.vfat", "mkfs.fat"];
const MIN_DISK_BYTES: u64 = 8 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Iso,
    Vmdk,
}

impl ImageFormat {
    /// Image format a drive of the given kind boots from.
    pub fn for_drive(kind: DriveKind) -> Self {
        match kind {
            DriveKind::Cdrom => ImageFormat::Iso,
            DriveKind::Harddisk => ImageFormat::Vmdk,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Iso => "iso",
            ImageFormat::Vmdk => "vmdk",
        }
    }
}

/// One file to place in an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageEntry {
    /// Path inside the image, `/`-separated.
    pub dest: String,
    pub source: PathBuf,
}

impl ImageEntry {
    pub fn new(dest: impl Into<String>, source: impl Into<PathBuf>) -> Self {
        Self {
            dest: dest.into(),
            source: source.into(),
        }
    }

    /// An entry named after the source's own file name.
    pub fn from_path(source: impl Into<PathBuf>) -> Result<Self> {
        let source = source.into();
        let dest = source
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                Error::invalid_input(format!("unsupported file path '{}'", source.display()))
            })?
            .to_string();
        Ok(Self { dest, source })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltImage {
    pub path: PathBuf,
    /// Size of the image file in bytes.
    pub size: u64,
    /// Virtual capacity in bytes, for disk images.
    pub capacity: Option<u64>,
}

/// Something that can pack files into a disk image.
pub trait DiskImageBuilder {
    fn build(&self, format: ImageFormat, entries: &[ImageEntry], output: &Path)
        -> Result<BuiltImage>;
}

/// Replace directory entries with the files below them, sorted by path.
pub fn expand_entries(entries: &[ImageEntry]) -> Result<Vec<ImageEntry>> {
    let mut expanded = Vec::new();
    for entry in entries {
        let metadata = fs::metadata(&entry.source).map_err(|e| Error::io(e, &entry.source))?;
        if metadata.is_dir() {
            let mut files = Vec::new();
            walk(&entry.source, &entry.dest, &mut files)?;
            files.sort_by(|a, b| a.dest.cmp(&b.dest));
            expanded.extend(files);
        } else {
            expanded.push(entry.clone());
        }
    }
    Ok(expanded)
}

fn walk(dir: &Path, prefix: &str, files: &mut Vec<ImageEntry>) -> Result<()> {
    for dirent in fs::read_dir(dir).map_err(|e| Error::io(e, dir))? {
        let dirent = dirent.map_err(|e| Error::io(e, dir))?;
        let path = dirent.path();
        let name = dirent.file_name();
        let name = name.to_str().ok_or_else(|| {
            Error::invalid_input(format!("unsupported file name in '{}'", dir.display()))
        })?;
        let dest = format!("{prefix}/{name}");
        if path.is_dir() {
            walk(&path, &dest, files)?;
        } else {
            files.push(ImageEntry::new(dest, path));
        }
    }
    Ok(())
}

/// Find an executable by name in a `PATH`-style list of directories.
pub fn find_in_path(program: &str, path_var: &OsStr) -> Option<PathBuf> {
    env::split_paths(path_var)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}

fn find_program(candidates: &[&str]) -> Option<PathBuf> {
    let path_var = env::var_os("PATH")?;
    candidates
        .iter()
        .find_map(|name| find_in_path(name, &path_var))
}

fn program_override(var: &str) -> Option<PathBuf> {
    env::var_os(var)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

fn run(program: &Path, args: &[OsString]) -> Result<String> {
    let name = program.display().to_string();
    debug!("running {name} {args:?}");
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|e| Error::helper(&name, format!("failed to execute: {e}")))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::helper(
            &name,
            format!(
                "exited with status {:?}: {}",
                output.status.code(),
                stderr.trim()
            ),
        ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Builds images by running helper programs found on `PATH`.
///
/// `OVFEDIT_ISO_TOOL` and `OVFEDIT_QEMU_IMG` name specific programs to use instead.
#[derive(Debug, Clone, Default)]
pub struct ExternalImageBuilder {
    iso_tool: Option<PathBuf>,
    fat_tool: Option<PathBuf>,
    mtools_dir: Option<PathBuf>,
    qemu_img: Option<PathBuf>,
}

impl ExternalImageBuilder {
    pub fn from_env() -> Self {
        let mcopy = find_program(&["mcopy"]);
        Self {
            iso_tool: program_override("OVFEDIT_ISO_TOOL").or_else(|| find_program(&ISO_TOOLS)),
            fat_tool: find_program(&FAT_TOOLS),
            mtools_dir: mcopy.and_then(|p| p.parent().map(Path::to_path_buf)),
            qemu_img: program_override("OVFEDIT_QEMU_IMG").or_else(|| find_program(&["qemu-img"])),
        }
    }

    fn require<'a>(tool: &'a Option<PathBuf>, what: &str) -> Result<&'a Path> {
        tool.as_deref()
            .ok_or_else(|| Error::helper(what, "not found on PATH"))
    }

    fn build_iso(&self, entries: &[ImageEntry], output: &Path) -> Result<()> {
        let tool = Self::require(&self.iso_tool, "mkisofs/genisoimage/xorriso")?;
        let mut args: Vec<OsString> = Vec::new();
        if tool.file_name().is_some_and(|n| n == "xorriso") {
            args.extend(["-as".into(), "mkisofs".into()]);
        }
        args.push("-output".into());
        args.push(output.as_os_str().to_owned());
        args.extend(
            ["-r", "-J", "-V", "config", "-graft-points"]
                .iter()
                .map(OsString::from),
        );
        for entry in entries {
            let mut graft = OsString::from(format!("{}=", entry.dest));
            graft.push(&entry.source);
            args.push(graft);
        }
        run(tool, &args)?;
        Ok(())
    }

    fn build_vmdk(&self, entries: &[ImageEntry], output: &Path) -> Result<u64> {
        let fat_tool = Self::require(&self.fat_tool, "mkfs.vfat")?;
        let mtools = Self::require(&self.mtools_dir, "mcopy")?;
        let qemu_img = Self::require(&self.qemu_img, "qemu-img")?;

        let content: u64 = entries
            .iter()
            .map(|entry| fs::metadata(&entry.source).map_or(0, |m| m.len()))
            .sum();
        let capacity = (content * 2).max(MIN_DISK_BYTES).next_multiple_of(1 << 20);

        // removed on drop, whichever helper fails
        let dir = output
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let scratch = tempfile::Builder::new()
            .prefix(".ovfedit-")
            .suffix(".img")
            .tempfile_in(dir)
            .map_err(|e| Error::io(e, dir))?;
        let raw = scratch.path().to_path_buf();
        scratch
            .as_file()
            .set_len(capacity)
            .map_err(|e| Error::io(e, &raw))?;

        run(fat_tool, &["-n".into(), "CONFIG".into(), raw.clone().into()])?;

        let image_arg = |rest: &[OsString]| {
            let mut args: Vec<OsString> = vec!["-i".into(), raw.clone().into()];
            args.extend_from_slice(rest);
            args
        };
        let mut made_dirs: Vec<String> = Vec::new();
        for entry in entries {
            let mut parent = String::new();
            let parts: Vec<&str> = entry.dest.split('/').filter(|p| !p.is_empty()).collect();
            for dir in parts.iter().take(parts.len().saturating_sub(1)) {
                parent.push('/');
                parent.push_str(dir);
                if !made_dirs.contains(&parent) {
                    run(&mtools.join("mmd"), &image_arg(&[format!("::{parent}").into()]))?;
                    made_dirs.push(parent.clone());
                }
            }
            run(
                &mtools.join("mcopy"),
                &image_arg(&[
                    entry.source.clone().into(),
                    format!("::/{}", parts.join("/")).into(),
                ]),
            )?;
        }

        run(
            qemu_img,
            &[
                "convert".into(),
                "-f".into(),
                "raw".into(),
                "-O".into(),
                "vmdk".into(),
                "-o".into(),
                "subformat=streamOptimized".into(),
                raw.clone().into(),
                output.as_os_str().to_owned(),
            ],
        )?;
        scratch.close().map_err(|e| Error::io(e, &raw))?;
        Ok(capacity)
    }
}

impl DiskImageBuilder for ExternalImageBuilder {
    fn build(
        &self,
        format: ImageFormat,
        entries: &[ImageEntry],
        output: &Path,
    ) -> Result<BuiltImage> {
        let entries = expand_entries(entries)?;
        let capacity = match format {
            ImageFormat::Iso => {
                self.build_iso(&entries, output)?;
                None
            }
            ImageFormat::Vmdk => Some(self.build_vmdk(&entries, output)?),
        };
        let size = fs::metadata(output)
            .map_err(|e| Error::io(e, output))?
            .len();
        debug!("built {} ({size} bytes)", output.display());
        Ok(BuiltImage {
            path: output.to_path_buf(),
            size,
            capacity,
        })
    }
}

/// List the files in an ISO image with `isoinfo`, for diagnostics.
pub fn list_iso_contents(iso: &Path) -> Result<Vec<String>> {
    let isoinfo = find_program(&["isoinfo"]).ok_or_else(|| Error::helper("isoinfo", "not found on PATH"))?;
    let listing = run(
        &isoinfo,
        &["-J".into(), "-f".into(), "-i".into(), iso.as_os_str().to_owned()],
    )?;
    Ok(listing
        .lines()
        .map(|line| line.trim().trim_start_matches('/'))
        .filter(|line| !line.is_empty())
        .map(|line| line.split(';').next().unwrap_or(line).to_string())
        .collect())
}
