//! OVF Edit Core Library
//!
//! Profile-aware editing of OVF descriptors and OVA packages.
//!
//! # Overview
//!
//! An OVF descriptor lists virtual hardware as RASD items, each optionally
//! scoped to a subset of deployment profiles. Edits are applied per profile:
//! items are split, extended and merged so that every profile sees exactly
//! the requested hardware and the descriptor stays minimal.
//!
//! # Modules
//!
//! - [`error`] - Error types and Result alias
//! - [`xml`] - Minimal element tree over quick-xml
//! - [`units`] - Memory and allocation unit helpers
//! - [`platform`] - Guest platform capability table and validation
//! - [`ovf`] - Descriptor model and the reconciliation engines
//! - [`image`] - Bootstrap disk image building
//! - [`ova`] - OVA archive creation and manifests
//! - [`package`] - Loading and saving `.ovf`/`.ova` packages
//! - [`edit`] - High-level hardware edits and config injection
//!
//! # Quick Start
//!
//! ```no_run
//! use ovfedit_core::{edit_hardware, HardwareEdit, Package, PlatformRegistry, Validator};
//! use std::path::Path;
//!
//! let mut package = Package::open(Path::new("/path/to/csr1000v.ova")).unwrap();
//! let registry = PlatformRegistry::builtin();
//! let platform = registry.lookup(package.document().product_identifier().as_deref());
//!
//! let edit = HardwareEdit {
//!     profiles: Some(vec!["2CPU-4GB".to_string()]),
//!     cpus: Some(2),
//!     ..HardwareEdit::default()
//! };
//! edit_hardware(package.document_mut(), &mut Validator::new(platform), &edit).unwrap();
//! package.save(Path::new("/path/to/output.ova")).unwrap();
//! ```

pub mod edit;
pub mod error;
pub mod image;
pub mod ova;
pub mod ovf;
pub mod package;
pub mod platform;
pub mod units;
pub mod xml;

pub use error::{Error, Result};

pub use edit::{
    edit_hardware, inject_config, package_info, ConfigInjection, DriveInfo, FileInfo,
    HardwareEdit, NicInfo, PackageInfo, ProfileInfo,
};
pub use image::{DiskImageBuilder, ExternalImageBuilder, ImageEntry, ImageFormat};
pub use ovf::OvfDocument;
pub use package::{Package, PackageFormat};
pub use platform::{Platform, PlatformRegistry, Validator};
