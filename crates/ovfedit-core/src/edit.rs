//! High-level operations: hardware edits, config injection, package summary.
//!
//! These validate every requested value against the guest platform before
//! touching the document, then drive the reconciliation, network and
//! placeholder engines.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::image::{DiskImageBuilder, ImageEntry, ImageFormat};
use crate::ovf::placeholder::{DrivePlacement, ImageContent};
use crate::ovf::{ControllerKind, DriveKind, NetworkEntry, OvfDocument, ProfileSelection, ResourceType};
use crate::package::Package;
use crate::platform::{HardwareKind, Platform, Validator};
use crate::units::{allocation_unit_bytes, quantity_to_mib, MIB_ALLOCATION_UNITS};

/// Requested hardware changes. Unset fields and empty lists are left alone.
#[derive(Debug, Clone, Default)]
pub struct HardwareEdit {
    /// Profiles to edit, created if missing. `None` edits every profile.
    pub profiles: Option<Vec<String>>,
    /// Delete every profile not listed in `profiles`.
    pub delete_all_other_profiles: bool,
    pub cpus: Option<u64>,
    pub memory_mib: Option<u64>,
    pub nics: Option<u64>,
    pub nic_type: Option<String>,
    pub nic_names: Vec<String>,
    pub mac_addresses: Vec<String>,
    pub nic_networks: Vec<String>,
    pub network_descriptions: Vec<String>,
    pub serial_ports: Option<u64>,
    pub serial_connectivity: Vec<String>,
    pub ide_subtypes: Vec<String>,
    pub scsi_subtypes: Vec<String>,
}

impl HardwareEdit {
    fn is_empty(&self) -> bool {
        !self.delete_all_other_profiles
            && self.cpus.is_none()
            && self.memory_mib.is_none()
            && self.nics.is_none()
            && self.nic_type.is_none()
            && self.nic_names.is_empty()
            && self.mac_addresses.is_empty()
            && self.nic_networks.is_empty()
            && self.serial_ports.is_none()
            && self.serial_connectivity.is_empty()
            && self.ide_subtypes.is_empty()
            && self.scsi_subtypes.is_empty()
    }
}

fn count(value: u64) -> Result<usize> {
    usize::try_from(value).map_err(|_| Error::invalid_input(format!("count {value} is too large")))
}

/// Apply a set of hardware changes to a document.
pub fn edit_hardware(
    doc: &mut OvfDocument,
    validator: &mut Validator<'_>,
    edit: &HardwareEdit,
) -> Result<()> {
    let platform = validator.platform();

    if edit.is_empty() && edit.profiles.is_none() {
        warn!("no hardware changes requested, nothing to do");
        return Ok(());
    }
    if edit.delete_all_other_profiles && edit.profiles.is_none() {
        return Err(Error::invalid_input(
            "deleting all other profiles requires a list of profiles to keep",
        ));
    }
    if !edit.network_descriptions.is_empty() && edit.nic_networks.is_empty() {
        return Err(Error::invalid_input(
            "network descriptions can only be given together with NIC networks",
        ));
    }

    if let Some(cpus) = edit.cpus {
        validator.validate_count(HardwareKind::Cpus, cpus)?;
    }
    if let Some(memory) = edit.memory_mib {
        validator.validate_count(HardwareKind::Memory, memory)?;
    }
    if let Some(nics) = edit.nics {
        validator.validate_count(HardwareKind::NicCount, nics)?;
    }
    if let Some(serials) = edit.serial_ports {
        validator.validate_count(HardwareKind::SerialCount, serials)?;
    }
    let nic_type = edit
        .nic_type
        .as_deref()
        .map(|requested| platform.normalize_nic_type(requested))
        .transpose()?;

    if let Some(profiles) = &edit.profiles {
        for profile in profiles {
            doc.ensure_profile(profile, None, None)?;
        }
        if edit.delete_all_other_profiles {
            doc.delete_profiles_except(profiles);
        }
    }
    let selection = ProfileSelection::from_list(edit.profiles.as_deref());

    if let Some(cpus) = edit.cpus {
        doc.set_cpus(cpus, &selection)?;
    }
    if let Some(memory) = edit.memory_mib {
        doc.set_memory(memory, &selection)?;
    }
    if let Some(nics) = edit.nics {
        doc.set_item_count(ResourceType::EthernetAdapter, count(nics)?, &selection, platform)?;
    }
    if let Some(nic_type) = nic_type {
        doc.set_nic_type(nic_type, &selection)?;
    }
    if !edit.nic_networks.is_empty() {
        let descriptions =
            (!edit.network_descriptions.is_empty()).then_some(edit.network_descriptions.as_slice());
        doc.set_nic_networks(&edit.nic_networks, descriptions, &selection)?;
    }
    if !edit.mac_addresses.is_empty() {
        doc.set_nic_macs(&edit.mac_addresses, &selection)?;
    }
    if !edit.nic_names.is_empty() {
        doc.set_nic_names(&edit.nic_names, &selection)?;
    }
    if edit.nics.is_some() || !edit.nic_networks.is_empty() {
        doc.garbage_collect_networks();
    }

    if let Some(serials) = edit.serial_ports {
        doc.set_item_count(ResourceType::SerialPort, count(serials)?, &selection, platform)?;
    }
    if !edit.serial_connectivity.is_empty() {
        doc.set_serial_connectivity(&edit.serial_connectivity, &selection)?;
    }
    if !edit.ide_subtypes.is_empty() {
        doc.set_controller_subtypes(ControllerKind::Ide, &edit.ide_subtypes, &selection)?;
    }
    if !edit.scsi_subtypes.is_empty() {
        doc.set_controller_subtypes(ControllerKind::Scsi, &edit.scsi_subtypes, &selection)?;
    }
    Ok(())
}

/// Files to embed in a bootstrap image.
#[derive(Debug, Clone, Default)]
pub struct ConfigInjection {
    pub config_file: Option<PathBuf>,
    pub secondary_config_file: Option<PathBuf>,
    /// Additional files or directories copied into the image as-is.
    pub extra_files: Vec<PathBuf>,
}

fn config_entry(
    path: &Path,
    slot: Option<&str>,
    what: &str,
    platform: &Platform,
) -> Result<ImageEntry> {
    let name = slot.ok_or_else(|| {
        Error::invalid_input(format!(
            "platform {} does not support a {what} configuration file",
            platform.name
        ))
    })?;
    if !path.is_file() {
        return Err(Error::invalid_input(format!(
            "{what} configuration file '{}' does not exist",
            path.display()
        )));
    }
    Ok(ImageEntry::new(name, path))
}

/// Build a bootstrap image from configuration files and attach it to the
/// package's bootstrap drive.
pub fn inject_config(
    package: &mut Package,
    platform: &Platform,
    builder: &dyn DiskImageBuilder,
    request: &ConfigInjection,
) -> Result<DrivePlacement> {
    if request.config_file.is_none()
        && request.secondary_config_file.is_none()
        && request.extra_files.is_empty()
    {
        return Err(Error::invalid_input("no configuration files given"));
    }

    let mut entries = Vec::new();
    if let Some(path) = &request.config_file {
        entries.push(config_entry(path, platform.config_file, "primary", platform)?);
    }
    if let Some(path) = &request.secondary_config_file {
        entries.push(config_entry(
            path,
            platform.secondary_config_file,
            "secondary",
            platform,
        )?);
    }
    for path in &request.extra_files {
        if !path.exists() {
            return Err(Error::invalid_input(format!(
                "extra file '{}' does not exist",
                path.display()
            )));
        }
        entries.push(ImageEntry::from_path(path)?);
    }

    let kind = platform.bootstrap_drive_kind()?;
    let format = ImageFormat::for_drive(kind);
    let href = format!("config.{}", format.extension());
    let output = package.work_dir().join(&href);
    let built = builder.build(format, &entries, &output)?;
    info!("built {href} for {} ({} files)", platform.name, entries.len());

    package.document_mut().attach_bootstrap_image(
        kind,
        platform.controller_type(kind),
        ImageContent {
            href: &href,
            source: &built.path,
            size: built.size,
            capacity: built.capacity,
        },
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NicInfo {
    pub instance_id: u32,
    pub name: Option<String>,
    pub nic_type: Option<String>,
    pub network: Option<String>,
    pub mac: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriveInfo {
    pub instance_id: u32,
    pub kind: DriveKind,
    pub name: Option<String>,
    /// Name of the backing file, if any.
    pub file: Option<String>,
}

/// Hardware one profile sees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileInfo {
    /// `None` for a document without profiles.
    pub id: Option<String>,
    pub label: Option<String>,
    pub default: bool,
    pub cpus: Option<u64>,
    pub memory_mib: Option<u64>,
    pub nics: Vec<NicInfo>,
    pub serial_ports: usize,
    pub drives: Vec<DriveInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub href: String,
    pub size: Option<u64>,
    /// Capacity of the disk this file backs, in bytes.
    pub capacity: Option<u64>,
}

/// Summary of a package for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageInfo {
    pub name: Option<String>,
    pub product: Option<String>,
    pub platform: &'static str,
    pub profiles: Vec<ProfileInfo>,
    pub networks: Vec<NetworkEntry>,
    pub files: Vec<FileInfo>,
}

fn profile_info(doc: &OvfDocument, profile: Option<&str>) -> ProfileInfo {
    let first = |rt: ResourceType| {
        doc.visible_devices(rt, profile)
            .first()
            .and_then(|&id| doc.effective_item(id, profile))
    };
    let memory_mib = first(ResourceType::Memory).and_then(|item| {
        let units = item.get("AllocationUnits").unwrap_or(MIB_ALLOCATION_UNITS);
        quantity_to_mib(item.virtual_quantity()?, units)
    });

    let nics = doc
        .visible_devices(ResourceType::EthernetAdapter, profile)
        .into_iter()
        .filter_map(|id| doc.effective_item(id, profile))
        .map(|item| NicInfo {
            instance_id: item.instance_id,
            name: item.element_name().map(str::to_string),
            nic_type: item.get("ResourceSubType").map(str::to_string),
            network: item.get("Connection").map(str::to_string),
            mac: item.get("Address").map(str::to_string),
        })
        .collect();

    let mut drives = Vec::new();
    for item in doc.items_for_profile(profile) {
        let Some(rt) = item.resource_type() else { continue };
        let kind = if DriveKind::Cdrom.matches(rt) {
            DriveKind::Cdrom
        } else if DriveKind::Harddisk.matches(rt) {
            DriveKind::Harddisk
        } else {
            continue;
        };
        drives.push(DriveInfo {
            instance_id: item.instance_id,
            kind,
            name: item.element_name().map(str::to_string),
            file: doc.item_file(item).map(|file| file.href.clone()),
        });
    }

    let declared = profile.and_then(|id| doc.profile(id));
    ProfileInfo {
        id: profile.map(str::to_string),
        label: declared.map(|p| p.label.clone()),
        default: declared.is_some_and(|p| p.default),
        cpus: first(ResourceType::Processor).and_then(|item| item.virtual_quantity()),
        memory_mib,
        nics,
        serial_ports: doc.visible_devices(ResourceType::SerialPort, profile).len(),
        drives,
    }
}

/// Summarize a document: identity, per-profile hardware, networks and files.
pub fn package_info(doc: &OvfDocument, platform: &Platform) -> PackageInfo {
    let profiles = doc
        .profile_targets(&ProfileSelection::All)
        .iter()
        .map(|profile| profile_info(doc, profile.as_deref()))
        .collect();

    let files = doc
        .files()
        .iter()
        .map(|file| {
            let capacity = doc.file_disk(file).and_then(|disk| {
                let capacity: u64 = disk.capacity.trim().parse().ok()?;
                let units = disk.capacity_units.as_deref().unwrap_or("byte");
                capacity.checked_mul(allocation_unit_bytes(units)?)
            });
            FileInfo {
                href: file.href.clone(),
                size: file.size,
                capacity,
            }
        })
        .collect();

    PackageInfo {
        name: doc.name(),
        product: doc.product_identifier(),
        platform: platform.name,
        profiles,
        networks: doc.networks().to_vec(),
        files,
    }
}

#[cfg(test)]
mod tests {
    use crate::ovf::testdata;
    use crate::platform::{CSR1000V, GENERIC};

    use super::*;

    #[test]
    fn test_empty_edit_is_nothing_to_do() {
        let mut doc = testdata::csr();
        let before = doc.to_xml().unwrap();
        let mut validator = Validator::new(&CSR1000V);
        edit_hardware(&mut doc, &mut validator, &HardwareEdit::default()).unwrap();
        assert_eq!(doc.to_xml().unwrap(), before);
    }

    #[test]
    fn test_validation_happens_before_mutation() {
        let mut doc = testdata::csr();
        let mut validator = Validator::new(&CSR1000V);
        let edit = HardwareEdit {
            cpus: Some(2),
            nics: Some(1),
            ..HardwareEdit::default()
        };
        assert!(matches!(
            edit_hardware(&mut doc, &mut validator, &edit),
            Err(Error::ValueTooLow { .. })
        ));
        assert_eq!(
            doc.effective_item(1, Some("1CPU-4GB")).unwrap().virtual_quantity(),
            Some(1)
        );
    }

    #[test]
    fn test_delete_other_profiles_needs_list() {
        let mut doc = testdata::csr();
        let mut validator = Validator::new(&CSR1000V);
        let edit = HardwareEdit {
            delete_all_other_profiles: true,
            ..HardwareEdit::default()
        };
        assert!(matches!(
            edit_hardware(&mut doc, &mut validator, &edit),
            Err(Error::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_package_info_per_profile() {
        let doc = testdata::csr();
        let info = package_info(&doc, &CSR1000V);
        assert_eq!(info.platform, CSR1000V.name);
        assert_eq!(info.profiles.len(), 3);
        let large = info
            .profiles
            .iter()
            .find(|p| p.id.as_deref() == Some("4CPU-4GB"))
            .unwrap();
        assert_eq!(large.cpus, Some(4));
        assert_eq!(large.memory_mib, Some(4096));
        assert_eq!(large.nics.len(), 3);
        assert_eq!(large.serial_ports, 1);
        assert_eq!(large.drives.len(), 2);
        assert_eq!(info.files[0].capacity, Some(8 << 30));
    }

    #[test]
    fn test_package_info_without_profiles() {
        let doc = testdata::two_cdroms();
        let info = package_info(&doc, &GENERIC);
        assert_eq!(info.profiles.len(), 1);
        assert_eq!(info.profiles[0].id, None);
        assert_eq!(info.profiles[0].cpus, Some(2));
        assert_eq!(info.profiles[0].drives.len(), 2);
    }
}
