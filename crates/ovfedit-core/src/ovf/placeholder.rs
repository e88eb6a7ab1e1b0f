//! Attaching a bootstrap image to a drive.
//!
//! CD-ROM drives point straight at a file (`ovf:/file/<id>`); hard disks point
//! at a disk descriptor (`ovf:/disk/<id>`) which in turn references the file.
//! Files and disks backing drives are kept in the same relative order as the
//! drives themselves.

use std::path::Path;

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::ovf::document::{DiskDescriptor, FileReference, OvfDocument};
use crate::ovf::item::{Item, ProfileSelection};
use crate::ovf::schema::{
    disk_host_resource, file_host_resource, ControllerKind, DriveKind, HostResource,
    VMDK_STREAM_FORMAT,
};

/// Where a bootstrap image was attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrivePlacement {
    pub instance_id: u32,
    pub file_id: String,
    /// Name the image got inside the package.
    pub href: String,
    /// Disk descriptor between drive and file, if any.
    pub disk_id: Option<String>,
    /// Whether the drive had to be created.
    pub created_drive: bool,
    /// Whether the drive already held an image of the same name.
    pub overwritten: bool,
}

/// Content of a bootstrap image to attach.
#[derive(Debug, Clone, Copy)]
pub struct ImageContent<'a> {
    /// Name of the file inside the package.
    pub href: &'a str,
    /// Local path the file is read from when the package is saved.
    pub source: &'a Path,
    pub size: u64,
    /// Virtual capacity in bytes, for disk images.
    pub capacity: Option<u64>,
}

fn is_drive(item: &Item) -> bool {
    item.resource_type()
        .is_some_and(|rt| DriveKind::Cdrom.matches(rt) || DriveKind::Harddisk.matches(rt))
}

fn unique_id(base: &str, taken: impl Fn(&str) -> bool) -> String {
    if !taken(base) {
        return base.to_string();
    }
    let mut n = 2;
    loop {
        let candidate = format!("{base}_{n}");
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// `config.iso`, then `config_2.iso`, `config_3.iso` and so on.
fn unique_href(href: &str, taken: impl Fn(&str) -> bool) -> String {
    if !taken(href) {
        return href.to_string();
    }
    let (stem, ext) = match href.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, format!(".{ext}")),
        _ => (href, String::new()),
    };
    let mut n = 2;
    loop {
        let candidate = format!("{stem}_{n}{ext}");
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

impl OvfDocument {
    /// Drives of one kind, one instance id each, in document order.
    pub fn drives(&self, kind: DriveKind) -> Vec<u32> {
        let mut ids = Vec::new();
        for item in &self.items {
            let matches = item.resource_type().is_some_and(|rt| kind.matches(rt));
            if matches && !ids.contains(&item.instance_id) {
                ids.push(item.instance_id);
            }
        }
        ids
    }

    /// The disk descriptor an item's HostResource points at.
    pub fn item_disk(&self, item: &Item) -> Option<&DiskDescriptor> {
        match item.host_resource()? {
            HostResource::Disk(id) => self.disk(&id),
            _ => None,
        }
    }

    /// The file backing an item, directly or through its disk descriptor.
    pub fn item_file(&self, item: &Item) -> Option<&FileReference> {
        match item.host_resource()? {
            HostResource::File(id) => self.file(&id),
            HostResource::Disk(id) => self.disk_file(self.disk(&id)?),
            HostResource::Other(_) => None,
        }
    }

    /// The file backing a drive, if any.
    pub fn drive_file(&self, instance_id: u32) -> Option<&FileReference> {
        self.items_by_instance(instance_id)
            .find_map(|item| self.item_file(item))
    }

    /// Whether a drive has nothing attached: no HostResource at all, or a
    /// disk descriptor with no backing file.
    pub fn is_empty_drive(&self, instance_id: u32) -> bool {
        let Some(item) = self.items_by_instance(instance_id).next() else {
            return false;
        };
        match item.host_resource() {
            None => true,
            Some(HostResource::Disk(id)) => self.disk(&id).is_some_and(|d| d.file_ref.is_none()),
            Some(_) => false,
        }
    }

    /// Index in `files` to insert a file for `instance_id` at: just ahead of
    /// the first file backing a later drive.
    fn file_insert_position(&self, instance_id: u32) -> usize {
        let start = self
            .item_positions(instance_id)
            .last()
            .map_or(self.items.len(), |&idx| idx + 1);
        self.items[start..]
            .iter()
            .filter(|item| is_drive(item))
            .filter_map(|item| self.item_file(item))
            .filter_map(|file| self.files.iter().position(|f| f.id == file.id))
            .min()
            .unwrap_or(self.files.len())
    }

    /// Index in `disks` to insert a disk for `instance_id` at.
    fn disk_insert_position(&self, instance_id: u32) -> usize {
        let start = self
            .item_positions(instance_id)
            .last()
            .map_or(self.items.len(), |&idx| idx + 1);
        self.items[start..]
            .iter()
            .filter(|item| is_drive(item))
            .filter_map(|item| self.item_disk(item))
            .filter_map(|disk| self.disks.iter().position(|d| d.id == disk.id))
            .min()
            .unwrap_or(self.disks.len())
    }

    fn set_host_resource(&mut self, instance_id: u32, value: &str) {
        for idx in self.item_positions(instance_id) {
            self.items[idx].set("HostResource", value);
        }
        self.merge_variants(instance_id);
    }

    /// Add an empty drive on the first controller of the given family that
    /// has a free address.
    pub fn add_drive(&mut self, kind: DriveKind, controller: ControllerKind) -> Result<u32> {
        let mut controllers = Vec::new();
        for item in &self.items {
            if item.is_kind(controller.resource_type()) && !controllers.contains(&item.instance_id) {
                controllers.push(item.instance_id);
            }
        }

        for parent in controllers {
            let address = self.next_address_on_parent(parent);
            if address >= controller.slots() {
                continue;
            }
            let ordinal = self.drives(kind).len() + 1;
            let mut item = Item::new(0, kind.resource_type());
            item.set("AddressOnParent", address.to_string());
            item.set(
                "ElementName",
                match kind {
                    DriveKind::Cdrom => format!("CD-ROM {ordinal}"),
                    DriveKind::Harddisk => format!("Hard Disk {ordinal}"),
                },
            );
            item.set("Parent", parent.to_string());
            info!("adding {kind} drive to {controller} controller {parent} at address {address}");
            return Ok(self.create_item(item, &ProfileSelection::All));
        }

        Err(Error::lookup(format!(
            "no {controller} controller with a free address for a new {kind} drive"
        )))
    }

    /// Attach an image as the content of a bootstrap drive.
    ///
    /// Picks the drive already holding a file of the same name, else the
    /// first empty drive of the right kind, else a new drive on a controller
    /// of the given family.
    pub fn attach_bootstrap_image(
        &mut self,
        kind: DriveKind,
        controller: ControllerKind,
        image: ImageContent<'_>,
    ) -> Result<DrivePlacement> {
        let drives = self.drives(kind);

        let holder = drives.iter().copied().find(|&id| {
            self.drive_file(id)
                .is_some_and(|file| file.href == image.href)
        });
        if let Some(instance_id) = holder {
            warn!("overwriting existing config disk in drive {instance_id}");
            let file_id = self
                .drive_file(instance_id)
                .map(|file| file.id.clone())
                .ok_or_else(|| Error::lookup(format!("drive {instance_id} lost its file")))?;
            if let Some(file) = self.files.iter_mut().find(|f| f.id == file_id) {
                file.size = Some(image.size);
                file.source = Some(image.source.to_path_buf());
            }
            let disk_id = self
                .items_by_instance(instance_id)
                .find_map(|item| self.item_disk(item))
                .map(|disk| disk.id.clone());
            if let (Some(disk_id), Some(capacity)) = (&disk_id, image.capacity) {
                if let Some(disk) = self.disks.iter_mut().find(|d| &d.id == disk_id) {
                    disk.capacity = capacity.to_string();
                    disk.capacity_units = None;
                }
            }
            return Ok(DrivePlacement {
                instance_id,
                file_id,
                href: image.href.to_string(),
                disk_id,
                created_drive: false,
                overwritten: true,
            });
        }

        let empty = drives.iter().copied().find(|&id| self.is_empty_drive(id));
        let (instance_id, created_drive) = match empty {
            Some(id) => (id, false),
            None => (self.add_drive(kind, controller)?, true),
        };

        let href = unique_href(image.href, |href| self.files.iter().any(|f| f.href == href));
        if href != image.href {
            warn!("'{}' is already in the package, attaching as '{href}'", image.href);
        }
        let file_id = unique_id(&href, |id| self.file(id).is_some());
        let mut file = FileReference::new(file_id.as_str(), href.as_str());
        file.size = Some(image.size);
        file.source = Some(image.source.to_path_buf());
        let file_at = self.file_insert_position(instance_id);
        self.files.insert(file_at, file);

        let placeholder = self
            .items_by_instance(instance_id)
            .find_map(|item| self.item_disk(item))
            .map(|disk| disk.id.clone());

        let disk_id = match (placeholder, kind) {
            (Some(disk_id), _) => {
                if let Some(disk) = self.disks.iter_mut().find(|d| d.id == disk_id) {
                    disk.file_ref = Some(file_id.clone());
                    if kind == DriveKind::Harddisk {
                        disk.format = Some(VMDK_STREAM_FORMAT.to_string());
                    }
                    if let Some(capacity) = image.capacity {
                        disk.capacity = capacity.to_string();
                        disk.capacity_units = None;
                    }
                }
                Some(disk_id)
            }
            (None, DriveKind::Cdrom) => {
                self.set_host_resource(instance_id, &file_host_resource(&file_id));
                None
            }
            (None, DriveKind::Harddisk) => {
                let stem = Path::new(&href)
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or(href.as_str());
                let disk_id = unique_id(stem, |id| self.disk(id).is_some());
                let mut disk = DiskDescriptor::new(
                    disk_id.as_str(),
                    image.capacity.unwrap_or(image.size).to_string(),
                );
                disk.format = Some(VMDK_STREAM_FORMAT.to_string());
                disk.file_ref = Some(file_id.clone());
                let disk_at = self.disk_insert_position(instance_id);
                self.disks.insert(disk_at, disk);
                self.set_host_resource(instance_id, &disk_host_resource(&disk_id));
                Some(disk_id)
            }
        };

        Ok(DrivePlacement {
            instance_id,
            file_id,
            href,
            disk_id,
            created_drive,
            overwritten: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::ovf::testdata;

    use super::*;

    fn image(href: &str) -> ImageContent<'_> {
        ImageContent {
            href,
            source: Path::new("/tmp/image"),
            size: 4096,
            capacity: Some(8 << 20),
        }
    }

    #[test]
    fn test_reuses_empty_cdrom_and_keeps_file_order() {
        let mut doc = testdata::csr();
        let placement = doc
            .attach_bootstrap_image(DriveKind::Cdrom, ControllerKind::Ide, image("config.iso"))
            .unwrap();
        assert_eq!(placement.instance_id, 6);
        assert!(!placement.created_drive);
        assert_eq!(placement.disk_id, None);
        // the cdrom precedes the hard disk, so its file precedes the disk's file
        let hrefs: Vec<&str> = doc.files().iter().map(|f| f.href.as_str()).collect();
        assert_eq!(hrefs, ["config.iso", "csr1000v_harddisk.vmdk"]);
        assert_eq!(doc.disks().len(), 1);
        assert_eq!(
            doc.items_by_instance(6).next().unwrap().get("HostResource"),
            Some("ovf:/file/config.iso")
        );
    }

    #[test]
    fn test_fills_placeholder_disk() {
        let mut doc = testdata::iosv();
        let placement = doc
            .attach_bootstrap_image(
                DriveKind::Harddisk,
                ControllerKind::Ide,
                image("config.vmdk"),
            )
            .unwrap();
        assert_eq!(placement.instance_id, 6);
        assert_eq!(placement.disk_id.as_deref(), Some("flash2"));
        assert_eq!(doc.disks().len(), 2);
        assert_eq!(doc.disk("flash2").unwrap().file_ref.as_deref(), Some("config.vmdk"));
        assert_eq!(doc.files().last().unwrap().href, "config.vmdk");
    }

    #[test]
    fn test_first_of_two_empty_drives_wins() {
        let mut doc = testdata::two_cdroms();
        let placement = doc
            .attach_bootstrap_image(DriveKind::Cdrom, ControllerKind::Ide, image("config.iso"))
            .unwrap();
        assert_eq!(placement.instance_id, 3);
        assert!(doc.is_empty_drive(4));
    }

    #[test]
    fn test_second_attach_overwrites() {
        let mut doc = testdata::two_cdroms();
        doc.attach_bootstrap_image(DriveKind::Cdrom, ControllerKind::Ide, image("config.iso"))
            .unwrap();
        let again = doc
            .attach_bootstrap_image(DriveKind::Cdrom, ControllerKind::Ide, image("config.iso"))
            .unwrap();
        assert!(again.overwritten);
        assert_eq!(again.instance_id, 3);
        assert_eq!(doc.files().len(), 1);
    }

    #[test]
    fn test_href_clash_with_unrelated_file_is_renamed() {
        let xml = testdata::TWO_CDROMS.replace(
            "<References/>",
            r#"<References><File ovf:href="config.iso" ovf:id="readme"/></References>"#,
        );
        let mut doc = OvfDocument::parse(&xml).unwrap();
        let placement = doc
            .attach_bootstrap_image(DriveKind::Cdrom, ControllerKind::Ide, image("config.iso"))
            .unwrap();

        assert_eq!(placement.href, "config_2.iso");
        assert!(!placement.overwritten);
        let mut hrefs: Vec<&str> = doc.files().iter().map(|f| f.href.as_str()).collect();
        hrefs.sort_unstable();
        assert_eq!(hrefs, ["config.iso", "config_2.iso"]);
        assert_eq!(doc.drive_file(3).unwrap().href, "config_2.iso");
    }

    #[test]
    fn test_unique_href_keeps_extension() {
        let taken = ["config.iso", "config_2.iso"];
        assert_eq!(unique_href("config.iso", |h| taken.contains(&h)), "config_3.iso");
        assert_eq!(unique_href("config.vmdk", |h| taken.contains(&h)), "config.vmdk");
        assert_eq!(unique_href("README", |h| h == "README"), "README_2");
    }

    #[test]
    fn test_adds_drive_when_none_empty() {
        let mut doc = testdata::csr();
        doc.attach_bootstrap_image(DriveKind::Cdrom, ControllerKind::Ide, image("config.iso"))
            .unwrap();
        let placement = doc
            .attach_bootstrap_image(DriveKind::Cdrom, ControllerKind::Ide, image("extra.iso"))
            .unwrap();
        assert!(placement.created_drive);
        let drive = doc.items_by_instance(placement.instance_id).next().unwrap();
        assert_eq!(drive.parent(), Some(4));
        assert_eq!(drive.address_on_parent(), Some(1));
        assert_eq!(drive.element_name(), Some("CD-ROM 2"));
    }

    #[test]
    fn test_new_hard_disk_gets_disk_descriptor() {
        let mut doc = testdata::csr();
        let placement = doc
            .attach_bootstrap_image(
                DriveKind::Harddisk,
                ControllerKind::Scsi,
                image("config.vmdk"),
            )
            .unwrap();
        assert!(placement.created_drive);
        assert_eq!(placement.disk_id.as_deref(), Some("config"));
        let disk = doc.disk("config").unwrap();
        assert_eq!(disk.file_ref.as_deref(), Some("config.vmdk"));
        assert_eq!(disk.capacity, (8u64 << 20).to_string());
        let drive = doc.items_by_instance(placement.instance_id).next().unwrap();
        assert_eq!(drive.get("HostResource"), Some("ovf:/disk/config"));
        assert_eq!(drive.address_on_parent(), Some(1));
    }

    #[test]
    fn test_no_controller_is_lookup_error() {
        let mut doc = testdata::two_cdroms();
        assert!(matches!(
            doc.attach_bootstrap_image(
                DriveKind::Harddisk,
                ControllerKind::Scsi,
                image("config.vmdk")
            ),
            Err(Error::Lookup { .. })
        ));
    }

    #[test]
    fn test_full_controller_is_lookup_error() {
        let mut doc = testdata::two_cdroms();
        doc.attach_bootstrap_image(DriveKind::Cdrom, ControllerKind::Ide, image("a.iso"))
            .unwrap();
        doc.attach_bootstrap_image(DriveKind::Cdrom, ControllerKind::Ide, image("b.iso"))
            .unwrap();
        // both addresses of the only IDE controller are taken
        assert!(matches!(
            doc.attach_bootstrap_image(DriveKind::Cdrom, ControllerKind::Ide, image("c.iso")),
            Err(Error::Lookup { .. })
        ));
    }
}
