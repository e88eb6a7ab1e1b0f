//! Bootstrap config injection with a stand-in image builder.

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};

use ovfedit_core::image::BuiltImage;
use ovfedit_core::ovf::{DriveKind, HostResource, ResourceType};
use ovfedit_core::platform::{CSR1000V, GENERIC, IOSV, IOSXRV};
use ovfedit_core::{
    inject_config, ConfigInjection, DiskImageBuilder, Error, ImageEntry, ImageFormat, Package,
    Result,
};
use tempfile::TempDir;

/// Writes the entry list as the image content and records every call.
#[derive(Default)]
struct FakeBuilder {
    calls: RefCell<Vec<(ImageFormat, Vec<ImageEntry>)>>,
}

impl DiskImageBuilder for FakeBuilder {
    fn build(
        &self,
        format: ImageFormat,
        entries: &[ImageEntry],
        output: &Path,
    ) -> Result<BuiltImage> {
        let listing: String = entries.iter().map(|e| format!("{}\n", e.dest)).collect();
        fs::write(output, &listing).unwrap();
        self.calls.borrow_mut().push((format, entries.to_vec()));
        Ok(BuiltImage {
            path: output.to_path_buf(),
            size: listing.len() as u64,
            capacity: (format == ImageFormat::Vmdk).then_some(8 << 20),
        })
    }
}

/// Copy a fixture descriptor into a scratch directory with dummy disk files.
fn package_dir(fixture: &str, files: &[&str]) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let source = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(fixture);
    let descriptor = dir.path().join(fixture);
    fs::copy(source, &descriptor).unwrap();
    for file in files {
        fs::write(dir.path().join(file), b"disk contents").unwrap();
    }
    (dir, descriptor)
}

fn config_file(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, b"hostname router\n").unwrap();
    path
}

#[test]
fn test_inject_reuses_empty_cdrom() {
    let (dir, descriptor) = package_dir("csr.ovf", &["csr1000v_harddisk.vmdk"]);
    let mut package = Package::open(&descriptor).unwrap();
    let builder = FakeBuilder::default();
    let request = ConfigInjection {
        config_file: Some(config_file(dir.path(), "my-router.cfg")),
        ..ConfigInjection::default()
    };

    let placement = inject_config(&mut package, &CSR1000V, &builder, &request).unwrap();
    assert_eq!(placement.instance_id, 6);
    assert!(!placement.created_drive);
    assert!(!placement.overwritten);

    let calls = builder.calls.borrow();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, ImageFormat::Iso);
    assert_eq!(calls[0].1[0].dest, "iosxe_config.txt");

    let doc = package.document();
    let hrefs: Vec<_> = doc.files().iter().map(|f| f.href.as_str()).collect();
    assert_eq!(hrefs, ["config.iso", "csr1000v_harddisk.vmdk"]);
    assert_eq!(
        doc.effective_item(6, None).unwrap().host_resource(),
        Some(HostResource::File(placement.file_id.clone()))
    );
    assert_eq!(doc.instance_ids_of(ResourceType::CdDrive).len(), 1);
}

#[test]
fn test_inject_fills_placeholder_disk() {
    let (dir, descriptor) = package_dir("iosv.ovf", &["vios-adventerprisek9-m.vmdk"]);
    let mut package = Package::open(&descriptor).unwrap();
    let builder = FakeBuilder::default();
    let request = ConfigInjection {
        config_file: Some(config_file(dir.path(), "ios.cfg")),
        ..ConfigInjection::default()
    };

    let placement = inject_config(&mut package, &IOSV, &builder, &request).unwrap();
    assert_eq!(placement.instance_id, 6);
    assert_eq!(placement.disk_id.as_deref(), Some("flash2"));
    assert_eq!(builder.calls.borrow()[0].0, ImageFormat::Vmdk);

    let doc = package.document();
    let hrefs: Vec<_> = doc.files().iter().map(|f| f.href.as_str()).collect();
    assert_eq!(hrefs, ["vios-adventerprisek9-m.vmdk", "config.vmdk"]);
    let disk = doc.disk("flash2").unwrap();
    assert_eq!(disk.file_ref.as_deref(), Some(placement.file_id.as_str()));
    assert_eq!(disk.capacity, (8u64 << 20).to_string());
    assert_eq!(doc.disks().len(), 2);
}

#[test]
fn test_inject_picks_first_of_two_empty_drives() {
    let (dir, descriptor) = package_dir("two_cdroms.ovf", &[]);
    let mut package = Package::open(&descriptor).unwrap();
    let request = ConfigInjection {
        config_file: Some(config_file(dir.path(), "config.txt")),
        ..ConfigInjection::default()
    };

    let placement =
        inject_config(&mut package, &GENERIC, &FakeBuilder::default(), &request).unwrap();
    assert_eq!(placement.instance_id, 3);
    assert!(package.document().is_empty_drive(4));
    assert_eq!(package.document().drives(DriveKind::Cdrom), vec![3, 4]);
}

#[test]
fn test_second_injection_overwrites() {
    let (dir, descriptor) = package_dir("csr.ovf", &["csr1000v_harddisk.vmdk"]);
    let mut package = Package::open(&descriptor).unwrap();
    let builder = FakeBuilder::default();
    let request = ConfigInjection {
        config_file: Some(config_file(dir.path(), "a.cfg")),
        ..ConfigInjection::default()
    };

    let first = inject_config(&mut package, &CSR1000V, &builder, &request).unwrap();
    let second = inject_config(&mut package, &CSR1000V, &builder, &request).unwrap();
    assert!(second.overwritten);
    assert_eq!(first.instance_id, second.instance_id);
    assert_eq!(package.document().files().len(), 2);
}

#[test]
fn test_secondary_config_needs_platform_slot() {
    let (dir, descriptor) = package_dir("csr.ovf", &["csr1000v_harddisk.vmdk"]);
    let mut package = Package::open(&descriptor).unwrap();
    let builder = FakeBuilder::default();
    let request = ConfigInjection {
        config_file: Some(config_file(dir.path(), "primary.cfg")),
        secondary_config_file: Some(config_file(dir.path(), "admin.cfg")),
        ..ConfigInjection::default()
    };

    assert!(matches!(
        inject_config(&mut package, &CSR1000V, &builder, &request),
        Err(Error::InvalidInput { .. })
    ));
    assert!(builder.calls.borrow().is_empty());

    inject_config(&mut package, &IOSXRV, &builder, &request).unwrap();
    let calls = builder.calls.borrow();
    let names: Vec<_> = calls[0].1.iter().map(|e| e.dest.as_str()).collect();
    assert_eq!(names, ["iosxr_config.txt", "iosxr_config_admin.txt"]);
}

#[test]
fn test_extra_files_pass_through() {
    let (dir, descriptor) = package_dir("two_cdroms.ovf", &[]);
    let mut package = Package::open(&descriptor).unwrap();
    let builder = FakeBuilder::default();
    let extra = config_file(dir.path(), "license.lic");
    let request = ConfigInjection {
        extra_files: vec![extra.clone()],
        ..ConfigInjection::default()
    };

    inject_config(&mut package, &GENERIC, &builder, &request).unwrap();
    let calls = builder.calls.borrow();
    assert_eq!(calls[0].1, vec![ImageEntry::new("license.lic", extra)]);
}

#[test]
fn test_nothing_to_inject_is_invalid() {
    let (_dir, descriptor) = package_dir("two_cdroms.ovf", &[]);
    let mut package = Package::open(&descriptor).unwrap();
    assert!(matches!(
        inject_config(
            &mut package,
            &GENERIC,
            &FakeBuilder::default(),
            &ConfigInjection::default()
        ),
        Err(Error::InvalidInput { .. })
    ));
}

#[test]
fn test_injected_image_saved_with_package() {
    let (dir, descriptor) = package_dir("csr.ovf", &["csr1000v_harddisk.vmdk"]);
    let mut package = Package::open(&descriptor).unwrap();
    let request = ConfigInjection {
        config_file: Some(config_file(dir.path(), "router.cfg")),
        ..ConfigInjection::default()
    };
    inject_config(&mut package, &CSR1000V, &FakeBuilder::default(), &request).unwrap();

    let out = tempfile::tempdir().unwrap();
    let output = out.path().join("csr-configured.ovf");
    package.save(&output).unwrap();

    assert_eq!(
        fs::read_to_string(out.path().join("config.iso")).unwrap(),
        "iosxe_config.txt\n"
    );
    let manifest = fs::read_to_string(out.path().join("csr-configured.mf")).unwrap();
    let names: Vec<_> = manifest
        .lines()
        .map(|line| &line[line.find('(').unwrap() + 1..line.find(')').unwrap()])
        .collect();
    assert_eq!(names, ["csr-configured.ovf", "config.iso", "csr1000v_harddisk.vmdk"]);

    let reopened = Package::open(&output).unwrap();
    let config = reopened
        .document()
        .files()
        .iter()
        .find(|f| f.href == "config.iso")
        .unwrap();
    assert_eq!(config.size, Some("iosxe_config.txt\n".len() as u64));
}
