//! Loading and saving packages as .ovf directories and .ova archives.

use std::fs;
use std::path::{Path, PathBuf};

use ovfedit_core::ova::{compute_sha256, sha256_file};
use ovfedit_core::ovf::ProfileSelection;
use ovfedit_core::{Error, Package};
use tempfile::TempDir;

const DISK: &[u8] = b"stream optimized disk contents";

fn csr_package() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let descriptor = dir.path().join("csr.ovf");
    fs::write(&descriptor, include_str!("fixtures/csr.ovf")).unwrap();
    fs::write(dir.path().join("csr1000v_harddisk.vmdk"), DISK).unwrap();
    (dir, descriptor)
}

fn archive_names(path: &Path) -> Vec<String> {
    let mut archive = tar::Archive::new(fs::File::open(path).unwrap());
    archive
        .entries()
        .unwrap()
        .map(|e| e.unwrap().path().unwrap().display().to_string())
        .collect()
}

/// Parse `SHA256(name)= digest` lines.
fn manifest_entries(text: &str) -> Vec<(String, String)> {
    text.lines()
        .map(|line| {
            let open = line.find('(').unwrap();
            let close = line.find(")= ").unwrap();
            (line[open + 1..close].to_string(), line[close + 3..].to_string())
        })
        .collect()
}

#[test]
fn test_ovf_to_ova_layout() {
    let (_dir, descriptor) = csr_package();
    let mut package = Package::open(&descriptor).unwrap();
    package
        .document_mut()
        .set_cpus(2, &ProfileSelection::All)
        .unwrap();

    let out = tempfile::tempdir().unwrap();
    let ova = out.path().join("router.ova");
    package.save(&ova).unwrap();

    assert_eq!(
        archive_names(&ova),
        ["router.ovf", "csr1000v_harddisk.vmdk", "router.mf"]
    );
    // only the OVA itself is left behind
    let leftovers: Vec<_> = fs::read_dir(out.path()).unwrap().collect();
    assert_eq!(leftovers.len(), 1);
}

#[test]
fn test_ova_round_trip_keeps_edits() {
    let (_dir, descriptor) = csr_package();
    let mut package = Package::open(&descriptor).unwrap();
    package
        .document_mut()
        .set_memory(8192, &ProfileSelection::single("4CPU-4GB"))
        .unwrap();

    let out = tempfile::tempdir().unwrap();
    let ova = out.path().join("router.ova");
    package.save(&ova).unwrap();

    let reopened = Package::open(&ova).unwrap();
    assert_eq!(reopened.descriptor_name(), "router.ovf");
    let doc = reopened.document();
    assert_eq!(
        doc.effective_item(2, Some("4CPU-4GB")).unwrap().virtual_quantity(),
        Some(8192)
    );
    assert_eq!(
        doc.effective_item(2, Some("1CPU-4GB")).unwrap().virtual_quantity(),
        Some(4096)
    );
    assert_eq!(doc.files()[0].size, Some(DISK.len() as u64));
}

#[test]
fn test_manifest_digests_match_contents() {
    let (_dir, descriptor) = csr_package();
    let mut package = Package::open(&descriptor).unwrap();

    let out = tempfile::tempdir().unwrap();
    let output = out.path().join("edited.ovf");
    package.save(&output).unwrap();

    let manifest = fs::read_to_string(out.path().join("edited.mf")).unwrap();
    let entries = manifest_entries(&manifest);
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].0, "edited.ovf");
    assert_eq!(entries[0].1, sha256_file(&output).unwrap());
    assert_eq!(entries[1].0, "csr1000v_harddisk.vmdk");
    assert_eq!(entries[1].1, compute_sha256(DISK));
}

#[test]
fn test_ova_to_ovf_extracts_files() {
    let (_dir, descriptor) = csr_package();
    let out = tempfile::tempdir().unwrap();
    let ova = out.path().join("router.ova");
    Package::open(&descriptor).unwrap().save(&ova).unwrap();

    let mut package = Package::open(&ova).unwrap();
    let unpacked = out.path().join("unpacked");
    let output = unpacked.join("router.ovf");
    package.save(&output).unwrap();

    assert_eq!(
        fs::read(unpacked.join("csr1000v_harddisk.vmdk")).unwrap(),
        DISK
    );
    assert!(unpacked.join("router.mf").exists());
}

#[test]
fn test_save_in_place() {
    let (dir, descriptor) = csr_package();
    let mut package = Package::open(&descriptor).unwrap();
    package
        .document_mut()
        .set_cpus(4, &ProfileSelection::single("1CPU-4GB"))
        .unwrap();
    package.save(&descriptor).unwrap();

    assert_eq!(
        fs::read(dir.path().join("csr1000v_harddisk.vmdk")).unwrap(),
        DISK
    );
    let reopened = Package::open(&descriptor).unwrap();
    assert_eq!(
        reopened
            .document()
            .effective_item(1, Some("1CPU-4GB"))
            .unwrap()
            .virtual_quantity(),
        Some(4)
    );
}

#[test]
fn test_missing_referenced_file_fails_save() {
    let dir = tempfile::tempdir().unwrap();
    let descriptor = dir.path().join("csr.ovf");
    fs::write(&descriptor, include_str!("fixtures/csr.ovf")).unwrap();
    let mut package = Package::open(&descriptor).unwrap();

    let output = dir.path().join("out.ova");
    assert!(matches!(package.save(&output), Err(Error::Io { .. })));
    assert!(!output.exists());
}

#[test]
fn test_unsupported_extensions() {
    assert!(matches!(
        Package::open(Path::new("/tmp/vm.vmx")),
        Err(Error::InvalidInput { .. })
    ));
    let (_dir, descriptor) = csr_package();
    let mut package = Package::open(&descriptor).unwrap();
    assert!(matches!(
        package.save(Path::new("/tmp/out.zip")),
        Err(Error::InvalidInput { .. })
    ));
}

#[test]
fn test_malformed_descriptor() {
    let dir = tempfile::tempdir().unwrap();
    let descriptor = dir.path().join("broken.ovf");
    fs::write(&descriptor, "<Envelope><References>").unwrap();
    assert!(matches!(
        Package::open(&descriptor),
        Err(Error::Xml { .. })
    ));
}
