use ovfedit_core::ovf::{ControllerKind, DriveKind, OvfDocument};
use ovfedit_core::platform::{HardwareKind, PlatformRegistry, ASAV, CSR1000V, GENERIC, IOSXRV};
use ovfedit_core::{Error, Validator};

#[test]
fn test_lookup_by_product_class() {
    let registry = PlatformRegistry::builtin();
    let doc = OvfDocument::parse(include_str!("fixtures/csr.ovf")).unwrap();
    let platform = registry.lookup(doc.product_identifier().as_deref());
    assert_eq!(platform.name, CSR1000V.name);
}

#[test]
fn test_unknown_product_falls_back_to_generic() {
    let registry = PlatformRegistry::builtin();
    assert_eq!(registry.lookup(Some("com.example.toaster")).name, GENERIC.name);
    assert_eq!(registry.lookup(None).name, GENERIC.name);
    assert_eq!(PlatformRegistry::new().lookup(Some("csr1000v")).name, GENERIC.name);
}

#[test]
fn test_nic_names_follow_platform_convention() {
    assert_eq!(CSR1000V.nic_name(1), "GigabitEthernet1");
    assert_eq!(IOSXRV.nic_name(1), "MgmtEth0/0/CPU0/0");
    assert_eq!(IOSXRV.nic_name(3), "GigabitEthernet0/0/0/1");
    assert_eq!(ASAV.nic_name(2), "GigabitEthernet0/0");
    assert_eq!(GENERIC.nic_name(4), "Ethernet4");
}

#[test]
fn test_controller_placement() {
    assert_eq!(CSR1000V.controller_type(DriveKind::Harddisk), ControllerKind::Scsi);
    assert_eq!(CSR1000V.controller_type(DriveKind::Cdrom), ControllerKind::Ide);
    assert_eq!(GENERIC.controller_type(DriveKind::Harddisk), ControllerKind::Ide);
}

#[test]
fn test_range_and_discrete_checks_are_independent() {
    let mut validator = Validator::new(&ASAV);
    validator.validate_count(HardwareKind::Cpus, 4).unwrap();
    assert!(matches!(
        validator.validate_count(HardwareKind::Cpus, 2),
        Err(Error::ValueUnsupported { .. })
    ));
    assert!(matches!(
        validator.validate_count(HardwareKind::Cpus, 8),
        Err(Error::ValueTooHigh { max: 4, .. })
    ));
    assert!(matches!(
        validator.validate_count(HardwareKind::NicCount, 2),
        Err(Error::ValueTooLow { min: 3, .. })
    ));
}

#[test]
fn test_validator_remembers_accepted_values() {
    let mut validator = Validator::new(&CSR1000V);
    validator.validate_count(HardwareKind::Memory, 2560).unwrap();
    validator.validate_count(HardwareKind::Memory, 2560).unwrap();
    validator.validate_count(HardwareKind::Cpus, 2).unwrap();
    assert_eq!(validator.cache().len(), 2);
}
