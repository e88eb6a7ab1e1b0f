//! Fixed vocabulary of the OVF envelope and RASD hardware items.

use std::fmt;

use crate::error::{Error, Result};

pub const OVF_NAMESPACE_1: &str = "http://schemas.dmtf.org/ovf/envelope/1";
pub const OVF_NAMESPACE_2: &str = "http://schemas.dmtf.org/ovf/envelope/2";
pub const RASD_NAMESPACE: &str =
    "http://schemas.dmtf.org/wbem/wscim/1/cim-schema/2/CIM_ResourceAllocationSettingData";

/// Resource types that may appear in a VirtualHardwareSection.
///
/// This enumeration is closed: items with other codes are carried through
/// untouched but can't be edited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceType {
    Other,
    Processor,
    Memory,
    IdeController,
    ScsiController,
    EthernetAdapter,
    FloppyDrive,
    CdDrive,
    DvdDrive,
    DiskDrive,
    SataController,
    SerialPort,
    ParallelPort,
    UsbController,
}

impl ResourceType {
    pub fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            1 => ResourceType::Other,
            3 => ResourceType::Processor,
            4 => ResourceType::Memory,
            5 => ResourceType::IdeController,
            6 => ResourceType::ScsiController,
            10 => ResourceType::EthernetAdapter,
            14 => ResourceType::FloppyDrive,
            15 => ResourceType::CdDrive,
            16 => ResourceType::DvdDrive,
            17 => ResourceType::DiskDrive,
            20 => ResourceType::SataController,
            21 => ResourceType::SerialPort,
            22 => ResourceType::ParallelPort,
            23 => ResourceType::UsbController,
            _ => return None,
        })
    }

    pub fn code(self) -> u32 {
        match self {
            ResourceType::Other => 1,
            ResourceType::Processor => 3,
            ResourceType::Memory => 4,
            ResourceType::IdeController => 5,
            ResourceType::ScsiController => 6,
            ResourceType::EthernetAdapter => 10,
            ResourceType::FloppyDrive => 14,
            ResourceType::CdDrive => 15,
            ResourceType::DvdDrive => 16,
            ResourceType::DiskDrive => 17,
            ResourceType::SataController => 20,
            ResourceType::SerialPort => 21,
            ResourceType::ParallelPort => 22,
            ResourceType::UsbController => 23,
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceType::Other => "other",
            ResourceType::Processor => "cpu",
            ResourceType::Memory => "memory",
            ResourceType::IdeController => "ide controller",
            ResourceType::ScsiController => "scsi controller",
            ResourceType::EthernetAdapter => "nic",
            ResourceType::FloppyDrive => "floppy",
            ResourceType::CdDrive => "cdrom",
            ResourceType::DvdDrive => "dvd",
            ResourceType::DiskDrive => "harddisk",
            ResourceType::SataController => "sata controller",
            ResourceType::SerialPort => "serial port",
            ResourceType::ParallelPort => "parallel port",
            ResourceType::UsbController => "usb controller",
        };
        f.write_str(name)
    }
}

/// Kind of drive a bootstrap or data image is attached as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriveKind {
    Harddisk,
    Cdrom,
}

impl DriveKind {
    /// Parse a drive kind name; anything other than `harddisk` or `cdrom` is unsupported.
    pub fn parse(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "harddisk" => Ok(DriveKind::Harddisk),
            "cdrom" => Ok(DriveKind::Cdrom),
            other => Err(Error::unsupported(format!(
                "drive type '{other}' is not supported (expected harddisk or cdrom)"
            ))),
        }
    }

    /// Resource type used when creating a drive of this kind.
    pub fn resource_type(self) -> ResourceType {
        match self {
            DriveKind::Harddisk => ResourceType::DiskDrive,
            DriveKind::Cdrom => ResourceType::CdDrive,
        }
    }

    /// Whether an existing item of the given type is a drive of this kind.
    pub fn matches(self, resource_type: ResourceType) -> bool {
        match self {
            DriveKind::Harddisk => resource_type == ResourceType::DiskDrive,
            DriveKind::Cdrom => {
                matches!(resource_type, ResourceType::CdDrive | ResourceType::DvdDrive)
            }
        }
    }
}

impl fmt::Display for DriveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriveKind::Harddisk => f.write_str("harddisk"),
            DriveKind::Cdrom => f.write_str("cdrom"),
        }
    }
}

/// Storage controller families a drive can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControllerKind {
    Ide,
    Scsi,
    Sata,
}

impl ControllerKind {
    pub fn resource_type(self) -> ResourceType {
        match self {
            ControllerKind::Ide => ResourceType::IdeController,
            ControllerKind::Scsi => ResourceType::ScsiController,
            ControllerKind::Sata => ResourceType::SataController,
        }
    }

    /// Number of device addresses available on one controller.
    pub fn slots(self) -> u32 {
        match self {
            ControllerKind::Ide => 2,
            ControllerKind::Scsi => 16,
            ControllerKind::Sata => 30,
        }
    }
}

impl fmt::Display for ControllerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerKind::Ide => f.write_str("ide"),
            ControllerKind::Scsi => f.write_str("scsi"),
            ControllerKind::Sata => f.write_str("sata"),
        }
    }
}

/// Disk format URI for streamOptimized VMDK images.
pub const VMDK_STREAM_FORMAT: &str =
    "http://www.vmware.com/interfaces/specifications/vmdk.html#streamOptimized";

/// Host resource reference to a DiskSection entry.
pub fn disk_host_resource(disk_id: &str) -> String {
    format!("ovf:/disk/{disk_id}")
}

/// Host resource reference to a References entry.
pub fn file_host_resource(file_id: &str) -> String {
    format!("ovf:/file/{file_id}")
}

/// What a HostResource value points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostResource {
    Disk(String),
    File(String),
    Other(String),
}

impl HostResource {
    pub fn parse(value: &str) -> Self {
        // Some producers write the legacy "/disk/" form without the scheme
        let trimmed = value.trim();
        let path = trimmed.strip_prefix("ovf:").unwrap_or(trimmed);
        if let Some(id) = path.strip_prefix("/disk/") {
            HostResource::Disk(id.to_string())
        } else if let Some(id) = path.strip_prefix("/file/") {
            HostResource::File(id.to_string())
        } else {
            HostResource::Other(trimmed.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_type_codes_round_trip() {
        for code in [1, 3, 4, 5, 6, 10, 14, 15, 16, 17, 20, 21, 22, 23] {
            let rt = ResourceType::from_code(code).unwrap();
            assert_eq!(rt.code(), code);
        }
        assert_eq!(ResourceType::from_code(35), None);
    }

    #[test]
    fn test_drive_kind_parse() {
        assert_eq!(DriveKind::parse("CDROM").unwrap(), DriveKind::Cdrom);
        assert_eq!(DriveKind::parse("harddisk").unwrap(), DriveKind::Harddisk);
        assert!(matches!(
            DriveKind::parse("floppy"),
            Err(Error::ValueUnsupported { .. })
        ));
    }

    #[test]
    fn test_drive_kind_matches_dvd() {
        assert!(DriveKind::Cdrom.matches(ResourceType::DvdDrive));
        assert!(!DriveKind::Harddisk.matches(ResourceType::CdDrive));
    }

    #[test]
    fn test_host_resource_parse() {
        assert_eq!(
            HostResource::parse("ovf:/disk/vmdisk1"),
            HostResource::Disk("vmdisk1".to_string())
        );
        assert_eq!(
            HostResource::parse("/file/config.iso"),
            HostResource::File("config.iso".to_string())
        );
        assert!(matches!(
            HostResource::parse("nfs://host/x"),
            HostResource::Other(_)
        ));
    }
}
