//! Guest platform capability table.
//!
//! Each guest product has an immutable [`Platform`] record describing its
//! hardware limits, supported NIC types, NIC naming convention, controller
//! placement and bootstrap disk policy. Platform records are composed from
//! [`GENERIC`] with struct update syntax, and looked up through an explicit
//! [`PlatformRegistry`] built once and passed to whoever needs it.
//!
//! A [`Validator`] checks requested values against one platform and memoizes
//! the pairs it has already accepted, so a value applied to several profiles
//! is only reported once.

use std::collections::HashSet;
use std::fmt;

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::ovf::schema::{ControllerKind, DriveKind};

/// Hardware quantities the table places limits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HardwareKind {
    Cpus,
    /// Memory in MiB.
    Memory,
    NicCount,
    SerialCount,
}

impl fmt::Display for HardwareKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HardwareKind::Cpus => f.write_str("cpus"),
            HardwareKind::Memory => f.write_str("memory (MiB)"),
            HardwareKind::NicCount => f.write_str("nic count"),
            HardwareKind::SerialCount => f.write_str("serial port count"),
        }
    }
}

/// Limits on one hardware quantity.
///
/// The closed range (`min`..=`max`) and the discrete `allowed` set are
/// independent checks. `soft_min`/`soft_max` produce warnings only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub min: u64,
    pub max: Option<u64>,
    pub allowed: Option<&'static [u64]>,
    pub soft_min: Option<u64>,
    pub soft_max: Option<u64>,
}

impl Limits {
    pub const fn range(min: u64, max: Option<u64>) -> Self {
        Self {
            min,
            max,
            allowed: None,
            soft_min: None,
            soft_max: None,
        }
    }

    pub const fn with_allowed(self, allowed: &'static [u64]) -> Self {
        Self {
            allowed: Some(allowed),
            ..self
        }
    }

    pub const fn with_soft_min(self, soft_min: u64) -> Self {
        Self {
            soft_min: Some(soft_min),
            ..self
        }
    }

    pub const fn with_soft_max(self, soft_max: u64) -> Self {
        Self {
            soft_max: Some(soft_max),
            ..self
        }
    }
}

/// Outcome of a successful check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Check {
    Ok,
    /// Accepted, but outside the platform's recommended range.
    Warn(String),
}

/// Capability record for one guest platform.
#[derive(Debug, Clone, Copy)]
pub struct Platform {
    pub name: &'static str,
    pub cpus: Limits,
    pub memory_mib: Limits,
    pub nic_count: Limits,
    pub serial_count: Limits,
    /// Supported NIC types, in canonical spelling. The first is the default.
    pub nic_types: &'static [&'static str],
    /// Drive kind the bootstrap configuration is delivered on.
    pub bootstrap_drive: &'static str,
    /// Canonical name for the primary configuration file inside the bootstrap image.
    pub config_file: Option<&'static str>,
    /// Canonical name for the secondary configuration file, if the platform has that slot.
    pub secondary_config_file: Option<&'static str>,
    /// NIC naming convention, 1-based.
    pub nic_namer: fn(u32) -> String,
    /// Controller family a newly created drive of each kind is attached to.
    pub controller_for: fn(DriveKind) -> ControllerKind,
}

impl Platform {
    pub fn limits(&self, kind: HardwareKind) -> &Limits {
        match kind {
            HardwareKind::Cpus => &self.cpus,
            HardwareKind::Memory => &self.memory_mib,
            HardwareKind::NicCount => &self.nic_count,
            HardwareKind::SerialCount => &self.serial_count,
        }
    }

    /// Check a value against this platform without any memoization.
    pub fn check(&self, kind: HardwareKind, value: u64) -> Result<Check> {
        let limits = self.limits(kind);
        if value < limits.min {
            return Err(Error::ValueTooLow {
                kind: kind.to_string(),
                value,
                min: limits.min,
                platform: self.name.to_string(),
            });
        }
        if let Some(max) = limits.max {
            if value > max {
                return Err(Error::ValueTooHigh {
                    kind: kind.to_string(),
                    value,
                    max,
                    platform: self.name.to_string(),
                });
            }
        }
        if let Some(allowed) = limits.allowed {
            if !allowed.contains(&value) {
                return Err(Error::unsupported(format!(
                    "{kind} value {value} is not supported by {} (supported values: {allowed:?})",
                    self.name
                )));
            }
        }
        if let Some(soft_min) = limits.soft_min {
            if value < soft_min {
                return Ok(Check::Warn(format!(
                    "{kind} value {value} is below the recommended minimum of {soft_min} for {}",
                    self.name
                )));
            }
        }
        if let Some(soft_max) = limits.soft_max {
            if value > soft_max {
                return Ok(Check::Warn(format!(
                    "{kind} value {value} is above the recommended maximum of {soft_max} for {}",
                    self.name
                )));
            }
        }
        Ok(Check::Ok)
    }

    /// Conventional name of the n-th NIC (1-based).
    pub fn nic_name(&self, n: u32) -> String {
        (self.nic_namer)(n)
    }

    pub fn controller_type(&self, drive: DriveKind) -> ControllerKind {
        (self.controller_for)(drive)
    }

    pub fn bootstrap_drive_kind(&self) -> Result<DriveKind> {
        DriveKind::parse(self.bootstrap_drive)
    }

    /// Canonical spelling of a supported NIC type, matched case-insensitively.
    pub fn normalize_nic_type(&self, requested: &str) -> Result<&'static str> {
        self.nic_types
            .iter()
            .find(|t| t.eq_ignore_ascii_case(requested.trim()))
            .copied()
            .ok_or_else(|| {
                Error::unsupported(format!(
                    "NIC type '{requested}' is not supported by {} (supported: {})",
                    self.name,
                    self.nic_types.join(", ")
                ))
            })
    }

    pub fn default_nic_type(&self) -> Option<&'static str> {
        self.nic_types.first().copied()
    }
}

fn generic_nic_name(n: u32) -> String {
    format!("Ethernet{n}")
}

fn ide_for_everything(_drive: DriveKind) -> ControllerKind {
    ControllerKind::Ide
}

fn scsi_disks_ide_cdroms(drive: DriveKind) -> ControllerKind {
    match drive {
        DriveKind::Harddisk => ControllerKind::Scsi,
        DriveKind::Cdrom => ControllerKind::Ide,
    }
}

/// Fallback record for unrecognized products.
pub const GENERIC: Platform = Platform {
    name: "generic platform",
    cpus: Limits::range(1, None),
    memory_mib: Limits::range(1, None),
    nic_count: Limits::range(0, None),
    serial_count: Limits::range(0, None),
    nic_types: &["E1000", "E1000e", "PCNet32", "virtio", "VMXNET3"],
    bootstrap_drive: "cdrom",
    config_file: Some("config.txt"),
    secondary_config_file: None,
    nic_namer: generic_nic_name,
    controller_for: ide_for_everything,
};

fn iosv_nic_name(n: u32) -> String {
    format!("GigabitEthernet0/{}", n.saturating_sub(1))
}

pub const IOSV: Platform = Platform {
    name: "Cisco IOSv",
    cpus: Limits::range(1, Some(1)),
    memory_mib: Limits::range(192, Some(3072)).with_soft_min(384),
    nic_count: Limits::range(0, Some(16)),
    serial_count: Limits::range(1, Some(2)),
    nic_types: &["E1000"],
    bootstrap_drive: "harddisk",
    config_file: Some("ios_config.txt"),
    nic_namer: iosv_nic_name,
    ..GENERIC
};

fn csr1000v_nic_name(n: u32) -> String {
    format!("GigabitEthernet{n}")
}

pub const CSR1000V: Platform = Platform {
    name: "Cisco CSR1000V",
    cpus: Limits::range(1, Some(8)).with_allowed(&[1, 2, 4, 8]),
    memory_mib: Limits::range(2560, Some(8192)).with_soft_min(3072),
    nic_count: Limits::range(3, Some(26)),
    serial_count: Limits::range(0, Some(2)),
    nic_types: &["VMXNET3", "E1000", "virtio"],
    config_file: Some("iosxe_config.txt"),
    nic_namer: csr1000v_nic_name,
    controller_for: scsi_disks_ide_cdroms,
    ..GENERIC
};

fn nxosv_nic_name(n: u32) -> String {
    if n <= 1 {
        "mgmt0".to_string()
    } else {
        format!("Ethernet2/{}", n - 1)
    }
}

pub const NXOSV: Platform = Platform {
    name: "Cisco NX-OSv",
    cpus: Limits::range(1, Some(8)),
    memory_mib: Limits::range(2048, Some(8192)).with_soft_min(3072),
    nic_count: Limits::range(0, Some(32)),
    serial_count: Limits::range(1, Some(2)),
    nic_types: &["E1000", "virtio"],
    config_file: Some("nxos_config.txt"),
    nic_namer: nxosv_nic_name,
    ..GENERIC
};

fn iosxrv_nic_name(n: u32) -> String {
    if n <= 1 {
        "MgmtEth0/0/CPU0/0".to_string()
    } else {
        format!("GigabitEthernet0/0/0/{}", n - 2)
    }
}

pub const IOSXRV: Platform = Platform {
    name: "Cisco IOS XRv",
    cpus: Limits::range(1, Some(8)),
    memory_mib: Limits::range(3072, Some(8192)),
    nic_count: Limits::range(1, Some(128)),
    serial_count: Limits::range(1, Some(4)),
    nic_types: &["E1000", "virtio"],
    config_file: Some("iosxr_config.txt"),
    secondary_config_file: Some("iosxr_config_admin.txt"),
    nic_namer: iosxrv_nic_name,
    ..GENERIC
};

fn asav_nic_name(n: u32) -> String {
    if n <= 1 {
        "Management0/0".to_string()
    } else {
        format!("GigabitEthernet0/{}", n - 2)
    }
}

pub const ASAV: Platform = Platform {
    name: "Cisco ASAv",
    cpus: Limits::range(1, Some(4)).with_allowed(&[1, 4]),
    memory_mib: Limits::range(2048, Some(8192)),
    nic_count: Limits::range(3, Some(10)),
    serial_count: Limits::range(0, Some(1)),
    nic_types: &["VMXNET3", "E1000", "virtio"],
    config_file: Some("day0-config"),
    nic_namer: asav_nic_name,
    ..GENERIC
};

/// Product identifier to platform mapping.
#[derive(Debug, Clone)]
pub struct PlatformRegistry {
    entries: Vec<(&'static str, &'static Platform)>,
}

impl PlatformRegistry {
    /// An empty registry; every lookup falls back to [`GENERIC`].
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Registry holding every built-in platform under its product class and short alias.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register("generic", &GENERIC);
        registry.register("com.cisco.iosv", &IOSV);
        registry.register("iosv", &IOSV);
        registry.register("com.cisco.csr1000v", &CSR1000V);
        registry.register("csr1000v", &CSR1000V);
        registry.register("com.cisco.nx-osv", &NXOSV);
        registry.register("nxosv", &NXOSV);
        registry.register("com.cisco.ios-xrv", &IOSXRV);
        registry.register("iosxrv", &IOSXRV);
        registry.register("com.cisco.asav", &ASAV);
        registry.register("asav", &ASAV);
        registry
    }

    pub fn register(&mut self, product: &'static str, platform: &'static Platform) {
        self.entries.push((product, platform));
    }

    /// Find the platform for a product identifier. Unknown or absent
    /// identifiers return [`GENERIC`].
    pub fn lookup(&self, product: Option<&str>) -> &'static Platform {
        let Some(product) = product.map(str::trim).filter(|p| !p.is_empty()) else {
            info!("no product identifier present, using {}", GENERIC.name);
            return &GENERIC;
        };
        match self
            .entries
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(product))
        {
            Some((_, platform)) => *platform,
            None => {
                info!(
                    "unrecognized product '{product}', falling back to {}",
                    GENERIC.name
                );
                &GENERIC
            }
        }
    }
}

impl Default for PlatformRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Memo of `(kind, value)` pairs a validator has already accepted.
#[derive(Debug, Default)]
pub struct ValidationCache {
    seen: HashSet<(HardwareKind, u64)>,
}

impl ValidationCache {
    pub fn contains(&self, kind: HardwareKind, value: u64) -> bool {
        self.seen.contains(&(kind, value))
    }

    fn insert(&mut self, kind: HardwareKind, value: u64) {
        self.seen.insert((kind, value));
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// Validates requested values against one platform for one edit session.
#[derive(Debug)]
pub struct Validator<'a> {
    platform: &'a Platform,
    cache: ValidationCache,
}

impl<'a> Validator<'a> {
    pub fn new(platform: &'a Platform) -> Self {
        Self {
            platform,
            cache: ValidationCache::default(),
        }
    }

    pub fn platform(&self) -> &'a Platform {
        self.platform
    }

    pub fn cache(&self) -> &ValidationCache {
        &self.cache
    }

    /// Validate a count, logging soft-threshold warnings at most once per pair.
    pub fn validate_count(&mut self, kind: HardwareKind, value: u64) -> Result<()> {
        if self.cache.contains(kind, value) {
            return Ok(());
        }
        if let Check::Warn(message) = self.platform.check(kind, value)? {
            warn!("{message}");
        }
        self.cache.insert(kind, value);
        Ok(())
    }
}
