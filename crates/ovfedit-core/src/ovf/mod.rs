//! OVF descriptor model and the engines that edit it.
//!
//! [`OvfDocument`] owns every typed record of one descriptor. The hardware,
//! network and placeholder engines are implemented as methods on it in their
//! own modules.

pub mod allocator;
pub mod document;
pub mod hardware;
pub mod item;
pub mod network;
pub mod placeholder;
pub mod schema;

pub use document::{DiskDescriptor, FileReference, NetworkEntry, OvfDocument, Profile};
pub use hardware::{expand_values, Mutation};
pub use item::{Item, ProfileScope, ProfileSelection};
pub use schema::{ControllerKind, DriveKind, HostResource, ResourceType};

#[cfg(test)]
pub(crate) mod testdata {
    use super::OvfDocument;

    pub const CSR: &str = include_str!("../../tests/fixtures/csr.ovf");
    pub const IOSV: &str = include_str!("../../tests/fixtures/iosv.ovf");
    pub const TWO_CDROMS: &str = include_str!("../../tests/fixtures/two_cdroms.ovf");

    pub fn csr() -> OvfDocument {
        OvfDocument::parse(CSR).unwrap()
    }

    pub fn iosv() -> OvfDocument {
        OvfDocument::parse(IOSV).unwrap()
    }

    pub fn two_cdroms() -> OvfDocument {
        OvfDocument::parse(TWO_CDROMS).unwrap()
    }
}
