//! Logical network table.

use std::collections::BTreeSet;

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::ovf::document::{NetworkEntry, OvfDocument};
use crate::ovf::schema::ResourceType;

impl OvfDocument {
    pub fn network(&self, name: &str) -> Option<&NetworkEntry> {
        self.networks.iter().find(|network| network.name == name)
    }

    /// Look up a network by name, creating it (described by its own name) if needed.
    pub fn ensure_network(&mut self, name: &str) -> &NetworkEntry {
        let idx = match self.networks.iter().position(|network| network.name == name) {
            Some(idx) => idx,
            None => {
                debug!("adding network '{name}'");
                self.networks.push(NetworkEntry {
                    name: name.to_string(),
                    description: name.to_string(),
                });
                self.network_section = true;
                self.networks.len() - 1
            }
        };
        &self.networks[idx]
    }

    pub fn set_network_description(&mut self, name: &str, description: &str) -> Result<()> {
        let network = self
            .networks
            .iter_mut()
            .find(|network| network.name == name)
            .ok_or_else(|| Error::lookup(format!("no network named '{name}'")))?;
        network.description = description.to_string();
        Ok(())
    }

    /// Names of networks some NIC, in any profile, is connected to.
    pub fn referenced_networks(&self) -> BTreeSet<String> {
        self.items
            .iter()
            .filter(|item| item.is_kind(ResourceType::EthernetAdapter))
            .flat_map(|item| item.get_all("Connection"))
            .map(str::to_string)
            .collect()
    }

    /// Remove networks no NIC refers to. Returns the names removed.
    ///
    /// If that leaves no networks at all, the NetworkSection is dropped too.
    pub fn garbage_collect_networks(&mut self) -> Vec<String> {
        let referenced = self.referenced_networks();
        let mut removed = Vec::new();
        self.networks.retain(|network| {
            if referenced.contains(&network.name) {
                true
            } else {
                info!("removing unused network '{}'", network.name);
                removed.push(network.name.clone());
                false
            }
        });
        if !removed.is_empty() && self.networks.is_empty() && self.network_section {
            info!("no networks remain, removing NetworkSection");
            self.network_section = false;
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use crate::ovf::item::ProfileSelection;
    use crate::ovf::testdata;

    use super::*;

    #[test]
    fn test_ensure_network_creates_once() {
        let mut doc = testdata::two_cdroms();
        assert!(!doc.has_network_section());
        assert_eq!(doc.ensure_network("mgmt").description, "mgmt");
        doc.ensure_network("mgmt");
        assert_eq!(doc.networks().len(), 1);
        assert!(doc.has_network_section());
    }

    #[test]
    fn test_set_network_description() {
        let mut doc = testdata::csr();
        doc.set_network_description("GigabitEthernet1", "Management")
            .unwrap();
        assert_eq!(
            doc.network("GigabitEthernet1").unwrap().description,
            "Management"
        );
        assert!(matches!(
            doc.set_network_description("nope", "x"),
            Err(Error::Lookup { .. })
        ));
    }

    #[test]
    fn test_garbage_collect_keeps_referenced() {
        let mut doc = testdata::csr();
        doc.ensure_network("orphan");
        assert_eq!(doc.garbage_collect_networks(), ["orphan"]);
        assert_eq!(doc.networks().len(), 3);
        assert!(doc.has_network_section());
    }

    #[test]
    fn test_network_still_referenced_by_one_profile_survives() {
        let mut doc = testdata::csr();
        let retarget = vec!["GigabitEthernet1".to_string()];
        doc.set_nic_networks(&retarget, None, &ProfileSelection::single("1CPU-4GB"))
            .unwrap();
        doc.garbage_collect_networks();
        // other profiles still use the second and third networks
        assert!(doc.network("GigabitEthernet2").is_some());
        assert!(doc.network("GigabitEthernet3").is_some());
    }

    #[test]
    fn test_removing_last_network_removes_section() {
        let mut doc = testdata::csr();
        for id in [8, 9, 10] {
            doc.apply(id, &ProfileSelection::All, &crate::ovf::Mutation::Delete)
                .unwrap();
        }
        let removed = doc.garbage_collect_networks();
        assert_eq!(removed.len(), 3);
        assert!(!doc.has_network_section());
        assert!(!doc.to_xml().unwrap().contains("NetworkSection"));
    }
}
