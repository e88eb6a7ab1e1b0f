//! Profile-scoped reconciliation of hardware items.
//!
//! Every edit is expressed as [`OvfDocument::apply`] on one logical device
//! (an instance id) for a set of profiles. Items whose scope straddles the
//! targeted profiles are split before mutating, and variants that end up
//! with identical settings are merged back together afterwards, so the
//! document always holds the smallest set of items that describes each
//! profile's hardware.

use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::ovf::document::OvfDocument;
use crate::ovf::item::{Item, ProfileScope, ProfileSelection};
use crate::ovf::schema::{ControllerKind, ResourceType};
use crate::platform::Platform;
use crate::units::MIB_ALLOCATION_UNITS;

/// A change to one logical device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Set (`Some`) or clear (`None`) RASD properties.
    Set(Vec<(String, Option<String>)>),
    Delete,
}

impl Mutation {
    /// Set a single property.
    pub fn set(name: &str, value: impl Into<String>) -> Self {
        Mutation::Set(vec![(name.to_string(), Some(value.into()))])
    }
}

fn apply_changes(item: &mut Item, changes: &[(String, Option<String>)]) {
    for (name, value) in changes {
        match value {
            Some(value) => item.set(name, value.as_str()),
            None => item.remove(name),
        }
    }
}

/// Expand a list of per-device values to exactly `count` values.
///
/// Values are handed out in order. When the list runs out, its last value is
/// reused for every remaining device; if that value contains a `{N}` token,
/// the token counts up from N instead. A list longer than `count` is an error.
pub fn expand_values(values: &[String], count: usize) -> Result<Vec<String>> {
    let Some((last, head)) = values.split_last() else {
        return Err(Error::invalid_input("no values given"));
    };
    if values.len() > count {
        return Err(Error::invalid_input(format!(
            "{} values given but only {count} device(s) to apply them to; {} value(s) unused",
            values.len(),
            values.len() - count
        )));
    }
    let mut expanded = head.to_vec();
    for offset in 0..(count - head.len()) {
        expanded.push(expand_pattern(last, offset as u64)?);
    }
    Ok(expanded)
}

/// Replace the first `{N}` token in `value` with N + `offset`.
fn expand_pattern(value: &str, offset: u64) -> Result<String> {
    let Some(open) = value.find('{') else {
        return Ok(value.to_string());
    };
    let rest = &value[open + 1..];
    let Some(close) = rest.find('}') else {
        return Ok(value.to_string());
    };
    let digits = &rest[..close];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Ok(value.to_string());
    }
    let start: u64 = digits
        .parse()
        .map_err(|_| Error::invalid_input(format!("pattern '{value}' is out of range")))?;
    Ok(format!(
        "{}{}{}",
        &value[..open],
        start + offset,
        &rest[close + 1..]
    ))
}

fn selection_for(profile: Option<&str>) -> ProfileSelection {
    match profile {
        Some(profile) => ProfileSelection::single(profile),
        None => ProfileSelection::All,
    }
}

impl OvfDocument {
    /// Profiles the item at `idx` effectively applies to.
    fn coverage(&self, idx: usize) -> BTreeSet<String> {
        let item = &self.items[idx];
        match &item.scope {
            ProfileScope::Only(scope) => scope.clone(),
            ProfileScope::Default => {
                let mut covered = self.profile_ids();
                for other in self.items_by_instance(item.instance_id) {
                    if let ProfileScope::Only(scope) = &other.scope {
                        covered.retain(|profile| !scope.contains(profile));
                    }
                }
                covered
            }
        }
    }

    /// Apply a mutation to one logical device for a set of profiles.
    ///
    /// Items wholly inside the selection are mutated in place, items that
    /// straddle it are split first, and profiles that don't see the device
    /// yet get a new variant seeded from the default item. Deleting for every
    /// profile removes the device; deleting for a subset only hides it there.
    pub fn apply(
        &mut self,
        instance_id: u32,
        selection: &ProfileSelection,
        mutation: &Mutation,
    ) -> Result<()> {
        let positions = self.item_positions(instance_id);
        let Some(&first) = positions.first() else {
            return Err(Error::lookup(format!(
                "no hardware item with instance id {instance_id}"
            )));
        };

        let target = match selection {
            ProfileSelection::All => self.profile_ids(),
            ProfileSelection::Only(profiles) => profiles.clone(),
        };
        let template = positions
            .iter()
            .map(|&idx| &self.items[idx])
            .find(|item| item.scope.is_default())
            .unwrap_or(&self.items[first])
            .clone();
        let coverages: Vec<(usize, BTreeSet<String>)> = positions
            .iter()
            .map(|&idx| (idx, self.coverage(idx)))
            .collect();
        let claimed: BTreeSet<String> = coverages
            .iter()
            .flat_map(|(_, coverage)| coverage.iter().cloned())
            .collect();

        // Walk backwards so clones inserted after an item don't shift the
        // positions still to be visited.
        let mut doomed = Vec::new();
        for (idx, coverage) in coverages.iter().rev() {
            let idx = *idx;
            let whole =
                selection.is_all() || (!coverage.is_empty() && coverage.is_subset(&target));
            if whole {
                match mutation {
                    Mutation::Set(changes) => apply_changes(&mut self.items[idx], changes),
                    Mutation::Delete => doomed.push(idx),
                }
                continue;
            }

            let inside: BTreeSet<String> = coverage.intersection(&target).cloned().collect();
            if inside.is_empty() {
                continue;
            }
            let outside: BTreeSet<String> = coverage.difference(&target).cloned().collect();
            match mutation {
                Mutation::Set(changes) => {
                    debug!(
                        "splitting item {instance_id} {} for profiles {inside:?}",
                        self.items[idx].scope
                    );
                    let mut clone = self.items[idx].clone();
                    clone.scope = ProfileScope::Only(inside);
                    apply_changes(&mut clone, changes);
                    if !self.items[idx].scope.is_default() {
                        self.items[idx].scope = ProfileScope::Only(outside);
                    }
                    self.items.insert(idx + 1, clone);
                }
                Mutation::Delete => {
                    self.items[idx].scope = ProfileScope::Only(outside);
                }
            }
        }
        for idx in doomed {
            self.items.remove(idx);
        }

        if let Mutation::Set(changes) = mutation {
            let missing: BTreeSet<String> = target.difference(&claimed).cloned().collect();
            if !missing.is_empty() {
                debug!("extending item {instance_id} into profiles {missing:?}");
                let mut variant = template;
                variant.scope = ProfileScope::Only(missing);
                apply_changes(&mut variant, changes);
                let at = self
                    .item_positions(instance_id)
                    .last()
                    .map_or(self.items.len(), |&idx| idx + 1);
                self.items.insert(at, variant);
            }
        }

        self.merge_variants(instance_id);
        Ok(())
    }

    /// Fold variants of a device with identical settings into one item.
    pub(crate) fn merge_variants(&mut self, instance_id: u32) {
        let positions = self.item_positions(instance_id);
        let mut doomed = BTreeSet::new();
        for (n, &keep) in positions.iter().enumerate() {
            if doomed.contains(&keep) {
                continue;
            }
            for &other in &positions[n + 1..] {
                if doomed.contains(&other) || !self.items[keep].same_settings(&self.items[other])
                {
                    continue;
                }
                let merged = match (&self.items[keep].scope, &self.items[other].scope) {
                    (ProfileScope::Only(a), ProfileScope::Only(b)) => {
                        ProfileScope::Only(a.union(b).cloned().collect())
                    }
                    _ => ProfileScope::Default,
                };
                self.items[keep].scope = merged;
                doomed.insert(other);
            }
        }
        for idx in doomed.into_iter().rev() {
            self.items.remove(idx);
        }

        let universe = self.profile_ids();
        if universe.is_empty() {
            return;
        }

        // A default item every profile overrides is unreachable.
        let positions = self.item_positions(instance_id);
        if positions.len() > 1 {
            if let Some(&idx) = positions
                .iter()
                .find(|&&idx| self.items[idx].scope.is_default())
            {
                if self.coverage(idx).is_empty() {
                    self.items.remove(idx);
                }
            }
        }

        for idx in self.item_positions(instance_id) {
            if let ProfileScope::Only(scope) = &self.items[idx].scope {
                if scope.is_superset(&universe) {
                    self.items[idx].scope = ProfileScope::Default;
                }
            }
        }
    }

    /// The profiles an edit iterates over: each selected profile, or a single
    /// `None` when the document declares no profiles at all.
    pub(crate) fn profile_targets(&self, selection: &ProfileSelection) -> Vec<Option<String>> {
        match selection {
            ProfileSelection::All => {
                let universe = self.profile_ids();
                if universe.is_empty() {
                    vec![None]
                } else {
                    universe.into_iter().map(Some).collect()
                }
            }
            ProfileSelection::Only(profiles) => profiles.iter().cloned().map(Some).collect(),
        }
    }

    /// Insert a new device, allocating its instance id. Returns the id.
    pub fn create_item(&mut self, mut item: Item, selection: &ProfileSelection) -> u32 {
        let instance_id = self.next_instance_id();
        item.instance_id = instance_id;
        item.scope = match selection {
            ProfileSelection::All => ProfileScope::Default,
            ProfileSelection::Only(profiles) => ProfileScope::Only(profiles.clone()),
        };
        self.insert_item(item);
        self.merge_variants(instance_id);
        instance_id
    }

    /// Insert an item after the last item of the same resource type.
    pub(crate) fn insert_item(&mut self, item: Item) {
        let at = item
            .resource_type()
            .and_then(|rt| self.items.iter().rposition(|other| other.is_kind(rt)))
            .map_or(self.items.len(), |idx| idx + 1);
        self.items.insert(at, item);
    }

    fn set_singleton(
        &mut self,
        resource_type: ResourceType,
        changes: Vec<(String, Option<String>)>,
        selection: &ProfileSelection,
    ) -> Result<()> {
        let ids = self.instance_ids_of(resource_type);
        if ids.is_empty() {
            info!("no existing {resource_type} item, creating one from scratch");
            let mut item = Item::new(0, resource_type);
            apply_changes(&mut item, &changes);
            self.create_item(item, selection);
            return Ok(());
        }
        let mutation = Mutation::Set(changes);
        for id in ids {
            self.apply(id, selection, &mutation)?;
        }
        Ok(())
    }

    /// Set the number of virtual CPUs.
    pub fn set_cpus(&mut self, cpus: u64, selection: &ProfileSelection) -> Result<()> {
        self.set_singleton(
            ResourceType::Processor,
            vec![
                ("ElementName".to_string(), Some(format!("{cpus} virtual CPU(s)"))),
                ("VirtualQuantity".to_string(), Some(cpus.to_string())),
            ],
            selection,
        )
    }

    /// Set the amount of memory, in MiB.
    pub fn set_memory(&mut self, mib: u64, selection: &ProfileSelection) -> Result<()> {
        self.set_singleton(
            ResourceType::Memory,
            vec![
                (
                    "AllocationUnits".to_string(),
                    Some(MIB_ALLOCATION_UNITS.to_string()),
                ),
                ("ElementName".to_string(), Some(format!("{mib}MB of memory"))),
                ("VirtualQuantity".to_string(), Some(mib.to_string())),
            ],
            selection,
        )
    }

    /// Make each selected profile see exactly `count` devices of a type.
    ///
    /// Devices other profiles already have are extended into the profile
    /// before new ones are created; surplus devices are removed from the
    /// profile newest first.
    pub fn set_item_count(
        &mut self,
        resource_type: ResourceType,
        count: usize,
        selection: &ProfileSelection,
        platform: &Platform,
    ) -> Result<()> {
        for profile in self.profile_targets(selection) {
            let profile = profile.as_deref();
            let scope = selection_for(profile);
            let visible = self.visible_devices(resource_type, profile);

            if visible.len() > count {
                for &id in visible[count..].iter().rev() {
                    debug!("removing {resource_type} {id} from profile {profile:?}");
                    self.apply(id, &scope, &Mutation::Delete)?;
                }
                continue;
            }

            let hidden: Vec<u32> = self
                .instance_ids_of(resource_type)
                .into_iter()
                .filter(|id| !visible.contains(id))
                .collect();
            for id in hidden.into_iter().take(count - visible.len()) {
                self.apply(id, &scope, &Mutation::Set(Vec::new()))?;
            }

            loop {
                let visible = self.visible_devices(resource_type, profile);
                if visible.len() >= count {
                    break;
                }
                self.create_device(resource_type, &visible, profile, platform);
            }
        }
        Ok(())
    }

    /// Create one more device of a type for a profile, cloned from the last
    /// device the profile already sees where possible.
    fn create_device(
        &mut self,
        resource_type: ResourceType,
        visible: &[u32],
        profile: Option<&str>,
        platform: &Platform,
    ) -> u32 {
        let ordinal = visible.len() as u32 + 1;
        let template = visible
            .last()
            .and_then(|&id| self.effective_item(id, profile))
            .cloned();
        let mut item = match template {
            Some(mut template) => {
                template.remove("Address");
                template
            }
            None => {
                info!("no existing {resource_type} to clone, creating one from scratch");
                let mut item = Item::new(0, resource_type);
                item.set("AutomaticAllocation", "true");
                if resource_type == ResourceType::EthernetAdapter {
                    if let Some(nic_type) = platform.default_nic_type() {
                        item.set("ResourceSubType", nic_type);
                    }
                }
                item
            }
        };

        match resource_type {
            ResourceType::EthernetAdapter => item.set("ElementName", platform.nic_name(ordinal)),
            ResourceType::SerialPort => item.set("ElementName", format!("Serial {ordinal}")),
            _ => {}
        }
        if item.address_on_parent().is_some() {
            let next = match item.parent() {
                Some(parent) => self.next_address_on_parent(parent),
                None => self
                    .items
                    .iter()
                    .filter(|other| other.is_kind(resource_type))
                    .filter_map(Item::address_on_parent)
                    .max()
                    .map_or(0, |address| address + 1),
            };
            item.set("AddressOnParent", next.to_string());
        }

        self.create_item(item, &selection_for(profile))
    }

    /// Set one property on each device of a type, per profile, from a list of
    /// values. Returns the expanded values, or nothing if there were no devices.
    fn set_per_device(
        &mut self,
        resource_type: ResourceType,
        property: &str,
        values: &[String],
        selection: &ProfileSelection,
    ) -> Result<Vec<String>> {
        let per_profile: Vec<(Option<String>, Vec<u32>)> = self
            .profile_targets(selection)
            .into_iter()
            .map(|profile| {
                let ids = self.visible_devices(resource_type, profile.as_deref());
                (profile, ids)
            })
            .collect();
        let most = per_profile.iter().map(|(_, ids)| ids.len()).max().unwrap_or(0);
        if most == 0 {
            warn!("no existing {resource_type} devices to update, nothing to do");
            return Ok(Vec::new());
        }

        let expanded = expand_values(values, most)?;
        for (profile, ids) in per_profile {
            let scope = selection_for(profile.as_deref());
            for (&id, value) in ids.iter().zip(&expanded) {
                self.apply(id, &scope, &Mutation::set(property, value.as_str()))?;
            }
        }
        Ok(expanded)
    }

    /// Set NIC names (ElementName), in device order.
    pub fn set_nic_names(&mut self, names: &[String], selection: &ProfileSelection) -> Result<()> {
        self.set_per_device(ResourceType::EthernetAdapter, "ElementName", names, selection)?;
        Ok(())
    }

    /// Set NIC MAC addresses, in device order.
    pub fn set_nic_macs(&mut self, macs: &[String], selection: &ProfileSelection) -> Result<()> {
        self.set_per_device(ResourceType::EthernetAdapter, "Address", macs, selection)?;
        Ok(())
    }

    /// Set the hardware type of every NIC.
    pub fn set_nic_type(&mut self, nic_type: &str, selection: &ProfileSelection) -> Result<()> {
        self.set_per_device(
            ResourceType::EthernetAdapter,
            "ResourceSubType",
            &[nic_type.to_string()],
            selection,
        )?;
        Ok(())
    }

    /// Connect NICs to networks in device order, creating network entries as
    /// needed and optionally setting their descriptions.
    pub fn set_nic_networks(
        &mut self,
        networks: &[String],
        descriptions: Option<&[String]>,
        selection: &ProfileSelection,
    ) -> Result<()> {
        let names =
            self.set_per_device(ResourceType::EthernetAdapter, "Connection", networks, selection)?;
        if names.is_empty() {
            return Ok(());
        }
        let descriptions = descriptions
            .map(|descriptions| expand_values(descriptions, names.len()))
            .transpose()?;
        for (n, name) in names.iter().enumerate() {
            self.ensure_network(name);
            if let Some(descriptions) = &descriptions {
                self.set_network_description(name, &descriptions[n])?;
            }
        }
        Ok(())
    }

    /// Set serial port connectivity URIs (e.g. `telnet://:9101`), in device order.
    pub fn set_serial_connectivity(
        &mut self,
        connections: &[String],
        selection: &ProfileSelection,
    ) -> Result<()> {
        self.set_per_device(ResourceType::SerialPort, "Address", connections, selection)?;
        Ok(())
    }

    /// Set the ResourceSubType of controllers of one family, in device order.
    pub fn set_controller_subtypes(
        &mut self,
        kind: ControllerKind,
        subtypes: &[String],
        selection: &ProfileSelection,
    ) -> Result<()> {
        self.set_per_device(kind.resource_type(), "ResourceSubType", subtypes, selection)?;
        Ok(())
    }

    /// Delete every profile not listed in `keep`, along with the items that
    /// only applied to deleted profiles.
    pub fn delete_profiles_except(&mut self, keep: &[String]) {
        for id in keep {
            if self.profile(id).is_none() {
                warn!("profile '{id}' does not exist and cannot be kept");
            }
        }
        let doomed: BTreeSet<String> = self
            .profile_ids()
            .into_iter()
            .filter(|profile| !keep.contains(profile))
            .collect();
        if doomed.is_empty() {
            return;
        }
        for profile in &doomed {
            info!("deleting profile '{profile}'");
        }

        self.profiles.retain(|profile| !doomed.contains(&profile.id));
        self.items.retain_mut(|item| match &mut item.scope {
            ProfileScope::Only(scope) => {
                scope.retain(|profile| !doomed.contains(profile));
                !scope.is_empty()
            }
            ProfileScope::Default => true,
        });

        let ids: BTreeSet<u32> = self.items.iter().map(|item| item.instance_id).collect();
        for id in ids {
            self.merge_variants(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::ovf::testdata;

    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn cpus(doc: &OvfDocument, profile: &str) -> Option<u64> {
        doc.effective_item(1, Some(profile))
            .and_then(Item::virtual_quantity)
    }

    #[test]
    fn test_expand_values_reuses_last() {
        let values = strings(&["a", "b"]);
        assert_eq!(expand_values(&values, 3).unwrap(), ["a", "b", "b"]);
        assert_eq!(expand_values(&strings(&["a"]), 3).unwrap(), ["a", "a", "a"]);
    }

    #[test]
    fn test_expand_values_pattern() {
        let values = strings(&["mgmt", "eth{10}"]);
        assert_eq!(
            expand_values(&values, 3).unwrap(),
            ["mgmt", "eth10", "eth11"]
        );
        assert_eq!(
            expand_values(&strings(&["Gi0/{0}"]), 2).unwrap(),
            ["Gi0/0", "Gi0/1"]
        );
    }

    #[test]
    fn test_expand_values_too_many() {
        let err = expand_values(&strings(&["a", "b", "c"]), 1).unwrap_err();
        assert!(err.to_string().contains("2 value(s) unused"));
        assert!(expand_values(&[], 2).is_err());
    }

    #[test]
    fn test_expand_pattern_ignores_non_numeric_braces() {
        assert_eq!(expand_pattern("x{y}", 3).unwrap(), "x{y}");
        assert_eq!(expand_pattern("plain", 3).unwrap(), "plain");
    }

    #[test]
    fn test_split_only_touches_selected_profiles() {
        let mut doc = testdata::csr();
        doc.apply(
            2,
            &ProfileSelection::single("2CPU-4GB"),
            &Mutation::set("VirtualQuantity", "8192"),
        )
        .unwrap();
        let memory = |doc: &OvfDocument, p: &str| {
            doc.effective_item(2, Some(p)).unwrap().virtual_quantity()
        };
        assert_eq!(memory(&doc, "2CPU-4GB"), Some(8192));
        assert_eq!(memory(&doc, "1CPU-4GB"), Some(4096));
        assert_eq!(memory(&doc, "4CPU-4GB"), Some(4096));
        // the default item keeps covering the other profiles
        assert_eq!(doc.items_by_instance(2).count(), 2);
    }

    #[test]
    fn test_set_for_all_profiles_merges_to_default() {
        let mut doc = testdata::csr();
        assert_eq!(doc.items_by_instance(1).count(), 3);
        doc.set_cpus(2, &ProfileSelection::All).unwrap();
        let variants: Vec<&Item> = doc.items_by_instance(1).collect();
        assert_eq!(variants.len(), 1);
        assert!(variants[0].scope.is_default());
        assert_eq!(variants[0].virtual_quantity(), Some(2));
        assert_eq!(variants[0].element_name(), Some("2 virtual CPU(s)"));
    }

    #[test]
    fn test_set_matching_existing_variant_merges() {
        let mut doc = testdata::csr();
        doc.set_cpus(2, &ProfileSelection::single("4CPU-4GB")).unwrap();
        let variants: Vec<&Item> = doc.items_by_instance(1).collect();
        assert_eq!(variants.len(), 2);
        assert_eq!(
            variants[1].scope,
            ProfileScope::only(["2CPU-4GB", "4CPU-4GB"])
        );
        assert_eq!(cpus(&doc, "1CPU-4GB"), Some(1));
    }

    #[test]
    fn test_set_is_idempotent() {
        let mut once = testdata::csr();
        let selection = ProfileSelection::Only(BTreeSet::from([
            "1CPU-4GB".to_string(),
            "4CPU-4GB".to_string(),
        ]));
        once.set_memory(3072, &selection).unwrap();
        let mut twice = once.clone();
        twice.set_memory(3072, &selection).unwrap();
        assert_eq!(once.items(), twice.items());
        assert_eq!(once.to_xml().unwrap(), twice.to_xml().unwrap());
    }

    #[test]
    fn test_delete_for_subset_keeps_other_profiles() {
        let mut doc = testdata::csr();
        doc.apply(10, &ProfileSelection::single("1CPU-4GB"), &Mutation::Delete)
            .unwrap();
        assert!(doc.effective_item(10, Some("1CPU-4GB")).is_none());
        assert!(doc.effective_item(10, Some("2CPU-4GB")).is_some());
        assert_eq!(
            doc.items_by_instance(10).next().unwrap().scope,
            ProfileScope::only(["2CPU-4GB", "4CPU-4GB"])
        );
    }

    #[test]
    fn test_delete_for_all_removes_device() {
        let mut doc = testdata::csr();
        doc.apply(1, &ProfileSelection::All, &Mutation::Delete).unwrap();
        assert_eq!(doc.items_by_instance(1).count(), 0);
        assert!(matches!(
            doc.apply(1, &ProfileSelection::All, &Mutation::Delete),
            Err(Error::Lookup { .. })
        ));
    }

    #[test]
    fn test_set_extends_device_into_missing_profile() {
        let mut doc = testdata::csr();
        doc.apply(10, &ProfileSelection::single("1CPU-4GB"), &Mutation::Delete)
            .unwrap();
        doc.apply(
            10,
            &ProfileSelection::single("1CPU-4GB"),
            &Mutation::Set(Vec::new()),
        )
        .unwrap();
        let variants: Vec<&Item> = doc.items_by_instance(10).collect();
        assert_eq!(variants.len(), 1);
        assert!(variants[0].scope.is_default());
    }

    #[test]
    fn test_delete_profiles_except() {
        let mut doc = testdata::csr();
        doc.delete_profiles_except(&strings(&["4CPU-4GB"]));
        assert_eq!(doc.profile_ids(), BTreeSet::from(["4CPU-4GB".to_string()]));
        let variants: Vec<&Item> = doc.items_by_instance(1).collect();
        assert_eq!(variants.len(), 1);
        assert!(variants[0].scope.is_default());
        assert_eq!(variants[0].virtual_quantity(), Some(4));
    }

    #[test]
    fn test_create_item_allocates_after_same_kind() {
        let mut doc = testdata::csr();
        let mut item = Item::new(0, ResourceType::EthernetAdapter);
        item.set("ElementName", "extra");
        let id = doc.create_item(item, &ProfileSelection::All);
        assert_eq!(id, 12);
        let position = doc.item_positions(12)[0];
        assert_eq!(doc.items()[position - 1].instance_id, 10);
    }
}
