//! Hardware items and the profile scopes they apply to.

use std::collections::BTreeSet;
use std::fmt;

use crate::ovf::schema::{HostResource, ResourceType};
use crate::xml::Element;

/// Which profiles an item applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileScope {
    /// No `ovf:configuration` attribute: applies to every profile not
    /// claimed by a profile-specific variant of the same device.
    Default,
    /// Applies only to the listed profiles.
    Only(BTreeSet<String>),
}

impl ProfileScope {
    /// Parse the space-separated `ovf:configuration` attribute.
    pub fn parse(attr: Option<&str>) -> Self {
        let profiles: BTreeSet<String> = attr
            .unwrap_or_default()
            .split_whitespace()
            .map(str::to_string)
            .collect();
        if profiles.is_empty() {
            ProfileScope::Default
        } else {
            ProfileScope::Only(profiles)
        }
    }

    pub fn only<I, S>(profiles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ProfileScope::Only(profiles.into_iter().map(Into::into).collect())
    }

    pub fn is_default(&self) -> bool {
        matches!(self, ProfileScope::Default)
    }

    /// Value for the `ovf:configuration` attribute, if one is needed.
    pub fn to_attr(&self) -> Option<String> {
        match self {
            ProfileScope::Default => None,
            ProfileScope::Only(profiles) => {
                Some(profiles.iter().cloned().collect::<Vec<_>>().join(" "))
            }
        }
    }
}

impl fmt::Display for ProfileScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_attr() {
            Some(list) => write!(f, "[{list}]"),
            None => f.write_str("(default)"),
        }
    }
}

/// The set of profiles an edit targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileSelection {
    All,
    Only(BTreeSet<String>),
}

impl ProfileSelection {
    /// Build a selection from an optional CLI-style profile list; an absent
    /// or empty list selects every profile.
    pub fn from_list(profiles: Option<&[String]>) -> Self {
        match profiles {
            Some(list) if !list.is_empty() => {
                ProfileSelection::Only(list.iter().cloned().collect())
            }
            _ => ProfileSelection::All,
        }
    }

    pub fn single(profile: impl Into<String>) -> Self {
        ProfileSelection::Only(BTreeSet::from([profile.into()]))
    }

    pub fn is_all(&self) -> bool {
        matches!(self, ProfileSelection::All)
    }
}

/// One `Item` element of a VirtualHardwareSection.
///
/// Profile-specific variants of the same logical device share an instance id
/// and carry disjoint scopes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub instance_id: u32,
    pub scope: ProfileScope,
    /// RASD properties keyed by local name, kept in schema (alphabetical) order.
    properties: Vec<(String, String)>,
    /// Attributes of the `Item` element other than `ovf:configuration`.
    pub attributes: Vec<(String, String)>,
    /// Child elements outside the RASD namespace, kept verbatim.
    pub extra: Vec<Element>,
}

impl Item {
    pub fn new(instance_id: u32, resource_type: ResourceType) -> Self {
        let mut item = Self {
            instance_id,
            scope: ProfileScope::Default,
            properties: Vec::new(),
            attributes: Vec::new(),
            extra: Vec::new(),
        };
        item.set("ResourceType", resource_type.code().to_string());
        item
    }

    /// Build an item from already-parsed parts.
    pub fn from_parts(
        instance_id: u32,
        scope: ProfileScope,
        properties: Vec<(String, String)>,
        attributes: Vec<(String, String)>,
        extra: Vec<Element>,
    ) -> Self {
        let mut item = Self {
            instance_id,
            scope,
            properties: Vec::new(),
            attributes,
            extra,
        };
        for (name, value) in properties {
            item.add(&name, value);
        }
        item
    }

    /// First value of a property.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// All values of a repeatable property such as `HostResource`.
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.properties
            .iter()
            .filter(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
            .collect()
    }

    /// Replace every value of a property with a single value.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.remove(name);
        self.add(name, value);
    }

    /// Add a value without removing existing ones.
    pub fn add(&mut self, name: &str, value: impl Into<String>) {
        let position = self
            .properties
            .iter()
            .position(|(key, _)| key.as_str() > name)
            .unwrap_or(self.properties.len());
        self.properties
            .insert(position, (name.to_string(), value.into()));
    }

    pub fn remove(&mut self, name: &str) {
        self.properties.retain(|(key, _)| key != name);
    }

    pub fn properties(&self) -> &[(String, String)] {
        &self.properties
    }

    /// Whether two items describe the same settings, ignoring scope.
    pub fn same_settings(&self, other: &Item) -> bool {
        self.instance_id == other.instance_id
            && self.properties == other.properties
            && self.attributes == other.attributes
            && self.extra == other.extra
    }

    pub fn resource_type(&self) -> Option<ResourceType> {
        self.get("ResourceType")
            .and_then(|code| code.trim().parse().ok())
            .and_then(ResourceType::from_code)
    }

    pub fn is_kind(&self, resource_type: ResourceType) -> bool {
        self.resource_type() == Some(resource_type)
    }

    pub fn element_name(&self) -> Option<&str> {
        self.get("ElementName")
    }

    pub fn parent(&self) -> Option<u32> {
        self.get("Parent").and_then(|p| p.trim().parse().ok())
    }

    pub fn address_on_parent(&self) -> Option<u32> {
        self.get("AddressOnParent")
            .and_then(|a| a.trim().parse().ok())
    }

    pub fn virtual_quantity(&self) -> Option<u64> {
        self.get("VirtualQuantity")
            .and_then(|q| q.trim().parse().ok())
    }

    pub fn host_resource(&self) -> Option<HostResource> {
        self.get("HostResource").map(HostResource::parse)
    }
}
