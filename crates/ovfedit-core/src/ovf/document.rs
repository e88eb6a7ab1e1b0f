//! Typed model of an OVF descriptor.
//!
//! The envelope is parsed into a generic tree, and the sections this tool
//! edits (References, DiskSection, NetworkSection, DeploymentOptionSection
//! and the Items of the VirtualHardwareSection) are extracted into typed
//! records. On save the records are written back into a copy of the tree,
//! so everything else in the descriptor survives untouched.

use std::collections::BTreeSet;
use std::path::PathBuf;

use tracing::info;

use crate::error::{Error, Result};
use crate::ovf::item::{Item, ProfileScope};
use crate::ovf::schema::{ResourceType, OVF_NAMESPACE_1, OVF_NAMESPACE_2, RASD_NAMESPACE};
use crate::xml::{self, Element, Node};

/// A deployment option (`Configuration` element).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub id: String,
    pub label: String,
    pub description: String,
    pub default: bool,
}

/// A logical network NICs can connect to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkEntry {
    pub name: String,
    pub description: String,
}

/// A `File` element of the References section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReference {
    pub id: String,
    pub href: String,
    pub size: Option<u64>,
    /// Attributes other than id, href and size, in document order.
    pub extra_attributes: Vec<(String, String)>,
    /// Local file supplying the content. `None` means the file lives in the
    /// package alongside the descriptor under its `href`.
    pub source: Option<PathBuf>,
}

impl FileReference {
    pub fn new(id: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            href: href.into(),
            size: None,
            extra_attributes: Vec::new(),
            source: None,
        }
    }
}

/// A `Disk` element of the DiskSection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskDescriptor {
    pub id: String,
    pub capacity: String,
    pub capacity_units: Option<String>,
    pub format: Option<String>,
    /// Backing file id; `None` for a blank disk.
    pub file_ref: Option<String>,
    pub populated_size: Option<u64>,
    pub extra_attributes: Vec<(String, String)>,
}

impl DiskDescriptor {
    pub fn new(id: impl Into<String>, capacity: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            capacity: capacity.into(),
            capacity_units: None,
            format: None,
            file_ref: None,
            populated_size: None,
            extra_attributes: Vec::new(),
        }
    }
}

/// Namespace prefixes in use by one document, each including its trailing colon.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Namespaces {
    /// Prefix for OVF elements; empty when OVF is the default namespace.
    ovf_element: String,
    /// Prefix for OVF attributes, which are never unqualified.
    ovf_attr: String,
    rasd: String,
    ovf_uri: String,
    declare_ovf_attr: bool,
    declare_rasd: bool,
}

impl Namespaces {
    fn detect(envelope: &Element) -> Self {
        let decls = envelope.namespace_declarations();
        let is_ovf = |uri: &str| uri == OVF_NAMESPACE_1 || uri == OVF_NAMESPACE_2;

        let ovf_element = envelope
            .prefix()
            .map(|p| format!("{p}:"))
            .unwrap_or_default();
        let ovf_uri = decls
            .iter()
            .find(|(_, uri)| is_ovf(uri))
            .map(|(_, uri)| uri.to_string())
            .unwrap_or_else(|| OVF_NAMESPACE_1.to_string());
        let ovf_attr = decls
            .iter()
            .find(|(prefix, uri)| !prefix.is_empty() && is_ovf(uri))
            .map(|(prefix, _)| format!("{prefix}:"));
        let rasd = decls
            .iter()
            .find(|(prefix, uri)| !prefix.is_empty() && *uri == RASD_NAMESPACE)
            .map(|(prefix, _)| format!("{prefix}:"));

        Self {
            ovf_element,
            declare_ovf_attr: ovf_attr.is_none(),
            ovf_attr: ovf_attr.unwrap_or_else(|| "ovf:".to_string()),
            declare_rasd: rasd.is_none(),
            rasd: rasd.unwrap_or_else(|| "rasd:".to_string()),
            ovf_uri,
        }
    }

    fn element(&self, local: &str) -> String {
        format!("{}{local}", self.ovf_element)
    }

    fn attr(&self, local: &str) -> String {
        format!("{}{local}", self.ovf_attr)
    }

    fn rasd(&self, local: &str) -> String {
        format!("{}{local}", self.rasd)
    }

    fn is_rasd(&self, element: &Element) -> bool {
        let prefix = self.rasd.trim_end_matches(':');
        element.prefix() == Some(prefix)
            || element
                .namespace_declarations()
                .iter()
                .any(|(p, uri)| p.is_empty() && *uri == RASD_NAMESPACE)
    }
}

/// Canonical order of the envelope-level sections this tool may create.
const SECTION_ORDER: [&str; 4] = [
    "References",
    "DiskSection",
    "NetworkSection",
    "DeploymentOptionSection",
];

/// An OVF descriptor opened for editing.
#[derive(Debug, Clone)]
pub struct OvfDocument {
    envelope: Element,
    ns: Namespaces,
    pub(crate) profiles: Vec<Profile>,
    pub(crate) items: Vec<Item>,
    pub(crate) networks: Vec<NetworkEntry>,
    pub(crate) files: Vec<FileReference>,
    pub(crate) disks: Vec<DiskDescriptor>,
    /// Whether a NetworkSection is emitted on save.
    pub(crate) network_section: bool,
    /// Highest instance id handed out or seen this session.
    pub(crate) instance_high_water: u32,
}

impl OvfDocument {
    /// Parse a descriptor from its XML text.
    pub fn parse(text: &str) -> Result<Self> {
        let envelope = xml::parse(text)?;
        if envelope.local_name() != "Envelope" {
            return Err(Error::xml(format!(
                "root element is '{}', not an OVF Envelope",
                envelope.name
            )));
        }
        let ns = Namespaces::detect(&envelope);

        let files = match envelope.child("References") {
            Some(refs) => refs
                .children_named("File")
                .map(parse_file)
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };

        let disks = match envelope.child("DiskSection") {
            Some(section) => section
                .children_named("Disk")
                .map(parse_disk)
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };

        let network_section = envelope.child("NetworkSection").is_some();
        let networks = match envelope.child("NetworkSection") {
            Some(section) => section
                .children_named("Network")
                .map(parse_network)
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };

        let profiles = match envelope.child("DeploymentOptionSection") {
            Some(section) => section
                .children_named("Configuration")
                .map(parse_profile)
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };

        if envelope.child("VirtualSystemCollection").is_some() {
            return Err(Error::xml(
                "VirtualSystemCollection packages are not supported",
            ));
        }
        let hardware = envelope
            .child("VirtualSystem")
            .ok_or_else(|| Error::xml("no VirtualSystem found in envelope"))?
            .child("VirtualHardwareSection")
            .ok_or_else(|| Error::xml("no VirtualHardwareSection found in VirtualSystem"))?;
        let items = hardware
            .children_named("Item")
            .map(|element| parse_item(element, &ns))
            .collect::<Result<Vec<_>>>()?;

        let instance_high_water = items.iter().map(|i| i.instance_id).max().unwrap_or(0);

        Ok(Self {
            envelope,
            ns,
            profiles,
            items,
            networks,
            files,
            disks,
            network_section,
            instance_high_water,
        })
    }

    /// Serialize the document, writing every typed record back into the envelope.
    pub fn to_xml(&self) -> Result<String> {
        let mut envelope = self.envelope.clone();

        if self.ns.declare_ovf_attr {
            envelope.attributes.push((
                format!("xmlns:{}", self.ns.ovf_attr.trim_end_matches(':')),
                self.ns.ovf_uri.clone(),
            ));
        }
        if self.ns.declare_rasd && !self.items.is_empty() {
            envelope.attributes.push((
                format!("xmlns:{}", self.ns.rasd.trim_end_matches(':')),
                RASD_NAMESPACE.to_string(),
            ));
        }

        let files: Vec<Element> = self.files.iter().map(|f| self.file_element(f)).collect();
        self.write_section(&mut envelope, "References", None, "File", files, true);

        let disks: Vec<Element> = self.disks.iter().map(|d| self.disk_element(d)).collect();
        let keep_disks = !disks.is_empty() || envelope.child("DiskSection").is_some();
        self.write_section(
            &mut envelope,
            "DiskSection",
            Some("Virtual disk information"),
            "Disk",
            disks,
            keep_disks,
        );

        let networks: Vec<Element> = self
            .networks
            .iter()
            .map(|n| self.network_element(n))
            .collect();
        self.write_section(
            &mut envelope,
            "NetworkSection",
            Some("Logical networks"),
            "Network",
            networks,
            self.network_section,
        );

        let profiles: Vec<Element> = self
            .profiles
            .iter()
            .map(|p| self.profile_element(p))
            .collect();
        let keep_profiles = !profiles.is_empty();
        self.write_section(
            &mut envelope,
            "DeploymentOptionSection",
            Some("Configuration Profiles"),
            "Configuration",
            profiles,
            keep_profiles,
        );

        let items: Vec<Element> = self.items.iter().map(|i| self.item_element(i)).collect();
        let hardware = envelope
            .child_mut("VirtualSystem")
            .and_then(|vs| vs.child_mut("VirtualHardwareSection"))
            .ok_or_else(|| Error::xml("no VirtualHardwareSection found in VirtualSystem"))?;
        replace_children(hardware, "Item", items);

        xml::to_string(&envelope)
    }

    /// Rewrite (or create, or drop) one envelope-level section.
    fn write_section(
        &self,
        envelope: &mut Element,
        section: &str,
        info: Option<&str>,
        record: &str,
        records: Vec<Element>,
        keep: bool,
    ) {
        if !keep {
            envelope.remove_children(section);
            return;
        }
        match envelope.child_mut(section) {
            Some(existing) => replace_children(existing, record, records),
            None => {
                let mut element = Element::new(self.ns.element(section));
                if let Some(info) = info {
                    element.push(Element::with_text(self.ns.element("Info"), info));
                }
                for record in records {
                    element.push(record);
                }
                insert_section(envelope, element);
            }
        }
    }

    fn file_element(&self, file: &FileReference) -> Element {
        let mut element = Element::new(self.ns.element("File"));
        element.set_attr(&self.ns.attr("href"), file.href.as_str());
        element.set_attr(&self.ns.attr("id"), file.id.as_str());
        if let Some(size) = file.size {
            element.set_attr(&self.ns.attr("size"), size.to_string());
        }
        element.attributes.extend(file.extra_attributes.iter().cloned());
        element
    }

    fn disk_element(&self, disk: &DiskDescriptor) -> Element {
        let mut element = Element::new(self.ns.element("Disk"));
        element.set_attr(&self.ns.attr("capacity"), disk.capacity.as_str());
        if let Some(units) = &disk.capacity_units {
            element.set_attr(&self.ns.attr("capacityAllocationUnits"), units.as_str());
        }
        element.set_attr(&self.ns.attr("diskId"), disk.id.as_str());
        if let Some(file_ref) = &disk.file_ref {
            element.set_attr(&self.ns.attr("fileRef"), file_ref.as_str());
        }
        if let Some(format) = &disk.format {
            element.set_attr(&self.ns.attr("format"), format.as_str());
        }
        if let Some(populated) = disk.populated_size {
            element.set_attr(&self.ns.attr("populatedSize"), populated.to_string());
        }
        element.attributes.extend(disk.extra_attributes.iter().cloned());
        element
    }

    fn network_element(&self, network: &NetworkEntry) -> Element {
        let mut element = Element::new(self.ns.element("Network"));
        element.set_attr(&self.ns.attr("name"), network.name.as_str());
        element.push(Element::with_text(
            self.ns.element("Description"),
            network.description.as_str(),
        ));
        element
    }

    fn profile_element(&self, profile: &Profile) -> Element {
        let mut element = Element::new(self.ns.element("Configuration"));
        if profile.default {
            element.set_attr(&self.ns.attr("default"), "true");
        }
        element.set_attr(&self.ns.attr("id"), profile.id.as_str());
        element.push(Element::with_text(
            self.ns.element("Label"),
            profile.label.as_str(),
        ));
        element.push(Element::with_text(
            self.ns.element("Description"),
            profile.description.as_str(),
        ));
        element
    }

    fn item_element(&self, item: &Item) -> Element {
        let mut element = Element::new(self.ns.element("Item"));
        element.attributes.extend(item.attributes.iter().cloned());
        if let Some(config) = item.scope.to_attr() {
            element.set_attr(&self.ns.attr("configuration"), config);
        }

        let mut properties: Vec<(&str, String)> = item
            .properties()
            .iter()
            .map(|(name, value)| (name.as_str(), value.clone()))
            .collect();
        properties.push(("InstanceID", item.instance_id.to_string()));
        properties.sort_by(|a, b| a.0.cmp(b.0));

        for (name, value) in properties {
            element.push(Element::with_text(self.ns.rasd(name), value));
        }
        for extra in &item.extra {
            element.push(extra.clone());
        }
        element
    }

    /// Name of the virtual system.
    pub fn name(&self) -> Option<String> {
        let vs = self.envelope.child("VirtualSystem")?;
        vs.child_text("Name")
            .filter(|n| !n.is_empty())
            .or_else(|| vs.attr("id").map(str::to_string))
    }

    /// Product identifier used to pick a platform: the ProductSection class,
    /// falling back to the Product text.
    pub fn product_identifier(&self) -> Option<String> {
        let product = self
            .envelope
            .child("VirtualSystem")?
            .child("ProductSection")?;
        product
            .attr("class")
            .map(str::to_string)
            .or_else(|| product.child_text("Product"))
            .filter(|p| !p.is_empty())
    }

    pub fn profiles(&self) -> &[Profile] {
        &self.profiles
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn networks(&self) -> &[NetworkEntry] {
        &self.networks
    }

    pub fn files(&self) -> &[FileReference] {
        &self.files
    }

    pub fn disks(&self) -> &[DiskDescriptor] {
        &self.disks
    }

    pub fn has_network_section(&self) -> bool {
        self.network_section
    }

    pub fn profile_ids(&self) -> BTreeSet<String> {
        self.profiles.iter().map(|p| p.id.clone()).collect()
    }

    pub fn profile(&self, id: &str) -> Option<&Profile> {
        self.profiles.iter().find(|p| p.id == id)
    }

    /// Create a profile if it doesn't exist yet. Returns whether it was created.
    pub fn ensure_profile(
        &mut self,
        id: &str,
        label: Option<&str>,
        description: Option<&str>,
    ) -> Result<bool> {
        if id.is_empty() || id.contains(char::is_whitespace) {
            return Err(Error::invalid_input(format!(
                "profile id '{id}' must be non-empty and contain no whitespace"
            )));
        }
        if let Some(existing) = self.profiles.iter_mut().find(|p| p.id == id) {
            if let Some(label) = label {
                existing.label = label.to_string();
            }
            if let Some(description) = description {
                existing.description = description.to_string();
            }
            return Ok(false);
        }
        info!("creating new profile '{id}'");
        self.profiles.push(Profile {
            id: id.to_string(),
            label: label.unwrap_or(id).to_string(),
            description: description.unwrap_or(id).to_string(),
            default: false,
        });
        Ok(true)
    }

    /// Mark one profile as the default, clearing the flag on the others.
    pub fn set_default_profile(&mut self, id: &str) -> Result<()> {
        if self.profile(id).is_none() {
            return Err(Error::lookup(format!("no profile named '{id}'")));
        }
        for profile in &mut self.profiles {
            profile.default = profile.id == id;
        }
        Ok(())
    }

    pub fn default_profile(&self) -> Option<&Profile> {
        self.profiles.iter().find(|p| p.default)
    }

    /// Every item variant of one logical device, in document order.
    pub fn items_by_instance(&self, instance_id: u32) -> impl Iterator<Item = &Item> {
        self.items
            .iter()
            .filter(move |item| item.instance_id == instance_id)
    }

    pub(crate) fn item_positions(&self, instance_id: u32) -> Vec<usize> {
        self.items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.instance_id == instance_id)
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Instance ids of every device of a type, ascending.
    pub fn instance_ids_of(&self, resource_type: ResourceType) -> Vec<u32> {
        let ids: BTreeSet<u32> = self
            .items
            .iter()
            .filter(|item| item.is_kind(resource_type))
            .map(|item| item.instance_id)
            .collect();
        ids.into_iter().collect()
    }

    /// Whether an item's scope reaches a given profile (`None` meaning "no
    /// profiles declared").
    pub fn item_applies_to(&self, item: &Item, profile: Option<&str>) -> bool {
        match (&item.scope, profile) {
            (ProfileScope::Only(scope), Some(profile)) => scope.contains(profile),
            (ProfileScope::Only(_), None) => false,
            (ProfileScope::Default, None) => true,
            (ProfileScope::Default, Some(profile)) => !self.items.iter().any(|other| {
                other.instance_id == item.instance_id
                    && matches!(&other.scope, ProfileScope::Only(scope) if scope.contains(profile))
            }),
        }
    }

    /// The variant of a device a profile sees, if any.
    pub fn effective_item(&self, instance_id: u32, profile: Option<&str>) -> Option<&Item> {
        self.items_by_instance(instance_id)
            .find(|item| self.item_applies_to(item, profile))
    }

    /// Every device a profile sees, one item per instance id, in document order.
    pub fn items_for_profile(&self, profile: Option<&str>) -> Vec<&Item> {
        self.items
            .iter()
            .filter(|item| self.item_applies_to(item, profile))
            .collect()
    }

    /// Devices of one type a profile sees, in creation (instance id) order.
    pub fn visible_devices(&self, resource_type: ResourceType, profile: Option<&str>) -> Vec<u32> {
        self.instance_ids_of(resource_type)
            .into_iter()
            .filter(|&id| self.effective_item(id, profile).is_some())
            .collect()
    }

    /// The file a disk descriptor is backed by, if any.
    pub fn disk_file(&self, disk: &DiskDescriptor) -> Option<&FileReference> {
        let file_ref = disk.file_ref.as_deref()?;
        self.files.iter().find(|f| f.id == file_ref)
    }

    /// The disk descriptor a file backs, if any.
    pub fn file_disk(&self, file: &FileReference) -> Option<&DiskDescriptor> {
        self.disks
            .iter()
            .find(|d| d.file_ref.as_deref() == Some(file.id.as_str()))
    }

    pub fn file(&self, id: &str) -> Option<&FileReference> {
        self.files.iter().find(|f| f.id == id)
    }

    pub fn disk(&self, id: &str) -> Option<&DiskDescriptor> {
        self.disks.iter().find(|d| d.id == id)
    }
}

fn parse_size(value: Option<&str>, what: &str) -> Result<Option<u64>> {
    value
        .map(|v| {
            v.trim()
                .parse::<u64>()
                .map_err(|_| Error::xml(format!("invalid {what} '{v}'")))
        })
        .transpose()
}

fn parse_file(element: &Element) -> Result<FileReference> {
    let id = element
        .attr("id")
        .ok_or_else(|| Error::xml("File element without an id"))?;
    let href = element
        .attr("href")
        .ok_or_else(|| Error::xml(format!("File '{id}' has no href")))?;
    let size = parse_size(element.attr("size"), "file size")?;
    let extra_attributes = element
        .attributes
        .iter()
        .filter(|(key, _)| !matches!(xml::local_name(key), "id" | "href" | "size"))
        .cloned()
        .collect();
    Ok(FileReference {
        id: id.to_string(),
        href: href.to_string(),
        size,
        extra_attributes,
        source: None,
    })
}

fn parse_disk(element: &Element) -> Result<DiskDescriptor> {
    let id = element
        .attr("diskId")
        .ok_or_else(|| Error::xml("Disk element without a diskId"))?;
    let capacity = element
        .attr("capacity")
        .ok_or_else(|| Error::xml(format!("Disk '{id}' has no capacity")))?;
    let extra_attributes = element
        .attributes
        .iter()
        .filter(|(key, _)| {
            !matches!(
                xml::local_name(key),
                "diskId" | "capacity" | "capacityAllocationUnits" | "fileRef" | "format"
                    | "populatedSize"
            )
        })
        .cloned()
        .collect();
    Ok(DiskDescriptor {
        id: id.to_string(),
        capacity: capacity.to_string(),
        capacity_units: element.attr("capacityAllocationUnits").map(str::to_string),
        format: element.attr("format").map(str::to_string),
        file_ref: element.attr("fileRef").map(str::to_string),
        populated_size: parse_size(element.attr("populatedSize"), "populated size")?,
        extra_attributes,
    })
}

fn parse_network(element: &Element) -> Result<NetworkEntry> {
    let name = element
        .attr("name")
        .ok_or_else(|| Error::xml("Network element without a name"))?;
    Ok(NetworkEntry {
        name: name.to_string(),
        description: element.child_text("Description").unwrap_or_default(),
    })
}

fn parse_profile(element: &Element) -> Result<Profile> {
    let id = element
        .attr("id")
        .ok_or_else(|| Error::xml("Configuration element without an id"))?;
    Ok(Profile {
        id: id.to_string(),
        label: element.child_text("Label").unwrap_or_default(),
        description: element.child_text("Description").unwrap_or_default(),
        default: element
            .attr("default")
            .is_some_and(|d| d.eq_ignore_ascii_case("true")),
    })
}

fn parse_item(element: &Element, ns: &Namespaces) -> Result<Item> {
    let mut instance_id = None;
    let mut properties = Vec::new();
    let mut extra = Vec::new();

    for child in element.elements() {
        if !ns.is_rasd(child) {
            extra.push(child.clone());
        } else if child.local_name() == "InstanceID" {
            let text = child.text();
            instance_id = Some(text.parse::<u32>().map_err(|_| {
                Error::xml(format!("InstanceID '{text}' is not a non-negative integer"))
            })?);
        } else {
            properties.push((child.local_name().to_string(), child.text()));
        }
    }

    let instance_id = instance_id.ok_or_else(|| Error::xml("Item without an InstanceID"))?;
    let scope = ProfileScope::parse(element.attr("configuration"));
    let attributes = element
        .attributes
        .iter()
        .filter(|(key, _)| key.starts_with("xmlns") || xml::local_name(key) != "configuration")
        .cloned()
        .collect();

    Ok(Item::from_parts(instance_id, scope, properties, attributes, extra))
}

/// Replace every `record` child of `parent`, putting the new records where
/// the first old one was (or at the end if there were none).
fn replace_children(parent: &mut Element, record: &str, records: Vec<Element>) {
    let insert_at = parent.position_of(record);
    parent.remove_children(record);
    let insert_at = insert_at.unwrap_or(parent.children.len());
    let tail = parent.children.split_off(insert_at);
    parent
        .children
        .extend(records.into_iter().map(Node::Element));
    parent.children.extend(tail);
}

/// Insert a newly created section in canonical order, ahead of the VirtualSystem.
fn insert_section(envelope: &mut Element, section: Element) {
    let rank = SECTION_ORDER
        .iter()
        .position(|name| *name == section.local_name())
        .unwrap_or(SECTION_ORDER.len());
    let after = envelope
        .children
        .iter()
        .enumerate()
        .filter_map(|(idx, node)| match node {
            Node::Element(e) => SECTION_ORDER[..rank]
                .contains(&e.local_name())
                .then_some(idx),
            _ => None,
        })
        .max();
    let index = after.map_or(0, |idx| idx + 1);
    envelope.children.insert(index, Node::Element(section));
}
