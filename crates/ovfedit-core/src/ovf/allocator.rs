//! Instance id and device address allocation.

use tracing::warn;

use crate::error::{Error, Result};
use crate::ovf::document::OvfDocument;
use crate::ovf::item::Item;

impl OvfDocument {
    /// Allocate a fresh instance id.
    ///
    /// Ids are never handed out twice in one session, even if the device
    /// that held the highest id was deleted in the meantime.
    pub fn next_instance_id(&mut self) -> u32 {
        let current = self
            .items
            .iter()
            .map(|item| item.instance_id)
            .max()
            .unwrap_or(0);
        let next = current.max(self.instance_high_water) + 1;
        self.instance_high_water = next;
        next
    }

    /// One past the highest address in use on a controller, or 0 if it has no children.
    pub fn next_address_on_parent(&self, parent_id: u32) -> u32 {
        self.items
            .iter()
            .filter(|item| item.parent() == Some(parent_id))
            .filter_map(Item::address_on_parent)
            .max()
            .map_or(0, |address| address + 1)
    }

    /// The controller item an item is attached to.
    pub fn resolve_parent(&self, item: &Item) -> Result<&Item> {
        let Some(parent_id) = item.parent() else {
            warn!(
                "item {} ({}) has no parent reference",
                item.instance_id,
                item.element_name().unwrap_or("unnamed")
            );
            return Err(Error::lookup(format!(
                "item {} has no parent",
                item.instance_id
            )));
        };
        match self.items_by_instance(parent_id).next() {
            Some(parent) => Ok(parent),
            None => {
                warn!(
                    "item {} refers to parent {parent_id}, which does not exist",
                    item.instance_id
                );
                Err(Error::lookup(format!(
                    "parent {parent_id} of item {} not found",
                    item.instance_id
                )))
            }
        }
    }
}
