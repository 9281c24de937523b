//! Target side: loads the inventory store into a graph and writes the diff
//! back through it.

use std::collections::HashSet;

use chrono::Local;
use graph_diff_core::{
    Adapter, Attributes, Entity, Graph, Labeler, RunError, Store, StoreError, Synced,
};
use tracing::{debug, info, warn};

use crate::config::SyncSettings;
use crate::model::{Binding, Device, EntityKind, Port, Record};
use crate::store::{CustomFields, InventoryStore};

pub struct InventoryAdapter<'a> {
    store: &'a mut InventoryStore,
    settings: &'a SyncSettings,
    graph: Graph<Record>,
}

impl<'a> InventoryAdapter<'a> {
    pub fn new(store: &'a mut InventoryStore, settings: &'a SyncSettings) -> Self {
        Self {
            store,
            settings,
            graph: Graph::new(),
        }
    }

    /// Whether a record belongs to this run's slice of the inventory.
    fn in_scope(&self, tenant: Option<&str>, fields: &CustomFields) -> bool {
        match &self.settings.tenant {
            Some(wanted) => tenant == Some(wanted.as_str()),
            None => fields.system_of_record.as_deref() == Some(self.settings.source_name.as_str()),
        }
    }
}

impl Adapter for InventoryAdapter<'_> {
    type Entity = Record;

    fn name(&self) -> &str {
        "inventory"
    }

    fn graph(&self) -> &Graph<Record> {
        &self.graph
    }

    fn graph_mut(&mut self) -> &mut Graph<Record> {
        &mut self.graph
    }

    fn load(&mut self) -> Result<(), RunError> {
        let inventory = self.store.inventory().clone();

        for site in &inventory.sites {
            self.add(Record::Site(site.clone()));
        }
        self.graph.set_skip_unmatched(EntityKind::Site);

        for stored in &inventory.devices {
            if self.in_scope(stored.device.tenant.as_deref(), &stored.custom_fields) {
                self.add(Record::Device(stored.device.clone()));
            }
        }

        let tenant_scoped = self.settings.tenant.is_some();
        for stored in &inventory.ports {
            let parent = Device::key(&stored.record.device);
            if !self.graph.contains(EntityKind::Device, &parent) {
                continue;
            }
            if !tenant_scoped && !self.in_scope(None, &stored.custom_fields) {
                continue;
            }
            let port = Record::Port(stored.record.clone());
            if self.add(port.clone()) {
                if let Err(err) = self.graph.add_child(EntityKind::Device, &parent, &port) {
                    warn!(%err, "port not attached to device");
                }
            }
        }

        for stored in &inventory.subnets {
            if self.in_scope(stored.record.tenant.as_deref(), &stored.custom_fields) {
                self.add(Record::Subnet(stored.record.clone()));
            }
        }

        let mut addresses = HashSet::new();
        for stored in &inventory.addresses {
            if self.in_scope(stored.record.tenant.as_deref(), &stored.custom_fields) {
                addresses.insert(stored.record.address.clone());
                self.add(Record::Address(stored.record.clone()));
            }
        }

        for assignment in &inventory.assignments {
            let port_loaded = self.graph.contains(
                EntityKind::Port,
                &Port::key(&assignment.port, &assignment.device),
            );
            if !port_loaded || !addresses.contains(&assignment.address) {
                continue;
            }
            let primary = inventory
                .device(&assignment.device)
                .is_some_and(|d| d.is_primary(&assignment.address));
            self.add(Record::Binding(Binding {
                address: assignment.address.clone(),
                device: assignment.device.clone(),
                port: assignment.port.clone(),
                primary,
            }));
        }

        if tenant_scoped {
            for kind in [
                EntityKind::Device,
                EntityKind::Port,
                EntityKind::Subnet,
                EntityKind::Address,
                EntityKind::Binding,
            ] {
                self.graph.set_skip_unmatched(kind);
            }
        }

        debug!(
            sites = self.graph.len(EntityKind::Site),
            devices = self.graph.len(EntityKind::Device),
            addresses = self.graph.len(EntityKind::Address),
            "inventory loaded"
        );
        Ok(())
    }
}

impl Store<Record> for InventoryAdapter<'_> {
    fn create(&mut self, entity: &Record) -> Result<Option<Record>, StoreError> {
        let created = self.store.create(entity)?;
        if created.is_some() {
            crate::load_event!(
                self.settings.debug,
                kind = %entity.kind(),
                identity = %entity.identity(),
                "created in inventory"
            );
        }
        Ok(created)
    }

    fn update(&mut self, current: &Record, changes: &Attributes) -> Result<Record, StoreError> {
        if matches!(current, Record::Site(_)) && !self.settings.update_sites {
            return Err(StoreError::Rejected("site updates are disabled".to_string()));
        }
        self.store.update(current, changes)
    }

    fn delete(&mut self, entity: &Record) -> Result<(), StoreError> {
        self.store.delete(entity)
    }
}

impl Labeler<Record> for InventoryAdapter<'_> {
    fn label(&mut self, synced: &[Synced<'_, Record>]) {
        let today = Local::now().date_naive();
        let mut stamped = 0;
        for entity in synced {
            if self.store.stamp(entity.source, &self.settings.source_name, today) {
                stamped += 1;
            }
        }
        info!(stamped, %today, "provenance stamped");
    }
}
