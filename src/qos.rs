//! QoS record table. Independent from the Shares Tree (spec §3).

use std::collections::HashMap;

use crate::types::{Qos, QosId};

#[derive(Debug, Default)]
pub struct QosTable {
    records: HashMap<QosId, Qos>,
}

impl QosTable {
    pub fn new() -> Self {
        Self { records: HashMap::new() }
    }

    pub fn insert(&mut self, qos: Qos) {
        self.records.insert(qos.id, qos);
    }

    pub fn get(&self, id: QosId) -> Option<&Qos> {
        self.records.get(&id)
    }

    pub fn get_mut(&mut self, id: QosId) -> Option<&mut Qos> {
        self.records.get_mut(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Qos> {
        self.records.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Qos> {
        self.records.values_mut()
    }
}
