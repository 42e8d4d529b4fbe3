//! Client records looked up by id.

use std::fs;
use std::path::Path;

use fxhash::FxHashMap;
use tracing::info;

use crate::error::DirectoryError;
use crate::model::ClientPoint;
use crate::traits::ClientDirectory;

#[derive(Debug, Default, Clone)]
pub struct InMemoryClientDirectory {
    clients: FxHashMap<String, ClientPoint>,
}

impl InMemoryClientDirectory {
    pub fn new(clients: Vec<ClientPoint>) -> Result<Self, DirectoryError> {
        let mut map = FxHashMap::default();
        for client in clients {
            if map.contains_key(&client.id) {
                return Err(DirectoryError::DuplicateId(client.id));
            }
            map.insert(client.id.clone(), client);
        }
        Ok(Self { clients: map })
    }

    /// Loads a JSON array of client records.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, DirectoryError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)?;
        let clients: Vec<ClientPoint> = serde_json::from_str(&raw)?;
        let directory = Self::new(clients)?;
        info!(path = %path.display(), clients = directory.len(), "client directory loaded");
        Ok(directory)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

impl ClientDirectory for InMemoryClientDirectory {
    fn lookup(&self, ids: &[String]) -> Vec<Option<ClientPoint>> {
        ids.iter().map(|id| self.clients.get(id).cloned()).collect()
    }
}
