use std::collections::HashMap;

use parking_lot::{Mutex, RwLock};

use crate::*;

/// Catalog held in memory, sorted by latitude. Queries behave like a store
/// with a single-field range index: only the latitude range is applied, so
/// results may span any longitude.
#[derive(Default)]
pub struct InMemoryContentStore {
    items: RwLock<Vec<PlayableItem>>,
}

impl InMemoryContentStore {
    pub fn new(items: Vec<PlayableItem>) -> Self {
        let store = Self::default();
        store.replace(items);
        store
    }

    pub fn replace(&self, mut items: Vec<PlayableItem>) {
        items.sort_by(|a, b| a.geo.latitude.total_cmp(&b.geo.latitude));
        *self.items.write() = items;
    }

    pub fn insert(&self, item: PlayableItem) {
        let mut items = self.items.write();
        items.retain(|i| i.id != item.id);
        let at = items.partition_point(|i| i.geo.latitude < item.geo.latitude);
        items.insert(at, item);
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }
}

#[async_trait::async_trait]
impl ContentStore for InMemoryContentStore {
    async fn query_by_bounding_box(&self, bbox: &BoundingBox) -> Result<Vec<PlayableItem>, StoreError> {
        let items = self.items.read();
        let from = items.partition_point(|i| i.geo.latitude < bbox.min_lat);
        let to = items.partition_point(|i| i.geo.latitude <= bbox.max_lat);
        Ok(items[from..to].to_vec())
    }
}

#[derive(Default)]
pub struct MemorySettingsStore {
    inner: Mutex<HashMap<String, DriveModeSettings>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn load(&self, user_id: &str) -> Result<Option<DriveModeSettings>, StoreError> {
        Ok(self.inner.lock().get(user_id).cloned())
    }

    fn save(&self, user_id: &str, settings: &DriveModeSettings) -> Result<(), StoreError> {
        self.inner.lock().insert(user_id.to_string(), settings.clone());
        Ok(())
    }
}
