use std::collections::HashSet;
use std::sync::Arc;

use drive_core::{ContentStore, StoreError};
use model::{GeoPoint, PlayableItem};
use tracing::{debug, warn};

use crate::error::DriveError;
use crate::events::{DriveEvent, EventBus};

#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub item: PlayableItem,
    pub distance_miles: f64,
}

/// Two-phase nearby lookup: bounding-box query against the store, then the
/// exact radius/category/played filter in memory.
pub struct ProximityScanner {
    store: Arc<dyn ContentStore>,
    events: EventBus,
}

impl ProximityScanner {
    pub fn new(store: Arc<dyn ContentStore>, events: EventBus) -> Self {
        Self { store, events }
    }

    /// Nearest eligible drivecard within `radius_miles`, if any. Store failures
    /// are logged, reported on the event stream and read as "nothing nearby".
    pub async fn find_nearest(
        &self,
        location: &GeoPoint,
        radius_miles: f64,
        exclude_ids: &HashSet<String>,
        exclude_categories: &HashSet<String>,
    ) -> Option<Candidate> {
        match self.try_find_nearest(location, radius_miles, exclude_ids, exclude_categories).await {
            Ok(found) => found,
            Err(e) => {
                self.report(&e);
                None
            }
        }
    }

    pub async fn try_find_nearest(
        &self,
        location: &GeoPoint,
        radius_miles: f64,
        exclude_ids: &HashSet<String>,
        exclude_categories: &HashSet<String>,
    ) -> Result<Option<Candidate>, StoreError> {
        let bbox = proximity::bounding_box(location, radius_miles);
        let superset = self.store.query_by_bounding_box(&bbox).await?;
        let fetched = superset.len();

        let found = proximity::nearest(location, superset, radius_miles, exclude_ids, exclude_categories)
            .map(|(item, distance_miles)| Candidate { item, distance_miles });

        debug!(
            fetched,
            radius_miles,
            found = found.as_ref().map(|c| c.item.id.as_str()),
            "proximity scan"
        );
        Ok(found)
    }

    pub(crate) fn report(&self, e: &StoreError) {
        warn!(error = %e, "drivecard query failed; treating as no candidates");
        self.events.emit(DriveEvent::Error(DriveError::Fetch(e.to_string())));
    }
}
