//! Slide storage.
//!
//! Backends implement the four primitive operations; the state queries the
//! publisher and admin client use are layered on top of [`SlideStore::snapshot`]
//! so every backend answers them identically.

use chrono::{DateTime, Utc};
use slide_model::{Slide, SlideState, SortKey};

use crate::error::StoreError;

pub mod memory;
pub mod sqlite;

pub use memory::MemorySlideStore;
pub use sqlite::SqliteSlideStore;

pub trait SlideStore: Send + Sync {
    /// Persist a new record. Fails with [`StoreError::Duplicate`] if the name is taken.
    fn add(&self, slide: Slide) -> Result<(), StoreError>;

    /// Delete a record. Fails with [`StoreError::NotFound`] if the name is unknown.
    fn remove(&self, name: &str) -> Result<(), StoreError>;

    fn get(&self, name: &str) -> Result<Option<Slide>, StoreError>;

    /// Every stored record from one consistent read, in name order.
    fn snapshot(&self) -> Result<Vec<Slide>, StoreError>;

    fn contains(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.get(name)?.is_some())
    }

    fn slides_in_state(
        &self,
        state: SlideState,
        sort: Option<SortKey>,
    ) -> Result<Vec<Slide>, StoreError> {
        self.slides_in_state_at(state, sort, Utc::now())
    }

    fn slides_in_state_at(
        &self,
        state: SlideState,
        sort: Option<SortKey>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Slide>, StoreError> {
        Ok(slide_model::in_state(&self.snapshot()?, state, now, sort))
    }

    /// Names of the slides active right now, in rotation order.
    fn current(&self) -> Result<Vec<String>, StoreError> {
        self.current_at(Utc::now())
    }

    fn current_at(&self, now: DateTime<Utc>) -> Result<Vec<String>, StoreError> {
        Ok(slide_model::active_at(now, &self.snapshot()?)
            .into_iter()
            .map(|slide| slide.name)
            .collect())
    }

    fn get_state(&self, state: SlideState) -> Result<Vec<(String, Slide)>, StoreError> {
        self.get_state_at(state, Utc::now())
    }

    fn get_state_at(
        &self,
        state: SlideState,
        now: DateTime<Utc>,
    ) -> Result<Vec<(String, Slide)>, StoreError> {
        Ok(self
            .slides_in_state_at(state, None, now)?
            .into_iter()
            .map(|slide| (slide.name.clone(), slide))
            .collect())
    }
}
