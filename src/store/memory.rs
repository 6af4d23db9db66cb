use std::collections::BTreeMap;

use parking_lot::RwLock;
use slide_model::Slide;
use tracing::debug;

use super::SlideStore;
use crate::error::StoreError;

/// Volatile store for tests and embedding; not reachable from configuration.
#[derive(Debug, Default)]
pub struct MemorySlideStore {
    slides: RwLock<BTreeMap<String, Slide>>,
}

impl MemorySlideStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SlideStore for MemorySlideStore {
    fn add(&self, slide: Slide) -> Result<(), StoreError> {
        slide.validate()?;
        let mut slides = self.slides.write();
        if slides.contains_key(&slide.name) {
            return Err(StoreError::Duplicate(slide.name));
        }
        debug!(name = %slide.name, "slide added");
        slides.insert(slide.name.clone(), slide);
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<(), StoreError> {
        match self.slides.write().remove(name) {
            Some(_) => {
                debug!(name, "slide removed");
                Ok(())
            }
            None => Err(StoreError::NotFound(name.to_string())),
        }
    }

    fn get(&self, name: &str) -> Result<Option<Slide>, StoreError> {
        Ok(self.slides.read().get(name).cloned())
    }

    fn snapshot(&self) -> Result<Vec<Slide>, StoreError> {
        Ok(self.slides.read().values().cloned().collect())
    }
}
