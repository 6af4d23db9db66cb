pub mod broadcast;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod store;
pub mod tasks {
    pub mod publisher;
    pub mod subscribers;
}

pub use slide_model::{EMPTY_SENTINEL, Slide, SlideState, SortKey, ValidationError};
