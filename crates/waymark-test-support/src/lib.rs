//! Shared test mocks and fixtures for the Waymark quest engine.

mod catalog;
mod clock;
mod delivery;
mod store;

pub use catalog::{sample_catalog, sample_rosters};
pub use clock::FixedClock;
pub use delivery::{FailingDeliveryChannel, RecordingDeliveryChannel, SentMessage};
pub use store::{FailingProgressStore, InMemoryProgressStore};
