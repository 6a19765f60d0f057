pub mod availability;
pub mod prefetcher;
pub mod reference;

pub use availability::check_available;
pub use prefetcher::{Backoff, PrefetchReport, PrefetchStatus, Prefetcher};
pub use reference::ModelId;
