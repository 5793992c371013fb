//! Chat list and user directory

mod aggregator;
mod directory;

pub use aggregator::ChatAggregator;
pub use directory::ChatDirectory;
