pub mod analysis;
pub mod compress;
pub mod fetch;
pub mod processor;
pub mod sources;
pub mod timeframe;
