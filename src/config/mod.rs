//! Crawl configuration: the flat [`CrawlConfig`] struct and its builder.

pub mod builder;
pub mod types;

pub use builder::CrawlConfigBuilder;
pub use types::CrawlConfig;
