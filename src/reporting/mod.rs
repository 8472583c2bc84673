//! Error collection and report persistence for crawl operations.

pub mod reporter;

pub use reporter::ErrorReporter;
