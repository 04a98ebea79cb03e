//! Steam profile comment crawler: first-page resolution, paged listing
//! crawl, extraction, deduplication and export.

mod crawl;
mod data_io;
mod dedup;
mod error;
mod extract;
#[cfg(test)]
mod fixtures;
mod pagination;
mod runtime;
mod types;

pub use runtime::run;
pub use types::Cli;
