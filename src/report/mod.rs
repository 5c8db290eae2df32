//! Turning a downloaded MOSS report into per-case evidence bundles.

pub mod assemble;
pub mod extract;
pub mod fetch;
pub mod merge;

#[cfg(test)]
pub(crate) mod tests;

pub use assemble::CaseAssembler;
pub use extract::MatchIndex;
pub use fetch::{HttpFetcher, download_report};
