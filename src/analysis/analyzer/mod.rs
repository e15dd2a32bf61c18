//! Analyzer implementations that combine tokenizers and filters.

mod analyzer;
mod simple;
mod standard;

pub use analyzer::Analyzer;
pub use simple::SimpleAnalyzer;
pub use standard::StandardAnalyzer;
