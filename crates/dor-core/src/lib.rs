pub mod analyzer;
pub mod batch;
pub mod classifier;
pub mod config;
pub mod domain;
pub mod error;
pub mod evaluate;
pub mod fields;
pub mod links;
pub mod normalize;
pub mod report;
pub mod rewrite;
pub mod rules;
pub mod ticket;
pub mod types;

pub use analyzer::Analyzer;
pub use error::{DorError, Result};
