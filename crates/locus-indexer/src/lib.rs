//! Source tree walking, per-language extraction and graph construction

pub mod builder;
pub mod error;
pub mod extractor;
pub mod languages;
pub mod parser;
pub mod walk;

mod resolve;

#[cfg(test)]
mod tests;

pub use builder::{BuildOutput, GraphBuilder, SkippedFile, build};
pub use error::BuildError;
pub use extractor::{FileOutline, ImportKind, ImportRef, LanguageExtractor, SymbolDef};
pub use parser::SourceLanguage;
pub use walk::{WalkOutput, WalkedFile, walk};
