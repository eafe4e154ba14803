//! Per-thread tree-sitter parsers
//!
//! `tree_sitter::Parser` is neither `Send` nor `Sync`, so each analysis
//! worker keeps its own parser per language in a thread-local slot.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use tree_sitter::{Language, Parser, Tree};

/// Languages with a structural extractor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceLanguage {
    Python,
    JavaScript,
    TypeScript,
    Tsx,
    Java,
    C,
    Cpp,
}

impl SourceLanguage {
    /// Determine language from a file extension (no leading dot)
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "py" | "pyi" => Some(SourceLanguage::Python),
            "js" | "jsx" | "mjs" | "cjs" => Some(SourceLanguage::JavaScript),
            "ts" | "mts" | "cts" => Some(SourceLanguage::TypeScript),
            "tsx" => Some(SourceLanguage::Tsx),
            "java" => Some(SourceLanguage::Java),
            "c" => Some(SourceLanguage::C),
            "cpp" | "cc" | "cxx" | "c++" | "h" | "hpp" | "hh" | "hxx" => Some(SourceLanguage::Cpp),
            _ => None,
        }
    }

    /// Get the tree-sitter grammar for this language
    pub fn grammar(self) -> Language {
        match self {
            SourceLanguage::Python => tree_sitter_python::LANGUAGE.into(),
            SourceLanguage::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
            SourceLanguage::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            SourceLanguage::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
            SourceLanguage::Java => tree_sitter_java::LANGUAGE.into(),
            SourceLanguage::C => tree_sitter_c::LANGUAGE.into(),
            SourceLanguage::Cpp => tree_sitter_cpp::LANGUAGE.into(),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SourceLanguage::Python => "python",
            SourceLanguage::JavaScript => "javascript",
            SourceLanguage::TypeScript => "typescript",
            SourceLanguage::Tsx => "tsx",
            SourceLanguage::Java => "java",
            SourceLanguage::C => "c",
            SourceLanguage::Cpp => "cpp",
        }
    }
}

impl fmt::Display for SourceLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

thread_local! {
    static PARSERS: RefCell<HashMap<SourceLanguage, Parser>> = RefCell::new(HashMap::new());
}

/// Parse `source` with this thread's parser for `language`.
pub fn parse(language: SourceLanguage, source: &str) -> Result<Tree, String> {
    PARSERS.with(|cell| {
        let mut parsers = cell.borrow_mut();
        let parser = match parsers.entry(language) {
            std::collections::hash_map::Entry::Occupied(slot) => slot.into_mut(),
            std::collections::hash_map::Entry::Vacant(slot) => {
                let mut parser = Parser::new();
                parser
                    .set_language(&language.grammar())
                    .map_err(|e| format!("cannot load {language} grammar: {e}"))?;
                slot.insert(parser)
            }
        };
        parser
            .parse(source, None)
            .ok_or_else(|| format!("{language} parser returned no tree"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_detection() {
        let cases = [
            ("py", Some(SourceLanguage::Python)),
            ("JS", Some(SourceLanguage::JavaScript)),
            ("ts", Some(SourceLanguage::TypeScript)),
            ("tsx", Some(SourceLanguage::Tsx)),
            ("java", Some(SourceLanguage::Java)),
            ("c", Some(SourceLanguage::C)),
            ("h", Some(SourceLanguage::Cpp)),
            ("md", None),
        ];
        for (ext, expected) in cases {
            assert_eq!(SourceLanguage::from_extension(ext), expected, "extension {ext}");
        }
    }

    #[test]
    fn test_parser_reused_across_calls() {
        let first = parse(SourceLanguage::Python, "x = 1\n").unwrap();
        let second = parse(SourceLanguage::Python, "def f(:\n").unwrap();
        assert!(!first.root_node().has_error());
        assert!(second.root_node().has_error());
    }
}
