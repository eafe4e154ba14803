//! Language extractors for different programming languages

pub mod c;
pub mod java;
pub mod javascript;
pub mod python;

use crate::extractor::LanguageExtractor;
use crate::parser::SourceLanguage;

/// Get the extractor for a language
pub fn get_extractor(language: SourceLanguage) -> &'static dyn LanguageExtractor {
    static PYTHON: python::PythonExtractor = python::PythonExtractor;
    static JAVASCRIPT: javascript::JavaScriptExtractor = javascript::JavaScriptExtractor;
    static JAVA: java::JavaExtractor = java::JavaExtractor;
    static C: c::CExtractor = c::CExtractor { cpp: false };
    static CPP: c::CExtractor = c::CExtractor { cpp: true };

    match language {
        SourceLanguage::Python => &PYTHON,
        SourceLanguage::JavaScript | SourceLanguage::TypeScript | SourceLanguage::Tsx => {
            &JAVASCRIPT
        }
        SourceLanguage::Java => &JAVA,
        SourceLanguage::C => &C,
        SourceLanguage::Cpp => &CPP,
    }
}
