//! Tree-sitter parsers for the symdex index.
//!
//! One [`TreeSitterParser`] per bundled grammar implements the core
//! [`LanguageParser`](symdex_core::LanguageParser) capability: symbol and
//! dependency extraction with lexical scopes, and syntax-aware reference
//! search for renames.

pub mod error;
mod extract;
pub mod language_registry;
pub mod parser;
mod references;

pub use error::AstError;
pub use error::AstResult;
pub use language_registry::Language;
pub use parser::SyntaxTree;
pub use parser::TreeSitterParser;

use std::sync::Arc;

use symdex_core::ParserRegistry;

/// Register a parser for every bundled grammar.
pub fn register_all(registry: &mut ParserRegistry) -> AstResult<()> {
    for language in Language::ALL {
        registry.register(Arc::new(TreeSitterParser::new(language)?));
    }
    Ok(())
}

/// A registry holding every bundled grammar
pub fn default_registry() -> AstResult<ParserRegistry> {
    let mut registry = ParserRegistry::new();
    register_all(&mut registry)?;
    Ok(registry)
}
