//! [`LanguageParser`] backed by a tree-sitter grammar.

use std::path::Path;

use symdex_core::Dependency;
use symdex_core::LanguageParser;
use symdex_core::ParseError;
use symdex_core::ParseResult;
use symdex_core::Reference;
use symdex_core::SourceTree;
use symdex_core::Symbol;
use tracing::debug;
use tree_sitter::Node;
use tree_sitter::Parser;
use tree_sitter::Tree;

use crate::error::AstError;
use crate::error::AstResult;
use crate::extract::Extractor;
use crate::language_registry::Language;
use crate::references;

/// Syntax payload stored in a [`SourceTree`] by [`TreeSitterParser`]
#[derive(Debug)]
pub struct SyntaxTree {
    pub tree: Tree,
    pub language: Language,
}

#[derive(Debug, Clone, Copy)]
pub struct TreeSitterParser {
    language: Language,
}

impl TreeSitterParser {
    /// Fails if the bundled grammar is incompatible with the linked
    /// tree-sitter runtime.
    pub fn new(language: Language) -> AstResult<Self> {
        Parser::new()
            .set_language(&language.grammar())
            .map_err(|e| AstError::Grammar {
                language: language.name().to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self { language })
    }

    pub const fn grammar_language(&self) -> Language {
        self.language
    }

    // Parser is not Sync, so each parse gets its own.
    fn new_parser(&self, path: &Path) -> ParseResult<Parser> {
        let mut parser = Parser::new();
        parser
            .set_language(&self.language.grammar())
            .map_err(|e| ParseError::new(path, e.to_string()))?;
        Ok(parser)
    }
}

/// 1-based line of the first error or missing node under `node`
fn first_error_line(node: Node<'_>) -> Option<usize> {
    if node.is_error() || node.is_missing() {
        return Some(node.start_position().row + 1);
    }
    let mut cursor = node.walk();
    node.children(&mut cursor)
        .filter(|child| child.has_error())
        .find_map(first_error_line)
}

impl LanguageParser for TreeSitterParser {
    fn language(&self) -> &str {
        self.language.name()
    }

    fn extensions(&self) -> &[&str] {
        self.language.extensions()
    }

    fn parse(&self, text: &str, path: &Path) -> ParseResult<SourceTree> {
        let tree = self
            .new_parser(path)?
            .parse(text, None)
            .ok_or_else(|| ParseError::new(path, "tree-sitter returned no tree"))?;

        let root = tree.root_node();
        if root.has_error() {
            debug!(
                path = %path.display(),
                line = ?first_error_line(root),
                "syntax errors; indexing the recoverable parts"
            );
        }

        Ok(SourceTree::new(
            path,
            text,
            SyntaxTree {
                tree,
                language: self.language,
            },
        ))
    }

    fn extract_symbols(&self, tree: &SourceTree) -> ParseResult<Vec<Symbol>> {
        let syntax = tree.expect_syntax::<SyntaxTree>()?;
        Extractor::new(syntax.language, &tree.path, &tree.source)
            .symbols(syntax.tree.root_node(), &tree.module_scope())
    }

    fn extract_dependencies(&self, tree: &SourceTree) -> ParseResult<Vec<Dependency>> {
        let syntax = tree.expect_syntax::<SyntaxTree>()?;
        Extractor::new(syntax.language, &tree.path, &tree.source)
            .dependencies(syntax.tree.root_node())
    }

    fn find_references(&self, tree: &SourceTree, symbol: &Symbol) -> ParseResult<Vec<Reference>> {
        let syntax = tree.expect_syntax::<SyntaxTree>()?;
        references::find_references(&syntax.tree, &tree.path, &tree.source, symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broken_source_still_parses() {
        let parser = TreeSitterParser::new(Language::Rust).unwrap();
        let tree = parser
            .parse("fn ok() {}\nfn broken( {\n", Path::new("lib.rs"))
            .unwrap();

        let syntax = tree.syntax::<SyntaxTree>().unwrap();
        let root = syntax.tree.root_node();
        assert!(root.has_error());
        assert!(first_error_line(root).is_some_and(|line| line >= 2));

        let symbols = parser.extract_symbols(&tree).unwrap();
        assert!(symbols.iter().any(|s| s.name == "ok"));
    }

    #[test]
    fn rejects_trees_from_other_parsers() {
        let parser = TreeSitterParser::new(Language::Go).unwrap();
        let foreign = SourceTree::new("main.go", "package main", ());
        assert!(parser.extract_symbols(&foreign).is_err());
    }
}
