//! Name-based reference search over a syntax tree.
//!
//! Every identifier leaf whose text equals the symbol's name is an
//! occurrence, except the names of other declarations. Comments and string
//! literals never match because they are not identifier nodes.

use std::path::Path;

use symdex_core::ParseResult;
use symdex_core::Reference;
use symdex_core::ReferenceKind;
use symdex_core::SourceLocation;
use symdex_core::Symbol;
use tree_sitter::Node;
use tree_sitter::Tree;

use crate::extract::is_name_leaf;
use crate::extract::node_text;

const IMPORT_KINDS: &[&str] = &[
    "use_declaration",
    "extern_crate_declaration",
    "import_statement",
    "import_from_statement",
    "import_declaration",
    "import_spec",
];

/// Nodes whose `name` field declares a symbol of its own
const DECLARATION_KINDS: &[&str] = &[
    "function_item",
    "function_signature_item",
    "struct_item",
    "union_item",
    "enum_item",
    "trait_item",
    "mod_item",
    "const_item",
    "static_item",
    "type_item",
    "function_definition",
    "class_definition",
    "function_declaration",
    "generator_function_declaration",
    "class_declaration",
    "abstract_class_declaration",
    "method_definition",
    "interface_declaration",
    "type_alias_declaration",
    "enum_declaration",
    "method_declaration",
    "type_spec",
];

pub(crate) fn find_references(
    tree: &Tree,
    path: &Path,
    source: &str,
    symbol: &Symbol,
) -> ParseResult<Vec<Reference>> {
    let mut references = Vec::new();
    if symbol.name.is_empty() || !source.contains(symbol.name.as_str()) {
        return Ok(references);
    }

    let mut cursor = tree.walk();
    loop {
        let node = cursor.node();
        if is_name_leaf(node)
            && node_text(source, node, path)? == symbol.name
            && (is_definition_of(node, symbol, path) || !declares_other(node))
        {
            references.push(Reference {
                location: SourceLocation::from_byte_range(
                    path,
                    source,
                    node.start_byte(),
                    node.end_byte(),
                ),
                kind: reference_kind(node, symbol, path),
            });
        }

        if cursor.goto_first_child() {
            continue;
        }
        while !cursor.goto_next_sibling() {
            if !cursor.goto_parent() {
                return Ok(references);
            }
        }
    }
}

fn is_definition_of(node: Node<'_>, symbol: &Symbol, path: &Path) -> bool {
    symbol.location.file_path == path
        && symbol.location.byte_range == (node.start_byte(), node.end_byte())
}

/// `node` names a different declaration that happens to share the name
fn declares_other(node: Node<'_>) -> bool {
    node.parent().is_some_and(|parent| {
        DECLARATION_KINDS.contains(&parent.kind())
            && parent.child_by_field_name("name") == Some(node)
    })
}

fn reference_kind(node: Node<'_>, symbol: &Symbol, path: &Path) -> ReferenceKind {
    if is_definition_of(node, symbol, path) {
        ReferenceKind::Definition
    } else if has_ancestor(node, IMPORT_KINDS) {
        ReferenceKind::Import
    } else if is_call_target(node) {
        ReferenceKind::Call
    } else if is_assignment_target(node) {
        ReferenceKind::Write
    } else if node.kind() == "type_identifier" {
        ReferenceKind::Type
    } else {
        ReferenceKind::Read
    }
}

fn has_ancestor(node: Node<'_>, kinds: &[&str]) -> bool {
    let mut current = node.parent();
    while let Some(parent) = current {
        if kinds.contains(&parent.kind()) {
            return true;
        }
        current = parent.parent();
    }
    false
}

fn calls(call: Node<'_>, callee: Node<'_>) -> bool {
    match call.kind() {
        "call_expression" | "call" => call.child_by_field_name("function") == Some(callee),
        "new_expression" => call.child_by_field_name("constructor") == Some(callee),
        "macro_invocation" => call.child_by_field_name("macro") == Some(callee),
        _ => false,
    }
}

/// Field holding the member name in `receiver.member` style nodes
fn member_field(kind: &str) -> Option<&'static str> {
    match kind {
        "field_expression" | "selector_expression" => Some("field"),
        "member_expression" => Some("property"),
        "attribute" => Some("attribute"),
        "scoped_identifier" => Some("name"),
        _ => None,
    }
}

fn is_call_target(node: Node<'_>) -> bool {
    let Some(parent) = node.parent() else {
        return false;
    };
    if calls(parent, node) {
        return true;
    }
    member_field(parent.kind())
        .is_some_and(|field| parent.child_by_field_name(field) == Some(node))
        && parent.parent().is_some_and(|call| calls(call, parent))
}

fn is_assignment_target(node: Node<'_>) -> bool {
    let mut target = node;
    let Some(mut parent) = node.parent() else {
        return false;
    };
    if parent.kind() == "expression_list"
        && let Some(outer) = parent.parent()
    {
        target = parent;
        parent = outer;
    }
    matches!(
        parent.kind(),
        "assignment"
            | "augmented_assignment"
            | "assignment_expression"
            | "augmented_assignment_expression"
            | "compound_assignment_expr"
            | "assignment_statement"
    ) && parent.child_by_field_name("left") == Some(target)
}
