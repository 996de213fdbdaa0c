//! Symbol and dependency extraction from tree-sitter syntax trees.
//!
//! Definitions are recognised by node kind per language. The walk keeps a
//! scope stack so every symbol carries the chain of enclosing modules,
//! types and functions; the file itself is the outermost module scope.

use std::collections::HashSet;
use std::path::Path;

use symdex_core::Dependency;
use symdex_core::DependencyKind;
use symdex_core::ParseError;
use symdex_core::ParseResult;
use symdex_core::Scope;
use symdex_core::ScopeKind;
use symdex_core::SourceLocation;
use symdex_core::Symbol;
use symdex_core::SymbolKind;
use symdex_core::Visibility;
use tree_sitter::Node;

use crate::language_registry::Language;

const MAX_SIGNATURE_CHARS: usize = 200;

/// Identifier-like leaf: the only nodes a rename ever rewrites
pub(crate) fn is_name_leaf(node: Node<'_>) -> bool {
    node.is_named() && node.child_count() == 0 && node.kind().ends_with("identifier")
}

pub(crate) fn node_text<'s>(source: &'s str, node: Node<'_>, path: &Path) -> ParseResult<&'s str> {
    source.get(node.byte_range()).ok_or_else(|| {
        ParseError::new(
            path,
            format!("{} node spans an invalid byte range", node.kind()),
        )
        .at_line(node.start_position().row + 1)
    })
}

/// What one syntax node declares
struct Declaration<'tree> {
    kind: Option<SymbolKind>,
    names: Vec<Node<'tree>>,
    /// Scope the node's children live in, named by the node's text
    opens: Option<(ScopeKind, Node<'tree>)>,
}

impl<'tree> Declaration<'tree> {
    fn symbol(kind: SymbolKind, name: Node<'tree>) -> Self {
        Self::symbols(kind, vec![name])
    }

    fn symbols(kind: SymbolKind, names: Vec<Node<'tree>>) -> Self {
        Self {
            kind: Some(kind),
            names,
            opens: None,
        }
    }

    fn scoped(kind: SymbolKind, name: Node<'tree>, scope: ScopeKind) -> Self {
        Self {
            kind: Some(kind),
            names: vec![name],
            opens: Some((scope, name)),
        }
    }

    const fn scope_only(scope: ScopeKind, name: Node<'tree>) -> Self {
        Self {
            kind: None,
            names: Vec::new(),
            opens: Some((scope, name)),
        }
    }
}

fn in_type_body(scope: &Scope) -> bool {
    matches!(
        scope.kind,
        ScopeKind::Impl
            | ScopeKind::Trait
            | ScopeKind::Class
            | ScopeKind::Interface
            | ScopeKind::Struct
    )
}

fn field_nodes<'tree>(node: Node<'tree>, field: &str) -> Vec<Node<'tree>> {
    let mut cursor = node.walk();
    node.children_by_field_name(field, &mut cursor).collect()
}

/// `Foo` for `Foo<T>` and `a::b::Foo`
fn type_name(node: Node<'_>) -> Node<'_> {
    match node.kind() {
        "generic_type" => node.child_by_field_name("type").map_or(node, type_name),
        "scoped_type_identifier" => node.child_by_field_name("name").unwrap_or(node),
        _ => node,
    }
}

/// Identifiers bound by a Rust pattern
fn pattern_bindings<'tree>(pattern: Node<'tree>, out: &mut Vec<Node<'tree>>) {
    match pattern.kind() {
        "identifier" => out.push(pattern),
        "tuple_pattern" | "tuple_struct_pattern" | "slice_pattern" | "ref_pattern"
        | "reference_pattern" | "mut_pattern" => {
            let constructor = pattern.child_by_field_name("type");
            let mut cursor = pattern.walk();
            for child in pattern.named_children(&mut cursor) {
                if Some(child) != constructor {
                    pattern_bindings(child, out);
                }
            }
        }
        _ => {}
    }
}

fn unquote(text: &str) -> &str {
    text.trim_matches(|c| matches!(c, '"' | '\'' | '`'))
}

pub(crate) struct Extractor<'a> {
    language: Language,
    path: &'a Path,
    source: &'a str,
    symbols: Vec<Symbol>,
    dependencies: Vec<Dependency>,
    /// `(scope key, name)` of variable-like bindings already reported
    bindings: HashSet<(String, String)>,
}

impl<'a> Extractor<'a> {
    pub(crate) fn new(language: Language, path: &'a Path, source: &'a str) -> Self {
        Self {
            language,
            path,
            source,
            symbols: Vec::new(),
            dependencies: Vec::new(),
            bindings: HashSet::new(),
        }
    }

    /// Symbols under `root`, nested inside the file's `module` scope
    pub(crate) fn symbols(mut self, root: Node<'_>, module: &Scope) -> ParseResult<Vec<Symbol>> {
        self.visit(root, module)?;
        Ok(self.symbols)
    }

    pub(crate) fn dependencies(mut self, root: Node<'_>) -> ParseResult<Vec<Dependency>> {
        self.collect_dependencies(root)?;
        Ok(self.dependencies)
    }

    fn text(&self, node: Node<'_>) -> ParseResult<&'a str> {
        node_text(self.source, node, self.path)
    }

    fn location(&self, node: Node<'_>) -> SourceLocation {
        SourceLocation::from_byte_range(self.path, self.source, node.start_byte(), node.end_byte())
    }

    fn visit(&mut self, node: Node<'_>, scope: &Scope) -> ParseResult<()> {
        let mut inner = None;
        if let Some(declaration) = self.classify(node, scope)? {
            if let Some(kind) = declaration.kind {
                for name in declaration.names {
                    self.push_symbol(node, name, kind, scope)?;
                }
            }
            if let Some((kind, name)) = declaration.opens {
                inner = Some(scope.child(kind, Some(self.text(type_name(name))?.to_string())));
            }
        }

        let scope = inner.as_ref().unwrap_or(scope);
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            self.visit(child, scope)?;
        }
        Ok(())
    }

    fn classify<'tree>(
        &self,
        node: Node<'tree>,
        scope: &Scope,
    ) -> ParseResult<Option<Declaration<'tree>>> {
        match self.language {
            Language::Rust => Ok(rust_declaration(node, scope)),
            Language::Python => self.python_declaration(node, scope),
            Language::JavaScript | Language::TypeScript | Language::Tsx => {
                Ok(script_declaration(node, scope))
            }
            Language::Go => Ok(go_declaration(node)),
        }
    }

    fn python_declaration<'tree>(
        &self,
        node: Node<'tree>,
        scope: &Scope,
    ) -> ParseResult<Option<Declaration<'tree>>> {
        let name = node.child_by_field_name("name");
        let declaration = match (node.kind(), name) {
            ("function_definition", Some(name)) => {
                let kind = if scope.kind == ScopeKind::Class {
                    SymbolKind::Method
                } else {
                    SymbolKind::Function
                };
                Declaration::scoped(kind, name, ScopeKind::Function)
            }
            ("class_definition", Some(name)) => {
                Declaration::scoped(SymbolKind::Class, name, ScopeKind::Class)
            }
            ("assignment", _) => {
                let Some(target) = node.child_by_field_name("left") else {
                    return Ok(None);
                };
                if target.kind() != "identifier" {
                    return Ok(None);
                }
                let text = self.text(target)?;
                let kind = if scope.kind == ScopeKind::Class {
                    SymbolKind::Property
                } else if text.len() > 1
                    && text.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
                {
                    SymbolKind::Constant
                } else {
                    SymbolKind::Variable
                };
                Declaration::symbol(kind, target)
            }
            ("parameters", _) => {
                let mut names = Vec::new();
                let mut cursor = node.walk();
                for param in node.named_children(&mut cursor) {
                    let binding = match param.kind() {
                        "identifier" => Some(param),
                        "typed_parameter" => param.named_child(0),
                        "default_parameter" | "typed_default_parameter" => {
                            param.child_by_field_name("name")
                        }
                        _ => None,
                    };
                    if let Some(binding) = binding
                        && binding.kind() == "identifier"
                        && !matches!(self.text(binding)?, "self" | "cls")
                    {
                        names.push(binding);
                    }
                }
                Declaration::symbols(SymbolKind::Parameter, names)
            }
            _ => return Ok(None),
        };
        Ok(Some(declaration))
    }

    fn push_symbol(
        &mut self,
        declaration: Node<'_>,
        name: Node<'_>,
        kind: SymbolKind,
        scope: &Scope,
    ) -> ParseResult<()> {
        if !is_name_leaf(name) {
            return Ok(());
        }
        let text = self.text(name)?;
        if matches!(
            kind,
            SymbolKind::Variable | SymbolKind::Constant | SymbolKind::Property
        ) && !self
            .bindings
            .insert((scope.scope_key(), text.to_string()))
        {
            return Ok(());
        }

        let mut symbol = Symbol::new(text, kind, self.location(name))
            .with_scope(scope.clone())
            .with_signature(self.signature(declaration));
        symbol.visibility = self.visibility(declaration, kind, text);
        symbol.documentation = self.documentation(declaration);
        self.symbols.push(symbol);
        Ok(())
    }

    /// Declaration text up to its body, whitespace collapsed
    fn signature(&self, node: Node<'_>) -> String {
        let end = node
            .child_by_field_name("body")
            .map_or(node.end_byte(), |body| body.start_byte());
        let text = self.source.get(node.start_byte()..end).unwrap_or_default();
        let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
        let trimmed = collapsed.trim_end_matches([':', '{', ' ']);
        if trimmed.chars().count() > MAX_SIGNATURE_CHARS {
            let cut: String = trimmed.chars().take(MAX_SIGNATURE_CHARS).collect();
            format!("{cut}...")
        } else {
            trimmed.to_string()
        }
    }

    fn visibility(&self, node: Node<'_>, kind: SymbolKind, name: &str) -> Option<Visibility> {
        if matches!(kind, SymbolKind::Parameter) {
            return None;
        }
        match self.language {
            Language::Rust => {
                if kind == SymbolKind::Variable {
                    return None;
                }
                let mut cursor = node.walk();
                let modifier = node
                    .children(&mut cursor)
                    .find(|child| child.kind() == "visibility_modifier");
                Some(match modifier.and_then(|m| self.source.get(m.byte_range())) {
                    Some("pub") => Visibility::Public,
                    Some(_) => Visibility::Internal,
                    None => Visibility::Private,
                })
            }
            Language::Python => Some(if name.starts_with("__") && !name.ends_with("__") {
                Visibility::Private
            } else if name.starts_with('_') {
                Visibility::Internal
            } else {
                Visibility::Public
            }),
            Language::Go => Some(if name.starts_with(|c: char| c.is_uppercase()) {
                Visibility::Public
            } else {
                Visibility::Package
            }),
            Language::JavaScript | Language::TypeScript | Language::Tsx => {
                let mut cursor = node.walk();
                let modifier = node
                    .children(&mut cursor)
                    .find(|child| child.kind() == "accessibility_modifier")
                    .and_then(|m| self.source.get(m.byte_range()));
                match modifier {
                    Some("private") => Some(Visibility::Private),
                    Some("protected") => Some(Visibility::Protected),
                    Some(_) => Some(Visibility::Public),
                    None if is_exported(node) => Some(Visibility::Public),
                    None => None,
                }
            }
        }
    }

    /// Comments directly above the declaration, attributes and decorators skipped
    fn documentation(&self, node: Node<'_>) -> Option<String> {
        let mut anchor = node;
        while anchor.prev_sibling().is_none()
            && let Some(parent) = anchor.parent()
            && matches!(
                parent.kind(),
                "export_statement"
                    | "decorated_definition"
                    | "lexical_declaration"
                    | "variable_declaration"
                    | "const_declaration"
                    | "var_declaration"
                    | "type_declaration"
            )
        {
            anchor = parent;
        }

        let mut lines = Vec::new();
        let mut row = anchor.start_position().row;
        let mut previous = anchor.prev_sibling();
        while let Some(sibling) = previous {
            if sibling.end_position().row + 1 < row {
                break;
            }
            if sibling.kind().contains("comment") {
                lines.push(self.source.get(sibling.byte_range())?.trim_end());
            } else if !matches!(sibling.kind(), "attribute_item" | "decorator") {
                break;
            }
            row = sibling.start_position().row;
            previous = sibling.prev_sibling();
        }
        if lines.is_empty() {
            return None;
        }
        lines.reverse();
        Some(lines.join("\n"))
    }

    fn collect_dependencies(&mut self, node: Node<'_>) -> ParseResult<()> {
        for (name, kind) in self.dependency_nodes(node) {
            let text = unquote(self.text(name)?);
            if text.is_empty() {
                continue;
            }
            let mut dependency =
                Dependency::new(text.split_whitespace().collect::<String>(), kind);
            dependency.location = Some(self.location(name));
            self.dependencies.push(dependency);
        }

        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            self.collect_dependencies(child)?;
        }
        Ok(())
    }

    /// Nodes naming what `node` imports
    fn dependency_nodes<'tree>(&self, node: Node<'tree>) -> Vec<(Node<'tree>, DependencyKind)> {
        let import = |found: Option<Node<'tree>>| {
            found
                .map(|n| vec![(n, DependencyKind::Import)])
                .unwrap_or_default()
        };
        match (self.language, node.kind()) {
            (Language::Rust, "use_declaration") => import(node.child_by_field_name("argument")),
            (Language::Rust, "extern_crate_declaration") => {
                import(node.child_by_field_name("name"))
            }
            (Language::Rust, "mod_item") if node.child_by_field_name("body").is_none() => node
                .child_by_field_name("name")
                .map(|n| vec![(n, DependencyKind::Module)])
                .unwrap_or_default(),
            (Language::Python, "import_statement") => field_nodes(node, "name")
                .into_iter()
                .map(|n| match n.kind() {
                    "aliased_import" => n.child_by_field_name("name").unwrap_or(n),
                    _ => n,
                })
                .map(|n| (n, DependencyKind::Import))
                .collect(),
            (Language::Python, "import_from_statement") => {
                import(node.child_by_field_name("module_name"))
            }
            (
                Language::JavaScript | Language::TypeScript | Language::Tsx,
                "import_statement" | "export_statement",
            ) => import(node.child_by_field_name("source")),
            (Language::JavaScript | Language::TypeScript | Language::Tsx, "call_expression") => {
                let callee = node
                    .child_by_field_name("function")
                    .and_then(|f| self.source.get(f.byte_range()));
                if !matches!(callee, Some("require" | "import")) {
                    return Vec::new();
                }
                import(
                    node.child_by_field_name("arguments")
                        .and_then(|args| args.named_child(0))
                        .filter(|arg| arg.kind() == "string"),
                )
            }
            (Language::Go, "import_spec") => import(node.child_by_field_name("path")),
            _ => Vec::new(),
        }
    }
}

fn is_exported(node: Node<'_>) -> bool {
    let parent = node.parent();
    let grandparent = parent.and_then(|p| p.parent());
    [parent, grandparent]
        .into_iter()
        .flatten()
        .any(|n| n.kind() == "export_statement")
}

fn rust_declaration<'tree>(node: Node<'tree>, scope: &Scope) -> Option<Declaration<'tree>> {
    let name = node.child_by_field_name("name");
    let declaration = match node.kind() {
        "function_item" => {
            let kind = if in_type_body(scope) {
                SymbolKind::Method
            } else {
                SymbolKind::Function
            };
            Declaration::scoped(kind, name?, ScopeKind::Function)
        }
        "function_signature_item" => Declaration::symbol(SymbolKind::Method, name?),
        "struct_item" | "union_item" => {
            Declaration::scoped(SymbolKind::Struct, name?, ScopeKind::Struct)
        }
        "enum_item" => Declaration::symbol(SymbolKind::Enum, name?),
        "trait_item" => Declaration::scoped(SymbolKind::Trait, name?, ScopeKind::Trait),
        "impl_item" => Declaration::scope_only(ScopeKind::Impl, node.child_by_field_name("type")?),
        "mod_item" if node.child_by_field_name("body").is_some() => {
            Declaration::scoped(SymbolKind::Module, name?, ScopeKind::Module)
        }
        "mod_item" => Declaration::symbol(SymbolKind::Module, name?),
        "const_item" | "static_item" => Declaration::symbol(SymbolKind::Constant, name?),
        "type_item" | "associated_type" => Declaration::symbol(SymbolKind::Type, name?),
        "field_declaration" => Declaration::symbol(SymbolKind::Field, name?),
        "let_declaration" | "parameter" => {
            let mut names = Vec::new();
            pattern_bindings(node.child_by_field_name("pattern")?, &mut names);
            let kind = if node.kind() == "parameter" {
                SymbolKind::Parameter
            } else {
                SymbolKind::Variable
            };
            Declaration::symbols(kind, names)
        }
        _ => return None,
    };
    Some(declaration)
}

fn script_declaration<'tree>(node: Node<'tree>, scope: &Scope) -> Option<Declaration<'tree>> {
    let name = node.child_by_field_name("name");
    let declaration = match node.kind() {
        "function_declaration" | "generator_function_declaration" => {
            Declaration::scoped(SymbolKind::Function, name?, ScopeKind::Function)
        }
        "function_signature" => Declaration::symbol(SymbolKind::Function, name?),
        "class_declaration" | "abstract_class_declaration" | "class" => {
            Declaration::scoped(SymbolKind::Class, name?, ScopeKind::Class)
        }
        "method_definition" => Declaration::scoped(SymbolKind::Method, name?, ScopeKind::Function),
        "method_signature" | "abstract_method_signature" => {
            Declaration::symbol(SymbolKind::Method, name?)
        }
        "field_definition" => {
            Declaration::symbol(SymbolKind::Property, node.child_by_field_name("property")?)
        }
        "public_field_definition" | "property_signature" => {
            Declaration::symbol(SymbolKind::Property, name?)
        }
        "interface_declaration" => {
            Declaration::scoped(SymbolKind::Interface, name?, ScopeKind::Interface)
        }
        "type_alias_declaration" => Declaration::symbol(SymbolKind::Type, name?),
        "enum_declaration" => Declaration::symbol(SymbolKind::Enum, name?),
        "internal_module" | "module" => {
            Declaration::scoped(SymbolKind::Module, name?, ScopeKind::Namespace)
        }
        "variable_declarator" => {
            let name = name?;
            let value = node.child_by_field_name("value").map(|v| v.kind());
            if matches!(
                value,
                Some("arrow_function" | "function_expression" | "function" | "generator_function")
            ) {
                Declaration::scoped(SymbolKind::Function, name, ScopeKind::Function)
            } else {
                let constant = node
                    .parent()
                    .filter(|p| p.kind() == "lexical_declaration")
                    .and_then(|p| p.child(0))
                    .is_some_and(|keyword| keyword.kind() == "const");
                let kind = if constant && !in_type_body(scope) {
                    SymbolKind::Constant
                } else {
                    SymbolKind::Variable
                };
                Declaration::symbol(kind, name)
            }
        }
        "formal_parameters" => {
            let mut names = Vec::new();
            let mut cursor = node.walk();
            for param in node.named_children(&mut cursor) {
                let binding = match param.kind() {
                    "identifier" => Some(param),
                    "assignment_pattern" => param.child_by_field_name("left"),
                    "required_parameter" | "optional_parameter" => {
                        param.child_by_field_name("pattern")
                    }
                    _ => None,
                };
                if let Some(binding) = binding
                    && binding.kind() == "identifier"
                {
                    names.push(binding);
                }
            }
            Declaration::symbols(SymbolKind::Parameter, names)
        }
        _ => return None,
    };
    Some(declaration)
}

fn go_declaration(node: Node<'_>) -> Option<Declaration<'_>> {
    let name = node.child_by_field_name("name");
    let declaration = match node.kind() {
        "function_declaration" => {
            Declaration::scoped(SymbolKind::Function, name?, ScopeKind::Function)
        }
        "method_declaration" => Declaration::scoped(SymbolKind::Method, name?, ScopeKind::Function),
        "method_spec" | "method_elem" => Declaration::symbol(SymbolKind::Method, name?),
        "type_spec" => match node.child_by_field_name("type").map(|t| t.kind()) {
            Some("struct_type") => Declaration::scoped(SymbolKind::Struct, name?, ScopeKind::Struct),
            Some("interface_type") => {
                Declaration::scoped(SymbolKind::Interface, name?, ScopeKind::Interface)
            }
            _ => Declaration::symbol(SymbolKind::Type, name?),
        },
        "type_alias" => Declaration::symbol(SymbolKind::Type, name?),
        "const_spec" => Declaration::symbols(SymbolKind::Constant, field_nodes(node, "name")),
        "var_spec" => Declaration::symbols(SymbolKind::Variable, field_nodes(node, "name")),
        "field_declaration" => Declaration::symbols(SymbolKind::Field, field_nodes(node, "name")),
        "parameter_declaration" => {
            Declaration::symbols(SymbolKind::Parameter, field_nodes(node, "name"))
        }
        "short_var_declaration" => {
            let left = node.child_by_field_name("left")?;
            let mut cursor = left.walk();
            let names = left
                .named_children(&mut cursor)
                .filter(|n| n.kind() == "identifier")
                .collect();
            Declaration::symbols(SymbolKind::Variable, names)
        }
        _ => return None,
    };
    Some(declaration)
}
