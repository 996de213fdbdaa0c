//! Core value types shared by the indexes, the parser capability and the
//! rename engine.
//!
//! Every type here is an immutable value: index entries are replaced
//! wholesale on update rather than mutated in place.

use std::fmt;
use std::path::Path;
use std::path::PathBuf;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// Locations
// ============================================================================

/// Source location with precise file:line:column metadata.
///
/// Lines and columns are 1-based; `byte_range` is a half-open range into the
/// file's UTF-8 content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file_path: PathBuf,
    pub start_line: usize,
    pub start_column: usize,
    pub end_line: usize,
    pub end_column: usize,
    pub byte_range: (usize, usize),
}

impl SourceLocation {
    /// Create a new source location
    pub fn new(
        file_path: impl Into<PathBuf>,
        start_line: usize,
        start_column: usize,
        end_line: usize,
        end_column: usize,
        byte_range: (usize, usize),
    ) -> Self {
        Self {
            file_path: file_path.into(),
            start_line,
            start_column,
            end_line,
            end_column,
            byte_range,
        }
    }

    /// Build a location from a byte range, deriving line and column from `source`.
    pub fn from_byte_range(file_path: impl Into<PathBuf>, source: &str, start: usize, end: usize) -> Self {
        let (start_line, start_column) = line_column_at(source, start);
        let (end_line, end_column) = line_column_at(source, end);
        Self::new(file_path, start_line, start_column, end_line, end_column, (start, end))
    }

    pub const fn start_byte(&self) -> usize {
        self.byte_range.0
    }

    pub const fn end_byte(&self) -> usize {
        self.byte_range.1
    }

    /// Format with range
    pub fn to_range_string(&self) -> String {
        if self.start_line == self.end_line {
            format!(
                "{}:{}:{}-{}",
                self.file_path.display(),
                self.start_line,
                self.start_column,
                self.end_column
            )
        } else {
            format!(
                "{}:{}:{}-{}:{}",
                self.file_path.display(),
                self.start_line,
                self.start_column,
                self.end_line,
                self.end_column
            )
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.file_path.display(),
            self.start_line,
            self.start_column
        )
    }
}

/// 1-based (line, column) of a byte offset. Columns count characters.
pub fn line_column_at(source: &str, offset: usize) -> (usize, usize) {
    let offset = offset.min(source.len());
    let prefix = source.get(..offset).unwrap_or(source);
    let line = prefix.matches('\n').count() + 1;
    let line_start = prefix.rfind('\n').map_or(0, |i| i + 1);
    let column = prefix[line_start..].chars().count() + 1;
    (line, column)
}

// ============================================================================
// Symbols and scopes
// ============================================================================

/// Symbol kind classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Function,
    Method,
    Class,
    Struct,
    Enum,
    Interface,
    Trait,
    Module,
    Variable,
    Constant,
    Type,
    Property,
    Field,
    Parameter,
}

impl SymbolKind {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Method => "method",
            Self::Class => "class",
            Self::Struct => "struct",
            Self::Enum => "enum",
            Self::Interface => "interface",
            Self::Trait => "trait",
            Self::Module => "module",
            Self::Variable => "variable",
            Self::Constant => "constant",
            Self::Type => "type",
            Self::Property => "property",
            Self::Field => "field",
            Self::Parameter => "parameter",
        }
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for SymbolKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s.to_ascii_lowercase().as_str() {
            "function" | "fn" => Self::Function,
            "method" => Self::Method,
            "class" => Self::Class,
            "struct" => Self::Struct,
            "enum" => Self::Enum,
            "interface" => Self::Interface,
            "trait" => Self::Trait,
            "module" | "mod" => Self::Module,
            "variable" | "var" => Self::Variable,
            "constant" | "const" => Self::Constant,
            "type" => Self::Type,
            "property" => Self::Property,
            "field" => Self::Field,
            "parameter" | "param" => Self::Parameter,
            other => return Err(format!("unknown symbol kind: {other}")),
        };
        Ok(kind)
    }
}

/// Kind of a lexical scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    Module,
    Namespace,
    Class,
    Struct,
    Interface,
    Trait,
    Impl,
    Function,
    Block,
}

impl ScopeKind {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Module => "module",
            Self::Namespace => "namespace",
            Self::Class => "class",
            Self::Struct => "struct",
            Self::Interface => "interface",
            Self::Trait => "trait",
            Self::Impl => "impl",
            Self::Function => "function",
            Self::Block => "block",
        }
    }
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A lexical nesting context. `parent` points outwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    pub kind: ScopeKind,
    pub name: Option<String>,
    pub parent: Option<Box<Scope>>,
}

impl Scope {
    /// Create an outermost scope
    pub fn new(kind: ScopeKind, name: Option<String>) -> Self {
        Self {
            kind,
            name,
            parent: None,
        }
    }

    /// Create a scope nested inside `self`
    pub fn child(&self, kind: ScopeKind, name: Option<String>) -> Self {
        Self {
            kind,
            name,
            parent: Some(Box::new(self.clone())),
        }
    }

    /// Number of levels from the outermost scope down to this one.
    pub fn depth(&self) -> usize {
        self.parent.as_ref().map_or(1, |p| p.depth() + 1)
    }

    /// Qualifying key, outermost first: `module:app/class:User/function:anonymous`.
    ///
    /// Two symbols share a scope bucket iff their keys are identical.
    pub fn scope_key(&self) -> String {
        let mut levels = Vec::with_capacity(self.depth());
        let mut current = Some(self);
        while let Some(scope) = current {
            levels.push(format!(
                "{}:{}",
                scope.kind,
                scope.name.as_deref().unwrap_or("anonymous")
            ));
            current = scope.parent.as_deref();
        }
        levels.reverse();
        levels.join("/")
    }
}

/// Code visibility level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    Protected,
    Private,
    Internal,
    Package,
}

/// A named program entity as reported by a parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    /// Location of the defining name.
    pub location: SourceLocation,
    /// Enclosing scope, innermost level.
    pub scope: Option<Scope>,
    pub visibility: Option<Visibility>,
    pub signature: Option<String>,
    pub documentation: Option<String>,
}

impl Symbol {
    pub fn new(name: impl Into<String>, kind: SymbolKind, location: SourceLocation) -> Self {
        Self {
            name: name.into(),
            kind,
            location,
            scope: None,
            visibility: None,
            signature: None,
            documentation: None,
        }
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    pub fn scope_key(&self) -> Option<String> {
        self.scope.as_ref().map(Scope::scope_key)
    }

    pub fn file_path(&self) -> &Path {
        &self.location.file_path
    }
}

// ============================================================================
// Dependencies and references
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyKind {
    Import,
    Module,
    Other,
}

/// Something a file pulls in from elsewhere (an import, a module include...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub name: String,
    pub kind: DependencyKind,
    pub location: Option<SourceLocation>,
}

impl Dependency {
    pub fn new(name: impl Into<String>, kind: DependencyKind) -> Self {
        Self {
            name: name.into(),
            kind,
            location: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Definition,
    Read,
    Write,
    Call,
    Import,
    Type,
}

/// One occurrence of a symbol's name in a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub location: SourceLocation,
    pub kind: ReferenceKind,
}

// ============================================================================
// Files
// ============================================================================

/// Per-file metadata. Replaced wholesale when the file changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub file_path: PathBuf,
    pub last_modified: DateTime<Utc>,
    pub size: u64,
    pub extension: String,
    pub language: Option<String>,
    pub checksum: String,
}

impl FileInfo {
    /// Build file info from raw content, hashing it with SHA-256.
    pub fn from_content(
        file_path: impl Into<PathBuf>,
        content: &str,
        last_modified: DateTime<Utc>,
        language: Option<String>,
    ) -> Self {
        let file_path = file_path.into();
        let extension = file_path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        Self {
            extension,
            last_modified,
            size: content.len() as u64,
            language,
            checksum: checksum(content),
            file_path,
        }
    }
}

/// Hex-encoded SHA-256 of `content`.
pub fn checksum(content: &str) -> String {
    use sha2::Digest;
    use sha2::Sha256;

    let digest = Sha256::digest(content.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

// ============================================================================
// Edits
// ============================================================================

/// A literal replacement of `old_text` at `location` by `new_text`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextEdit {
    pub location: SourceLocation,
    pub old_text: String,
    pub new_text: String,
}
