//! `symdex` command line: index a workspace, query it, rename symbols.

pub mod error;

pub use error::CliError;
pub use error::Result;

use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use clap::Subcommand;
use symdex_core::CancellationToken;
use symdex_core::IndexConfig;
use symdex_core::IndexEngine;
use symdex_core::IndexSummary;
use symdex_core::RenameEngine;
use symdex_core::RenameOptions;
use symdex_core::RenamePreview;
use symdex_core::RenameResult;
use symdex_core::SearchOptions;
use symdex_core::Symbol;
use symdex_core::SymbolKind;
use symdex_core::SymbolMatch;
use tracing::Level;
use tracing::debug;
use tracing::info;

/// Index a workspace's symbols and rename them across files
#[derive(Parser, Debug)]
#[command(name = "symdex")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Workspace root
    #[arg(short = 'C', long, global = true, default_value = ".")]
    pub root: PathBuf,

    /// TOML index configuration; its workspace_path replaces --root
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbosity level
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Index the workspace and print a summary
    Index,

    /// List symbols with exactly this name
    Find {
        name: String,

        /// Only symbols of this kind (function, struct, variable, ...)
        #[arg(long)]
        kind: Option<SymbolKind>,
    },

    /// Ranked search over symbol names
    Search {
        query: String,

        /// Substring matching instead of fuzzy matching
        #[arg(long)]
        exact: bool,

        #[arg(long)]
        case_sensitive: bool,

        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Index statistics
    Stats,

    /// Rename a symbol everywhere it is referenced
    ///
    /// The undo log lives only as long as the process, so a rename made
    /// here cannot be undone by a later `symdex` run. Check the edits with
    /// --preview first, and keep the files under version control.
    Rename {
        name: String,

        new_name: String,

        /// File defining the symbol, when the name is ambiguous
        #[arg(long)]
        file: Option<PathBuf>,

        /// Show the edits without writing anything
        #[arg(long)]
        preview: bool,

        /// Rename even when the new name is already taken in the same scope
        #[arg(long)]
        force: bool,

        /// Print the preview or result as JSON
        #[arg(long)]
        json: bool,
    },
}

pub const fn log_level(verbose: u8) -> Level {
    match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

fn load_config(cli: &Cli) -> Result<IndexConfig> {
    let config = match &cli.config {
        Some(path) => IndexConfig::load(path)?,
        None => IndexConfig::for_workspace(&cli.root),
    };
    config.validate()?;
    Ok(config)
}

/// Build the engine, restore its snapshot when persistence is on, and
/// bring it up to date with the workspace.
async fn open_engine(
    cli: &Cli,
    cancel: &CancellationToken,
) -> Result<(IndexEngine, IndexSummary)> {
    let config = load_config(cli)?;
    let root = config.workspace_path.clone();
    let registry = Arc::new(symdex_ast::default_registry()?);
    let engine = IndexEngine::new(config, registry)?;

    if engine.config().enable_persistence {
        let restored = engine.restore().await?;
        debug!(restored, "restored index snapshot");
    }
    let summary = engine.index_project_with_cancel(&root, cancel).await?;
    info!(
        indexed = summary.indexed,
        skipped = summary.skipped,
        failed = summary.failed,
        "workspace indexed"
    );
    Ok((engine, summary))
}

pub async fn run(cli: &Cli, out: &mut impl Write, cancel: &CancellationToken) -> Result<()> {
    let (engine, summary) = open_engine(cli, cancel).await?;
    let engine = Arc::new(engine);

    match &cli.command {
        Command::Index => write_summary(out, &summary)?,
        Command::Find { name, kind } => {
            let matches = engine.find_symbol(name).await?;
            for hit in matches
                .iter()
                .filter(|m| kind.is_none_or(|k| m.entry.symbol.kind == k))
            {
                writeln!(out, "{}", describe(&hit.entry.symbol))?;
            }
        }
        Command::Search {
            query,
            exact,
            case_sensitive,
            limit,
        } => {
            let options = SearchOptions {
                case_sensitive: *case_sensitive,
                fuzzy: !exact,
                max_results: *limit,
            };
            let matches = engine.search_symbols(query, &options).await?;
            write_matches(out, &matches)?;
        }
        Command::Stats => {
            let stats = engine.get_stats().await?;
            writeln!(
                out,
                "files: {} ({} indexed, {} with errors)",
                stats.files.total_files, stats.files.indexed_files, stats.files.files_with_errors
            )?;
            writeln!(
                out,
                "symbols: {} ({} names, {} scopes)",
                stats.symbols.total_symbols, stats.symbols.unique_names, stats.symbols.scopes
            )?;
            for (kind, count) in &stats.symbols.symbols_by_kind {
                writeln!(out, "  {kind}: {count}")?;
            }
            writeln!(out, "dependencies: {}", stats.files.total_dependencies)?;
            writeln!(out, "memory (est.): {} bytes", stats.files.memory_usage_bytes)?;
        }
        Command::Rename {
            name,
            new_name,
            file,
            preview,
            force,
            json,
        } => {
            let symbol = pick_symbol(&engine, name, file.as_deref()).await?;
            let renames = RenameEngine::new(Arc::clone(&engine));
            let files = renames.candidate_files(&symbol).await?;

            if *preview {
                let preview = renames.preview_rename(&symbol, new_name, &files).await?;
                if *json {
                    writeln!(out, "{}", serde_json::to_string_pretty(&preview)?)?;
                } else {
                    write_preview(out, &preview)?;
                }
            } else {
                let options = RenameOptions {
                    force: *force,
                    cancel: cancel.clone(),
                };
                let result = renames.rename(&symbol, new_name, &files, options).await?;
                if *json {
                    writeln!(out, "{}", serde_json::to_string_pretty(&result)?)?;
                } else {
                    write_result(out, &result)?;
                }
                if !result.success {
                    let mut failed: Vec<PathBuf> =
                        result.failures.iter().map(|f| f.path.clone()).collect();
                    failed.extend(result.skipped.iter().cloned());
                    engine.dispose().await?;
                    return Err(CliError::RenameIncomplete { failed });
                }
            }
        }
    }

    engine.dispose().await?;
    Ok(())
}

/// The one indexed symbol called `name`, narrowed by its defining file
async fn pick_symbol(engine: &IndexEngine, name: &str, file: Option<&Path>) -> Result<Symbol> {
    let mut candidates: Vec<Symbol> = engine
        .find_symbol(name)
        .await?
        .into_iter()
        .map(|m| m.entry.symbol.clone())
        .filter(|s| file.is_none_or(|f| s.file_path().ends_with(f)))
        .collect();

    match candidates.len() {
        0 => Err(CliError::SymbolNotFound(name.to_string())),
        1 => Ok(candidates.remove(0)),
        _ => Err(CliError::AmbiguousSymbol {
            name: name.to_string(),
            candidates: candidates.iter().map(describe).collect(),
        }),
    }
}

fn describe(symbol: &Symbol) -> String {
    match symbol.scope_key() {
        Some(scope) => format!("{} {} {} [{scope}]", symbol.location, symbol.kind, symbol.name),
        None => format!("{} {} {}", symbol.location, symbol.kind, symbol.name),
    }
}

fn write_summary(out: &mut impl Write, summary: &IndexSummary) -> Result<()> {
    writeln!(
        out,
        "indexed {} of {} files in {:.2?} ({} skipped, {} failed, {} removed, {} symbols)",
        summary.indexed,
        summary.discovered,
        summary.elapsed,
        summary.skipped,
        summary.failed,
        summary.removed,
        summary.symbols
    )?;
    for (path, reason) in &summary.failures {
        writeln!(out, "  failed: {}: {reason}", path.display())?;
    }
    Ok(())
}

fn write_matches(out: &mut impl Write, matches: &[SymbolMatch]) -> Result<()> {
    for hit in matches {
        writeln!(out, "{:.2} {}", hit.score, describe(&hit.entry.symbol))?;
    }
    Ok(())
}

fn write_preview(out: &mut impl Write, preview: &RenamePreview) -> Result<()> {
    writeln!(
        out,
        "rename '{}' -> '{}': {} reference(s) in {} file(s), est. {:.2?}",
        preview.symbol,
        preview.new_name,
        preview.reference_count,
        preview.affected_files.len(),
        preview.estimated_duration
    )?;
    for file in &preview.edits {
        for edit in &file.edits {
            writeln!(out, "  {} {} -> {}", edit.location, edit.old_text, edit.new_text)?;
        }
    }
    for conflict in &preview.conflicts {
        writeln!(out, "  conflict: {conflict}")?;
    }
    for error in &preview.errors {
        writeln!(out, "  unresolved: {}: {}", error.path.display(), error.message)?;
    }
    if !preview.can_execute {
        writeln!(out, "blocked by conflicts; pass --force to rename anyway")?;
    }
    Ok(())
}

fn write_result(out: &mut impl Write, result: &RenameResult) -> Result<()> {
    writeln!(
        out,
        "{:?}: {} edit(s) in {} file(s) in {:.2?} (operation {})",
        result.status,
        result.edits_applied,
        result.files_changed.len(),
        result.duration,
        result.operation_id
    )?;
    for path in &result.files_changed {
        writeln!(out, "  changed: {}", path.display())?;
    }
    for failure in &result.failures {
        writeln!(
            out,
            "  failed ({:?}): {}: {}",
            failure.stage,
            failure.path.display(),
            failure.message
        )?;
    }
    for path in &result.skipped {
        writeln!(out, "  skipped: {}", path.display())?;
    }
    for conflict in &result.conflicts {
        writeln!(out, "  overridden conflict: {conflict}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parsing() {
        Cli::command().debug_assert();

        let cli = Cli::try_parse_from([
            "symdex", "-vv", "-C", "/work", "rename", "load", "fetch", "--preview",
        ])
        .unwrap();
        assert_eq!(cli.root, PathBuf::from("/work"));
        assert_eq!(cli.verbose, 2);
        assert!(matches!(
            cli.command,
            Command::Rename { ref name, preview: true, force: false, .. } if name == "load"
        ));

        let cli = Cli::try_parse_from(["symdex", "find", "Cache", "--kind", "struct"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Find { kind: Some(SymbolKind::Struct), .. }
        ));
        assert!(Cli::try_parse_from(["symdex", "find", "x", "--kind", "blob"]).is_err());
    }

    #[test]
    fn rename_help_says_it_cannot_be_undone() {
        let mut command = Cli::command();
        let rename = command.find_subcommand_mut("rename").unwrap();
        let help = rename.render_long_help().to_string();
        assert!(help.contains("cannot be undone"), "{help}");
        assert!(help.contains("--preview"), "{help}");
    }

    #[test]
    fn verbosity_maps_to_levels() {
        assert_eq!(log_level(0), Level::WARN);
        assert_eq!(log_level(1), Level::INFO);
        assert_eq!(log_level(2), Level::DEBUG);
        assert_eq!(log_level(7), Level::TRACE);
    }
}
