//! Applying byte-ranged literal edits to file content.
//!
//! Every applied edit yields its inverse, expressed in the coordinates of the
//! rewritten content, so a rename can be reverted edit by edit.

use std::path::Path;

use thiserror::Error;

use crate::types::SourceLocation;
use crate::types::TextEdit;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EditError {
    #[error("edit range {start}..{end} is outside the file ({len} bytes)")]
    OutOfBounds { start: usize, end: usize, len: usize },

    #[error("expected '{expected}' at byte {start}, found '{found}'")]
    Mismatch {
        start: usize,
        expected: String,
        found: String,
    },

    #[error("edits overlap at byte {start}")]
    Overlap { start: usize },
}

/// Rewritten content plus the edits that turn it back into the input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedEdits {
    pub content: String,
    pub inverse: Vec<TextEdit>,
}

/// Apply `edits` to `content`.
///
/// Edits may be given in any order. Each must cover exactly its `old_text`
/// and no two may overlap; otherwise nothing is applied.
pub fn apply_edits(path: &Path, content: &str, edits: &[TextEdit]) -> Result<AppliedEdits, EditError> {
    let mut ordered: Vec<&TextEdit> = edits.iter().collect();
    ordered.sort_by_key(|edit| edit.location.byte_range);

    let mut previous_end = 0;
    for (i, edit) in ordered.iter().enumerate() {
        let (start, end) = edit.location.byte_range;
        let found = content.get(start..end).ok_or(EditError::OutOfBounds {
            start,
            end,
            len: content.len(),
        })?;
        if found != edit.old_text {
            return Err(EditError::Mismatch {
                start,
                expected: edit.old_text.clone(),
                found: found.to_string(),
            });
        }
        if i > 0 && start < previous_end {
            return Err(EditError::Overlap { start });
        }
        previous_end = end;
    }

    let mut rewritten = String::with_capacity(content.len());
    let mut spans = Vec::with_capacity(ordered.len());
    let mut cursor = 0;
    for edit in &ordered {
        let (start, end) = edit.location.byte_range;
        rewritten.push_str(&content[cursor..start]);
        let new_start = rewritten.len();
        rewritten.push_str(&edit.new_text);
        spans.push((new_start, rewritten.len(), *edit));
        cursor = end;
    }
    rewritten.push_str(&content[cursor..]);

    let inverse = spans
        .into_iter()
        .map(|(start, end, edit)| TextEdit {
            location: SourceLocation::from_byte_range(path, &rewritten, start, end),
            old_text: edit.new_text.clone(),
            new_text: edit.old_text.clone(),
        })
        .collect();

    Ok(AppliedEdits {
        content: rewritten,
        inverse,
    })
}
