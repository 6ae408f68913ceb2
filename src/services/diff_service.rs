//! Pairwise textual diff of two dumps.
//!
//! A greedy line walker with a small look-ahead window; good enough for
//! eyeballing schema drift between two dumps without holding a full LCS
//! matrix for multi-hundred-megabyte files.

use serde::Serialize;

/// How many context lines to surface around a change.
const CONTEXT_LINES: usize = 3;
/// Look-ahead window when resynchronizing after a mismatch.
const RESYNC_WINDOW: usize = 5;
/// Hard cap on emitted changes.
const MAX_CHANGES: usize = 1000;

#[derive(Debug, Clone, Serialize)]
pub struct DiffChange {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub content: String,
    pub line_number: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_line: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_line: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiffResponse {
    pub added: usize,
    pub removed: usize,
    pub modified: usize,
    pub unchanged: usize,
    pub changes: Vec<DiffChange>,
}

/// Whether an unchanged line is near enough to recent changes to be shown.
fn should_show_line(changes: &[DiffChange], line_number: usize) -> bool {
    if line_number <= CONTEXT_LINES {
        return true;
    }
    changes
        .iter()
        .rev()
        .take(10)
        .any(|change| change.kind != "unchanged")
}

pub fn generate_diff(source: &str, target: &str) -> DiffResponse {
    let source_lines: Vec<&str> = source.split('\n').collect();
    let target_lines: Vec<&str> = target.split('\n').collect();

    let mut changes: Vec<DiffChange> = Vec::new();
    let mut added = 0usize;
    let mut removed = 0usize;
    let mut unchanged = 0usize;
    let mut line_number = 0usize;

    let mut i = 0usize;
    let mut j = 0usize;

    while i < source_lines.len() || j < target_lines.len() {
        line_number += 1;

        if i >= source_lines.len() {
            added += 1;
            changes.push(DiffChange {
                kind: "added",
                content: format!("+ {}", target_lines[j]),
                line_number,
                old_line: None,
                new_line: Some(j),
            });
            j += 1;
        } else if j >= target_lines.len() {
            removed += 1;
            changes.push(DiffChange {
                kind: "removed",
                content: format!("- {}", source_lines[i]),
                line_number,
                old_line: Some(i),
                new_line: None,
            });
            i += 1;
        } else if source_lines[i] == target_lines[j] {
            unchanged += 1;
            if should_show_line(&changes, line_number) {
                changes.push(DiffChange {
                    kind: "unchanged",
                    content: format!("  {}", source_lines[i]),
                    line_number,
                    old_line: Some(i),
                    new_line: Some(j),
                });
            }
            i += 1;
            j += 1;
        } else if i + 1 < source_lines.len()
            && j + 1 < target_lines.len()
            && source_lines[i + 1] == target_lines[j + 1]
        {
            // The next lines agree: treat this as a one-line modification
            removed += 1;
            changes.push(DiffChange {
                kind: "removed",
                content: format!("- {}", source_lines[i]),
                line_number,
                old_line: Some(i),
                new_line: None,
            });
            line_number += 1;
            added += 1;
            changes.push(DiffChange {
                kind: "added",
                content: format!("+ {}", target_lines[j]),
                line_number,
                old_line: None,
                new_line: Some(j),
            });
            i += 1;
            j += 1;
        } else {
            // Look a few lines ahead in the target for a resync point
            let window_end = (j + RESYNC_WINDOW).min(target_lines.len());
            let resync = (j + 1..window_end).find(|&k| source_lines[i] == target_lines[k]);

            match resync {
                Some(k) => {
                    for l in j..k {
                        if l > j {
                            line_number += 1;
                        }
                        added += 1;
                        changes.push(DiffChange {
                            kind: "added",
                            content: format!("+ {}", target_lines[l]),
                            line_number,
                            old_line: None,
                            new_line: Some(l),
                        });
                    }
                    j = k;
                }
                None => {
                    removed += 1;
                    changes.push(DiffChange {
                        kind: "removed",
                        content: format!("- {}", source_lines[i]),
                        line_number,
                        old_line: Some(i),
                        new_line: None,
                    });
                    i += 1;
                }
            }
        }

        if changes.len() > MAX_CHANGES {
            break;
        }
    }

    DiffResponse {
        added,
        removed,
        modified: 0,
        unchanged,
        changes,
    }
}
