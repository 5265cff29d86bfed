//! Structural checks an edit plan must pass before anything touches the
//! working copy. Checks run in a fixed order so the first violation reported
//! is deterministic for a given plan.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use crate::errors::JobError;
use crate::models::{EditKind, EditPlan};

/// Resolve an edit path against the working root. Rejects absolute paths and
/// any `..` sequence that climbs above the root; interior `..` that stays
/// inside is allowed.
pub fn resolve_edit_path(work_root: &Path, edit_path: &str) -> Option<PathBuf> {
    if edit_path.is_empty() {
        return None;
    }
    let rel = Path::new(edit_path);
    if rel.is_absolute() {
        return None;
    }
    let mut depth: i32 = 0;
    for component in rel.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::ParentDir => {
                depth -= 1;
                if depth < 0 {
                    return None;
                }
            }
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(work_root.join(rel))
}

fn violation(path: &str, rule: &str) -> JobError {
    JobError::InvalidEditPlan {
        path: path.to_string(),
        rule: rule.to_string(),
    }
}

/// Validate a plan against the current working copy.
pub fn validate_plan(plan: &EditPlan, work_root: &Path) -> Result<(), JobError> {
    // Every path must stay inside the working root.
    for edit in &plan.changes {
        if resolve_edit_path(work_root, &edit.path).is_none() {
            return Err(violation(
                &edit.path,
                "path must be relative and stay inside the repository",
            ));
        }
    }

    // No path may appear twice.
    let mut seen = HashSet::new();
    for edit in &plan.changes {
        if !seen.insert(edit.path.as_str()) {
            return Err(violation(&edit.path, "path appears more than once in the plan"));
        }
    }

    // Modify and delete need an existing target.
    for edit in &plan.changes {
        if matches!(edit.kind, EditKind::Modify | EditKind::Delete)
            && let Some(target) = resolve_edit_path(work_root, &edit.path)
            && !target.is_file()
        {
            return Err(violation(&edit.path, "target file does not exist"));
        }
    }

    // Create must not clobber an existing path.
    for edit in &plan.changes {
        if edit.kind == EditKind::Create
            && let Some(target) = resolve_edit_path(work_root, &edit.path)
            && target.exists()
        {
            return Err(violation(&edit.path, "target file already exists"));
        }
    }

    // Create and modify carry the full new file body.
    for edit in &plan.changes {
        if matches!(edit.kind, EditKind::Create | EditKind::Modify)
            && edit.content.as_deref().unwrap_or("").is_empty()
        {
            return Err(violation(&edit.path, "content is required for this edit kind"));
        }
    }

    // Delete must not carry content.
    for edit in &plan.changes {
        if edit.kind == EditKind::Delete && !edit.content.as_deref().unwrap_or("").is_empty() {
            return Err(violation(&edit.path, "delete edits must not carry content"));
        }
    }

    Ok(())
}
