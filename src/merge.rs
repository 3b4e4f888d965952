//! Depth-aware merge of a package's main subtree into an installation
//! root.
//!
//! The payload tree is walked depth-first in entry-name order. Depth is
//! counted structurally from the main subtree root (depth 1), never by
//! directory name: entries at depth 2 and 3 are category scaffolding
//! ("Mods", "aircraft", "Liveries", ...) merged as real directories,
//! everything at depth 4 and below is terminal payload handled by the
//! symlink manager or the patch engine.
//!
//! Enable aborts on the first unrecoverable conflict so the target tree
//! is never mutated past a state the markers can't describe. Disable is
//! best-effort: per-entry failures become warnings and the walk keeps
//! going, because disable's job is maximal cleanup.

use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{EngineError, Warning};
use crate::links;
use crate::package::ModPackage;
use crate::patch;

/// File extension handled by the patch engine instead of symlinking.
pub const PATCH_EXTENSION: &str = "lua";

/// Merge direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Enable,
    Disable,
}

/// Closed classification of a directory entry, computed purely from
/// structural depth and file type so the dispatch table can be tested
/// without touching a filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Depth 2/3 directory: merged as a real directory, reusing an
    /// existing case-insensitive match.
    CategoryDir,
    /// Depth 2/3 file: never merged, never an error.
    IgnoredFile,
    /// Depth >= 4 directory: symlinked wholesale.
    LinkedDir,
    /// Depth >= 4 lua script: patched in place.
    PatchedScript,
    /// Depth >= 4 non-lua file: symlinked like a directory.
    LinkedFile,
}

impl EntryKind {
    /// `depth` is the depth of the entry itself; children of the main
    /// subtree root are at depth 2.
    pub fn classify(depth: u32, is_dir: bool, extension: Option<&str>) -> Self {
        match (depth, is_dir) {
            (2..=3, true) => Self::CategoryDir,
            (2..=3, false) => Self::IgnoredFile,
            (_, true) => Self::LinkedDir,
            (_, false) => {
                if extension == Some(PATCH_EXTENSION) {
                    Self::PatchedScript
                } else {
                    Self::LinkedFile
                }
            }
        }
    }
}

/// Result of a merge pass.
#[derive(Debug, Default)]
pub struct MergeOutcome {
    /// Whether anything on disk was written or removed.
    pub changed: bool,
    /// Non-fatal problems collected during a disable pass.
    pub warnings: Vec<Warning>,
}

impl MergeOutcome {
    fn warn(&mut self, path: &Path, detail: impl Into<String>) {
        self.warnings.push(Warning::new(path, detail));
    }
}

/// Merge (or unmerge) a validated package into `install_root`.
pub fn merge(
    package: &ModPackage,
    install_root: &Path,
    mode: Mode,
) -> Result<MergeOutcome, EngineError> {
    let mut outcome = MergeOutcome::default();
    walk(
        package,
        &package.main_subtree,
        install_root,
        2,
        mode,
        &mut outcome,
    )?;
    Ok(outcome)
}

fn walk(
    pkg: &ModPackage,
    source_dir: &Path,
    dest_dir: &Path,
    depth: u32,
    mode: Mode,
    out: &mut MergeOutcome,
) -> Result<(), EngineError> {
    let mut entries = match read_entries(source_dir) {
        Ok(entries) => entries,
        Err(e) => match mode {
            Mode::Enable => return Err(EngineError::io(source_dir, e)),
            Mode::Disable => {
                out.warn(source_dir, format!("unreadable source directory: {e}"));
                return Ok(());
            }
        },
    };
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let src = entry.path();
        let name = entry.file_name();
        let ext = src.extension().and_then(OsStr::to_str);

        match EntryKind::classify(depth, src.is_dir(), ext) {
            EntryKind::IgnoredFile => {}
            EntryKind::CategoryDir => {
                merge_category(pkg, &src, dest_dir, &name, depth, mode, out)?;
            }
            EntryKind::LinkedDir | EntryKind::LinkedFile => {
                merge_link(&src, &dest_dir.join(&name), mode, out)?;
            }
            EntryKind::PatchedScript => {
                merge_script(pkg, &src, &dest_dir.join(&name), mode, out)?;
            }
        }
    }
    Ok(())
}

fn read_entries(dir: &Path) -> io::Result<Vec<fs::DirEntry>> {
    fs::read_dir(dir)?.collect()
}

/// Merge one depth-2/3 category directory and recurse into it.
fn merge_category(
    pkg: &ModPackage,
    src: &Path,
    dest_parent: &Path,
    name: &OsStr,
    depth: u32,
    mode: Mode,
    out: &mut MergeOutcome,
) -> Result<(), EngineError> {
    let dest = match existing_entry_ci(dest_parent, name) {
        Ok(dest) => dest,
        Err(e) => match mode {
            Mode::Enable => return Err(EngineError::io(dest_parent, e)),
            Mode::Disable => {
                out.warn(dest_parent, format!("unreadable directory: {e}"));
                return Ok(());
            }
        },
    };

    match mode {
        Mode::Enable => {
            if !dest.exists() {
                fs::create_dir(&dest).map_err(|e| EngineError::io(&dest, e))?;
                out.changed = true;
            } else if !dest.is_dir() {
                return Err(EngineError::Conflict {
                    path: dest,
                    reason: "a file occupies this category directory".to_string(),
                });
            }
            walk(pkg, src, &dest, depth + 1, mode, out)
        }
        Mode::Disable => {
            if !dest.exists() {
                return Ok(());
            }
            walk(pkg, src, &dest, depth + 1, mode, out)?;
            // Bottom-up prune: a category dir emptied by this pass goes
            // away, one still holding other mods' entries stays.
            prune_if_empty(&dest, out);
            Ok(())
        }
    }
}

fn merge_link(
    src: &Path,
    dest: &Path,
    mode: Mode,
    out: &mut MergeOutcome,
) -> Result<(), EngineError> {
    match mode {
        Mode::Enable => {
            out.changed |= links::link(dest, src)?;
            Ok(())
        }
        Mode::Disable => {
            match links::unlink(dest, src) {
                Ok(removed) => out.changed |= removed,
                Err(e) => out.warn(dest, e.to_string()),
            }
            Ok(())
        }
    }
}

fn merge_script(
    pkg: &ModPackage,
    src: &Path,
    dest: &Path,
    mode: Mode,
    out: &mut MergeOutcome,
) -> Result<(), EngineError> {
    match mode {
        Mode::Enable => {
            let payload = fs::read_to_string(src).map_err(|e| EngineError::io(src, e))?;
            out.changed |= patch::apply(dest, &pkg.name, &pkg.version, &payload)?;
            Ok(())
        }
        Mode::Disable => {
            match patch::remove(dest, &pkg.name) {
                Ok(removed) => out.changed |= removed,
                Err(e) => out.warn(dest, e.to_string()),
            }
            Ok(())
        }
    }
}

/// Find the on-disk entry matching `name` in `dir`, case-insensitively,
/// preferring an exact match. Returns the joined path with the mod's
/// own casing when nothing matches yet, so new directories are created
/// exactly as the package spells them.
fn existing_entry_ci(dir: &Path, name: &OsStr) -> io::Result<PathBuf> {
    let wanted = dir.join(name);
    if !dir.exists() || fs::symlink_metadata(&wanted).is_ok() {
        return Ok(wanted);
    }
    let needle = name.to_string_lossy().to_lowercase();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_name = entry.file_name();
        if file_name.to_string_lossy().to_lowercase() == needle {
            return Ok(dir.join(file_name));
        }
    }
    Ok(wanted)
}

fn prune_if_empty(dir: &Path, out: &mut MergeOutcome) {
    let Ok(mut entries) = fs::read_dir(dir) else {
        return;
    };
    if entries.next().is_none() {
        match fs::remove_dir(dir) {
            Ok(()) => out.changed = true,
            Err(e) => out.warn(dir, format!("could not remove empty directory: {e}")),
        }
    }
}
