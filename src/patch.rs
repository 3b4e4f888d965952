//! Sentinel-block patching of lua script files.
//!
//! A patch block looks like this inside the host file:
//!
//! ```text
//! -- This file was modified by modlink. DO NOT EDIT THIS BLOCK. --
//! -- {"mod_name":"SuperHornet","version":"1.0.0"}
//! dofile("Mods/aircraft/SuperHornet/entry.lua")
//! -- This file was modified by modlink. DO NOT EDIT THIS BLOCK. --
//! ```
//!
//! At most one block exists per owning mod per file. `apply` writes
//! exactly one separator newline before the opening sentinel, and
//! `remove` excises exactly that range again, so an apply/remove cycle
//! restores the host file byte-for-byte. Hand-authored content around
//! the blocks is never rewritten.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::EngineError;

pub const BLOCK_MARKER: &str =
    "-- This file was modified by modlink. DO NOT EDIT THIS BLOCK. --";

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct BlockHeader {
    mod_name: String,
    version: String,
}

/// A block found in a host file: its owner (None when the header line
/// is not one of ours) and the byte range of its sentinel-delimited
/// body, opening marker line through closing marker line inclusive.
#[derive(Debug)]
pub struct PatchBlock {
    pub mod_name: Option<String>,
    pub version: Option<String>,
    start: usize,
    end: usize,
}

impl PatchBlock {
    fn is_owned_by(&self, mod_name: &str) -> bool {
        self.mod_name.as_deref() == Some(mod_name)
    }
}

/// Locate every sentinel block in `content`.
///
/// Marker lines are paired in order of appearance. An odd number of
/// markers means an opening sentinel lost its close; that file is
/// corrupt and must not be modified, let alone repaired.
fn scan(content: &str, path: &Path) -> Result<Vec<PatchBlock>, EngineError> {
    let mut markers: Vec<(usize, usize)> = Vec::new();
    let mut pos = 0;
    for chunk in content.split_inclusive('\n') {
        let line = chunk.trim_end_matches('\n').trim_end_matches('\r');
        if line.trim() == BLOCK_MARKER {
            markers.push((pos, pos + chunk.len()));
        }
        pos += chunk.len();
    }

    if markers.len() % 2 != 0 {
        return Err(EngineError::PatchCorruption {
            path: path.to_path_buf(),
            reason: "opening sentinel without a matching close".to_string(),
        });
    }

    let mut blocks = Vec::new();
    for pair in markers.chunks_exact(2) {
        let (start, open_end) = pair[0];
        let (close_start, close_end) = pair[1];
        let header = parse_header(&content[open_end..close_start]);
        blocks.push(PatchBlock {
            mod_name: header.as_ref().map(|h| h.mod_name.clone()),
            version: header.as_ref().map(|h| h.version.clone()),
            start,
            end: close_end,
        });
    }
    Ok(blocks)
}

fn parse_header(body: &str) -> Option<BlockHeader> {
    let first = body.lines().next()?;
    let json = first.trim().strip_prefix("--")?.trim();
    serde_json::from_str(json).ok()
}

fn render(mod_name: &str, version: &str, payload: &str) -> String {
    let header = serde_json::json!({ "mod_name": mod_name, "version": version });
    format!(
        "{BLOCK_MARKER}\n-- {header}\n{}\n{BLOCK_MARKER}\n",
        payload.trim_end()
    )
}

fn read_host(path: &Path) -> Result<String, EngineError> {
    if !path.exists() {
        return Ok(String::new());
    }
    fs::read_to_string(path).map_err(|e| EngineError::io(path, e))
}

fn write_host(path: &Path, content: &str) -> Result<(), EngineError> {
    fs::write(path, content).map_err(|e| EngineError::io(path, e))
}

/// Apply a patch for `mod_name` to the host file, creating the file if
/// it does not exist.
///
/// If a block for this mod is already present, its header and payload
/// are replaced in place; other blocks and all surrounding content keep
/// their exact bytes. Returns `true` when the file was written, `false`
/// when the wanted block was already there verbatim.
pub fn apply(
    path: &Path,
    mod_name: &str,
    version: &str,
    payload: &str,
) -> Result<bool, EngineError> {
    let content = read_host(path)?;
    let blocks = scan(&content, path)?;
    let body = render(mod_name, version, payload);

    if let Some(block) = blocks.iter().find(|b| b.is_owned_by(mod_name)) {
        if content[block.start..block.end] == body[..] {
            return Ok(false);
        }
        let mut next = String::with_capacity(content.len() + body.len());
        next.push_str(&content[..block.start]);
        next.push_str(&body);
        next.push_str(&content[block.end..]);
        write_host(path, &next)?;
        return Ok(true);
    }

    let mut next = String::with_capacity(content.len() + body.len() + 1);
    next.push_str(&content);
    if !content.is_empty() {
        next.push('\n');
    }
    next.push_str(&body);
    write_host(path, &next)?;
    Ok(true)
}

/// Remove the block owned by `mod_name`, restoring the surrounding
/// bytes exactly.
///
/// Returns `true` if a block was removed. A host file left empty is
/// kept as an empty file: it may predate any mod, so deleting it is
/// not this engine's call.
pub fn remove(path: &Path, mod_name: &str) -> Result<bool, EngineError> {
    if !path.exists() {
        return Ok(false);
    }
    let content = fs::read_to_string(path).map_err(|e| EngineError::io(path, e))?;
    let blocks = scan(&content, path)?;
    let Some(block) = blocks.iter().find(|b| b.is_owned_by(mod_name)) else {
        return Ok(false);
    };

    // The opening marker starts a line, so for any block not at offset
    // zero the preceding byte is the separator newline `apply` wrote.
    let cut = if block.start > 0 {
        block.start - 1
    } else {
        0
    };
    let mut next = String::with_capacity(content.len());
    next.push_str(&content[..cut]);
    next.push_str(&content[block.end..]);
    write_host(path, &next)?;
    Ok(true)
}

/// Owners of every well-formed block in the host file. Used by status
/// reporting; corruption propagates like everywhere else.
pub fn block_owners(path: &Path) -> Result<Vec<(String, String)>, EngineError> {
    let content = read_host(path)?;
    Ok(scan(&content, path)?
        .into_iter()
        .filter_map(|b| Some((b.mod_name?, b.version?)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const HAND_WRITTEN: &str = "options = {\n    difficulty = \"realistic\",\n}\n";

    fn host(temp: &TempDir) -> std::path::PathBuf {
        let path = temp.path().join("options.lua");
        fs::write(&path, HAND_WRITTEN).unwrap();
        path
    }

    #[test]
    fn test_apply_creates_missing_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("new.lua");

        assert!(apply(&path, "Foo", "1.0.0", "x = 1").unwrap());
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with(BLOCK_MARKER));
        assert!(content.contains("\"mod_name\":\"Foo\""));
        assert!(content.contains("x = 1"));
    }

    #[test]
    fn test_apply_preserves_existing_content() {
        let temp = TempDir::new().unwrap();
        let path = host(&temp);

        apply(&path, "Foo", "1.0.0", "x = 1").unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with(HAND_WRITTEN));
    }

    #[test]
    fn test_round_trip_is_byte_exact() {
        let temp = TempDir::new().unwrap();
        let path = host(&temp);

        apply(&path, "Foo", "1.0.0", "x = 1").unwrap();
        assert!(remove(&path, "Foo").unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), HAND_WRITTEN);
    }

    #[test]
    fn test_round_trip_without_trailing_newline() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("options.lua");
        fs::write(&path, "x = 1").unwrap();

        apply(&path, "Foo", "1.0.0", "y = 2").unwrap();
        remove(&path, "Foo").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "x = 1");
    }

    #[test]
    fn test_apply_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let path = host(&temp);

        assert!(apply(&path, "Foo", "1.0.0", "x = 1").unwrap());
        let after_first = fs::read_to_string(&path).unwrap();

        assert!(!apply(&path, "Foo", "1.0.0", "x = 1").unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), after_first);
    }

    #[test]
    fn test_apply_replaces_block_in_place() {
        let temp = TempDir::new().unwrap();
        let path = host(&temp);

        apply(&path, "Foo", "1.0.0", "x = 1").unwrap();
        apply(&path, "Bar", "0.2.0", "y = 2").unwrap();

        // Upgrade Foo; Bar's block and the hand-written prefix must not move
        assert!(apply(&path, "Foo", "1.1.0", "x = 10").unwrap());
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with(HAND_WRITTEN));
        assert!(content.contains("\"version\":\"1.1.0\""));
        assert!(content.contains("x = 10"));
        assert!(!content.contains("x = 1\n"));
        assert!(content.contains("\"mod_name\":\"Bar\""));
        assert!(content.contains("y = 2"));

        let owners = block_owners(&path).unwrap();
        assert_eq!(owners.len(), 2);
        assert!(owners.contains(&("Foo".to_string(), "1.1.0".to_string())));
        assert!(owners.contains(&("Bar".to_string(), "0.2.0".to_string())));
    }

    #[test]
    fn test_remove_leaves_other_blocks() {
        let temp = TempDir::new().unwrap();
        let path = host(&temp);

        apply(&path, "Foo", "1.0.0", "x = 1").unwrap();
        let foo_only = fs::read_to_string(&path).unwrap();
        apply(&path, "Bar", "0.2.0", "y = 2").unwrap();

        assert!(remove(&path, "Bar").unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), foo_only);
    }

    #[test]
    fn test_remove_first_of_two_blocks() {
        let temp = TempDir::new().unwrap();
        let path = host(&temp);

        apply(&path, "Foo", "1.0.0", "x = 1").unwrap();
        apply(&path, "Bar", "0.2.0", "y = 2").unwrap();
        assert!(remove(&path, "Foo").unwrap());

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with(HAND_WRITTEN));
        assert!(!content.contains("Foo"));
        assert!(content.contains("\"mod_name\":\"Bar\""));
    }

    #[test]
    fn test_remove_unknown_mod_is_noop() {
        let temp = TempDir::new().unwrap();
        let path = host(&temp);

        apply(&path, "Foo", "1.0.0", "x = 1").unwrap();
        let before = fs::read_to_string(&path).unwrap();
        assert!(!remove(&path, "Baz").unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), before);
    }

    #[test]
    fn test_remove_from_created_file_leaves_empty_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("new.lua");

        apply(&path, "Foo", "1.0.0", "x = 1").unwrap();
        remove(&path, "Foo").unwrap();

        // Never deleted, only emptied
        assert!(path.exists());
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn test_unterminated_marker_is_corruption() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("options.lua");
        let mangled = format!("{HAND_WRITTEN}\n{BLOCK_MARKER}\n-- {{\"mod_name\":\"Foo\",\"version\":\"1.0.0\"}}\nx = 1\n");
        fs::write(&path, &mangled).unwrap();

        let err = apply(&path, "Foo", "1.0.0", "x = 1").unwrap_err();
        assert!(matches!(err, EngineError::PatchCorruption { .. }));
        let err = remove(&path, "Foo").unwrap_err();
        assert!(matches!(err, EngineError::PatchCorruption { .. }));

        // The corrupt file must be left exactly as found
        assert_eq!(fs::read_to_string(&path).unwrap(), mangled);
    }

    #[test]
    fn test_foreign_header_is_not_ours() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("options.lua");
        let foreign = format!("{BLOCK_MARKER}\n-- not a header\nwho = \"knows\"\n{BLOCK_MARKER}\n");
        fs::write(&path, &foreign).unwrap();

        // Well-formed markers, unreadable header: not corruption, just
        // not removable by anyone.
        assert!(!remove(&path, "Foo").unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), foreign);
    }
}
