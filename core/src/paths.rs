//! Path sanitation for asset and filesystem path arguments.
//!
//! Paths are checked lexically and never touch the filesystem. Anything that
//! could escape the content root is rejected rather than repaired: parent
//! segments, `.` segments, drive letters, UNC prefixes, URL schemes, control
//! characters and characters the content browser cannot store.

use thiserror::Error;

const FORBIDDEN_CHARS: [char; 7] = ['<', '>', '"', '|', '?', '*', ':'];
const MAX_PATH_LEN: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("path must not be empty")]
    Empty,
    #[error("path exceeds {MAX_PATH_LEN} characters")]
    TooLong,
    #[error("path traversal ('..') is not allowed")]
    Traversal,
    #[error("relative segment ('.') is not allowed")]
    RelativeSegment,
    #[error("path contains a control character")]
    ControlCharacter,
    #[error("path contains forbidden character '{0}'")]
    ForbiddenCharacter(char),
    #[error("drive letters, UNC shares and URLs are not allowed")]
    ForeignRoot,
}

/// Validate a path and return its canonical form: forward slashes, one leading
/// slash, no duplicate or trailing slashes.
///
/// `Game\\Input\\IA_Jump` becomes `/Game/Input/IA_Jump`.
pub fn sanitize_path(raw: &str) -> Result<String, PathError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(PathError::Empty);
    }
    if trimmed.chars().count() > MAX_PATH_LEN {
        return Err(PathError::TooLong);
    }
    if trimmed.chars().any(char::is_control) {
        return Err(PathError::ControlCharacter);
    }
    if trimmed.starts_with("\\\\") || trimmed.starts_with("//") || trimmed.contains("://") {
        return Err(PathError::ForeignRoot);
    }
    if has_drive_prefix(trimmed) {
        return Err(PathError::ForeignRoot);
    }
    if let Some(bad) = trimmed.chars().find(|c| FORBIDDEN_CHARS.contains(c)) {
        return Err(PathError::ForbiddenCharacter(bad));
    }

    let normalized = trimmed.replace('\\', "/");
    let mut segments = Vec::new();
    for segment in normalized.split('/') {
        match segment {
            "" => continue,
            ".." => return Err(PathError::Traversal),
            "." => return Err(PathError::RelativeSegment),
            s if s.trim().is_empty() => return Err(PathError::Empty),
            s => segments.push(s),
        }
    }
    if segments.is_empty() {
        return Err(PathError::Empty);
    }
    Ok(format!("/{}", segments.join("/")))
}

fn has_drive_prefix(path: &str) -> bool {
    let mut chars = path.chars();
    matches!(
        (chars.next(), chars.next()),
        (Some(letter), Some(':')) if letter.is_ascii_alphabetic()
    )
}
