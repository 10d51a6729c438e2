//! Filename normalization and output-root confinement
//!
//! Uploaded filenames become canonical names (lowercase, filesystem-safe,
//! no directory or extension) so the same track always maps to the same
//! output directory regardless of platform case sensitivity. Download paths
//! supplied by clients are checked so they can never leave the output root.

use moonarch_common::{Error, Result};
use std::path::{Component, Path, PathBuf};
use uuid::Uuid;

/// Names Windows refuses as file or directory names
const RESERVED_NAMES: &[&str] = &[
    "con", "prn", "aux", "nul", "com1", "com2", "com3", "com4", "com5", "com6", "com7", "com8",
    "com9", "lpt1", "lpt2", "lpt3", "lpt4", "lpt5", "lpt6", "lpt7", "lpt8", "lpt9",
];

/// Last path component of a client-supplied filename
///
/// Both `/` and `\` count as separators since clients on any platform may
/// send either.
fn basename(raw_filename: &str) -> &str {
    raw_filename.rsplit(['/', '\\']).next().unwrap_or("")
}

/// Derive the canonical name for an uploaded filename
///
/// Strips directory components and the extension, lowercases, and replaces
/// every character outside `[alphanumeric - _ .]` with `_`.
///
/// ```
/// use moonarch_splitter::services::path_normalizer::normalize;
///
/// assert_eq!(normalize("Song.MP3").unwrap(), "song");
/// assert_eq!(normalize("C:\\Music\\My Song!.wav").unwrap(), "my_song_");
/// ```
pub fn normalize(raw_filename: &str) -> Result<String> {
    let name = basename(raw_filename);
    let stem = match name.rfind('.') {
        Some(idx) if idx > 0 => &name[..idx],
        _ => name,
    };

    let sanitized: String = stem
        .chars()
        .flat_map(char::to_lowercase)
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let sanitized = sanitized.trim_matches('.');

    if sanitized.is_empty() {
        return Err(Error::InvalidInput(format!(
            "Filename '{}' has no usable characters",
            raw_filename
        )));
    }

    if RESERVED_NAMES.contains(&sanitized) {
        return Ok(format!("_{}", sanitized));
    }

    Ok(sanitized.to_string())
}

/// Filename used for the staged copy of an upload
///
/// The engine names its output directory after the staged file's stem, so
/// the stem is the upload id and never the client's name. Only a sanitized
/// extension survives. The client name is still checked and rejected if it
/// cannot be a file name at all.
pub fn staging_file_name(upload_id: Uuid, raw_filename: &str) -> Result<String> {
    let name = basename(raw_filename).trim();

    if name.is_empty() || name == "." || name == ".." {
        return Err(Error::InvalidInput(format!(
            "Invalid upload filename '{}'",
            raw_filename
        )));
    }
    if name.chars().any(char::is_control) {
        return Err(Error::InvalidInput(
            "Upload filename contains control characters".to_string(),
        ));
    }

    let extension = Path::new(name)
        .extension()
        .map(|ext| {
            ext.to_string_lossy()
                .chars()
                .filter(char::is_ascii_alphanumeric)
                .collect::<String>()
                .to_ascii_lowercase()
        })
        .unwrap_or_default();

    if extension.is_empty() {
        Ok(upload_id.to_string())
    } else {
        Ok(format!("{}.{}", upload_id, extension))
    }
}

/// Validate a client-supplied download path and return it as a relative path
///
/// Rejects empty paths, absolute paths and any `..` component. Backslashes
/// are treated as separators.
pub fn parse_relative_path(raw: &str) -> Result<PathBuf> {
    if raw.trim().is_empty() {
        return Err(Error::InvalidInput("Empty download path".to_string()));
    }
    if raw.contains('\0') {
        return Err(Error::InvalidInput("Invalid download path".to_string()));
    }

    let unified = raw.replace('\\', "/");
    let mut relative = PathBuf::new();

    for component in Path::new(&unified).components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(Error::InvalidInput(format!(
                    "Download path escapes the output root: {}",
                    raw
                )));
            }
        }
    }

    if relative.as_os_str().is_empty() {
        return Err(Error::InvalidInput("Empty download path".to_string()));
    }

    Ok(relative)
}

/// Resolve `.` and `..` without touching the filesystem
fn lexical_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// True if `candidate` (absolute, or relative to `base_dir`) stays inside `base_dir`
///
/// The check is lexical first; when both paths exist they are also
/// canonicalized so a symlink pointing outside the root is rejected too.
pub fn is_within(base_dir: &Path, candidate: &Path) -> bool {
    let base = lexical_normalize(base_dir);
    let resolved = lexical_normalize(&base_dir.join(candidate));

    if !resolved.starts_with(&base) {
        return false;
    }

    match (base_dir.canonicalize(), resolved.canonicalize()) {
        (Ok(real_base), Ok(real_candidate)) => real_candidate.starts_with(real_base),
        _ => true,
    }
}

/// Find `relative` under `base_dir`, matching each component case-insensitively
///
/// Exact matches win; otherwise the containing directory is scanned for a
/// name equal ignoring case. Returns `None` when any component is missing.
pub fn resolve_case_insensitive(base_dir: &Path, relative: &Path) -> Option<PathBuf> {
    let mut current = base_dir.to_path_buf();

    for component in relative.components() {
        let Component::Normal(name) = component else {
            return None;
        };

        let exact = current.join(name);
        if exact.exists() {
            current = exact;
            continue;
        }

        let wanted = name.to_string_lossy().to_lowercase();
        let mut matches: Vec<PathBuf> = std::fs::read_dir(&current)
            .ok()?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().to_lowercase() == wanted)
            .map(|entry| entry.path())
            .collect();
        matches.sort();

        current = matches.into_iter().next()?;
    }

    Some(current)
}
