use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, info, warn};

use crate::error::SelectError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeExtension {
    Pdf,
    Doc,
    Docx,
    Rtf,
}

impl ResumeExtension {
    /// Case-insensitive; `None` for anything that is not an accepted resume type.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(ResumeExtension::Pdf),
            "doc" => Some(ResumeExtension::Doc),
            "docx" => Some(ResumeExtension::Docx),
            "rtf" => Some(ResumeExtension::Rtf),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResumeExtension::Pdf => "pdf",
            ResumeExtension::Doc => "doc",
            ResumeExtension::Docx => "docx",
            ResumeExtension::Rtf => "rtf",
        }
    }
}

/// The file chosen for this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeFile {
    pub path: PathBuf,
    pub modified: SystemTime,
    pub extension: ResumeExtension,
}

impl ResumeFile {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Picks the resume to upload.
///
/// A file path is used as-is if it exists and has an accepted extension. For a
/// directory, the accepted file with the latest modification time wins; equal
/// times go to the lexicographically greatest file name.
pub fn select(path: &Path) -> Result<ResumeFile, SelectError> {
    if path.is_dir() {
        return select_from_dir(path);
    }

    let metadata = match fs::metadata(path) {
        Ok(m) if m.is_file() => m,
        _ => {
            return Err(SelectError::FileNotFound {
                path: path.to_path_buf(),
            })
        }
    };
    let Some(extension) = ResumeExtension::from_path(path) else {
        return Err(SelectError::FileNotFound {
            path: path.to_path_buf(),
        });
    };
    let modified = metadata.modified().map_err(|source| SelectError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;

    info!(path = %path.display(), "[RESUME] Using explicit resume file");
    Ok(ResumeFile {
        path: path.to_path_buf(),
        modified,
        extension,
    })
}

fn select_from_dir(dir: &Path) -> Result<ResumeFile, SelectError> {
    let entries = fs::read_dir(dir).map_err(|source| SelectError::Unreadable {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut candidates = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "[RESUME] Skipping unreadable directory entry");
                continue;
            }
        };
        let path = entry.path();
        let Some(extension) = ResumeExtension::from_path(&path) else {
            debug!(path = %path.display(), "[RESUME] Ignoring file with unsupported extension");
            continue;
        };
        let metadata = match fs::metadata(&path) {
            Ok(m) if m.is_file() => m,
            Ok(_) => continue,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "[RESUME] Skipping file without metadata");
                continue;
            }
        };
        let Ok(modified) = metadata.modified() else {
            warn!(path = %path.display(), "[RESUME] Skipping file without modification time");
            continue;
        };
        candidates.push(ResumeFile {
            path,
            modified,
            extension,
        });
    }

    let chosen = candidates
        .into_iter()
        .max_by(newest_then_name)
        .ok_or_else(|| SelectError::NoResumeFound {
            dir: dir.to_path_buf(),
        })?;

    info!(
        dir = %dir.display(),
        file = %chosen.file_name(),
        "[RESUME] Selected most recently modified resume"
    );
    Ok(chosen)
}

fn newest_then_name(a: &ResumeFile, b: &ResumeFile) -> Ordering {
    a.modified
        .cmp(&b.modified)
        .then_with(|| a.path.file_name().cmp(&b.path.file_name()))
}
