use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::info;

use crate::error::PollError;
use crate::registry::ImageDetail;

/// The results document shared with the downstream pipeline step
///
/// Entries already in the file are kept as raw JSON and unknown top-level
/// fields are carried through, so a rewrite never drops data it did not write.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ImageDetailsDocument {
    #[serde(rename = "imageDetails", default)]
    pub image_details: Vec<Value>,

    /// Set when the document is created, never updated afterwards
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// What [`merge_into_file`] did to the results file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Created { added: usize },
    Appended { previous: usize, added: usize },
}

/// Append `images` to the results document at `path`, creating it if needed
///
/// An existing document is read, extended in `images` order and rewritten in
/// full. A missing document is created (parent directories included) with the
/// given region and `mode` permissions. The write is not atomic and takes no
/// lock, so two processes must not share a path.
pub fn merge_into_file(
    path: &Path,
    region: &str,
    images: &[ImageDetail],
    mode: u32,
) -> Result<MergeOutcome, PollError> {
    let exists = path
        .try_exists()
        .map_err(|e| PollError::io_at("check", path, e))?;

    let new_entries = images
        .iter()
        .map(serde_json::to_value)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| PollError::io("Failed to serialize image details", e))?;
    let added = new_entries.len();

    let (document, outcome) = if exists {
        let mut document = read_document(path)?;
        let previous = document.image_details.len();
        document.image_details.extend(new_entries);
        (document, MergeOutcome::Appended { previous, added })
    } else {
        let document = ImageDetailsDocument {
            image_details: new_entries,
            region: Some(region.to_string()),
            extra: Map::new(),
        };
        (document, MergeOutcome::Created { added })
    };

    write_document(path, &document, mode)?;

    info!(
        path = %path.display(),
        outcome = ?outcome,
        "Wrote image details"
    );
    Ok(outcome)
}

/// Read and parse the results document; a blank file reads as an empty one
pub fn read_document(path: &Path) -> Result<ImageDetailsDocument, PollError> {
    let contents = fs::read_to_string(path).map_err(|e| PollError::io_at("read", path, e))?;
    if contents.trim().is_empty() {
        return Ok(ImageDetailsDocument::default());
    }
    serde_json::from_str(&contents).map_err(|e| PollError::io_at("parse", path, e))
}

fn write_document(
    path: &Path,
    document: &ImageDetailsDocument,
    mode: u32,
) -> Result<(), PollError> {
    let mut json = serde_json::to_vec_pretty(document)
        .map_err(|e| PollError::io_at("serialize document for", path, e))?;
    json.push(b'\n');

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if !parent.exists() {
            fs::create_dir_all(parent)
                .map_err(|e| PollError::io_at("create directory", parent, e))?;
        }
    }

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;

    let mut file = options
        .open(path)
        .map_err(|e| PollError::io_at("open", path, e))?;
    file.write_all(&json)
        .map_err(|e| PollError::io_at("write", path, e))?;

    Ok(())
}
