use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DemosaicError, Result};

/// Output file naming for batch runs.
///
/// The output name is `prefix + stem + postfix + extension`, placed in
/// `directory` or next to the source. The default postfix keeps the
/// output from colliding with the source file.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputNaming {
    /// Output directory; `None` writes next to the source file.
    pub directory: Option<PathBuf>,
    pub prefix: String,
    pub postfix: String,
    /// Output extension without the dot; `None` keeps the source
    /// extension.
    pub extension: Option<String>,
    /// Replace existing files instead of uniquifying the name.
    pub overwrite: bool,
}

impl Default for OutputNaming {
    fn default() -> Self {
        Self {
            directory: None,
            prefix: String::new(),
            postfix: "_d".to_owned(),
            extension: None,
            overwrite: false,
        }
    }
}

impl OutputNaming {
    /// Output path for a source file, before existing-file handling.
    pub fn output_path(&self, source: &Path) -> PathBuf {
        let stem = source
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("output");
        let extension = match &self.extension {
            Some(e) => e.trim_start_matches('.').to_owned(),
            None => source
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("tif")
                .to_owned(),
        };
        let name = format!("{}{}{}.{}", self.prefix, stem, self.postfix, extension);
        match &self.directory {
            Some(dir) => dir.join(name),
            None => source.with_file_name(name),
        }
    }

    /// Final output path: the overwrite flag decides whether an
    /// existing file is replaced or the name is uniquified.
    pub fn resolve(&self, source: &Path) -> PathBuf {
        let path = self.output_path(source);
        if self.overwrite {
            path
        } else {
            unique_path(path)
        }
    }
}

/// Append `_1`, `_2`, ... to the file stem until the name is unused.
pub fn unique_path(path: PathBuf) -> PathBuf {
    if !path.exists() {
        return path;
    }
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output")
        .to_owned();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_owned);
    for n in 1.. {
        let name = match &extension {
            Some(ext) => format!("{stem}_{n}.{ext}"),
            None => format!("{stem}_{n}"),
        };
        let candidate = path.with_file_name(name);
        if !candidate.exists() {
            return candidate;
        }
    }
    unreachable!()
}

/// Reject batches that would write the same file twice. Only relevant
/// with overwrite enabled; without it the names are uniquified anyway.
///
/// The comparison is case-insensitive so batches stay portable across
/// filesystems.
pub fn check_duplicate_outputs(paths: &[PathBuf]) -> Result<()> {
    let mut seen: HashMap<String, &PathBuf> = HashMap::new();
    for path in paths {
        let key = path.to_string_lossy().to_lowercase();
        if let Some(first) = seen.insert(key, path) {
            return Err(DemosaicError::InvalidConfig(format!(
                "duplicate output file name: {} and {}",
                first.display(),
                path.display()
            )));
        }
    }
    Ok(())
}
