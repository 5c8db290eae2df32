use std::path::PathBuf;

use thiserror::Error;

/// Failures the report pipeline distinguishes when deciding how far an error
/// propagates: a malformed index aborts the run, everything else aborts one case.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("unexpected document format in {source_name}: {detail}")]
    Format { source_name: String, detail: String },

    #[error("missing resource: {}", path.display())]
    MissingResource { path: PathBuf },

    #[error("external service error for {target}: {detail}")]
    ExternalService { target: String, detail: String },

    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ReportError {
    pub fn format(source_name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Format {
            source_name: source_name.into(),
            detail: detail.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Reads a file, mapping `NotFound` to `MissingResource`.
    pub fn read_to_string(path: &std::path::Path) -> Result<String, Self> {
        std::fs::read_to_string(path).map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                Self::MissingResource {
                    path: path.to_path_buf(),
                }
            } else {
                Self::io(path, err)
            }
        })
    }
}
