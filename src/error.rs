use std::io;

use thiserror::Error;

use crate::subst::ExpandError;

/// Fatal setup errors. The binaries print these as a single
/// `<program>: <error>` line and exit 2.
#[derive(Debug, Error)]
pub enum FatalError {
    #[error("cannot open config {path}: {source}")]
    OpenConfig { path: String, source: io::Error },

    #[error("cannot open {path}: {source}")]
    OpenTest { path: String, source: io::Error },

    #[error("mkdir {path}: {source}")]
    CreateDir { path: String, source: io::Error },

    #[error(transparent)]
    Expand(#[from] ExpandError),
}
