use thiserror::Error;

use crate::types::Rendition;

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Remote item not found: {0}")]
    NotFound(String),
    #[error("Rendition {rendition} not available for {name}")]
    MissingRendition { name: String, rendition: Rendition },
    #[error("{0} is not a container")]
    NotAContainer(String),
    #[error("API response error: {0}")]
    Api(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RemoteError {
    /// Map an I/O error on a named remote object, keeping `NotFound` distinct.
    pub fn from_io(name: &str, e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::NotFound {
            RemoteError::NotFound(name.to_string())
        } else {
            RemoteError::Io(e)
        }
    }
}
