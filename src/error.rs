use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotionError {
    #[error("request to notion failed")]
    Request(#[from] reqwest::Error),
    #[error("notion api returned {status} ({code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to access sync cache {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("sync cache {path} is not valid json")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("remote service error while syncing {title}")]
    Remote {
        title: String,
        #[source]
        source: NotionError,
    },
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("highlight {index} of {title} does not fit in a single request")]
    OversizedHighlight { title: String, index: usize },
}

impl SyncError {
    pub fn remote(title: &str) -> impl FnOnce(NotionError) -> SyncError + '_ {
        move |source| SyncError::Remote {
            title: title.to_string(),
            source,
        }
    }
}
