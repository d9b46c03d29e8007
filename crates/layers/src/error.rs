use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("layer config must be a JSON object")]
    ConfigNotObject,

    #[error("invalid layer config key `{key}`: {source}")]
    ConfigKey {
        key: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid record: {0}")]
    Record(#[from] serde_json::Error),
}
