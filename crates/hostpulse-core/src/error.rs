use thiserror::Error;

#[derive(Error, Debug)]
pub enum HostpulseError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Display sink disconnected")]
    SinkClosed,
}

pub type Result<T> = std::result::Result<T, HostpulseError>;
