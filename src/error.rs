#[derive(thiserror::Error, Debug)]
pub enum ProbeError {
    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("no IP source returned a usable address (tried {tried})")]
    NoPublicIp { tried: usize },

    #[error("invalid url `{0}`")]
    InvalidUrl(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(Box<figment::Error>),
}
