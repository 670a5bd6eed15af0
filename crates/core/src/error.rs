use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid regular expression for {field}: {source}")]
    Regex {
        field: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid gitlab url '{0}'")]
    Url(String),

    #[error("{0}")]
    Invalid(String),
}
