pub type GuildID = String;
pub type RoleID = String;
pub type UserID = String;
/// Primary key of a profile in the external database.
pub type ProfileID = i64;
/// Primary key of a role in the external database.
pub type ExternalRoleID = i64;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("transient failure: {0}")]
    Transient(String),
    #[error("rejected: {0}")]
    Unauthorized(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid setting {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
    #[error("cannot read reference file {path}: {reason}")]
    ReferenceFile { path: String, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("{0} not found")]
    NotFound(String),
    #[error("transient failure: {0}")]
    Transient(String),
    #[error("output failed: {0}")]
    Io(#[from] std::io::Error),
}

impl From<SourceError> for ExportError {
    fn from(e: SourceError) -> Self {
        match e {
            SourceError::NotFound(what) => ExportError::NotFound(what),
            SourceError::Transient(reason) => ExportError::Transient(reason),
            SourceError::Unauthorized(reason) => ExportError::Config(ConfigError::Invalid {
                name: "token",
                reason,
            }),
        }
    }
}

impl ExportError {
    /// Errors that end the whole run rather than a single role or user.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ExportError::Config(_))
    }
}
