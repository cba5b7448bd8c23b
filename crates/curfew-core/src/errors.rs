/// Core error type for the moderation engine.
///
/// Adapter crates map their transport/storage failures into this type so command
/// handlers can render a consistent user-facing reply.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("permission denied: {0}")]
    Permission(String),

    #[error("wrong chat: {0}")]
    WrongChat(String),

    #[error("group is not configured for moderation")]
    NotConfigured,

    #[error("store error: {0}")]
    Store(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Text shown to the user who issued the failing command.
    pub fn user_message(&self) -> String {
        match self {
            Error::Validation(msg) | Error::Permission(msg) | Error::WrongChat(msg) => {
                msg.clone()
            }
            Error::NotConfigured => {
                "This group is not configured for moderation. Run /moderate first.".to_string()
            }
            Error::Store(_) | Error::Io(_) | Error::Json(_) => {
                "Failed to update the settings, please try again later.".to_string()
            }
            Error::Transport(_) | Error::Config(_) => {
                "Something went wrong, please try again later.".to_string()
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
