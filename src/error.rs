use std::fmt;

#[derive(Debug)]
pub enum ResourceError {
    /// A font program could not be used; carries the family and where it came from.
    Font {
        family: String,
        source: String,
        message: String,
    },
    UnknownFont {
        family: String,
        weight: u16,
        italic: bool,
    },
    UnknownResource(String),
    UnrenderedResource(String),
    Image {
        source: String,
        message: String,
    },
    InvalidConfiguration(String),
    Io(std::io::Error),
}

impl ResourceError {
    pub(crate) fn font(
        family: impl Into<String>,
        source: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        ResourceError::Font {
            family: family.into(),
            source: source.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceError::Font {
                family,
                source,
                message,
            } => write!(f, "font '{}' ({}) cannot be used: {}", family, source, message),
            ResourceError::UnknownFont {
                family,
                weight,
                italic,
            } => write!(
                f,
                "no font matches family '{}' weight {}{}",
                family,
                weight,
                if *italic { " italic" } else { "" }
            ),
            ResourceError::UnknownResource(key) => write!(f, "unknown resource: {}", key),
            ResourceError::UnrenderedResource(key) => {
                write!(f, "resource referenced before it was rendered: {}", key)
            }
            ResourceError::Image { source, message } => {
                write!(f, "image '{}' cannot be used: {}", source, message)
            }
            ResourceError::InvalidConfiguration(message) => {
                write!(f, "invalid configuration: {}", message)
            }
            ResourceError::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for ResourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ResourceError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ResourceError {
    fn from(value: std::io::Error) -> Self {
        ResourceError::Io(value)
    }
}
