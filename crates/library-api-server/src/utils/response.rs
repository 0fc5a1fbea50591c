use serde::Serialize;

/// Uniform JSON envelope: `success` plus either `error` or route fields.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize = Empty> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub data: T,
}

#[derive(Debug, Default, Serialize)]
pub struct Empty {}

impl Envelope {
    pub fn ok() -> Self {
        Self::with(Empty {})
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
            data: Empty {},
        }
    }
}

impl<T: Serialize> Envelope<T> {
    pub fn with(data: T) -> Self {
        Self {
            success: true,
            error: None,
            data,
        }
    }
}
