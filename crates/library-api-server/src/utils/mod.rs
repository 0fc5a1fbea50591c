pub mod error;
pub mod response;

pub use error::ApiError;
pub use response::Envelope;
