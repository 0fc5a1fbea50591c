pub mod middleware;
pub mod password;

pub use middleware::{request_gate, CurrentSession, Gate};
pub use password::PasswordService;
