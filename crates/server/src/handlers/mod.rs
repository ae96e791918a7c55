//! HTTP request handlers.

pub mod downloads;
pub mod files;
pub mod health;
pub mod status;
pub mod uploads;

pub use downloads::*;
pub use files::*;
pub use health::*;
pub use status::*;
pub use uploads::*;
