//! Request handlers.

pub mod catalog;
pub mod credits;
pub mod health;
pub mod jobs;
pub mod payments;
pub mod upload;

pub use catalog::*;
pub use credits::*;
pub use health::*;
pub use jobs::*;
pub use payments::*;
pub use upload::*;
