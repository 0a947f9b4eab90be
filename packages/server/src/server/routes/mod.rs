// HTTP routes
pub mod commands;
pub mod health;
pub mod stream;

pub use commands::*;
pub use health::*;
pub use stream::*;
