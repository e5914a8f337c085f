pub mod campaign;
pub mod config;
pub mod error;
pub mod event;
pub mod sink;

pub use campaign::*;
pub use config::Config;
pub use error::*;
pub use event::*;
pub use sink::TelemetrySink;
