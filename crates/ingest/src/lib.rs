pub mod driver;
pub mod error;
pub mod handler;
pub mod mqtt;
pub mod normalizer;
pub mod values;

pub use driver::IngestionDriver;
pub use error::IngestError;
pub use handler::MessageHandler;
pub use mqtt::MqttListener;
pub use normalizer::{normalize, NormalizeFn};
