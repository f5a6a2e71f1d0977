pub mod client;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod params;
pub mod payload;
pub mod reduce;
pub mod target;
pub mod timestamp;

pub use client::{ApiRequest, HttpApiClient};
pub use config::Settings;
pub use context::Context;
pub use dispatch::{preview, DispatchOptions, Dispatcher, PreparedRequest};
pub use error::{CancelledError, DispatchError};
pub use params::{AdditionalFields, Fields, JsonParameters, ParameterSource};
pub use payload::Payload;
pub use target::{Operation, Resource, Target};
