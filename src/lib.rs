pub mod config;
pub mod error;
pub mod generator;
pub mod logger;
pub mod models;
pub mod prompt;
pub mod retry;
pub mod transport;

pub use config::{GeneratorConfig, RetryConfig};
pub use error::{FailureKind, GenerationError, ProviderFailure, Result, UserHint};
pub use generator::{AlbumEntry, DecadeGenerator};
pub use models::{GeneratedImage, GenerationRequest, ImagePayload};
pub use retry::{RetryPolicy, Sleeper, TokioSleeper};
pub use transport::{HttpTransport, Transport};
