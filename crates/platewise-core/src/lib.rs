//! Platewise Core - Content-addressed analysis gateway for food images.
//!
//! Platewise sits between an application and several interchangeable AI
//! backends that turn a meal photo (or a text description of a meal) into
//! structured food and nutrition data. Identical inputs are answered from a
//! content-addressed cache; misses are routed to the highest-priority healthy
//! backend, failing over down the list when a backend errors.
//!
//! # Architecture
//!
//! ```text
//! Input → Hash → Cache ─hit→ Result
//!                  └miss→ Provider 1 → Provider 2 → … → Cache write → Result
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use platewise_core::{AnalysisInput, AnalysisRequest, Config, Gateway};
//!
//! #[tokio::main]
//! async fn main() -> platewise_core::Result<()> {
//!     let config = Config::load()?;
//!     let gateway = Gateway::from_config(&config).await?;
//!
//!     let input = AnalysisInput::from_image_path("./lunch.jpg".as_ref()).await?;
//!     let result = gateway.analyze(AnalysisRequest::new(input)).await?;
//!     println!("{} foods from {}", result.food_count(), result.provider);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod gateway;
pub mod hash;
pub mod health;
pub mod provider;
pub mod types;

// Re-exports for convenient access
pub use cache::{CacheEntry, CacheOptions, CacheStats, CleanupTask, ResultCache};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::Config;
pub use error::{
    CacheError, ConfigError, ErrorKind, GatewayError, ProviderError, ProviderOutcome,
    ProviderResult, Result,
};
pub use gateway::{Gateway, GatewayOptions, HealthMonitor, ProviderStatus};
pub use hash::ContentHasher;
pub use health::{HealthPolicy, HealthTracker, ProviderHealth};
pub use provider::{ProviderAdapter, ProviderFactory};
pub use types::{AnalysisInput, AnalysisRequest, AnalysisResult};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
