//! coursechain-service: client service for the course market contract.
//!
//! [`CourseService`] turns intents ("create a course", "list page 2") into
//! signed transactions and `eth_call`s, waits for inclusion, decodes events,
//! and runs live event subscriptions.
//!
//! # Quick start
//!
//! ```no_run
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use coursechain_service::{CourseService, ServiceConfig};
//!
//! let config = ServiceConfig::from_env()?;
//! let service = CourseService::connect(config).await?;
//!
//! let outcome = service.create_course("Intro", "desc", "0.1").await;
//! if let Some(id) = outcome.course_id {
//!     println!("{:?}", service.course(id).await?);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod lifecycle;
pub mod pagination;
pub mod queries;
pub mod service;
pub mod signer;
pub mod subscriptions;

pub use config::{ConfigError, ServiceConfig};
pub use queries::CourseReader;
pub use service::CourseService;
pub use signer::{LocalSigner, TransactionSigner, UnsignedTx};
pub use subscriptions::{LogSource, LogStream, PollingLogSource, SubscriptionHandle, WsLogSource};
