//! Request layer for the scheduling board.
//!
//! Board reads and operation writes go through a [`ScheduleSource`]. The HTTP
//! implementation walks a list of candidate endpoints per call; the in-memory
//! one backs demos and tests. Credentials and tenant are supplied per call by
//! a [`CredentialSource`].
//!
//! # Usage
//!
//! ```ignore
//! use mfgsuite_client::{CredentialSource, HttpSource, ScheduleSource, StaticCredentials};
//!
//! let creds = StaticCredentials::new(RequestContext::anonymous().with_token(jwt).with_tenant("acme"));
//! let src = HttpSource::new("https://erp.example.com")?;
//! let board = src.get_board(&creds.context().await?, "default").await?;
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod http;
pub mod memory;
pub mod source;

pub use auth::{
    CredentialSource, LoginResponse, NoCredentials, PasswordLogin, RequestContext, Roles,
    StaticCredentials,
};
pub use config::{ClientConfig, ConfigError, Context};
pub use error::ApiError;
pub use http::{HttpSource, TENANT_HEADER, live_url};
pub use memory::{DEMO_BOARD_ID, MemorySource};
pub use source::{ScheduleSource, UpdateOperationRequest};
