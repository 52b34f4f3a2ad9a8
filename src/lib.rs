//! Client-side session tracking with single-flight access-token refresh.
//!
//! ARCHITECTURE
//! ============
//! `SessionFacade` is the entry point for application code. Every HTTP call
//! it makes goes through `RequestPipeline`, which attaches the stored
//! credential and hands 401 responses for protected paths to
//! `RefreshCoordinator`. The coordinator collapses any number of concurrent
//! failures into one refresh call, then settles every waiting caller with the
//! same outcome.
//!
//! There is no global instance. Build a facade per session and share it by
//! `Arc` when many tasks issue requests concurrently.

pub mod config;
pub mod coordinator;
pub mod credentials;
pub mod error;
pub mod facade;
pub mod paths;
pub mod pipeline;
pub mod state;
pub mod transport;

pub use config::{AuthEndpoints, SessionConfig, Timeouts};
pub use coordinator::{Phase, RefreshCoordinator, Replay};
pub use credentials::{AccessToken, CredentialStore};
pub use error::{ErrorCode, SessionError};
pub use facade::{LoginRequest, LoginResponse, SessionFacade};
pub use paths::PublicPathMatcher;
pub use pipeline::RequestPipeline;
pub use state::{SessionSnapshot, SessionState, UserRecord};
pub use transport::{ApiRequest, ApiResponse, HttpTransport, Transport};
