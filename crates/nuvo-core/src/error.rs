//! Error types shared across the resolution layers.
//!
//! Each layer owns its own error enum; this module collects them in one place
//! together with the [`Cancelled`] marker used by the provider pipeline.

use thiserror::Error;

pub use crate::http::{FetchError, FetchFailure, TransportError};
pub use crate::registration::RegistrationError;
pub use crate::resource::ProviderError;
pub use crate::service_index::ServiceIndexError;
pub use crate::version::VersionError;

/// The caller's cancellation token fired before the operation completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation cancelled")]
pub struct Cancelled;
