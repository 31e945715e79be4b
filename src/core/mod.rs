pub mod authentication;
pub mod authorization;
pub mod client_registry;
pub mod error;
pub mod filters;
pub mod identity;
pub mod models;
pub mod movie;
pub mod token;
pub mod validator;
pub mod versioning;

pub use authorization::{Gate, Permissions};
pub use client_registry::{Admission, ClientRegistry, LimiterPolicy};
pub use error::{AppError, AppResult, StoreError};
pub use identity::{Identity, User};
pub use models::Models;
