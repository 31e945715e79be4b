pub mod mailer;
pub mod store;

pub use mailer::{Mailer, MailerError};
pub use store::{MovieQuery, MovieStore, PermissionStore, StoreResult, TokenStore, UserStore};
