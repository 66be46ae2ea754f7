//! Autologin core library.
//!
//! Drives an OAuth sign-in into a cloud console through GitHub, including
//! the human-in-the-loop challenges GitHub may raise along the way:
//! - device approval by email link or app
//! - second factor via GitHub Mobile push
//! - second factor via a one-time code relayed over Telegram (`/code 123456`)
//!
//! After a successful login the fresh GitHub session cookie is written back to
//! the repository's Actions secrets, or relayed to the operator when that is
//! not possible. The browser itself is abstracted by
//! [`autologin_browser::BrowserPage`].

pub mod channel;
pub mod config;
pub mod credential;
pub mod error;
pub mod login;
#[cfg(any(test, feature = "test-utils"))]
pub mod testkit;

pub use channel::{OperatorCode, Relay, UpdateCursor};
pub use config::{Credentials, LoginConfig, RelayConfig, SecretStoreConfig, TargetSite, WaitSettings};
pub use credential::{CredentialStore, PersistOutcome};
pub use error::{LoginError, Result};
pub use login::{RunOutcome, Stage, run_login};
