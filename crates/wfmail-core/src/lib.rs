pub mod artifact;
pub mod config;
pub mod error;
pub mod io;
pub mod maildir;
pub mod message;
pub mod notify;
pub mod panel;
pub mod paths;
pub mod search;
pub mod template;
pub mod thread;
pub mod types;
pub mod wire;

pub use error::{Result, WfmailError};
