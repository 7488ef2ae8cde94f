pub mod cipher;
pub mod config;
pub mod error;
pub mod extractors;
pub(crate) mod http;
pub mod keys;
pub mod resolver;
pub mod selector;

pub use error::{Error, KeyRole};
