pub mod config;
pub mod error;
pub mod keyfile;

pub use config::CbxConfig;
pub use error::{CbxError, CbxResult};
