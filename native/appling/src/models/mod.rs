mod install_config;
pub use install_config::*;
mod options;
pub use options::*;
mod transfer_status;
pub use transfer_status::*;
pub mod signals;
