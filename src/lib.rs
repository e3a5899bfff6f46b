pub type Result<T> = std::result::Result<T, Error>;

pub mod addr;
pub mod config;
mod error;
pub mod logger;
pub mod server;
pub mod session;
pub mod socks;
pub mod tunnel;
pub mod upstream;

pub use error::Error;
