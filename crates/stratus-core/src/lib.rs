pub mod config;
pub mod logging;

pub mod cancel;
pub mod checksum;
pub mod command;
pub mod context;
pub mod credentials;
pub mod error;
pub mod executor;
pub mod location;
pub mod options;
pub mod request;
pub mod response;
pub mod result;
pub mod retry;
pub mod transport;

pub use command::{BodyTarget, ResponseContent, StorageCommand};
pub use context::OperationContext;
pub use error::{ErrorKind, StorageError};
pub use executor::Executor;
pub use location::{LocationMode, StorageLocation, StorageUri};
pub use options::RequestOptions;
