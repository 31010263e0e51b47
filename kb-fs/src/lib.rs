pub mod error;
pub mod lock;
pub mod ops;
pub mod path;
pub mod temp;

pub use error::FsError;
pub use lock::FileLock;
pub use temp::{TemporaryDirectory, TemporaryFile};
