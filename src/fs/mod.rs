pub mod filesystem;
pub mod handle;
pub mod inode;
pub mod invalidate;
pub mod reader;

pub use filesystem::DebridFs;
pub use handle::{HandleTable, OpenHandle, ReadBuffer};
pub use inode::{InodeTable, ROOT_INODE};
pub use invalidate::CacheInvalidator;
pub use reader::StreamingReader;
