pub mod path;
pub mod store;

pub use store::{Catalog, EntryView, FsEntry, RenameOverrides, DEFAULT_ROOTS};
