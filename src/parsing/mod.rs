pub mod bdf_file;
pub mod directory;
pub mod source;

pub use bdf_file::BdfFile;
pub use directory::{BlockEntry, Directory, Fragment, GroupEntry, InputEntry};
pub use source::{ByteSource, FileSource};
