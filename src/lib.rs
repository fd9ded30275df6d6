//! Reading and writing BDF measurement containers.
//!
//! A container holds one or more recording groups. Each group owns a set of
//! input channels, and every input records a sequence of blocks of raw
//! sample words. Blocks are streamed into a temporary file, summarized by
//! multi-resolution min/max envelopes, and published under the final file
//! name only when the container is closed successfully.
//!
//! The [`Container`] type is the entry point for both directions:
//!
//! ```no_run
//! use bdf_rs::Container;
//!
//! # fn main() -> Result<(), bdf_rs::BdfError> {
//! let mut c = Container::new();
//! c.load_file("run.bdf")?;
//! let mut volts = vec![0f64; 128];
//! c.get_data_d(0, 0, 0, 0, &mut volts)?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod attributes;
pub mod blocks;
pub mod envelope;
pub mod error;
pub mod handle;
pub mod index;
pub mod options;
pub mod parsing;
pub mod reader;
pub mod scaling;
pub mod types;
pub mod writer;

pub use api::Container;
pub use attributes::{AttributeStore, MAX_ATTRIBUTE_LEN};
pub use error::{BdfError, ErrorCode, Result};
pub use handle::{GroupHandle, StreamerHandle};
pub use index::{ByteRangeReader, ContainerIndex, FileRangeReader};
pub use options::WriterOptions;
pub use scaling::{SampleLayout, Scaling};
pub use types::{BlockInfo, DateTime, GroupSettings, InputHeader, InputInfo, OperationMode};
