//! The public container API: one object for writing and reading BDF files.

use std::path::{Path, PathBuf};

use tracing::error;

use crate::error::{BdfError, Result};
use crate::handle::{GroupHandle, StreamerHandle};
use crate::options::WriterOptions;
use crate::parsing::bdf_file::BdfFile;
use crate::parsing::directory::{BlockEntry, Directory, InputEntry};
use crate::parsing::source::{ByteSource, FileSource};
use crate::reader::BlockReader;
use crate::types::{BlockInfo, GroupSettings, InputHeader, InputInfo, OperationMode};
use crate::writer::FileWriter;

#[derive(Debug)]
enum State {
    Idle,
    /// Output configured, file not yet created.
    Pending { path: PathBuf, options: WriterOptions },
    Writing { writer: FileWriter, live: Option<FileSource> },
    Reading(BdfFile),
    Closed,
}

/// A BDF container opened for writing or reading.
///
/// Write operations address groups by [`GroupHandle`] and streams by
/// [`StreamerHandle`]. Read operations address groups, inputs and blocks by
/// their position in creation order.
///
/// # Example
/// ```no_run
/// use bdf_rs::{Container, GroupHandle, GroupSettings, InputHeader, OperationMode, WriterOptions};
///
/// # fn main() -> Result<(), bdf_rs::BdfError> {
/// let mut c = Container::with_output("run.bdf", WriterOptions::default())?;
/// let g = c.init_file_writer(&GroupSettings::new(0, OperationMode::Continuous, 1e6))?;
/// c.write_input_header(&InputHeader::new(0, 0, 10.0), g)?;
/// let s = c.init_input_streamer(0, 0, 0, g)?;
/// c.write_data(s, &[0u8; 200], g)?;
/// c.write_eor_info(0, 0, 200, 0, 0, g)?;
/// c.close_file(GroupHandle::DEFAULT)?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Container {
    state: State,
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl Container {
    /// A container with no file attached; use [`Container::load_file`] to read.
    pub fn new() -> Self {
        Container { state: State::Idle }
    }

    /// A container that writes to `path` once the first group is initialized.
    pub fn with_output(path: impl AsRef<Path>, options: WriterOptions) -> Result<Self> {
        options.validate()?;
        Ok(Container {
            state: State::Pending { path: path.as_ref().to_path_buf(), options },
        })
    }

    /// Open a finished container for reading.
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        match self.state {
            State::Idle | State::Closed => {
                self.state = State::Reading(BdfFile::parse_from_file(path)?);
                Ok(())
            }
            _ => Err(BdfError::InvalidArgument("container already has an open file".into())),
        }
    }

    /// Path of the temporary file while writing.
    pub fn temp_path(&self) -> Option<&Path> {
        match &self.state {
            State::Writing { writer, .. } => Some(writer.temp_path()),
            _ => None,
        }
    }

    fn writer_mut(&mut self) -> Result<&mut FileWriter> {
        match &mut self.state {
            State::Writing { writer, .. } => Ok(writer),
            _ => Err(BdfError::StaleHandle("container is not writing".into())),
        }
    }

    /// Begin a new group, creating the output file on first use.
    pub fn init_file_writer(&mut self, settings: &GroupSettings) -> Result<GroupHandle> {
        if let State::Pending { path, options } = &self.state {
            let writer = FileWriter::create(path, options.clone())?;
            self.state = State::Writing { writer, live: None };
        }
        match &mut self.state {
            State::Writing { writer, .. } => writer.init_group(settings),
            _ => Err(BdfError::InvalidArgument("container has no output configured".into())),
        }
    }

    /// Directory position of the group behind a write handle.
    pub fn group_index(&mut self, group: GroupHandle) -> Result<usize> {
        self.writer_mut()?.group_index(group)
    }

    /// Register or replace an input; returns its position in the group.
    pub fn write_input_header(&mut self, header: &InputHeader, group: GroupHandle) -> Result<usize> {
        self.writer_mut()?.write_input_header(header, group)
    }

    pub fn init_input_streamer(
        &mut self,
        board: u32,
        input: u32,
        block_nr: u32,
        group: GroupHandle,
    ) -> Result<StreamerHandle> {
        self.writer_mut()?.init_input_streamer(board, input, block_nr, group)
    }

    pub fn write_data(&mut self, streamer: StreamerHandle, data: &[u8], group: GroupHandle) -> Result<()> {
        self.writer_mut()?.write_data(streamer, data, group)
    }

    pub fn set_attribute(&mut self, input: usize, key: &str, value: &str, group: GroupHandle) -> Result<()> {
        self.writer_mut()?.set_attribute(input, key, value, group)
    }

    pub fn set_product_unit(&mut self, input: usize, x_unit: &str, y_unit: &str, group: GroupHandle) -> Result<()> {
        self.writer_mut()?.set_product_unit(input, x_unit, y_unit, group)
    }

    pub fn write_attributes(&mut self, group: GroupHandle) -> Result<()> {
        self.writer_mut()?.write_attributes(group)
    }

    /// Finalize a streaming block. Failures are also logged, since callers
    /// commonly treat end of record as fire-and-forget.
    pub fn write_eor_info(
        &mut self,
        block_nr: u32,
        trigger_time_ps: u64,
        data_count: u64,
        input: u32,
        board: u32,
        group: GroupHandle,
    ) -> Result<()> {
        let result = self
            .writer_mut()
            .and_then(|w| w.write_eor_info(block_nr, trigger_time_ps, data_count, input, board, group));
        if let Err(e) = &result {
            error!(board, input, block = block_nr, error = %e, "end of record failed");
        }
        result
    }

    /// Close one group, or every group for [`GroupHandle::DEFAULT`].
    ///
    /// The file is promoted to its final name once the last group is closed
    /// without error; otherwise the temporary file stays on disk.
    pub fn close_file(&mut self, group: GroupHandle) -> Result<()> {
        let result = self.close_inner(group);
        if let Err(e) = &result {
            error!(%group, error = %e, "close failed");
        }
        result
    }

    fn close_inner(&mut self, group: GroupHandle) -> Result<()> {
        match std::mem::replace(&mut self.state, State::Closed) {
            State::Writing { mut writer, live } => {
                if group.is_default() {
                    return writer.finish();
                }
                match writer.close_group(group) {
                    Ok(true) => writer.finish(),
                    Ok(false) => {
                        self.state = State::Writing { writer, live };
                        Ok(())
                    }
                    Err(e) => {
                        if writer.open_groups() > 0 {
                            self.state = State::Writing { writer, live };
                        }
                        Err(e)
                    }
                }
            }
            State::Reading(_) => Ok(()),
            other => {
                self.state = other;
                Err(BdfError::StaleHandle(format!("{} (container is not open)", group)))
            }
        }
    }

    /// Enable reads of already finalized blocks while writing.
    pub fn init_file_reader(&mut self) -> Result<()> {
        match &mut self.state {
            State::Writing { writer, live } => {
                if writer.directory().groups.iter().all(|g| g.inputs.is_empty()) {
                    return Err(BdfError::InvalidArgument(
                        "input headers must be written before reading".into(),
                    ));
                }
                if live.is_none() {
                    *live = Some(FileSource::open(writer.temp_path())?);
                }
                Ok(())
            }
            State::Reading(_) => Ok(()),
            _ => Err(BdfError::StaleHandle("container is not open".into())),
        }
    }

    fn view(&self) -> Result<(&Directory, &dyn ByteSource)> {
        match &self.state {
            State::Reading(file) => Ok((&file.directory, &file.mmap as &dyn ByteSource)),
            State::Writing { writer, live: Some(source) } => Ok((writer.directory(), source as &dyn ByteSource)),
            State::Writing { live: None, .. } => {
                Err(BdfError::InvalidArgument("init_file_reader was not called".into()))
            }
            _ => Err(BdfError::StaleHandle("container is not open".into())),
        }
    }

    fn directory(&self) -> Result<&Directory> {
        self.view().map(|(d, _)| d)
    }

    fn input_entry(&self, group: usize, input: usize) -> Result<&InputEntry> {
        self.directory()?.input(group, input)
    }

    fn with_reader<T>(
        &self,
        group: usize,
        input: usize,
        block: usize,
        f: impl FnOnce(&BlockReader<'_>) -> Result<T>,
    ) -> Result<T> {
        let (dir, source) = self.view()?;
        let entry = dir.input(group, input)?;
        let block: &BlockEntry = dir.block(group, input, block)?;
        f(&BlockReader::new(&entry.info, block, source))
    }

    pub fn get_attribute(&self, group: usize, input: usize, key: &str) -> Result<String> {
        self.input_entry(group, input)?
            .attributes
            .get(key)
            .map(str::to_string)
            .ok_or_else(|| BdfError::InvalidArgument(format!("no attribute {:?}", key)))
    }

    pub fn number_of_groups(&self) -> Result<usize> {
        Ok(self.directory()?.groups.len())
    }

    pub fn number_of_inputs(&self, group: usize) -> Result<usize> {
        Ok(self.directory()?.group(group)?.inputs.len())
    }

    pub fn number_of_blocks(&self, group: usize, input: usize) -> Result<usize> {
        Ok(self.input_entry(group, input)?.blocks.len())
    }

    pub fn input_info(&self, group: usize, input: usize) -> Result<InputInfo> {
        Ok(self.input_entry(group, input)?.info)
    }

    pub fn block_info(&self, group: usize, input: usize, block: usize) -> Result<BlockInfo> {
        Ok(self.directory()?.block(group, input, block)?.info)
    }

    pub fn operation_mode(&self, group: usize) -> Result<OperationMode> {
        Ok(self.directory()?.group(group)?.mode)
    }

    pub fn get_raw_data_s(&self, group: usize, input: usize, block: usize, address: u64, out: &mut [i16]) -> Result<()> {
        self.with_reader(group, input, block, |r| r.raw_s(address, out))
    }

    pub fn get_raw_data_l(&self, group: usize, input: usize, block: usize, address: u64, out: &mut [i32]) -> Result<()> {
        self.with_reader(group, input, block, |r| r.raw_l(address, out))
    }

    pub fn get_data_f(&self, group: usize, input: usize, block: usize, address: u64, out: &mut [f32]) -> Result<()> {
        self.with_reader(group, input, block, |r| r.data_f(address, out))
    }

    pub fn get_data_d(&self, group: usize, input: usize, block: usize, address: u64, out: &mut [f64]) -> Result<()> {
        self.with_reader(group, input, block, |r| r.data_d(address, out))
    }

    pub fn get_marker_data(&self, group: usize, input: usize, block: usize, address: u64, out: &mut [u32]) -> Result<()> {
        self.with_reader(group, input, block, |r| r.markers(address, out))
    }

    /// `out.len() / 2` min/max pairs over `block_size` samples from `address`.
    pub fn get_env_raw_data_s(
        &self,
        group: usize,
        input: usize,
        block: usize,
        address: u64,
        block_size: u64,
        out: &mut [i16],
    ) -> Result<()> {
        self.with_reader(group, input, block, |r| r.env_raw_s(address, block_size, out))
    }

    pub fn get_env_raw_data_l(
        &self,
        group: usize,
        input: usize,
        block: usize,
        address: u64,
        block_size: u64,
        out: &mut [i32],
    ) -> Result<()> {
        self.with_reader(group, input, block, |r| r.env_raw_l(address, block_size, out))
    }

    pub fn get_env_data_f(
        &self,
        group: usize,
        input: usize,
        block: usize,
        address: u64,
        block_size: u64,
        out: &mut [f32],
    ) -> Result<()> {
        self.with_reader(group, input, block, |r| r.env_f(address, block_size, out))
    }

    pub fn get_env_data_d(
        &self,
        group: usize,
        input: usize,
        block: usize,
        address: u64,
        block_size: u64,
        out: &mut [f64],
    ) -> Result<()> {
        self.with_reader(group, input, block, |r| r.env_d(address, block_size, out))
    }

    /// The parsed file of a container opened with [`Container::load_file`].
    pub fn loaded_file(&self) -> Option<&BdfFile> {
        match &self.state {
            State::Reading(file) => Some(file),
            _ => None,
        }
    }
}
