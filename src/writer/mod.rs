//! Container writer.
//!
//! Raw sample bytes are appended to a temporary file as `##DT` fragments
//! while blocks stream in. Finalizing a block writes its data list and
//! envelope and records it in the in-memory [`Directory`]; closing the last
//! group writes the directory blocks, marks the header finalized and renames
//! the temporary file to its final name.

use std::path::{Path, PathBuf};

use tracing::{error, info};

use crate::attributes::AttributeStore;
use crate::blocks::attribute_block::AttributeBlock;
use crate::blocks::header_block::HeaderBlock;
use crate::blocks::identification_block::IdentificationBlock;
use crate::error::{BdfError, ErrorCode, Result};
use crate::handle::{Arena, GroupHandle, StreamerHandle};
use crate::options::WriterOptions;
use crate::parsing::directory::{Directory, GroupEntry, InputEntry};
use crate::types::{GroupSettings, InputHeader, InputInfo};

mod close;
mod data;
mod io;

use data::OpenStream;
use io::BlockSink;

/// Write state of one input of an open group.
#[derive(Debug, Default)]
struct InputState {
    next_block: u32,
    /// A stream was opened at least once; the header is frozen from then on.
    streamed: bool,
    open_stream: Option<StreamerHandle>,
}

#[derive(Debug)]
struct GroupState {
    /// Position of the group in the directory.
    index: usize,
    inputs: Vec<InputState>,
    attributes_sealed: bool,
}

#[derive(Debug)]
pub struct FileWriter {
    sink: BlockSink,
    temp_path: PathBuf,
    final_path: PathBuf,
    options: WriterOptions,
    header_pos: u64,
    groups: Arena<GroupHandle, GroupState>,
    streams: Arena<StreamerHandle, OpenStream>,
    directory: Directory,
    fault: Option<String>,
}

impl FileWriter {
    /// Temporary name used while a container at `path` is being written.
    pub fn temp_path_for(path: &Path) -> PathBuf {
        path.with_extension("tmp")
    }

    /// Create the temporary file and write the identification and header blocks.
    pub fn create(path: impl AsRef<Path>, options: WriterOptions) -> Result<Self> {
        options.validate()?;
        let final_path = path.as_ref().to_path_buf();
        let temp_path = Self::temp_path_for(&final_path);
        let mut sink = BlockSink::create(&temp_path)?;
        sink.write_block(&IdentificationBlock::default().to_bytes()?)?;
        let header_pos = sink.write_block(&HeaderBlock::default().to_bytes()?)?;
        info!(path = %temp_path.display(), "created container");
        Ok(FileWriter {
            sink,
            temp_path,
            final_path,
            options,
            header_pos,
            groups: Arena::new(),
            streams: Arena::new(),
            directory: Directory::default(),
            fault: None,
        })
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    pub fn final_path(&self) -> &Path {
        &self.final_path
    }

    /// Finalized part of the container, as visible to readers.
    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    pub fn is_faulted(&self) -> bool {
        self.fault.is_some()
    }

    pub fn open_groups(&self) -> usize {
        self.groups.len()
    }

    fn check_fault(&self) -> Result<()> {
        match &self.fault {
            Some(reason) => Err(BdfError::Faulted(reason.clone())),
            None => Ok(()),
        }
    }

    /// Latch the writer on storage failures; later writes fail with `Faulted`.
    fn latch<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.code() == ErrorCode::Resource && self.fault.is_none() {
                error!(path = %self.temp_path.display(), error = %e, "container write failed");
                self.fault = Some(e.to_string());
            }
        }
        result
    }

    /// Map `DEFAULT` to the oldest open group and check that the handle is live.
    pub fn resolve_group(&self, handle: GroupHandle) -> Result<GroupHandle> {
        if handle.is_default() {
            return self
                .groups
                .iter()
                .min_by_key(|(_, g)| g.index)
                .map(|(key, _)| key)
                .ok_or_else(|| BdfError::StaleHandle("no open group".into()));
        }
        if self.groups.contains(handle) {
            Ok(handle)
        } else {
            Err(BdfError::StaleHandle(handle.to_string()))
        }
    }

    fn group_state(&self, handle: GroupHandle) -> Result<&GroupState> {
        self.groups
            .get(handle)
            .ok_or_else(|| BdfError::StaleHandle(handle.to_string()))
    }

    fn group_state_mut(&mut self, handle: GroupHandle) -> Result<&mut GroupState> {
        self.groups
            .get_mut(handle)
            .ok_or_else(|| BdfError::StaleHandle(handle.to_string()))
    }

    /// Directory position of an open group.
    pub fn group_index(&self, handle: GroupHandle) -> Result<usize> {
        let handle = self.resolve_group(handle)?;
        Ok(self.group_state(handle)?.index)
    }

    /// Open a new group and return its handle.
    pub fn init_group(&mut self, settings: &GroupSettings) -> Result<GroupHandle> {
        self.check_fault()?;
        if !settings.sample_rate.is_finite() || settings.sample_rate <= 0.0 {
            return Err(BdfError::InvalidArgument(format!(
                "sample rate must be positive, got {}",
                settings.sample_rate
            )));
        }
        if settings.timebase_divisor == 0 {
            return Err(BdfError::InvalidArgument("timebase divisor must be at least 1".into()));
        }
        if self.directory.groups.iter().any(|g| g.number == settings.group) {
            return Err(BdfError::InvalidArgument(format!(
                "group {} already exists",
                settings.group
            )));
        }
        let index = self.directory.groups.len();
        self.directory.groups.push(GroupEntry {
            number: settings.group,
            mode: settings.mode,
            sample_rate: settings.sample_rate,
            timebase_divisor: settings.timebase_divisor,
            trigger_sample: settings.trigger_sample,
            start_time: settings.start_time,
            inputs: Vec::new(),
        });
        let handle = self.groups.insert(GroupState {
            index,
            inputs: Vec::new(),
            attributes_sealed: false,
        });
        info!(
            group = settings.group,
            mode = ?settings.mode,
            sample_rate = settings.sample_rate,
            %handle,
            "opened group"
        );
        Ok(handle)
    }

    /// Register an input, or replace its description while no stream was opened for it.
    pub fn write_input_header(&mut self, header: &InputHeader, group: GroupHandle) -> Result<usize> {
        self.check_fault()?;
        let group = self.resolve_group(group)?;
        let info = InputInfo::from_header(header)?;
        let index = self.group_state(group)?.index;
        match self.directory.groups[index].find_input(header.board, header.input) {
            Some(pos) => {
                let state = &self.group_state(group)?.inputs[pos];
                if state.streamed || state.open_stream.is_some() {
                    return Err(BdfError::InvalidArgument(format!(
                        "input {}/{} already has data",
                        header.board, header.input
                    )));
                }
                self.directory.groups[index].inputs[pos].info = info;
                Ok(pos)
            }
            None => {
                let mut input = InputEntry::new(info);
                let sealed = self.group_state(group)?.attributes_sealed;
                if sealed {
                    input.attributes.seal();
                }
                self.directory.groups[index].inputs.push(input);
                let state = self.group_state_mut(group)?;
                state.inputs.push(InputState::default());
                Ok(state.inputs.len() - 1)
            }
        }
    }

    fn attributes_mut(&mut self, input: usize, group: GroupHandle) -> Result<&mut AttributeStore> {
        let group = self.resolve_group(group)?;
        let index = self.group_state(group)?.index;
        let entry = &mut self.directory.groups[index];
        let available = entry.inputs.len() as u64;
        entry
            .inputs
            .get_mut(input)
            .map(|i| &mut i.attributes)
            .ok_or(BdfError::OutOfRange { what: "input index", requested: input as u64, available })
    }

    pub fn set_attribute(&mut self, input: usize, key: &str, value: &str, group: GroupHandle) -> Result<()> {
        self.check_fault()?;
        self.attributes_mut(input, group)?.set(key, value)
    }

    /// Record `x*y` as the physical unit of a product channel.
    pub fn set_product_unit(&mut self, input: usize, x_unit: &str, y_unit: &str, group: GroupHandle) -> Result<()> {
        self.check_fault()?;
        self.attributes_mut(input, group)?.set_product_unit(x_unit, y_unit)
    }

    /// Write the attribute blocks of every input of `group` and seal them.
    pub fn write_attributes(&mut self, group: GroupHandle) -> Result<()> {
        self.check_fault()?;
        let group = self.resolve_group(group)?;
        if self.group_state(group)?.attributes_sealed {
            return Err(BdfError::AttributesSealed(group.to_string()));
        }
        let result = self.flush_attributes(group);
        self.latch(result)
    }

    fn flush_attributes(&mut self, group: GroupHandle) -> Result<()> {
        let index = self.group_state(group)?.index;
        for pos in 0..self.directory.groups[index].inputs.len() {
            let input = &self.directory.groups[index].inputs[pos];
            if input.attributes.is_sealed() {
                continue;
            }
            let addr = if input.attributes.is_empty() {
                0
            } else {
                let block = AttributeBlock::new(input.attributes.entries().to_vec());
                self.sink.write_block(&block.to_bytes()?)?
            };
            let input = &mut self.directory.groups[index].inputs[pos];
            input.attributes_addr = addr;
            input.attributes.seal();
        }
        self.group_state_mut(group)?.attributes_sealed = true;
        Ok(())
    }
}
