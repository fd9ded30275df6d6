//! Generational handles for groups and streams.
//!
//! A handle is a `(slot, generation)` pair. Releasing a slot bumps its
//! generation, so an old handle never resolves to a newer occupant.

use std::fmt;

use serde::{Deserialize, Serialize};

pub trait ArenaKey: Copy {
    fn from_parts(slot: u32, generation: u32) -> Self;
    fn slot(&self) -> u32;
    fn generation(&self) -> u32;
}

/// Handle of a writable group, returned by `init_file_writer`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupHandle {
    slot: u32,
    generation: u32,
}

impl GroupHandle {
    /// The implicit group: the oldest open group, or every group for `close_file`.
    pub const DEFAULT: GroupHandle = GroupHandle { slot: u32::MAX, generation: u32::MAX };

    pub fn is_default(&self) -> bool {
        *self == Self::DEFAULT
    }
}

impl Default for GroupHandle {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Debug for GroupHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_default() {
            write!(f, "GroupHandle(default)")
        } else {
            write!(f, "GroupHandle({}v{})", self.slot, self.generation)
        }
    }
}

impl fmt::Display for GroupHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl ArenaKey for GroupHandle {
    fn from_parts(slot: u32, generation: u32) -> Self {
        GroupHandle { slot, generation }
    }
    fn slot(&self) -> u32 {
        self.slot
    }
    fn generation(&self) -> u32 {
        self.generation
    }
}

/// Handle of a stream writer, returned by `init_input_streamer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamerHandle {
    slot: u32,
    generation: u32,
}

impl fmt::Display for StreamerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StreamerHandle({}v{})", self.slot, self.generation)
    }
}

impl ArenaKey for StreamerHandle {
    fn from_parts(slot: u32, generation: u32) -> Self {
        StreamerHandle { slot, generation }
    }
    fn slot(&self) -> u32 {
        self.slot
    }
    fn generation(&self) -> u32 {
        self.generation
    }
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Slot storage with O(1) stale handle detection.
#[derive(Debug)]
pub struct Arena<K, T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    _key: std::marker::PhantomData<K>,
}

impl<K: ArenaKey, T> Default for Arena<K, T> {
    fn default() -> Self {
        Arena { slots: Vec::new(), free: Vec::new(), _key: std::marker::PhantomData }
    }
}

impl<K: ArenaKey, T> Arena<K, T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, value: T) -> K {
        if let Some(slot) = self.free.pop() {
            let entry = &mut self.slots[slot as usize];
            entry.value = Some(value);
            return K::from_parts(slot, entry.generation);
        }
        let slot = self.slots.len() as u32;
        self.slots.push(Slot { generation: 0, value: Some(value) });
        K::from_parts(slot, 0)
    }

    pub fn get(&self, key: K) -> Option<&T> {
        self.slots
            .get(key.slot() as usize)
            .filter(|s| s.generation == key.generation())
            .and_then(|s| s.value.as_ref())
    }

    pub fn get_mut(&mut self, key: K) -> Option<&mut T> {
        self.slots
            .get_mut(key.slot() as usize)
            .filter(|s| s.generation == key.generation())
            .and_then(|s| s.value.as_mut())
    }

    pub fn remove(&mut self, key: K) -> Option<T> {
        let entry = self.slots.get_mut(key.slot() as usize)?;
        if entry.generation != key.generation() || entry.value.is_none() {
            return None;
        }
        let value = entry.value.take();
        entry.generation = entry.generation.wrapping_add(1);
        self.free.push(key.slot());
        value
    }

    pub fn contains(&self, key: K) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.value.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live keys, in slot order.
    pub fn keys(&self) -> Vec<K> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.value.is_some())
            .map(|(i, s)| K::from_parts(i as u32, s.generation))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (K, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.value.as_ref().map(|v| (K::from_parts(i as u32, s.generation), v)))
    }
}
