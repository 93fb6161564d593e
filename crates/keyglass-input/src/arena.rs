//! Checkpointable bump storage for per-frame snapshots.
//!
//! Backing buffers only grow; `rewind` and `reset` truncate them without
//! releasing capacity, so a renderer that saves before each snapshot and
//! rewinds after drawing stops allocating once the working set is reached.

use std::mem::size_of;

use crate::device::DeviceIndex;
use crate::snapshot::Snapshot;

#[derive(Debug, Clone, Copy)]
pub(crate) struct KeyListRecord {
    pub device_index: DeviceIndex,
    pub start: usize,
    pub len: usize,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct AxisRecord {
    pub device_index: DeviceIndex,
    pub axis_id: u16,
    pub is_absolute: bool,
    pub current_value: i32,
    pub min: i32,
    pub max: i32,
    pub start: usize,
    pub len: usize,
}

/// Fill levels of every backing buffer at one point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Mark {
    codes: usize,
    samples: usize,
    key_lists: usize,
    axes: usize,
}

/// Caller-owned region that snapshots are copied into.
#[derive(Debug, Default)]
pub struct Arena {
    codes: Vec<u16>,
    samples: Vec<i32>,
    key_lists: Vec<KeyListRecord>,
    axes: Vec<AxisRecord>,
    checkpoints: Vec<Mark>,
}

impl Arena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-size for roughly `devices` key lists and `axes` histories of `history` samples.
    pub fn with_capacity(devices: usize, axes: usize, history: usize) -> Self {
        Self {
            codes: Vec::with_capacity(devices * 8),
            samples: Vec::with_capacity(axes * history),
            key_lists: Vec::with_capacity(devices),
            axes: Vec::with_capacity(axes),
            checkpoints: Vec::new(),
        }
    }

    /// Push a checkpoint. Everything allocated after it is dropped by the matching `rewind`.
    pub fn save(&mut self) {
        let mark = self.mark();
        self.checkpoints.push(mark);
    }

    /// Pop the most recent checkpoint and truncate back to it.
    ///
    /// Returns `false` (and changes nothing) when no checkpoint is saved.
    pub fn rewind(&mut self) -> bool {
        match self.checkpoints.pop() {
            Some(mark) => {
                self.truncate(mark);
                true
            }
            None => false,
        }
    }

    /// Drop all contents and checkpoints. Capacity is kept.
    pub fn reset(&mut self) {
        self.checkpoints.clear();
        self.truncate(Mark::default());
    }

    /// Bytes currently in use.
    pub fn used(&self) -> usize {
        self.codes.len() * size_of::<u16>()
            + self.samples.len() * size_of::<i32>()
            + self.key_lists.len() * size_of::<KeyListRecord>()
            + self.axes.len() * size_of::<AxisRecord>()
    }

    /// Bytes reserved by the backing buffers.
    pub fn capacity(&self) -> usize {
        self.codes.capacity() * size_of::<u16>()
            + self.samples.capacity() * size_of::<i32>()
            + self.key_lists.capacity() * size_of::<KeyListRecord>()
            + self.axes.capacity() * size_of::<AxisRecord>()
    }

    pub fn checkpoint_depth(&self) -> usize {
        self.checkpoints.len()
    }

    fn truncate(&mut self, mark: Mark) {
        self.codes.truncate(mark.codes);
        self.samples.truncate(mark.samples);
        self.key_lists.truncate(mark.key_lists);
        self.axes.truncate(mark.axes);
    }

    pub(crate) fn mark(&self) -> Mark {
        Mark {
            codes: self.codes.len(),
            samples: self.samples.len(),
            key_lists: self.key_lists.len(),
            axes: self.axes.len(),
        }
    }

    /// Reserve room for a whole snapshot up front.
    pub(crate) fn reserve(&mut self, key_lists: usize, codes: usize, axes: usize, samples: usize) {
        self.key_lists.reserve(key_lists);
        self.codes.reserve(codes);
        self.axes.reserve(axes);
        self.samples.reserve(samples);
    }

    pub(crate) fn push_key_list(&mut self, device_index: DeviceIndex, codes: &[u16]) {
        let start = self.codes.len();
        self.codes.extend_from_slice(codes);
        self.key_lists.push(KeyListRecord {
            device_index,
            start,
            len: codes.len(),
        });
    }

    /// Copy an axis. `older` and `newer` are concatenated, so a wrapped ring
    /// is stored oldest first.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn push_axis(
        &mut self,
        device_index: DeviceIndex,
        axis_id: u16,
        is_absolute: bool,
        current_value: i32,
        min: i32,
        max: i32,
        older: &[i32],
        newer: &[i32],
    ) {
        let start = self.samples.len();
        self.samples.extend_from_slice(older);
        self.samples.extend_from_slice(newer);
        self.axes.push(AxisRecord {
            device_index,
            axis_id,
            is_absolute,
            current_value,
            min,
            max,
            start,
            len: older.len() + newer.len(),
        });
    }

    /// View of everything pushed since `mark`.
    pub(crate) fn snapshot_since(&self, mark: Mark) -> Snapshot<'_> {
        Snapshot::new(
            self,
            mark.key_lists..self.key_lists.len(),
            mark.axes..self.axes.len(),
        )
    }

    pub(crate) fn key_list_records(&self) -> &[KeyListRecord] {
        &self.key_lists
    }

    pub(crate) fn axis_records(&self) -> &[AxisRecord] {
        &self.axes
    }

    pub(crate) fn codes(&self, start: usize, len: usize) -> &[u16] {
        &self.codes[start..start + len]
    }

    pub(crate) fn samples(&self, start: usize, len: usize) -> &[i32] {
        &self.samples[start..start + len]
    }
}
