//! Immutable, arena-backed copy of the input state.

use std::fmt;
use std::ops::Range;

use crate::arena::Arena;
use crate::device::DeviceIndex;

/// Non-empty pressed-key lists and axis histories copied at one instant.
///
/// Borrows the arena it was built in, so the arena cannot be rewound or
/// reset while the snapshot is alive.
#[derive(Clone)]
pub struct Snapshot<'a> {
    arena: Option<&'a Arena>,
    key_lists: Range<usize>,
    axes: Range<usize>,
}

/// Keys currently down on one device. Codes are unordered and unique.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PressedKeys<'a> {
    pub device_index: DeviceIndex,
    pub codes: &'a [u16],
}

/// One tracked axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisSnapshot<'a> {
    pub device_index: DeviceIndex,
    pub axis_id: u16,
    pub is_absolute: bool,
    /// Last absolute value; 0 for relative axes.
    pub current_value: i32,
    pub min: i32,
    pub max: i32,
    /// Recent deltas, oldest first.
    pub history: &'a [i32],
}

impl AxisSnapshot<'_> {
    pub fn newest(&self) -> Option<i32> {
        self.history.last().copied()
    }
}

impl<'a> Snapshot<'a> {
    pub(crate) fn new(arena: &'a Arena, key_lists: Range<usize>, axes: Range<usize>) -> Self {
        Self {
            arena: Some(arena),
            key_lists,
            axes,
        }
    }

    /// A snapshot with nothing in it.
    pub fn empty() -> Self {
        Self {
            arena: None,
            key_lists: 0..0,
            axes: 0..0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.key_lists.is_empty() && self.axes.is_empty()
    }

    pub fn pressed_keys(&self) -> impl Iterator<Item = PressedKeys<'a>> + use<'a> {
        let arena = self.arena;
        let range = self.key_lists.clone();
        arena.into_iter().flat_map(move |arena| {
            arena.key_list_records()[range.clone()]
                .iter()
                .map(move |record| PressedKeys {
                    device_index: record.device_index,
                    codes: arena.codes(record.start, record.len),
                })
        })
    }

    pub fn axes(&self) -> impl Iterator<Item = AxisSnapshot<'a>> + use<'a> {
        let arena = self.arena;
        let range = self.axes.clone();
        arena.into_iter().flat_map(move |arena| {
            arena.axis_records()[range.clone()]
                .iter()
                .map(move |record| AxisSnapshot {
                    device_index: record.device_index,
                    axis_id: record.axis_id,
                    is_absolute: record.is_absolute,
                    current_value: record.current_value,
                    min: record.min,
                    max: record.max,
                    history: arena.samples(record.start, record.len),
                })
        })
    }

    /// Codes down on `device`, or an empty slice if none were captured.
    pub fn pressed_keys_for(&self, device: DeviceIndex) -> &'a [u16] {
        self.pressed_keys()
            .find(|keys| keys.device_index == device)
            .map(|keys| keys.codes)
            .unwrap_or(&[])
    }

    pub fn axis(&self, device: DeviceIndex, axis_id: u16, is_absolute: bool) -> Option<AxisSnapshot<'a>> {
        self.axes().find(|axis| {
            axis.device_index == device && axis.axis_id == axis_id && axis.is_absolute == is_absolute
        })
    }
}

impl fmt::Debug for Snapshot<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("pressed_keys", &self.pressed_keys().collect::<Vec<_>>())
            .field("axes", &self.axes().collect::<Vec<_>>())
            .finish()
    }
}
