//! The live input state and every mutation on it.
//!
//! One `parking_lot::Mutex` guards the whole aggregate. Each operation holds
//! it for a single mutation; `snapshot` holds it for the whole copy, so a
//! snapshot never observes a half-applied change.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::arena::Arena;
use crate::device::{Device, DeviceIndex};
use crate::ring::HistoryRing;
use crate::snapshot::Snapshot;
use crate::time::Timestamp;

/// Position of a pressed-key list in the store. Valid for the store's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyListHandle(usize);

/// Position of an axis history in the store. Valid for the store's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AxisHandle(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct AxisKey {
    device: DeviceIndex,
    axis_id: u16,
    is_absolute: bool,
}

#[derive(Debug)]
struct PressedKeysList {
    device_index: DeviceIndex,
    /// Unique, unordered.
    codes: Vec<u16>,
}

impl PressedKeysList {
    fn set(&mut self, code: u16, down: bool) {
        let position = self.codes.iter().position(|&c| c == code);
        match (down, position) {
            (true, None) => self.codes.push(code),
            (false, Some(i)) => {
                self.codes.swap_remove(i);
            }
            _ => {}
        }
    }
}

#[derive(Debug)]
struct AxisHistory {
    key: AxisKey,
    current_value: i32,
    min: i32,
    max: i32,
    history: HistoryRing,
    last_updated_at: Timestamp,
}

impl AxisHistory {
    fn push_abs(&mut self, time: Timestamp, value: i32) {
        let ms_diff = time.millis_since(self.last_updated_at).max(1);
        let delta = (i64::from(value) - i64::from(self.current_value)) / ms_diff as i64;
        let delta = delta.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32;

        self.last_updated_at = time;
        self.current_value = value;
        self.history.insert(delta);
    }

    /// Leaves `current_value` alone, so it is also the path for zeroing an absolute axis's rate.
    fn push_rel(&mut self, time: Timestamp, delta: i32) {
        self.last_updated_at = time;
        self.history.insert(delta);
    }
}

#[derive(Debug, Default)]
struct InputState {
    key_lists: Vec<PressedKeysList>,
    axes: Vec<AxisHistory>,
    key_lists_by_device: HashMap<DeviceIndex, usize>,
    axes_by_key: HashMap<AxisKey, usize>,
}

impl InputState {
    fn axis_mut(&mut self, key: AxisKey) -> Option<&mut AxisHistory> {
        let i = *self.axes_by_key.get(&key)?;
        self.axes.get_mut(i)
    }
}

/// Pressed keys per device plus one history per tracked axis.
#[derive(Debug)]
pub struct InputStore {
    state: Mutex<InputState>,
    history_capacity: usize,
}

impl InputStore {
    pub fn new(history_capacity: usize) -> Self {
        Self {
            state: Mutex::new(InputState::default()),
            history_capacity: history_capacity.max(1),
        }
    }

    pub fn history_capacity(&self) -> usize {
        self.history_capacity
    }

    /// Add an empty pressed-key list for `device`. Returns the existing one if already defined.
    pub fn define_key_list(&self, device: DeviceIndex) -> KeyListHandle {
        let mut state = self.state.lock();
        if let Some(&i) = state.key_lists_by_device.get(&device) {
            return KeyListHandle(i);
        }

        let i = state.key_lists.len();
        state.key_lists.push(PressedKeysList {
            device_index: device,
            codes: Vec::new(),
        });
        state.key_lists_by_device.insert(device, i);
        KeyListHandle(i)
    }

    pub fn define_abs_axis(
        &self,
        device: DeviceIndex,
        axis_id: u16,
        time: Timestamp,
        initial_value: i32,
        min: i32,
        max: i32,
    ) -> AxisHandle {
        let key = AxisKey {
            device,
            axis_id,
            is_absolute: true,
        };
        self.define_axis(key, time, initial_value, min, max)
    }

    pub fn define_rel_axis(&self, device: DeviceIndex, axis_id: u16, time: Timestamp) -> AxisHandle {
        let key = AxisKey {
            device,
            axis_id,
            is_absolute: false,
        };
        self.define_axis(key, time, 0, 0, 0)
    }

    fn define_axis(&self, key: AxisKey, time: Timestamp, value: i32, min: i32, max: i32) -> AxisHandle {
        let mut state = self.state.lock();
        if let Some(&i) = state.axes_by_key.get(&key) {
            warn!(
                device = %key.device,
                axis = key.axis_id,
                absolute = key.is_absolute,
                "Axis defined twice; keeping the first definition"
            );
            return AxisHandle(i);
        }

        let i = state.axes.len();
        state.axes.push(AxisHistory {
            key,
            current_value: value,
            min,
            max,
            history: HistoryRing::new(self.history_capacity),
            last_updated_at: time,
        });
        state.axes_by_key.insert(key, i);
        AxisHandle(i)
    }

    /// Define a key list for every device with keys and a history for every declared axis.
    pub fn define_devices(&self, devices: &[Device], now: Timestamp) {
        for device in devices {
            let caps = &device.capabilities;
            if caps.has_keys() {
                self.define_key_list(device.index);
            }
            for axis in &caps.abs_axes {
                self.define_abs_axis(device.index, axis.axis_id, now, axis.value, axis.min, axis.max);
            }
            for &axis_id in &caps.rel_axes {
                self.define_rel_axis(device.index, axis_id, now);
            }
        }
        debug!(
            key_lists = self.key_list_count(),
            axes = self.axis_count(),
            "Input store defined"
        );
    }

    /// Record a key transition. Duplicate downs and ups for absent keys change nothing.
    pub fn set_key(&self, device: DeviceIndex, code: u16, down: bool) {
        let mut state = self.state.lock();
        let Some(&i) = state.key_lists_by_device.get(&device) else {
            warn!(device = %device, code, "No key list for device");
            return;
        };
        state.key_lists[i].set(code, down);
    }

    /// Record a new absolute position; the history receives the per-millisecond rate.
    pub fn push_abs_value(&self, device: DeviceIndex, axis_id: u16, time: Timestamp, value: i32) {
        let key = AxisKey {
            device,
            axis_id,
            is_absolute: true,
        };
        let mut state = self.state.lock();
        match state.axis_mut(key) {
            Some(axis) => axis.push_abs(time, value),
            None => {
                warn!(device = %device, axis = axis_id, "No absolute axis for device");
            }
        }
    }

    pub fn push_rel_value(&self, device: DeviceIndex, axis_id: u16, time: Timestamp, delta: i32) {
        let key = AxisKey {
            device,
            axis_id,
            is_absolute: false,
        };
        let mut state = self.state.lock();
        match state.axis_mut(key) {
            Some(axis) => axis.push_rel(time, delta),
            None => {
                warn!(device = %device, axis = axis_id, "No relative axis for device");
            }
        }
    }

    pub fn key_list_count(&self) -> usize {
        self.state.lock().key_lists.len()
    }

    pub fn axis_count(&self) -> usize {
        self.state.lock().axes.len()
    }

    pub fn key_list_handles(&self) -> impl Iterator<Item = KeyListHandle> {
        (0..self.key_list_count()).map(KeyListHandle)
    }

    pub fn axis_handles(&self) -> impl Iterator<Item = AxisHandle> {
        (0..self.axis_count()).map(AxisHandle)
    }

    /// Owner and current codes of one list.
    pub fn pressed_keys(&self, handle: KeyListHandle) -> Option<(DeviceIndex, Vec<u16>)> {
        let state = self.state.lock();
        state
            .key_lists
            .get(handle.0)
            .map(|list| (list.device_index, list.codes.clone()))
    }

    /// Current codes for `device`, if it has a list.
    pub fn pressed_keys_of(&self, device: DeviceIndex) -> Option<Vec<u16>> {
        let state = self.state.lock();
        let &i = state.key_lists_by_device.get(&device)?;
        Some(state.key_lists[i].codes.clone())
    }

    /// Remove each of `stale` that is still present. Returns how many were removed.
    pub fn prune_keys(&self, handle: KeyListHandle, stale: &[u16]) -> usize {
        let mut state = self.state.lock();
        let Some(list) = state.key_lists.get_mut(handle.0) else {
            return 0;
        };
        let before = list.codes.len();
        list.codes.retain(|code| !stale.contains(code));
        before - list.codes.len()
    }

    /// Push a zero through the relative path if the axis has been idle for
    /// longer than `idle_after`. `current_value` is never touched.
    pub fn decay_axis(&self, handle: AxisHandle, now: Timestamp, idle_after: Duration) -> bool {
        let mut state = self.state.lock();
        let Some(axis) = state.axes.get_mut(handle.0) else {
            return false;
        };
        if now.since(axis.last_updated_at) <= idle_after {
            return false;
        }
        axis.push_rel(now, 0);
        true
    }

    /// Copy every non-empty list and history into `arena`.
    ///
    /// The store lock is held for the whole copy.
    pub fn snapshot<'a>(&self, arena: &'a mut Arena) -> Snapshot<'a> {
        let state = self.state.lock();

        let lists = state.key_lists.iter().filter(|l| !l.codes.is_empty());
        let axes = state.axes.iter().filter(|a| !a.history.is_empty());
        let (list_count, code_count) = lists
            .clone()
            .fold((0, 0), |(n, codes), l| (n + 1, codes + l.codes.len()));
        let (axis_count, sample_count) = axes
            .clone()
            .fold((0, 0), |(n, samples), a| (n + 1, samples + a.history.len()));

        let mark = arena.mark();
        arena.reserve(list_count, code_count, axis_count, sample_count);
        for list in lists {
            arena.push_key_list(list.device_index, &list.codes);
        }
        for axis in axes {
            let (older, newer) = axis.history.as_slices();
            arena.push_axis(
                axis.key.device,
                axis.key.axis_id,
                axis.key.is_absolute,
                axis.current_value,
                axis.min,
                axis.max,
                older,
                newer,
            );
        }
        drop(state);

        debug!(
            key_lists = list_count,
            axes = axis_count,
            "Snapshot copied"
        );
        arena.snapshot_since(mark)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    const KB: DeviceIndex = DeviceIndex(0);

    fn sorted(mut codes: Vec<u16>) -> Vec<u16> {
        codes.sort_unstable();
        codes
    }

    #[test]
    fn set_key_adds_and_removes() {
        let store = InputStore::new(5);
        store.define_key_list(KB);

        store.set_key(KB, 30, true);
        store.set_key(KB, 31, true);
        store.set_key(KB, 30, true);
        store.set_key(KB, 30, false);
        store.set_key(KB, 44, false);

        assert_eq!(store.pressed_keys_of(KB), Some(vec![31]));
    }

    #[test]
    fn set_key_for_unknown_device_is_ignored() {
        let store = InputStore::new(5);
        store.define_key_list(KB);
        store.set_key(DeviceIndex(9), 30, true);
        assert_eq!(store.pressed_keys_of(KB), Some(vec![]));
        assert_eq!(store.pressed_keys_of(DeviceIndex(9)), None);
    }

    #[test]
    fn define_key_list_is_idempotent() {
        let store = InputStore::new(5);
        let a = store.define_key_list(KB);
        let b = store.define_key_list(KB);
        assert_eq!(a, b);
        assert_eq!(store.key_list_count(), 1);
    }

    #[test]
    fn define_devices_follows_capabilities() {
        use crate::device::{AbsAxisInfo, Capabilities, DeviceType};

        let device = |index, capabilities| Device {
            index: DeviceIndex(index),
            device_type: DeviceType::Unknown,
            name: String::new(),
            physical_path: String::new(),
            capabilities,
        };
        let devices = vec![
            device(0, Capabilities {
                keys: vec![30],
                ..Default::default()
            }),
            device(1, Capabilities {
                keys: vec![0x110],
                rel_axes: vec![0, 1],
                ..Default::default()
            }),
            device(2, Capabilities {
                abs_axes: vec![AbsAxisInfo {
                    axis_id: 1,
                    value: 42,
                    min: 0,
                    max: 255,
                }],
                ..Default::default()
            }),
        ];

        let store = InputStore::new(5);
        store.define_devices(&devices, Timestamp::ZERO);
        assert_eq!(store.key_list_count(), 2);
        assert_eq!(store.axis_count(), 3);
        assert_eq!(store.pressed_keys_of(DeviceIndex(2)), None);

        store.push_abs_value(DeviceIndex(2), 1, Timestamp::from_millis(2), 46);
        let mut arena = Arena::new();
        let snapshot = store.snapshot(&mut arena);
        let axis = snapshot.axis(DeviceIndex(2), 1, true).unwrap();
        assert_eq!(axis.newest(), Some(2));
        assert_eq!((axis.min, axis.max), (0, 255));
    }

    #[test]
    fn duplicate_axis_keeps_first_definition() {
        let store = InputStore::new(5);
        let first = store.define_abs_axis(KB, 1, Timestamp::ZERO, 10, 0, 255);
        let second = store.define_abs_axis(KB, 1, Timestamp::ZERO, 99, -1, 1);
        let rel = store.define_rel_axis(KB, 1, Timestamp::ZERO);
        assert_eq!(first, second);
        assert_ne!(first, rel);
        assert_eq!(store.axis_count(), 2);

        store.push_abs_value(KB, 1, Timestamp::from_millis(10), 20);
        let mut arena = Arena::new();
        let snapshot = store.snapshot(&mut arena);
        let axis = snapshot.axis(KB, 1, true).unwrap();
        assert_eq!((axis.min, axis.max), (0, 255));
        assert_eq!(axis.history, &[1]);
    }

    #[test]
    fn abs_delta_is_rate_per_millisecond() {
        let store = InputStore::new(5);
        store.define_abs_axis(KB, 1, Timestamp::ZERO, 100, 0, 255);
        store.push_abs_value(KB, 1, Timestamp::from_millis(50), 150);

        let mut arena = Arena::new();
        let snapshot = store.snapshot(&mut arena);
        let axis = snapshot.axis(KB, 1, true).unwrap();
        assert_eq!(axis.current_value, 150);
        assert_eq!(axis.newest(), Some(1));
    }

    #[test]
    fn abs_delta_truncates_toward_zero_and_clamps_elapsed() {
        let store = InputStore::new(5);
        store.define_abs_axis(KB, 0, Timestamp::ZERO, 0, -100, 100);
        store.push_abs_value(KB, 0, Timestamp::from_millis(3), 10); // 10 / 3
        store.push_abs_value(KB, 0, Timestamp::from_millis(6), 0); // -10 / 3
        store.push_abs_value(KB, 0, Timestamp::from_millis(6), 7); // 0ms elapsed -> 1ms
        store.push_abs_value(KB, 0, Timestamp::from_millis(2), 9); // clock went back -> 1ms

        let mut arena = Arena::new();
        let snapshot = store.snapshot(&mut arena);
        assert_eq!(snapshot.axis(KB, 0, true).unwrap().history, &[3, -3, 7, 2]);
    }

    #[test]
    fn abs_delta_saturates_instead_of_overflowing() {
        let store = InputStore::new(5);
        store.define_abs_axis(KB, 0, Timestamp::ZERO, i32::MIN, i32::MIN, i32::MAX);
        store.push_abs_value(KB, 0, Timestamp::ZERO, i32::MAX);

        let mut arena = Arena::new();
        let snapshot = store.snapshot(&mut arena);
        assert_eq!(snapshot.axis(KB, 0, true).unwrap().newest(), Some(i32::MAX));
    }

    #[test]
    fn rel_values_go_in_unchanged() {
        let store = InputStore::new(3);
        store.define_rel_axis(KB, 0, Timestamp::ZERO);
        for (t, d) in [(1, -4), (2, 7), (3, 0), (4, 12)] {
            store.push_rel_value(KB, 0, Timestamp::from_millis(t), d);
        }
        store.push_rel_value(KB, 5, Timestamp::from_millis(5), 1);

        let mut arena = Arena::new();
        let snapshot = store.snapshot(&mut arena);
        let axis = snapshot.axis(KB, 0, false).unwrap();
        assert_eq!(axis.history, &[7, 0, 12]);
        assert_eq!(axis.current_value, 0);
    }

    #[test]
    fn decay_pushes_zero_without_touching_value() {
        let store = InputStore::new(5);
        let abs = store.define_abs_axis(KB, 1, Timestamp::ZERO, 100, 0, 255);
        store.push_abs_value(KB, 1, Timestamp::from_millis(10), 200);

        let idle = Duration::from_millis(50);
        assert!(!store.decay_axis(abs, Timestamp::from_millis(60), idle));
        assert!(store.decay_axis(abs, Timestamp::from_millis(61), idle));

        let mut arena = Arena::new();
        let snapshot = store.snapshot(&mut arena);
        let axis = snapshot.axis(KB, 1, true).unwrap();
        assert_eq!(axis.history, &[10, 0]);
        assert_eq!(axis.current_value, 200);
    }

    #[test]
    fn decay_reaches_axes_that_never_moved() {
        let store = InputStore::new(5);
        let abs = store.define_abs_axis(KB, 1, Timestamp::ZERO, 128, 0, 255);
        let rel = store.define_rel_axis(KB, 0, Timestamp::ZERO);
        let idle = Duration::from_millis(50);
        assert!(!store.decay_axis(abs, Timestamp::from_millis(50), idle));
        assert_eq!(store.snapshot(&mut Arena::new()).axes().count(), 0);

        assert!(store.decay_axis(abs, Timestamp::from_millis(1_000), idle));
        assert!(store.decay_axis(rel, Timestamp::from_millis(1_000), idle));

        let mut arena = Arena::new();
        let snapshot = store.snapshot(&mut arena);
        let axis = snapshot.axis(KB, 1, true).unwrap();
        assert_eq!(axis.history, &[0]);
        assert_eq!(axis.current_value, 128);
        assert_eq!((axis.min, axis.max), (0, 255));
        assert_eq!(snapshot.axis(KB, 0, false).unwrap().history, &[0]);
    }

    #[test]
    fn prune_removes_only_listed_codes() {
        let store = InputStore::new(5);
        let list = store.define_key_list(KB);
        for code in [30, 31, 32] {
            store.set_key(KB, code, true);
        }
        assert_eq!(store.prune_keys(list, &[31, 99]), 1);
        assert_eq!(sorted(store.pressed_keys_of(KB).unwrap()), vec![30, 32]);
    }

    #[test]
    fn snapshot_omits_empty_entries() {
        let store = InputStore::new(5);
        store.define_key_list(DeviceIndex(0));
        store.define_key_list(DeviceIndex(1));
        store.define_rel_axis(DeviceIndex(1), 0, Timestamp::ZERO);
        store.define_rel_axis(DeviceIndex(1), 1, Timestamp::ZERO);
        store.set_key(DeviceIndex(1), 272, true);
        store.push_rel_value(DeviceIndex(1), 1, Timestamp::from_millis(1), 5);

        let mut arena = Arena::new();
        let snapshot = store.snapshot(&mut arena);
        let keys: Vec<_> = snapshot.pressed_keys().collect();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].device_index, DeviceIndex(1));
        let axes: Vec<_> = snapshot.axes().collect();
        assert_eq!(axes.len(), 1);
        assert_eq!(axes[0].axis_id, 1);
    }

    #[test]
    fn snapshot_is_isolated_from_later_mutation() {
        let store = InputStore::new(3);
        store.define_key_list(KB);
        store.define_rel_axis(KB, 0, Timestamp::ZERO);
        store.set_key(KB, 30, true);
        store.push_rel_value(KB, 0, Timestamp::from_millis(1), 4);

        let mut arena = Arena::new();
        let snapshot = store.snapshot(&mut arena);

        store.set_key(KB, 30, false);
        store.set_key(KB, 31, true);
        for d in 0..5 {
            store.push_rel_value(KB, 0, Timestamp::from_millis(2), d);
        }

        assert_eq!(snapshot.pressed_keys_for(KB), &[30]);
        assert_eq!(snapshot.axis(KB, 0, false).unwrap().history, &[4]);
    }

    #[test]
    fn snapshot_linearizes_wrapped_history() {
        let store = InputStore::new(3);
        store.define_rel_axis(KB, 0, Timestamp::ZERO);
        for d in 1..=5 {
            store.push_rel_value(KB, 0, Timestamp::from_millis(d as u64), d);
        }
        let mut arena = Arena::new();
        let snapshot = store.snapshot(&mut arena);
        assert_eq!(snapshot.axis(KB, 0, false).unwrap().history, &[3, 4, 5]);
    }

    proptest! {
        #[test]
        fn pressed_keys_match_last_event_per_code(
            events in prop::collection::vec((0u16..16, any::<bool>()), 0..200)
        ) {
            let store = InputStore::new(5);
            store.define_key_list(KB);

            let mut expected = HashSet::new();
            for &(code, down) in &events {
                store.set_key(KB, code, down);
                if down {
                    expected.insert(code);
                } else {
                    expected.remove(&code);
                }
            }

            let actual = store.pressed_keys_of(KB).unwrap();
            let unique: HashSet<u16> = actual.iter().copied().collect();
            prop_assert_eq!(unique.len(), actual.len());
            prop_assert_eq!(unique, expected);
        }
    }
}
