//! Text rendering of a snapshot, one line per active device or axis.

use std::fmt::Write;

use keyglass_input::{Device, Snapshot};

/// Render `snapshot` against the device list it was taken from.
///
/// Key lines read `<name>: 30 - 31`, with codes in ascending order. Axis lines
/// read `<name> abs 1: 150 [0, 255] history 1 0 0` or
/// `<name> rel 0: history 4 -2`, history oldest first.
pub fn describe(snapshot: &Snapshot<'_>, devices: &[Device]) -> String {
    let name = |index: keyglass_input::DeviceIndex| {
        devices
            .get(index.0)
            .map(|d| d.name.as_str())
            .unwrap_or("unknown device")
    };

    let mut out = String::new();
    for keys in snapshot.pressed_keys() {
        let mut codes = keys.codes.to_vec();
        codes.sort_unstable();
        let joined: Vec<String> = codes.iter().map(u16::to_string).collect();
        let _ = writeln!(out, "{}: {}", name(keys.device_index), joined.join(" - "));
    }

    for axis in snapshot.axes() {
        let history: Vec<String> = axis.history.iter().map(i32::to_string).collect();
        if axis.is_absolute {
            let _ = writeln!(
                out,
                "{} abs {}: {} [{}, {}] history {}",
                name(axis.device_index),
                axis.axis_id,
                axis.current_value,
                axis.min,
                axis.max,
                history.join(" ")
            );
        } else {
            let _ = writeln!(
                out,
                "{} rel {}: history {}",
                name(axis.device_index),
                axis.axis_id,
                history.join(" ")
            );
        }
    }
    out
}
