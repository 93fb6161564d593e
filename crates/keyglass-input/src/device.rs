use std::fmt;

/// Stable small-integer identifier assigned at discovery time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceIndex(pub usize);

impl fmt::Display for DeviceIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Recognized device types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DeviceType {
    #[default]
    Unknown,
    Keyboard,
    Mouse,
    Touchpad,
    Joystick,
}

impl DeviceType {
    /// Best-effort classification from a device name.
    ///
    /// Case-insensitive substring match. A name matching more than one type
    /// is ambiguous and stays `Unknown`.
    pub fn classify(name: &str) -> DeviceType {
        const PATTERNS: [(&str, DeviceType); 4] = [
            ("keyboard", DeviceType::Keyboard),
            ("mouse", DeviceType::Mouse),
            ("touchpad", DeviceType::Touchpad),
            ("joystick", DeviceType::Joystick),
        ];

        let lower = name.to_lowercase();
        let mut matches = PATTERNS
            .iter()
            .filter(|(pattern, _)| lower.contains(pattern))
            .map(|&(_, ty)| ty);

        match (matches.next(), matches.next()) {
            (Some(ty), None) => ty,
            _ => DeviceType::Unknown,
        }
    }
}

/// Declared range and initial value of an absolute axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbsAxisInfo {
    pub axis_id: u16,
    pub value: i32,
    pub min: i32,
    pub max: i32,
}

/// What a device can report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Supported key codes.
    pub keys: Vec<u16>,
    pub abs_axes: Vec<AbsAxisInfo>,
    pub rel_axes: Vec<u16>,
}

impl Capabilities {
    pub fn has_keys(&self) -> bool {
        !self.keys.is_empty()
    }

    pub fn has_abs_axes(&self) -> bool {
        !self.abs_axes.is_empty()
    }

    pub fn has_rel_axes(&self) -> bool {
        !self.rel_axes.is_empty()
    }

    pub fn abs_axis(&self, axis_id: u16) -> Option<&AbsAxisInfo> {
        self.abs_axes.iter().find(|a| a.axis_id == axis_id)
    }
}

/// A discovered input device. Immutable until the next full reinitialize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub index: DeviceIndex,
    pub device_type: DeviceType,
    pub name: String,
    pub physical_path: String,
    pub capabilities: Capabilities,
}
