//! The item table
//!
//! Every persisted configuration item is declared here once, with its type
//! and default. The key of each item is its field name; renaming a field
//! orphans the stored value (it loads as an unknown record and the item
//! falls back to its default).

use super::item::{CharArray, ConfigItem, StoreItem};

/// Declare the configuration item table
///
/// Generates `ConfigItems` with one `ConfigItem` field per entry, a `COUNT`
/// constant and `as_array()` for walking the items in declaration order.
macro_rules! config_items {
    ($( $(#[$meta:meta])* $name:ident : $ty:ty = $default:expr ),* $(,)?) => {
        /// Every persisted configuration item
        pub struct ConfigItems {
            $(
                $(#[$meta])*
                pub $name: ConfigItem<$ty>,
            )*
        }

        impl ConfigItems {
            /// Number of items in the table
            pub const COUNT: usize = [$(stringify!($name)),*].len();

            /// Create the table with every item at its default
            pub const fn new() -> Self {
                Self {
                    $( $name: ConfigItem::new(stringify!($name), $default), )*
                }
            }

            /// All items in declaration order
            pub fn as_array(&self) -> [&dyn StoreItem; Self::COUNT] {
                [$( &self.$name as &dyn StoreItem ),*]
            }
        }

        impl Default for ConfigItems {
            fn default() -> Self {
                Self::new()
            }
        }
    };
}

/// Sound modes selectable from the menu
pub const SOUND_MODE_ONCE: u8 = 0;
pub const SOUND_MODE_LOUD: u8 = 1;
pub const SOUND_MODE_SILENT: u8 = 2;
pub const SOUND_MODE_ASSIST: u8 = 3;

/// Number of sound modes
pub const SOUND_MODE_COUNT: u8 = 4;

/// Language code meaning "not chosen yet"
pub const LANGUAGE_UNSET: u16 = 0xFFFF;

/// Hostname length including padding
pub const HOSTNAME_LEN: usize = 20;

config_items! {
    /// Run the selftest wizard on next boot
    run_selftest: bool = true,
    /// Run XYZ calibration on next boot
    run_xyz_calib: bool = true,
    /// Run first layer calibration on next boot
    run_first_layer: bool = true,
    /// Filament sensor enabled
    fs_enabled: bool = true,
    sound_mode: u8 = SOUND_MODE_ONCE,
    /// Volume 0-10
    sound_volume: u8 = 5,
    language: u16 = LANGUAGE_UNSET,
    fan_check_enabled: bool = true,
    /// Crash detection enabled
    crash_enabled: bool = true,
    /// StallGuard sensitivity, X axis
    crash_sens_x: i16 = 2,
    /// StallGuard sensitivity, Y axis
    crash_sens_y: i16 = 2,
    /// Maximum step period counted as a crash, X axis
    crash_max_period_x: u16 = 272,
    /// Maximum step period counted as a crash, Y axis
    crash_max_period_y: u16 = 272,
    crash_filter: bool = true,
    /// Offset from UTC in hours
    timezone: i8 = 0,
    /// Live Z adjustment in mm
    z_offset: f32 = 0.0,
    /// Footer slots, 0 = empty
    footer_setting: [u8; 5] = [1, 2, 3, 0, 0],
    lan_hostname: CharArray<HOSTNAME_LEN> = CharArray::new("strata"),
    lan_flag: u8 = 0,
    /// Travelled distance per axis in mm
    odometer_axes: [f32; 3] = [0.0; 3],
    /// Extruded filament in mm
    odometer_extruded_length: f32 = 0.0,
}
