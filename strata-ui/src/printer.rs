//! Printer state as seen by the UI
//!
//! A snapshot taken from the motion/print task once per UI loop tick.

/// Command the printer is currently executing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MarlinCommand {
    /// Nothing running
    None,
    /// Auto home
    G28,
    /// Bed leveling
    G29,
    /// Wait for hotend temperature
    M109,
    /// Wait for bed temperature
    M190,
    /// Filament change
    M600,
    /// Load filament
    M701,
    /// Unload filament
    M702,
    /// Any other G-code
    Other,
}

impl MarlinCommand {
    /// Commands during which a filament change cannot be queued
    pub fn blocks_filament_change(&self) -> bool {
        matches!(
            self,
            MarlinCommand::G28 | MarlinCommand::G29 | MarlinCommand::M109 | MarlinCommand::M190
        )
    }
}

/// Print job state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PrintState {
    Idle,
    Printing,
    Pausing,
    Paused,
    Resuming,
    Aborting,
    Aborted,
    Finishing,
    Finished,
}

impl PrintState {
    /// States in which a filament change may be requested
    pub fn allows_filament_change(&self) -> bool {
        matches!(self, PrintState::Printing | PrintState::Paused)
    }
}

/// Live printer status consumed by menu screens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PrinterStatus {
    /// Every axis has been homed
    pub all_axes_homed: bool,
    /// Every axis position is trusted
    pub all_axes_known: bool,
    /// Command in progress
    pub command: MarlinCommand,
    /// Print job state; `None` if the printer variables are unavailable
    pub print_state: Option<PrintState>,
}

impl PrinterStatus {
    /// Whether an M600 filament change can be offered
    pub fn can_change_filament(&self) -> bool {
        self.all_axes_homed
            && self.all_axes_known
            && !self.command.blocks_filament_change()
            && self
                .print_state
                .map_or(true, |state| state.allows_filament_change())
    }
}
