//! Mercury Protocol Constants
//!
//! Frame layout, timing and scanning constants of the Mercury 200 point-to-point
//! protocol.

/// Length of the big-endian network address at the start of every frame
pub const FRAME_ADDRESS_LEN: usize = 4;

/// Length of the command byte
pub const FRAME_COMMAND_LEN: usize = 1;

/// Length of the trailing little-endian CRC-16/Modbus
pub const FRAME_CRC_LEN: usize = 2;

/// Address + command + CRC, the size of a frame with an empty body
pub const FRAME_OVERHEAD: usize = FRAME_ADDRESS_LEN + FRAME_COMMAND_LEN + FRAME_CRC_LEN;

// ----------------------------------------------------------------------------
// Answer body sizes per command
// ----------------------------------------------------------------------------

/// Four tariffs, 4 BCD bytes each
pub const ENERGY_BODY_LEN: usize = 16;
/// U[2] I[2] P[3]
pub const UIP_BODY_LEN: usize = 7;
pub const SERIAL_NUMBER_BODY_LEN: usize = 4;
/// dow hh mm ss dd mo yy
pub const DATE_TIME_BODY_LEN: usize = 7;

// ----------------------------------------------------------------------------
// Serial line
// ----------------------------------------------------------------------------

/// Start + 8 data + stop
pub const BITS_PER_BYTE: u64 = 10;

/// Read timeout of one answer
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 400;

/// Receive buffer, sized for the largest answer
pub const DEFAULT_RX_BUFFER_LEN: usize = 50;

/// Speed the meter listens at out of the box
pub const DEFAULT_PORT_SPEED: u32 = 9600;

/// Reference speed for the SET_SPEED divisor code
pub const SPEED_DIVISOR_BASE: u32 = 9600;

// ----------------------------------------------------------------------------
// Transactions
// ----------------------------------------------------------------------------

pub const DEFAULT_MAX_ATTEMPTS: u32 = 100;

/// Minimum spacing between two requests
pub const DEFAULT_INTER_REQUEST_DELAY_MS: u64 = 10;

// ----------------------------------------------------------------------------
// Address scanning
// ----------------------------------------------------------------------------

pub const DEFAULT_SCAN_CHECKPOINT_STRIDE: u32 = 50_000;
pub const DEFAULT_SCAN_PROGRESS_STRIDE: u32 = 1_000;
pub const DEFAULT_SCAN_LOG: &str = "bf.log";

/// Marker written after a discovered address in the scan log
pub const SCAN_LOG_FOUND_MARKER: &str = "Gotcha! Address is found";
