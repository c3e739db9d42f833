//! Device driver trait and driver-level vocabulary.
//!
//! This module defines [`DeviceDriver`], the trait every vendor driver
//! binding must implement, together with the handle and parameter types
//! that appear in its calls. The rest of the crate talks to hardware
//! exclusively through this trait, which keeps the session, pool, and
//! playback logic testable against a mock.
//!
//! # Blocking contract
//!
//! Every method is a synchronous, blocking call into the vendor driver.
//! [`seq_put`](DeviceDriver::seq_put) in particular copies pixel data into
//! device memory and may block for a duration proportional to the sequence
//! size. Callers that need responsiveness should poll with
//! [`proj_state`](DeviceDriver::proj_state) instead of
//! [`proj_wait`](DeviceDriver::proj_wait), and may run the whole session on
//! a dedicated worker thread (the trait is `Send`).

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque device handle assigned by the driver at allocation time.
///
/// Owned exclusively by one [`DeviceSession`](crate::DeviceSession) once
/// initialization succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceHandle(pub u32);

/// Opaque sequence identifier assigned by the driver.
///
/// Unique within the owning device for as long as the sequence is
/// allocated. The host retains nothing else about a sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SequenceId(pub u32);

impl fmt::Display for SequenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Physical DMD panel types reported by the device-type inquiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DmdType {
    /// XGA 0.55" type A panel.
    Xga055A,
    /// XGA 0.55" type X panel.
    Xga055X,
    /// XGA 0.7" type A panel.
    Xga07A,
    /// Reported by some firmware revisions for a 1080p panel without
    /// a readable type register.
    Disconnect,
    /// 1080p 0.95" type A panel.
    FullHd095A,
    /// WUXGA 0.96" type A panel.
    Wuxga096A,
    /// Any panel type this crate does not recognize.
    Other(u32),
}

impl DmdType {
    /// Panel resolution for this DMD type, if it is a supported one.
    pub fn resolution(&self) -> Option<Resolution> {
        match self {
            DmdType::Xga055A | DmdType::Xga055X | DmdType::Xga07A => {
                Some(Resolution::new(1024, 768))
            }
            // The driver groups DISCONNECT with the 1080p panel.
            DmdType::Disconnect | DmdType::FullHd095A => Some(Resolution::new(1920, 1080)),
            DmdType::Wuxga096A => Some(Resolution::new(1920, 1200)),
            DmdType::Other(_) => None,
        }
    }
}

/// Panel resolution in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Resolution {
    /// Panel width in pixels. Always a multiple of 8.
    pub width: usize,
    /// Panel height in pixels.
    pub height: usize,
}

impl Resolution {
    /// Create a resolution.
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    /// Packed bytes per row (8 pixels per byte).
    pub fn stride(&self) -> usize {
        self.width / 8
    }

    /// Packed bytes per frame.
    pub fn frame_bytes(&self) -> usize {
        self.stride() * self.height
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Per-sequence control parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqControl {
    /// Number of times a bounded start plays the sequence.
    Repeat(u32),
    /// Bit depth per pixel. This crate always configures 1 (binary).
    BitPlanes(u32),
    /// First frame of the playback range.
    FirstFrame(u32),
    /// Last frame of the playback range.
    LastFrame(u32),
    /// Row order of the uploaded bit planes.
    DataFormat(DataFormat),
    /// Binary timing mode, see [`BinaryMode`].
    BinaryMode(BinaryMode),
}

/// Row order of uploaded frame data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFormat {
    /// First uploaded row is the top row of the panel.
    BinaryTopDown,
    /// First uploaded row is the bottom row of the panel.
    BinaryBottomUp,
}

/// Binary-mode frame timing behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryMode {
    /// Each frame is followed by a dark reinitialization phase.
    Normal,
    /// No dark phase between frames. Binary frames need no
    /// reinitialization, so this maximizes the achievable frame rate.
    Uninterrupted,
}

/// Sequence timing parameters, all in microseconds.
///
/// Pushed to the device before each timed start. In uninterrupted binary
/// mode the device ignores the illuminate time, so `illuminate_us: None`
/// (device default) is the normal configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FrameTiming {
    /// Display duration of one frame. `None` selects the device default.
    pub illuminate_us: Option<u32>,
    /// Interval between the starts of two consecutive frames.
    pub picture_us: u32,
    /// Delay from the synch output pulse to the start of the display.
    pub synch_delay_us: u32,
    /// Duration of the frame synch output pulse.
    pub synch_pulse_width_us: u32,
    /// Delay from an incoming trigger edge to the start of the display.
    /// Ignored in master-clocked operation.
    pub trigger_in_delay_us: u32,
}

/// Device projection state as reported by the state inquiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionState {
    /// No sequence is being projected.
    Idle,
    /// A sequence is being projected.
    Active,
}

/// Errors reported by the vendor driver.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// The requested device number is absent or already claimed.
    #[error("device {0} not found or in use")]
    DeviceUnavailable(u32),

    /// The device cannot reserve memory for the requested sequence.
    #[error("out of device sequence memory")]
    OutOfMemory,

    /// The driver rejected an operation with a status code.
    #[error("{op} rejected by driver (status {status})")]
    Rejected {
        /// The driver primitive that failed.
        op: &'static str,
        /// Vendor status code as reported.
        status: i32,
    },
}

/// Driver-level result type.
pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// The vendor device-driver collaborator.
///
/// One implementation per vendor API. All sequence and projection calls
/// take the owning [`DeviceHandle`]; passing a handle the driver did not
/// allocate is a driver rejection, not undefined behavior.
pub trait DeviceDriver: Send + 'static {
    /// Claim the physical device with the given number.
    fn device_alloc(&mut self, device_number: u32) -> DriverResult<DeviceHandle>;

    /// Query the physical panel type.
    fn device_inquire_dmd_type(&mut self, device: DeviceHandle) -> DriverResult<DmdType>;

    /// Halt any in-progress projection on the device.
    fn device_halt(&mut self, device: DeviceHandle) -> DriverResult<()>;

    /// Release the device. Undefined on the hardware API unless the device
    /// is halted and all its sequences have been freed first.
    fn device_free(&mut self, device: DeviceHandle) -> DriverResult<()>;

    /// Reserve device memory for `frame_count` frames of `bit_planes` depth.
    fn seq_alloc(
        &mut self,
        device: DeviceHandle,
        bit_planes: u32,
        frame_count: u32,
    ) -> DriverResult<SequenceId>;

    /// Set one control parameter on an allocated sequence.
    fn seq_control(
        &mut self,
        device: DeviceHandle,
        sequence: SequenceId,
        control: SeqControl,
    ) -> DriverResult<()>;

    /// Query the minimum picture time the device supports for this
    /// sequence, in microseconds.
    fn seq_min_picture_time(
        &mut self,
        device: DeviceHandle,
        sequence: SequenceId,
    ) -> DriverResult<u32>;

    /// Push timing parameters for an allocated sequence.
    fn seq_timing(
        &mut self,
        device: DeviceHandle,
        sequence: SequenceId,
        timing: &FrameTiming,
    ) -> DriverResult<()>;

    /// Copy packed frame data into device memory.
    ///
    /// Blocking: may take time proportional to `data.len()`.
    fn seq_put(
        &mut self,
        device: DeviceHandle,
        sequence: SequenceId,
        first_frame: u32,
        frame_count: u32,
        data: &[u8],
    ) -> DriverResult<()>;

    /// Free an allocated sequence and its device memory.
    fn seq_free(&mut self, device: DeviceHandle, sequence: SequenceId) -> DriverResult<()>;

    /// Start a bounded projection of the sequence (repeat count as
    /// configured via [`SeqControl::Repeat`]).
    fn proj_start(&mut self, device: DeviceHandle, sequence: SequenceId) -> DriverResult<()>;

    /// Start a continuously looping projection of the sequence.
    fn proj_start_continuous(
        &mut self,
        device: DeviceHandle,
        sequence: SequenceId,
    ) -> DriverResult<()>;

    /// Request a projection halt. Non-blocking; pair with
    /// [`proj_wait`](DeviceDriver::proj_wait).
    fn proj_halt(&mut self, device: DeviceHandle) -> DriverResult<()>;

    /// Block until the device reports projection completion.
    fn proj_wait(&mut self, device: DeviceHandle) -> DriverResult<()>;

    /// Non-blocking projection state poll.
    fn proj_state(&mut self, device: DeviceHandle) -> DriverResult<ProjectionState>;
}
