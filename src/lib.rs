//! Sequence memory and playback control for DMD-based binary light
//! projectors.
//!
//! This crate manages the hard parts of driving a binary spatial light
//! modulator: the device's limited on-board sequence memory, conversion of
//! arbitrary pixel buffers into the packed bit-plane format the device
//! consumes, and playback orchestration (single-shot, repeated, or
//! continuous) with microsecond-level timing, while tracking which
//! sequences are resident on the device so they can be replayed or
//! released safely.
//!
//! The vendor driver is expressed as the [`DeviceDriver`] trait - one
//! implementation per vendor API - so everything above it is testable
//! against the [`mock`] driver (feature `testutils`).
//!
//! # Getting Started
//!
//! ```ignore
//! use dmd_ctl::{DeviceRegistry, FrameShape, RepeatMode};
//!
//! // A registry owns one session per connected device; the factory
//! // produces the vendor driver binding for each index.
//! let mut registry = DeviceRegistry::new(|_index| MyVendorDriver::new());
//! registry.init(0)?;
//!
//! let session = registry.session(0)?;
//! let panel = session.resolution().unwrap(); // e.g. 1024x768
//!
//! // Upload five unpacked binary frames (one byte per pixel, 0 or 1),
//! // then play them three times at 60 Hz.
//! let shape = FrameShape::new(panel.width, panel.height, 5);
//! let frames = vec![0u8; panel.width * panel.height * 5];
//! let id = session.upload_sequence(&frames, shape)?;
//! session.play(id, 60.0, RepeatMode::Bounded(3))?;
//! session.wait_for_completion()?;
//! session.release_sequence(id)?;
//! # Ok::<(), dmd_ctl::Error>(())
//! ```
//!
//! # Pixel formats
//!
//! Patterns are accepted per frame as already-packed rows (`width / 8`
//! bytes, MSB = leftmost pixel), unpacked rows of `width` one-byte pixels,
//! or unpacked rows of the legacy square width (= panel height). See
//! [`pack_patterns`] for the exact rules.
//!
//! # Blocking model
//!
//! Every operation is a synchronous, blocking call into the driver -
//! uploads block for a duration proportional to sequence size, and
//! [`DeviceSession::wait_for_completion`] blocks until the device reports
//! idle ([`DeviceSession::has_completed`] is the non-blocking poll). There
//! are no internal threads and the registry provides no locking; drive
//! each device index from a single thread, or move the registry to a
//! dedicated worker.

pub mod driver;
mod error;
pub mod packer;
pub mod playback;
pub mod pool;
pub mod registry;
pub mod session;

#[cfg(any(test, feature = "testutils"))]
pub mod mock;

// Crate-level error types
pub use error::{Error, Result};

// Driver collaborator surface
pub use driver::{
    BinaryMode, DataFormat, DeviceDriver, DeviceHandle, DmdType, DriverError, FrameTiming,
    ProjectionState, Resolution, SeqControl, SequenceId,
};

// Frame packing
pub use packer::{pack_patterns, FrameShape, PackedFrames};

// Playback
pub use playback::{timing_for_rate, PlaybackController, PlaybackState, RepeatMode};

// Sequence bookkeeping
pub use pool::SequencePool;

// Session and registry
pub use registry::{DeviceRegistry, MAX_CONNECTED_DEVICES};
pub use session::DeviceSession;
