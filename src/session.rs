//! Device session: ownership of one physical DMD and its sequences.
//!
//! A [`DeviceSession`] owns a driver instance, the device handle it
//! allocates at initialization, the [`SequencePool`] tracking on-device
//! sequence memory, and the [`PlaybackController`] governing projection.
//! Teardown releases everything in the order the hardware API requires:
//! halt, then free every sequence, then free the device.
//!
//! All operations are blocking calls into the driver; uploads in
//! particular take time proportional to sequence size. The session assumes
//! a single calling thread (see the crate docs for the threading model).

use log::{debug, warn};

use crate::driver::{DeviceDriver, DeviceHandle, Resolution, SequenceId};
use crate::error::{Error, Result};
use crate::packer::{pack_patterns, FrameShape, PackedFrames};
use crate::playback::{PlaybackController, PlaybackState, RepeatMode};
use crate::pool::SequencePool;

/// Resources held by an initialized session.
#[derive(Debug, Clone, Copy)]
struct ActiveDevice {
    handle: DeviceHandle,
    resolution: Resolution,
}

/// One physical DMD and the sequences resident on it.
///
/// Created uninitialized; every operation except [`initialize`]
/// (and the pure queries) fails with [`Error::NotInitialized`] until
/// initialization succeeds. Dropping the session releases the device.
#[derive(Debug)]
pub struct DeviceSession<D: DeviceDriver> {
    index: usize,
    driver: D,
    active: Option<ActiveDevice>,
    pool: SequencePool,
    playback: PlaybackController,
}

impl<D: DeviceDriver> DeviceSession<D> {
    /// Create an uninitialized session for the device at `index`.
    pub fn new(index: usize, driver: D) -> Self {
        Self {
            index,
            driver,
            active: None,
            pool: SequencePool::new(),
            playback: PlaybackController::new(),
        }
    }

    /// The device index this session was created for.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Whether the session holds an initialized device.
    pub fn is_initialized(&self) -> bool {
        self.active.is_some()
    }

    /// Panel resolution, once initialized.
    pub fn resolution(&self) -> Option<Resolution> {
        self.active.map(|a| a.resolution)
    }

    /// Current playback state.
    pub fn playback_state(&self) -> PlaybackState {
        self.playback.state()
    }

    /// Sequence ids currently resident on the device, in allocation order.
    pub fn sequences(&self) -> &[SequenceId] {
        self.pool.ids()
    }

    fn active(&self) -> Result<ActiveDevice> {
        self.active.ok_or(Error::NotInitialized { index: self.index })
    }

    /// Allocate the device and resolve its panel resolution.
    ///
    /// Succeeds as a no-op when already initialized. If the panel-type
    /// inquiry fails or reports an unsupported type, the freshly allocated
    /// device handle is freed again and no resources are retained.
    pub fn initialize(&mut self) -> Result<()> {
        if self.active.is_some() {
            return Ok(());
        }

        debug!("initializing DMD device {}", self.index);
        let handle = self.driver.device_alloc(self.index as u32)?;

        let dmd_type = match self.driver.device_inquire_dmd_type(handle) {
            Ok(dmd_type) => dmd_type,
            Err(err) => {
                self.free_after_failed_init(handle);
                return Err(err.into());
            }
        };
        let Some(resolution) = dmd_type.resolution() else {
            self.free_after_failed_init(handle);
            return Err(Error::UnsupportedDmdType(dmd_type));
        };

        debug!(
            "device {}: {:?} panel, {} resolution",
            self.index, dmd_type, resolution
        );
        self.active = Some(ActiveDevice { handle, resolution });
        Ok(())
    }

    fn free_after_failed_init(&mut self, handle: DeviceHandle) {
        if let Err(err) = self.driver.device_free(handle) {
            warn!(
                "freeing device {} after failed initialization failed: {err}",
                self.index
            );
        }
    }

    /// Release the device and everything resident on it.
    ///
    /// No-op when not initialized. The teardown order is mandatory on the
    /// hardware API: halt projection, free every sequence, then free the
    /// device. Driver failures along the way are logged and teardown
    /// continues - the session always ends uninitialized.
    pub fn release(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };

        debug!("releasing DMD device {}", self.index);
        if let Err(err) = self.driver.device_halt(active.handle) {
            warn!("halting device {} failed: {err}", self.index);
        }
        if let Err(err) = self.pool.release_all(&mut self.driver, active.handle) {
            warn!("releasing sequences on device {} failed: {err}", self.index);
        }
        if let Err(err) = self.driver.device_free(active.handle) {
            warn!("freeing device {} failed: {err}", self.index);
        }
        self.playback = PlaybackController::new();
    }

    /// Fill the panel with all-on (`white`) or all-off pixels.
    ///
    /// Allocates a 1-frame sequence, uploads it, and starts continuous
    /// projection so the panel holds the fill until stopped or replaced.
    pub fn clear(&mut self, white: bool) -> Result<()> {
        let active = self.active()?;
        let id = self
            .pool
            .allocate_standard(&mut self.driver, active.handle, 1)?;
        let fill = if white { 0xFF } else { 0x00 };
        let frames = PackedFrames::filled(active.resolution, 1, fill);
        self.upload_packed(active.handle, id, &frames)?;
        self.playback
            .start_continuous(&mut self.driver, active.handle, &self.pool, id)
    }

    /// Pack and project a single pattern continuously.
    ///
    /// `shape` must describe exactly one frame of an accepted width (see
    /// [`pack_patterns`]). The pattern stays on the panel until stopped or
    /// replaced by another continuous start.
    pub fn show_pattern(&mut self, pattern: &[u8], shape: FrameShape) -> Result<()> {
        if shape.frames != 1 {
            return Err(Error::invalid_config(
                "show_pattern takes exactly one frame",
            ));
        }
        let active = self.active()?;
        let frames = pack_patterns(pattern, shape, active.resolution)?;
        let id = self
            .pool
            .allocate_standard(&mut self.driver, active.handle, 1)?;
        self.upload_packed(active.handle, id, &frames)?;
        self.playback
            .start_continuous(&mut self.driver, active.handle, &self.pool, id)
    }

    /// Pack and upload a pattern sequence without starting playback.
    ///
    /// Blocking for the duration of the device-memory copy. Returns the id
    /// to later [`play`](Self::play) or [`release_sequence`](Self::release_sequence).
    pub fn upload_sequence(&mut self, patterns: &[u8], shape: FrameShape) -> Result<SequenceId> {
        let active = self.active()?;
        let frames = pack_patterns(patterns, shape, active.resolution)?;
        let frame_count = u32::try_from(frames.frame_count())
            .map_err(|_| Error::invalid_config("frame count exceeds device addressing"))?;

        let id = self
            .pool
            .allocate_standard(&mut self.driver, active.handle, frame_count)?;
        self.upload_packed(active.handle, id, &frames)?;
        debug!(
            "device {}: uploaded sequence {id} ({} frames, {} bytes)",
            self.index,
            frames.frame_count(),
            frames.as_bytes().len()
        );
        Ok(id)
    }

    /// Upload packed bytes into `id`, freeing the sequence on failure so
    /// no device memory is orphaned by a failed copy.
    fn upload_packed(
        &mut self,
        handle: DeviceHandle,
        id: SequenceId,
        frames: &PackedFrames,
    ) -> Result<()> {
        let frame_count = frames.frame_count() as u32;
        if let Err(err) = self
            .driver
            .seq_put(handle, id, 0, frame_count, frames.as_bytes())
        {
            if let Err(release_err) = self.pool.release(&mut self.driver, handle, id) {
                warn!("releasing sequence {id} after failed upload failed: {release_err}");
            }
            return Err(err.into());
        }
        Ok(())
    }

    /// Start playback of an uploaded sequence.
    ///
    /// `RepeatMode::Bounded(n)` plays the sequence `n` times and returns
    /// to idle on its own; `RepeatMode::Continuous` loops until
    /// [`stop`](Self::stop), replacing any continuous run already active.
    pub fn play(&mut self, id: SequenceId, frame_rate_hz: f64, mode: RepeatMode) -> Result<()> {
        let active = self.active()?;
        self.playback.run(
            &mut self.driver,
            active.handle,
            &self.pool,
            id,
            frame_rate_hz,
            mode,
        )
    }

    /// Halt projection and wait for the device to acknowledge.
    pub fn stop(&mut self) -> Result<()> {
        let active = self.active()?;
        self.playback.stop(&mut self.driver, active.handle)
    }

    /// Block until the device reports projection completion.
    pub fn wait_for_completion(&mut self) -> Result<()> {
        let active = self.active()?;
        self.playback.wait_for_completion(&mut self.driver, active.handle)
    }

    /// Non-blocking poll: has the device finished projecting?
    pub fn has_completed(&mut self) -> Result<bool> {
        let active = self.active()?;
        self.playback.has_completed(&mut self.driver, active.handle)
    }

    /// Free one uploaded sequence.
    pub fn release_sequence(&mut self, id: SequenceId) -> Result<()> {
        let active = self.active()?;
        self.pool.release(&mut self.driver, active.handle, id)
    }

    /// Free every sequence resident on the device.
    pub fn release_all_sequences(&mut self) -> Result<()> {
        let active = self.active()?;
        self.pool.release_all(&mut self.driver, active.handle)
    }
}

impl<D: DeviceDriver> Drop for DeviceSession<D> {
    fn drop(&mut self) {
        self.release();
    }
}
