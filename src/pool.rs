//! Sequence pool: bookkeeping for device-resident sequences.
//!
//! Every id in the pool denotes a sequence currently allocated on the
//! device. Pool membership and device residency move together: an id is
//! inserted in the same operation that allocates it and removed in the
//! same operation that frees it.

use log::warn;

use crate::driver::{
    BinaryMode, DataFormat, DeviceDriver, DeviceHandle, DriverError, SeqControl, SequenceId,
};
use crate::error::{Error, Result};

/// The set of sequence ids allocated on one device session.
#[derive(Debug, Default)]
pub struct SequencePool {
    ids: Vec<SequenceId>,
}

impl SequencePool {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `id` is currently allocated on the device.
    pub fn contains(&self, id: SequenceId) -> bool {
        self.ids.contains(&id)
    }

    /// Number of tracked sequences.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the pool tracks no sequences.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Tracked sequence ids, in allocation order.
    pub fn ids(&self) -> &[SequenceId] {
        &self.ids
    }

    /// Allocate a standard binary sequence of `frame_count` frames.
    ///
    /// The sequence is configured for 1-bit depth, single repeat, the full
    /// frame range, top-down binary data, and uninterrupted binary mode
    /// (no inter-frame dark phase, maximizing the achievable frame rate).
    /// If any control parameter fails after allocation, the sequence is
    /// freed again before the error is reported.
    pub fn allocate_standard<D: DeviceDriver>(
        &mut self,
        driver: &mut D,
        device: DeviceHandle,
        frame_count: u32,
    ) -> Result<SequenceId> {
        if frame_count == 0 {
            return Err(Error::invalid_config("frame count must be at least 1"));
        }

        let id = driver.seq_alloc(device, 1, frame_count)?;

        let controls = [
            SeqControl::Repeat(1),
            SeqControl::BitPlanes(1),
            SeqControl::FirstFrame(0),
            SeqControl::LastFrame(frame_count - 1),
            SeqControl::DataFormat(DataFormat::BinaryTopDown),
            SeqControl::BinaryMode(BinaryMode::Uninterrupted),
        ];
        for control in controls {
            if let Err(err) = driver.seq_control(device, id, control) {
                // No orphaned device memory: free before reporting.
                if let Err(free_err) = driver.seq_free(device, id) {
                    warn!("freeing sequence {id} after control failure failed: {free_err}");
                }
                return Err(err.into());
            }
        }

        self.ids.push(id);
        Ok(id)
    }

    /// Free one sequence and stop tracking it.
    ///
    /// Ids that are not pool members are rejected without touching the
    /// driver, so a repeated release fails cleanly. For members, the pool
    /// entry is removed even when the device-side free reports an error,
    /// keeping pool membership and device residency in step.
    pub fn release<D: DeviceDriver>(
        &mut self,
        driver: &mut D,
        device: DeviceHandle,
        id: SequenceId,
    ) -> Result<()> {
        let Some(pos) = self.ids.iter().position(|&tracked| tracked == id) else {
            return Err(Error::UnknownSequence(id));
        };
        self.ids.remove(pos);

        if let Err(err) = driver.seq_free(device, id) {
            warn!("device-side free of sequence {id} failed: {err}");
            return Err(err.into());
        }
        Ok(())
    }

    /// Free every tracked sequence and clear the pool.
    ///
    /// Continues past individual failures; the first driver error is
    /// reported after the pool has been cleared.
    pub fn release_all<D: DeviceDriver>(
        &mut self,
        driver: &mut D,
        device: DeviceHandle,
    ) -> Result<()> {
        let mut first_failure: Option<DriverError> = None;
        for id in self.ids.drain(..) {
            if let Err(err) = driver.seq_free(device, id) {
                warn!("device-side free of sequence {id} failed: {err}");
                first_failure.get_or_insert(err);
            }
        }
        match first_failure {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }
}
