//! Device registry: a fixed-capacity table of owned sessions.
//!
//! Multiple independent DMD units are addressed by a small integer index.
//! The registry owns one optional [`DeviceSession`] per slot and a factory
//! that produces a driver instance for a given index, so each session owns
//! its driver exclusively. Every operation bounds-checks the index before
//! touching storage. Dropping the registry releases every live session.

use log::debug;

use crate::driver::DeviceDriver;
use crate::error::{Error, Result};
use crate::session::DeviceSession;

/// Default number of registry slots - the maximum number of concurrently
/// connected DMD units supported.
pub const MAX_CONNECTED_DEVICES: usize = 2;

type DriverFactory<D> = Box<dyn Fn(usize) -> D + Send>;

/// Process-wide table mapping device index to an owned session.
pub struct DeviceRegistry<D: DeviceDriver> {
    slots: Box<[Option<DeviceSession<D>>]>,
    driver_factory: DriverFactory<D>,
}

impl<D: DeviceDriver> DeviceRegistry<D> {
    /// Create a registry with [`MAX_CONNECTED_DEVICES`] slots.
    ///
    /// `driver_factory` produces the driver instance a new session at a
    /// given index will own.
    pub fn new(driver_factory: impl Fn(usize) -> D + Send + 'static) -> Self {
        Self::with_capacity(MAX_CONNECTED_DEVICES, driver_factory)
    }

    /// Create a registry with a custom slot count.
    pub fn with_capacity(
        capacity: usize,
        driver_factory: impl Fn(usize) -> D + Send + 'static,
    ) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            slots: slots.into_boxed_slice(),
            driver_factory: Box::new(driver_factory),
        }
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index < self.slots.len() {
            Ok(())
        } else {
            Err(Error::IndexOutOfRange {
                index,
                capacity: self.slots.len(),
            })
        }
    }

    /// Create and initialize a session at `index`.
    ///
    /// Any existing session at that index is released first. If
    /// initialization fails the slot is left empty and the error is
    /// returned.
    pub fn init(&mut self, index: usize) -> Result<()> {
        self.check_index(index)?;
        if self.slots[index].take().is_some() {
            debug!("replacing existing session at index {index}");
        }

        let mut session = DeviceSession::new(index, (self.driver_factory)(index));
        session.initialize()?;
        self.slots[index] = Some(session);
        Ok(())
    }

    /// Whether the slot at `index` holds an initialized session.
    pub fn is_initialized(&self, index: usize) -> Result<bool> {
        self.check_index(index)?;
        Ok(self.slots[index]
            .as_ref()
            .is_some_and(DeviceSession::is_initialized))
    }

    /// Borrow the session at `index` for device operations.
    pub fn session(&mut self, index: usize) -> Result<&mut DeviceSession<D>> {
        self.check_index(index)?;
        self.slots[index]
            .as_mut()
            .ok_or(Error::NotInitialized { index })
    }

    /// Release the session at `index` and clear the slot.
    pub fn release(&mut self, index: usize) -> Result<()> {
        self.check_index(index)?;
        match self.slots[index].take() {
            // Dropping the session performs the full teardown.
            Some(_session) => Ok(()),
            None => Err(Error::NotInitialized { index }),
        }
    }

    /// Release every live session. Also performed on drop.
    pub fn release_all(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot = None;
        }
    }
}
