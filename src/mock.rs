//! Mock device driver for tests.
//!
//! [`MockDriver`] implements [`DeviceDriver`] against in-memory state and
//! records every call it receives. The paired [`MockHandle`] shares that
//! state, so a test can hand the driver to a session and still script
//! failures, finish projections, and assert on the recorded call order
//! afterwards.
//!
//! Compiled for this crate's own tests and, under the `testutils` feature,
//! for downstream test suites.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::driver::{
    BinaryMode, DataFormat, DeviceDriver, DeviceHandle, DmdType, DriverError, DriverResult,
    FrameTiming, ProjectionState, SeqControl, SequenceId,
};

/// One driver call, as recorded by the mock.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    DevAlloc(u32),
    DevInquireDmdType,
    DevHalt,
    DevFree,
    SeqAlloc { bit_planes: u32, frame_count: u32 },
    SeqControl(SequenceId, SeqControl),
    SeqMinPictureTime(SequenceId),
    SeqTiming(SequenceId, FrameTiming),
    SeqPut { sequence: SequenceId, bytes: usize },
    SeqFree(SequenceId),
    ProjStart(SequenceId),
    ProjStartContinuous(SequenceId),
    ProjHalt,
    ProjWait,
    ProjState,
}

/// Device-side state of one mock sequence.
#[derive(Debug, Clone)]
pub struct MockSequence {
    pub frame_count: u32,
    pub repeat: u32,
    pub bit_planes: u32,
    pub first_frame: u32,
    pub last_frame: u32,
    pub data_format: Option<DataFormat>,
    pub binary_mode: Option<BinaryMode>,
    pub timing: Option<FrameTiming>,
    pub uploaded_bytes: usize,
}

impl MockSequence {
    fn new(frame_count: u32) -> Self {
        Self {
            frame_count,
            repeat: 0,
            bit_planes: 0,
            first_frame: 0,
            last_frame: 0,
            data_format: None,
            binary_mode: None,
            timing: None,
            uploaded_bytes: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Projection {
    Idle,
    Running { continuous: bool },
}

#[derive(Debug, Default)]
struct Failures {
    device_alloc: bool,
    seq_alloc: bool,
    seq_control: bool,
    seq_timing: bool,
    seq_put: bool,
    seq_free: bool,
    proj_start: bool,
    proj_halt: bool,
}

#[derive(Debug)]
struct MockState {
    dmd_type: DmdType,
    min_picture_time_us: u32,
    next_device: u32,
    next_sequence: u32,
    device: Option<DeviceHandle>,
    sequences: HashMap<SequenceId, MockSequence>,
    projection: Projection,
    calls: Vec<Call>,
    fail: Failures,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            dmd_type: DmdType::Xga07A,
            min_picture_time_us: 44,
            next_device: 1,
            next_sequence: 1,
            device: None,
            sequences: HashMap::new(),
            projection: Projection::Idle,
            calls: Vec::new(),
            fail: Failures::default(),
        }
    }
}

impl MockState {
    fn check_device(&self, device: DeviceHandle, op: &'static str) -> DriverResult<()> {
        if self.device == Some(device) {
            Ok(())
        } else {
            Err(DriverError::Rejected { op, status: -1 })
        }
    }

    fn sequence_mut(
        &mut self,
        sequence: SequenceId,
        op: &'static str,
    ) -> DriverResult<&mut MockSequence> {
        self.sequences
            .get_mut(&sequence)
            .ok_or(DriverError::Rejected { op, status: -3 })
    }

    fn expected_frame_bytes(&self) -> usize {
        self.dmd_type
            .resolution()
            .map(|r| r.frame_bytes())
            .unwrap_or(0)
    }
}

/// Mock [`DeviceDriver`] implementation. See the module docs.
#[derive(Debug)]
pub struct MockDriver {
    state: Arc<Mutex<MockState>>,
}

/// Shared-state handle for scripting and inspecting a [`MockDriver`].
#[derive(Debug, Clone)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockDriver {
    /// Create a mock driver and its inspection handle.
    pub fn new() -> (Self, MockHandle) {
        let state = Arc::new(Mutex::new(MockState::default()));
        (
            Self {
                state: Arc::clone(&state),
            },
            MockHandle { state },
        )
    }
}

impl MockHandle {
    /// All calls recorded since construction or the last
    /// [`clear_calls`](Self::clear_calls).
    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Forget the recorded calls.
    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    /// Device-side state of an allocated sequence.
    pub fn sequence(&self, id: SequenceId) -> Option<MockSequence> {
        self.state.lock().unwrap().sequences.get(&id).cloned()
    }

    /// Number of sequences currently allocated on the mock device.
    pub fn allocated_sequence_count(&self) -> usize {
        self.state.lock().unwrap().sequences.len()
    }

    /// Whether the mock device is currently allocated.
    pub fn device_allocated(&self) -> bool {
        self.state.lock().unwrap().device.is_some()
    }

    /// Current projection state, as the state inquiry would report it.
    pub fn projection_state(&self) -> ProjectionState {
        match self.state.lock().unwrap().projection {
            Projection::Idle => ProjectionState::Idle,
            Projection::Running { .. } => ProjectionState::Active,
        }
    }

    /// Finish the running projection, as the device does when a bounded
    /// sequence plays out its repeat count.
    pub fn complete_projection(&self) {
        self.state.lock().unwrap().projection = Projection::Idle;
    }

    /// Panel type reported by the device-type inquiry.
    pub fn set_dmd_type(&self, dmd_type: DmdType) {
        self.state.lock().unwrap().dmd_type = dmd_type;
    }

    /// Minimum picture time reported by the sequence inquiry.
    pub fn set_min_picture_time(&self, us: u32) {
        self.state.lock().unwrap().min_picture_time_us = us;
    }

    pub fn fail_device_alloc(&self, fail: bool) {
        self.state.lock().unwrap().fail.device_alloc = fail;
    }

    pub fn fail_seq_alloc(&self, fail: bool) {
        self.state.lock().unwrap().fail.seq_alloc = fail;
    }

    pub fn fail_seq_control(&self, fail: bool) {
        self.state.lock().unwrap().fail.seq_control = fail;
    }

    pub fn fail_seq_timing(&self, fail: bool) {
        self.state.lock().unwrap().fail.seq_timing = fail;
    }

    pub fn fail_seq_put(&self, fail: bool) {
        self.state.lock().unwrap().fail.seq_put = fail;
    }

    pub fn fail_seq_free(&self, fail: bool) {
        self.state.lock().unwrap().fail.seq_free = fail;
    }

    pub fn fail_proj_start(&self, fail: bool) {
        self.state.lock().unwrap().fail.proj_start = fail;
    }

    pub fn fail_proj_halt(&self, fail: bool) {
        self.state.lock().unwrap().fail.proj_halt = fail;
    }
}

impl DeviceDriver for MockDriver {
    fn device_alloc(&mut self, device_number: u32) -> DriverResult<DeviceHandle> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::DevAlloc(device_number));
        if state.fail.device_alloc {
            return Err(DriverError::DeviceUnavailable(device_number));
        }
        if state.device.is_some() {
            return Err(DriverError::DeviceUnavailable(device_number));
        }
        let handle = DeviceHandle(state.next_device);
        state.next_device += 1;
        state.device = Some(handle);
        Ok(handle)
    }

    fn device_inquire_dmd_type(&mut self, device: DeviceHandle) -> DriverResult<DmdType> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::DevInquireDmdType);
        state.check_device(device, "device_inquire")?;
        Ok(state.dmd_type)
    }

    fn device_halt(&mut self, device: DeviceHandle) -> DriverResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::DevHalt);
        state.check_device(device, "device_halt")?;
        state.projection = Projection::Idle;
        Ok(())
    }

    fn device_free(&mut self, device: DeviceHandle) -> DriverResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::DevFree);
        state.check_device(device, "device_free")?;
        state.device = None;
        state.sequences.clear();
        Ok(())
    }

    fn seq_alloc(
        &mut self,
        device: DeviceHandle,
        bit_planes: u32,
        frame_count: u32,
    ) -> DriverResult<SequenceId> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::SeqAlloc {
            bit_planes,
            frame_count,
        });
        state.check_device(device, "seq_alloc")?;
        if state.fail.seq_alloc {
            return Err(DriverError::OutOfMemory);
        }
        let id = SequenceId(state.next_sequence);
        state.next_sequence += 1;
        state.sequences.insert(id, MockSequence::new(frame_count));
        Ok(id)
    }

    fn seq_control(
        &mut self,
        device: DeviceHandle,
        sequence: SequenceId,
        control: SeqControl,
    ) -> DriverResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::SeqControl(sequence, control));
        state.check_device(device, "seq_control")?;
        if state.fail.seq_control {
            return Err(DriverError::Rejected {
                op: "seq_control",
                status: -2,
            });
        }
        let seq = state.sequence_mut(sequence, "seq_control")?;
        match control {
            SeqControl::Repeat(n) => seq.repeat = n,
            SeqControl::BitPlanes(n) => seq.bit_planes = n,
            SeqControl::FirstFrame(n) => seq.first_frame = n,
            SeqControl::LastFrame(n) => seq.last_frame = n,
            SeqControl::DataFormat(f) => seq.data_format = Some(f),
            SeqControl::BinaryMode(m) => seq.binary_mode = Some(m),
        }
        Ok(())
    }

    fn seq_min_picture_time(
        &mut self,
        device: DeviceHandle,
        sequence: SequenceId,
    ) -> DriverResult<u32> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::SeqMinPictureTime(sequence));
        state.check_device(device, "seq_inquire")?;
        state.sequence_mut(sequence, "seq_inquire")?;
        Ok(state.min_picture_time_us)
    }

    fn seq_timing(
        &mut self,
        device: DeviceHandle,
        sequence: SequenceId,
        timing: &FrameTiming,
    ) -> DriverResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::SeqTiming(sequence, *timing));
        state.check_device(device, "seq_timing")?;
        if state.fail.seq_timing {
            return Err(DriverError::Rejected {
                op: "seq_timing",
                status: -2,
            });
        }
        state.sequence_mut(sequence, "seq_timing")?.timing = Some(*timing);
        Ok(())
    }

    fn seq_put(
        &mut self,
        device: DeviceHandle,
        sequence: SequenceId,
        first_frame: u32,
        frame_count: u32,
        data: &[u8],
    ) -> DriverResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::SeqPut {
            sequence,
            bytes: data.len(),
        });
        state.check_device(device, "seq_put")?;
        if state.fail.seq_put {
            return Err(DriverError::Rejected {
                op: "seq_put",
                status: -2,
            });
        }
        let expected = state.expected_frame_bytes() * frame_count as usize;
        let seq = state.sequence_mut(sequence, "seq_put")?;
        if first_frame + frame_count > seq.frame_count {
            return Err(DriverError::Rejected {
                op: "seq_put",
                status: -4,
            });
        }
        if data.len() != expected {
            return Err(DriverError::Rejected {
                op: "seq_put",
                status: -5,
            });
        }
        seq.uploaded_bytes = data.len();
        Ok(())
    }

    fn seq_free(&mut self, device: DeviceHandle, sequence: SequenceId) -> DriverResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::SeqFree(sequence));
        state.check_device(device, "seq_free")?;
        if state.fail.seq_free {
            return Err(DriverError::Rejected {
                op: "seq_free",
                status: -2,
            });
        }
        state
            .sequences
            .remove(&sequence)
            .map(|_| ())
            .ok_or(DriverError::Rejected {
                op: "seq_free",
                status: -3,
            })
    }

    fn proj_start(&mut self, device: DeviceHandle, sequence: SequenceId) -> DriverResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::ProjStart(sequence));
        state.check_device(device, "proj_start")?;
        if state.fail.proj_start {
            return Err(DriverError::Rejected {
                op: "proj_start",
                status: -2,
            });
        }
        state.sequence_mut(sequence, "proj_start")?;
        state.projection = Projection::Running { continuous: false };
        Ok(())
    }

    fn proj_start_continuous(
        &mut self,
        device: DeviceHandle,
        sequence: SequenceId,
    ) -> DriverResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::ProjStartContinuous(sequence));
        state.check_device(device, "proj_start_continuous")?;
        if state.fail.proj_start {
            return Err(DriverError::Rejected {
                op: "proj_start_continuous",
                status: -2,
            });
        }
        state.sequence_mut(sequence, "proj_start_continuous")?;
        state.projection = Projection::Running { continuous: true };
        Ok(())
    }

    fn proj_halt(&mut self, device: DeviceHandle) -> DriverResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::ProjHalt);
        state.check_device(device, "proj_halt")?;
        if state.fail.proj_halt {
            return Err(DriverError::Rejected {
                op: "proj_halt",
                status: -2,
            });
        }
        Ok(())
    }

    fn proj_wait(&mut self, device: DeviceHandle) -> DriverResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::ProjWait);
        state.check_device(device, "proj_wait")?;
        state.projection = Projection::Idle;
        Ok(())
    }

    fn proj_state(&mut self, device: DeviceHandle) -> DriverResult<ProjectionState> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::ProjState);
        state.check_device(device, "proj_inquire")?;
        Ok(match state.projection {
            Projection::Idle => ProjectionState::Idle,
            Projection::Running { .. } => ProjectionState::Active,
        })
    }
}
