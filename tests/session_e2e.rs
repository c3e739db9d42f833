//! End-to-end tests for the session and registry lifecycle.
//!
//! These drive the full init -> upload -> play -> complete -> release
//! lifecycle against the mock driver and assert on the recorded driver
//! call order where the hardware API makes ordering mandatory.

#![cfg(feature = "testutils")]

use std::sync::{Arc, Mutex};

use dmd_ctl::mock::{Call, MockDriver, MockHandle};
use dmd_ctl::{
    DeviceRegistry, DeviceSession, DmdType, Error, FrameShape, PlaybackState, RepeatMode,
    Resolution, SequenceId,
};

fn session() -> (DeviceSession<MockDriver>, MockHandle) {
    let (driver, handle) = MockDriver::new();
    let mut session = DeviceSession::new(0, driver);
    session.initialize().expect("mock init should succeed");
    (session, handle)
}

/// A registry whose factory records the handle of every driver it makes.
fn registry(capacity: usize) -> (DeviceRegistry<MockDriver>, Arc<Mutex<Vec<MockHandle>>>) {
    let handles: Arc<Mutex<Vec<MockHandle>>> = Arc::default();
    let recorder = Arc::clone(&handles);
    let registry = DeviceRegistry::with_capacity(capacity, move |_index| {
        let (driver, handle) = MockDriver::new();
        recorder.lock().unwrap().push(handle);
        driver
    });
    (registry, handles)
}

// =============================================================================
// Initialization
// =============================================================================

#[test]
fn init_resolves_panel_resolution_and_is_idempotent() {
    let (mut session, _handle) = session();
    assert!(session.is_initialized());
    assert_eq!(session.resolution(), Some(Resolution::new(1024, 768)));

    // Second initialize is a no-op success.
    session.initialize().unwrap();
    assert!(session.is_initialized());
}

#[test]
fn supported_panel_family_resolutions() {
    for (dmd_type, expected) in [
        (DmdType::Xga055X, Resolution::new(1024, 768)),
        (DmdType::FullHd095A, Resolution::new(1920, 1080)),
        (DmdType::Disconnect, Resolution::new(1920, 1080)),
        (DmdType::Wuxga096A, Resolution::new(1920, 1200)),
    ] {
        let (driver, handle) = MockDriver::new();
        handle.set_dmd_type(dmd_type);
        let mut session = DeviceSession::new(0, driver);
        session.initialize().unwrap();
        assert_eq!(session.resolution(), Some(expected));
    }
}

#[test]
fn unsupported_panel_type_fails_init_with_no_resources_retained() {
    let (driver, handle) = MockDriver::new();
    handle.set_dmd_type(DmdType::Other(0xBEEF));
    let mut session = DeviceSession::new(0, driver);

    let err = session.initialize().unwrap_err();
    assert!(matches!(err, Error::UnsupportedDmdType(DmdType::Other(_))));
    assert!(!session.is_initialized());
    assert!(!handle.device_allocated());
    assert_eq!(
        handle.calls(),
        vec![Call::DevAlloc(0), Call::DevInquireDmdType, Call::DevFree]
    );
}

#[test]
fn uninitialized_session_rejects_operations() {
    let (driver, _handle) = MockDriver::new();
    let mut session = DeviceSession::new(1, driver);
    assert!(matches!(
        session.clear(true),
        Err(Error::NotInitialized { index: 1 })
    ));
    assert!(matches!(
        session.play(SequenceId(1), 60.0, RepeatMode::Continuous),
        Err(Error::NotInitialized { index: 1 })
    ));
    assert!(matches!(
        session.stop(),
        Err(Error::NotInitialized { index: 1 })
    ));
}

// =============================================================================
// Upload and playback
// =============================================================================

#[test]
fn upload_play_complete_release_lifecycle() {
    let (mut session, handle) = session();

    // 768 rows x 1024 columns x 5 frames, unpacked binary.
    let shape = FrameShape::new(1024, 768, 5);
    let mut patterns = vec![0u8; 1024 * 768 * 5];
    patterns[0] = 1;
    let id = session.upload_sequence(&patterns, shape).unwrap();

    let seq = handle.sequence(id).unwrap();
    assert_eq!(seq.frame_count, 5);
    assert_eq!(seq.uploaded_bytes, 128 * 768 * 5);

    session
        .play(id, 60.0, RepeatMode::from_repeat_count(3))
        .unwrap();
    assert_eq!(session.playback_state(), PlaybackState::RunningBounded);

    let seq = handle.sequence(id).unwrap();
    assert_eq!(seq.repeat, 3);
    let timing = seq.timing.unwrap();
    assert_eq!(timing.picture_us, 16_666);
    assert_eq!(timing.synch_pulse_width_us, 8_333);

    assert!(!session.has_completed().unwrap());
    handle.complete_projection();
    assert!(session.has_completed().unwrap());
    assert_eq!(session.playback_state(), PlaybackState::Idle);

    session.release_sequence(id).unwrap();
    assert!(session.sequences().is_empty());
    assert!(matches!(
        session.release_sequence(id),
        Err(Error::UnknownSequence(stale)) if stale == id
    ));
}

#[test]
fn packed_input_uploads_verbatim() {
    let (mut session, handle) = session();
    let shape = FrameShape::new(128, 768, 2);
    let patterns = vec![0xA5u8; 128 * 768 * 2];
    let id = session.upload_sequence(&patterns, shape).unwrap();
    assert_eq!(handle.sequence(id).unwrap().uploaded_bytes, 128 * 768 * 2);
}

#[test]
fn repeat_count_zero_means_continuous() {
    let (mut session, _handle) = session();
    let shape = FrameShape::new(1024, 768, 2);
    let patterns = vec![0u8; 1024 * 768 * 2];
    let id = session.upload_sequence(&patterns, shape).unwrap();

    session
        .play(id, 120.0, RepeatMode::from_repeat_count(0))
        .unwrap();
    assert_eq!(session.playback_state(), PlaybackState::RunningContinuous);

    session.stop().unwrap();
    assert_eq!(session.playback_state(), PlaybackState::Idle);
}

#[test]
fn play_rejects_sequences_the_pool_does_not_track() {
    let (mut session, _handle) = session();
    let err = session
        .play(SequenceId(42), 30.0, RepeatMode::Bounded(1))
        .unwrap_err();
    assert!(matches!(err, Error::UnknownSequence(SequenceId(42))));
    assert_eq!(session.playback_state(), PlaybackState::Idle);
}

#[test]
fn upload_failure_frees_the_allocation() {
    let (mut session, handle) = session();
    handle.fail_seq_put(true);

    let shape = FrameShape::new(1024, 768, 1);
    let patterns = vec![0u8; 1024 * 768];
    let err = session.upload_sequence(&patterns, shape).unwrap_err();
    assert!(matches!(err, Error::Driver(_)));
    assert!(session.sequences().is_empty());
    assert_eq!(handle.allocated_sequence_count(), 0);
}

// =============================================================================
// Continuous projection: clear, show_pattern, exclusivity
// =============================================================================

#[test]
fn clear_white_projects_an_all_on_frame_continuously() {
    let (mut session, handle) = session();
    session.clear(true).unwrap();

    assert_eq!(session.playback_state(), PlaybackState::RunningContinuous);
    assert_eq!(session.sequences().len(), 1);
    let id = session.sequences()[0];
    let seq = handle.sequence(id).unwrap();
    assert_eq!(seq.frame_count, 1);
    assert_eq!(seq.uploaded_bytes, 128 * 768);
    assert!(handle
        .calls()
        .iter()
        .any(|c| matches!(c, Call::ProjStartContinuous(s) if *s == id)));
}

#[test]
fn show_pattern_requires_a_single_frame() {
    let (mut session, _handle) = session();
    let patterns = vec![0u8; 1024 * 768 * 2];
    assert!(matches!(
        session.show_pattern(&patterns, FrameShape::new(1024, 768, 2)),
        Err(Error::InvalidConfig(_))
    ));
}

#[test]
fn continuous_starts_are_exclusive() {
    let (mut session, handle) = session();
    session.clear(false).unwrap();
    handle.clear_calls();

    // A second continuous start must stop the first: halt + wait, then start.
    let pattern = vec![1u8; 1024 * 768];
    session
        .show_pattern(&pattern, FrameShape::single(1024, 768))
        .unwrap();

    let calls = handle.calls();
    let halt = calls.iter().position(|c| *c == Call::ProjHalt).unwrap();
    let wait = calls.iter().position(|c| *c == Call::ProjWait).unwrap();
    let start = calls
        .iter()
        .position(|c| matches!(c, Call::ProjStartContinuous(_)))
        .unwrap();
    assert!(halt < wait && wait < start);
    assert_eq!(session.playback_state(), PlaybackState::RunningContinuous);
}

#[test]
fn clear_upload_failure_leaves_no_orphaned_sequence() {
    let (mut session, handle) = session();
    handle.fail_seq_put(true);

    assert!(session.clear(true).is_err());
    assert!(session.sequences().is_empty());
    assert_eq!(handle.allocated_sequence_count(), 0);
    assert_eq!(session.playback_state(), PlaybackState::Idle);
}

// =============================================================================
// Teardown
// =============================================================================

#[test]
fn release_orders_halt_sequences_device() {
    let (mut session, handle) = session();
    let shape = FrameShape::new(1024, 768, 1);
    let patterns = vec![0u8; 1024 * 768];
    let id = session.upload_sequence(&patterns, shape).unwrap();
    handle.clear_calls();

    session.release();
    assert!(!session.is_initialized());
    assert_eq!(
        handle.calls(),
        vec![Call::DevHalt, Call::SeqFree(id), Call::DevFree]
    );
    assert!(!handle.device_allocated());
}

#[test]
fn dropping_a_session_releases_the_device() {
    let (session, handle) = session();
    drop(session);
    assert!(!handle.device_allocated());
}

// =============================================================================
// Registry
// =============================================================================

#[test]
fn registry_init_and_dispatch() {
    let (mut registry, handles) = registry(2);
    registry.init(0).unwrap();
    assert!(registry.is_initialized(0).unwrap());
    assert!(!registry.is_initialized(1).unwrap());

    let session = registry.session(0).unwrap();
    assert_eq!(session.resolution(), Some(Resolution::new(1024, 768)));

    registry.release(0).unwrap();
    assert!(!registry.is_initialized(0).unwrap());
    assert!(!handles.lock().unwrap()[0].device_allocated());
}

#[test]
fn registry_init_replaces_and_releases_the_previous_session() {
    let (mut registry, handles) = registry(1);
    registry.init(0).unwrap();
    registry.init(0).unwrap();

    let handles = handles.lock().unwrap();
    assert_eq!(handles.len(), 2);
    // The first driver saw a full teardown before the second was built.
    assert_eq!(
        handles[0].calls().last(),
        Some(&Call::DevFree)
    );
    assert!(!handles[0].device_allocated());
    assert!(handles[1].device_allocated());
}

#[test]
fn registry_init_failure_leaves_the_slot_empty() {
    let handles: Arc<Mutex<Vec<MockHandle>>> = Arc::default();
    let recorder = Arc::clone(&handles);
    let mut registry = DeviceRegistry::with_capacity(1, move |_index| {
        let (driver, handle) = MockDriver::new();
        handle.set_dmd_type(DmdType::Other(1));
        recorder.lock().unwrap().push(handle);
        driver
    });

    assert!(matches!(
        registry.init(0),
        Err(Error::UnsupportedDmdType(_))
    ));
    assert!(!registry.is_initialized(0).unwrap());
    assert!(!handles.lock().unwrap()[0].device_allocated());
}

#[test]
fn dropping_the_registry_releases_every_session() {
    let (mut registry, handles) = registry(2);
    registry.init(0).unwrap();
    registry.init(1).unwrap();
    drop(registry);

    let handles = handles.lock().unwrap();
    assert!(handles.iter().all(|h| !h.device_allocated()));
}
