//! End-to-end sorts on the host backend.
//!
//! The CPU device runs in strict mode, so every test here also proves the
//! recorded command stream is free of synchronization hazards.

use parsort_engine::backend::{Command, CpuSortDevice};
use parsort_engine::sort::validate::{verify_output, verify_stable};
use parsort_engine::sort::{
    DispatchMode, Kernel, Slot, SortConfig, SortEngine, SortError, SortRequest, SourceData,
};

fn sort_once(
    source: &SourceData,
    config: SortConfig,
    request: SortRequest,
) -> (Vec<u32>, Option<Vec<u32>>, CpuSortDevice) {
    let mut engine = SortEngine::new(config, source).expect("valid config");
    let mut device = CpuSortDevice::new(engine.layout(), source);

    engine.copy_source_data(&mut device, &request);
    let output = engine.sort(&mut device, request);
    assert_eq!(output.slot, Slot::A);

    let (keys, payload) = device.read_output(&output);
    (keys, payload, device)
}

fn request(key_set: usize, payload: bool, mode: DispatchMode) -> SortRequest {
    SortRequest {
        key_set,
        payload,
        mode,
    }
}

fn count_dispatches(device: &CpuSortDevice, kernel: Kernel) -> usize {
    device
        .commands()
        .iter()
        .filter(|c| match c {
            Command::Dispatch { kernel: k, .. } | Command::DispatchIndirect { kernel: k, .. } => {
                *k == kernel
            }
            _ => false,
        })
        .count()
}

#[test]
fn sorts_keys_with_payload() {
    let source = SourceData::from_key_sets(vec![vec![5, 3, 3, 1, 4, 1, 5, 9, 2, 6]]);
    for mode in [DispatchMode::Direct, DispatchMode::Indirect] {
        let (keys, payload, _) = sort_once(&source, SortConfig::default(), request(0, true, mode));
        assert_eq!(keys, [1, 1, 2, 3, 3, 4, 5, 5, 6, 9]);
        assert_eq!(payload, Some(vec![3, 5, 8, 1, 2, 4, 0, 6, 9, 7]));
    }
}

#[test]
fn keys_only_sort_leaves_payload_alone() {
    let source = SourceData::from_key_sets(vec![vec![u32::MAX, 0, 0x8000_0000, 7]]);
    let (keys, payload, _) =
        sort_once(&source, SortConfig::default(), request(0, false, DispatchMode::Direct));
    assert_eq!(keys, [0, 7, 0x8000_0000, u32::MAX]);
    assert_eq!(payload, None);
}

#[test]
fn every_radix_pass_is_recorded() {
    let source = SourceData::random(&[2000], 7);
    for mode in [DispatchMode::Direct, DispatchMode::Indirect] {
        let (_, _, device) = sort_once(&source, SortConfig::default(), request(0, true, mode));
        for kernel in [Kernel::Count, Kernel::Reduce, Kernel::Scan, Kernel::ScanAdd] {
            assert_eq!(count_dispatches(&device, kernel), 8, "{kernel:?} in {mode:?}");
        }
        assert_eq!(count_dispatches(&device, Kernel::ScatterPayload), 8);
        assert_eq!(count_dispatches(&device, Kernel::Scatter), 0);

        let setups = count_dispatches(&device, Kernel::SetupIndirect);
        assert_eq!(setups, usize::from(mode == DispatchMode::Indirect));
        assert!(device.hazards().is_empty());
    }
}

#[test]
fn indirect_dispatch_reads_device_arguments() {
    let source = SourceData::random(&[5000], 11);
    let (_, _, device) =
        sort_once(&source, SortConfig::default(), request(0, false, DispatchMode::Indirect));
    let indirect = device
        .commands()
        .iter()
        .filter(|c| matches!(c, Command::DispatchIndirect { .. }))
        .count();
    // Count, Reduce, ScanAdd and Scatter per pass; Scan is always one group.
    assert_eq!(indirect, 8 * 4);
}

// ── edge sizes ────────────────────────────────────────────────────────────

#[test]
fn empty_key_set_sorts_to_nothing() {
    let source = SourceData::from_key_sets(vec![vec![], vec![4, 2]]);
    for mode in [DispatchMode::Direct, DispatchMode::Indirect] {
        let (keys, payload, device) =
            sort_once(&source, SortConfig::default(), request(0, true, mode));
        assert!(keys.is_empty());
        assert_eq!(payload, Some(vec![]));
        assert!(device.hazards().is_empty());
    }
}

#[test]
fn direct_empty_sort_records_no_dispatch() {
    let source = SourceData::from_key_sets(vec![vec![]]);
    let (_, _, device) =
        sort_once(&source, SortConfig::default(), request(0, false, DispatchMode::Direct));
    assert!(device.commands().is_empty());
}

#[test]
fn single_key_is_unchanged() {
    let source = SourceData::from_key_sets(vec![vec![42]]);
    let (keys, payload, _) =
        sort_once(&source, SortConfig::default(), request(0, true, DispatchMode::Indirect));
    assert_eq!(keys, [42]);
    assert_eq!(payload, Some(vec![0]));
}

#[test]
fn block_boundaries_sort_correctly() {
    let sizes = [511, 512, 513, 1024, 1025];
    let source = SourceData::random(&sizes, 3);
    for key_set in 0..sizes.len() {
        let (keys, payload, _) =
            sort_once(&source, SortConfig::default(), request(key_set, true, DispatchMode::Direct));
        verify_output(source.keys(key_set), source.payload(), &keys, payload.as_deref())
            .unwrap_or_else(|e| panic!("key set {key_set}: {e}"));
    }
}

#[test]
fn capped_thread_groups_still_cover_every_key() {
    let source = SourceData::random(&[100_000], 5);
    let config = SortConfig {
        max_thread_groups: 7,
        ..SortConfig::default()
    };
    for mode in [DispatchMode::Direct, DispatchMode::Indirect] {
        let (keys, payload, _) = sort_once(&source, config.clone(), request(0, true, mode));
        verify_output(source.keys(0), source.payload(), &keys, payload.as_deref())
            .expect("sorted output");
    }
}

// ── properties ────────────────────────────────────────────────────────────

#[test]
fn direct_and_indirect_agree() {
    let source = SourceData::random(&[30_000], 99);
    let direct = sort_once(&source, SortConfig::default(), request(0, true, DispatchMode::Direct));
    let indirect =
        sort_once(&source, SortConfig::default(), request(0, true, DispatchMode::Indirect));
    assert_eq!(direct.0, indirect.0);
    assert_eq!(direct.1, indirect.1);
}

#[test]
fn equal_keys_keep_source_order() {
    let keys: Vec<u32> = (0..4096u32).map(|i| (i * 7919) % 13).collect();
    let source = SourceData::from_key_sets(vec![keys]);
    let (keys, payload, _) =
        sort_once(&source, SortConfig::default(), request(0, true, DispatchMode::Direct));
    let payload = payload.expect("payload sorted");
    assert_eq!(verify_stable(&keys, &payload), Ok(()));
}

#[test]
fn resorting_a_sorted_array_is_a_no_op() {
    let source = SourceData::shuffled(&[3000], 1);
    let mut engine = SortEngine::new(SortConfig::default(), &source).expect("valid config");
    let mut device = CpuSortDevice::new(engine.layout(), &source);
    let req = request(0, true, DispatchMode::Direct);

    engine.copy_source_data(&mut device, &req);
    let first = engine.sort(&mut device, req);
    let once = device.read_output(&first);

    let second = engine.sort(&mut device, req);
    assert_eq!(device.read_output(&second), once);
    assert_eq!(once.0, (0..3000).collect::<Vec<u32>>());
}

#[test]
fn consecutive_frames_rotate_constant_slots() {
    let source = SourceData::shuffled(&[700, 1500], 2);
    let mut engine = SortEngine::new(SortConfig::default(), &source).expect("valid config");
    let mut device = CpuSortDevice::new(engine.layout(), &source);

    for frame in 0..5 {
        engine.set_key_set(frame % 2);
        engine.set_sort_payload(frame % 3 == 0);
        let req = engine.frame_request();

        engine.copy_source_data_for_frame(&mut device);
        let output = engine.sort(&mut device, req);
        let (keys, payload) = device.read_output(&output);
        verify_output(source.keys(req.key_set), source.payload(), &keys, payload.as_deref())
            .unwrap_or_else(|e| panic!("frame {frame}: {e}"));
    }
    assert_eq!(engine.frame(), 5);
}

#[test]
fn readback_copies_the_sorted_output() {
    let source = SourceData::random(&[900], 4);
    let config = SortConfig {
        validation: true,
        ..SortConfig::default()
    };
    let mut engine = SortEngine::new(config, &source).expect("valid config");
    let mut device = CpuSortDevice::new(engine.layout(), &source);
    let req = request(0, true, DispatchMode::Indirect);

    engine.copy_source_data(&mut device, &req);
    let output = engine.sort(&mut device, req);
    engine.record_readback(&mut device, &output);

    let (keys, payload) = device.read_output(&output);
    let readback = parsort_engine::sort::BufferId::ReadbackKeys;
    assert_eq!(&device.words(readback)[..900], keys.as_slice());
    let payload = payload.expect("payload sorted");
    let readback = parsort_engine::sort::BufferId::ReadbackPayload;
    assert_eq!(&device.words(readback)[..900], payload.as_slice());
}

// ── misuse ────────────────────────────────────────────────────────────────

#[test]
#[should_panic(expected = "payload buffers were not allocated")]
fn payload_sort_without_payload_buffers_panics() {
    let source = SourceData::from_key_sets(vec![vec![2, 1]]);
    let config = SortConfig {
        payload_buffers: false,
        ..SortConfig::default()
    };
    let mut engine = SortEngine::new(config, &source).expect("valid config");
    let mut device = CpuSortDevice::new(engine.layout(), &source);
    engine.sort(&mut device, request(0, true, DispatchMode::Direct));
}

#[test]
fn invalid_configs_are_rejected() {
    let source = SourceData::from_key_sets(vec![vec![1, 2, 3]]);
    let bad_key_set = SortConfig {
        key_set: 1,
        ..SortConfig::default()
    };
    assert_eq!(
        SortEngine::new(bad_key_set, &source).err(),
        Some(SortError::KeySetOutOfRange {
            index: 1,
            available: 1
        })
    );

    let no_groups = SortConfig {
        max_thread_groups: 0,
        ..SortConfig::default()
    };
    assert_eq!(SortEngine::new(no_groups, &source).err(), Some(SortError::ZeroThreadGroups));
}

#[test]
fn oversized_problem_is_rejected() {
    // 16000 groups reduce to 32 blocks per bin: 512 scan values.
    let source = SourceData::from_key_sets(vec![vec![0; 16_000 * 512]]);
    let config = SortConfig {
        max_thread_groups: 16_000,
        ..SortConfig::default()
    };
    assert!(matches!(
        SortEngine::new(config, &source),
        Err(SortError::ScanCapacityExceeded { .. })
    ));
}
