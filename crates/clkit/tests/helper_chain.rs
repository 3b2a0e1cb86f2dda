//! End-to-end runs of the helper chain on the host reference runtime.
//!
//! Both workloads load their kernels from the `.cl` files shipped in
//! `src/kernels/`, exactly as an application would.

use std::path::PathBuf;

use clkit::runtime::host::{ObjectKind, RuntimeCall};
use clkit::{
    BuildStatus, ClStatus, ClkitError, DeviceType, HostRuntime, LocalMemory, NdRange,
    QueueProperties, blocking_read_slice, create_buffer, create_buffer_from, create_command_queue,
    create_context, create_context_for_platform, enqueue_nd_range_kernel, get_devices,
    get_platforms, get_vendor, load_and_build_program, load_kernel, set_kernel_args,
};

fn kernel_file(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("src/kernels").join(name)
}

// ── Vector add ──────────────────────────────────────────────────────

#[test]
fn vector_add_over_host_memory() {
    const LEN: usize = 100;
    let rt = HostRuntime::new();

    let platforms = get_platforms(&rt).unwrap();
    assert!(!platforms.is_empty());
    assert_eq!(get_vendor(&rt, &platforms[0]).unwrap(), "clkit");

    let ctx = create_context_for_platform(&rt, platforms[0], DeviceType::CPU).unwrap();
    let devices = get_devices(&ctx).unwrap();
    assert_eq!(devices.len(), 1);

    let mut a: Vec<i32> = (0..LEN as i32).map(|i| 10 + i).collect();
    let mut b: Vec<i32> = (0..LEN as i32).map(|i| 100 + i).collect();
    let in_a = create_buffer_from(&ctx, "rh", &mut a).unwrap();
    let in_b = create_buffer_from(&ctx, "rh", &mut b).unwrap();
    let out_c = create_buffer(&ctx, "w", LEN * 4, None).unwrap();

    let program = load_and_build_program(&ctx, &devices, kernel_file("vector_add.cl")).unwrap();
    let mut kernel = load_kernel(&program, "vector_add").unwrap();
    set_kernel_args(&mut kernel, (&in_a, &in_b, &out_c, LEN as i32)).unwrap();

    let queue = create_command_queue(&ctx, &devices[0], QueueProperties::default()).unwrap();
    let event = enqueue_nd_range_kernel(&queue, &kernel, NdRange::NULL, LEN, 1).unwrap();
    event.wait().unwrap();

    let mut c = vec![0i32; LEN];
    blocking_read_slice(&queue, &out_c, 0, &mut c).unwrap();
    for (i, value) in c.iter().enumerate() {
        assert_eq!(*value, 110 + 2 * i as i32, "element {i}");
    }
}

#[test]
fn vector_add_with_runtime_chosen_local_size() {
    let rt = HostRuntime::new();
    let ctx = create_context(&rt, DeviceType::ALL).unwrap();
    let devices = get_devices(&ctx).unwrap();
    let program = load_and_build_program(&ctx, &devices, kernel_file("vector_add.cl")).unwrap();
    let mut kernel = load_kernel(&program, "vector_add").unwrap();

    let mut a = [1i32; 8];
    let mut b = [2i32; 8];
    let in_a = create_buffer_from(&ctx, "rc", &mut a).unwrap();
    let in_b = create_buffer_from(&ctx, "rc", &mut b).unwrap();
    let out = create_buffer(&ctx, "rw", 32, None).unwrap();
    set_kernel_args(&mut kernel, (&in_a, &in_b, &out, 8i32)).unwrap();

    let queue = create_command_queue(&ctx, &devices[1], QueueProperties::default()).unwrap();
    enqueue_nd_range_kernel(&queue, &kernel, NdRange::NULL, 8, NdRange::NULL)
        .unwrap()
        .wait()
        .unwrap();
    let mut c = [0i32; 8];
    blocking_read_slice(&queue, &out, 0, &mut c).unwrap();
    assert_eq!(c, [3; 8]);
}

// ── Square matrix multiply ──────────────────────────────────────────

#[test]
fn matrix_times_twice_identity_doubles() {
    const SIDE: usize = 5;
    let rt = HostRuntime::new();
    let ctx = create_context(&rt, DeviceType::ALL).unwrap();
    let devices = get_devices(&ctx).unwrap();
    let program =
        load_and_build_program(&ctx, &devices, kernel_file("matrix_multiply.cl")).unwrap();
    let mut kernel = load_kernel(&program, "square_matrix_multiply").unwrap();

    let mut a = vec![0i32; SIDE * SIDE];
    let mut b = vec![0i32; SIDE * SIDE];
    for r in 0..SIDE {
        for c in 0..SIDE {
            a[r * SIDE + c] = (r as i32 + 1) * 100 + c as i32;
            b[r * SIDE + c] = if r == c { 2 } else { 0 };
        }
    }
    let expected: Vec<i32> = a.iter().map(|v| 2 * v).collect();

    let in_a = create_buffer_from(&ctx, "rh", &mut a).unwrap();
    let in_b = create_buffer_from(&ctx, "rh", &mut b).unwrap();
    let out_c = create_buffer(&ctx, "w", SIDE * SIDE * 4, None).unwrap();

    set_kernel_args(&mut kernel, (&out_c, &in_a, &in_b, SIDE as i32)).unwrap();
    let queue = create_command_queue(&ctx, &devices[0], QueueProperties::default()).unwrap();
    let event =
        enqueue_nd_range_kernel(&queue, &kernel, NdRange::NULL, (SIDE, SIDE), (1, 1)).unwrap();
    event.wait().unwrap();

    let mut c = vec![0i32; SIDE * SIDE];
    blocking_read_slice(&queue, &out_c, 0, &mut c).unwrap();
    assert_eq!(c, expected);
}

// ── Failure paths ───────────────────────────────────────────────────

#[test]
fn broken_source_fails_build_and_kernel_lookup() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.cl");
    std::fs::write(&path, "__kernel void vector_add(__global int *a {").unwrap();

    let rt = HostRuntime::new();
    let ctx = create_context(&rt, DeviceType::ALL).unwrap();
    let devices = get_devices(&ctx).unwrap();
    let err = load_and_build_program(&ctx, &devices, &path).unwrap_err();
    assert!(matches!(err, ClkitError::BuildFailed(ClStatus::BUILD_PROGRAM_FAILURE)));

    // Build a program by hand to observe its terminal status.
    let source = clkit::load_source(&path).unwrap();
    let mut program = clkit::create_program(&ctx, &[source]).unwrap();
    assert!(clkit::build_program(&mut program, &devices, "").is_err());
    assert_eq!(program.status(), BuildStatus::Failed(ClStatus::BUILD_PROGRAM_FAILURE));
    assert!(matches!(
        load_kernel(&program, "vector_add").unwrap_err(),
        ClkitError::KernelNotFound { .. }
    ));
}

#[test]
fn missing_kernel_file() {
    let rt = HostRuntime::new();
    let ctx = create_context(&rt, DeviceType::ALL).unwrap();
    let devices = get_devices(&ctx).unwrap();
    let err = load_and_build_program(&ctx, &devices, kernel_file("nope.cl")).unwrap_err();
    assert!(matches!(err, ClkitError::FileNotFound { .. }));
    assert!(!rt.calls().contains(&RuntimeCall::CreateProgram));
}

#[test]
fn binding_failure_stops_further_runtime_calls() {
    let rt = HostRuntime::new();
    let ctx = create_context(&rt, DeviceType::ALL).unwrap();
    let devices = get_devices(&ctx).unwrap();
    let program = load_and_build_program(&ctx, &devices, kernel_file("vector_add.cl")).unwrap();
    let mut kernel = load_kernel(&program, "vector_add").unwrap();
    let a = create_buffer(&ctx, "r", 16, None).unwrap();
    let b = create_buffer(&ctx, "r", 16, None).unwrap();
    let c = create_buffer(&ctx, "w", 16, None).unwrap();

    rt.inject_fault(RuntimeCall::SetKernelArg(1), ClStatus::INVALID_MEM_OBJECT);
    rt.clear_calls();
    let err = set_kernel_args(&mut kernel, (&a, &b, &c, 4i32)).unwrap_err();
    assert!(matches!(
        err,
        ClkitError::ArgBindFailed { position: 1, code: ClStatus::INVALID_MEM_OBJECT }
    ));
    assert_eq!(rt.calls(), vec![RuntimeCall::SetKernelArg(0), RuntimeCall::SetKernelArg(1)]);
    assert!(kernel.is_bound(0));
    assert!(!kernel.is_bound(1));
    assert!(!kernel.is_bound(2));

    // A kernel that is not fully bound is never submitted.
    let queue = create_command_queue(&ctx, &devices[0], QueueProperties::default()).unwrap();
    let err = enqueue_nd_range_kernel(&queue, &kernel, NdRange::NULL, 4, 1).unwrap_err();
    assert!(matches!(err, ClkitError::EnqueueFailed(ClStatus::INVALID_KERNEL_ARGS)));
}

#[test]
fn buffer_from_another_context_is_rejected() {
    let rt = HostRuntime::new();
    let ctx = create_context(&rt, DeviceType::ALL).unwrap();
    let other = create_context(&rt, DeviceType::ALL).unwrap();
    let devices = get_devices(&ctx).unwrap();
    let program = load_and_build_program(&ctx, &devices, kernel_file("vector_add.cl")).unwrap();
    let mut kernel = load_kernel(&program, "vector_add").unwrap();
    let foreign = create_buffer(&other, "r", 16, None).unwrap();

    let err = kernel.set_arg(0, &foreign).unwrap_err();
    assert!(matches!(
        err,
        ClkitError::ArgBindFailed { position: 0, code: ClStatus::INVALID_MEM_OBJECT }
    ));
}

#[test]
fn invalid_work_group_size_is_an_enqueue_failure() {
    let rt = HostRuntime::new();
    let ctx = create_context(&rt, DeviceType::ALL).unwrap();
    let devices = get_devices(&ctx).unwrap();
    let program = load_and_build_program(&ctx, &devices, kernel_file("vector_add.cl")).unwrap();
    let mut kernel = load_kernel(&program, "vector_add").unwrap();
    let a = create_buffer(&ctx, "r", 40, None).unwrap();
    let b = create_buffer(&ctx, "r", 40, None).unwrap();
    let c = create_buffer(&ctx, "w", 40, None).unwrap();
    set_kernel_args(&mut kernel, (&a, &b, &c, 10i32)).unwrap();
    let queue = create_command_queue(&ctx, &devices[0], QueueProperties::default()).unwrap();

    let err = enqueue_nd_range_kernel(&queue, &kernel, NdRange::NULL, 10, 3).unwrap_err();
    assert!(matches!(err, ClkitError::EnqueueFailed(ClStatus::INVALID_WORK_GROUP_SIZE)));
}

#[test]
fn local_memory_argument_is_accepted() {
    let rt = HostRuntime::builder()
        .platform(
            clkit::runtime::host::HostPlatformSpec::new("p", "v")
                .device(clkit::runtime::host::HostDeviceSpec::new("d", DeviceType::GPU)),
        )
        .kernel("group_sum", |item, mem| {
            let v: i32 = mem.load(0, item.global_id(0))?;
            let lid = item.local_id(0);
            mem.store(1, lid, v)?;
            if lid + 1 == item.local_size(0) {
                let sum = (0..item.local_size(0))
                    .map(|i| mem.load::<i32>(1, i))
                    .sum::<Result<i32, _>>()?;
                mem.store(2, item.group_id(0), sum)?;
            }
            Ok(())
        })
        .build();
    let ctx = create_context(&rt, DeviceType::ALL).unwrap();
    let src =
        "__kernel void group_sum(__global const int *in, __local int *tmp, __global int *out) {}";
    let mut program = clkit::create_program(&ctx, &[clkit::SourceUnit::from(src)]).unwrap();
    clkit::build_program(&mut program, &[], "").unwrap();
    let mut kernel = load_kernel(&program, "group_sum").unwrap();

    let mut input: Vec<i32> = (1..=8).collect();
    let inp = create_buffer_from(&ctx, "rc", &mut input).unwrap();
    let out = create_buffer(&ctx, "w", 8, None).unwrap();
    set_kernel_args(&mut kernel, (&inp, LocalMemory::of::<i32>(4), &out)).unwrap();

    let devices = get_devices(&ctx).unwrap();
    let queue = create_command_queue(&ctx, &devices[0], QueueProperties::default()).unwrap();
    enqueue_nd_range_kernel(&queue, &kernel, NdRange::NULL, 8, 4).unwrap().wait().unwrap();
    let mut sums = [0i32; 2];
    blocking_read_slice(&queue, &out, 0, &mut sums).unwrap();
    assert_eq!(sums, [10, 26]);
}

// ── Resource accounting ─────────────────────────────────────────────

#[test]
fn every_handle_is_released_on_success_and_failure() {
    let rt = HostRuntime::new();
    {
        let ctx = create_context(&rt, DeviceType::ALL).unwrap();
        let devices = get_devices(&ctx).unwrap();
        let program =
            load_and_build_program(&ctx, &devices, kernel_file("vector_add.cl")).unwrap();
        let mut kernel = load_kernel(&program, "vector_add").unwrap();
        let a = create_buffer(&ctx, "r", 16, None).unwrap();
        let b = create_buffer(&ctx, "r", 16, None).unwrap();
        let c = create_buffer(&ctx, "w", 16, None).unwrap();
        set_kernel_args(&mut kernel, (&a, &b, &c, 4i32)).unwrap();
        let queue = create_command_queue(&ctx, &devices[0], QueueProperties::default()).unwrap();
        let _event = enqueue_nd_range_kernel(&queue, &kernel, NdRange::NULL, 4, 1).unwrap();

        assert_eq!(rt.live(ObjectKind::Buffer), 3);
        assert_eq!(rt.live(ObjectKind::Event), 1);

        // Failed creations leave nothing behind.
        assert!(create_buffer(&ctx, "r", 0, None).is_err());
        rt.inject_fault(RuntimeCall::CreateQueue, ClStatus::OUT_OF_RESOURCES);
        assert!(create_command_queue(&ctx, &devices[0], QueueProperties::default()).is_err());
        assert_eq!(rt.live(ObjectKind::Buffer), 3);
        assert_eq!(rt.live(ObjectKind::Queue), 1);
    }
    assert_eq!(rt.live_objects(), 0);
}

// ── Launch range limits ─────────────────────────────────────────────

#[test]
fn global_offset_past_address_space_is_an_enqueue_failure() {
    let rt = HostRuntime::new();
    let ctx = create_context(&rt, DeviceType::ALL).unwrap();
    let devices = get_devices(&ctx).unwrap();
    let program = load_and_build_program(&ctx, &devices, kernel_file("vector_add.cl")).unwrap();
    let mut kernel = load_kernel(&program, "vector_add").unwrap();
    let a = create_buffer(&ctx, "r", 8, None).unwrap();
    let b = create_buffer(&ctx, "r", 8, None).unwrap();
    let c = create_buffer(&ctx, "w", 8, None).unwrap();
    set_kernel_args(&mut kernel, (&a, &b, &c, 2i32)).unwrap();
    let queue = create_command_queue(&ctx, &devices[0], QueueProperties::default()).unwrap();

    let err = enqueue_nd_range_kernel(&queue, &kernel, NdRange::d1(usize::MAX), 2, NdRange::NULL)
        .unwrap_err();
    assert!(matches!(err, ClkitError::EnqueueFailed(ClStatus::INVALID_GLOBAL_OFFSET)));

    // The last representable id is still a valid launch.
    let event =
        enqueue_nd_range_kernel(&queue, &kernel, NdRange::d1(usize::MAX - 2), 2, NdRange::NULL);
    assert!(event.is_ok());
}

// ── Multi-unit programs ─────────────────────────────────────────────

#[test]
fn program_from_several_files_exposes_every_kernel() {
    let rt = HostRuntime::new();
    let ctx = create_context(&rt, DeviceType::ALL).unwrap();
    let devices = get_devices(&ctx).unwrap();

    let sources =
        clkit::load_sources([kernel_file("vector_add.cl"), kernel_file("matrix_multiply.cl")])
            .unwrap();
    assert_eq!(sources.len(), 2);
    let mut program = clkit::create_program(&ctx, &sources).unwrap();
    clkit::build_program(&mut program, &devices, "").unwrap();

    let add = load_kernel(&program, "vector_add").unwrap();
    let mul = load_kernel(&program, "square_matrix_multiply").unwrap();
    assert_eq!((add.arity(), mul.arity()), (4, 4));
}

#[test]
fn first_unreadable_source_is_reported() {
    let missing = kernel_file("absent.cl");
    let err = clkit::load_sources([
        kernel_file("vector_add.cl"),
        missing.clone(),
        kernel_file("also_absent.cl"),
    ])
    .unwrap_err();
    match err {
        ClkitError::FileNotFound { path, .. } => assert_eq!(path, missing),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn entry_point_defined_in_two_units_fails_the_build() {
    let rt = HostRuntime::new();
    let ctx = create_context(&rt, DeviceType::ALL).unwrap();
    let devices = get_devices(&ctx).unwrap();

    let sources =
        clkit::load_sources([kernel_file("vector_add.cl"), kernel_file("vector_add.cl")]).unwrap();
    let mut program = clkit::create_program(&ctx, &sources).unwrap();
    let err = clkit::build_program(&mut program, &devices, "").unwrap_err();
    assert!(matches!(err, ClkitError::BuildFailed(ClStatus::BUILD_PROGRAM_FAILURE)));
    assert!(program.raw().build_log().contains("redefined"), "{}", program.raw().build_log());
}

#[test]
fn non_utf8_source_is_rejected_at_creation() {
    let rt = HostRuntime::new();
    let ctx = create_context(&rt, DeviceType::ALL).unwrap();
    let unit = clkit::SourceUnit::from_bytes(b"__kernel void k(int a) {}\xff".to_vec());
    let err = clkit::create_program(&ctx, &[unit]).unwrap_err();
    assert!(matches!(err, ClkitError::ProgramCreationFailed(ClStatus::INVALID_VALUE)));
}

// ── Host to device writes ───────────────────────────────────────────

#[test]
fn blocking_write_then_read_back() {
    let rt = HostRuntime::new();
    let ctx = create_context(&rt, DeviceType::ALL).unwrap();
    let devices = get_devices(&ctx).unwrap();
    let queue = create_command_queue(&ctx, &devices[0], QueueProperties::default()).unwrap();
    let mut buffer = create_buffer(&ctx, "rw", 16, None).unwrap();

    clkit::blocking_write_slice(&queue, &mut buffer, 4, &[7i32, 8]).unwrap();
    let mut back = [0i32; 4];
    blocking_read_slice(&queue, &buffer, 0, &mut back).unwrap();
    assert_eq!(back, [0, 7, 8, 0]);
}

#[test]
fn write_past_buffer_end_fails() {
    let rt = HostRuntime::new();
    let ctx = create_context(&rt, DeviceType::ALL).unwrap();
    let devices = get_devices(&ctx).unwrap();
    let queue = create_command_queue(&ctx, &devices[0], QueueProperties::default()).unwrap();
    let mut buffer = create_buffer(&ctx, "rw", 16, None).unwrap();

    let err = clkit::blocking_write_slice(&queue, &mut buffer, 12, &[1i32, 2]).unwrap_err();
    assert!(matches!(err, ClkitError::WriteFailed(ClStatus::INVALID_VALUE)));
}
