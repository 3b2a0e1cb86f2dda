//! The subcommand workloads on the in-process host runtime.

use clkit::runtime::host::{HostDeviceSpec, HostPlatformSpec};
use clkit::{Backend, ClkitConfig, ClkitError, DeviceType, HostRuntime, kernels};
use clkit_cli::commands::{matrix_mult, platforms, vector_add};

fn host_config() -> ClkitConfig {
    ClkitConfig { backend: Backend::Host, ..Default::default() }
}

#[test]
fn vector_add_sums_the_seeded_inputs() {
    let rt = HostRuntime::new();
    let c = vector_add::run(&rt, &host_config(), 100).unwrap();
    assert_eq!(c.len(), 100);
    for (i, v) in c.iter().enumerate() {
        assert_eq!(*v, 110 + 2 * i as i32);
    }
}

#[test]
fn matrix_mult_squares_the_seeded_matrix() {
    let rt = HostRuntime::new();
    let side = 5;
    let c = matrix_mult::run(&rt, &host_config(), side).unwrap();
    let a: Vec<i32> = (0..25).collect();
    for row in 0..side {
        for col in 0..side {
            let expected: i32 = (0..side).map(|k| a[row * side + k] * a[k * side + col]).sum();
            assert_eq!(c[row * side + col], expected, "C[{row}][{col}]");
        }
    }
}

#[test]
fn kernel_dir_sources_are_used() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(kernels::VECTOR_ADD_FILE), kernels::VECTOR_ADD_SOURCE).unwrap();
    let cfg = ClkitConfig { kernel_dir: Some(dir.path().to_path_buf()), ..host_config() };

    let rt = HostRuntime::new();
    let c = vector_add::run(&rt, &cfg, 4).unwrap();
    assert_eq!(c, vec![110, 112, 114, 116]);

    let err = matrix_mult::run(&rt, &cfg, 2).unwrap_err();
    assert!(
        matches!(err.downcast_ref::<ClkitError>(), Some(ClkitError::FileNotFound { .. })),
        "{err:#}"
    );
}

#[test]
fn device_index_out_of_range_is_reported() {
    let rt = HostRuntime::new();
    let cfg = ClkitConfig { device_index: 9, ..host_config() };
    let err = vector_add::run(&rt, &cfg, 4).unwrap_err();
    assert!(err.to_string().contains("device index 9"), "{err}");
}

#[test]
fn empty_runtime_has_no_platform() {
    let rt = HostRuntime::builder().build();
    let err = vector_add::run(&rt, &host_config(), 4).unwrap_err();
    assert!(matches!(err.downcast_ref::<ClkitError>(), Some(ClkitError::NoPlatformAvailable)));
    assert!(platforms::collect(&rt, &host_config()).unwrap().is_empty());
}

#[test]
fn platform_report_lists_matching_devices() {
    let rt = HostRuntime::builder()
        .platform(
            HostPlatformSpec::new("alpha", "Vendor A")
                .device(HostDeviceSpec::new("cpu0", DeviceType::CPU))
                .device(HostDeviceSpec::new("gpu0", DeviceType::GPU)),
        )
        .platform(HostPlatformSpec::new("beta", "Vendor B"))
        .reference_kernels()
        .build();
    let cfg = ClkitConfig { device_type: DeviceType::GPU, ..host_config() };

    let reports = platforms::collect(&rt, &cfg).unwrap();
    assert_eq!(reports.len(), 2);
    assert_eq!((reports[0].name.as_str(), reports[0].vendor.as_str()), ("alpha", "Vendor A"));
    assert_eq!(reports[0].devices.len(), 1);
    assert_eq!(reports[0].devices[0].name, "gpu0");
    assert!(reports[1].devices.is_empty());
}
