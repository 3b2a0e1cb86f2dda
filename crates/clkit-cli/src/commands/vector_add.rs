use anyhow::{Result, ensure};
use clkit::{
    ClkitConfig, NdRange, Runtime, blocking_read_slice, create_buffer, create_buffer_from,
    create_command_queue, enqueue_nd_range_kernel, kernels, load_kernel, set_kernel_args,
};
use tracing::info;

use super::{build_bundled, open_context, select_device};

/// Add `10 + i` and `100 + i` element-wise over `len` elements.
pub fn run<R: Runtime>(rt: &R, config: &ClkitConfig, len: usize) -> Result<Vec<i32>> {
    ensure!(len > 0 && len <= i32::MAX as usize, "vector length {len} out of range");
    let n = len as i32;
    let mut a: Vec<i32> = (0..n).map(|i| 10 + i).collect();
    let mut b: Vec<i32> = (0..n).map(|i| 100 + i).collect();

    let context = open_context(rt, config)?;
    let device = select_device(&context, config)?;
    let program = build_bundled(
        &context,
        &device,
        config,
        kernels::VECTOR_ADD_FILE,
        kernels::VECTOR_ADD_SOURCE,
    )?;
    let mut kernel = load_kernel(&program, "vector_add")?;

    let in_a = create_buffer_from(&context, "rc", &mut a)?;
    let in_b = create_buffer_from(&context, "rc", &mut b)?;
    let out = create_buffer(&context, "w", len * size_of::<i32>(), None)?;
    set_kernel_args(&mut kernel, (&in_a, &in_b, &out, n))?;

    let queue = create_command_queue(&context, &device, config.queue_properties())?;
    enqueue_nd_range_kernel(&queue, &kernel, NdRange::NULL, len, NdRange::NULL)?.wait()?;

    let mut c = vec![0i32; len];
    blocking_read_slice(&queue, &out, 0, &mut c)?;
    info!(len, "vector add complete");
    Ok(c)
}

pub fn print(sum: &[i32]) {
    for (i, value) in sum.iter().enumerate() {
        println!("C[{i}] = {value}");
    }
}
