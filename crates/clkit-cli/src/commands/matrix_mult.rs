use anyhow::{Result, bail};
use clkit::{
    ClkitConfig, NdRange, Runtime, blocking_read_slice, create_buffer, create_buffer_from,
    create_command_queue, enqueue_nd_range_kernel, kernels, load_kernel, set_kernel_args,
};
use tracing::info;

use super::{build_bundled, open_context, select_device};

/// Square the `side`×`side` matrix holding `0..side²` in row-major order.
pub fn run<R: Runtime>(rt: &R, config: &ClkitConfig, side: usize) -> Result<Vec<i32>> {
    let cells = side.checked_mul(side).filter(|c| (1..=i32::MAX as usize).contains(c));
    let Some(cells) = cells else {
        bail!("matrix side {side} out of range");
    };
    let mut a: Vec<i32> = (0..cells as i32).collect();
    let mut b = a.clone();

    let context = open_context(rt, config)?;
    let device = select_device(&context, config)?;
    let program = build_bundled(
        &context,
        &device,
        config,
        kernels::MATRIX_MULTIPLY_FILE,
        kernels::MATRIX_MULTIPLY_SOURCE,
    )?;
    let mut kernel = load_kernel(&program, "square_matrix_multiply")?;

    let out = create_buffer(&context, "w", cells * size_of::<i32>(), None)?;
    let in_a = create_buffer_from(&context, "rc", &mut a)?;
    let in_b = create_buffer_from(&context, "rc", &mut b)?;
    set_kernel_args(&mut kernel, (&out, &in_a, &in_b, side as i32))?;

    let queue = create_command_queue(&context, &device, config.queue_properties())?;
    enqueue_nd_range_kernel(&queue, &kernel, NdRange::NULL, (side, side), NdRange::NULL)?
        .wait()?;

    let mut c = vec![0i32; cells];
    blocking_read_slice(&queue, &out, 0, &mut c)?;
    info!(side, "matrix multiply complete");
    Ok(c)
}

pub fn print(product: &[i32], side: usize) {
    for row in product.chunks(side.max(1)) {
        let line: Vec<String> = row.iter().map(|v| format!("{v:>8}")).collect();
        println!("{}", line.join(" "));
    }
}
