//! Numeric primitives shared by the calibration and reconstruction steps.
//!
//! These mirror the behaviour of the usual array-library helpers:
//! - **Local mean**: block reduction with zero padding at the trailing edges
//! - **Median (reflect)**: `size`-wide window anchored at the centre, reflected borders
//! - **Median (zero)**: odd square kernel, zero padding, used as the frame pre-filter

use ndarray::{s, Array2, ArrayView2};

/// Reduce a 2D array by averaging non-overlapping `(rows, cols)` blocks.
///
/// Trailing blocks that run past the edge are padded with zeros, so the
/// output shape is `(ceil(h / rows), ceil(w / cols))` and edge blocks are
/// divided by the full block area.
pub fn downscale_local_mean(data: ArrayView2<'_, f32>, factors: (usize, usize)) -> Array2<f32> {
    let (fy, fx) = (factors.0.max(1), factors.1.max(1));
    if fy == 1 && fx == 1 {
        return data.to_owned();
    }

    let (h, w) = data.dim();
    let out_h = (h + fy - 1) / fy;
    let out_w = (w + fx - 1) / fx;
    let area = (fy * fx) as f32;

    let mut output = Array2::<f32>::zeros((out_h, out_w));
    for ((row, col), value) in data.indexed_iter() {
        output[[row / fy, col / fx]] += *value;
    }
    output.mapv_inplace(|v| v / area);
    output
}

/// Median filter with a `size × size` window and reflected borders.
///
/// The window covers offsets `-(size / 2) ..= size - 1 - size / 2`. For an
/// even window the upper of the two middle values is taken.
pub fn median_filter_reflect(data: ArrayView2<'_, f32>, size: usize) -> Array2<f32> {
    let size = size.max(1);
    let (h, w) = data.dim();
    let origin = (size / 2) as isize;
    let rank = (size * size) / 2;

    let mut window = Vec::with_capacity(size * size);
    Array2::from_shape_fn((h, w), |(row, col)| {
        window.clear();
        for dy in 0..size as isize {
            let r = reflect(row as isize + dy - origin, h);
            for dx in 0..size as isize {
                let c = reflect(col as isize + dx - origin, w);
                window.push(data[[r, c]]);
            }
        }
        window.select_nth_unstable_by(rank, f32::total_cmp);
        window[rank]
    })
}

/// Median filter with an odd `kernel × kernel` window and zero padding.
pub fn median_filter_zero(data: ArrayView2<'_, f32>, kernel: usize) -> Array2<f32> {
    let kernel = kernel.max(1);
    let (h, w) = data.dim();
    let half = (kernel / 2) as isize;
    let rank = (kernel * kernel) / 2;

    let mut window = Vec::with_capacity(kernel * kernel);
    Array2::from_shape_fn((h, w), |(row, col)| {
        window.clear();
        for dy in -half..=half {
            let r = row as isize + dy;
            for dx in -half..=half {
                let c = col as isize + dx;
                let inside = r >= 0 && c >= 0 && (r as usize) < h && (c as usize) < w;
                window.push(if inside { data[[r as usize, c as usize]] } else { 0.0 });
            }
        }
        window.select_nth_unstable_by(rank, f32::total_cmp);
        window[rank]
    })
}

/// Mirror a frame left to right.
pub fn flip_lr(data: ArrayView2<'_, f32>) -> Array2<f32> {
    data.slice(s![.., ..;-1]).to_owned()
}

/// Population standard deviation of `a - b` over all elements.
///
/// Both views must have the same shape.
pub fn std_of_difference(a: ArrayView2<'_, f32>, b: ArrayView2<'_, f32>) -> f64 {
    debug_assert_eq!(a.dim(), b.dim());
    let n = a.len();
    if n == 0 {
        return 0.0;
    }

    let mean = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (*x as f64) - (*y as f64))
        .sum::<f64>()
        / n as f64;
    let var = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = (*x as f64) - (*y as f64) - mean;
            d * d
        })
        .sum::<f64>()
        / n as f64;
    var.sqrt()
}

/// `n` evenly spaced samples from `start` to `stop`, both inclusive.
pub fn linspace(start: f64, stop: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (n - 1) as f64;
            (0..n).map(|i| start + step * i as f64).collect()
        }
    }
}

/// Map an out-of-range index back inside `0..len` by reflection about the edge.
#[inline]
fn reflect(mut idx: isize, len: usize) -> usize {
    let len = len as isize;
    if len == 1 {
        return 0;
    }
    loop {
        if idx < 0 {
            idx = -idx - 1;
        } else if idx >= len {
            idx = 2 * len - idx - 1;
        } else {
            return idx as usize;
        }
    }
}
