// RESAMPLE - separable kernel scaler for single planes
//
// Each axis gets a precomputed list of (source index, weight) taps per
// destination sample. Downscaling widens the kernel by the scale ratio so it
// also acts as the low-pass filter. Nearest neighbour keeps a plain index map.

use crate::planner::ScaleAlgorithm;

use super::picture::Plane;

// ============================================================================
// Kernels
// ============================================================================

fn support(algorithm: ScaleAlgorithm) -> f32 {
    match algorithm {
        ScaleAlgorithm::Nearest => 0.5,
        ScaleAlgorithm::Bilinear => 1.0,
        ScaleAlgorithm::Bicubic => 2.0,
        ScaleAlgorithm::Lanczos => 3.0,
    }
}

fn kernel(algorithm: ScaleAlgorithm, x: f32) -> f32 {
    let x = x.abs();
    match algorithm {
        ScaleAlgorithm::Nearest => {
            if x <= 0.5 {
                1.0
            } else {
                0.0
            }
        }
        ScaleAlgorithm::Bilinear => (1.0 - x).max(0.0),
        ScaleAlgorithm::Bicubic => {
            // Keys cubic, a = -0.5
            let a = -0.5;
            if x < 1.0 {
                (a + 2.0) * x * x * x - (a + 3.0) * x * x + 1.0
            } else if x < 2.0 {
                a * x * x * x - 5.0 * a * x * x + 8.0 * a * x - 4.0 * a
            } else {
                0.0
            }
        }
        ScaleAlgorithm::Lanczos => {
            if x < 1e-6 {
                1.0
            } else if x < 3.0 {
                let px = std::f32::consts::PI * x;
                3.0 * px.sin() * (px / 3.0).sin() / (px * px)
            } else {
                0.0
            }
        }
    }
}

// ============================================================================
// Taps
// ============================================================================

struct Taps {
    entries: Vec<Vec<(usize, f32)>>,
}

impl Taps {
    fn new(src: usize, dst: usize, algorithm: ScaleAlgorithm) -> Self {
        let ratio = src as f32 / dst as f32;

        if algorithm == ScaleAlgorithm::Nearest {
            let entries = (0..dst)
                .map(|i| {
                    let s = (((i as f32 + 0.5) * ratio) as usize).min(src - 1);
                    vec![(s, 1.0)]
                })
                .collect();
            return Self { entries };
        }

        let filter_scale = ratio.max(1.0);
        let radius = support(algorithm) * filter_scale;

        let entries = (0..dst)
            .map(|i| {
                let center = (i as f32 + 0.5) * ratio - 0.5;
                let first = (center - radius).ceil() as i64;
                let last = (center + radius).floor() as i64;

                let mut taps: Vec<(usize, f32)> = (first..=last)
                    .map(|j| {
                        let w = kernel(algorithm, (j as f32 - center) / filter_scale);
                        (j.clamp(0, src as i64 - 1) as usize, w)
                    })
                    .filter(|&(_, w)| w != 0.0)
                    .collect();

                let sum: f32 = taps.iter().map(|&(_, w)| w).sum();
                if sum.abs() > f32::EPSILON {
                    for tap in &mut taps {
                        tap.1 /= sum;
                    }
                } else {
                    let nearest = center.round().clamp(0.0, (src - 1) as f32) as usize;
                    taps = vec![(nearest, 1.0)];
                }
                taps
            })
            .collect();

        Self { entries }
    }
}

// ============================================================================
// Public API
// ============================================================================

/// Resample `src` to `dst_width` x `dst_height`.
pub(crate) fn resample(src: &Plane, dst_width: usize, dst_height: usize, algorithm: ScaleAlgorithm) -> Plane {
    if src.width == dst_width && src.height == dst_height {
        return src.clone();
    }
    if dst_width == 0 || dst_height == 0 || src.width == 0 || src.height == 0 {
        return Plane::new(dst_width, dst_height);
    }

    let x_taps = Taps::new(src.width, dst_width, algorithm);
    let y_taps = Taps::new(src.height, dst_height, algorithm);

    // Horizontal pass into a float intermediate of src.height rows
    let mut tmp = vec![0f32; dst_width * src.height];
    for y in 0..src.height {
        let row = src.row(y);
        let out = &mut tmp[y * dst_width..(y + 1) * dst_width];
        for (x, taps) in x_taps.entries.iter().enumerate() {
            out[x] = taps.iter().map(|&(s, w)| row[s] as f32 * w).sum();
        }
    }

    // Vertical pass
    let mut dst = Plane::new(dst_width, dst_height);
    for (y, taps) in y_taps.entries.iter().enumerate() {
        let out = dst.row_mut(y);
        for (x, value) in out.iter_mut().enumerate() {
            let v: f32 = taps.iter().map(|&(s, w)| tmp[s * dst_width + x] * w).sum();
            *value = v.round().clamp(0.0, 255.0) as u8;
        }
    }
    dst
}

/// Resample each field separately and weave them back, so lines of one field
/// never bleed into the other.
pub(crate) fn resample_fields(src: &Plane, dst_width: usize, dst_height: usize, algorithm: ScaleAlgorithm) -> Plane {
    if src.height < 2 || dst_height < 2 {
        return resample(src, dst_width, dst_height, algorithm);
    }
    let top = resample(&src.field(0), dst_width, dst_height.div_ceil(2), algorithm);
    let bottom = resample(&src.field(1), dst_width, dst_height / 2, algorithm);
    Plane::weave(&top, &bottom, dst_height)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: usize, height: usize) -> Plane {
        let mut plane = Plane::new(width, height);
        for y in 0..height {
            for (x, v) in plane.row_mut(y).iter_mut().enumerate() {
                *v = ((x * 255) / width.max(1)) as u8;
            }
        }
        plane
    }

    #[test]
    fn flat_planes_stay_flat() {
        let plane = Plane::filled(16, 9, 77);
        for algorithm in [
            ScaleAlgorithm::Nearest,
            ScaleAlgorithm::Bilinear,
            ScaleAlgorithm::Bicubic,
            ScaleAlgorithm::Lanczos,
        ] {
            let up = resample(&plane, 40, 21, algorithm);
            assert_eq!((up.width, up.height), (40, 21));
            assert!(up.data.iter().all(|&v| v == 77), "{:?}", algorithm);

            let down = resample(&plane, 5, 3, algorithm);
            assert!(down.data.iter().all(|&v| v == 77), "{:?}", algorithm);
        }
    }

    #[test]
    fn gradients_stay_monotonic() {
        let plane = gradient(32, 4);
        let out = resample(&plane, 80, 4, ScaleAlgorithm::Bilinear);
        let row = out.row(0);
        assert!(row.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn nearest_picks_source_samples() {
        let mut plane = Plane::new(2, 1);
        plane.data = vec![10, 200];
        let out = resample(&plane, 4, 1, ScaleAlgorithm::Nearest);
        assert_eq!(out.data, vec![10, 10, 200, 200]);
    }

    #[test]
    fn fields_do_not_mix() {
        let mut plane = Plane::new(4, 8);
        for y in 0..8 {
            plane.row_mut(y).fill(if y % 2 == 0 { 20 } else { 220 });
        }
        let out = resample_fields(&plane, 4, 12, ScaleAlgorithm::Bicubic);
        for y in 0..12 {
            let expected = if y % 2 == 0 { 20 } else { 220 };
            assert!(out.row(y).iter().all(|&v| v == expected), "row {}", y);
        }
    }
}
