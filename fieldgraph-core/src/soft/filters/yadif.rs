// YADIF - temporal/spatial adaptive deinterlacer
//
// Keeps a three picture window (prev, cur, next). Each output keeps one field
// of `cur` and rebuilds the other: the spatial prediction from the lines above
// and below is clamped to the range the temporal neighbours allow. The window
// adds one picture of latency; flushing emits the last picture with `next`
// standing in for itself.

use crate::engine::{EngineError, EngineResult};
use crate::format::Rational;
use crate::soft::chain::FilterOptions;
use crate::soft::picture::{Picture, Plane};

use super::{LinkProps, VideoFilter};

const MODES: &[(&str, i64)] = &[
    ("send_frame", 0),
    ("send_field", 1),
    ("send_frame_nospatial", 2),
    ("send_field_nospatial", 3),
];
const PARITIES: &[(&str, i64)] = &[("tff", 0), ("bff", 1), ("auto", -1)];
const DEINTS: &[(&str, i64)] = &[("all", 0), ("interlaced", 1)];

/// `yadif=mode:parity:deint`
pub struct Yadif {
    field_rate: bool,
    spatial_check: bool,
    parity: Option<bool>,
    interlaced_only: bool,
    prev: Option<Picture>,
    cur: Option<Picture>,
    next: Option<Picture>,
}

impl Yadif {
    pub const OPTIONS: &'static [&'static str] = &["mode", "parity", "deint"];

    pub fn new(field_rate: bool) -> Self {
        Self {
            field_rate,
            spatial_check: true,
            parity: None,
            interlaced_only: false,
            prev: None,
            cur: None,
            next: None,
        }
    }

    pub fn from_options(opts: &FilterOptions) -> EngineResult<Self> {
        let mode = opts.get_enum("mode", MODES)?.unwrap_or(0);
        if !(0..=3).contains(&mode) {
            return Err(EngineError::InvalidArgument(format!("yadif: invalid mode {}", mode)));
        }
        let parity = match opts.get_enum("parity", PARITIES)?.unwrap_or(-1) {
            -1 => None,
            0 => Some(true),
            1 => Some(false),
            other => return Err(EngineError::InvalidArgument(format!("yadif: invalid parity {}", other))),
        };
        let interlaced_only = match opts.get_enum("deint", DEINTS)?.unwrap_or(0) {
            0 => false,
            1 => true,
            other => return Err(EngineError::InvalidArgument(format!("yadif: invalid deint {}", other))),
        };

        Ok(Self {
            field_rate: mode & 1 == 1,
            spatial_check: mode & 2 == 0,
            parity,
            interlaced_only,
            prev: None,
            cur: None,
            next: None,
        })
    }

    fn emit(&self) -> Vec<Picture> {
        let (Some(cur), Some(next)) = (self.cur.as_ref(), self.next.as_ref()) else {
            return Vec::new();
        };
        let prev = self.prev.as_ref().unwrap_or(cur);

        let fields = if self.field_rate { 2 } else { 1 };
        let pts = |second: usize| {
            if self.field_rate {
                cur.pts * 2 + second as i64
            } else {
                cur.pts
            }
        };

        if self.interlaced_only && !cur.interlaced {
            return (0..fields)
                .map(|second| {
                    let mut out = cur.clone();
                    out.pts = pts(second);
                    out
                })
                .collect();
        }

        let tff = self
            .parity
            .unwrap_or(if cur.interlaced { cur.top_field_first } else { true });

        (0..fields)
            .map(|second| {
                // Field kept from `cur`: 0 = top (even lines)
                let parity = (!tff as usize) ^ second;
                let planes = (0..cur.planes.len())
                    .map(|i| {
                        filter_plane(
                            &prev.planes[i],
                            &cur.planes[i],
                            &next.planes[i],
                            parity,
                            tff,
                            self.spatial_check,
                        )
                    })
                    .collect();
                let mut out = cur.with_planes(cur.width, cur.height, planes);
                out.pts = pts(second);
                out.interlaced = false;
                out.top_field_first = false;
                out
            })
            .collect()
    }
}

impl VideoFilter for Yadif {
    fn name(&self) -> &str {
        "yadif"
    }

    fn configure(&mut self, input: LinkProps) -> EngineResult<LinkProps> {
        if input.height < 3 {
            return Err(EngineError::InvalidArgument(format!(
                "yadif: video of {} lines is too small",
                input.height
            )));
        }
        if !self.field_rate {
            return Ok(input);
        }
        Ok(LinkProps {
            frame_rate: Rational::new(input.frame_rate.num * 2, input.frame_rate.den),
            time_base: Rational::new(input.time_base.num, input.time_base.den * 2),
            ..input
        })
    }

    fn filter_frame(&mut self, picture: Picture) -> EngineResult<Vec<Picture>> {
        self.prev = self.cur.take();
        self.cur = self.next.take();
        self.next = Some(picture);
        Ok(self.emit())
    }

    fn flush(&mut self) -> EngineResult<Vec<Picture>> {
        let Some(last) = self.next.take() else {
            return Ok(Vec::new());
        };
        self.prev = self.cur.take();
        self.next = Some(last.clone());
        self.cur = Some(last);
        let out = self.emit();

        self.prev = None;
        self.cur = None;
        self.next = None;
        Ok(out)
    }
}

fn filter_plane(prev: &Plane, cur: &Plane, next: &Plane, parity: usize, tff: bool, spatial_check: bool) -> Plane {
    let (w, h) = (cur.width, cur.height);
    if h < 2 {
        return cur.clone();
    }

    // Temporal neighbours of the missing field
    let (prev2, next2) = if (parity ^ tff as usize) == 1 {
        (prev, cur)
    } else {
        (cur, next)
    };

    let mut out = Plane::new(w, h);
    for y in 0..h {
        if y % 2 == parity {
            out.row_mut(y).copy_from_slice(cur.row(y));
            continue;
        }

        let up = if y >= 1 { y - 1 } else { y + 1 };
        let down = if y + 1 < h { y + 1 } else { y - 1 };
        let far = match (y.checked_sub(2), y + 2 < h) {
            (Some(up2), true) if spatial_check => Some((up2, y + 2)),
            _ => None,
        };

        for x in 0..w {
            let c = cur.at(x, up) as i32;
            let e = cur.at(x, down) as i32;
            let p2 = prev2.at(x, y) as i32;
            let n2 = next2.at(x, y) as i32;
            let d = (p2 + n2) >> 1;

            let temporal_diff0 = (p2 - n2).abs();
            let temporal_diff1 = ((prev.at(x, up) as i32 - c).abs() + (prev.at(x, down) as i32 - e).abs()) >> 1;
            let temporal_diff2 = ((next.at(x, up) as i32 - c).abs() + (next.at(x, down) as i32 - e).abs()) >> 1;
            let mut diff = (temporal_diff0 >> 1).max(temporal_diff1).max(temporal_diff2);

            let mut spatial_pred = edge_directed(cur, x, up, down, c, e);

            if let Some((up2, down2)) = far {
                let b = (prev2.at(x, up2) as i32 + next2.at(x, up2) as i32) >> 1;
                let f = (prev2.at(x, down2) as i32 + next2.at(x, down2) as i32) >> 1;
                let max = (d - e).max(d - c).max((b - c).min(f - e));
                let min = (d - e).min(d - c).min((b - c).max(f - e));
                diff = diff.max(min).max(-max);
            }

            spatial_pred = spatial_pred.clamp(d - diff, d + diff);
            out.row_mut(y)[x] = spatial_pred.clamp(0, 255) as u8;
        }
    }
    out
}

/// Average of the best matching pair along -2..=2 pixel diagonals.
fn edge_directed(cur: &Plane, x: usize, up: usize, down: usize, c: i32, e: i32) -> i32 {
    let w = cur.width as i64;
    let px = |row: usize, dx: i64| -> i32 { cur.at((x as i64 + dx).clamp(0, w - 1) as usize, row) as i32 };
    let score = |j: i64| -> i32 { (-1..=1).map(|k| (px(up, j + k) - px(down, -j + k)).abs()).sum() };

    let mut best_pred = (c + e) >> 1;
    let mut best_score = (px(up, -1) - px(down, -1)).abs() + (c - e).abs() + (px(up, 1) - px(down, 1)).abs() - 1;

    for direction in [-1i64, 1] {
        for step in 1..=2 {
            let j = direction * step;
            let s = score(j);
            if s >= best_score {
                break;
            }
            best_score = s;
            best_pred = (px(up, j) + px(down, -j)) >> 1;
        }
    }
    best_pred
}
