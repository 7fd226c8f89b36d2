use crate::engine::{EngineError, EngineResult};
use crate::soft::chain::FilterOptions;
use crate::soft::picture::Picture;

use super::{LinkProps, VideoFilter};

const ORDERS: &[(&str, i64)] = &[("bff", 0), ("tff", 1)];

/// `fieldorder=tff|bff`: swap field dominance by shifting the picture one
/// line. Progressive pictures and pictures already in order pass through.
pub struct FieldOrder {
    top_field_first: bool,
}

impl FieldOrder {
    pub const OPTIONS: &'static [&'static str] = &["order"];

    pub fn new(top_field_first: bool) -> Self {
        Self { top_field_first }
    }

    pub fn from_options(opts: &FilterOptions) -> EngineResult<Self> {
        match opts.get_enum("order", ORDERS)?.unwrap_or(1) {
            0 => Ok(Self::new(false)),
            1 => Ok(Self::new(true)),
            other => Err(EngineError::InvalidArgument(format!("fieldorder: invalid order {}", other))),
        }
    }
}

impl VideoFilter for FieldOrder {
    fn name(&self) -> &str {
        "fieldorder"
    }

    fn configure(&mut self, input: LinkProps) -> EngineResult<LinkProps> {
        Ok(input)
    }

    fn filter_frame(&mut self, mut picture: Picture) -> EngineResult<Vec<Picture>> {
        if !picture.interlaced || picture.top_field_first == self.top_field_first {
            return Ok(vec![picture]);
        }

        for plane in &mut picture.planes {
            let h = plane.height;
            if h < 2 {
                continue;
            }
            if self.top_field_first {
                // Shift up; the last line repeats the new line two above it
                for y in 0..h {
                    if y + 1 < h {
                        plane.copy_row(y + 1, y);
                    } else {
                        plane.copy_row(y.saturating_sub(2), y);
                    }
                }
            } else {
                // Shift down; the first line takes the one two below it
                for y in (0..h).rev() {
                    if y > 0 {
                        plane.copy_row(y - 1, y);
                    } else {
                        plane.copy_row(2.min(h - 1), 0);
                    }
                }
            }
        }

        picture.top_field_first = self.top_field_first;
        Ok(vec![picture])
    }
}
