// src/utils/fixed_point.rs
use crate::raster::{is_nodata, NODATA};

/// int16 no-data value of fixed-point rasters
pub const FIXED_POINT_NODATA: i16 = -10000;

/// Scale floats to int16. No data maps to `nodata_value`; valid pixels are
/// clamped to the int16 range and kept off the sentinel.
pub fn to_fixed_point(data: &[f32], scale_factor: i32, nodata_value: i16) -> Vec<i16> {
    data.iter()
        .map(|&value| {
            if is_nodata(value) {
                return nodata_value;
            }
            let scaled = (value * scale_factor as f32)
                .round()
                .clamp(i16::MIN as f32 + 1.0, i16::MAX as f32) as i16;
            if scaled == nodata_value {
                scaled + 1
            } else {
                scaled
            }
        })
        .collect()
}

/// Inverse of [`to_fixed_point`], up to rounding.
pub fn from_fixed_point(data: &[i16], scale_factor: i32, nodata_value: i16) -> Vec<f32> {
    data.iter()
        .map(|&value| {
            if value == nodata_value {
                NODATA
            } else {
                value as f32 / scale_factor as f32
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_point_scaling() {
        let fixed = to_fixed_point(&[0.6, -0.25, NODATA, 1.5], 10000, FIXED_POINT_NODATA);
        assert_eq!(fixed, vec![6000, -2500, FIXED_POINT_NODATA, 15000]);
    }

    #[test]
    fn test_fixed_point_avoids_sentinel() {
        let fixed = to_fixed_point(&[-1.0, 9.0], 10000, FIXED_POINT_NODATA);
        assert_eq!(fixed, vec![-9999, i16::MAX]);
        let back = from_fixed_point(&[FIXED_POINT_NODATA, 5000], 10000, FIXED_POINT_NODATA);
        assert_eq!(back, vec![NODATA, 0.5]);
    }
}
