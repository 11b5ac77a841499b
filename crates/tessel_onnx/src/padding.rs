//! Resolution of interchange padding attributes to the symmetric padding the
//! native kernels take, plus the odd leftover applied separately.

use tessel_core::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoPad {
    NotSet,
    SameUpper,
    SameLower,
    Valid,
}

impl AutoPad {
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "NOTSET" | "" => Ok(AutoPad::NotSet),
            "SAME_UPPER" => Ok(AutoPad::SameUpper),
            "SAME_LOWER" => Ok(AutoPad::SameLower),
            "VALID" => Ok(AutoPad::Valid),
            other => Err(Error::InvalidArgument(format!("unknown auto_pad value {}", other))),
        }
    }
}

/// Symmetric `[pad_h, pad_w]` plus odd padding `[top, left, bottom, right]`.
pub type Padding = ([usize; 2], [usize; 4]);

/// Splits explicit pads `[h_begin, w_begin, h_end, w_end]` into the shared
/// part and the leftover on either side.
pub fn split_pads(pads: &[usize; 4]) -> Padding {
    let [hb, wb, he, we] = *pads;
    let (ph, pw) = (hb.min(he), wb.min(we));
    ([ph, pw], [hb - ph, wb - pw, he - ph, we - pw])
}

/// Padding for `SAME_*`/`VALID` over 2-D `spatial` extents. For `SAME_*` the
/// output extent is `ceil(in / stride)`; an odd total goes to the end
/// (`SAME_UPPER`) or the beginning (`SAME_LOWER`).
pub fn get_padding_shape(auto_pad: AutoPad, spatial: [usize; 2], kernel: [usize; 2], stride: [usize; 2]) -> Result<Padding> {
    let mut begin = [0usize; 2];
    let mut end = [0usize; 2];
    match auto_pad {
        AutoPad::NotSet | AutoPad::Valid => {}
        AutoPad::SameUpper | AutoPad::SameLower => {
            for d in 0..2 {
                if stride[d] == 0 {
                    return Err(Error::InvalidArgument("stride must be positive".into()));
                }
                let out = spatial[d].div_ceil(stride[d]);
                let total = ((out.max(1) - 1) * stride[d] + kernel[d]).saturating_sub(spatial[d]);
                let small = total / 2;
                let large = total - small;
                if auto_pad == AutoPad::SameUpper {
                    begin[d] = small;
                    end[d] = large;
                } else {
                    begin[d] = large;
                    end[d] = small;
                }
            }
        }
    }
    Ok(split_pads(&[begin[0], begin[1], end[0], end[1]]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_upper_puts_leftover_at_the_end() -> Result<()> {
        let (pad, odd) = get_padding_shape(AutoPad::SameUpper, [5, 5], [2, 2], [1, 1])?;
        assert_eq!(pad, [0, 0]);
        assert_eq!(odd, [0, 0, 1, 1]);

        let (pad, odd) = get_padding_shape(AutoPad::SameLower, [5, 5], [2, 2], [1, 1])?;
        assert_eq!(pad, [0, 0]);
        assert_eq!(odd, [1, 1, 0, 0]);
        Ok(())
    }

    #[test]
    fn same_with_even_total_is_symmetric() -> Result<()> {
        let (pad, odd) = get_padding_shape(AutoPad::SameUpper, [4, 6], [3, 3], [1, 1])?;
        assert_eq!(pad, [1, 1]);
        assert_eq!(odd, [0; 4]);

        let (pad, odd) = get_padding_shape(AutoPad::SameUpper, [5, 5], [3, 3], [2, 2])?;
        assert_eq!(pad, [1, 1]);
        assert_eq!(odd, [0; 4]);
        Ok(())
    }

    #[test]
    fn valid_means_none() -> Result<()> {
        assert_eq!(get_padding_shape(AutoPad::Valid, [7, 7], [3, 3], [2, 2])?, ([0, 0], [0; 4]));
        assert!(AutoPad::parse("SAME").is_err());
        Ok(())
    }

    #[test]
    fn explicit_asymmetric_pads() {
        assert_eq!(split_pads(&[1, 0, 2, 1]), ([1, 0], [0, 0, 1, 1]));
    }
}
