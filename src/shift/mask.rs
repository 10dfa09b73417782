use ndarray::{s, Array2, ArrayView2, ArrayView4};

use crate::error::{NetError, Result};

/// Downsample a global hole mask to the resolution of a feature map.
///
/// `mask_global` is `[1, 1, H, W]` (or any batch, of which the first sample
/// is used) with 1 marking missing pixels. Each of the `conv_layers` steps
/// mirrors one encoder convolution (kernel 4, stride 2, padding 1): a cell is
/// marked as a hole when at least `threshold` hole cells fall inside its
/// window.
pub fn cal_feat_mask(mask_global: ArrayView4<f32>, conv_layers: usize, threshold: f32) -> Result<Array2<bool>> {
    let (batch, channels, _, _) = mask_global.dim();
    if batch == 0 || channels != 1 {
        return Err(NetError::dimension_mismatch(
            "mask of shape [N >= 1, 1, H, W]".to_string(),
            format!("{:?}", mask_global.shape()),
        ));
    }
    let mut mask = mask_global.slice(s![0, 0, .., ..]).mapv(|v| v > 0.5);
    for _ in 0..conv_layers {
        mask = downsample_once(mask.view(), threshold)?;
    }
    Ok(mask)
}

fn downsample_once(mask: ArrayView2<bool>, threshold: f32) -> Result<Array2<bool>> {
    let (height, width) = mask.dim();
    if height < 2 || width < 2 {
        return Err(NetError::dimension_mismatch(
            "mask at least 2x2 before downsampling".to_string(),
            format!("{}x{}", height, width),
        ));
    }
    let out_height = (height + 2 - 4) / 2 + 1;
    let out_width = (width + 2 - 4) / 2 + 1;

    let mut out = Array2::from_elem((out_height, out_width), false);
    for oh in 0..out_height {
        for ow in 0..out_width {
            let mut count = 0usize;
            for kh in 0..4 {
                for kw in 0..4 {
                    // window starts one cell before the stride grid (padding 1)
                    let h = (oh * 2 + kh).checked_sub(1);
                    let w = (ow * 2 + kw).checked_sub(1);
                    if let (Some(h), Some(w)) = (h, w) {
                        if h < height && w < width && mask[[h, w]] {
                            count += 1;
                        }
                    }
                }
            }
            out[[oh, ow]] = count as f32 >= threshold;
        }
    }
    Ok(out)
}

/// Check that a feature mask matches the spatial size of a feature map
pub(crate) fn check_mask(layer: &str, mask: &Array2<bool>, height: usize, width: usize) -> Result<()> {
    if mask.dim() != (height, width) {
        return Err(NetError::dimension_mismatch(
            format!("{} feature mask of {}x{}", layer, height, width),
            format!("{}x{}", mask.nrows(), mask.ncols()),
        ));
    }
    Ok(())
}
