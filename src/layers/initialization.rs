use std::fmt;
use std::str::FromStr;

use ndarray::{Array2, ArrayViewMutD};
use rand_distr::Normal;
use ndarray_rand::RandomExt;
use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::error::{NetError, Result};

/// Weight initialization strategies selectable by name
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum InitType {
    /// `normal`: N(0, gain)
    Normal,

    /// `xavier`: Xavier/Glorot normal with the given gain
    Xavier,

    /// `kaiming`: He/Kaiming normal, `a = 0`, fan-in mode (gain unused)
    Kaiming,

    /// `orthogonal`: (semi-)orthogonal matrix scaled by gain
    Orthogonal,
}

impl FromStr for InitType {
    type Err = NetError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "normal" => Ok(InitType::Normal),
            "xavier" => Ok(InitType::Xavier),
            "kaiming" => Ok(InitType::Kaiming),
            "orthogonal" => Ok(InitType::Orthogonal),
            other => Err(NetError::not_implemented("initialization method", other)),
        }
    }
}

impl fmt::Display for InitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InitType::Normal => "normal",
            InitType::Xavier => "xavier",
            InitType::Kaiming => "kaiming",
            InitType::Orthogonal => "orthogonal",
        };
        write!(f, "{}", name)
    }
}

/// `(fan_in, fan_out)` of a weight tensor: dim 1 and dim 0 times the
/// receptive field (product of the remaining dims).
pub fn calculate_fans(shape: &[usize]) -> Result<(usize, usize)> {
    if shape.len() < 2 {
        return Err(NetError::invalid_parameter(
            "weight".to_string(),
            format!("fan in and fan out need at least 2 dimensions, got {:?}", shape),
        ));
    }
    let receptive: usize = shape[2..].iter().product();
    Ok((shape[1] * receptive, shape[0] * receptive))
}

fn normal(mean: f32, std: f32) -> Result<Normal<f32>> {
    Normal::new(mean, std).map_err(|e| {
        NetError::invalid_parameter("std".to_string(), format!("{} ({})", std, e))
    })
}

/// Fill `weight` in place with samples from N(mean, std)
pub fn fill_normal<R: Rng + ?Sized>(
    weight: &mut ArrayViewMutD<f32>,
    mean: f32,
    std: f32,
    rng: &mut R,
) -> Result<()> {
    let dist = normal(mean, std)?;
    let samples = ndarray::ArrayD::random_using(weight.raw_dim(), dist, rng);
    weight.assign(&samples);
    Ok(())
}

impl InitType {
    /// Initialize a convolution or linear weight in place
    pub fn fill<R: Rng + ?Sized>(&self, weight: &mut ArrayViewMutD<f32>, gain: f32, rng: &mut R) -> Result<()> {
        match self {
            InitType::Normal => fill_normal(weight, 0.0, gain, rng),

            InitType::Xavier => {
                let (fan_in, fan_out) = calculate_fans(weight.shape())?;
                let std = gain * (2.0 / (fan_in + fan_out) as f32).sqrt();
                fill_normal(weight, 0.0, std, rng)
            }

            InitType::Kaiming => {
                let (fan_in, _) = calculate_fans(weight.shape())?;
                let std = 2.0_f32.sqrt() / (fan_in.max(1) as f32).sqrt();
                fill_normal(weight, 0.0, std, rng)
            }

            InitType::Orthogonal => fill_orthogonal(weight, gain, rng),
        }
    }
}

/// Fill `weight`, viewed as `(dim0, product of the rest)`, with a matrix
/// whose rows (or columns, whichever are fewer) are orthonormal, times gain.
pub fn fill_orthogonal<R: Rng + ?Sized>(weight: &mut ArrayViewMutD<f32>, gain: f32, rng: &mut R) -> Result<()> {
    if weight.ndim() < 2 {
        return Err(NetError::invalid_parameter(
            "weight".to_string(),
            format!("orthogonal init needs at least 2 dimensions, got {}", weight.ndim()),
        ));
    }
    let rows = weight.shape()[0];
    let cols = weight.len() / rows.max(1);
    if rows == 0 || cols == 0 {
        return Ok(());
    }

    let flat = Array2::random_using((rows, cols), normal(0.0, 1.0)?, rng);
    // Orthonormalize the columns of the tall orientation
    let tall = if rows < cols { flat.t().to_owned() } else { flat };
    let q = gram_schmidt(tall)?;
    let q = if rows < cols { q.t().as_standard_layout().into_owned() } else { q };

    let shaped = (q * gain)
        .into_shape(weight.raw_dim())
        .map_err(|e| NetError::Numerical(e.to_string()))?;
    weight.assign(&shaped);
    Ok(())
}

/// Modified Gram-Schmidt on the columns of a tall matrix; the implied R has
/// a positive diagonal, which fixes the sign ambiguity of the factorization.
fn gram_schmidt(mut a: Array2<f32>) -> Result<Array2<f32>> {
    let n = a.ncols();
    for j in 0..n {
        for i in 0..j {
            let r = a.column(i).dot(&a.column(j));
            let qi = a.column(i).to_owned();
            a.column_mut(j).scaled_add(-r, &qi);
        }
        let norm = a.column(j).dot(&a.column(j)).sqrt();
        if norm < 1e-6 {
            return Err(NetError::Numerical("degenerate matrix in orthogonal init".to_string()));
        }
        a.column_mut(j).mapv_inplace(|v| v / norm);
    }
    Ok(a)
}

/// Norm layer scale init: weight ~ N(1, gain)
pub fn fill_norm_scale<R: Rng + ?Sized>(weight: &mut ArrayViewMutD<f32>, gain: f32, rng: &mut R) -> Result<()> {
    fill_normal(weight, 1.0, gain, rng)
}
