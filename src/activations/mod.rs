//! # Activation Functions Module
//!
//! Element-wise non-linearities used by the generator and discriminator
//! topologies. Each [`Activation`] is also a parameter-free [`Module`] so it
//! can be placed directly inside a [`Sequential`].
//!
//! ## Available Activations
//!
//! - **ReLU**: `max(0, x)`, the up path of U-Nets and SR residual blocks
//! - **LeakyReLU**: ReLU with a small negative slope (0.2 in every topology here)
//! - **Sigmoid**: `1 / (1 + e^(-x))`, optional discriminator head
//! - **Tanh**: generator output in `[-1, 1]`
//! - **Linear**: identity
//!
//! ## Usage Example
//!
//! ```rust
//! use shiftnet::activations::Activation;
//! use ndarray::Array4;
//!
//! let mut data = Array4::from_elem((1, 1, 2, 2), -1.0f32);
//! Activation::leaky().apply_4d(&mut data);
//! assert!((data[[0, 0, 0, 0]] + 0.2).abs() < 1e-6);
//! ```
//!
//! [`Module`]: crate::layers::Module
//! [`Sequential`]: crate::layers::Sequential

pub mod functions;

pub use functions::Activation;
