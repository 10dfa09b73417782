//! # shiftnet - Network Factory for Inpainting and Super-Resolution GANs
//!
//! shiftnet builds the generator and discriminator networks of a Shift-Net
//! style image inpainting GAN, and of an SRGAN style super-resolution GAN,
//! from architecture names. It also provides the weight initialization,
//! device placement and learning-rate schedules that go with them.
//!
//! ## Key Features
//!
//! - **Generators**: recursive and flat U-Nets, U-Nets with a shift
//!   connection at a configurable depth, and a residual SR generator
//! - **Discriminators**: PatchGAN, DenseNet-style and SRGAN discriminators
//! - **Initialization**: normal, xavier, kaiming and orthogonal schemes
//! - **Schedules**: lambda, step, plateau and cosine learning-rate policies
//! - **Data parallelism**: batches scattered over the rayon worker pool
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ndarray::Array4;
//! use shiftnet::networks::define_g;
//! use shiftnet::shift::ShiftOptions;
//!
//! let mask = Array4::<f32>::zeros((1, 1, 256, 256));
//! let generator = define_g(
//!     3, 3, 64, "unet_shift_triple", &ShiftOptions::default(), mask.view(),
//!     "instance", false, "normal", &[], 0.02,
//! ).unwrap();
//! assert_eq!(generator.shifts.len(), 1);
//! ```
//!
//! ## Module Organization
//!
//! - [`activations`] - Element-wise activation functions
//! - [`error`] - Error types and result handling
//! - [`layers`] - Convolution, normalization, pooling and container layers
//! - [`models`] - Predefined generator and discriminator topologies
//! - [`networks`] - Factories selecting topologies by name
//! - [`optimizer`] - Parameter groups and learning-rate schedules
//! - [`options`] - Serializable factory options
//! - [`parallel`] - Data-parallel execution
//! - [`shift`] - Shift-Net constraint and shift layers

pub mod activations;
pub mod error;
pub mod layers;
pub mod models;
pub mod networks;
pub mod optimizer;
pub mod options;
pub mod parallel;
pub mod shift;

#[cfg(test)]
mod tests;
