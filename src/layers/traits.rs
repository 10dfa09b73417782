use std::fmt;
use std::ops::Range;

use ndarray::{Array4, ArrayView4, ArrayViewMut1, ArrayViewMutD};

use crate::error::Result;

/// Coarse classification of a layer, used by weight initialization to decide
/// which distribution (if any) a layer receives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LayerKind {
    /// Convolution or transposed convolution
    Conv,
    /// Fully connected layer
    Linear,
    /// Batch normalization
    BatchNorm,
    /// Instance normalization
    InstanceNorm,
    /// Parameter-free element-wise activation
    Activation,
    /// Pooling and resampling layers
    Pooling,
    /// A layer that only holds other layers
    Container,
    /// Guidance constraint layer (InnerCos)
    Constraint,
    /// Feature shift layer (InnerShiftTriple)
    Shift,
}

/// Mutable view over the learnable parameters of a single layer.
pub struct ParamsMut<'a> {
    pub weight: ArrayViewMutD<'a, f32>,
    pub bias: Option<ArrayViewMut1<'a, f32>>,
}

/// Trait defining the interface for network layers.
///
/// Every layer consumes and produces NCHW tensors. Containers expose their
/// children through the visitor methods so that whole-network passes such as
/// initialization can walk the tree without knowing the concrete types.
pub trait Module: Send + Sync + fmt::Debug {
    /// Classification used by initialization
    fn kind(&self) -> LayerKind;

    /// Short description, e.g. `Conv2d(3, 64, kernel_size=(4, 4), stride=(2, 2))`
    fn name(&self) -> String;

    /// Forward pass for a batch `[batch, channels, height, width]`
    fn forward(&mut self, input: ArrayView4<f32>) -> Result<Array4<f32>>;

    /// Learnable weight and bias of this layer alone (not its children)
    fn params_mut(&mut self) -> Option<ParamsMut<'_>> {
        None
    }

    /// Number of learnable scalars held by this layer alone
    fn own_parameters(&self) -> usize {
        0
    }

    /// Visit the direct children of this layer
    fn for_each_child(&self, _f: &mut dyn FnMut(&dyn Module)) {}

    /// Visit the direct children of this layer mutably
    fn for_each_child_mut(&mut self, _f: &mut dyn FnMut(&mut dyn Module)) {}

    /// Switch between training and inference behaviour
    fn set_training(&mut self, training: bool) {
        self.for_each_child_mut(&mut |child: &mut dyn Module| child.set_training(training));
    }

    /// Tell the layer which rows of the full batch its next forward sees.
    /// Set by [`DataParallel`](crate::parallel::DataParallel) on each replica
    /// before a split forward; `None` restores whole-batch behaviour.
    fn set_batch_slice(&mut self, range: Option<Range<usize>>) {
        self.for_each_child_mut(&mut |child: &mut dyn Module| child.set_batch_slice(range.clone()));
    }

    /// Combine per-slice results recorded during a split forward. Called on
    /// the master replica once every slice has run, or failed.
    fn merge_batch_slices(&mut self, completed: bool) {
        self.for_each_child_mut(&mut |child: &mut dyn Module| child.merge_batch_slices(completed));
    }

    /// Clone the layer into a boxed trait object
    fn clone_box(&self) -> Box<dyn Module>;
}

impl Clone for Box<dyn Module> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Apply `f` to every layer of the tree, children before their parent.
pub fn apply(module: &mut dyn Module, f: &mut dyn FnMut(&mut dyn Module)) {
    module.for_each_child_mut(&mut |child: &mut dyn Module| apply(child, f));
    f(module);
}

/// Apply a fallible `f` to every layer, stopping at the first error.
pub fn try_apply(
    module: &mut dyn Module,
    f: &mut dyn FnMut(&mut dyn Module) -> Result<()>,
) -> Result<()> {
    let mut first_error = None;
    apply(module, &mut |layer: &mut dyn Module| {
        if first_error.is_none() {
            if let Err(e) = f(layer) {
                first_error = Some(e);
            }
        }
    });
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Total number of learnable scalars in the tree
pub fn num_parameters(module: &dyn Module) -> usize {
    let mut total = module.own_parameters();
    module.for_each_child(&mut |child: &dyn Module| total += num_parameters(child));
    total
}

/// Count the layers of a given kind in the tree
pub fn count_kind(module: &dyn Module, kind: LayerKind) -> usize {
    let mut count = usize::from(module.kind() == kind);
    module.for_each_child(&mut |child: &dyn Module| count += count_kind(child, kind));
    count
}

/// Render the tree the way a framework prints a model: one layer per line,
/// children indented under their container, followed by the parameter total.
pub fn summary(module: &dyn Module) -> String {
    let mut out = String::new();
    write_tree(module, 0, &mut out);
    out.push_str(&format!("Total number of parameters: {}\n", num_parameters(module)));
    out
}

fn write_tree(module: &dyn Module, depth: usize, out: &mut String) {
    out.push_str(&"  ".repeat(depth));
    out.push_str(&module.name());
    out.push('\n');
    module.for_each_child(&mut |child: &dyn Module| write_tree(child, depth + 1, out));
}

/// Check the channel dimension of an NCHW input
pub(crate) fn expect_channels(layer: &str, input: &ArrayView4<f32>, channels: usize) -> Result<()> {
    let actual = input.shape()[1];
    if actual != channels {
        return Err(crate::error::NetError::dimension_mismatch(
            format!("{} input with {} channels", layer, channels),
            format!("{} channels", actual),
        ));
    }
    Ok(())
}
