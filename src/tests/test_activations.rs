use ndarray::Array4;
use crate::activations::Activation;
use crate::layers::{LayerKind, Module};

fn batch(values: &[f32]) -> Array4<f32> {
    Array4::from_shape_vec((1, 1, 1, values.len()), values.to_vec()).unwrap()
}

#[test]
fn test_relu_activation() {
    let mut input = batch(&[-1.0, 0.0, 1.0, 2.0]);
    Activation::Relu.apply_4d(&mut input);
    assert_eq!(input.into_raw_vec(), vec![0.0, 0.0, 1.0, 2.0]);
}

#[test]
fn test_sigmoid_activation() {
    assert!((Activation::Sigmoid.apply_scalar(0.0) - 0.5).abs() < 1e-6);
    assert!(Activation::Sigmoid.apply_scalar(10.0) > 0.99);
}

#[test]
fn test_tanh_activation() {
    let mut input = batch(&[0.0, 100.0, -100.0]);
    Activation::Tanh.apply_4d(&mut input);
    assert_eq!(input[[0, 0, 0, 0]], 0.0);
    assert!((input[[0, 0, 0, 1]] - 1.0).abs() < 1e-6);
    assert!((input[[0, 0, 0, 2]] + 1.0).abs() < 1e-6);
}

#[test]
fn test_leaky_relu() {
    let leaky = Activation::leaky();
    assert_eq!(leaky, Activation::LeakyRelu { alpha: 0.2 });
    let mut input = batch(&[-1.0, 0.0, 1.0]);
    leaky.apply_4d(&mut input);
    assert!((input[[0, 0, 0, 0]] + 0.2).abs() < 1e-6);
    assert_eq!(input[[0, 0, 0, 2]], 1.0);
}

#[test]
fn test_linear_is_identity() {
    let mut input = batch(&[-3.0, 4.5]);
    Activation::Linear.apply_4d(&mut input);
    assert_eq!(input.into_raw_vec(), vec![-3.0, 4.5]);
}

#[test]
fn test_activation_as_module() {
    let mut relu = Activation::Relu;
    let input = batch(&[-2.0, 3.0]);
    let output = relu.forward(input.view()).unwrap();
    assert_eq!(output, batch(&[0.0, 3.0]));
    assert_eq!(relu.kind(), LayerKind::Activation);
    assert_eq!(relu.own_parameters(), 0);
    assert_eq!(Activation::leaky().name(), "LeakyReLU(negative_slope=0.2, inplace=True)");
}
