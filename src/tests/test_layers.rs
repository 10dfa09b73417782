use ndarray::{array, Array4, Axis};
use crate::activations::Activation;
use crate::error::NetError;
use crate::layers::{
    concat_channels, count_kind, get_norm_layer, num_parameters, summary, AvgPool2d, BatchNorm2d, Conv2d,
    ConvTranspose2d, DenseConcat, GlobalAvgPool2d, InstanceNorm2d, LayerKind, Linear, Module, NormLayer, NormType,
    PixelShuffle, Residual, Sequential,
};

#[test]
fn test_conv_output_shape() {
    let mut conv = Conv2d::new(3, 8, 4, 2, 1, true);
    assert_eq!(conv.weight.shape(), &[8, 3, 4, 4]);
    let input = Array4::<f32>::ones((2, 3, 16, 16));
    let output = conv.forward(input.view()).unwrap();
    assert_eq!(output.shape(), &[2, 8, 8, 8]);
}

#[test]
fn test_conv_forward_values() {
    let mut conv = Conv2d::new(1, 1, 3, 1, 1, false);
    conv.weight.fill(1.0);
    let input = Array4::<f32>::ones((1, 1, 4, 4));
    let output = conv.forward(input.view()).unwrap();

    // zero padding: corners see 4 ones, edges 6, interior 9
    assert_eq!(output[[0, 0, 0, 0]], 4.0);
    assert_eq!(output[[0, 0, 0, 1]], 6.0);
    assert_eq!(output[[0, 0, 1, 1]], 9.0);
}

#[test]
fn test_conv_rejects_wrong_channels() {
    let mut conv = Conv2d::new(3, 8, 3, 1, 1, true);
    let input = Array4::<f32>::zeros((1, 4, 8, 8));
    match conv.forward(input.view()) {
        Err(NetError::DimensionMismatch { .. }) => {}
        other => panic!("expected a dimension mismatch, got {:?}", other),
    }
}

#[test]
fn test_conv_transpose_doubles_resolution() {
    let mut deconv = ConvTranspose2d::new(8, 3, 4, 2, 1, true);
    assert_eq!(deconv.weight.shape(), &[8, 3, 4, 4]);
    let input = Array4::<f32>::ones((2, 8, 8, 8));
    let output = deconv.forward(input.view()).unwrap();
    assert_eq!(output.shape(), &[2, 3, 16, 16]);
}

#[test]
fn test_conv_transpose_forward_values() {
    let mut deconv = ConvTranspose2d::new(1, 1, 4, 2, 1, false);
    deconv.weight.fill(1.0);
    let input = Array4::<f32>::ones((1, 1, 2, 2));
    let output = deconv.forward(input.view()).unwrap();

    assert_eq!(output.shape(), &[1, 1, 4, 4]);
    assert_eq!(output[[0, 0, 0, 0]], 1.0);
    assert_eq!(output[[0, 0, 0, 1]], 2.0);
    assert_eq!(output[[0, 0, 1, 1]], 4.0);
    assert_eq!(output[[0, 0, 3, 3]], 1.0);
}

#[test]
fn test_spectral_norm_bounds_response() {
    let mut conv = Conv2d::new(2, 4, 3, 1, 1, false).with_spectral_norm(true);
    assert!(conv.name().contains("spectral_norm=True"));
    conv.weight.mapv_inplace(|w| w * 100.0);
    let input = Array4::<f32>::ones((1, 2, 6, 6));

    // a few power iterations converge on the top singular value
    let mut output = conv.forward(input.view()).unwrap();
    for _ in 0..20 {
        output = conv.forward(input.view()).unwrap();
    }
    let max = output.iter().fold(0.0f32, |m, &v| m.max(v.abs()));
    // |W x| <= sigma |x| per output pixel, and |x| over a 3x3x2 patch is sqrt(18)
    assert!(max <= 1.05 * 18.0f32.sqrt(), "max response {}", max);
}

#[test]
fn test_linear_layer() {
    let mut linear = Linear::new(8, 2, true);
    assert_eq!(linear.weight.shape(), &[2, 8]);
    assert_eq!(linear.own_parameters(), 18);
    let input = Array4::<f32>::ones((3, 2, 2, 2));
    let output = linear.forward(input.view()).unwrap();
    assert_eq!(output.shape(), &[3, 2, 1, 1]);
}

#[test]
fn test_batch_norm_training_statistics() {
    let mut bn = BatchNorm2d::new(2);
    let input = Array4::from_shape_fn((4, 2, 3, 3), |(b, c, h, w)| (b * 9 + h * 3 + w) as f32 + c as f32 * 10.0);
    let output = bn.forward(input.view()).unwrap();

    for c in 0..2 {
        let channel = output.index_axis(Axis(1), c);
        let mean = channel.mean().unwrap();
        let var = channel.mapv(|v| (v - mean).powi(2)).mean().unwrap();
        assert!(mean.abs() < 1e-4);
        assert!((var - 1.0).abs() < 1e-3);
    }
    // running mean moved a tenth of the way to the batch mean
    let batch_mean = input.index_axis(Axis(1), 0).mean().unwrap();
    assert!((bn.running_mean[0] - 0.1 * batch_mean).abs() < 1e-4);
}

#[test]
fn test_batch_norm_inference_uses_running_stats() {
    let mut bn = BatchNorm2d::new(1);
    bn.running_mean[0] = 2.0;
    bn.running_var[0] = 4.0;
    bn.set_training(false);
    let input = Array4::from_elem((1, 1, 2, 2), 6.0f32);
    let output = bn.forward(input.view()).unwrap();
    assert!((output[[0, 0, 0, 0]] - 2.0).abs() < 1e-4);
    assert_eq!(bn.running_mean[0], 2.0);
}

#[test]
fn test_batch_norm_needs_several_values_when_training() {
    let mut bn = BatchNorm2d::new(2);
    let input = Array4::from_shape_vec((1, 2, 1, 1), vec![3.0f32, -1.0]).unwrap();
    match bn.forward(input.view()) {
        Err(NetError::InvalidParameter { .. }) => {}
        other => panic!("expected an invalid parameter, got {:?}", other),
    }
    assert_eq!(bn.running_mean[0], 0.0);

    bn.set_training(false);
    assert_eq!(bn.forward(input.view()).unwrap().shape(), &[1, 2, 1, 1]);
}

#[test]
fn test_instance_norm_per_sample() {
    let mut norm = InstanceNorm2d::new(1);
    let mut input = Array4::<f32>::zeros((2, 1, 2, 2));
    input.index_axis_mut(Axis(0), 0).assign(&array![[[1.0, 2.0], [3.0, 4.0]]]);
    input.index_axis_mut(Axis(0), 1).assign(&array![[[10.0, 20.0], [30.0, 40.0]]]);
    let output = norm.forward(input.view()).unwrap();

    for b in 0..2 {
        let sample = output.index_axis(Axis(0), b);
        assert!(sample.mean().unwrap().abs() < 1e-5);
    }
    // both samples normalize to the same pattern
    assert!((output[[0, 0, 1, 1]] - output[[1, 0, 1, 1]]).abs() < 1e-3);
}

#[test]
fn test_norm_layer_factory() {
    assert_eq!(get_norm_layer("batch").unwrap(), Some(NormLayer::Batch));
    assert_eq!(get_norm_layer("instance").unwrap(), Some(NormLayer::Instance));
    assert_eq!(get_norm_layer("none").unwrap(), None);

    let built = NormLayer::Batch.build(16);
    assert_eq!(built.kind(), LayerKind::BatchNorm);
    assert_eq!(built.own_parameters(), 32);
    assert_eq!(NormLayer::Instance.build(8).kind(), LayerKind::InstanceNorm);

    assert!(!NormLayer::conv_bias(Some(NormLayer::Batch)));
    assert!(NormLayer::conv_bias(Some(NormLayer::Instance)));
    assert!(NormLayer::conv_bias(None));
}

#[test]
fn test_norm_layer_unknown_name() {
    let err = get_norm_layer("group").unwrap_err();
    assert_eq!(err.to_string(), "normalization layer [group] is not implemented");
    assert_eq!("instance".parse::<NormType>().unwrap().to_string(), "instance");
}

#[test]
fn test_avg_pool() {
    let mut pool = AvgPool2d::new((2, 2), None);
    let input = Array4::from_shape_fn((1, 1, 4, 4), |(_, _, h, w)| (h * 4 + w) as f32);
    let output = pool.forward(input.view()).unwrap();
    assert_eq!(output.shape(), &[1, 1, 2, 2]);
    assert_eq!(output[[0, 0, 0, 0]], 2.5);
}

#[test]
fn test_zero_stride_is_an_error() {
    let input = Array4::<f32>::ones((1, 1, 4, 4));

    let mut conv = Conv2d::new(1, 1, 3, 1, 1, true);
    conv.stride = (0, 0);
    assert!(matches!(conv.forward(input.view()), Err(NetError::InvalidParameter { .. })));

    let mut deconv = ConvTranspose2d::new(1, 1, 4, 2, 1, true);
    deconv.stride = (0, 1);
    assert!(matches!(deconv.forward(input.view()), Err(NetError::InvalidParameter { .. })));

    let mut pool = AvgPool2d::new((2, 2), None);
    pool.stride = (0, 0);
    assert!(matches!(pool.forward(input.view()), Err(NetError::InvalidParameter { .. })));
}

#[test]
fn test_global_avg_pool() {
    let mut pool = GlobalAvgPool2d::new();
    let input = Array4::from_shape_fn((2, 3, 4, 4), |(_, c, _, _)| c as f32);
    let output = pool.forward(input.view()).unwrap();
    assert_eq!(output.shape(), &[2, 3, 1, 1]);
    assert_eq!(output[[1, 2, 0, 0]], 2.0);
}

#[test]
fn test_pixel_shuffle() {
    let mut shuffle = PixelShuffle::new(2);
    let input = Array4::from_shape_fn((1, 4, 1, 1), |(_, c, _, _)| c as f32);
    let output = shuffle.forward(input.view()).unwrap();
    assert_eq!(output.shape(), &[1, 1, 2, 2]);
    assert_eq!(output[[0, 0, 0, 0]], 0.0);
    assert_eq!(output[[0, 0, 0, 1]], 1.0);
    assert_eq!(output[[0, 0, 1, 0]], 2.0);
    assert_eq!(output[[0, 0, 1, 1]], 3.0);

    let bad = Array4::<f32>::zeros((1, 3, 1, 1));
    assert!(shuffle.forward(bad.view()).is_err());
}

#[test]
fn test_concat_channels() {
    let a = Array4::<f32>::zeros((2, 3, 4, 4));
    let b = Array4::<f32>::ones((2, 5, 4, 4));
    let joined = concat_channels(&[a.view(), b.view()]).unwrap();
    assert_eq!(joined.shape(), &[2, 8, 4, 4]);
    assert_eq!(joined[[0, 2, 0, 0]], 0.0);
    assert_eq!(joined[[0, 3, 0, 0]], 1.0);

    let c = Array4::<f32>::ones((2, 5, 2, 2));
    assert!(concat_channels(&[a.view(), c.view()]).is_err());
}

#[test]
fn test_residual_and_dense_connections() {
    let body = Sequential::new().add(Activation::Relu);
    let mut residual = Residual::new(body.clone());
    let input = Array4::from_shape_vec((1, 1, 1, 2), vec![-1.0f32, 2.0]).unwrap();
    let expected = Array4::from_shape_vec((1, 1, 1, 2), vec![-1.0f32, 4.0]).unwrap();
    assert_eq!(residual.forward(input.view()).unwrap(), expected);

    let mut dense = DenseConcat::new(body);
    let output = dense.forward(input.view()).unwrap();
    assert_eq!(output.shape(), &[1, 2, 1, 2]);
    assert_eq!(output[[0, 1, 0, 0]], 0.0);
}

#[test]
fn test_sequential_summary_and_counts() {
    let model = Sequential::new()
        .add(Conv2d::new(3, 4, 3, 1, 1, true))
        .add(BatchNorm2d::new(4))
        .add(Activation::Relu)
        .add_opt(None)
        .add(Conv2d::new(4, 1, 1, 1, 0, false));

    assert_eq!(model.len(), 4);
    assert_eq!(count_kind(&model, LayerKind::Conv), 2);
    assert_eq!(count_kind(&model, LayerKind::BatchNorm), 1);
    // 3*4*9 + 4, 4 + 4, 4
    assert_eq!(num_parameters(&model), 112 + 8 + 4);

    let text = summary(&model);
    assert!(text.starts_with("Sequential\n"));
    assert!(text.contains("  BatchNorm2d(4"));
    assert!(text.ends_with("Total number of parameters: 124\n"));
}
