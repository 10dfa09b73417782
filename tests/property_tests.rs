#[cfg(test)]
mod property_tests {
    use proptest::prelude::*;
    use ndarray::Array4;
    use shiftnet::layers::{concat_channels, Conv2d, Module};
    use shiftnet::optimizer::lr_scheduler::LearningRateSchedule;
    use shiftnet::parallel::{available_devices, DataParallel};
    use shiftnet::shift::cal_feat_mask;

    // Strategy for binary hole masks of side 2^levels * base
    fn mask_strategy() -> impl Strategy<Value = (Array4<f32>, usize)> {
        (1usize..=3, 1usize..=3).prop_flat_map(|(levels, base)| {
            let size = base << levels;
            prop::collection::vec(prop::bool::ANY, size * size).prop_map(move |cells| {
                let values: Vec<f32> = cells.into_iter().map(|hole| if hole { 1.0 } else { 0.0 }).collect();
                (Array4::from_shape_vec((1, 1, size, size), values).unwrap(), levels)
            })
        })
    }

    // Strategy for finite input batches
    fn batch_strategy(channels: usize, size: usize) -> impl Strategy<Value = Array4<f32>> {
        (1usize..=6).prop_flat_map(move |batch| {
            prop::collection::vec(-1.0f32..1.0, batch * channels * size * size)
                .prop_map(move |v| Array4::from_shape_vec((batch, channels, size, size), v).unwrap())
        })
    }

    proptest! {
        #[test]
        fn test_feature_mask_halves_per_level((mask, levels) in mask_strategy(), threshold in 1u8..=4) {
            let size = mask.shape()[2];
            let feature = cal_feat_mask(mask.view(), levels, threshold as f32).unwrap();
            prop_assert_eq!(feature.dim(), (size >> levels, size >> levels));
        }

        #[test]
        fn test_feature_mask_threshold_is_monotonic((mask, levels) in mask_strategy()) {
            // a stricter threshold never marks more cells
            let loose = cal_feat_mask(mask.view(), levels, 1.0).unwrap();
            let strict = cal_feat_mask(mask.view(), levels, 3.0).unwrap();
            for (l, s) in loose.iter().zip(strict.iter()) {
                prop_assert!(*l || !*s);
            }
        }

        #[test]
        fn test_concat_channels_adds_up(a in 1usize..5, b in 1usize..5, size in 1usize..6) {
            let left = Array4::<f32>::zeros((2, a, size, size));
            let right = Array4::<f32>::ones((2, b, size, size));
            let joined = concat_channels(&[left.view(), right.view()]).unwrap();
            prop_assert_eq!(joined.shape(), &[2, a + b, size, size]);
            prop_assert_eq!(joined.sum(), (2 * b * size * size) as f32);
        }

        #[test]
        fn test_conv_output_size(
            size in 4usize..20,
            kernel in 1usize..5,
            stride in 1usize..3,
            padding in 0usize..2,
        ) {
            let mut conv = Conv2d::new(1, 2, kernel, stride, padding, true);
            let input = Array4::<f32>::ones((1, 1, size, size));
            let output = conv.forward(input.view()).unwrap();
            let expected = (size + 2 * padding - kernel) / stride + 1;
            prop_assert_eq!(output.shape(), &[1, 2, expected, expected]);
        }

        #[test]
        fn test_linear_decay_never_increases(
            epoch_count in 1usize..5,
            niter in 1usize..30,
            niter_decay in 0usize..30,
        ) {
            let schedule = LearningRateSchedule::LinearDecay { epoch_count, niter, niter_decay };
            let mut previous = f32::INFINITY;
            for epoch in 0..(niter + niter_decay) {
                let lr = schedule.get_lr(1.0, epoch).unwrap();
                prop_assert!(lr <= 1.0);
                prop_assert!(lr <= previous);
                previous = lr;
            }
        }

        #[test]
        fn test_step_decay_matches_closed_form(step_size in 1usize..10, epoch in 0usize..50) {
            let schedule = LearningRateSchedule::StepDecay { step_size, gamma: 0.1 };
            let lr = schedule.get_lr(1.0, epoch).unwrap();
            let expected = 0.1f32.powi((epoch / step_size) as i32);
            prop_assert!((lr - expected).abs() <= expected * 1e-5);
        }

        #[test]
        fn test_data_parallel_matches_single_device(input in batch_strategy(2, 4)) {
            let mut plain: Box<dyn Module> = Box::new(Conv2d::new(2, 3, 3, 1, 1, true));
            let devices: Vec<usize> = (0..available_devices().min(4)).collect();
            let mut wrapped = DataParallel::new(plain.clone_box(), &devices).unwrap();

            let expected = plain.forward(input.view()).unwrap();
            let output = wrapped.forward(input.view()).unwrap();
            prop_assert_eq!(output.shape(), expected.shape());
            for (a, b) in output.iter().zip(expected.iter()) {
                prop_assert!((a - b).abs() < 1e-5);
            }
        }
    }
}
