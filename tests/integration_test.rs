use ndarray::{s, Array4};
use shiftnet::{
    layers::{concat_channels, count_kind, LayerKind, Module},
    networks::{define_d_from_options, define_g_from_options, define_g_sr, define_d_sr},
    optimizer::{get_scheduler, Adam, Optimizer, ParamGroup},
    options::Options,
};

fn hole_mask(size: usize) -> Array4<f32> {
    let mut mask = Array4::zeros((1, 1, size, size));
    let (lo, hi) = (size / 4, size * 3 / 4);
    mask.slice_mut(s![0, 0, lo..hi, lo..hi]).fill(1.0);
    mask
}

fn images(batch: usize, size: usize) -> Array4<f32> {
    Array4::from_shape_fn((batch, 3, size, size), |(b, c, h, w)| {
        (((b + 1) * (c + 2) * (h + 3) + w) % 17) as f32 / 8.5 - 1.0
    })
}

fn small_options() -> Options {
    Options::from_json_str(
        r#"{
            "which_model_netG": "unet_shift_triple_64_1",
            "which_model_netD": "basic",
            "ngf": 4,
            "ndf": 4,
            "fine_size": 64,
            "norm": "instance",
            "init_type": "xavier",
            "niter": 2,
            "niter_decay": 2
        }"#,
    )
    .unwrap()
}

#[test]
fn test_inpainting_pair_end_to_end() {
    let opt = small_options();
    let mask = hole_mask(opt.fine_size);

    let mut generator = define_g_from_options(&opt, mask.view()).unwrap();
    let mut discriminator = define_d_from_options(&opt).unwrap().unwrap();
    assert_eq!(count_kind(generator.net.as_ref(), LayerKind::Shift), 1);

    // without a target the guidance loss pulls the hole towards zero
    let real = images(2, opt.fine_size);
    let fake = generator.net.forward(real.view()).unwrap();
    assert_eq!(fake.shape(), real.shape());
    assert!(generator.inner_cos[0].loss().unwrap().is_some());

    // conditional discriminator: input and output stacked on channels
    let pair = concat_channels(&[real.view(), fake.view()]).unwrap();
    let prediction = discriminator.forward(pair.view()).unwrap();
    assert_eq!(prediction.shape(), &[2, 1, 6, 6]);
    assert!(prediction.iter().all(|p| p.is_finite()));
}

#[test]
fn test_generator_on_worker_slots() {
    let opt = Options {
        gpu_ids: vec![0],
        ..small_options()
    };
    let mask = hole_mask(opt.fine_size);
    let mut generator = define_g_from_options(&opt, mask.view()).unwrap();
    assert_eq!(generator.net.name(), "DataParallel(device_ids=[0])");

    let output = generator.net.forward(images(1, opt.fine_size).view()).unwrap();
    assert_eq!(output.shape(), &[1, 3, 64, 64]);
    // the handles still reach the layers inside the wrapper
    assert!(generator.shifts[0].mask().unwrap().is_some());
    assert!(generator.inner_cos[0].loss().unwrap().is_some());
}

#[test]
fn test_training_schedule_for_both_networks() {
    let opt = small_options();
    let mut optimizer_g = Adam::new(opt.lr, opt.beta1, 0.999);
    let mut optimizer_d = Adam::new(opt.lr, opt.beta1, 0.999).with_group(ParamGroup::new("sr", opt.lr * 0.5));
    let mut schedulers = vec![
        get_scheduler(&mut optimizer_g, &opt).unwrap(),
        get_scheduler(&mut optimizer_d, &opt).unwrap(),
    ];

    // niter 2, niter_decay 2: a third of the rate is dropped per epoch from epoch 1
    let mut history = Vec::new();
    for _ in 0..3 {
        schedulers[0].step(&mut optimizer_g).unwrap();
        schedulers[1].step(&mut optimizer_d).unwrap();
        history.push(optimizer_g.learning_rates()[0]);
    }
    let expected = [opt.lr * 2.0 / 3.0, opt.lr / 3.0, 0.0];
    for (lr, want) in history.iter().zip(expected) {
        assert!((lr - want).abs() < 1e-9, "lr {} expected {}", lr, want);
    }
    let rates = optimizer_d.learning_rates();
    assert!((rates[1] - rates[0] * 0.5).abs() < 1e-9);
}

#[test]
fn test_super_resolution_pair() {
    let mut generator = define_g_sr(3, 3, 64, "64_up_1", "kaiming", &[], 0.02).unwrap();
    let mut discriminator = define_d_sr("sr_D", "batch", true, "normal", &[], 0.02).unwrap().unwrap();

    let low = images(2, 8);
    let high = generator.forward(low.view()).unwrap();
    assert_eq!(high.shape(), &[2, 3, 16, 16]);
    let score = discriminator.forward(high.view()).unwrap();
    assert_eq!(score.shape(), &[2, 1, 1, 1]);
}
