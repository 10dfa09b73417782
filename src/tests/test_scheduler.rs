use crate::error::NetError;
use crate::optimizer::lr_scheduler::{LearningRateSchedule, Scheduler};
use crate::optimizer::{get_scheduler, Adam, LrPolicy, Optimizer, ParamGroup, SGD};
use crate::options::Options;

fn options(policy: &str) -> Options {
    Options {
        lr_policy: policy.to_string(),
        epoch_count: 1,
        niter: 2,
        niter_decay: 3,
        lr_decay_iters: 2,
        ..Options::default()
    }
}

fn assert_close(actual: f32, expected: f32) {
    assert!((actual - expected).abs() < 1e-6, "lr {} expected {}", actual, expected);
}

#[test]
fn test_lambda_policy_linear_decay() {
    let mut optimizer = Adam::new(1.0, 0.5, 0.999);
    let mut scheduler = get_scheduler(&mut optimizer, &options("lambda")).unwrap();

    // 1 - max(0, epoch + 1 + 1 - 2) / 4
    let expected = [1.0, 0.75, 0.5, 0.25, 0.0];
    assert_close(optimizer.learning_rates()[0], expected[0]);
    for &lr in &expected[1..] {
        scheduler.step(&mut optimizer).unwrap();
        assert_close(optimizer.learning_rates()[0], lr);
    }
    assert_eq!(scheduler.last_epoch(), 4);
}

#[test]
fn test_lambda_policy_holds_before_niter() {
    let mut optimizer = Adam::new(0.0002, 0.5, 0.999);
    let opt = Options {
        lr_policy: "lambda".to_string(),
        ..Options::default()
    };
    let mut scheduler = get_scheduler(&mut optimizer, &opt).unwrap();

    // epoch_count 1, niter 20: the rate holds through epoch 18
    for _ in 0..18 {
        scheduler.step(&mut optimizer).unwrap();
    }
    assert_close(optimizer.learning_rates()[0], 0.0002);
    scheduler.step(&mut optimizer).unwrap();
    assert_close(optimizer.learning_rates()[0], 0.0002 * (1.0 - 1.0 / 101.0));
}

#[test]
fn test_step_policy() {
    let mut optimizer = SGD::new(1.0);
    let mut scheduler = get_scheduler(&mut optimizer, &options("step")).unwrap();

    let mut rates = vec![optimizer.learning_rates()[0]];
    for _ in 0..4 {
        scheduler.step(&mut optimizer).unwrap();
        rates.push(optimizer.learning_rates()[0]);
    }
    for (lr, expected) in rates.iter().zip([1.0, 1.0, 0.1, 0.1, 0.01]) {
        assert_close(*lr, expected);
    }
}

#[test]
fn test_cosine_policy() {
    let mut optimizer = SGD::new(1.0);
    let opt = Options {
        niter: 4,
        ..options("cosine")
    };
    let mut scheduler = get_scheduler(&mut optimizer, &opt).unwrap();
    assert_close(optimizer.learning_rates()[0], 1.0);

    scheduler.step(&mut optimizer).unwrap();
    scheduler.step(&mut optimizer).unwrap();
    assert_close(optimizer.learning_rates()[0], 0.5);
    scheduler.step(&mut optimizer).unwrap();
    scheduler.step(&mut optimizer).unwrap();
    assert_close(optimizer.learning_rates()[0], 0.0);
}

#[test]
fn test_plateau_policy_reduces_after_patience() {
    let mut optimizer = Adam::new(1.0, 0.5, 0.999);
    let mut scheduler = get_scheduler(&mut optimizer, &options("plateau")).unwrap();
    assert_close(optimizer.learning_rates()[0], 1.0);

    // first metric sets the best, then five bad epochs are tolerated
    for _ in 0..6 {
        scheduler.step_with_metric(&mut optimizer, 1.0).unwrap();
    }
    assert_close(optimizer.learning_rates()[0], 1.0);
    scheduler.step_with_metric(&mut optimizer, 1.0).unwrap();
    assert_close(optimizer.learning_rates()[0], 0.2);
    assert_eq!(scheduler.plateau_state().num_bad_epochs, 0);
}

#[test]
fn test_plateau_policy_keeps_rate_while_improving() {
    let mut optimizer = Adam::new(1.0, 0.5, 0.999);
    let mut scheduler = get_scheduler(&mut optimizer, &options("plateau")).unwrap();

    let mut metric = 1.0;
    for _ in 0..20 {
        scheduler.step_with_metric(&mut optimizer, metric).unwrap();
        metric *= 0.98;
    }
    assert_close(optimizer.learning_rates()[0], 1.0);
}

#[test]
fn test_plateau_policy_requires_metric() {
    let mut optimizer = Adam::new(1.0, 0.5, 0.999);
    let mut scheduler = get_scheduler(&mut optimizer, &options("plateau")).unwrap();
    match scheduler.step(&mut optimizer) {
        Err(NetError::InvalidParameter { name, .. }) => assert_eq!(name, "metric"),
        other => panic!("expected an invalid parameter error, got {:?}", other),
    }
}

#[test]
fn test_epoch_schedule_ignores_metric() {
    let mut optimizer = SGD::new(1.0);
    let mut scheduler = get_scheduler(&mut optimizer, &options("step")).unwrap();
    scheduler.step_with_metric(&mut optimizer, 123.0).unwrap();
    scheduler.step_with_metric(&mut optimizer, 123.0).unwrap();
    assert_close(optimizer.learning_rates()[0], 0.1);
}

#[test]
fn test_unknown_policy() {
    let mut optimizer = SGD::new(1.0);
    let err = get_scheduler(&mut optimizer, &options("linear")).unwrap_err();
    assert_eq!(err.to_string(), "learning rate policy [linear] is not implemented");
    assert_eq!("cosine".parse::<LrPolicy>().unwrap(), LrPolicy::Cosine);
}

#[test]
fn test_scheduler_drives_every_group() {
    let mut optimizer = Adam::new(1.0, 0.5, 0.999).with_group(ParamGroup::new("shift", 0.5));
    let mut scheduler = get_scheduler(&mut optimizer, &options("lambda")).unwrap();
    scheduler.step(&mut optimizer).unwrap();

    let rates = optimizer.learning_rates();
    assert_close(rates[0], 0.75);
    assert_close(rates[1], 0.375);
    assert_eq!(scheduler.base_lrs(), &[1.0f32, 0.5][..]);
    assert_eq!(optimizer.param_groups()[1].initial_lr, Some(0.5));
    assert_eq!(scheduler.last_lr(), rates.as_slice());
}

#[test]
fn test_schedule_closed_forms() {
    let step = LearningRateSchedule::StepDecay { step_size: 3, gamma: 0.5 };
    assert_eq!(step.get_lr(2.0, 7), Some(0.5));
    let plateau = LearningRateSchedule::from_options(LrPolicy::Plateau, &Options::default()).unwrap();
    assert_eq!(plateau.get_lr(1.0, 3), None);

    let bad = Options {
        lr_decay_iters: 0,
        ..Options::default()
    };
    assert!(LearningRateSchedule::from_options(LrPolicy::Step, &bad).is_err());
}

#[test]
fn test_zero_period_schedules_are_rejected() {
    let step = LearningRateSchedule::StepDecay { step_size: 0, gamma: 0.1 };
    assert_eq!(step.get_lr(1.0, 5), None);
    assert!(matches!(step.validate(), Err(NetError::InvalidParameter { .. })));

    let cosine = LearningRateSchedule::CosineAnnealing { t_max: 0, eta_min: 0.0 };
    assert_eq!(cosine.get_lr(1.0, 5), None);
    assert!(matches!(cosine.validate(), Err(NetError::InvalidParameter { .. })));

    let mut optimizer = SGD::new(1.0);
    assert!(Scheduler::new(step, &mut optimizer).is_err());
    assert!(Scheduler::new(cosine, &mut optimizer).is_err());
    assert_close(optimizer.learning_rates()[0], 1.0);
}
