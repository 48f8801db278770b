//! Digital I/O and PWM control against the mock kernel interface.

mod common;

use common::{mock_hal, test_config};
use sbc_common::config::PwmChannelConfig;
use sbc_common::error::HalError;
use sbc_common::types::{AllocPolicy, Level, Mode, PinId, PinKind};

const TOLERANCE: f64 = 1e-6;

#[test]
fn write_allocates_output_on_demand() {
    let (hal, backend) = mock_hal();

    hal.write(PinId(17), Level::High).unwrap();
    assert!(hal.is_allocated(PinId(17)));
    assert_eq!(backend.direction(17).writes(), vec!["out"]);
    assert_eq!(backend.value(17).writes(), vec!["1"]);

    hal.write(PinId(17), Level::Low).unwrap();
    assert_eq!(backend.value(17).contents(), "0");
    // Direction is only written once, at allocation.
    assert_eq!(backend.direction(17).writes().len(), 1);
}

#[test]
fn read_allocates_input_on_demand() {
    let (hal, backend) = mock_hal();
    backend.value(4).set_contents("1\n");

    assert_eq!(hal.read(PinId(4)).unwrap(), Level::High);
    assert_eq!(backend.direction(4).writes(), vec!["in"]);
    assert_eq!(hal.kind(PinId(4)), Some(PinKind::Digital));
}

#[test]
fn only_ascii_zero_reads_low() {
    let (hal, backend) = mock_hal();
    let value = backend.value(6);

    for (contents, expected) in [("0", Level::Low), ("1", Level::High), ("x", Level::High)] {
        value.set_contents(contents);
        assert_eq!(hal.read(PinId(6)).unwrap(), expected, "contents {contents:?}");
    }
}

#[test]
fn set_direction_writes_literal_strings() {
    let (hal, backend) = mock_hal();
    let pin = PinId(23);

    hal.allocate(pin, AllocPolicy::Exclusive, PinKind::Digital)
        .unwrap();
    hal.set_direction(pin, Mode::Output).unwrap();
    hal.set_direction(pin, Mode::Input).unwrap();
    assert_eq!(backend.direction(23).writes(), vec!["out", "in"]);
}

#[test]
fn digital_transfer_on_pwm_pin_is_kind_mismatch() {
    let (hal, _backend) = mock_hal();
    hal.allocate(PinId(18), AllocPolicy::Exclusive, PinKind::Pwm).unwrap();

    assert!(matches!(
        hal.write(PinId(18), Level::High),
        Err(HalError::KindMismatch { .. })
    ));
    assert!(matches!(
        hal.read(PinId(18)),
        Err(HalError::KindMismatch { .. })
    ));
}

#[test]
fn pwm_default_period_is_2560ns() {
    let (hal, backend) = mock_hal();
    hal.allocate(PinId(18), AllocPolicy::Exclusive, PinKind::Pwm).unwrap();

    let state = hal.pwm_state(PinId(18)).unwrap();
    assert_eq!(state.channel, "pwmchip0/pwm0");
    assert!((state.period - 2560.0).abs() < TOLERANCE);
    assert_eq!(
        backend.node("pwmchip0/pwm0/period").writes(),
        vec!["2560"]
    );
}

#[test]
fn pwm_duty_is_inverted_level() {
    let (hal, backend) = mock_hal();
    let pin = PinId(19);
    let duty = backend.node("pwmchip0/pwm1/duty_cycle");

    hal.pwm_write(pin, 0).unwrap();
    let state = hal.pwm_state(pin).unwrap();
    assert!((state.duty_cycle - state.period).abs() < TOLERANCE);
    assert_eq!(duty.last_write().as_deref(), Some("2560"));

    hal.pwm_write(pin, 100).unwrap();
    assert_eq!(hal.pwm_state(pin).unwrap().duty_cycle, 0.0);
    assert_eq!(duty.last_write().as_deref(), Some("0"));

    hal.pwm_write(pin, 25).unwrap();
    let state = hal.pwm_state(pin).unwrap();
    assert!((state.duty_cycle - state.period * 0.75).abs() < TOLERANCE);
    assert_eq!(duty.last_write().as_deref(), Some("1920"));
}

#[test]
fn pwm_level_above_100_is_rejected() {
    let (hal, _backend) = mock_hal();
    assert!(matches!(
        hal.pwm_write(PinId(18), 101),
        Err(HalError::InvalidArgument(_))
    ));
    assert!(!hal.is_allocated(PinId(18)));
}

#[test]
fn range_and_clock_rewrite_period() {
    let (hal, backend) = mock_hal();
    let pin = PinId(18);
    let period = backend.node("pwmchip0/pwm0/period");

    hal.set_range(pin, 1024).unwrap();
    assert_eq!(period.last_write().as_deref(), Some("10240"));

    hal.set_clock(pin, 2).unwrap();
    assert_eq!(period.last_write().as_deref(), Some("20480"));

    let state = hal.pwm_state(pin).unwrap();
    assert_eq!((state.range, state.clock), (1024, 2));

    hal.pwm_write(pin, 50).unwrap();
    assert_eq!(
        backend.node("pwmchip0/pwm0/duty_cycle").last_write().as_deref(),
        Some("10240")
    );

    assert!(matches!(
        hal.set_range(pin, 0),
        Err(HalError::InvalidArgument(_))
    ));
    assert!(matches!(
        hal.set_clock(pin, 0),
        Err(HalError::InvalidArgument(_))
    ));
}

#[test]
fn pwm_output_direction_starts_channel_at_half_duty() {
    let (hal, backend) = mock_hal();
    let pin = PinId(18);
    hal.allocate(pin, AllocPolicy::Exclusive, PinKind::Pwm).unwrap();

    hal.set_direction(pin, Mode::Output).unwrap();
    assert_eq!(
        backend.node("pwmchip0/pwm0/duty_cycle").last_write().as_deref(),
        Some("1280")
    );
    assert_eq!(
        backend.node("pwmchip0/pwm0/enable").last_write().as_deref(),
        Some("1")
    );

    hal.set_direction(pin, Mode::Input).unwrap();
    assert_eq!(
        backend.node("pwmchip0/pwm0/enable").last_write().as_deref(),
        Some("0")
    );
}

#[test]
fn pwm_on_digital_pin_is_kind_mismatch() {
    let (hal, _backend) = mock_hal();
    hal.write(PinId(18), Level::High).unwrap();
    assert!(matches!(
        hal.pwm_write(PinId(18), 10),
        Err(HalError::KindMismatch {
            expected: PinKind::Pwm,
            ..
        })
    ));
    assert!(hal.pwm_state(PinId(18)).is_none());
}

#[test]
fn pwm_channel_table_is_configurable() {
    let mut config = test_config();
    config.pwm_channels = vec![PwmChannelConfig {
        pin: PinId(12),
        channel: "pwmchip2/pwm3".to_string(),
    }];
    let (hal, backend) = common::hal_with(config);

    hal.pwm_write(PinId(12), 100).unwrap();
    assert_eq!(
        backend.node("pwmchip2/pwm3/duty_cycle").last_write().as_deref(),
        Some("0")
    );
    assert!(matches!(
        hal.pwm_write(PinId(18), 10),
        Err(HalError::Unsupported { .. })
    ));
}
