#[macro_export]
macro_rules! is_power_of_2 {
    ($x:expr) => {
        ($x) != 0 && ($x) & (($x) - 1) == 0
    };
}
#[macro_export]
macro_rules! round_up {
    ($x:expr, $y:expr) => {{
        debug_assert!(is_power_of_2!($y));
        (($x) + ($y) - 1) & (!($y) + 1)
    }};
}

/// Number of `$y` sized units needed to hold `$x`, `$y` must be a power of 2
#[macro_export]
macro_rules! units_needed {
    ($x:expr, $y:expr) => {
        round_up!($x, $y) / ($y)
    };
}

#[cfg(test)]
#[test]
fn test_round_up() {
    crate::tests_init();

    assert_eq!(round_up!(54, 512), 512);
    assert_eq!(round_up!(513, 512), 1024);
    assert_eq!(round_up!(16384, 512), 16384);
    assert_eq!(round_up!(0u64, 512u64), 0);
}

#[cfg(test)]
#[test]
fn test_units_needed() {
    crate::tests_init();

    assert_eq!(units_needed!(0u64, 512u64), 0);
    assert_eq!(units_needed!(1u64, 512u64), 1);
    assert_eq!(units_needed!(512u64, 512u64), 1);
    assert_eq!(units_needed!(1300u64, 512u64), 3);
}

#[cfg(test)]
#[test]
fn test_is_power_of_2() {
    crate::tests_init();

    assert!(!is_power_of_2!(0));
    assert!(!is_power_of_2!(7));
    assert!(is_power_of_2!(8));
    assert!(!is_power_of_2!(63));
    assert!(is_power_of_2!(64));
    assert!(!is_power_of_2!(65));
    assert!(is_power_of_2!(9223372036854775808u64));
}
