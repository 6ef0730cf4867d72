/// Round `value` to `decimals` decimal places.
///
/// A tiny epsilon proportional to the magnitude is added before rounding so
/// that values such as `1.005` land on the expected side of an exact
/// midpoint despite their binary representation.
///
/// # Examples
///
/// ```
/// use qi_core::formatting::round_to;
///
/// assert_eq!(round_to(20.0, 2), 20.0);
/// assert_eq!(round_to(33.33333, 2), 33.33);
/// assert_eq!(round_to(-2.345, 1), -2.3);
/// ```
pub fn round_to(value: f64, decimals: u32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let factor = 10_f64.powi(decimals as i32);
    let abs_value = value.abs();
    let epsilon = f64::EPSILON * abs_value * factor;
    let rounded = ((abs_value * factor) + epsilon).round() / factor;
    if value < 0.0 {
        -rounded
    } else {
        rounded
    }
}

/// Shorthand for [`round_to`] with two decimals, the precision used for
/// every derived rate and bucket mean.
pub fn round2(value: f64) -> f64 {
    round_to(value, 2)
}

/// Format a number in its shortest round-trippable form.
///
/// Integral values print without a fractional part, and negative zero
/// prints as `0`.
///
/// # Examples
///
/// ```
/// use qi_core::formatting::format_number;
///
/// assert_eq!(format_number(20.0), "20");
/// assert_eq!(format_number(12.5), "12.5");
/// assert_eq!(format_number(-0.0), "0");
/// ```
pub fn format_number(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    format!("{}", value)
}

/// Format a value with exactly `decimals` fractional digits followed by `%`.
///
/// # Examples
///
/// ```
/// use qi_core::formatting::format_percent;
///
/// assert_eq!(format_percent(12.345, 1), "12.3%");
/// assert_eq!(format_percent(0.0, 1), "0.0%");
/// ```
pub fn format_percent(value: f64, decimals: u32) -> String {
    format!(
        "{:.prec$}%",
        round_to(value, decimals),
        prec = decimals as usize
    )
}
