/// Whole US dollars with thousands separators, e.g. `$169,333`. Halves round up.
pub fn format_currency(value: f64) -> String {
    let rounded = if value.is_finite() {
        (value + 0.5).floor()
    } else {
        0.0
    };

    let digits = format!("{:.0}", rounded.abs());
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    if rounded < 0.0 {
        format!("-${grouped}")
    } else {
        format!("${grouped}")
    }
}
