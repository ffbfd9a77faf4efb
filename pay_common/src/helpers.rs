/// Parse a boolean flag from a string value, or return the given default value otherwise.
pub fn parse_boolean_flag(value: Option<String>, default: bool) -> bool {
    let value = match value {
        Some(v) => v,
        None => return default,
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

/// Replaces Persian (U+06F0..U+06F9) and Arabic-Indic (U+0660..U+0669) digits with their ASCII equivalents. Bank
/// portals mix all three freely, sometimes inside a single description.
pub fn normalize_digits(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '\u{06F0}'..='\u{06F9}' => char::from(b'0' + (c as u32 - 0x06F0) as u8),
            '\u{0660}'..='\u{0669}' => char::from(b'0' + (c as u32 - 0x0660) as u8),
            c => c,
        })
        .collect()
}

/// Keeps only the ASCII digits of `s`, after normalizing Persian and Arabic-Indic digits.
pub fn digits_only(s: &str) -> String {
    normalize_digits(s).chars().filter(char::is_ascii_digit).collect()
}
