use pay_common::helpers::digits_only;

/// An Iranian IBAN is `IR` followed by 24 digits: two check digits and a 22-digit BBAN.
pub const IBAN_DIGITS: usize = 24;

/// Strips the country prefix and every non-digit character, so `IR06 0170-0000...` and `060170000...` compare equal.
pub fn normalize_iban(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_prefix = match trimmed.get(..2) {
        Some(p) if p.eq_ignore_ascii_case("IR") => &trimmed[2..],
        _ => trimmed,
    };
    digits_only(without_prefix)
}

/// ISO 7064 mod-97 check for the 24 digits following `IR`.
pub fn is_valid_iban_digits(digits: &str) -> bool {
    if digits.len() != IBAN_DIGITS || !digits.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    // I = 18, R = 27 once letters are moved to the end
    let rearranged = format!("{}1827{}", &digits[2..], &digits[..2]);
    let remainder = rearranged.bytes().fold(0u32, |acc, b| (acc * 10 + u32::from(b - b'0')) % 97);
    remainder == 1
}

/// Validates the check digit of a 10-digit national identification code.
pub fn is_valid_national_id(code: &str) -> bool {
    if code.len() != 10 || !code.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    let digits = code.bytes().map(|b| u32::from(b - b'0')).collect::<Vec<u32>>();
    if digits.iter().all(|d| *d == digits[0]) {
        return false;
    }
    let sum: u32 = digits[..9].iter().enumerate().map(|(i, d)| d * (10 - i as u32)).sum();
    let remainder = sum % 11;
    let check = digits[9];
    if remainder < 2 {
        check == remainder
    } else {
        check == 11 - remainder
    }
}
