mod bank_identifiers;
mod payer_extractor;

pub use bank_identifiers::{is_valid_iban_digits, is_valid_national_id, normalize_iban, IBAN_DIGITS};
pub use payer_extractor::{extract_payer, PayerHints};
