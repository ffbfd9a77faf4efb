//! Free-text payer identification for bank statement lines.
//!
//! Statement descriptions are written by whichever bank or channel originated the transfer, so there is no fixed
//! format. Each identifier is found by a list of heuristics tried in order, and every candidate goes through a
//! plausibility check (length, shape, checksum) before it is accepted. Everything here is pure so that the heuristics
//! can be regression-tested against the fixture corpus in `tests/fixtures/payer_descriptions.json`.
use std::sync::OnceLock;

use pay_common::helpers::{digits_only, normalize_digits};
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{is_valid_iban_digits, is_valid_national_id, IBAN_DIGITS};

/// Everything that could be recovered about the sender of a statement line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayerHints {
    /// 24 normalized IBAN digits, without the country prefix.
    pub iban: Option<String>,
    pub name: Option<String>,
    /// Counter-account (or card) number, digits only.
    pub account_number: Option<String>,
    pub national_id: Option<String>,
}

impl PayerHints {
    pub fn is_empty(&self) -> bool {
        self.iban.is_none() && self.name.is_none() && self.account_number.is_none() && self.national_id.is_none()
    }

    /// True when at least one identifier that can be matched against the payer registry was found.
    pub fn is_identifiable(&self) -> bool {
        self.iban.is_some() || self.account_number.is_some() || self.national_id.is_some()
    }
}

macro_rules! static_regex {
    ($name:ident, $pattern:expr) => {
        fn $name() -> &'static Regex {
            static RE: OnceLock<Regex> = OnceLock::new();
            RE.get_or_init(|| Regex::new($pattern).expect("static regex pattern is valid"))
        }
    };
}

static_regex!(re_prefixed_iban, r"(?i)IR[\s\-]*((?:\d[\s\-]*){24})(\d?)");
static_regex!(re_labelled_iban, r"(?i)(?:شماره\s*شبا|شبا|sheba|iban)\s*[:：#]?\s*((?:\d[\s\-]*){24})(\d?)");
static_regex!(
    re_labelled_national_id,
    r"(?:کد\s*ملی|کدملی|شناسه\s*ملی|(?i:national\s*(?:id|code)|nid))\s*[:：#]?\s*(\d{10})(\d?)"
);
static_regex!(
    re_labelled_account,
    r"(?:شماره\s*حساب|حساب|سپرده|(?i:acc(?:ount)?(?:\s*no)?\.?))\s*[:：#]?\s*(\d[\d.\-/]{5,30}\d)"
);
static_regex!(re_dashed_account, r"(\d{3,4}[.\-]\d{2,4}[.\-]\d{5,9}[.\-]\d{1,3})");
static_regex!(re_date, r"^\d{2,4}[/.\-]\d{1,2}[/.\-]\d{1,4}$");
static_regex!(
    re_labelled_name,
    r"(?:واریز\s*کننده|فرستنده|به\s*نام|از\s*طرف|(?i:from|name|payer|sender))\s*[:：]?\s*(\p{L}[\p{L}\s.\x{200C}]{1,80})"
);

const STOP_WORDS: &[&str] = &[
    "انتقال", "پایا", "ساتنا", "واریز", "برداشت", "شماره", "حساب", "شبا", "کارت", "کد", "ملی", "بابت", "از", "به", "طرف",
    "سپرده", "بانک", "اینترنتی", "همراه", "خرید", "پرداخت", "کننده", "نام", "فرستنده", "شناسه", "مبلغ", "تاریخ", "from",
    "to", "transfer", "deposit", "acc", "account", "iban", "sheba", "card", "name", "ref", "payment", "paya", "satna",
    "id", "national", "no", "payer", "sender", "ir", "کارمزد", "سود", "خدمات",
];

const MIN_ACCOUNT_DIGITS: usize = 8;
const MAX_ACCOUNT_DIGITS: usize = 20;

/// Extracts payer identifiers from a statement description. Identifiers are searched in priority order (IBAN, display
/// name, counter-account number, national id) and later searches ignore digits already claimed by earlier ones.
pub fn extract_payer(description: &str) -> PayerHints {
    let text = normalize_digits(description);
    let iban = find_iban(&text);
    let name = find_name(&text);
    let national_id = find_national_id(&text);
    let account_number = find_account_number(&text, iban.as_deref(), national_id.as_deref());
    PayerHints { iban, name, account_number, national_id }
}

fn find_iban(text: &str) -> Option<String> {
    let from_pattern = |re: &Regex| {
        re.captures_iter(text).find_map(|c| {
            let trailing = c.get(2).map(|m| m.as_str()).unwrap_or_default();
            let digits = digits_only(c.get(1)?.as_str());
            (trailing.is_empty() && digits.len() == IBAN_DIGITS).then_some(digits)
        })
    };
    from_pattern(re_prefixed_iban())
        .or_else(|| from_pattern(re_labelled_iban()))
        .or_else(|| {
            digit_runs(text).find(|run| run.len() == IBAN_DIGITS && is_valid_iban_digits(run)).map(String::from)
        })
}

fn find_national_id(text: &str) -> Option<String> {
    re_labelled_national_id()
        .captures_iter(text)
        .find_map(|c| {
            let trailing = c.get(2).map(|m| m.as_str()).unwrap_or_default();
            let code = c.get(1)?.as_str();
            (trailing.is_empty() && is_valid_national_id(code)).then(|| code.to_string())
        })
        .or_else(|| digit_runs(text).find(|run| is_valid_national_id(run)).map(String::from))
}

fn find_account_number(text: &str, iban: Option<&str>, national_id: Option<&str>) -> Option<String> {
    let plausible = |raw: &str| -> Option<String> {
        if re_date().is_match(raw) {
            return None;
        }
        let digits = digits_only(raw);
        let claimed = Some(digits.as_str()) == iban || Some(digits.as_str()) == national_id;
        let len_ok = (MIN_ACCOUNT_DIGITS..=MAX_ACCOUNT_DIGITS).contains(&digits.len());
        (len_ok && !claimed && !looks_like_compact_timestamp(&digits)).then_some(digits)
    };
    let labelled = re_labelled_account().captures_iter(text).find_map(|c| plausible(c.get(1)?.as_str()));
    labelled
        .or_else(|| {
            re_dashed_account()
                .find_iter(text)
                .filter(|m| is_isolated(text, m.start(), m.end()))
                .find_map(|m| plausible(m.as_str()))
        })
        .or_else(|| {
            digit_runs(text).filter(|run| (11..=16).contains(&run.len())).find_map(plausible)
        })
}

fn find_name(text: &str) -> Option<String> {
    let labelled = re_labelled_name().captures_iter(text).find_map(|c| plausible_name(c.get(1)?.as_str()));
    labelled.or_else(|| {
        text.split(['-', '|', '/', '،', ',', '(', ')', ':'])
            .filter(|segment| segment.chars().all(|c| c.is_alphabetic() || c.is_whitespace() || c == '\u{200C}'))
            .filter(|segment| segment.split_whitespace().count() >= 2)
            .find_map(|segment| {
                let words = segment.split_whitespace().collect::<Vec<&str>>();
                if words.iter().any(|w| is_stop_word(w)) {
                    return None;
                }
                plausible_name(segment)
            })
    })
}

/// Takes words up to the first keyword and accepts the result if it still reads like a person's name.
fn plausible_name(candidate: &str) -> Option<String> {
    let words = candidate
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| c == '.' || c == '\u{200C}'))
        .take_while(|w| !is_stop_word(w))
        .filter(|w| !w.is_empty())
        .take(5)
        .collect::<Vec<&str>>();
    let name = words.join(" ");
    let letters = name.chars().filter(|c| c.is_alphabetic()).count();
    let ok = letters >= 3 && name.chars().count() <= 60 && words.iter().any(|w| w.chars().count() >= 2);
    ok.then_some(name)
}

fn is_stop_word(word: &str) -> bool {
    let lower = word.to_lowercase();
    STOP_WORDS.contains(&lower.as_str())
}

/// Maximal runs of ASCII digits.
fn digit_runs(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !c.is_ascii_digit()).filter(|run| !run.is_empty())
}

fn is_isolated(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].chars().next_back();
    let after = text[end..].chars().next();
    !before.is_some_and(|c| c.is_ascii_digit()) && !after.is_some_and(|c| c.is_ascii_digit())
}

/// Catches `YYYYMMDD`, `YYYYMMDDhhmm` and `YYYYMMDDhhmmss` runs, in both the Gregorian and the Solar Hijri calendar.
fn looks_like_compact_timestamp(digits: &str) -> bool {
    if ![8, 12, 14].contains(&digits.len()) {
        return false;
    }
    let field = |r: std::ops::Range<usize>| digits[r].parse::<u32>().unwrap_or(0);
    let year = field(0..4);
    let month = field(4..6);
    let day = field(6..8);
    let plausible_year = (1300..=1499).contains(&year) || (1900..=2099).contains(&year);
    plausible_year && (1..=12).contains(&month) && (1..=31).contains(&day)
}
