//! Formatting helpers for the admin list screens

use rust_decimal::Decimal;

/// Format a phone number for display.
///
/// Ten digits read as a mobile number `(XXX) XXX-XXXX`, seven as a local
/// line `XXX-XXXX`; anything else is shown as entered.
pub fn format_phone(phone: Option<&str>) -> String {
    let Some(phone) = phone.filter(|p| !p.trim().is_empty()) else {
        return "Sin teléfono".to_string();
    };
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    match digits.len() {
        10 => format!("({}) {}-{}", &digits[..3], &digits[3..6], &digits[6..]),
        7 => format!("{}-{}", &digits[..3], &digits[3..]),
        _ => phone.to_string(),
    }
}

/// `$1,234,567.89`; absent or zero amounts render as `-`
pub fn format_currency(amount: Option<Decimal>) -> String {
    let amount = match amount {
        Some(a) if !a.is_zero() => a.round_dp(2),
        _ => return "-".to_string(),
    };

    let fixed = format!("{:.2}", amount.abs());
    let (whole, cents) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, c) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    let sign = if amount.is_sign_negative() { "-" } else { "" };
    format!("{}${}.{}", sign, grouped, cents)
}

/// Shorten `text` to at most `max` characters, marking the cut with `...`
pub fn truncate_summary(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let keep = max.saturating_sub(3);
    let mut short: String = text.chars().take(keep).collect();
    short.push_str("...");
    short
}

fn fold(c: char) -> char {
    match c {
        'á' | 'à' | 'ä' | 'â' | 'Á' | 'À' | 'Ä' | 'Â' => 'a',
        'é' | 'è' | 'ë' | 'ê' | 'É' | 'È' | 'Ë' | 'Ê' => 'e',
        'í' | 'ì' | 'ï' | 'î' | 'Í' | 'Ì' | 'Ï' | 'Î' => 'i',
        'ó' | 'ò' | 'ö' | 'ô' | 'Ó' | 'Ò' | 'Ö' | 'Ô' => 'o',
        'ú' | 'ù' | 'ü' | 'û' | 'Ú' | 'Ù' | 'Ü' | 'Û' => 'u',
        'ñ' | 'Ñ' => 'n',
        'ç' | 'Ç' => 'c',
        other => other.to_ascii_lowercase(),
    }
}

/// URL slug for a listing: the folded title followed by the reference
pub fn slugify(title: Option<&str>, reference: i64) -> String {
    let mut slug = String::new();
    for c in title.unwrap_or_default().chars().map(fold) {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        format!("inmueble-{}", reference)
    } else {
        format!("{}-{}", slug, reference)
    }
}
