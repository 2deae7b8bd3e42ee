/// Sompi per KAS: `10^8 sompi == 1 KAS`.
pub const SOMPI_PER_KAS: u64 = 100_000_000;

/// Convert a whole-and-fractional KAS amount (as a decimal string, e.g.
/// `"12.5"`) into sompi. Exact for up to 8 fractional digits; never goes
/// through a float.
pub fn kas_str_to_sompi(kas: &str) -> Option<u64> {
    let (whole, frac) = match kas.split_once('.') {
        Some((w, f)) => (w, f),
        None => (kas, ""),
    };
    if frac.len() > 8 || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let whole: u64 = whole.parse().ok()?;
    let mut frac_digits = frac.to_string();
    while frac_digits.len() < 8 {
        frac_digits.push('0');
    }
    let frac_value: u64 = if frac_digits.is_empty() {
        0
    } else {
        frac_digits.parse().ok()?
    };
    whole.checked_mul(SOMPI_PER_KAS)?.checked_add(frac_value)
}

/// Convert an exact KAS integer amount to sompi (no fractional part).
pub fn kas_to_sompi(kas: u64) -> u64 {
    kas.saturating_mul(SOMPI_PER_KAS)
}

/// Render sompi as a KAS decimal string, trimming trailing zero fraction
/// digits (but keeping at least one digit before the decimal point).
pub fn sompi_to_kas(sompi: u64) -> String {
    let whole = sompi / SOMPI_PER_KAS;
    let frac = sompi % SOMPI_PER_KAS;
    if frac == 0 {
        return whole.to_string();
    }
    let mut frac_str = format!("{:08}", frac);
    while frac_str.ends_with('0') {
        frac_str.pop();
    }
    format!("{whole}.{frac_str}")
}

/// Parse an amount arriving from the wire as a decimal string of sompi
/// (arbitrary-precision on the wire, exact `u64` here — see DESIGN.md).
pub fn parse_wire_sompi(raw: &str) -> Option<u64> {
    raw.trim().parse::<u64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kas_to_sompi_exact_for_whole_kas() {
        assert_eq!(kas_to_sompi(1), SOMPI_PER_KAS);
        assert_eq!(kas_to_sompi(50), 50 * SOMPI_PER_KAS);
    }

    #[test]
    fn kas_str_round_trips_up_to_eight_fractional_digits() {
        assert_eq!(kas_str_to_sompi("1.00000001"), Some(SOMPI_PER_KAS + 1));
        assert_eq!(kas_str_to_sompi("0.1"), Some(10_000_000));
        assert_eq!(sompi_to_kas(SOMPI_PER_KAS + 1), "1.00000001");
        assert_eq!(sompi_to_kas(SOMPI_PER_KAS), "1");
    }

    #[test]
    fn rejects_too_many_fractional_digits() {
        assert_eq!(kas_str_to_sompi("1.123456789"), None);
    }

    #[test]
    fn wire_amount_never_goes_through_float() {
        assert_eq!(parse_wire_sompi("10000000000"), Some(10_000_000_000));
        assert_eq!(parse_wire_sompi("not-a-number"), None);
    }
}
