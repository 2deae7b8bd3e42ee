/// Platform (treasury) fee policy (§4.2): `amount * bps / 10_000`, clamped to
/// `[min, max]`. Returns `None` when no treasury is configured.
pub fn platform_fee(amount_sompi: u64, bps: u64, min_sompi: u64, max_sompi: u64, treasury_configured: bool) -> Option<u64> {
    if !treasury_configured {
        return None;
    }
    let bps_fee = (amount_sompi as u128 * bps as u128) / 10_000;
    let clamped = bps_fee.clamp(min_sompi as u128, max_sompi as u128);
    Some(clamped as u64)
}

/// Transaction mass estimate: `239 + 142 * n_inputs + 51 * n_outputs`.
pub fn estimate_mass(n_inputs: usize, n_outputs: usize) -> u64 {
    239 + 142 * n_inputs as u64 + 51 * n_outputs as u64
}

/// Network fee policy (§4.2): `ceil(mass * feerate)`, scaled by a
/// safety-bps multiplier, then clamped to `[floor, ceiling]`.
pub fn network_fee(mass: u64, feerate_sompi_per_gram: f64, safety_bps: u64, floor_sompi: u64, ceiling_sompi: u64) -> u64 {
    let raw = (mass as f64 * feerate_sompi_per_gram).ceil().max(0.0) as u64;
    let scaled = (raw as u128 * safety_bps as u128) / 10_000;
    (scaled as u64).clamp(floor_sompi, ceiling_sompi)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, false, None)]
    #[case(1_000_000, true, Some(100_000))] // below bps floor -> clamps to MIN
    #[case(33_333_334, true, Some(100_000))] // bps_fee == 100_000.02 -> floor at boundary rounds down, still clamps to MIN
    #[case(1_000_000_000_000, true, Some(100_000_000))] // far above -> clamps to MAX
    fn platform_fee_boundaries(#[case] amount: u64, #[case] configured: bool, #[case] expected: Option<u64>) {
        assert_eq!(platform_fee(amount, 30, 100_000, 100_000_000, configured), expected);
    }

    #[test]
    fn platform_fee_applies_bps_between_clamps() {
        // 10 KAS = 1_000_000_000 sompi; 30 bps = 3_000_000, within [100_000, 100_000_000].
        assert_eq!(platform_fee(1_000_000_000, 30, 100_000, 100_000_000, true), Some(3_000_000));
    }

    #[test]
    fn mass_formula_matches_spec() {
        assert_eq!(estimate_mass(1, 2), 239 + 142 + 102);
        assert_eq!(estimate_mass(0, 0), 239);
    }

    #[rstest]
    #[case(0, 1.0, 11_500, 1_000, 200_000_000, 1_000)] // zero mass -> floor
    #[case(1_000_000, 1.0, 11_500, 1_000, 200_000_000, 200_000_000)] // huge -> ceiling
    fn network_fee_boundaries(
        #[case] mass: u64,
        #[case] feerate: f64,
        #[case] safety_bps: u64,
        #[case] floor: u64,
        #[case] ceiling: u64,
        #[case] expected: u64,
    ) {
        assert_eq!(network_fee(mass, feerate, safety_bps, floor, ceiling), expected);
    }

    #[test]
    fn network_fee_applies_safety_multiplier() {
        // mass=239, feerate=1.0 -> raw=239, *1.15 = 274 (integer division floor)
        let fee = network_fee(239, 1.0, 11_500, 1_000, 200_000_000);
        assert_eq!(fee, 1_000); // below floor after scaling, clamps up
    }
}
