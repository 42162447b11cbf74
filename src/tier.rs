/// Byte thresholds separating the size tiers, smallest first.
const TIER_THRESHOLDS: [u64; 4] = [1_000_000, 100_000_000, 1_000_000_000, 10_000_000_000];

/// Highest tier returned by [`classify_tier`].
pub const MAX_TIER: u8 = TIER_THRESHOLDS.len() as u8;

/// Map a byte count to an ordinal tier (0..=4) used for visual weighting.
pub fn classify_tier(size: u64) -> u8 {
    TIER_THRESHOLDS
        .iter()
        .position(|&limit| size < limit)
        .map(|tier| tier as u8)
        .unwrap_or(MAX_TIER)
}

/// Human-readable byte count in binary units, one decimal place.
pub fn format_size(size: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = size as f64;
    let mut unit_index = 0;
    while value >= 1024.0 && unit_index < UNITS.len() - 1 {
        value /= 1024.0;
        unit_index += 1;
    }
    format!("{:.1} {}", value, UNITS[unit_index])
}
