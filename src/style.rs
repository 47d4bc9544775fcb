//! Mercalli intensity styling: the fixed color ramp and Roman numeral labels.

/// One hex color per integer MMI class, index 0 through 12. Values below the
/// table floor clamp to the first entry, values above clamp to the last.
const MMI_COLORS: [&str; 13] = [
    "#ffffff", // 0  - not felt
    "#ffffff", // 1
    "#209fff", // 2
    "#00cfff", // 3
    "#55ffff", // 4
    "#aaffff", // 5
    "#ffff00", // 6
    "#ffaa00", // 7
    "#ff7f00", // 8
    "#ff0000", // 9
    "#d00000", // 10
    "#880000", // 11
    "#440000", // 12
];

const ROMAN_NUMERALS: [&str; 13] = [
    "0", "I", "II", "III", "IV", "V", "VI", "VII", "VIII", "IX", "X", "XI", "XII",
];

/// Deterministic color for an intensity value, keyed by the rounded class.
pub fn mmi_color(intensity: f64) -> &'static str {
    let class = intensity.round();
    if class <= 0.0 {
        return MMI_COLORS[0];
    }
    let index = (class as usize).min(MMI_COLORS.len() - 1);
    MMI_COLORS[index]
}

/// Roman numeral for an integer intensity level. Bounded to 0..=12; anything
/// outside that range (or non-finite) has no label.
pub fn romanize(level: f64) -> Option<&'static str> {
    if !level.is_finite() || level < 0.0 {
        return None;
    }
    let index = level.round() as usize;
    ROMAN_NUMERALS.get(index).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn romanize_covers_whole_scale() {
        assert_eq!(romanize(1.0), Some("I"));
        assert_eq!(romanize(5.0), Some("V"));
        assert_eq!(romanize(12.0), Some("XII"));
        assert_eq!(romanize(0.0), Some("0"));
    }

    #[test]
    fn romanize_rejects_out_of_scale() {
        assert_eq!(romanize(13.0), None);
        assert_eq!(romanize(-1.0), None);
        assert_eq!(romanize(f64::NAN), None);
    }

    #[test]
    fn romanize_rounds_to_nearest_class() {
        assert_eq!(romanize(4.4), Some("IV"));
        assert_eq!(romanize(4.6), Some("V"));
    }

    #[test]
    fn colors_clamp_at_scale_ends() {
        assert_eq!(mmi_color(-3.0), "#ffffff");
        assert_eq!(mmi_color(5.0), "#aaffff");
        assert_eq!(mmi_color(20.0), "#440000");
    }
}
