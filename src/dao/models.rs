//! Key layout shared by every backend.
//!
//! The layout matches the keys written by earlier deployments of the canvas so an existing
//! dataset keeps working: cells are `"{x}x{y}"`, placement cooldowns `"set_timeout:{ip}"`
//! and snapshot cooldowns `"get_timeout:{ip}"`.

/// Prefix of placement cooldown records.
pub const PLACEMENT_RECORD_PREFIX: &str = "set_timeout:";
/// Prefix of snapshot cooldown records.
pub const SNAPSHOT_RECORD_PREFIX: &str = "get_timeout:";

/// Key holding the color of the cell at `(x, y)`.
pub fn cell_key(x: u32, y: u32) -> String {
    format!("{x}x{y}")
}

/// Key holding a rate-limit record for `identity` under the given prefix.
pub fn record_key(prefix: &str, identity: &str) -> String {
    format!("{prefix}{identity}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_keys_use_decimal_coordinates() {
        assert_eq!(cell_key(3, 4), "3x4");
        assert_eq!(cell_key(0, 1023), "0x1023");
    }

    #[test]
    fn record_keys_are_prefixed_by_kind() {
        assert_eq!(
            record_key(PLACEMENT_RECORD_PREFIX, "10.0.0.1"),
            "set_timeout:10.0.0.1"
        );
        assert_eq!(
            record_key(SNAPSHOT_RECORD_PREFIX, "::1"),
            "get_timeout:::1"
        );
    }
}
