//! Decodes and encodes the `<driver-name>.<slot>.<suffix>` grammar used to
//! name endpoint socket files in the base directory.

/// The default suffix used when none is configured, matching the
/// original `#define SUFFIX "drv"`.
pub const DEFAULT_SUFFIX: &str = "drv";

/// Parses a socket file name (or a path ending in one) into its
/// `(driver-name, slot)` identity.
///
/// Everything up to and including the last `/` is ignored, so this can
/// be called with either a bare file name or a full path. Returns
/// borrowed slices into `name`; never allocates.
///
/// Grammar: `<name>.<slot>.<suffix>` where `<name>` is one or more bytes
/// excluding `.` and `/`, `<slot>` is one or more ASCII digits, and
/// `<suffix>` must match `suffix` exactly.
pub fn parse<'a>(name: &'a str, suffix: &str) -> Option<(&'a str, u32)> {
    let base = match name.rfind('/') {
        Some(idx) => &name[idx + 1..],
        None => name,
    };

    let first_dot = base.find('.')?;
    let (driver_name, rest) = base.split_at(first_dot);

    if driver_name.is_empty() {
        return None;
    }

    let rest = &rest[1..]; // drop the leading '.'

    let second_dot = rest.find('.')?;
    let (slot_str, rest) = rest.split_at(second_dot);
    let rest = &rest[1..]; // drop the leading '.'

    if slot_str.is_empty() || !slot_str.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    if rest != suffix {
        return None;
    }

    let slot = slot_str.parse::<u32>().ok()?;

    Some((driver_name, slot))
}

/// Builds the canonical file name for an endpoint, the inverse of
/// [`parse`]. Used by tests to exercise the round-trip property and by
/// nothing else in the supervisor (the supervisor only ever parses names
/// it is handed by the filesystem).
pub fn format(name: &str, slot: u32, suffix: &str) -> String {
    format!("{name}.{slot}.{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_name() {
        assert_eq!(parse("thermo.3.drv", "drv"), Some(("thermo", 3)));
    }

    #[test]
    fn strips_leading_path() {
        assert_eq!(
            parse("/var/run/drvshell/thermo.3.drv", "drv"),
            Some(("thermo", 3))
        );
    }

    #[test]
    fn rejects_wrong_suffix() {
        assert_eq!(parse("thermo.3.sock", "drv"), None);
    }

    #[test]
    fn rejects_empty_name() {
        assert_eq!(parse(".3.drv", "drv"), None);
    }

    #[test]
    fn rejects_empty_slot() {
        assert_eq!(parse("thermo..drv", "drv"), None);
    }

    #[test]
    fn rejects_non_numeric_slot() {
        assert_eq!(parse("thermo.abc.drv", "drv"), None);
    }

    #[test]
    fn rejects_name_with_no_dots() {
        assert_eq!(parse("thermo", "drv"), None);
    }

    #[test]
    fn rejects_extra_segment() {
        assert_eq!(parse("thermo.3.4.drv", "drv"), None);
    }

    #[test]
    fn round_trips() {
        for (name, slot) in [("thermo", 3u32), ("a", 0), ("pump-2", 999)] {
            let encoded = format(name, slot, DEFAULT_SUFFIX);
            assert_eq!(parse(&encoded, DEFAULT_SUFFIX), Some((name, slot)));
        }
    }
}
