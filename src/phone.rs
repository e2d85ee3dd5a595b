//! Phone number normalisation into WhatsApp chat addresses.
//!
//! `0812-3456-7890`, `+62 812 3456 7890` and `6281234567890@c.us` all map to
//! `6281234567890@c.us`. Group addresses (`...@g.us`) keep their id.

/// Address suffix for individual contacts.
pub const CONTACT_SUFFIX: &str = "@c.us";

/// Address suffix for groups.
pub const GROUP_SUFFIX: &str = "@g.us";

/// Country code substituted for a leading trunk `0`.
pub const DEFAULT_COUNTRY_CODE: &str = "62";

/// Normalise a user-supplied phone number into a chat address.
///
/// Never fails: garbage in produces a well-formed but unregistered address,
/// which the registration check rejects later. Applying it to its own output
/// returns the output unchanged.
pub fn format_number(raw: &str, country_code: &str) -> String {
    let raw = raw.trim();

    if let Some(group_id) = raw.strip_suffix(GROUP_SUFFIX) {
        // Legacy group ids are `<creator>-<timestamp>`; keep the dash.
        let cleaned: String = group_id
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == '-')
            .collect();
        return format!("{cleaned}{GROUP_SUFFIX}");
    }

    let local = raw.strip_suffix(CONTACT_SUFFIX).unwrap_or(raw);
    let digits: String = local.chars().filter(char::is_ascii_digit).collect();
    let digits = match digits.strip_prefix('0') {
        Some(rest) => format!("{country_code}{rest}"),
        None => digits,
    };

    format!("{digits}{CONTACT_SUFFIX}")
}

/// Whether an address points at a group chat.
pub fn is_group_address(address: &str) -> bool {
    address.ends_with(GROUP_SUFFIX)
}
