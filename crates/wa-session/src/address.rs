//! Recipient addressing.

/// Domain suffix the messaging provider expects on individual recipients.
pub const DEFAULT_ADDRESS_SUFFIX: &str = "@c.us";

/// Convert a recipient into the provider's addressing form.
///
/// Appends `suffix` unless the recipient already ends with it. This is not a
/// validation step: malformed numbers are passed through for the provider to
/// reject.
pub fn normalize_recipient(recipient: &str, suffix: &str) -> String {
    if recipient.ends_with(suffix) {
        recipient.to_string()
    } else {
        format!("{recipient}{suffix}")
    }
}
