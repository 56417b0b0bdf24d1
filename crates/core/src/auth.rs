/// Exact membership test against a comma-separated allow-list.
///
/// Entries are not trimmed: `"U1, U2"` authorizes `U1` and `" U2"`, not `U2`.
pub fn is_authorized(identity: &str, allow_list: &str) -> bool {
    allow_list.split(',').any(|entry| entry == identity)
}
