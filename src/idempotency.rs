use sha2::{Digest, Sha256};

/// Compound key for a (user, item) association.
///
/// Upstream user names and item ids never contain `|`, so the joined string is unambiguous.
pub fn association_key(user_id: &str, item_id: &str) -> String {
    let mut s = String::with_capacity(user_id.len() + item_id.len() + 1);
    s.push_str(user_id);
    s.push('|');
    s.push_str(item_id);

    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    let out = hasher.finalize();
    hex::encode(out)
}
