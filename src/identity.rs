// 🪪 Viewer Identity - pseudonymous per-device id + display name
//
// The id is generated once per store and reused forever after. It only
// decides which private library entries a viewer sees; it is not auth.

use crate::storage::{Store, KEY_USER_ID, KEY_USER_NAME};

/// Author name used when none has been set
pub const ANONYMOUS: &str = "Anonymous";

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// `len` random lowercase base36 characters
pub fn random_base36(len: usize) -> String {
    let mut out = String::with_capacity(len);
    while out.len() < len {
        let mut n = uuid::Uuid::new_v4().as_u128();
        // 24 digits fit comfortably in the 122 random bits
        for _ in 0..24 {
            if out.len() == len {
                break;
            }
            out.push(BASE36[(n % 36) as usize] as char);
            n /= 36;
        }
    }
    out
}

fn generate_user_id() -> String {
    format!("user_{}", random_base36(9))
}

/// Stable viewer id, created and persisted on first use.
///
/// If the store cannot be written the fresh id is still returned (and a new
/// one will be made next session).
pub fn viewer_id(store: &Store) -> String {
    match store.get(KEY_USER_ID) {
        Ok(Some(id)) if !id.trim().is_empty() => return id,
        Ok(_) => {}
        Err(e) => tracing::error!(error = %e, "could not read viewer id"),
    }

    let id = generate_user_id();
    if let Err(e) = store.set(KEY_USER_ID, &id) {
        tracing::error!(error = %e, "could not persist viewer id");
    } else {
        tracing::info!(viewer_id = %id, "generated viewer id");
    }
    id
}

/// Display name for saved entries
pub fn author_name(store: &Store) -> String {
    match store.get(KEY_USER_NAME) {
        Ok(Some(name)) if !name.trim().is_empty() => name,
        Ok(_) => ANONYMOUS.to_string(),
        Err(e) => {
            tracing::error!(error = %e, "could not read author name");
            ANONYMOUS.to_string()
        }
    }
}

pub fn set_author_name(store: &Store, name: &str) -> bool {
    match store.set(KEY_USER_NAME, name.trim()) {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(error = %e, "could not persist author name");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_base36_shape() {
        let s = random_base36(30);
        assert_eq!(s.len(), 30);
        assert!(s.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
        assert_ne!(random_base36(9), random_base36(9));
    }

    #[test]
    fn test_viewer_id_is_stable() {
        let store = Store::open_in_memory().unwrap();

        let first = viewer_id(&store);
        let second = viewer_id(&store);

        assert!(first.starts_with("user_"));
        assert_eq!(first.len(), "user_".len() + 9);
        assert_eq!(first, second);
        assert_eq!(store.get(KEY_USER_ID).unwrap(), Some(first));
    }

    #[test]
    fn test_existing_viewer_id_is_kept() {
        let store = Store::open_in_memory().unwrap();
        store.set(KEY_USER_ID, "user_fixed").unwrap();

        assert_eq!(viewer_id(&store), "user_fixed");
    }

    #[test]
    fn test_author_name_defaults_to_anonymous() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(author_name(&store), ANONYMOUS);

        assert!(set_author_name(&store, "  Ana  "));
        assert_eq!(author_name(&store), "Ana");
    }
}
