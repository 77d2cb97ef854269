//! Ownership rules for identity-library storage keys.
//! One predicate serves both the persistent and the session-scoped scanner.

/// Expected identity-library cache schema version baked into the build.
pub const IDENTITY_CACHE_SCHEMA_VERSION: &str = "4.23.0";

/// Persistent-store key holding the schema version the cache was written under.
pub const CACHE_VERSION_KEY: &str = "portal.identity_cache.version";

/// Session-scoped one-shot flag set right before the guard forces a reload.
pub const CACHE_CLEARED_FLAG_KEY: &str = "portal.identity_cache.cleared";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreScope {
    Persistent,
    Session,
}

const PERSISTENT_FRAGMENTS: &[&str] = &["msal", "login", "authority", "interaction.status"];
const SESSION_FRAGMENTS: &[&str] = &["msal", "login", "interaction", "request.origin"];

impl StoreScope {
    fn fragments(self) -> &'static [&'static str] {
        match self {
            StoreScope::Persistent => PERSISTENT_FRAGMENTS,
            StoreScope::Session => SESSION_FRAGMENTS,
        }
    }
}

/// Whether `key` belongs to the identity library in the given store.
/// Case-insensitive substring match; in the persistent store a key whose name
/// is itself a JSON object is a legacy artifact and also matches.
pub fn looks_like_identity_library_key(key: &str, scope: StoreScope) -> bool {
    if key == CACHE_VERSION_KEY || key == CACHE_CLEARED_FLAG_KEY {
        return false;
    }
    let lower = key.to_ascii_lowercase();
    if scope.fragments().iter().any(|f| lower.contains(f)) {
        return true;
    }
    scope == StoreScope::Persistent && looks_like_json_object(key)
}

fn looks_like_json_object(s: &str) -> bool {
    let t = s.trim();
    t.starts_with('{') && t.ends_with('}')
}

/// Values starting with `{` or `[` must parse as JSON.
pub fn looks_json_shaped(value: &str) -> bool {
    let t = value.trim_start();
    t.starts_with('{') || t.starts_with('[')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persistent_fragments_match() {
        for k in [
            "msal.account.keys",
            "00000-0000.login.windows.net-accesstoken",
            "authority-metadata.https://login.example",
            "msal.interaction.status",
            "MSAL.Token.Keys",
        ] {
            assert!(looks_like_identity_library_key(k, StoreScope::Persistent), "{k}");
        }
        assert!(!looks_like_identity_library_key("portal.theme", StoreScope::Persistent));
        assert!(!looks_like_identity_library_key("interaction.hint", StoreScope::Persistent));
    }

    #[test]
    fn json_named_keys_are_legacy_artifacts() {
        assert!(looks_like_identity_library_key(r#"{"authority":"x","clientId":"y"}"#, StoreScope::Persistent));
        assert!(!looks_like_identity_library_key(r#"{"clientId":"y"}"#, StoreScope::Session));
    }

    #[test]
    fn session_scope_uses_narrower_set() {
        assert!(looks_like_identity_library_key("msal.request.state", StoreScope::Session));
        assert!(looks_like_identity_library_key("interaction.hint", StoreScope::Session));
        assert!(looks_like_identity_library_key("app.request.origin", StoreScope::Session));
        assert!(!looks_like_identity_library_key("authority-metadata", StoreScope::Session));
    }

    #[test]
    fn guard_markers_are_never_owned_by_the_library() {
        assert!(!looks_like_identity_library_key(CACHE_VERSION_KEY, StoreScope::Persistent));
        assert!(!looks_like_identity_library_key(CACHE_CLEARED_FLAG_KEY, StoreScope::Session));
    }

    #[test]
    fn json_shape_detection() {
        assert!(looks_json_shaped("{\"a\":1}"));
        assert!(looks_json_shaped("  [1,2"));
        assert!(!looks_json_shaped("plain-token"));
        assert!(!looks_json_shaped(""));
    }
}
