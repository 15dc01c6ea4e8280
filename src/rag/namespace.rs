//! Namespace resolution.
//!
//! A namespace partitions a shared index per tenant. Tenants may name any
//! shared namespace, but a namespace carrying a per-tenant prefix is only
//! honored for the tenant it belongs to; anything else is downgraded to the
//! shared default.

/// Shared namespace used when no tenant-specific one applies.
pub const DEFAULT_NAMESPACE: &str = "kb";

const USER_KB_PREFIX: &str = "user_kb_";
const MEMORY_USER_PREFIX: &str = "memory_user_";
const RESERVED_PREFIXES: [&str; 2] = [USER_KB_PREFIX, MEMORY_USER_PREFIX];

pub fn user_namespace(tenant_id: &str) -> String {
    format!("{}{}", USER_KB_PREFIX, tenant_id)
}

pub fn resolve_namespace(tenant_id: Option<&str>, requested: Option<&str>) -> String {
    let tenant_id = tenant_id.map(str::trim).filter(|id| !id.is_empty());
    let requested = requested.map(str::trim).filter(|ns| !ns.is_empty());

    let Some(requested) = requested else {
        return match tenant_id {
            Some(id) => user_namespace(id),
            None => DEFAULT_NAMESPACE.to_string(),
        };
    };

    match reserved_owner(requested) {
        Some(owner) if Some(owner) != tenant_id => {
            tracing::warn!(
                "Namespace '{}' belongs to another tenant; using '{}'",
                requested,
                DEFAULT_NAMESPACE
            );
            DEFAULT_NAMESPACE.to_string()
        }
        _ => requested.to_string(),
    }
}

/// Tenant id encoded in a reserved namespace, if the namespace is reserved.
fn reserved_owner(namespace: &str) -> Option<&str> {
    RESERVED_PREFIXES
        .iter()
        .find_map(|prefix| namespace.strip_prefix(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_namespace_uses_tenant_partition() {
        assert_eq!(resolve_namespace(Some("42"), None), "user_kb_42");
        assert_eq!(resolve_namespace(Some("42"), Some("  ")), "user_kb_42");
    }

    #[test]
    fn absent_namespace_and_tenant_use_default() {
        assert_eq!(resolve_namespace(None, None), DEFAULT_NAMESPACE);
        assert_eq!(resolve_namespace(Some(""), None), DEFAULT_NAMESPACE);
    }

    #[test]
    fn shared_namespace_is_accepted_as_is() {
        assert_eq!(resolve_namespace(Some("42"), Some("docs")), "docs");
        assert_eq!(resolve_namespace(None, Some("faq")), "faq");
    }

    #[test]
    fn own_reserved_namespaces_are_accepted() {
        assert_eq!(resolve_namespace(Some("42"), Some("user_kb_42")), "user_kb_42");
        assert_eq!(
            resolve_namespace(Some("42"), Some("memory_user_42")),
            "memory_user_42"
        );
    }

    #[test]
    fn foreign_reserved_namespaces_are_downgraded() {
        for tenant in [Some("42"), None] {
            assert_eq!(resolve_namespace(tenant, Some("user_kb_7")), DEFAULT_NAMESPACE);
            assert_eq!(
                resolve_namespace(tenant, Some("memory_user_7")),
                DEFAULT_NAMESPACE
            );
        }
    }

    #[test]
    fn suffix_collisions_do_not_grant_access() {
        // "142" ends with "42" but is a different tenant.
        assert_eq!(resolve_namespace(Some("42"), Some("user_kb_142")), DEFAULT_NAMESPACE);
        assert_eq!(resolve_namespace(Some("42"), Some("user_kb_")), DEFAULT_NAMESPACE);
    }

    #[test]
    fn resolution_is_idempotent() {
        let cases = [
            (Some("42"), None),
            (Some("42"), Some("user_kb_42")),
            (Some("42"), Some("user_kb_7")),
            (None, Some("docs")),
            (None, None),
        ];
        for (tenant, requested) in cases {
            let first = resolve_namespace(tenant, requested);
            assert_eq!(first, resolve_namespace(tenant, requested));
            assert_eq!(first, resolve_namespace(tenant, Some(first.as_str())));
        }
    }
}
