//! Canonical keys used to compare participant emails against a client roster.
//!
//! Every function here is pure and total: malformed input produces an empty
//! key (or `None`) rather than an error.

/// Suffixes stripped from a punctuation-free domain, checked in this order.
pub const TLD_SUFFIXES: &[&str] =
    &["com", "net", "org", "io", "co", "ai", "app", "dev", "biz", "info", "us", "uk", "ca", "de"];

pub fn normalize_email(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Everything after the last `@`, lowercased. `None` when there is no `@`
/// or nothing follows it.
pub fn extract_domain(email: &str) -> Option<String> {
    let (_, domain) = email.rsplit_once('@')?;
    let domain = domain.trim().to_lowercase();
    (!domain.is_empty()).then_some(domain)
}

/// Lowercase and keep only `[a-z0-9]`.
pub fn normalize_key(value: &str) -> String {
    value
        .trim()
        .to_lowercase()
        .chars()
        .filter(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit())
        .collect()
}

/// Collapse a domain to a TLD-free key so `acmecorp.com` and `acmecorp.io`
/// compare equal.
///
/// The suffix check runs on the punctuation-free string, so a name that
/// merely ends in a listed suffix is stripped too (`beststudio.io` becomes
/// `beststud`). Stripping stops before the key would become empty.
pub fn domain_key(domain: &str) -> String {
    let mut key = normalize_key(domain);

    loop {
        let Some(suffix) = TLD_SUFFIXES.iter().find(|suffix| key.ends_with(*suffix)) else {
            break;
        };
        let remainder = &key[..key.len() - suffix.len()];
        if remainder.is_empty() {
            break;
        }
        key = remainder.to_string();
    }

    key
}

/// Business key for a client name; `None` when nothing alphanumeric remains.
pub fn business_key(name: &str) -> Option<String> {
    let key = normalize_key(name);
    (!key.is_empty()).then_some(key)
}

/// True when either key contains the other. Empty keys never match.
pub fn keys_overlap(left: &str, right: &str) -> bool {
    !left.is_empty() && !right.is_empty() && (left.contains(right) || right.contains(left))
}

#[cfg(test)]
mod tests {
    use super::{
        business_key, domain_key, extract_domain, keys_overlap, normalize_email, normalize_key,
    };

    #[test]
    fn normalize_email_lowercases_and_trims() {
        assert_eq!(normalize_email("  Jane@BestStudio.IO "), "jane@beststudio.io");
    }

    #[test]
    fn normalize_email_is_idempotent() {
        for raw in ["  Jane@BestStudio.IO ", "OWNER@acme.com", "", "no-at-sign"] {
            let once = normalize_email(raw);
            assert_eq!(normalize_email(&once), once);
        }
    }

    #[test]
    fn extract_domain_uses_last_at_sign() {
        assert_eq!(extract_domain("a@b@Acme.COM "), Some("acme.com".to_string()));
        assert_eq!(extract_domain("jane@beststudio.io"), Some("beststudio.io".to_string()));
        assert_eq!(extract_domain("nobody"), None);
        assert_eq!(extract_domain("trailing@"), None);
    }

    #[test]
    fn normalize_key_strips_non_alphanumerics() {
        assert_eq!(normalize_key("Best Studio, LLC."), "beststudiollc");
        assert_eq!(normalize_key("Café 42"), "caf42");
        assert_eq!(normalize_key("---"), "");
    }

    #[test]
    fn domain_key_collapses_across_tlds() {
        assert_eq!(domain_key("acmecorp.com"), "acmecorp");
        assert_eq!(domain_key("acmecorp.net"), "acmecorp");
        assert_eq!(domain_key("acmecorp.co.uk"), "acmecorp");
        assert_eq!(domain_key("beststudiomarketing.com"), "beststudiomarketing");
    }

    #[test]
    fn domain_key_over_strips_names_ending_in_a_listed_suffix() {
        // The suffix loop has no label boundaries: "beststudio" itself ends in "io".
        assert_eq!(domain_key("beststudio.io"), "beststud");
        assert_eq!(domain_key("disco.com"), "dis");
        assert_eq!(domain_key("thai.ai"), "th");
    }

    #[test]
    fn domain_key_never_strips_to_empty() {
        assert_eq!(domain_key("com"), "com");
        assert_eq!(domain_key("io.com"), "io");
        assert_eq!(domain_key("comcom"), "com");
        assert_eq!(domain_key(""), "");
    }

    #[test]
    fn domain_key_is_idempotent() {
        for raw in
            ["acmecorp.com", "beststudio.io", "acmecorp.co.uk", "com", "comcom", "x.y.z", ""]
        {
            let once = domain_key(raw);
            assert_eq!(domain_key(&once), once, "domain_key not idempotent for `{raw}`");
        }
    }

    #[test]
    fn business_key_rejects_names_without_alphanumerics() {
        assert_eq!(business_key("Best Studio"), Some("beststudio".to_string()));
        assert_eq!(business_key(" & "), None);
    }

    #[test]
    fn keys_overlap_checks_both_directions() {
        assert!(keys_overlap("beststudiomarketing", "beststudio"));
        assert!(keys_overlap("beststudio", "beststudiomarketing"));
        assert!(!keys_overlap("acme", "globex"));
        assert!(!keys_overlap("", "acme"));
    }
}
