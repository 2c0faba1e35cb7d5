//! Value normalization
//!
//! Pure helpers shared by graph construction (for values known upfront) and
//! `map` continuations (for values produced by other components).

/// Maximum length of an Azure storage account name
pub const STORAGE_ACCOUNT_MAX_LEN: usize = 24;

const ACCOUNT_SUFFIX: &str = "sa";

/// Appends a trailing `.` unless already present
pub fn ensure_trailing_dot(value: &str) -> String {
    if value.ends_with('.') {
        value.to_string()
    } else {
        format!("{}.", value)
    }
}

/// Fully qualified record name for `label` under `domain`.
///
/// A domain that already starts with the label is returned as is, so
/// `fqdn("www.example.com", "www")` does not become `www.www.example.com.`.
pub fn fqdn(domain: &str, label: &str) -> String {
    let domain = ensure_trailing_dot(domain);
    if domain.starts_with(&format!("{}.", label)) {
        domain
    } else {
        format!("{}.{}", label, domain)
    }
}

/// Record data for a single CNAME target
pub fn record_data(target: &str) -> Vec<String> {
    vec![ensure_trailing_dot(target)]
}

/// Storage account name derived from a component prefix.
///
/// Strips `-` and `_`, keeps at most `max_len - 2` characters and appends
/// `sa`. Short prefixes are not padded.
pub fn sanitize_account_name(prefix: &str, max_len: usize) -> String {
    let keep = max_len.saturating_sub(ACCOUNT_SUFFIX.len());
    let mut name: String = prefix
        .chars()
        .filter(|c| *c != '-' && *c != '_')
        .take(keep)
        .collect();
    name.push_str(ACCOUNT_SUFFIX);
    name
}

/// Host part of a URL: drops a leading `scheme://` and everything from the
/// first `/` after it.
pub fn extract_host(url: &str) -> String {
    let rest = match url.split_once("://") {
        Some((scheme, rest))
            if !scheme.is_empty()
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')) =>
        {
            rest
        }
        _ => url,
    };
    match rest.find('/') {
        Some(end) => rest[..end].to_string(),
        None => rest.to_string(),
    }
}

/// `prefix-project-environment`, the naming scheme of every component
pub fn component_name(prefix: &str, project: &str, environment: &str) -> String {
    format!("{}-{}-{}", prefix, project, environment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_ensure_trailing_dot() {
        assert_eq!(ensure_trailing_dot("example.com"), "example.com.");
        assert_eq!(ensure_trailing_dot("example.com."), "example.com.");
        assert_eq!(ensure_trailing_dot(""), ".");
    }

    #[test]
    fn test_fqdn() {
        assert_eq!(fqdn("example.com", "www"), "www.example.com.");
        assert_eq!(fqdn("example.com.", "www"), "www.example.com.");
        assert_eq!(fqdn("www.example.com", "www"), "www.example.com.");
        assert_eq!(fqdn("example.com", "backup"), "backup.example.com.");
        // Only a whole leading label counts
        assert_eq!(fqdn("wwwexample.com", "www"), "www.wwwexample.com.");
    }

    #[test]
    fn test_record_data() {
        assert_eq!(record_data("cdn.example.com"), vec!["cdn.example.com."]);
        assert_eq!(record_data("cdn.example.com."), vec!["cdn.example.com."]);
    }

    #[test]
    fn test_sanitize_account_name() {
        assert_eq!(
            sanitize_account_name("azure-dev", STORAGE_ACCOUNT_MAX_LEN),
            "azuredevsa"
        );
        assert_eq!(sanitize_account_name("az", STORAGE_ACCOUNT_MAX_LEN), "azsa");
        assert_eq!(
            sanitize_account_name("azure-my_project-production", STORAGE_ACCOUNT_MAX_LEN),
            "azuremyprojectproductisa"
        );
        assert_eq!(sanitize_account_name("anything", 1), "sa");
    }

    #[test]
    fn test_extract_host() {
        assert_eq!(
            extract_host("https://acctsa.blob.core.windows.net/"),
            "acctsa.blob.core.windows.net"
        );
        assert_eq!(extract_host("http://example.com/a/b"), "example.com");
        assert_eq!(extract_host("git+ssh://host:22/repo"), "host:22");
        assert_eq!(extract_host("example.com/path"), "example.com");
        assert_eq!(extract_host("example.com"), "example.com");
    }

    #[test]
    fn test_component_name() {
        assert_eq!(component_name("aws", "site", "dev"), "aws-site-dev");
    }

    proptest! {
        #[test]
        fn prop_ensure_trailing_dot_idempotent(s in ".*") {
            let once = ensure_trailing_dot(&s);
            prop_assert!(once.ends_with('.'));
            prop_assert_eq!(ensure_trailing_dot(&once), once);
        }

        #[test]
        fn prop_fqdn_idempotent(
            domain in "[a-z]{1,10}(\\.[a-z]{1,10}){0,2}",
            label in "[a-z]{1,8}",
        ) {
            let name = fqdn(&domain, &label);
            prop_assert_eq!(fqdn(&name, &label), name.clone());
            let prefix = format!("{}.", label);
            prop_assert!(name.starts_with(&prefix));
        }

        #[test]
        fn prop_long_prefix_fills_account_name(prefix in "[a-z]{30,60}") {
            let name = sanitize_account_name(&prefix, STORAGE_ACCOUNT_MAX_LEN);
            prop_assert_eq!(name.len(), STORAGE_ACCOUNT_MAX_LEN);
            prop_assert!(name.ends_with("sa"));
        }

        #[test]
        fn prop_account_name_bounded(prefix in "[a-z_-]{0,40}", max_len in 2usize..40) {
            let name = sanitize_account_name(&prefix, max_len);
            prop_assert!(name.chars().count() <= max_len);
            prop_assert!(name.ends_with("sa"));
            prop_assert!(!name.contains('-') && !name.contains('_'));
        }
    }
}
