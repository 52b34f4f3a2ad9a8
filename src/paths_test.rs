use super::*;

#[test]
fn default_matches_auth_endpoints() {
    let matcher = PublicPathMatcher::default();
    assert!(matcher.is_public("/api/auth/login"));
    assert!(matcher.is_public("/api/auth/register"));
    assert!(matcher.is_public("/api/auth/refresh"));
    assert!(matcher.is_public("/login"));
    assert!(matcher.is_public("/register"));
}

#[test]
fn default_leaves_protected_endpoints_alone() {
    let matcher = PublicPathMatcher::default();
    assert!(!matcher.is_public("/api/auth/me"));
    assert!(!matcher.is_public("/api/auth/logout"));
    assert!(!matcher.is_public("/api/data-contracts"));
    assert!(!matcher.is_public("/"));
}

#[test]
fn query_string_is_ignored() {
    let matcher = PublicPathMatcher::default();
    assert!(!matcher.is_public("/api/auth/me?next=/login"));
    assert!(matcher.is_public("/login?next=/dashboard"));
}

#[test]
fn custom_patterns_replace_defaults() {
    let matcher = PublicPathMatcher::new(["/public/"]);
    assert!(matcher.is_public("/public/status"));
    assert!(!matcher.is_public("/api/auth/login"));
}

#[test]
fn empty_patterns_are_dropped() {
    let matcher = PublicPathMatcher::new(["", "/login"]);
    assert_eq!(matcher.patterns(), ["/login".to_owned()]);
    assert!(!matcher.is_public("/api/auth/me"));
}

#[test]
fn no_patterns_matches_nothing() {
    let matcher = PublicPathMatcher::new(Vec::<String>::new());
    assert!(!matcher.is_public("/api/auth/login"));
}
