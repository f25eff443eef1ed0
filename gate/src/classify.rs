/// Route prefixes that must resolve to an identity before the handler runs.
pub const PROTECTED_PREFIXES: &[&str] = &[
    "/api/v1/posts",
    "/api/v1/comments",
    "/api/v1/stories",
    "/api/v1/reactions",
    "/api/v1/follows",
    "/api/v1/users",
    "/api/v1/marketplace",
    "/api/v1/ai",
    "/api/v1/pay",
];

/// Route prefixes that bypass the gate entirely. The webhook endpoint is
/// public on purpose: its signature check is its sole authentication.
pub const PUBLIC_PREFIXES: &[&str] = &[
    "/api/v1/auth/login",
    "/api/v1/auth/signup",
    "/api/v1/auth/callback",
    "/api/webhooks",
    "/api/health",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    Public,
    Protected,
    Unclassified,
}

/// Longest-prefix match over the two disjoint prefix sets. Anything that
/// matches neither passes through the gate unchanged.
pub fn classify(path: &str) -> RouteClass {
    let public = longest_match(path, PUBLIC_PREFIXES);
    let protected = longest_match(path, PROTECTED_PREFIXES);

    match (public, protected) {
        (Some(pub_len), Some(prot_len)) if pub_len >= prot_len => RouteClass::Public,
        (_, Some(_)) => RouteClass::Protected,
        (Some(_), None) => RouteClass::Public,
        (None, None) => RouteClass::Unclassified,
    }
}

fn longest_match(path: &str, prefixes: &[&str]) -> Option<usize> {
    prefixes
        .iter()
        .filter(|prefix| path.starts_with(**prefix))
        .map(|prefix| prefix.len())
        .max()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protected_prefixes_classify_as_protected() {
        assert_eq!(classify("/api/v1/posts"), RouteClass::Protected);
        assert_eq!(classify("/api/v1/posts/42/comments"), RouteClass::Protected);
        assert_eq!(classify("/api/v1/pay/checkout"), RouteClass::Protected);
        assert_eq!(classify("/api/v1/ai/chat"), RouteClass::Protected);
    }

    #[test]
    fn public_prefixes_bypass_the_gate() {
        assert_eq!(classify("/api/health"), RouteClass::Public);
        assert_eq!(classify("/api/v1/auth/signup"), RouteClass::Public);
        assert_eq!(classify("/api/webhooks/stripe"), RouteClass::Public);
    }

    #[test]
    fn unmatched_paths_pass_through_unclassified() {
        assert_eq!(classify("/"), RouteClass::Unclassified);
        assert_eq!(classify("/api/v1/auth/session"), RouteClass::Unclassified);
        assert_eq!(classify("/metrics"), RouteClass::Unclassified);
    }

    #[test]
    fn the_longer_prefix_wins() {
        // "/api/v1/auth/signup" (public) is longer than any protected
        // prefix that could shadow it
        assert_eq!(classify("/api/v1/auth/signup/extra"), RouteClass::Public);
    }
}
