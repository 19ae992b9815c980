//! Provider pattern detection.
//!
//! Upstream providers disagree on how reasoning output is requested: some
//! want an explicit effort parameter in the request body, some want it in a
//! side-channel options object, and some emit reasoning unconditionally.
//! The pattern is a pure function of the upstream host.

/// How a provider expects reasoning to be activated for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasoningPattern {
    /// Provider takes a top-level effort field in the request body and
    /// emits reasoning under a dedicated response field.
    StructuredEffortParam,
    /// Provider takes effort through a provider-keyed options object,
    /// attached when the outbound request is constructed.
    ProviderOptionsEffort,
    /// Provider emits reasoning unconditionally; no request change needed.
    ImplicitDefault,
}

/// Hosts matched exactly or as a suffix (any subdomain).
const STRUCTURED_EFFORT_HOST: &str = "openai.com";
const PROVIDER_OPTIONS_HOST: &str = "openrouter.ai";

/// Detect the reasoning pattern for an upstream base URL.
///
/// Total function: unparseable URLs and URLs without a host resolve to
/// [`ReasoningPattern::ImplicitDefault`].
#[must_use]
pub fn detect_pattern(base_url: &str) -> ReasoningPattern {
    let Ok(parsed) = url::Url::parse(base_url) else {
        return ReasoningPattern::ImplicitDefault;
    };
    let Some(host) = parsed.host_str() else {
        return ReasoningPattern::ImplicitDefault;
    };

    if host_matches(host, STRUCTURED_EFFORT_HOST) {
        ReasoningPattern::StructuredEffortParam
    } else if host_matches(host, PROVIDER_OPTIONS_HOST) {
        ReasoningPattern::ProviderOptionsEffort
    } else {
        ReasoningPattern::ImplicitDefault
    }
}

#[inline]
fn host_matches(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}
