//! Outbound request augmentation.
//!
//! Given a detected [`ReasoningPattern`], compute the diff that activates
//! reasoning on the upstream: fields added to the JSON body itself, and a
//! side-channel options object keyed by provider name that the orchestrator
//! merges when the outbound request is constructed. Keeping both halves in
//! one plan gives the orchestrator a single application point.

use serde_json::{json, Map, Value};

use crate::provider::ReasoningPattern;

/// Effort level sent when a provider wants one. Providers accept
/// `low`/`medium`/`high`; the proxy defaults to `medium`.
pub const DEFAULT_REASONING_EFFORT: &str = "medium";

/// The allowed effort levels, used by config validation.
pub const REASONING_EFFORT_LEVELS: [&str; 3] = ["low", "medium", "high"];

const REASONING_EFFORT_FIELD: &str = "reasoning_effort";

/// Side-channel options attached to the outbound request, keyed by the
/// provider they belong to.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderOptions {
    pub provider: &'static str,
    pub options: Value,
}

/// The full augmentation diff for one request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AugmentationPlan {
    /// Top-level fields to add to the JSON body.
    pub body_fields: Vec<(&'static str, Value)>,
    /// Provider-keyed options applied at request construction time.
    pub provider_options: Option<ProviderOptions>,
}

/// Compute the augmentation diff for a pattern and effort level.
#[must_use]
pub fn plan_augmentation(pattern: ReasoningPattern, effort: &str) -> AugmentationPlan {
    match pattern {
        ReasoningPattern::StructuredEffortParam => AugmentationPlan {
            body_fields: vec![(REASONING_EFFORT_FIELD, Value::String(effort.to_string()))],
            provider_options: None,
        },
        ReasoningPattern::ProviderOptionsEffort => AugmentationPlan {
            body_fields: Vec::new(),
            provider_options: Some(ProviderOptions {
                provider: "openrouter",
                options: json!({ "reasoning": { "effort": effort } }),
            }),
        },
        ReasoningPattern::ImplicitDefault => AugmentationPlan::default(),
    }
}

/// Return a shallow copy of `body` with the pattern's body fields added.
///
/// Only [`ReasoningPattern::StructuredEffortParam`] changes the body here;
/// the provider-options case is applied when the outbound request object is
/// built, and [`ReasoningPattern::ImplicitDefault`] needs nothing. Existing
/// fields are never overwritten. Non-object bodies are returned unchanged.
#[must_use]
pub fn augment_body(body: &Value, pattern: ReasoningPattern) -> Value {
    let plan = plan_augmentation(pattern, DEFAULT_REASONING_EFFORT);
    if plan.body_fields.is_empty() {
        return body.clone();
    }
    let Some(obj) = body.as_object() else {
        return body.clone();
    };
    let mut copy = obj.clone();
    for (field, value) in plan.body_fields {
        copy.entry(field.to_string()).or_insert(value);
    }
    Value::Object(copy)
}

/// Apply a plan to an outbound request body under construction.
///
/// Body fields land at the top level as-is. Provider options are the wire
/// form of the side channel: for OpenAI-compatible upstreams the provider
/// reads its namespaced options from top-level fields, so the option
/// object's entries are merged into the body without overwriting anything
/// the caller already set.
pub fn apply_to_request(body: &mut Map<String, Value>, plan: &AugmentationPlan) {
    for (field, value) in &plan.body_fields {
        body.entry((*field).to_string()).or_insert(value.clone());
    }
    if let Some(options) = &plan.provider_options {
        if let Some(entries) = options.options.as_object() {
            for (key, value) in entries {
                body.entry(key.clone()).or_insert(value.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_effort_adds_body_field() {
        let body = json!({ "model": "o4-mini", "messages": [] });
        let augmented = augment_body(&body, ReasoningPattern::StructuredEffortParam);
        assert_eq!(augmented["reasoning_effort"], "medium");
        assert_eq!(augmented["model"], "o4-mini");
    }

    #[test]
    fn structured_effort_keeps_existing_field() {
        let body = json!({ "model": "o4-mini", "reasoning_effort": "high" });
        let augmented = augment_body(&body, ReasoningPattern::StructuredEffortParam);
        assert_eq!(augmented["reasoning_effort"], "high");
    }

    #[test]
    fn implicit_default_leaves_body_unchanged() {
        let body = json!({ "model": "llama3", "messages": [] });
        let augmented = augment_body(&body, ReasoningPattern::ImplicitDefault);
        assert_eq!(augmented, body);
    }

    #[test]
    fn provider_options_leave_body_untouched_in_augment() {
        let body = json!({ "model": "deepseek/deepseek-r1" });
        let augmented = augment_body(&body, ReasoningPattern::ProviderOptionsEffort);
        assert_eq!(augmented, body);
    }

    #[test]
    fn plan_for_provider_options_is_keyed_by_provider() {
        let plan = plan_augmentation(ReasoningPattern::ProviderOptionsEffort, "medium");
        assert!(plan.body_fields.is_empty());
        let options = plan.provider_options.expect("provider options");
        assert_eq!(options.provider, "openrouter");
        assert_eq!(options.options["reasoning"]["effort"], "medium");
    }

    #[test]
    fn apply_to_request_merges_both_halves() {
        let plan = plan_augmentation(ReasoningPattern::ProviderOptionsEffort, "medium");
        let mut body = json!({ "model": "deepseek/deepseek-r1" })
            .as_object()
            .cloned()
            .expect("object body");
        apply_to_request(&mut body, &plan);
        assert_eq!(body["reasoning"]["effort"], "medium");

        let plan = plan_augmentation(ReasoningPattern::StructuredEffortParam, "low");
        let mut body = json!({ "model": "o4-mini" }).as_object().cloned().unwrap();
        apply_to_request(&mut body, &plan);
        assert_eq!(body["reasoning_effort"], "low");
    }

    #[test]
    fn empty_plan_is_a_no_op() {
        let plan = plan_augmentation(ReasoningPattern::ImplicitDefault, "medium");
        let mut body = json!({ "model": "llama3" }).as_object().cloned().unwrap();
        let before = body.clone();
        apply_to_request(&mut body, &plan);
        assert_eq!(body, before);
    }
}
