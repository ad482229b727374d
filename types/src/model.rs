//! Model alias mapping between the OpenAI-facing surface and the upstream
//! Generative Language model names.

/// Upstream model used when the requested alias is unknown.
pub const DEFAULT_UPSTREAM_MODEL: &str = "gemini-2.0-flash";

/// Fixed alias table. Unknown aliases fall back to the default model;
/// names that already look like upstream models pass through unchanged.
const MODEL_ALIASES: &[(&str, &str)] = &[
    ("gpt-4o", "gemini-2.5-pro"),
    ("gpt-4o-mini", "gemini-2.5-flash"),
    ("gpt-4-turbo", "gemini-2.5-pro"),
    ("gpt-4", "gemini-2.5-pro"),
    ("gpt-3.5-turbo", "gemini-2.0-flash"),
];

/// Resolve an inbound model name to the upstream model to call.
#[must_use]
pub fn to_upstream_model(requested: &str) -> &str {
    if let Some((_, upstream)) = MODEL_ALIASES.iter().find(|(alias, _)| *alias == requested) {
        return upstream;
    }
    if requested.starts_with("gemini-") {
        return requested;
    }
    DEFAULT_UPSTREAM_MODEL
}

/// Reverse mapping applied to the inbound request's model when building the
/// response envelope. Names without a reverse entry are left unchanged, so
/// callers see the alias they asked for.
#[must_use]
pub fn to_inbound_model(requested: &str) -> &str {
    MODEL_ALIASES
        .iter()
        .find(|(_, upstream)| *upstream == requested)
        .map_or(requested, |(alias, _)| alias)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_aliases_map_to_upstream_models() {
        assert_eq!(to_upstream_model("gpt-4o"), "gemini-2.5-pro");
        assert_eq!(to_upstream_model("gpt-3.5-turbo"), "gemini-2.0-flash");
    }

    #[test]
    fn unknown_aliases_fall_back_to_default() {
        assert_eq!(to_upstream_model("claude-3"), DEFAULT_UPSTREAM_MODEL);
        assert_eq!(to_upstream_model(""), DEFAULT_UPSTREAM_MODEL);
    }

    #[test]
    fn upstream_names_pass_through() {
        assert_eq!(to_upstream_model("gemini-2.5-flash"), "gemini-2.5-flash");
    }

    #[test]
    fn reverse_mapping_restores_aliases() {
        assert_eq!(to_inbound_model("gemini-2.5-pro"), "gpt-4o");
        // An alias the caller sent stays as-is.
        assert_eq!(to_inbound_model("gpt-4o"), "gpt-4o");
        assert_eq!(to_inbound_model("unmapped-model"), "unmapped-model");
    }
}
