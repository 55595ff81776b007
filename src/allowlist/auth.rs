use crate::allowlist::{
    AllowFromCache, allow_list_matches, normalize_allow_list, normalize_allow_list_lower,
};

/// The merged allow-list, in both case-preserved and lowercase form
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EffectiveAllowFrom {
    pub allow_from: Vec<String>,
    pub allow_from_lower: Vec<String>,
}

/// Merge the configured list with the (cached) store list
pub async fn resolve_effective_allow_from(
    static_allow_from: &[String],
    cache: &AllowFromCache,
) -> EffectiveAllowFrom {
    let store_allow_from = cache.get_allow_from().await;
    let allow_from = normalize_allow_list(static_allow_from.iter().chain(store_allow_from.iter()));
    let allow_from_lower = normalize_allow_list_lower(&allow_from);

    EffectiveAllowFrom {
        allow_from,
        allow_from_lower,
    }
}

/// An empty list allows everyone
pub fn is_sender_allow_listed(
    allow_list_lower: &[String],
    sender_id: &str,
    sender_name: Option<&str>,
) -> bool {
    allow_list_lower.is_empty() || allow_list_matches(allow_list_lower, Some(sender_id), sender_name)
}
