//! Preset technique plans and request plan selection.

use std::collections::HashMap;

use serde_json::Value;

use crate::techniques::ids;
use crate::types::{TechniqueConfig, TechniquePreset};

impl TechniquePreset {
    /// The ordered technique plan this preset stands for. The table is
    /// part of the public contract; changing an entry changes what every
    /// caller of that preset gets.
    pub fn technique_configs(self) -> Vec<TechniqueConfig> {
        match self {
            TechniquePreset::Fast => vec![TechniqueConfig::new(ids::VECTOR_RETRIEVAL)],
            TechniquePreset::Default => vec![
                TechniqueConfig::new(ids::VECTOR_RETRIEVAL),
                TechniqueConfig::new(ids::RERANKING),
            ],
            TechniquePreset::Accurate => vec![
                TechniqueConfig::new(ids::QUERY_TRANSFORMATION),
                TechniqueConfig::new(ids::HYDE),
                TechniqueConfig::new(ids::FUSION_RETRIEVAL),
                TechniqueConfig::new(ids::RERANKING).with("top_k", Value::from(20)),
                TechniqueConfig::new(ids::CONTEXTUAL_COMPRESSION),
            ],
            TechniquePreset::CostOptimized => vec![
                TechniqueConfig::new(ids::VECTOR_RETRIEVAL),
                TechniqueConfig::new(ids::CONTEXTUAL_COMPRESSION),
            ],
            TechniquePreset::Comprehensive => vec![
                TechniqueConfig::new(ids::QUERY_TRANSFORMATION),
                TechniqueConfig::new(ids::HYDE),
                TechniqueConfig::new(ids::FUSION_RETRIEVAL).with("top_k", Value::from(30)),
                TechniqueConfig::new(ids::RERANKING).with("top_k", Value::from(20)),
                TechniqueConfig::new(ids::CONTEXTUAL_COMPRESSION),
            ],
        }
    }
}

/// Decide the technique plan for a request.
///
/// Explicit techniques win over a preset, which wins over the user's
/// stored default pipeline; with none of those the `default` preset
/// applies. `config_metadata` is a legacy escape hatch and is folded in
/// only when the plan came from one of the default paths.
pub fn select_plan(
    requested: Option<&[TechniqueConfig]>,
    preset: Option<TechniquePreset>,
    resolved_default: &[TechniqueConfig],
    config_metadata: Option<&HashMap<String, Value>>,
) -> Vec<TechniqueConfig> {
    if let Some(requested) = requested {
        if !requested.is_empty() {
            return requested.to_vec();
        }
    }
    if let Some(preset) = preset {
        return preset.technique_configs();
    }

    let mut plan = if resolved_default.is_empty() {
        TechniquePreset::Default.technique_configs()
    } else {
        resolved_default.to_vec()
    };
    if let Some(metadata) = config_metadata {
        merge_metadata(&mut plan, metadata);
    }
    plan
}

/// Fold legacy metadata into a plan. Unqualified keys apply to every
/// technique; `technique_id.key` entries target one and win over the
/// unqualified form.
fn merge_metadata(plan: &mut [TechniqueConfig], metadata: &HashMap<String, Value>) {
    for (key, value) in metadata {
        if !key.contains('.') {
            for config in plan.iter_mut() {
                config.config.insert(key.clone(), value.clone());
            }
        }
    }
    for (key, value) in metadata {
        if let Some((technique_id, config_key)) = key.split_once('.') {
            if let Some(config) = plan
                .iter_mut()
                .find(|c| c.technique_id == technique_id)
            {
                config.config.insert(config_key.to_string(), value.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn plan_ids(plan: &[TechniqueConfig]) -> Vec<&str> {
        plan.iter().map(|c| c.technique_id.as_str()).collect()
    }

    #[test]
    fn test_fast_preset_is_bare_vector_retrieval() {
        assert_eq!(
            TechniquePreset::Fast.technique_configs(),
            vec![TechniqueConfig::new(ids::VECTOR_RETRIEVAL)]
        );
    }

    #[test]
    fn test_accurate_preset_order_and_overrides() {
        let plan = TechniquePreset::Accurate.technique_configs();
        assert_eq!(
            plan_ids(&plan),
            vec![
                ids::QUERY_TRANSFORMATION,
                ids::HYDE,
                ids::FUSION_RETRIEVAL,
                ids::RERANKING,
                ids::CONTEXTUAL_COMPRESSION,
            ]
        );
        assert_eq!(plan[3].config.get("top_k"), Some(&json!(20)));
    }

    #[test]
    fn test_explicit_techniques_win() {
        let requested = vec![TechniqueConfig::new(ids::HYDE)];
        let plan = select_plan(
            Some(&requested),
            Some(TechniquePreset::Comprehensive),
            &[],
            None,
        );
        assert_eq!(plan_ids(&plan), vec![ids::HYDE]);
    }

    #[test]
    fn test_empty_explicit_list_falls_through_to_preset() {
        let plan = select_plan(Some(&[]), Some(TechniquePreset::Fast), &[], None);
        assert_eq!(plan_ids(&plan), vec![ids::VECTOR_RETRIEVAL]);
    }

    #[test]
    fn test_resolver_default_beats_default_preset() {
        let resolved = vec![TechniqueConfig::new(ids::FUSION_RETRIEVAL)];
        let plan = select_plan(None, None, &resolved, None);
        assert_eq!(plan_ids(&plan), vec![ids::FUSION_RETRIEVAL]);
    }

    #[test]
    fn test_no_selection_uses_default_preset() {
        let plan = select_plan(None, None, &[], None);
        assert_eq!(plan_ids(&plan), vec![ids::VECTOR_RETRIEVAL, ids::RERANKING]);
    }

    #[test]
    fn test_metadata_merges_into_default_path_only() {
        let mut metadata = HashMap::new();
        metadata.insert("top_k".to_string(), json!(7));
        metadata.insert("reranking.top_k".to_string(), json!(3));

        let plan = select_plan(None, None, &[], Some(&metadata));
        assert_eq!(plan[0].config.get("top_k"), Some(&json!(7)));
        assert_eq!(plan[1].config.get("top_k"), Some(&json!(3)));

        let preset_plan = select_plan(None, Some(TechniquePreset::Fast), &[], Some(&metadata));
        assert!(preset_plan[0].config.is_empty());
    }
}
