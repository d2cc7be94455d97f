// ==========================================
// 动态裕度计算服务 - 负荷变化解析
// ==========================================
// 只处理 active 负荷变化:
// 1. 一次性校验全部引用过滤器是否存在（缺失 id 全部列出）
// 2. 逐个负荷变化在网络上求值为具体负荷列表
// ==========================================

use crate::client::sources::FilterResolver;
use crate::domain::parameters::LoadsVariation;
use crate::domain::run_context::{NetworkContext, ResolvedLoadsVariation};
use crate::engine::error::{EngineError, EngineResult};
use std::collections::HashSet;
use uuid::Uuid;

/// active 负荷变化引用的过滤器 id（去重，保持首次出现顺序）
fn active_filter_ids(loads_variations: &[LoadsVariation]) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    loads_variations
        .iter()
        .filter(|lv| lv.active)
        .flat_map(|lv| lv.load_filters.iter().map(|f| f.id))
        .filter(|id| seen.insert(*id))
        .collect()
}

/// 校验 active 负荷变化引用的过滤器全部存在
pub async fn ensure_filters_exist(
    filters: &dyn FilterResolver,
    loads_variations: &[LoadsVariation],
) -> EngineResult<()> {
    let ids = active_filter_ids(loads_variations);
    if ids.is_empty() {
        return Ok(());
    }

    let found: HashSet<Uuid> = filters
        .get_filters(&ids)
        .await?
        .into_iter()
        .map(|f| f.id)
        .collect();

    let missing: Vec<Uuid> = ids.into_iter().filter(|id| !found.contains(id)).collect();
    if !missing.is_empty() {
        return Err(EngineError::MissingFilters { ids: missing });
    }
    Ok(())
}

/// 解析 active 负荷变化为 (负荷列表, 变化量)
pub async fn resolve_active_loads_variations(
    filters: &dyn FilterResolver,
    loads_variations: &[LoadsVariation],
    network: &NetworkContext,
) -> EngineResult<Vec<ResolvedLoadsVariation>> {
    ensure_filters_exist(filters, loads_variations).await?;

    let mut resolved = Vec::new();
    for lv in loads_variations.iter().filter(|lv| lv.active) {
        let loads = filters.resolve(&lv.load_filter_ids(), network).await?;
        resolved.push(ResolvedLoadsVariation {
            loads,
            variation: lv.variation,
        });
    }

    tracing::debug!(
        network_uuid = %network.network_uuid,
        count = resolved.len(),
        "负荷变化解析完成"
    );
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::error::{ClientError, ClientResult};
    use crate::client::sources::FilterDefinition;
    use crate::domain::run_context::Equipment;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct StubFilters {
        known: Vec<Uuid>,
        resolve_calls: Mutex<Vec<Vec<Uuid>>>,
    }

    impl StubFilters {
        fn new(known: Vec<Uuid>) -> Self {
            Self {
                known,
                resolve_calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl FilterResolver for StubFilters {
        async fn get_filters(&self, ids: &[Uuid]) -> ClientResult<Vec<FilterDefinition>> {
            Ok(ids
                .iter()
                .filter(|id| self.known.contains(id))
                .map(|id| FilterDefinition {
                    id: *id,
                    name: None,
                    equipment_type: "LOAD".to_string(),
                })
                .collect())
        }

        async fn resolve(
            &self,
            ids: &[Uuid],
            _network: &NetworkContext,
        ) -> ClientResult<Vec<Equipment>> {
            self.resolve_calls.lock().unwrap().push(ids.to_vec());
            Ok(ids.iter().map(|id| Equipment::load(format!("LOAD_{}", id))).collect())
        }
    }

    struct DownFilters;

    #[async_trait]
    impl FilterResolver for DownFilters {
        async fn get_filters(&self, _ids: &[Uuid]) -> ClientResult<Vec<FilterDefinition>> {
            Err(ClientError::unavailable("filter-server", "connection refused"))
        }

        async fn resolve(
            &self,
            _ids: &[Uuid],
            _network: &NetworkContext,
        ) -> ClientResult<Vec<Equipment>> {
            Err(ClientError::unavailable("filter-server", "connection refused"))
        }
    }

    fn network() -> NetworkContext {
        NetworkContext::new(Uuid::new_v4(), None)
    }

    #[tokio::test]
    async fn test_only_active_variations_are_resolved() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let inactive_missing = Uuid::new_v4();
        let filters = StubFilters::new(vec![a, b]);
        let variations = vec![
            LoadsVariation::new(vec![a], 10.0, true),
            LoadsVariation::new(vec![inactive_missing], 99.0, false),
            LoadsVariation::new(vec![b, a], 20.0, true),
        ];

        let resolved = resolve_active_loads_variations(&filters, &variations, &network())
            .await
            .unwrap();

        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[0].variation, 10.0);
        assert_eq!(resolved[1].variation, 20.0);
        assert_eq!(resolved[1].loads.len(), 2);
        assert_eq!(filters.resolve_calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_every_missing_filter_is_reported() {
        let known = Uuid::new_v4();
        let missing_1 = Uuid::new_v4();
        let missing_2 = Uuid::new_v4();
        let filters = StubFilters::new(vec![known]);
        let variations = vec![
            LoadsVariation::new(vec![missing_1, known], 10.0, true),
            LoadsVariation::new(vec![missing_2], 20.0, true),
        ];

        let err = resolve_active_loads_variations(&filters, &variations, &network())
            .await
            .unwrap_err();

        match err {
            EngineError::MissingFilters { ids } => assert_eq!(ids, vec![missing_1, missing_2]),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(filters.resolve_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_no_active_variation_skips_filter_service() {
        let variations = vec![LoadsVariation::new(vec![Uuid::new_v4()], 1.0, false)];
        let resolved = resolve_active_loads_variations(&DownFilters, &variations, &network())
            .await
            .unwrap();
        assert!(resolved.is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure_propagates() {
        let variations = vec![LoadsVariation::new(vec![Uuid::new_v4()], 1.0, true)];
        let err = ensure_filters_exist(&DownFilters, &variations).await.unwrap_err();
        assert!(matches!(err, EngineError::Client(ClientError::Unavailable { .. })));
    }
}
