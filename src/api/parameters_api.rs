// ==========================================
// 动态裕度计算服务 - 参数集 API
// ==========================================
// 职责: 参数集创建/复制/查询/合并更新/删除、provider 管理
// 展示名补全: 一次批量目录查询，失败只告警不报错
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::client::sources::{DirectoryResolver, FilterResolver};
use crate::domain::parameters::MarginCalculationParameters;
use crate::domain::run_context::{NetworkContext, ResolvedLoadsVariation};
use crate::engine::loads_variation::resolve_active_loads_variations;
use crate::repository::error::RepositoryError;
use crate::repository::ParametersRepository;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

// ==========================================
// ParametersApi - 参数集API
// ==========================================
pub struct ParametersApi {
    parameters_repo: Arc<ParametersRepository>,
    directory: Arc<dyn DirectoryResolver>,
    filters: Arc<dyn FilterResolver>,
    default_provider: String,
}

impl ParametersApi {
    /// 创建新的ParametersApi实例
    ///
    /// # 参数
    /// - parameters_repo: 参数集仓储
    /// - directory: 目录服务（过滤器展示名）
    /// - filters: 过滤器服务（负荷变化求值）
    /// - default_provider: 配置的默认 provider
    pub fn new(
        parameters_repo: Arc<ParametersRepository>,
        directory: Arc<dyn DirectoryResolver>,
        filters: Arc<dyn FilterResolver>,
        default_provider: impl Into<String>,
    ) -> Self {
        Self {
            parameters_repo,
            directory,
            filters,
            default_provider: default_provider.into(),
        }
    }

    pub fn default_provider(&self) -> &str {
        &self.default_provider
    }

    /// 保存新参数集，自身与子项全部分配新 id
    pub fn create(&self, payload: &MarginCalculationParameters) -> ApiResult<Uuid> {
        let id = self.parameters_repo.insert(payload)?;
        info!(
            parameters_id = %id,
            loads_variations = payload.loads_variations.len(),
            "参数集已创建"
        );
        Ok(id)
    }

    /// 以默认值创建参数集
    ///
    /// # 参数
    /// - provider: None 时使用配置的默认 provider
    pub fn create_default(&self, provider: Option<&str>) -> ApiResult<Uuid> {
        let provider = provider.unwrap_or(&self.default_provider);
        self.create(&Self::default_parameters_values(provider))
    }

    /// 复制参数集
    ///
    /// # 返回
    /// - Ok(Uuid): 新参数集 id（子项 id 也全部重新分配）
    /// - Err(ParametersNotFound): 源参数集不存在
    pub fn duplicate(&self, source_id: Uuid) -> ApiResult<Uuid> {
        let source = self
            .parameters_repo
            .find_by_id(source_id)?
            .ok_or(ApiError::ParametersNotFound(source_id))?;
        let id = self.parameters_repo.insert(&source.without_ids())?;
        info!(source_id = %source_id, parameters_id = %id, "参数集已复制");
        Ok(id)
    }

    /// 查询参数集
    ///
    /// # 参数
    /// - user_id: 给出时补全过滤器展示名
    pub async fn get(
        &self,
        id: Uuid,
        user_id: Option<&str>,
    ) -> ApiResult<MarginCalculationParameters> {
        let mut parameters = self
            .parameters_repo
            .find_by_id(id)?
            .ok_or(ApiError::ParametersNotFound(id))?;

        if let Some(user_id) = user_id {
            let filter_ids = parameters.distinct_load_filter_ids();
            if !filter_ids.is_empty() {
                match self.directory.get_element_names(&filter_ids, user_id).await {
                    Ok(names) => parameters.apply_filter_names(&names),
                    Err(e) => {
                        warn!(parameters_id = %id, error = %e, "过滤器名称解析失败，名称留空");
                    }
                }
            }
        }

        Ok(parameters)
    }

    pub fn get_all(&self) -> ApiResult<Vec<MarginCalculationParameters>> {
        Ok(self.parameters_repo.find_all()?)
    }

    /// 合并更新参数集
    ///
    /// # 参数
    /// - payload: None 表示重置为默认值，保留当前 provider
    pub fn update(&self, id: Uuid, payload: Option<&MarginCalculationParameters>) -> ApiResult<()> {
        match payload {
            Some(incoming) => self.parameters_repo.update_with_merge(id, incoming),
            None => self
                .parameters_repo
                .reset_to_defaults(id, &self.default_provider),
        }
        .map_err(|e| not_found_as_parameters(e, id))?;
        debug!(parameters_id = %id, reset = payload.is_none(), "参数集已更新");
        Ok(())
    }

    pub fn delete(&self, id: Uuid) -> ApiResult<()> {
        if self.parameters_repo.delete(id)? {
            info!(parameters_id = %id, "参数集已删除");
        }
        Ok(())
    }

    /// 查询参数集 provider；未设置时返回默认 provider
    pub fn get_provider(&self, id: Uuid) -> ApiResult<String> {
        let provider = self
            .parameters_repo
            .find_provider(id)
            .map_err(|e| not_found_as_parameters(e, id))?;
        Ok(provider.unwrap_or_else(|| self.default_provider.clone()))
    }

    /// 修改 provider；None 回退到配置的默认 provider
    pub fn update_provider(&self, id: Uuid, provider: Option<&str>) -> ApiResult<()> {
        let provider = provider.unwrap_or(&self.default_provider);
        self.parameters_repo
            .update_provider(id, provider)
            .map_err(|e| not_found_as_parameters(e, id))?;
        info!(parameters_id = %id, provider = %provider, "参数集 provider 已更新");
        Ok(())
    }

    pub fn default_parameters_values(provider: &str) -> MarginCalculationParameters {
        MarginCalculationParameters::default_values(provider)
    }

    /// 把 active 负荷变化在网络上求值为具体负荷
    ///
    /// # 返回
    /// - Err(MissingFilters): 列出全部缺失的过滤器 id
    pub async fn resolve_active_load_variations(
        &self,
        parameters: &MarginCalculationParameters,
        network: &NetworkContext,
    ) -> ApiResult<Vec<ResolvedLoadsVariation>> {
        Ok(resolve_active_loads_variations(
            self.filters.as_ref(),
            &parameters.loads_variations,
            network,
        )
        .await?)
    }
}

fn not_found_as_parameters(err: RepositoryError, id: Uuid) -> ApiError {
    match err {
        RepositoryError::NotFound { .. } => ApiError::ParametersNotFound(id),
        other => other.into(),
    }
}
