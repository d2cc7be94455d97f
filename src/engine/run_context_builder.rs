// ==========================================
// 动态裕度计算服务 - 运行上下文构建
// ==========================================
// 提交时同步执行:
// 1. 读取参数集（不存在 → ParametersNotFound）
// 2. 解析 provider: 请求 → 参数集 → 默认值；必须等于引擎名
// 3. 只保留 active 负荷变化，校验其过滤器全部存在
// ==========================================

use crate::client::sources::FilterResolver;
use crate::domain::run_context::{NetworkContext, RunContext, RunRequest};
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::loads_variation::ensure_filters_exist;
use crate::repository::ParametersRepository;
use std::collections::HashMap;
use std::sync::Arc;

pub struct RunContextBuilder {
    parameters_repo: Arc<ParametersRepository>,
    filters: Arc<dyn FilterResolver>,
    engine_name: String,
    default_provider: String,
}

impl RunContextBuilder {
    pub fn new(
        parameters_repo: Arc<ParametersRepository>,
        filters: Arc<dyn FilterResolver>,
        engine_name: impl Into<String>,
        default_provider: impl Into<String>,
    ) -> Self {
        Self {
            parameters_repo,
            filters,
            engine_name: engine_name.into(),
            default_provider: default_provider.into(),
        }
    }

    /// 按优先级选出 provider，并校验引擎可用
    pub fn resolve_provider(
        &self,
        requested: Option<&str>,
        from_parameters: Option<&str>,
    ) -> EngineResult<String> {
        let provider = requested
            .or(from_parameters)
            .unwrap_or(self.default_provider.as_str());
        if provider != self.engine_name {
            return Err(EngineError::ProviderNotFound(provider.to_string()));
        }
        Ok(provider.to_string())
    }

    pub async fn build(&self, request: RunRequest) -> EngineResult<RunContext> {
        let mut parameters = self
            .parameters_repo
            .find_by_id(request.parameters_uuid)?
            .ok_or(EngineError::ParametersNotFound(request.parameters_uuid))?;

        let provider =
            self.resolve_provider(request.provider.as_deref(), parameters.provider.as_deref())?;

        parameters.retain_active_loads_variations();
        ensure_filters_exist(self.filters.as_ref(), &parameters.loads_variations).await?;
        // 展示名不进入运行上下文
        parameters.apply_filter_names(&HashMap::new());

        tracing::debug!(
            parameters_id = %request.parameters_uuid,
            provider = %provider,
            active_loads_variations = parameters.loads_variations.len(),
            "运行上下文已构建"
        );

        Ok(RunContext {
            network: NetworkContext::new(request.network_uuid, request.variant_id),
            receiver: request.receiver,
            provider,
            report_infos: request.report_infos,
            user_id: request.user_id,
            parameters,
            dynamic_simulation_parameters_json: request.dynamic_simulation_parameters_json,
            dynamic_security_analysis_parameters_uuid: request
                .dynamic_security_analysis_parameters_uuid,
            debug: request.debug,
        })
    }
}
