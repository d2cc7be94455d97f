// ==========================================
// 动态裕度计算服务 - 负荷变化按 id 合并
// ==========================================
// 规则:
// 1. 载荷中带 id 且命中现有子项 → 原地更新（保留 id）
// 2. 载荷中不带 id → 新增子项（分配新 id）
// 3. 现有子项未出现在载荷中 → 删除（最后执行）
// 4. 结果顺序 = 载荷顺序
// 纯函数，不触碰存储；由仓储层在同一事务内执行计划
// ==========================================

use crate::domain::parameters::LoadsVariation;
use std::collections::HashSet;
use thiserror::Error;
use uuid::Uuid;

/// 合并计划校验错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MergeError {
    #[error("负荷变化不属于该参数集: {0}")]
    UnknownLoadsVariation(Uuid),

    #[error("负荷变化 id 重复: {0}")]
    DuplicateLoadsVariation(Uuid),
}

/// 合并后的单个子项
#[derive(Debug, Clone, PartialEq)]
pub struct MergedLoadsVariation {
    pub id: Uuid,
    /// true 表示需要插入，false 表示原地更新
    pub is_new: bool,
    pub load_filter_ids: Vec<Uuid>,
    pub variation: f64,
    pub active: bool,
}

/// 合并计划
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MergePlan {
    /// 按载荷顺序排列（下标即 pos）
    pub children: Vec<MergedLoadsVariation>,
    /// 需删除的现有子项 = 现有 id - 已命中 id
    pub deletions: Vec<Uuid>,
}

/// 计算合并计划
///
/// # 参数
/// - existing_ids: 现有子项 id（按当前顺序）
/// - incoming: 载荷中的子项列表
pub fn plan_loads_variation_merge(
    existing_ids: &[Uuid],
    incoming: &[LoadsVariation],
) -> Result<MergePlan, MergeError> {
    let existing: HashSet<Uuid> = existing_ids.iter().copied().collect();
    let mut seen: HashSet<Uuid> = HashSet::with_capacity(incoming.len());
    let mut children = Vec::with_capacity(incoming.len());

    for lv in incoming {
        let (id, is_new) = match lv.id {
            Some(id) => {
                if !existing.contains(&id) {
                    return Err(MergeError::UnknownLoadsVariation(id));
                }
                if !seen.insert(id) {
                    return Err(MergeError::DuplicateLoadsVariation(id));
                }
                (id, false)
            }
            None => (Uuid::new_v4(), true),
        };

        children.push(MergedLoadsVariation {
            id,
            is_new,
            load_filter_ids: lv.load_filter_ids(),
            variation: lv.variation,
            active: lv.active,
        });
    }

    let deletions = existing_ids
        .iter()
        .filter(|id| !seen.contains(id))
        .copied()
        .collect();

    Ok(MergePlan {
        children,
        deletions,
    })
}
