// ==========================================
// 光伏组件产线质检工作流系统 - 引擎层错误类型
// ==========================================
// 依据: Workflow_Engine_Specs_v0.2.md - 7. 错误处理
// 红线: 所有错误均为调用方可恢复错误,抛出前不做部分变更
// 工具: thiserror 派生宏
// ==========================================

use crate::domain::types::PanelState;
use thiserror::Error;

/// 引擎层错误类型
#[derive(Error, Debug)]
pub enum WorkflowError {
    // ===== 记录查找错误 =====
    #[error("组件未找到: panel_id={panel_id}")]
    PanelNotFound { panel_id: String },

    #[error("组件已完成归档: panel_id={panel_id}")]
    PanelArchived { panel_id: String },

    #[error("重复初始化: panel_id={panel_id} 已存在工作流记录")]
    DuplicateWorkflow { panel_id: String },

    // ===== 状态机错误 =====
    #[error("非法状态转换: from={from} to={to}, 允许目标={allowed:?}")]
    InvalidTransition {
        from: PanelState,
        to: PanelState,
        allowed: Vec<PanelState>,
    },

    // ===== 路由配置错误 =====
    #[error("未知版型: panel_type={panel_type} 无产线路由配置")]
    UnknownPanelType { panel_type: String },

    #[error("无效工位: station_id={station_id} 不在组件工位序列内")]
    InvalidStation { station_id: String },

    #[error("判定项集合未配置: station_id={station_id}, line={line}")]
    CriteriaNotConfigured { station_id: String, line: String },

    // ===== 判定校验错误 =====
    #[error("非法判定类型: decision={decision}")]
    InvalidDecision { decision: String },

    #[error("FAIL 判定必须选择至少一个缺陷判定项: station_id={station_id}")]
    MissingCriteria { station_id: String },

    #[error("未知判定项: criterion_id={criterion_id} 不属于 station_id={station_id} 的缺陷判定项集合")]
    UnknownCriterion {
        station_id: String,
        criterion_id: String,
    },

    #[error("以下判定项要求填写备注: {criteria:?}")]
    NotesRequired { criteria: Vec<String> },

    // ===== 返修策略错误 =====
    #[error("返修次数超限: panel_id={panel_id}, rework_count={rework_count}, max={max}, 仅允许隔离处置")]
    ReworkLimitExceeded {
        panel_id: String,
        rework_count: u32,
        max: u32,
    },

    // ===== 通用错误 =====
    #[error("锁获取失败: {0}")]
    LockError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl WorkflowError {
    /// 稳定的错误码(供上游 API 层映射响应)
    pub fn code(&self) -> &'static str {
        match self {
            WorkflowError::PanelNotFound { .. } => "PANEL_NOT_FOUND",
            WorkflowError::PanelArchived { .. } => "PANEL_ARCHIVED",
            WorkflowError::DuplicateWorkflow { .. } => "DUPLICATE_WORKFLOW",
            WorkflowError::InvalidTransition { .. } => "INVALID_TRANSITION",
            WorkflowError::UnknownPanelType { .. } => "UNKNOWN_PANEL_TYPE",
            WorkflowError::InvalidStation { .. } => "INVALID_STATION",
            WorkflowError::CriteriaNotConfigured { .. } => "CRITERIA_NOT_CONFIGURED",
            WorkflowError::InvalidDecision { .. } => "INVALID_DECISION",
            WorkflowError::MissingCriteria { .. } => "MISSING_CRITERIA",
            WorkflowError::UnknownCriterion { .. } => "UNKNOWN_CRITERION",
            WorkflowError::NotesRequired { .. } => "NOTES_REQUIRED",
            WorkflowError::ReworkLimitExceeded { .. } => "REWORK_LIMIT_EXCEEDED",
            WorkflowError::LockError(_) => "LOCK_ERROR",
            WorkflowError::Other(_) => "INTERNAL_ERROR",
        }
    }
}

/// Result 类型别名
pub type WorkflowResult<T> = Result<T, WorkflowError>;
