// ==========================================
// 光伏组件产线质检工作流系统 - 领域模型层
// ==========================================
// 依据: Workflow_Engine_Specs_v0.2.md - 3. 数据模型
// ==========================================
// 职责: 定义领域实体、类型
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod criteria;
pub mod panel;
pub mod types;

// 重导出核心类型
pub use criteria::{
    Criterion, CriteriaSet, LineOverlay, QualityThresholds, Station, DEFAULT_SEVERITY_PENALTY,
};
pub use panel::{
    ArchivedPanel, PanelWorkflowRecord, TransitionHistoryEntry, WorkflowNote, FINAL_QUALITY_KEY,
};
pub use types::{
    CriterionPolarity, Decision, Line, NoteType, PanelState, QuarantineSeverity,
};
