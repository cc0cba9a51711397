// ==========================================
// 光伏组件产线质检工作流系统 - 配置层
// ==========================================
// 依据: Workflow_Engine_Specs_v0.2.md - 9. 配置项全集
// ==========================================
// 职责: 工作流配置与判定项配置的结构定义、读取接口
// 红线: 配置层不持有组件状态
// ==========================================

pub mod criteria_source;
pub mod workflow_config;

// 重导出核心配置类型
pub use criteria_source::{
    default_criteria_config, CriteriaConfig, CriteriaSource, FileCriteriaSource,
    StationCriteriaConfig,
};
pub use workflow_config::WorkflowConfig;
