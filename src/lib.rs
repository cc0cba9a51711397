// ==========================================
// 光伏组件产线质检工作流系统 - 核心库
// ==========================================
// 依据: Workflow_Engine_Specs_v0.2.md - 系统宪法
// 技术栈: Rust + SQLite
// 系统定位: 产线质检决策支持系统 (FAIL 后处置保留人工最终控制权)
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 审计落库
pub mod repository;

// 引擎层 - 业务规则
pub mod engine;

// 配置层 - 路由表/判定项来源
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{
    CriterionPolarity, Decision, Line, NoteType, PanelState, QuarantineSeverity,
};

// 领域实体
pub use domain::{
    ArchivedPanel, CriteriaSet, Criterion, LineOverlay, PanelWorkflowRecord, QualityThresholds,
    Station, TransitionHistoryEntry, WorkflowNote,
};

// 引擎
pub use engine::{
    CriteriaRegistry, DecisionResult, PanelLifecycle, RequiredAction, SinkDispatcher,
    StationDecision, TransitionContext, TransitionResult, ValidationEngine, ValidationOutcome,
    WorkflowError, WorkflowEvent, WorkflowOrchestrator, WorkflowResult, WorkflowStateMachine,
};

// 配置
pub use config::{default_criteria_config, CriteriaConfig, CriteriaSource, WorkflowConfig};

// 仓储
pub use repository::{RepositoryError, RepositoryResult, WorkflowHistoryRepository};

/// 库版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 系统名称
pub const APP_NAME: &str = "solar-qc-workflow";
