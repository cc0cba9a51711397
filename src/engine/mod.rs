// ==========================================
// 光伏组件产线质检工作流系统 - 引擎层
// ==========================================
// 依据: Workflow_Engine_Specs_v0.2.md - 1.2 模块拆分
// 职责: 状态机/判定校验/路由编排的业务规则实现
// 红线: Engine 不拼 SQL; 校验先于变更; 失败路径零副作用
// ==========================================

pub mod error;
pub mod events;
pub mod orchestrator;
pub mod registry;
pub mod state_machine;
pub mod store;
pub mod validation;

// 重导出核心引擎
pub use error::{WorkflowError, WorkflowResult};
pub use events::{
    NoOpEventSink, NoOpPersistenceSink, PersistenceSink, SinkDispatcher, WorkflowEvent,
    WorkflowEventSink,
};
pub use orchestrator::{
    DecisionResult, StationDecision, TransitionContext, TransitionResult, WorkflowOrchestrator,
};
pub use registry::{CriteriaRegistry, RegistrySnapshot};
pub use state_machine::WorkflowStateMachine;
pub use store::{PanelLifecycle, PanelStore};
pub use validation::{FailureReason, RequiredAction, ValidationEngine, ValidationOutcome};
