// ==========================================
// 光伏组件产线质检工作流系统 - 工作流状态机
// ==========================================
// 依据: Workflow_Engine_Specs_v0.2.md - 4.1 状态机
// 职责: 合法转换表与转换前置校验的纯逻辑
// 红线: 无状态、无副作用、无 I/O 操作
// ==========================================

use crate::engine::error::{WorkflowError, WorkflowResult};
use crate::domain::types::PanelState;

// ==========================================
// WorkflowStateMachine - 纯函数工具类
// ==========================================
pub struct WorkflowStateMachine;

impl WorkflowStateMachine {
    /// 合法转换表: 源状态 → 允许的目标状态
    ///
    /// # 规则
    /// - SCANNED → {IN_PROGRESS, FAILED}
    /// - IN_PROGRESS → {PASSED, FAILED, REWORK_NEEDED}
    /// - PASSED → {COMPLETED, IN_PROGRESS}
    /// - FAILED → {REWORK_NEEDED, QUARANTINE}
    /// - REWORK_NEEDED → {IN_PROGRESS, FAILED}
    /// - QUARANTINE → {REWORK_NEEDED, FAILED}
    /// - COMPLETED → {} (终态)
    pub fn allowed_targets(from: PanelState) -> &'static [PanelState] {
        match from {
            PanelState::Scanned => &[PanelState::InProgress, PanelState::Failed],
            PanelState::InProgress => &[
                PanelState::Passed,
                PanelState::Failed,
                PanelState::ReworkNeeded,
            ],
            PanelState::Passed => &[PanelState::Completed, PanelState::InProgress],
            PanelState::Failed => &[PanelState::ReworkNeeded, PanelState::Quarantine],
            PanelState::ReworkNeeded => &[PanelState::InProgress, PanelState::Failed],
            PanelState::Quarantine => &[PanelState::ReworkNeeded, PanelState::Failed],
            PanelState::Completed => &[],
        }
    }

    /// 判断转换是否合法
    pub fn can_transition(from: PanelState, to: PanelState) -> bool {
        Self::allowed_targets(from).contains(&to)
    }

    /// 转换前置校验
    ///
    /// # 返回
    /// - Ok(()): 转换合法
    /// - Err(InvalidTransition): 携带允许目标列表,记录保持不变
    pub fn ensure_allowed(from: PanelState, to: PanelState) -> WorkflowResult<()> {
        if Self::can_transition(from, to) {
            return Ok(());
        }
        Err(WorkflowError::InvalidTransition {
            from,
            to,
            allowed: Self::allowed_targets(from).to_vec(),
        })
    }

    /// 初始状态(initialize_panel 唯一赋值入口)
    pub fn initial_state() -> PanelState {
        PanelState::Scanned
    }
}
