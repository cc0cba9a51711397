// ==========================================
// 光伏组件产线质检工作流系统 - 工作流编排器
// ==========================================
// 依据: Workflow_Engine_Specs_v0.2.md - 4.4 路由策略
// 职责: 组合状态机 + 校验引擎 + 路由策略的对外门面
// 红线: 校验先于变更; 单组件变更串行(逐组件锁);
//       FAIL 后走返修还是隔离由人工决定,引擎不自动裁决
// ==========================================

use crate::config::workflow_config::WorkflowConfig;
use crate::domain::panel::{
    PanelWorkflowRecord, TransitionHistoryEntry, WorkflowNote, FINAL_QUALITY_KEY,
};
use crate::domain::types::{Decision, NoteType, PanelState, QuarantineSeverity};
use crate::engine::error::{WorkflowError, WorkflowResult};
use crate::engine::events::{SinkDispatcher, WorkflowEvent};
use crate::engine::registry::CriteriaRegistry;
use crate::engine::state_machine::WorkflowStateMachine;
use crate::engine::store::{PanelLifecycle, PanelStore};
use crate::engine::validation::{RequiredAction, ValidationEngine, ValidationOutcome};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use tracing::{debug, info};

// ==========================================
// TransitionContext - 转换附加数据
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct TransitionContext {
    pub station_id: Option<String>,        // 目标工位(IN_PROGRESS 入站)
    pub quality_data: Option<JsonValue>,   // 工位质检负载(PASSED/COMPLETED)
    pub notes: Option<String>,             // 备注内容
    pub criteria: Option<Vec<String>>,     // 关联判定项
    pub rework_station: Option<String>,    // 返修目标工位(REWORK_NEEDED)
    pub severity: Option<QuarantineSeverity>, // 隔离严重级别(QUARANTINE)
    pub operator: Option<String>,          // 操作人标识
}

// ==========================================
// TransitionResult - 转换结果
// ==========================================
// 说明: 事件以显式列表返回,由调用方转发下游; 同时经派发器异步转发
#[derive(Debug, Clone)]
pub struct TransitionResult {
    pub workflow: PanelWorkflowRecord, // 转换提交后的记录快照
    pub events: Vec<WorkflowEvent>,    // 本次操作产生的领域事件
}

// ==========================================
// StationDecision - 工位判定提交
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationDecision {
    pub station_id: String, // 判定工位
    pub decision: String,   // 判定类型字符串(非法值 → InvalidDecision)

    #[serde(default)]
    pub selected_criteria: Vec<String>, // 勾选的判定项 id

    #[serde(default)]
    pub notes: Option<String>, // 检验备注

    #[serde(default)]
    pub measurements: Option<JsonValue>, // 测量负载(可选)

    #[serde(default)]
    pub rework_station: Option<String>, // REWORK 处置的目标工位

    #[serde(default)]
    pub severity: Option<QuarantineSeverity>, // QUARANTINE 处置的严重级别

    #[serde(default)]
    pub operator: Option<String>, // 操作人标识(上游已鉴权)
}

// ==========================================
// DecisionResult - 判定提交结果
// ==========================================
#[derive(Debug, Clone)]
pub struct DecisionResult {
    pub workflow: PanelWorkflowRecord,      // 提交后的记录快照
    pub outcome: ValidationOutcome,         // 校验结果(含质量分)
    pub next_actions: Vec<RequiredAction>,  // 路由策略给出的后续动作
    pub events: Vec<WorkflowEvent>,         // 本次操作产生的领域事件
}

// ==========================================
// WorkflowOrchestrator - 工作流编排器
// ==========================================
// 说明: 显式构造实例并注入注册表/配置/接收器,无进程级隐藏状态
pub struct WorkflowOrchestrator {
    registry: Arc<CriteriaRegistry>,
    validator: ValidationEngine,
    store: PanelStore,
    config: WorkflowConfig,
    dispatcher: SinkDispatcher,
}

impl WorkflowOrchestrator {
    /// 创建编排器实例
    ///
    /// # 参数
    /// - registry: 判定项注册表(可在运行期热加载)
    /// - config: 工作流配置(路由表/工位序列/返修策略)
    pub fn new(registry: Arc<CriteriaRegistry>, config: WorkflowConfig) -> Self {
        let validator = ValidationEngine::new(Arc::clone(&registry), config.default_severity_penalty);
        Self {
            registry,
            validator,
            store: PanelStore::new(),
            config,
            dispatcher: SinkDispatcher::new(),
        }
    }

    /// 注入下游接收器(持久化/通知)
    pub fn with_sinks(mut self, dispatcher: SinkDispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    /// 判定项注册表(供服务层触发热加载)
    pub fn registry(&self) -> &Arc<CriteriaRegistry> {
        &self.registry
    }

    // ==========================================
    // 对外操作
    // ==========================================

    /// 初始化组件工作流
    ///
    /// # 规则
    /// - 版型经路由表解析产线,无配置 → UnknownPanelType
    /// - 每个 panel_id 只允许初始化一次(含已归档) → DuplicateWorkflow
    /// - 初始状态 SCANNED,未进入首站
    pub fn initialize_panel(
        &self,
        panel_id: &str,
        barcode: &str,
        panel_type: &str,
    ) -> WorkflowResult<TransitionResult> {
        let line = self.config.resolve_line(panel_type).ok_or_else(|| {
            WorkflowError::UnknownPanelType {
                panel_type: panel_type.to_string(),
            }
        })?;
        let sequence = self
            .config
            .station_sequence(line)
            .ok_or_else(|| WorkflowError::UnknownPanelType {
                panel_type: panel_type.to_string(),
            })?
            .clone();

        let record = PanelWorkflowRecord::new(panel_id, barcode, panel_type, line, sequence);
        let snapshot = record.clone();
        self.store.insert_new(record)?;

        info!(
            panel_id,
            panel_type,
            line = %line,
            stations = snapshot.station_sequence.len(),
            "组件工作流初始化完成"
        );

        let events = vec![WorkflowEvent::PanelInitialized {
            panel_id: panel_id.to_string(),
            panel_type: panel_type.to_string(),
            line,
            timestamp: Utc::now(),
        }];
        self.dispatcher.dispatch_events(&events);

        Ok(TransitionResult {
            workflow: snapshot,
            events,
        })
    }

    /// 组件进入工位开始检验(→ IN_PROGRESS)
    pub fn start_station(
        &self,
        panel_id: &str,
        station_id: &str,
        operator: Option<&str>,
    ) -> WorkflowResult<TransitionResult> {
        let ctx = TransitionContext {
            station_id: Some(station_id.to_string()),
            operator: operator.map(|s| s.to_string()),
            ..Default::default()
        };
        self.transition(panel_id, PanelState::InProgress, "进入工位检验", ctx)
    }

    /// 提交工位判定(校验 + 转换 + 路由的组合调用)
    pub fn submit_station_decision(
        &self,
        panel_id: &str,
        request: StationDecision,
    ) -> WorkflowResult<DecisionResult> {
        // 步骤1: 解析判定类型
        let decision = Decision::from_str(&request.decision).ok_or_else(|| {
            WorkflowError::InvalidDecision {
                decision: request.decision.clone(),
            }
        })?;

        let entry = self.store.get(panel_id)?;
        let mut record = entry
            .lock()
            .map_err(|e| WorkflowError::LockError(e.to_string()))?;

        // 步骤2: 提交工位必须与组件当前工位一致
        if let Some(current) = record.current_station() {
            if current != request.station_id {
                return Err(WorkflowError::InvalidStation {
                    station_id: request.station_id.clone(),
                });
            }
        }

        // 步骤3: 判定校验(纯逻辑,失败时记录无任何变更)
        // 单次提交只解析一次判定项集合,中途热加载不影响本次提交的视图
        let criteria_set = self.registry.resolve(&request.station_id, record.line)?;
        let mut outcome = self.validator.validate_with_set(
            &criteria_set,
            decision,
            &request.selected_criteria,
            request.notes.as_deref(),
        )?;

        // 测量负载阈值检查(仅产生告警)
        if let Some(measurements) = &request.measurements {
            outcome.warnings.extend(
                self.validator
                    .check_measurements_with_set(&criteria_set, measurements),
            );
        }

        // 步骤4: 返修上限策略(REWORK 处置在达到上限后仅允许隔离)
        if decision == Decision::Rework
            && self.config.enforce_rework_limit
            && record.rework_count >= self.config.max_rework_attempts
        {
            return Err(WorkflowError::ReworkLimitExceeded {
                panel_id: panel_id.to_string(),
                rework_count: record.rework_count,
                max: self.config.max_rework_attempts,
            });
        }

        // 步骤5: 判定 → 目标状态映射与转换
        let (target, reason) = match decision {
            Decision::Pass => (PanelState::Passed, "工位判定: PASS"),
            Decision::Fail => (PanelState::Failed, "工位判定: FAIL"),
            Decision::Rework => (PanelState::ReworkNeeded, "处置指令: REWORK"),
            Decision::Quarantine => (PanelState::Quarantine, "处置指令: QUARANTINE"),
        };

        let quality_data = (decision == Decision::Pass).then(|| {
            json!({
                "decision": decision.to_string(),
                "quality_score": outcome.quality_score,
                "criteria": request.selected_criteria,
                "measurements": request.measurements,
                "notes": request.notes,
                "recorded_at": Utc::now(),
            })
        });

        let ctx = TransitionContext {
            station_id: Some(request.station_id.clone()),
            quality_data,
            notes: request.notes.clone(),
            criteria: (!request.selected_criteria.is_empty())
                .then(|| request.selected_criteria.clone()),
            rework_station: request.rework_station.clone(),
            severity: request.severity,
            operator: request.operator.clone(),
        };

        let history_before = record.history.len();
        let mut events = Vec::new();
        let mut completed = false;
        self.apply_transition(&mut record, target, reason, &ctx, &mut events, &mut completed)?;

        // 步骤6: 路由策略决定后续动作
        let next_actions = match decision {
            Decision::Pass => {
                if completed {
                    vec![RequiredAction::CompleteWorkflow]
                } else {
                    vec![RequiredAction::ProceedToNextStation]
                }
            }
            Decision::Fail => {
                if self.config.enforce_rework_limit
                    && record.rework_count >= self.config.max_rework_attempts
                {
                    vec![RequiredAction::QuarantineOnly]
                } else {
                    vec![
                        RequiredAction::RouteToRework,
                        RequiredAction::RouteToQuarantine,
                    ]
                }
            }
            Decision::Rework => vec![RequiredAction::ProceedToNextStation],
            Decision::Quarantine => Vec::new(),
        };
        outcome.required_actions = next_actions.clone();

        let snapshot = record.clone();
        let new_history = record.history[history_before..].to_vec();
        drop(record);

        self.finalize(panel_id, &snapshot, &new_history, &events, completed)?;

        Ok(DecisionResult {
            workflow: snapshot,
            outcome,
            next_actions,
            events,
        })
    }

    /// 通用状态转换(服务层直接驱动状态机的入口)
    ///
    /// # 返回
    /// - Err(InvalidTransition): 目标不在允许集合,记录保持不变
    /// - Err(PanelNotFound/PanelArchived): panel_id 不在活跃区
    pub fn transition(
        &self,
        panel_id: &str,
        target: PanelState,
        reason: &str,
        ctx: TransitionContext,
    ) -> WorkflowResult<TransitionResult> {
        let entry = self.store.get(panel_id)?;
        let mut record = entry
            .lock()
            .map_err(|e| WorkflowError::LockError(e.to_string()))?;

        let history_before = record.history.len();
        let mut events = Vec::new();
        let mut completed = false;
        self.apply_transition(&mut record, target, reason, &ctx, &mut events, &mut completed)?;

        let snapshot = record.clone();
        let new_history = record.history[history_before..].to_vec();
        drop(record);

        self.finalize(panel_id, &snapshot, &new_history, &events, completed)?;

        Ok(TransitionResult {
            workflow: snapshot,
            events,
        })
    }

    // ==========================================
    // 查询接口
    // ==========================================

    /// 查询活跃记录快照
    ///
    /// # 返回
    /// - Err(PanelArchived): 已完成归档(与从未存在可区分)
    pub fn get_panel_state(&self, panel_id: &str) -> WorkflowResult<PanelWorkflowRecord> {
        let entry = self.store.get(panel_id)?;
        let record = entry
            .lock()
            .map_err(|e| WorkflowError::LockError(e.to_string()))?;
        Ok(record.clone())
    }

    /// 查询记录生命周期(Active/Archived/Unknown)
    pub fn get_lifecycle(&self, panel_id: &str) -> WorkflowResult<PanelLifecycle> {
        self.store.lifecycle(panel_id)
    }

    /// 查询工位队列
    pub fn get_station_queue(&self, station_id: &str) -> WorkflowResult<Vec<String>> {
        self.store.station_queue(station_id)
    }

    /// 查询转换历史(含已归档组件)
    pub fn get_transition_history(
        &self,
        panel_id: &str,
    ) -> WorkflowResult<Vec<TransitionHistoryEntry>> {
        match self.store.get(panel_id) {
            Ok(entry) => {
                let record = entry
                    .lock()
                    .map_err(|e| WorkflowError::LockError(e.to_string()))?;
                Ok(record.history.clone())
            }
            Err(WorkflowError::PanelArchived { .. }) => {
                let archived = self
                    .store
                    .get_archived(panel_id)?
                    .ok_or_else(|| WorkflowError::PanelNotFound {
                        panel_id: panel_id.to_string(),
                    })?;
                Ok(archived.snapshot.history)
            }
            Err(e) => Err(e),
        }
    }

    /// 活跃组件数
    pub fn active_panel_count(&self) -> WorkflowResult<usize> {
        self.store.active_count()
    }

    // ==========================================
    // 内部: 转换执行
    // ==========================================

    /// 在已持有组件锁的前提下执行一次转换
    ///
    /// 不变量: 任何 Err 返回发生在首次写入之前,记录保持原状
    fn apply_transition(
        &self,
        record: &mut PanelWorkflowRecord,
        target: PanelState,
        reason: &str,
        ctx: &TransitionContext,
        events: &mut Vec<WorkflowEvent>,
        completed: &mut bool,
    ) -> WorkflowResult<()> {
        // 前置1: 合法转换表
        WorkflowStateMachine::ensure_allowed(record.current_state, target)?;

        // 前置2: 目标工位必须在本组件的工位序列内(缺失是调用方错误,不做静默默认)
        let station_index = match (&target, &ctx.station_id) {
            (PanelState::InProgress, Some(station_id)) => Some(
                record
                    .station_position(station_id)
                    .ok_or_else(|| WorkflowError::InvalidStation {
                        station_id: station_id.clone(),
                    })?,
            ),
            _ => None,
        };
        let rework_index = match (&target, &ctx.rework_station) {
            (PanelState::ReworkNeeded, Some(station_id)) => Some(
                record
                    .station_position(station_id)
                    .ok_or_else(|| WorkflowError::InvalidStation {
                        station_id: station_id.clone(),
                    })?,
            ),
            _ => None,
        };

        let from = record.current_state;
        record.current_state = target;
        record.last_update_time = Utc::now();

        debug!(
            panel_id = %record.panel_id,
            from = %from,
            to = %target,
            reason,
            "状态转换提交"
        );

        // 状态专属副作用
        let mut auto_complete = false;
        match target {
            PanelState::InProgress => {
                if let (Some(index), Some(station_id)) = (station_index, &ctx.station_id) {
                    record.current_station_index = index as i32;
                    self.store.enqueue(station_id, &record.panel_id)?;
                }
            }
            PanelState::Passed => {
                auto_complete = self.on_passed(record, ctx, events)?;
            }
            PanelState::Failed => {
                record.append_note(WorkflowNote {
                    note_type: NoteType::Fail,
                    timestamp: Utc::now(),
                    station_id: record.current_station().map(|s| s.to_string()),
                    content: ctx
                        .notes
                        .clone()
                        .unwrap_or_else(|| "工位判定不合格".to_string()),
                    criteria: ctx.criteria.clone(),
                    severity: None,
                    operator: ctx.operator.clone(),
                });
                record.rework_count += 1;
            }
            PanelState::ReworkNeeded => {
                record.append_note(WorkflowNote {
                    note_type: NoteType::Rework,
                    timestamp: Utc::now(),
                    station_id: ctx
                        .rework_station
                        .clone()
                        .or_else(|| record.current_station().map(|s| s.to_string())),
                    content: ctx
                        .notes
                        .clone()
                        .unwrap_or_else(|| "路由返修".to_string()),
                    criteria: ctx.criteria.clone(),
                    severity: None,
                    operator: ctx.operator.clone(),
                });
                if let (Some(index), Some(station_id)) = (rework_index, &ctx.rework_station) {
                    record.current_station_index = index as i32;
                    self.store.remove_from_all_queues(&record.panel_id)?;
                    self.store.enqueue(station_id, &record.panel_id)?;
                }
            }
            PanelState::Quarantine => {
                record.append_note(WorkflowNote {
                    note_type: NoteType::Quarantine,
                    timestamp: Utc::now(),
                    station_id: record.current_station().map(|s| s.to_string()),
                    content: ctx.notes.clone().unwrap_or_else(|| "隔离处置".to_string()),
                    criteria: ctx.criteria.clone(),
                    severity: Some(ctx.severity.unwrap_or(QuarantineSeverity::Major)),
                    operator: ctx.operator.clone(),
                });
                self.store.remove_from_all_queues(&record.panel_id)?;
            }
            PanelState::Completed => {
                self.on_completed(record, ctx)?;
                *completed = true;
            }
            PanelState::Scanned => {
                // 初始化唯一入口在 initialize_panel,转换表不含回到 SCANNED 的边
            }
        }

        // 追加历史并登记事件
        let additional_data = json!({
            "station_id": ctx.station_id,
            "station_index": record.current_station_index,
            "operator": ctx.operator,
            "criteria": ctx.criteria,
        });
        record.append_history(TransitionHistoryEntry::new(
            from,
            target,
            reason,
            Some(additional_data),
        ));
        events.push(WorkflowEvent::StateTransition {
            panel_id: record.panel_id.clone(),
            from_state: from,
            to_state: target,
            reason: reason.to_string(),
            timestamp: Utc::now(),
        });

        // 完成事件在 PASSED→COMPLETED 转换事件之后发出,保持因果顺序
        if target == PanelState::Completed {
            events.push(WorkflowEvent::PanelCompleted {
                panel_id: record.panel_id.clone(),
                panel_type: record.panel_type.clone(),
                line: record.line,
                rework_count: record.rework_count,
                timestamp: Utc::now(),
            });
        }

        // 末站通过: 在 PASSED 历史落账后立即自动判定完成
        if auto_complete {
            self.apply_transition(
                record,
                PanelState::Completed,
                "全部工位通过",
                &TransitionContext {
                    quality_data: ctx.quality_data.clone(),
                    operator: ctx.operator.clone(),
                    ..Default::default()
                },
                events,
                completed,
            )?;
        }

        Ok(())
    }

    /// PASSED 副作用: 记录质检数据后评估推进
    ///
    /// # 返回
    /// - Ok(true): 工位序列已走完,调用方应自动转换到 COMPLETED
    fn on_passed(
        &self,
        record: &mut PanelWorkflowRecord,
        ctx: &TransitionContext,
        events: &mut Vec<WorkflowEvent>,
    ) -> WorkflowResult<bool> {
        if let (Some(station), Some(payload)) = (record.current_station(), &ctx.quality_data) {
            let station = station.to_string();
            record.record_quality_data(&station, payload.clone());
        }

        let current_station = record.current_station().map(|s| s.to_string());
        if let Some(station) = &current_station {
            self.store.remove_from_queue(station, &record.panel_id)?;
        }

        if record.sequence_exhausted() {
            return Ok(true);
        }

        // 推进到下一工位并入队
        let next_index = (record.current_station_index + 1) as usize;
        let next_station = record.station_sequence[next_index].clone();
        record.current_station_index = next_index as i32;
        self.store.enqueue(&next_station, &record.panel_id)?;

        info!(
            panel_id = %record.panel_id,
            next_station = %next_station,
            "组件通过本站,已就绪进入下一工位"
        );
        events.push(WorkflowEvent::ReadyForNextStation {
            panel_id: record.panel_id.clone(),
            next_station,
            panel_type: record.panel_type.clone(),
            timestamp: Utc::now(),
        });
        Ok(false)
    }

    /// COMPLETED 副作用: 收尾数据 + 队列清理(完成事件由转换主流程登记)
    fn on_completed(
        &self,
        record: &mut PanelWorkflowRecord,
        ctx: &TransitionContext,
    ) -> WorkflowResult<()> {
        let final_payload = json!({
            "completed_at": Utc::now(),
            "rework_count": record.rework_count,
            "quality_data": ctx.quality_data,
        });
        record.record_quality_data(FINAL_QUALITY_KEY, final_payload);

        if let Some(notes) = &ctx.notes {
            record.append_note(WorkflowNote {
                note_type: NoteType::Final,
                timestamp: Utc::now(),
                station_id: record.current_station().map(|s| s.to_string()),
                content: notes.clone(),
                criteria: None,
                severity: None,
                operator: ctx.operator.clone(),
            });
        }

        self.store.remove_from_all_queues(&record.panel_id)?;

        info!(
            panel_id = %record.panel_id,
            rework_count = record.rework_count,
            "组件全部工位通过,进入归档"
        );
        Ok(())
    }

    /// 转换提交后的收尾: 归档 + 异步派发
    ///
    /// 红线: 派发失败不回滚已提交的转换
    fn finalize(
        &self,
        panel_id: &str,
        snapshot: &PanelWorkflowRecord,
        new_history: &[TransitionHistoryEntry],
        events: &[WorkflowEvent],
        completed: bool,
    ) -> WorkflowResult<()> {
        if completed {
            self.store.archive(panel_id, snapshot.clone())?;
            self.dispatcher.dispatch_completion(snapshot);
        }
        self.dispatcher.dispatch_history(panel_id, new_history);
        self.dispatcher.dispatch_events(events);
        Ok(())
    }
}
