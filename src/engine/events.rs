// ==========================================
// 光伏组件产线质检工作流系统 - 引擎层事件发布
// ==========================================
// 职责: 定义领域事件与下游接收器 trait,实现依赖倒置
// 说明: Engine 层定义 trait,服务层注入实现(通知/指标/持久化)
// 红线: 事件派发为 fire-and-forget,下游慢写不得阻塞状态变更,
//       派发失败不回滚已提交的转换
// ==========================================

use crate::domain::panel::{PanelWorkflowRecord, TransitionHistoryEntry};
use crate::domain::types::{Line, PanelState};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::sync::Arc;
use tracing::{debug, warn};

// ==========================================
// 领域事件
// ==========================================

/// 工作流领域事件
///
/// 每个引擎操作把产生的事件列表放进返回值(显式可见),
/// 同时转发给已配置的接收器
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowEvent {
    /// 组件初始化完成
    PanelInitialized {
        panel_id: String,
        panel_type: String,
        line: Line,
        timestamp: DateTime<Utc>,
    },
    /// 状态转换已提交
    StateTransition {
        panel_id: String,
        from_state: PanelState,
        to_state: PanelState,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    /// 组件可进入下一工位
    ReadyForNextStation {
        panel_id: String,
        next_station: String,
        panel_type: String,
        timestamp: DateTime<Utc>,
    },
    /// 组件全部工位通过
    PanelCompleted {
        panel_id: String,
        panel_type: String,
        line: Line,
        rework_count: u32,
        timestamp: DateTime<Utc>,
    },
}

impl WorkflowEvent {
    /// 事件类型标识(供指标/路由使用)
    pub fn event_type(&self) -> &'static str {
        match self {
            WorkflowEvent::PanelInitialized { .. } => "PANEL_INITIALIZED",
            WorkflowEvent::StateTransition { .. } => "STATE_TRANSITION",
            WorkflowEvent::ReadyForNextStation { .. } => "READY_FOR_NEXT_STATION",
            WorkflowEvent::PanelCompleted { .. } => "PANEL_COMPLETED",
        }
    }

    /// 所属组件
    pub fn panel_id(&self) -> &str {
        match self {
            WorkflowEvent::PanelInitialized { panel_id, .. }
            | WorkflowEvent::StateTransition { panel_id, .. }
            | WorkflowEvent::ReadyForNextStation { panel_id, .. }
            | WorkflowEvent::PanelCompleted { panel_id, .. } => panel_id,
        }
    }
}

// ==========================================
// 接收器 Trait
// ==========================================

/// 事件接收器(通知/告警/看板)
///
/// Engine 层定义,服务层实现; 接收器自行负责重试与失败处理
#[async_trait]
pub trait WorkflowEventSink: Send + Sync {
    async fn publish(&self, event: WorkflowEvent) -> Result<(), Box<dyn Error + Send + Sync>>;
}

/// 持久化接收器(审计历史 + 完成快照)
///
/// 红线: 引擎内存记录是活跃遍历期的唯一事实,归档前必须先落审计
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    /// 落一条转换历史
    async fn append_history(
        &self,
        panel_id: &str,
        entry: &TransitionHistoryEntry,
    ) -> Result<(), Box<dyn Error + Send + Sync>>;

    /// 落完成快照(引擎侧归档后内存记录不再对外可查)
    async fn store_completion(
        &self,
        snapshot: &PanelWorkflowRecord,
    ) -> Result<(), Box<dyn Error + Send + Sync>>;
}

// ==========================================
// 空操作实现(单元测试/未接下游的场景)
// ==========================================

#[derive(Debug, Clone, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl WorkflowEventSink for NoOpEventSink {
    async fn publish(&self, event: WorkflowEvent) -> Result<(), Box<dyn Error + Send + Sync>> {
        debug!(
            event_type = event.event_type(),
            panel_id = event.panel_id(),
            "NoOpEventSink: 跳过事件发布"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct NoOpPersistenceSink;

#[async_trait]
impl PersistenceSink for NoOpPersistenceSink {
    async fn append_history(
        &self,
        panel_id: &str,
        entry: &TransitionHistoryEntry,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        debug!(
            panel_id,
            entry_id = %entry.entry_id,
            "NoOpPersistenceSink: 跳过历史落库"
        );
        Ok(())
    }

    async fn store_completion(
        &self,
        snapshot: &PanelWorkflowRecord,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        debug!(panel_id = %snapshot.panel_id, "NoOpPersistenceSink: 跳过完成快照落库");
        Ok(())
    }
}

// ==========================================
// SinkDispatcher - 接收器派发器
// ==========================================
// 说明: 简化 Option<Arc<dyn ...>> 的使用; 派发 spawn 到当前
//       tokio 运行时,失败仅记日志; 运行时外调用丢弃派发
#[derive(Clone, Default)]
pub struct SinkDispatcher {
    event_sink: Option<Arc<dyn WorkflowEventSink>>,
    persistence: Option<Arc<dyn PersistenceSink>>,
}

impl SinkDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// 配置事件接收器
    pub fn with_event_sink(mut self, sink: Arc<dyn WorkflowEventSink>) -> Self {
        self.event_sink = Some(sink);
        self
    }

    /// 配置持久化接收器
    pub fn with_persistence(mut self, sink: Arc<dyn PersistenceSink>) -> Self {
        self.persistence = Some(sink);
        self
    }

    pub fn has_event_sink(&self) -> bool {
        self.event_sink.is_some()
    }

    pub fn has_persistence(&self) -> bool {
        self.persistence.is_some()
    }

    /// 取当前 tokio 运行时句柄; 运行时外调用时丢弃派发并告警,不 panic
    fn runtime_handle() -> Option<tokio::runtime::Handle> {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => Some(handle),
            Err(_) => {
                warn!("当前线程无 tokio 运行时,本次接收器派发被丢弃");
                None
            }
        }
    }

    /// 异步派发事件列表(fire-and-forget)
    pub fn dispatch_events(&self, events: &[WorkflowEvent]) {
        let Some(sink) = &self.event_sink else {
            return;
        };
        let Some(handle) = Self::runtime_handle() else {
            return;
        };
        for event in events {
            let sink = Arc::clone(sink);
            let event = event.clone();
            handle.spawn(async move {
                if let Err(e) = sink.publish(event.clone()).await {
                    warn!(
                        event_type = event.event_type(),
                        panel_id = event.panel_id(),
                        error = %e,
                        "事件发布失败(不影响已提交的转换)"
                    );
                }
            });
        }
    }

    /// 异步派发转换历史(fire-and-forget)
    pub fn dispatch_history(&self, panel_id: &str, entries: &[TransitionHistoryEntry]) {
        let Some(sink) = &self.persistence else {
            return;
        };
        let Some(handle) = Self::runtime_handle() else {
            return;
        };
        for entry in entries {
            let sink = Arc::clone(sink);
            let panel_id = panel_id.to_string();
            let entry = entry.clone();
            handle.spawn(async move {
                if let Err(e) = sink.append_history(&panel_id, &entry).await {
                    warn!(panel_id = %panel_id, error = %e, "转换历史落库失败");
                }
            });
        }
    }

    /// 异步派发完成快照(fire-and-forget)
    pub fn dispatch_completion(&self, snapshot: &PanelWorkflowRecord) {
        let Some(sink) = &self.persistence else {
            return;
        };
        let Some(handle) = Self::runtime_handle() else {
            return;
        };
        let sink = Arc::clone(sink);
        let snapshot = snapshot.clone();
        handle.spawn(async move {
            if let Err(e) = sink.store_completion(&snapshot).await {
                warn!(panel_id = %snapshot.panel_id, error = %e, "完成快照落库失败");
            }
        });
    }
}
