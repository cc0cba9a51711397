// ==========================================
// 光伏组件产线质检工作流系统 - 组件工作流领域模型
// ==========================================
// 依据: Workflow_Engine_Specs_v0.2.md - 3. 数据模型
// 红线: current_state 只能经状态机写入; history/notes 只追加不修改
// ==========================================

use crate::domain::types::{Line, NoteType, PanelState, QuarantineSeverity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use uuid::Uuid;

/// quality_data 中的保留键: 完成时写入的收尾数据
pub const FINAL_QUALITY_KEY: &str = "final";

// ==========================================
// WorkflowNote - 工作流备注
// ==========================================
// 用途: 追加式标注(不合格/返修/隔离/收尾)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowNote {
    pub note_type: NoteType,        // 备注类型
    pub timestamp: DateTime<Utc>,   // 记录时间
    pub station_id: Option<String>, // 产生备注的工位
    pub content: String,            // 备注内容

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub criteria: Option<Vec<String>>, // 关联的判定项 id 列表

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<QuarantineSeverity>, // 隔离严重级别(仅 QUARANTINE 备注)

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>, // 操作人标识(由上游鉴权层解析,引擎不解释)
}

// ==========================================
// TransitionHistoryEntry - 状态转换历史条目
// ==========================================
// 红线: 追加后不可变,用于审计
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionHistoryEntry {
    pub entry_id: String,         // 条目 ID (UUID)
    pub timestamp: DateTime<Utc>, // 转换时间
    pub from_state: PanelState,   // 源状态
    pub to_state: PanelState,     // 目标状态
    pub reason: String,           // 转换原因

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_data: Option<JsonValue>, // 附加快照(工位/分数/操作人等)
}

impl TransitionHistoryEntry {
    /// 创建历史条目(entry_id 自动生成)
    pub fn new(
        from_state: PanelState,
        to_state: PanelState,
        reason: &str,
        additional_data: Option<JsonValue>,
    ) -> Self {
        Self {
            entry_id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            from_state,
            to_state,
            reason: reason.to_string(),
            additional_data,
        }
    }
}

// ==========================================
// PanelWorkflowRecord - 组件工作流记录
// ==========================================
// 红线: 每个 panel_id 只创建一次; COMPLETED 后移入归档区
// 不变量: current_station_index 正向推进只增; 返修可回退但不低于 0
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanelWorkflowRecord {
    // ===== 初始化后不可变 =====
    pub panel_id: String,              // 组件唯一标识
    pub barcode: String,               // 条码(已由扫码层校验)
    pub panel_type: String,            // 版型(36/40/60/72/144)
    pub line: Line,                    // 产线归属
    pub station_sequence: Vec<String>, // 本产线工位顺序(初始化时快照)

    // ===== 工作流状态 =====
    pub current_state: PanelState,  // 当前状态(只经状态机写入)
    pub current_station_index: i32, // 当前工位下标(-1 表示未进入首站)
    pub rework_count: u32,          // 累计不合格次数(单调不减)

    // ===== 质检数据 =====
    pub quality_data: HashMap<String, JsonValue>, // 工位 id → 测量/判定负载("final" 为保留键)
    pub notes: Vec<WorkflowNote>,                 // 追加式备注序列
    pub history: Vec<TransitionHistoryEntry>,     // 追加式转换历史

    // ===== 审计字段 =====
    pub start_time: DateTime<Utc>,       // 进入产线时间
    pub last_update_time: DateTime<Utc>, // 最后变更时间
}

impl PanelWorkflowRecord {
    /// 创建新记录(初始状态 SCANNED,未进入首站)
    pub fn new(
        panel_id: &str,
        barcode: &str,
        panel_type: &str,
        line: Line,
        station_sequence: Vec<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            panel_id: panel_id.to_string(),
            barcode: barcode.to_string(),
            panel_type: panel_type.to_string(),
            line,
            station_sequence,
            current_state: PanelState::Scanned,
            current_station_index: -1,
            rework_count: 0,
            quality_data: HashMap::new(),
            notes: Vec::new(),
            history: Vec::new(),
            start_time: now,
            last_update_time: now,
        }
    }

    /// 当前工位 id (未进入首站时为 None)
    pub fn current_station(&self) -> Option<&str> {
        if self.current_station_index < 0 {
            return None;
        }
        self.station_sequence
            .get(self.current_station_index as usize)
            .map(|s| s.as_str())
    }

    /// 查找工位在本记录工位序列中的下标
    pub fn station_position(&self, station_id: &str) -> Option<usize> {
        self.station_sequence.iter().position(|s| s == station_id)
    }

    /// 是否已走完工位序列(下一步应判定完成)
    pub fn sequence_exhausted(&self) -> bool {
        self.current_station_index >= 0
            && (self.current_station_index as usize) + 1 >= self.station_sequence.len()
    }

    /// 追加备注并刷新变更时间
    pub fn append_note(&mut self, note: WorkflowNote) {
        self.notes.push(note);
        self.last_update_time = Utc::now();
    }

    /// 写入工位质检数据并刷新变更时间
    pub fn record_quality_data(&mut self, key: &str, payload: JsonValue) {
        self.quality_data.insert(key.to_string(), payload);
        self.last_update_time = Utc::now();
    }

    /// 追加转换历史条目并刷新变更时间
    pub fn append_history(&mut self, entry: TransitionHistoryEntry) {
        self.history.push(entry);
        self.last_update_time = Utc::now();
    }
}

// ==========================================
// ArchivedPanel - 已完成组件归档条目
// ==========================================
// 说明: 完成后归档而非静默删除,调用方可区分
//       "从未存在"与"已完成归档"
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchivedPanel {
    pub panel_id: String,              // 组件标识
    pub archived_at: DateTime<Utc>,    // 归档时间
    pub snapshot: PanelWorkflowRecord, // 完成时刻的完整记录快照
}
