// ==========================================
// 光伏组件产线质检工作流系统 - 领域类型定义
// ==========================================
// 依据: Workflow_Engine_Specs_v0.2.md - 4.1 状态机
// 依据: QC_Criteria_Specs_v0.2.md - 判定类型体系
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 工作流状态 (Panel Workflow State)
// ==========================================
// 红线: 状态只能通过合法转换表变更,禁止直接赋值
// 序列化格式: SCREAMING_SNAKE_CASE (与历史表一致)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PanelState {
    Scanned,      // 已扫码(初始状态)
    InProgress,   // 检验中
    Passed,       // 本站通过
    Failed,       // 本站不合格
    ReworkNeeded, // 待返修
    Completed,    // 全部完成(终态)
    Quarantine,   // 隔离
}

impl fmt::Display for PanelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl PanelState {
    /// 从字符串解析状态
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "SCANNED" => Some(PanelState::Scanned),
            "IN_PROGRESS" => Some(PanelState::InProgress),
            "PASSED" => Some(PanelState::Passed),
            "FAILED" => Some(PanelState::Failed),
            "REWORK_NEEDED" => Some(PanelState::ReworkNeeded),
            "COMPLETED" => Some(PanelState::Completed),
            "QUARANTINE" => Some(PanelState::Quarantine),
            _ => None,
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            PanelState::Scanned => "SCANNED",
            PanelState::InProgress => "IN_PROGRESS",
            PanelState::Passed => "PASSED",
            PanelState::Failed => "FAILED",
            PanelState::ReworkNeeded => "REWORK_NEEDED",
            PanelState::Completed => "COMPLETED",
            PanelState::Quarantine => "QUARANTINE",
        }
    }

    /// 是否为终态(无出边)
    pub fn is_terminal(&self) -> bool {
        matches!(self, PanelState::Completed)
    }
}

// ==========================================
// 产线 (Production Line)
// ==========================================
// 两条产线共用检验工序框架,判定项通过产线叠加层区分
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Line {
    Line1, // 常规组件产线(36/40/60/72片)
    Line2, // 大版型组件产线(144半片)
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Line::Line1 => write!(f, "LINE_1"),
            Line::Line2 => write!(f, "LINE_2"),
        }
    }
}

impl Line {
    /// 从字符串解析产线
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "LINE_1" => Some(Line::Line1),
            "LINE_2" => Some(Line::Line2),
            _ => None,
        }
    }
}

// ==========================================
// 检验判定 (Inspection Decision)
// ==========================================
// PASS/FAIL 走判定项校验; REWORK/QUARANTINE 为主管处置指令,不做判定项校验
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Pass,       // 合格
    Fail,       // 不合格
    Rework,     // 返修处置
    Quarantine, // 隔离处置
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Pass => write!(f, "PASS"),
            Decision::Fail => write!(f, "FAIL"),
            Decision::Rework => write!(f, "REWORK"),
            Decision::Quarantine => write!(f, "QUARANTINE"),
        }
    }
}

impl Decision {
    /// 从字符串解析判定类型(大小写不敏感)
    ///
    /// # 返回
    /// - None: 非法判定类型(调用方应转换为 InvalidDecision 错误)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "PASS" => Some(Decision::Pass),
            "FAIL" => Some(Decision::Fail),
            "REWORK" => Some(Decision::Rework),
            "QUARANTINE" => Some(Decision::Quarantine),
            _ => None,
        }
    }
}

// ==========================================
// 判定项极性 (Criterion Polarity)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CriterionPolarity {
    Pass, // 合格判定项
    Fail, // 缺陷判定项
}

impl fmt::Display for CriterionPolarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CriterionPolarity::Pass => write!(f, "PASS"),
            CriterionPolarity::Fail => write!(f, "FAIL"),
        }
    }
}

// ==========================================
// 备注类型 (Note Type)
// ==========================================
// 工作流记录上的追加式备注分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NoteType {
    Fail,       // 不合格备注(站点+缺陷项+说明)
    Rework,     // 返修备注
    Quarantine, // 隔离备注(原因+严重级别)
    Final,      // 完成时的收尾备注
}

impl fmt::Display for NoteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoteType::Fail => write!(f, "FAIL"),
            NoteType::Rework => write!(f, "REWORK"),
            NoteType::Quarantine => write!(f, "QUARANTINE"),
            NoteType::Final => write!(f, "FINAL"),
        }
    }
}

// ==========================================
// 隔离严重级别 (Quarantine Severity)
// ==========================================
// 顺序: Minor < Major < Critical
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuarantineSeverity {
    Minor,    // 轻微(可快速复判)
    Major,    // 严重(需工程确认)
    Critical, // 危急(禁止回流)
}

impl fmt::Display for QuarantineSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuarantineSeverity::Minor => write!(f, "MINOR"),
            QuarantineSeverity::Major => write!(f, "MAJOR"),
            QuarantineSeverity::Critical => write!(f, "CRITICAL"),
        }
    }
}

impl QuarantineSeverity {
    /// 从字符串解析严重级别,未知值回落为 Major
    pub fn from_str_or_default(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "MINOR" => QuarantineSeverity::Minor,
            "MAJOR" => QuarantineSeverity::Major,
            "CRITICAL" => QuarantineSeverity::Critical,
            _ => QuarantineSeverity::Major,
        }
    }
}
