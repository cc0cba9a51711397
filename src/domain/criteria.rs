// ==========================================
// 光伏组件产线质检工作流系统 - 判定项领域模型
// ==========================================
// 依据: QC_Criteria_Specs_v0.2.md - 2. 判定项与阈值
// 红线: 严重度扣分挂在判定项实体上,不做显示名文本匹配
// ==========================================

use crate::domain::types::{CriterionPolarity, Line};
use serde::{Deserialize, Serialize};

/// 未显式配置扣分时的默认严重度扣分
pub const DEFAULT_SEVERITY_PENALTY: f64 = 20.0;

// ==========================================
// Station - 检验工位
// ==========================================
// 用途: 静态配置,产线决定工位顺序
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub station_id: String, // 工位标识(如 STN_EL)
    pub name: String,       // 工位名称(如 EL测试)
    pub position: usize,    // 产线内顺序位(0 起)
}

// ==========================================
// Criterion - 检验判定项
// ==========================================
// 对齐: criteria_config.json criteria 节点
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    pub id: String,                  // 判定项标识(与检验终端显示一致)
    pub label: String,               // 显示名称
    pub polarity: CriterionPolarity, // 极性(PASS/FAIL)

    #[serde(default)]
    pub required: bool, // 必检项标记(计入合格率分母)

    #[serde(default)]
    pub notes_required: bool, // 勾选后必须填写备注

    #[serde(default = "default_penalty")]
    pub severity_penalty: f64, // 严重度扣分(默认 20)

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_specific: Option<Line>, // 仅在指定产线下有效
}

fn default_penalty() -> f64 {
    DEFAULT_SEVERITY_PENALTY
}

impl Criterion {
    /// 创建缺陷判定项(最常用的构造路径)
    pub fn fail(id: &str, label: &str) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            polarity: CriterionPolarity::Fail,
            required: false,
            notes_required: false,
            severity_penalty: DEFAULT_SEVERITY_PENALTY,
            line_specific: None,
        }
    }

    /// 创建合格判定项
    pub fn pass(id: &str, label: &str) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            polarity: CriterionPolarity::Pass,
            required: false,
            notes_required: false,
            severity_penalty: DEFAULT_SEVERITY_PENALTY,
            line_specific: None,
        }
    }

    /// 设置严重度扣分
    pub fn with_penalty(mut self, penalty: f64) -> Self {
        self.severity_penalty = penalty;
        self
    }

    /// 标记为备注必填
    pub fn with_notes_required(mut self) -> Self {
        self.notes_required = true;
        self
    }

    /// 标记为必检项
    pub fn with_required(mut self) -> Self {
        self.required = true;
        self
    }

    /// 限定生效产线
    pub fn with_line(mut self, line: Line) -> Self {
        self.line_specific = Some(line);
        self
    }
}

// ==========================================
// QualityThresholds - 数值阈值组
// ==========================================
// 用途: 供提交测量数据而非终判列表的调用方使用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityThresholds {
    #[serde(default = "default_min_quality_score")]
    pub min_quality_score: f64, // 质量分下限(低于则提示复检)

    #[serde(default = "default_power_tolerance_pct")]
    pub power_tolerance_pct: f64, // 功率允差(%)

    #[serde(default = "default_min_pass_rate")]
    pub min_pass_rate: f64, // 必检项合格率下限
}

fn default_min_quality_score() -> f64 {
    70.0
}

fn default_power_tolerance_pct() -> f64 {
    3.0
}

fn default_min_pass_rate() -> f64 {
    0.95
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            min_quality_score: default_min_quality_score(),
            power_tolerance_pct: default_power_tolerance_pct(),
            min_pass_rate: default_min_pass_rate(),
        }
    }
}

// ==========================================
// CriteriaSet - 单 (工位, 产线) 判定项集合
// ==========================================
// 说明: 叠加层合并后的只读快照,校验调用期间不变
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriteriaSet {
    pub station_id: String,            // 所属工位
    pub line: Line,                    // 所属产线
    pub pass_criteria: Vec<Criterion>, // 合格判定项(有序)
    pub fail_criteria: Vec<Criterion>, // 缺陷判定项(有序)

    #[serde(default)]
    pub thresholds: QualityThresholds, // 数值阈值组
}

impl CriteriaSet {
    /// 备注必填判定项 id 列表(派生,不单独存储)
    pub fn notes_required_ids(&self) -> Vec<&str> {
        self.fail_criteria
            .iter()
            .chain(self.pass_criteria.iter())
            .filter(|c| c.notes_required)
            .map(|c| c.id.as_str())
            .collect()
    }

    /// 按 id 查找缺陷判定项
    pub fn find_fail_criterion(&self, id: &str) -> Option<&Criterion> {
        self.fail_criteria.iter().find(|c| c.id == id)
    }

    /// 必检项总数(合格率分母)
    pub fn required_count(&self) -> usize {
        self.pass_criteria
            .iter()
            .chain(self.fail_criteria.iter())
            .filter(|c| c.required)
            .count()
    }

    /// 判断某 id 是否为必检项
    pub fn is_required(&self, id: &str) -> bool {
        self.pass_criteria
            .iter()
            .chain(self.fail_criteria.iter())
            .any(|c| c.required && c.id == id)
    }
}

// ==========================================
// LineOverlay - 产线叠加层
// ==========================================
// 规则: 纯追加合并; 叠加层追加的缺陷判定项按约定强制备注必填
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineOverlay {
    pub line: Line,         // 生效产线
    pub station_id: String, // 生效工位

    #[serde(default)]
    pub additional_pass: Vec<Criterion>, // 追加合格判定项

    #[serde(default)]
    pub additional_fail: Vec<Criterion>, // 追加缺陷判定项
}
