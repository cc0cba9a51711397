// ==========================================
// 光伏组件产线质检工作流系统 - 判定校验引擎
// ==========================================
// 依据: Workflow_Engine_Specs_v0.2.md - 4.3 校验引擎
// 职责: 判定提交校验 + 质量分计算,不触碰组件状态
// 红线: 校验先于状态变更(happens-before),失败时无任何变更
// ==========================================

use crate::domain::criteria::CriteriaSet;
use crate::domain::types::{Decision, Line};
use crate::engine::error::{WorkflowError, WorkflowResult};
use crate::engine::registry::CriteriaRegistry;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::debug;

// ==========================================
// FailureReason - 结构化缺陷原因
// ==========================================
// 用途: 供检验终端/下游自动化精确提示
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureReason {
    pub criterion_id: String,  // 判定项标识
    pub label: String,         // 显示名称
    pub severity_penalty: f64, // 该项扣分
    pub notes_required: bool,  // 是否要求备注
}

// ==========================================
// RequiredAction - 后续处置动作
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequiredAction {
    ProceedToNextStation, // 进入下一工位
    CompleteWorkflow,     // 工位序列已走完,判定完成
    RouteToRework,        // 可路由返修(需指定返修工位)
    RouteToQuarantine,    // 可路由隔离(需指定严重级别)
    QuarantineOnly,       // 返修超限,仅允许隔离
}

// ==========================================
// ValidationOutcome - 校验结果
// ==========================================
// 说明: 校验失败走 Err(WorkflowError),本结构只承载成功路径
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub decision: Decision,              // 判定类型
    pub quality_score: u8,               // 质量分 [0, 100]
    pub passed_criteria_count: usize,    // 合格判定项数
    pub total_criteria_count: usize,     // 判定项总数(FAIL 路径分母=必检项数)
    pub warnings: Vec<String>,           // 非阻断告警
    pub failure_reasons: Vec<FailureReason>, // 结构化缺陷原因
    pub required_actions: Vec<RequiredAction>, // 建议的后续动作
}

// ==========================================
// ValidationEngine - 判定校验引擎
// ==========================================
pub struct ValidationEngine {
    registry: Arc<CriteriaRegistry>,
    default_penalty: f64,
}

impl ValidationEngine {
    /// 创建校验引擎
    ///
    /// # 参数
    /// - registry: 判定项注册表(共享只读)
    /// - default_penalty: 未配置扣分的判定项默认扣分
    pub fn new(registry: Arc<CriteriaRegistry>, default_penalty: f64) -> Self {
        Self {
            registry,
            default_penalty,
        }
    }

    /// 校验一次工位判定提交
    ///
    /// # 规则
    /// 1. PASS: 判定项可不选,空选仅产生告警不报错
    /// 2. FAIL: 必须选择至少一个缺陷判定项,且全部属于该工位/产线集合;
    ///    勾选了备注必填项则备注去空白后必须非空
    /// 3. REWORK/QUARANTINE: 主管处置指令,不做判定项校验
    ///    (与 FAIL 的不对称为有意设计,见 DESIGN.md)
    ///
    /// # 返回
    /// - Ok(ValidationOutcome): 含质量分与结构化原因
    /// - Err: MissingCriteria / UnknownCriterion / NotesRequired / CriteriaNotConfigured
    pub fn validate(
        &self,
        station_id: &str,
        line: Line,
        decision: Decision,
        selected_criteria: &[String],
        notes: Option<&str>,
    ) -> WorkflowResult<ValidationOutcome> {
        let set = self.registry.resolve(station_id, line)?;
        self.validate_with_set(&set, decision, selected_criteria, notes)
    }

    /// 对已解析的判定项集合执行校验
    ///
    /// 一次提交内的多步校验(判定 + 测量)必须复用同一个集合,
    /// 热加载不得让同一提交看到前后不一致的判定项视图
    pub fn validate_with_set(
        &self,
        set: &CriteriaSet,
        decision: Decision,
        selected_criteria: &[String],
        notes: Option<&str>,
    ) -> WorkflowResult<ValidationOutcome> {
        debug!(
            station_id = %set.station_id,
            decision = %decision,
            selected = selected_criteria.len(),
            "开始判定校验"
        );

        match decision {
            Decision::Pass => self.validate_pass(set, selected_criteria),
            Decision::Fail => self.validate_fail(set, selected_criteria, notes),
            // 处置指令按当前设计直接通过
            Decision::Rework | Decision::Quarantine => {
                Ok(self.build_override_outcome(set, decision, selected_criteria))
            }
        }
    }

    // ===== PASS 路径 =====
    fn validate_pass(
        &self,
        _set: &CriteriaSet,
        selected_criteria: &[String],
    ) -> WorkflowResult<ValidationOutcome> {
        let mut warnings = Vec::new();
        if selected_criteria.is_empty() {
            warnings.push("PASS 判定未勾选任何合格判定项".to_string());
        }

        let count = selected_criteria.len();
        Ok(ValidationOutcome {
            decision: Decision::Pass,
            quality_score: 100,
            passed_criteria_count: count,
            total_criteria_count: count,
            warnings,
            failure_reasons: Vec::new(),
            required_actions: vec![RequiredAction::ProceedToNextStation],
        })
    }

    // ===== FAIL 路径 =====
    fn validate_fail(
        &self,
        set: &CriteriaSet,
        selected_criteria: &[String],
        notes: Option<&str>,
    ) -> WorkflowResult<ValidationOutcome> {
        // 规则 1: 必须选择缺陷判定项
        if selected_criteria.is_empty() {
            return Err(WorkflowError::MissingCriteria {
                station_id: set.station_id.clone(),
            });
        }

        // 规则 2: 全部属于该工位/产线的缺陷判定项集合
        for id in selected_criteria {
            if set.find_fail_criterion(id).is_none() {
                return Err(WorkflowError::UnknownCriterion {
                    station_id: set.station_id.clone(),
                    criterion_id: id.clone(),
                });
            }
        }

        // 规则 3: 备注必填项被勾选时备注非空(去空白)
        let notes_required_ids = set.notes_required_ids();
        let triggering: Vec<String> = selected_criteria
            .iter()
            .filter(|id| notes_required_ids.contains(&id.as_str()))
            .cloned()
            .collect();
        if !triggering.is_empty() && notes.map_or(true, |n| n.trim().is_empty()) {
            return Err(WorkflowError::NotesRequired {
                criteria: triggering,
            });
        }

        let quality_score = self.compute_quality_score(Decision::Fail, set, selected_criteria);
        let failure_reasons = self.build_failure_reasons(set, selected_criteria);

        // FAIL 路径分母 = 必检项数,分子 = 分母扣除被勾选的必检项
        let total = set.required_count();
        let failed_required = selected_criteria
            .iter()
            .filter(|id| set.is_required(id))
            .count();
        let passed = total.saturating_sub(failed_required);

        let mut warnings = Vec::new();
        if f64::from(quality_score) < set.thresholds.min_quality_score {
            warnings.push(format!(
                "质量分 {} 低于工位下限 {}",
                quality_score, set.thresholds.min_quality_score
            ));
        }

        Ok(ValidationOutcome {
            decision: Decision::Fail,
            quality_score,
            passed_criteria_count: passed,
            total_criteria_count: total,
            warnings,
            failure_reasons,
            required_actions: vec![
                RequiredAction::RouteToRework,
                RequiredAction::RouteToQuarantine,
            ],
        })
    }

    // ===== REWORK/QUARANTINE 路径 =====
    fn build_override_outcome(
        &self,
        set: &CriteriaSet,
        decision: Decision,
        selected_criteria: &[String],
    ) -> ValidationOutcome {
        let quality_score = self.compute_quality_score(decision, set, selected_criteria);
        ValidationOutcome {
            decision,
            quality_score,
            passed_criteria_count: 0,
            total_criteria_count: set.required_count(),
            warnings: Vec::new(),
            failure_reasons: self.build_failure_reasons(set, selected_criteria),
            required_actions: Vec::new(),
        }
    }

    /// 质量分算法
    ///
    /// # 规则
    /// - PASS → 100
    /// - QUARANTINE → 0
    /// - FAIL/REWORK → 从 100 起,逐项减去严重度扣分,每步落地即截底 0,
    ///   最后四舍五入取整(扣分非负,逐步截底与末端截底等价)
    pub fn compute_quality_score(
        &self,
        decision: Decision,
        set: &CriteriaSet,
        selected_criteria: &[String],
    ) -> u8 {
        match decision {
            Decision::Pass => 100,
            Decision::Quarantine => 0,
            Decision::Fail | Decision::Rework => {
                let mut score: f64 = 100.0;
                for id in selected_criteria {
                    let penalty = set
                        .find_fail_criterion(id)
                        .map(|c| c.severity_penalty)
                        .unwrap_or(self.default_penalty);
                    score = (score - penalty).max(0.0);
                }
                score.round() as u8
            }
        }
    }

    fn build_failure_reasons(
        &self,
        set: &CriteriaSet,
        selected_criteria: &[String],
    ) -> Vec<FailureReason> {
        selected_criteria
            .iter()
            .map(|id| match set.find_fail_criterion(id) {
                Some(c) => FailureReason {
                    criterion_id: c.id.clone(),
                    label: c.label.clone(),
                    severity_penalty: c.severity_penalty,
                    notes_required: c.notes_required,
                },
                // 处置指令允许携带集合外的判定项,按默认扣分记录
                None => FailureReason {
                    criterion_id: id.clone(),
                    label: id.clone(),
                    severity_penalty: self.default_penalty,
                    notes_required: false,
                },
            })
            .collect()
    }

    /// 测量数据阈值检查(供提交测量负载的调用方使用)
    ///
    /// # 约定字段
    /// - power_measured_w / power_rated_w: 实测/标称功率,偏差超出
    ///   power_tolerance_pct 时产生告警
    pub fn check_measurements(
        &self,
        station_id: &str,
        line: Line,
        measurements: &JsonValue,
    ) -> WorkflowResult<Vec<String>> {
        let set = self.registry.resolve(station_id, line)?;
        Ok(self.check_measurements_with_set(&set, measurements))
    }

    /// 对已解析的判定项集合执行测量阈值检查(与判定校验共享同一集合)
    pub fn check_measurements_with_set(
        &self,
        set: &CriteriaSet,
        measurements: &JsonValue,
    ) -> Vec<String> {
        let mut warnings = Vec::new();

        let measured = measurements.get("power_measured_w").and_then(|v| v.as_f64());
        let rated = measurements.get("power_rated_w").and_then(|v| v.as_f64());
        if let (Some(measured), Some(rated)) = (measured, rated) {
            if rated > 0.0 {
                let deviation_pct = ((measured - rated) / rated * 100.0).abs();
                if deviation_pct > set.thresholds.power_tolerance_pct {
                    warnings.push(format!(
                        "功率偏差 {:.2}% 超出允差 {:.2}%",
                        deviation_pct, set.thresholds.power_tolerance_pct
                    ));
                }
            }
        }

        warnings
    }
}
