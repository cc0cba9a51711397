// ==========================================
// 光伏组件产线质检工作流系统 - 工作流配置
// ==========================================
// 依据: Workflow_Engine_Specs_v0.2.md - 9. 配置项全集
// 存储: workflow_config.json (由服务层注入,引擎不读文件系统路径约定)
// ==========================================

use crate::domain::criteria::DEFAULT_SEVERITY_PENALTY;
use crate::domain::types::Line;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 工作流配置
///
/// 版型路由与工位序列为静态配置; 返修上限策略可按产线切换开关
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// 最大返修次数(达到后 REWORK 处置被拒,仅允许隔离)
    #[serde(default = "default_max_rework_attempts")]
    pub max_rework_attempts: u32,

    /// 是否强制执行返修上限(false 时复刻旧系统只计数不拦截的行为)
    #[serde(default = "default_enforce_rework_limit")]
    pub enforce_rework_limit: bool,

    /// 未配置扣分的判定项使用的默认严重度扣分
    #[serde(default = "default_severity_penalty")]
    pub default_severity_penalty: f64,

    /// 版型 → 产线路由表
    #[serde(default = "default_line_routing")]
    pub line_routing: HashMap<String, Line>,

    /// 产线 → 工位序列(有序)
    #[serde(default = "default_station_sequences")]
    pub station_sequences: HashMap<Line, Vec<String>>,
}

fn default_max_rework_attempts() -> u32 {
    3
}

fn default_enforce_rework_limit() -> bool {
    true
}

fn default_severity_penalty() -> f64 {
    DEFAULT_SEVERITY_PENALTY
}

fn default_line_routing() -> HashMap<String, Line> {
    let mut routing = HashMap::new();
    // 常规版型走 1 号产线
    for panel_type in ["36", "40", "60", "72"] {
        routing.insert(panel_type.to_string(), Line::Line1);
    }
    // 144 半片大版型走 2 号产线
    routing.insert("144".to_string(), Line::Line2);
    routing
}

fn default_station_sequences() -> HashMap<Line, Vec<String>> {
    let sequence = |ids: [&str; 4]| ids.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    let mut sequences = HashMap::new();
    sequences.insert(
        Line::Line1,
        sequence(["STN_EL", "STN_VISUAL", "STN_FLASH", "STN_FINAL"]),
    );
    sequences.insert(
        Line::Line2,
        sequence(["STN_EL", "STN_VISUAL", "STN_FLASH", "STN_FINAL"]),
    );
    sequences
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_rework_attempts: default_max_rework_attempts(),
            enforce_rework_limit: default_enforce_rework_limit(),
            default_severity_penalty: default_severity_penalty(),
            line_routing: default_line_routing(),
            station_sequences: default_station_sequences(),
        }
    }
}

impl WorkflowConfig {
    /// 按版型解析产线归属
    pub fn resolve_line(&self, panel_type: &str) -> Option<Line> {
        self.line_routing.get(panel_type).copied()
    }

    /// 取产线的工位序列
    pub fn station_sequence(&self, line: Line) -> Option<&Vec<String>> {
        self.station_sequences.get(&line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_line_routing() {
        let config = WorkflowConfig::default();
        assert_eq!(config.resolve_line("60"), Some(Line::Line1));
        assert_eq!(config.resolve_line("144"), Some(Line::Line2));
        assert_eq!(config.resolve_line("96"), None);
    }

    #[test]
    fn test_default_sequences_have_four_stations() {
        let config = WorkflowConfig::default();
        assert_eq!(config.station_sequence(Line::Line1).unwrap().len(), 4);
        assert_eq!(config.station_sequence(Line::Line2).unwrap().len(), 4);
        assert_eq!(config.station_sequence(Line::Line1).unwrap()[0], "STN_EL");
    }

    #[test]
    fn test_deserialization_fills_defaults() {
        let config: WorkflowConfig = serde_json::from_str("{}").expect("解析空配置失败");
        assert_eq!(config.max_rework_attempts, 3);
        assert!(config.enforce_rework_limit);
        assert_eq!(config.default_severity_penalty, 20.0);
    }
}
