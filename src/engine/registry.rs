// ==========================================
// 光伏组件产线质检工作流系统 - 判定项注册表
// ==========================================
// 依据: QC_Criteria_Specs_v0.2.md - 2.3 产线叠加合并
// 职责: (工位, 产线) → 判定项集合的解析与热加载
// 红线: 读侧永远拿到一致快照; 热加载不阻塞进行中的校验
// ==========================================

use crate::config::criteria_source::{CriteriaConfig, CriteriaSource, StationCriteriaConfig};
use crate::domain::criteria::{CriteriaSet, Criterion, Station};
use crate::domain::types::Line;
use crate::engine::error::{WorkflowError, WorkflowResult};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::info;

/// 当前支持的产线全集
const ALL_LINES: [Line; 2] = [Line::Line1, Line::Line2];

// ==========================================
// RegistrySnapshot - 只读合并快照
// ==========================================
// 说明: 叠加合并在快照构建时一次完成,resolve 仅做查表
#[derive(Debug)]
pub struct RegistrySnapshot {
    /// 构建本快照的原始配置(运行期重配置的合并基础)
    config: CriteriaConfig,
    /// (产线, 工位) → 合并后的判定项集合
    merged: HashMap<(Line, String), Arc<CriteriaSet>>,
}

impl RegistrySnapshot {
    /// 从配置构建快照
    ///
    /// # 合并规则
    /// - result_pass = base_pass ++ overlay.additional_pass
    /// - result_fail = base_fail ++ overlay.additional_fail
    /// - 叠加层追加的缺陷判定项强制 notes_required (约定)
    /// - line_specific 与目标产线不符的判定项被过滤
    pub fn build(config: CriteriaConfig) -> Self {
        let mut merged = HashMap::new();

        for station in &config.stations {
            for line in ALL_LINES {
                let mut set = CriteriaSet {
                    station_id: station.station_id.clone(),
                    line,
                    pass_criteria: filter_by_line(&station.pass_criteria, line),
                    fail_criteria: filter_by_line(&station.fail_criteria, line),
                    thresholds: station.thresholds.clone(),
                };

                for overlay in &config.overlays {
                    if overlay.line != line || overlay.station_id != station.station_id {
                        continue;
                    }
                    set.pass_criteria
                        .extend(filter_by_line(&overlay.additional_pass, line));
                    for criterion in filter_by_line(&overlay.additional_fail, line) {
                        // 叠加层缺陷项按约定强制备注必填
                        set.fail_criteria.push(Criterion {
                            notes_required: true,
                            ..criterion
                        });
                    }
                }

                merged.insert((line, station.station_id.clone()), Arc::new(set));
            }
        }

        Self { config, merged }
    }

    /// 解析 (工位, 产线) 的判定项集合
    pub fn resolve(&self, station_id: &str, line: Line) -> Option<Arc<CriteriaSet>> {
        self.merged
            .get(&(line, station_id.to_string()))
            .map(Arc::clone)
    }

    /// 快照内配置的工位数
    pub fn station_count(&self) -> usize {
        self.config.stations.len()
    }

    /// 工位清单(按配置顺序,供检验终端展示)
    pub fn stations(&self) -> Vec<Station> {
        self.config
            .stations
            .iter()
            .enumerate()
            .map(|(position, s)| Station {
                station_id: s.station_id.clone(),
                name: s.name.clone(),
                position,
            })
            .collect()
    }
}

fn filter_by_line(criteria: &[Criterion], line: Line) -> Vec<Criterion> {
    criteria
        .iter()
        .filter(|c| c.line_specific.map_or(true, |l| l == line))
        .cloned()
        .collect()
}

// ==========================================
// CriteriaRegistry - 判定项注册表
// ==========================================
// 并发模型: RwLock<Arc<Snapshot>>; 读侧 clone Arc 后脱离锁,
//           热加载整体替换 Arc,进行中的校验继续使用旧快照
pub struct CriteriaRegistry {
    snapshot: RwLock<Arc<RegistrySnapshot>>,
}

impl CriteriaRegistry {
    /// 从配置创建注册表
    pub fn new(config: CriteriaConfig) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(RegistrySnapshot::build(config))),
        }
    }

    /// 取当前只读快照(单次校验调用应只取一次)
    pub fn snapshot(&self) -> WorkflowResult<Arc<RegistrySnapshot>> {
        let guard = self
            .snapshot
            .read()
            .map_err(|e| WorkflowError::LockError(e.to_string()))?;
        Ok(Arc::clone(&guard))
    }

    /// 解析 (工位, 产线) 的判定项集合
    ///
    /// # 返回
    /// - Err(CriteriaNotConfigured): 该组合无配置
    pub fn resolve(&self, station_id: &str, line: Line) -> WorkflowResult<Arc<CriteriaSet>> {
        self.snapshot()?
            .resolve(station_id, line)
            .ok_or_else(|| WorkflowError::CriteriaNotConfigured {
                station_id: station_id.to_string(),
                line: line.to_string(),
            })
    }

    /// 整表热加载(替换快照)
    pub fn reload(&self, config: CriteriaConfig) -> WorkflowResult<()> {
        let next = Arc::new(RegistrySnapshot::build(config));
        let mut guard = self
            .snapshot
            .write()
            .map_err(|e| WorkflowError::LockError(e.to_string()))?;
        *guard = next;
        info!(station_count = guard.station_count(), "判定项配置热加载完成");
        Ok(())
    }

    /// 从配置源热加载
    pub async fn reload_from(&self, source: &dyn CriteriaSource) -> WorkflowResult<()> {
        let config = source
            .load()
            .await
            .map_err(|e| WorkflowError::Other(anyhow::anyhow!("判定项配置读取失败: {}", e)))?;
        self.reload(config)
    }

    /// 单工位重配置(替换该工位基础配置后重建快照,其余工位不变)
    pub fn merge_station(&self, station: StationCriteriaConfig) -> WorkflowResult<()> {
        let mut guard = self
            .snapshot
            .write()
            .map_err(|e| WorkflowError::LockError(e.to_string()))?;
        let mut config = guard.config.clone();
        let station_id = station.station_id.clone();
        config.upsert_station(station);
        *guard = Arc::new(RegistrySnapshot::build(config));
        info!(station_id = %station_id, "单工位判定项配置已更新");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::criteria_source::default_criteria_config;
    use crate::domain::criteria::QualityThresholds;

    #[test]
    fn test_resolve_base_set_line_agnostic() {
        let registry = CriteriaRegistry::new(default_criteria_config());
        let l1 = registry.resolve("STN_EL", Line::Line1).expect("解析失败");
        let l2 = registry.resolve("STN_EL", Line::Line2).expect("解析失败");
        // EL 工位无叠加层,两条产线判定项一致
        assert_eq!(l1.fail_criteria.len(), l2.fail_criteria.len());
    }

    #[test]
    fn test_overlay_appends_and_forces_notes_required() {
        let registry = CriteriaRegistry::new(default_criteria_config());

        let final_l1 = registry.resolve("STN_FINAL", Line::Line1).unwrap();
        let final_l2 = registry.resolve("STN_FINAL", Line::Line2).unwrap();
        // LINE_1 终检多一个 EL 复测项,且被强制备注必填
        assert_eq!(final_l1.fail_criteria.len(), final_l2.fail_criteria.len() + 1);
        let retest = final_l1.find_fail_criterion("EL retest failed").unwrap();
        assert!(retest.notes_required);
        assert!(final_l1
            .notes_required_ids()
            .contains(&"EL retest failed"));

        let visual_l2 = registry.resolve("STN_VISUAL", Line::Line2).unwrap();
        assert!(visual_l2
            .find_fail_criterion("Large panel handling damage")
            .is_some());
        let visual_l1 = registry.resolve("STN_VISUAL", Line::Line1).unwrap();
        assert!(visual_l1
            .find_fail_criterion("Large panel handling damage")
            .is_none());
    }

    #[test]
    fn test_station_listing_keeps_config_order() {
        let registry = CriteriaRegistry::new(default_criteria_config());
        let stations = registry.snapshot().unwrap().stations();
        assert_eq!(stations.len(), 4);
        assert_eq!(stations[0].station_id, "STN_EL");
        assert_eq!(stations[0].position, 0);
        assert_eq!(stations[3].station_id, "STN_FINAL");
    }

    #[test]
    fn test_unconfigured_station_errors() {
        let registry = CriteriaRegistry::new(default_criteria_config());
        let err = registry.resolve("STN_LAMINATION", Line::Line1).unwrap_err();
        assert_eq!(err.code(), "CRITERIA_NOT_CONFIGURED");
    }

    #[test]
    fn test_snapshot_survives_reload() {
        let registry = CriteriaRegistry::new(default_criteria_config());
        let old_snapshot = registry.snapshot().unwrap();

        // 热加载为空配置
        registry.reload(CriteriaConfig {
            stations: vec![],
            overlays: vec![],
        })
        .unwrap();

        // 旧快照(模拟进行中的校验)仍可解析
        assert!(old_snapshot.resolve("STN_EL", Line::Line1).is_some());
        // 新读取方看到空表
        assert!(registry.resolve("STN_EL", Line::Line1).is_err());
    }

    #[test]
    fn test_merge_station_keeps_others() {
        let registry = CriteriaRegistry::new(default_criteria_config());
        registry
            .merge_station(StationCriteriaConfig {
                station_id: "STN_EL".to_string(),
                name: "EL测试".to_string(),
                pass_criteria: vec![],
                fail_criteria: vec![Criterion::fail("EL test failed", "EL测试不合格")
                    .with_penalty(50.0)],
                thresholds: QualityThresholds::default(),
            })
            .unwrap();

        let el = registry.resolve("STN_EL", Line::Line1).unwrap();
        assert_eq!(el.fail_criteria.len(), 1);
        assert_eq!(el.fail_criteria[0].severity_penalty, 50.0);
        // 其他工位不受影响
        assert!(registry.resolve("STN_VISUAL", Line::Line1).is_ok());
    }
}
