// ==========================================
// 光伏组件产线质检工作流系统 - 判定项配置源
// ==========================================
// 依据: QC_Criteria_Specs_v0.2.md - 3. 配置与热加载
// 职责: 定义判定项配置的文档结构与读取接口(不含注册表逻辑)
// 红线: 配置源只读,热加载由注册表完成快照替换
// ==========================================

use crate::domain::criteria::{Criterion, LineOverlay, QualityThresholds};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::path::PathBuf;

// ==========================================
// StationCriteriaConfig - 单工位基础判定项配置
// ==========================================
// 说明: 基础配置与产线无关,产线差异通过 overlays 叠加
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationCriteriaConfig {
    pub station_id: String, // 工位标识
    pub name: String,       // 工位名称

    #[serde(default)]
    pub pass_criteria: Vec<Criterion>, // 基础合格判定项

    #[serde(default)]
    pub fail_criteria: Vec<Criterion>, // 基础缺陷判定项

    #[serde(default)]
    pub thresholds: QualityThresholds, // 数值阈值组
}

// ==========================================
// CriteriaConfig - 判定项配置文档
// ==========================================
// 对齐: criteria_config.json 根节点
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriteriaConfig {
    #[serde(default)]
    pub stations: Vec<StationCriteriaConfig>, // 工位基础配置

    #[serde(default)]
    pub overlays: Vec<LineOverlay>, // 产线叠加层
}

impl CriteriaConfig {
    /// 按工位 id 查找基础配置
    pub fn find_station(&self, station_id: &str) -> Option<&StationCriteriaConfig> {
        self.stations.iter().find(|s| s.station_id == station_id)
    }

    /// 替换或追加一个工位的基础配置(运行期重配置入口)
    pub fn upsert_station(&mut self, station: StationCriteriaConfig) {
        match self
            .stations
            .iter_mut()
            .find(|s| s.station_id == station.station_id)
        {
            Some(existing) => *existing = station,
            None => self.stations.push(station),
        }
    }
}

// ==========================================
// CriteriaSource Trait - 配置读取接口
// ==========================================
// 用途: 注册表热加载的数据来源
// 实现者: FileCriteriaSource(JSON 文件)、测试中的内存实现
#[async_trait]
pub trait CriteriaSource: Send + Sync {
    /// 读取完整判定项配置
    async fn load(&self) -> Result<CriteriaConfig, Box<dyn Error + Send + Sync>>;
}

// ==========================================
// FileCriteriaSource - JSON 文件配置源
// ==========================================
pub struct FileCriteriaSource {
    path: PathBuf,
}

impl FileCriteriaSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CriteriaSource for FileCriteriaSource {
    async fn load(&self) -> Result<CriteriaConfig, Box<dyn Error + Send + Sync>> {
        let raw = tokio::fs::read_to_string(&self.path).await?;
        let config: CriteriaConfig = serde_json::from_str(&raw)?;
        Ok(config)
    }
}

// ==========================================
// 内置默认配置
// ==========================================

/// 产线默认判定项配置
///
/// 与现场检验终端的判定项清单对齐; 叠加层:
/// - LINE_1 终检工位追加 EL 复测项
/// - LINE_2 外观工位追加大版型搬运检查项
pub fn default_criteria_config() -> CriteriaConfig {
    use crate::domain::types::Line;

    let stations = vec![
        StationCriteriaConfig {
            station_id: "STN_EL".to_string(),
            name: "EL测试".to_string(),
            pass_criteria: vec![
                Criterion::pass("EL image clean", "EL图像无异常").with_required(),
                Criterion::pass("No microcracks", "无隐裂"),
            ],
            fail_criteria: vec![
                Criterion::fail("EL test failed", "EL测试不合格")
                    .with_penalty(40.0)
                    .with_notes_required()
                    .with_required(),
                Criterion::fail("Microcrack detected", "检出隐裂")
                    .with_penalty(25.0)
                    .with_notes_required(),
                Criterion::fail("Dark cell area", "暗片"),
                Criterion::fail("Soldering defect", "虚焊"),
            ],
            thresholds: QualityThresholds::default(),
        },
        StationCriteriaConfig {
            station_id: "STN_VISUAL".to_string(),
            name: "外观检验".to_string(),
            pass_criteria: vec![
                Criterion::pass("No visual defects", "外观无缺陷").with_required(),
                Criterion::pass("Label correct", "标签正确"),
            ],
            fail_criteria: vec![
                Criterion::fail("Cell crack", "电池片裂纹")
                    .with_penalty(30.0)
                    .with_notes_required()
                    .with_required(),
                Criterion::fail("Glass scratch", "玻璃划伤").with_penalty(15.0),
                Criterion::fail("Frame damage", "边框损伤")
                    .with_penalty(25.0)
                    .with_notes_required(),
                Criterion::fail("Junction box defect", "接线盒缺陷").with_penalty(30.0),
            ],
            thresholds: QualityThresholds::default(),
        },
        StationCriteriaConfig {
            station_id: "STN_FLASH".to_string(),
            name: "功率测试".to_string(),
            pass_criteria: vec![
                Criterion::pass("Power within tolerance", "功率在允差内").with_required(),
                Criterion::pass("IV curve normal", "IV曲线正常"),
            ],
            fail_criteria: vec![
                Criterion::fail("Power below rating", "功率低于标称")
                    .with_penalty(35.0)
                    .with_notes_required()
                    .with_required(),
                Criterion::fail("Low insulation resistance", "绝缘电阻偏低")
                    .with_penalty(40.0)
                    .with_notes_required(),
                Criterion::fail("Fill factor out of range", "填充因子超限"),
            ],
            thresholds: QualityThresholds {
                min_quality_score: 75.0,
                power_tolerance_pct: 3.0,
                min_pass_rate: 0.98,
            },
        },
        StationCriteriaConfig {
            station_id: "STN_FINAL".to_string(),
            name: "终检".to_string(),
            pass_criteria: vec![
                Criterion::pass("Final visual ok", "终检外观合格").with_required(),
                Criterion::pass("Documentation complete", "随工单据齐全"),
            ],
            fail_criteria: vec![
                Criterion::fail("Packaging damage", "包装损伤").with_penalty(15.0),
                Criterion::fail("Connector defect", "连接器缺陷")
                    .with_penalty(25.0)
                    .with_notes_required(),
                Criterion::fail("Missing barcode", "条码缺失").with_penalty(10.0),
            ],
            thresholds: QualityThresholds::default(),
        },
    ];

    let overlays = vec![
        // LINE_1: 终检工位追加 EL 复测
        LineOverlay {
            line: Line::Line1,
            station_id: "STN_FINAL".to_string(),
            additional_pass: vec![],
            additional_fail: vec![
                Criterion::fail("EL retest failed", "EL复测不合格")
                    .with_penalty(40.0)
                    .with_line(Line::Line1),
            ],
        },
        // LINE_2: 外观工位追加大版型搬运检查
        LineOverlay {
            line: Line::Line2,
            station_id: "STN_VISUAL".to_string(),
            additional_pass: vec![
                Criterion::pass("Reinforced frame check passed", "加强边框检查合格")
                    .with_line(Line::Line2),
            ],
            additional_fail: vec![
                Criterion::fail("Large panel handling damage", "大版型搬运损伤")
                    .with_penalty(30.0)
                    .with_line(Line::Line2),
            ],
        },
    ];

    CriteriaConfig { stations, overlays }
}
