// ==========================================
// 工作流端到端测试
// ==========================================
// 依据: Workflow_Engine_Specs_v0.2.md - 8. 验收场景
// 测试范围:
// 1. 初始化路由 + 全程 PASS 直至归档
// 2. FAIL 校验门槛(判定项/备注)与失败路径零副作用
// 3. 返修环路 / 返修超限策略
// 4. 隔离处置与队列清理
// ==========================================

use serde_json::json;
use solar_qc_workflow::config::default_criteria_config;
use solar_qc_workflow::domain::types::{Line, NoteType, PanelState, QuarantineSeverity};
use solar_qc_workflow::engine::{
    CriteriaRegistry, PanelLifecycle, RequiredAction, StationDecision, WorkflowEvent,
    WorkflowOrchestrator,
};
use solar_qc_workflow::WorkflowConfig;
use std::sync::Arc;

// ==========================================
// 测试辅助函数
// ==========================================

/// 默认配置的编排器
fn orchestrator() -> WorkflowOrchestrator {
    let registry = Arc::new(CriteriaRegistry::new(default_criteria_config()));
    WorkflowOrchestrator::new(registry, WorkflowConfig::default())
}

/// 返修上限为 1 的编排器(缩短超限场景)
fn orchestrator_with_rework_cap(max: u32) -> WorkflowOrchestrator {
    let registry = Arc::new(CriteriaRegistry::new(default_criteria_config()));
    let config = WorkflowConfig {
        max_rework_attempts: max,
        ..WorkflowConfig::default()
    };
    WorkflowOrchestrator::new(registry, config)
}

fn pass_decision(station_id: &str) -> StationDecision {
    StationDecision {
        station_id: station_id.to_string(),
        decision: "PASS".to_string(),
        selected_criteria: vec![],
        notes: None,
        measurements: None,
        rework_station: None,
        severity: None,
        operator: Some("op-007".to_string()),
    }
}

fn fail_decision(station_id: &str, criteria: &[&str], notes: Option<&str>) -> StationDecision {
    StationDecision {
        station_id: station_id.to_string(),
        decision: "FAIL".to_string(),
        selected_criteria: criteria.iter().map(|s| s.to_string()).collect(),
        notes: notes.map(|s| s.to_string()),
        measurements: None,
        rework_station: None,
        severity: None,
        operator: Some("op-007".to_string()),
    }
}

// ==========================================
// 场景 1: 初始化与路由
// ==========================================

#[test]
fn test_initialize_routes_by_panel_type() {
    let orch = orchestrator();

    let result = orch.initialize_panel("P1", "BC-P1", "60").expect("初始化失败");
    assert_eq!(result.workflow.line, Line::Line1);
    assert_eq!(result.workflow.current_state, PanelState::Scanned);
    assert_eq!(result.workflow.current_station_index, -1);
    assert_eq!(result.workflow.station_sequence.len(), 4);
    assert_eq!(result.events.len(), 1);

    let big = orch.initialize_panel("P2", "BC-P2", "144").unwrap();
    assert_eq!(big.workflow.line, Line::Line2);

    // 无路由配置的版型
    let err = orch.initialize_panel("P3", "BC-P3", "96").unwrap_err();
    assert_eq!(err.code(), "UNKNOWN_PANEL_TYPE");

    // 重复初始化
    let err = orch.initialize_panel("P1", "BC-P1", "60").unwrap_err();
    assert_eq!(err.code(), "DUPLICATE_WORKFLOW");
}

// ==========================================
// 场景 2: 全程 PASS 直至归档
// ==========================================

#[test]
fn test_full_pass_traversal_completes_and_archives() {
    let orch = orchestrator();
    orch.initialize_panel("P1", "BC-P1", "60").unwrap();

    let stations = ["STN_EL", "STN_VISUAL", "STN_FLASH", "STN_FINAL"];
    for (i, station) in stations.iter().enumerate() {
        let started = orch.start_station("P1", station, Some("op-007")).unwrap();
        assert_eq!(started.workflow.current_state, PanelState::InProgress);
        assert_eq!(started.workflow.current_station_index, i as i32);
        assert_eq!(orch.get_station_queue(station).unwrap(), vec!["P1"]);

        let result = orch.submit_station_decision("P1", pass_decision(station)).unwrap();
        assert_eq!(result.outcome.quality_score, 100);

        if i + 1 < stations.len() {
            // 通过后推进到下一工位并入队
            assert_eq!(result.workflow.current_state, PanelState::Passed);
            assert_eq!(
                result.next_actions,
                vec![RequiredAction::ProceedToNextStation]
            );
            assert!(orch.get_station_queue(station).unwrap().is_empty());
            assert_eq!(
                orch.get_station_queue(stations[i + 1]).unwrap(),
                vec!["P1"]
            );
        } else {
            // 末站通过: 自动判定完成
            assert_eq!(result.workflow.current_state, PanelState::Completed);
            assert_eq!(result.next_actions, vec![RequiredAction::CompleteWorkflow]);
        }
    }

    // 完成后归档,活跃区不再可查,但历史仍可追溯
    assert_eq!(orch.get_lifecycle("P1").unwrap(), PanelLifecycle::Archived);
    assert_eq!(orch.get_panel_state("P1").unwrap_err().code(), "PANEL_ARCHIVED");
    assert_eq!(orch.active_panel_count().unwrap(), 0);

    let history = orch.get_transition_history("P1").unwrap();
    // 4 站 × (入站 + 判定) + 末站自动完成 = 9 条
    assert_eq!(history.len(), 9);
    assert_eq!(history.last().unwrap().to_state, PanelState::Completed);

    // 归档后所有队列无残留
    for station in stations {
        assert!(orch.get_station_queue(station).unwrap().is_empty());
    }
}

#[test]
fn test_final_station_events_keep_causal_order() {
    let orch = orchestrator();
    orch.initialize_panel("P1", "BC-P1", "60").unwrap();

    let mut last_events = Vec::new();
    for station in ["STN_EL", "STN_VISUAL", "STN_FLASH", "STN_FINAL"] {
        orch.start_station("P1", station, None).unwrap();
        let result = orch.submit_station_decision("P1", pass_decision(station)).unwrap();
        last_events = result.events;
    }

    // 末站提交: PASSED 转换 → COMPLETED 转换 → 完成事件
    let types: Vec<&str> = last_events.iter().map(|e| e.event_type()).collect();
    assert_eq!(
        types,
        vec!["STATE_TRANSITION", "STATE_TRANSITION", "PANEL_COMPLETED"]
    );
    match &last_events[1] {
        WorkflowEvent::StateTransition {
            from_state,
            to_state,
            ..
        } => {
            assert_eq!(*from_state, PanelState::Passed);
            assert_eq!(*to_state, PanelState::Completed);
        }
        other => panic!("期望 StateTransition, 实际 {:?}", other),
    }
}

#[test]
fn test_completed_snapshot_carries_quality_data() {
    let orch = orchestrator();
    orch.initialize_panel("P1", "BC-P1", "60").unwrap();

    for station in ["STN_EL", "STN_VISUAL", "STN_FLASH", "STN_FINAL"] {
        orch.start_station("P1", station, None).unwrap();
        let mut decision = pass_decision(station);
        decision.measurements = Some(json!({ "power_measured_w": 399.0, "power_rated_w": 400.0 }));
        orch.submit_station_decision("P1", decision).unwrap();
    }

    // 归档快照含每站负载与收尾数据
    let history = orch.get_transition_history("P1").unwrap();
    assert!(history.iter().any(|e| e.to_state == PanelState::Completed));
}

// ==========================================
// 场景 3: FAIL 校验门槛与零副作用
// ==========================================

#[test]
fn test_fail_without_criteria_leaves_record_untouched() {
    let orch = orchestrator();
    orch.initialize_panel("P1", "BC-P1", "60").unwrap();
    orch.start_station("P1", "STN_EL", None).unwrap();

    let err = orch
        .submit_station_decision("P1", fail_decision("STN_EL", &[], None))
        .unwrap_err();
    assert_eq!(err.code(), "MISSING_CRITERIA");

    // 失败路径零副作用
    let record = orch.get_panel_state("P1").unwrap();
    assert_eq!(record.current_state, PanelState::InProgress);
    assert_eq!(record.rework_count, 0);
    assert!(record.notes.is_empty());
}

#[test]
fn test_fail_notes_required_then_accepted() {
    let orch = orchestrator();
    orch.initialize_panel("P1", "BC-P1", "60").unwrap();
    orch.start_station("P1", "STN_EL", None).unwrap();

    // 备注必填项缺备注 → 拒绝
    let err = orch
        .submit_station_decision("P1", fail_decision("STN_EL", &["EL test failed"], None))
        .unwrap_err();
    assert_eq!(err.code(), "NOTES_REQUIRED");

    // 补备注 → 通过,扣 40 分,累计不合格次数 +1
    let result = orch
        .submit_station_decision(
            "P1",
            fail_decision("STN_EL", &["EL test failed"], Some("EL failure at cell 4")),
        )
        .unwrap();
    assert_eq!(result.workflow.current_state, PanelState::Failed);
    assert_eq!(result.workflow.rework_count, 1);
    assert_eq!(result.outcome.quality_score, 60);
    assert_eq!(
        result.next_actions,
        vec![RequiredAction::RouteToRework, RequiredAction::RouteToQuarantine]
    );
    assert_eq!(result.workflow.notes.len(), 1);
    assert_eq!(result.workflow.notes[0].note_type, NoteType::Fail);
}

#[test]
fn test_submit_at_wrong_station_rejected() {
    let orch = orchestrator();
    orch.initialize_panel("P1", "BC-P1", "60").unwrap();
    orch.start_station("P1", "STN_EL", None).unwrap();

    let err = orch
        .submit_station_decision("P1", pass_decision("STN_FLASH"))
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_STATION");
}

#[test]
fn test_invalid_decision_and_invalid_transition() {
    let orch = orchestrator();
    orch.initialize_panel("P1", "BC-P1", "60").unwrap();

    let mut bogus = pass_decision("STN_EL");
    bogus.decision = "MAYBE".to_string();
    let err = orch.submit_station_decision("P1", bogus).unwrap_err();
    assert_eq!(err.code(), "INVALID_DECISION");

    // SCANNED 状态直接提交 PASS: 状态机拒绝,记录不变
    let err = orch
        .submit_station_decision("P1", pass_decision("STN_EL"))
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_TRANSITION");
    let record = orch.get_panel_state("P1").unwrap();
    assert_eq!(record.current_state, PanelState::Scanned);
    assert!(record.history.is_empty());
}

// ==========================================
// 场景 4: 返修环路
// ==========================================

#[test]
fn test_rework_loop_back_to_earlier_station() {
    let orch = orchestrator();
    orch.initialize_panel("P1", "BC-P1", "60").unwrap();

    // 前两站通过
    for station in ["STN_EL", "STN_VISUAL"] {
        orch.start_station("P1", station, None).unwrap();
        orch.submit_station_decision("P1", pass_decision(station)).unwrap();
    }

    // 第三站不合格
    orch.start_station("P1", "STN_FLASH", None).unwrap();
    orch.submit_station_decision(
        "P1",
        fail_decision("STN_FLASH", &["Power below rating"], Some("365W vs 400W rated")),
    )
    .unwrap();

    // 主管处置: 返修回 EL 工位
    let rework = StationDecision {
        station_id: "STN_FLASH".to_string(),
        decision: "REWORK".to_string(),
        selected_criteria: vec![],
        notes: Some("resolder string 3 and retest".to_string()),
        measurements: None,
        rework_station: Some("STN_EL".to_string()),
        severity: None,
        operator: Some("supervisor-01".to_string()),
    };
    let result = orch.submit_station_decision("P1", rework).unwrap();
    assert_eq!(result.workflow.current_state, PanelState::ReworkNeeded);
    assert_eq!(result.workflow.current_station_index, 0);
    assert_eq!(orch.get_station_queue("STN_EL").unwrap(), vec!["P1"]);
    assert!(orch.get_station_queue("STN_FLASH").unwrap().is_empty());

    // 返修后重新走完全程
    for (i, station) in ["STN_EL", "STN_VISUAL", "STN_FLASH", "STN_FINAL"].iter().enumerate() {
        orch.start_station("P1", station, None).unwrap();
        let result = orch.submit_station_decision("P1", pass_decision(station)).unwrap();
        if i == 3 {
            assert_eq!(result.workflow.current_state, PanelState::Completed);
            assert_eq!(result.workflow.rework_count, 1);
        }
    }
    assert_eq!(orch.get_lifecycle("P1").unwrap(), PanelLifecycle::Archived);
}

#[test]
fn test_rework_to_unknown_station_rejected() {
    let orch = orchestrator();
    orch.initialize_panel("P1", "BC-P1", "60").unwrap();
    orch.start_station("P1", "STN_EL", None).unwrap();
    orch.submit_station_decision(
        "P1",
        fail_decision("STN_EL", &["Dark cell area"], Some("edge darkening")),
    )
    .unwrap();

    let rework = StationDecision {
        station_id: "STN_EL".to_string(),
        decision: "REWORK".to_string(),
        selected_criteria: vec![],
        notes: None,
        measurements: None,
        rework_station: Some("STN_LAMINATION".to_string()),
        severity: None,
        operator: None,
    };
    let err = orch.submit_station_decision("P1", rework).unwrap_err();
    assert_eq!(err.code(), "INVALID_STATION");
    // 拒绝后状态保持 FAILED
    assert_eq!(
        orch.get_panel_state("P1").unwrap().current_state,
        PanelState::Failed
    );
}

// ==========================================
// 场景 5: 返修超限策略
// ==========================================

#[test]
fn test_rework_limit_forces_quarantine_only() {
    let orch = orchestrator_with_rework_cap(1);
    orch.initialize_panel("P1", "BC-P1", "60").unwrap();
    orch.start_station("P1", "STN_EL", None).unwrap();

    // 第一次不合格: rework_count=1,已达上限,路由仅剩隔离
    let result = orch
        .submit_station_decision(
            "P1",
            fail_decision("STN_EL", &["Soldering defect"], Some("cold joint")),
        )
        .unwrap();
    assert_eq!(result.workflow.rework_count, 1);
    assert_eq!(result.next_actions, vec![RequiredAction::QuarantineOnly]);

    // 此时 REWORK 处置被策略拒绝
    let rework = StationDecision {
        station_id: "STN_EL".to_string(),
        decision: "REWORK".to_string(),
        selected_criteria: vec![],
        notes: None,
        measurements: None,
        rework_station: Some("STN_EL".to_string()),
        severity: None,
        operator: None,
    };
    let err = orch.submit_station_decision("P1", rework).unwrap_err();
    assert_eq!(err.code(), "REWORK_LIMIT_EXCEEDED");
    assert_eq!(
        orch.get_panel_state("P1").unwrap().current_state,
        PanelState::Failed
    );
}

// ==========================================
// 场景 6: 隔离处置
// ==========================================

#[test]
fn test_quarantine_clears_queues_and_notes_severity() {
    let orch = orchestrator();
    orch.initialize_panel("P1", "BC-P1", "60").unwrap();
    orch.start_station("P1", "STN_EL", None).unwrap();
    orch.submit_station_decision(
        "P1",
        fail_decision("STN_EL", &["EL test failed"], Some("EL failure at cell 4")),
    )
    .unwrap();

    let quarantine = StationDecision {
        station_id: "STN_EL".to_string(),
        decision: "QUARANTINE".to_string(),
        selected_criteria: vec![],
        notes: Some("hold for engineering review".to_string()),
        measurements: None,
        rework_station: None,
        severity: Some(QuarantineSeverity::Critical),
        operator: Some("supervisor-01".to_string()),
    };
    let result = orch.submit_station_decision("P1", quarantine).unwrap();
    assert_eq!(result.workflow.current_state, PanelState::Quarantine);
    assert_eq!(result.outcome.quality_score, 0);
    assert!(orch.get_station_queue("STN_EL").unwrap().is_empty());

    let note = result
        .workflow
        .notes
        .iter()
        .find(|n| n.note_type == NoteType::Quarantine)
        .expect("缺少隔离备注");
    assert_eq!(note.severity, Some(QuarantineSeverity::Critical));

    // 隔离不是终态: 可返修回产线
    let rework = StationDecision {
        station_id: "STN_EL".to_string(),
        decision: "REWORK".to_string(),
        selected_criteria: vec![],
        notes: Some("cleared by engineering".to_string()),
        measurements: None,
        rework_station: Some("STN_EL".to_string()),
        severity: None,
        operator: Some("supervisor-01".to_string()),
    };
    let result = orch.submit_station_decision("P1", rework).unwrap();
    assert_eq!(result.workflow.current_state, PanelState::ReworkNeeded);
}

// ==========================================
// 场景 7: 产线叠加判定项走全链路
// ==========================================

#[test]
fn test_line2_overlay_criterion_end_to_end() {
    let orch = orchestrator();
    orch.initialize_panel("P2", "BC-P2", "144").unwrap();
    orch.start_station("P2", "STN_EL", None).unwrap();
    orch.submit_station_decision("P2", pass_decision("STN_EL")).unwrap();

    orch.start_station("P2", "STN_VISUAL", None).unwrap();
    // 叠加缺陷项被强制备注必填
    let err = orch
        .submit_station_decision(
            "P2",
            fail_decision("STN_VISUAL", &["Large panel handling damage"], None),
        )
        .unwrap_err();
    assert_eq!(err.code(), "NOTES_REQUIRED");

    let result = orch
        .submit_station_decision(
            "P2",
            fail_decision(
                "STN_VISUAL",
                &["Large panel handling damage"],
                Some("corner impact during transfer"),
            ),
        )
        .unwrap();
    assert_eq!(result.outcome.quality_score, 70);
}

// ==========================================
// 场景 8: 队列次序
// ==========================================

#[test]
fn test_station_queue_preserves_arrival_order() {
    let orch = orchestrator();
    for id in ["P1", "P2", "P3"] {
        orch.initialize_panel(id, &format!("BC-{}", id), "60").unwrap();
        orch.start_station(id, "STN_EL", None).unwrap();
    }
    assert_eq!(
        orch.get_station_queue("STN_EL").unwrap(),
        vec!["P1", "P2", "P3"]
    );

    // P2 通过后出队,次序保持
    orch.submit_station_decision("P2", pass_decision("STN_EL")).unwrap();
    assert_eq!(orch.get_station_queue("STN_EL").unwrap(), vec!["P1", "P3"]);
    assert_eq!(orch.get_station_queue("STN_VISUAL").unwrap(), vec!["P2"]);
}

#[test]
fn test_unknown_panel_queries() {
    let orch = orchestrator();
    assert_eq!(orch.get_panel_state("P404").unwrap_err().code(), "PANEL_NOT_FOUND");
    assert_eq!(orch.get_lifecycle("P404").unwrap(), PanelLifecycle::Unknown);
    assert_eq!(
        orch.get_transition_history("P404").unwrap_err().code(),
        "PANEL_NOT_FOUND"
    );
}
