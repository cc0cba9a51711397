// ==========================================
// 光伏组件产线质检工作流系统 - 组件记录仓
// ==========================================
// 依据: Workflow_Engine_Specs_v0.2.md - 5. 并发与资源模型
// 职责: 活跃/归档记录表、逐组件锁、工位队列
// 并发模型: 外层 RwLock 仅覆盖表级查找,记录变更走逐组件 Mutex,
//           不同 panel_id 之间互不争用
// ==========================================

use crate::domain::panel::{ArchivedPanel, PanelWorkflowRecord};
use crate::engine::error::{WorkflowError, WorkflowResult};
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};

// ==========================================
// PanelLifecycle - 记录生命周期
// ==========================================
// 说明: 区分"从未存在"与"已完成归档"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelLifecycle {
    Active,   // 在产线上活跃推进
    Archived, // 已完成并归档
    Unknown,  // 从未初始化
}

// ==========================================
// PanelStore - 组件记录仓
// ==========================================
pub struct PanelStore {
    active: RwLock<HashMap<String, Arc<Mutex<PanelWorkflowRecord>>>>,
    archived: RwLock<HashMap<String, ArchivedPanel>>,
    queues: RwLock<HashMap<String, VecDeque<String>>>,
}

impl PanelStore {
    pub fn new() -> Self {
        Self {
            active: RwLock::new(HashMap::new()),
            archived: RwLock::new(HashMap::new()),
            queues: RwLock::new(HashMap::new()),
        }
    }

    // ===== 记录生命周期 =====

    /// 登记新记录
    ///
    /// # 返回
    /// - Err(DuplicateWorkflow): panel_id 已在活跃区或归档区
    ///
    /// 锁序: 先 active 后 archived(与 archive 一致),两表检查在
    /// 同一临界区内完成,归档进行中的 panel_id 不会被重新登记
    pub fn insert_new(&self, record: PanelWorkflowRecord) -> WorkflowResult<()> {
        let panel_id = record.panel_id.clone();

        let mut active = self
            .active
            .write()
            .map_err(|e| WorkflowError::LockError(e.to_string()))?;
        if active.contains_key(&panel_id) {
            return Err(WorkflowError::DuplicateWorkflow { panel_id });
        }

        let archived = self
            .archived
            .read()
            .map_err(|e| WorkflowError::LockError(e.to_string()))?;
        if archived.contains_key(&panel_id) {
            return Err(WorkflowError::DuplicateWorkflow { panel_id });
        }
        drop(archived);

        active.insert(panel_id, Arc::new(Mutex::new(record)));
        Ok(())
    }

    /// 取活跃记录的逐组件锁句柄
    ///
    /// # 返回
    /// - Err(PanelArchived): 已完成归档
    /// - Err(PanelNotFound): 从未初始化
    pub fn get(&self, panel_id: &str) -> WorkflowResult<Arc<Mutex<PanelWorkflowRecord>>> {
        let active = self
            .active
            .read()
            .map_err(|e| WorkflowError::LockError(e.to_string()))?;
        if let Some(entry) = active.get(panel_id) {
            return Ok(Arc::clone(entry));
        }
        drop(active);

        let archived = self
            .archived
            .read()
            .map_err(|e| WorkflowError::LockError(e.to_string()))?;
        if archived.contains_key(panel_id) {
            return Err(WorkflowError::PanelArchived {
                panel_id: panel_id.to_string(),
            });
        }
        Err(WorkflowError::PanelNotFound {
            panel_id: panel_id.to_string(),
        })
    }

    /// 将完成的记录从活跃区移入归档区
    ///
    /// 前置: 调用方已不再持有该记录的 Mutex 守卫
    ///
    /// 锁序: 先 active 后 archived,移动在同一临界区内完成,
    /// 任意时刻 panel_id 至少出现在一张表中(不存在两表皆空的窗口)
    pub fn archive(&self, panel_id: &str, snapshot: PanelWorkflowRecord) -> WorkflowResult<()> {
        let mut active = self
            .active
            .write()
            .map_err(|e| WorkflowError::LockError(e.to_string()))?;
        let mut archived = self
            .archived
            .write()
            .map_err(|e| WorkflowError::LockError(e.to_string()))?;
        archived.insert(
            panel_id.to_string(),
            ArchivedPanel {
                panel_id: panel_id.to_string(),
                archived_at: Utc::now(),
                snapshot,
            },
        );
        active.remove(panel_id);
        Ok(())
    }

    /// 查询记录生命周期
    pub fn lifecycle(&self, panel_id: &str) -> WorkflowResult<PanelLifecycle> {
        let active = self
            .active
            .read()
            .map_err(|e| WorkflowError::LockError(e.to_string()))?;
        if active.contains_key(panel_id) {
            return Ok(PanelLifecycle::Active);
        }
        drop(active);

        let archived = self
            .archived
            .read()
            .map_err(|e| WorkflowError::LockError(e.to_string()))?;
        if archived.contains_key(panel_id) {
            return Ok(PanelLifecycle::Archived);
        }
        Ok(PanelLifecycle::Unknown)
    }

    /// 读取归档快照
    pub fn get_archived(&self, panel_id: &str) -> WorkflowResult<Option<ArchivedPanel>> {
        let archived = self
            .archived
            .read()
            .map_err(|e| WorkflowError::LockError(e.to_string()))?;
        Ok(archived.get(panel_id).cloned())
    }

    /// 活跃记录数
    pub fn active_count(&self) -> WorkflowResult<usize> {
        let active = self
            .active
            .read()
            .map_err(|e| WorkflowError::LockError(e.to_string()))?;
        Ok(active.len())
    }

    // ===== 工位队列 =====

    /// 组件入队(幂等: 已在队列中则不重复插入)
    pub fn enqueue(&self, station_id: &str, panel_id: &str) -> WorkflowResult<()> {
        let mut queues = self
            .queues
            .write()
            .map_err(|e| WorkflowError::LockError(e.to_string()))?;
        let queue = queues.entry(station_id.to_string()).or_default();
        if !queue.iter().any(|id| id == panel_id) {
            queue.push_back(panel_id.to_string());
        }
        Ok(())
    }

    /// 组件出队(不在队列中时为 no-op,不报错)
    pub fn remove_from_queue(&self, station_id: &str, panel_id: &str) -> WorkflowResult<()> {
        let mut queues = self
            .queues
            .write()
            .map_err(|e| WorkflowError::LockError(e.to_string()))?;
        if let Some(queue) = queues.get_mut(station_id) {
            queue.retain(|id| id != panel_id);
        }
        Ok(())
    }

    /// 从所有队列移除该组件(进入隔离/完成时调用)
    pub fn remove_from_all_queues(&self, panel_id: &str) -> WorkflowResult<()> {
        let mut queues = self
            .queues
            .write()
            .map_err(|e| WorkflowError::LockError(e.to_string()))?;
        for queue in queues.values_mut() {
            queue.retain(|id| id != panel_id);
        }
        Ok(())
    }

    /// 读取工位队列快照
    pub fn station_queue(&self, station_id: &str) -> WorkflowResult<Vec<String>> {
        let queues = self
            .queues
            .read()
            .map_err(|e| WorkflowError::LockError(e.to_string()))?;
        Ok(queues
            .get(station_id)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default())
    }

    /// O(1) 读取队首组件
    pub fn next_in_queue(&self, station_id: &str) -> WorkflowResult<Option<String>> {
        let queues = self
            .queues
            .read()
            .map_err(|e| WorkflowError::LockError(e.to_string()))?;
        Ok(queues.get(station_id).and_then(|q| q.front().cloned()))
    }
}

impl Default for PanelStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::Line;

    fn record(panel_id: &str) -> PanelWorkflowRecord {
        PanelWorkflowRecord::new(
            panel_id,
            &format!("BC-{}", panel_id),
            "60",
            Line::Line1,
            vec!["STN_EL".to_string(), "STN_VISUAL".to_string()],
        )
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let store = PanelStore::new();
        store.insert_new(record("P1")).expect("首次登记失败");
        let err = store.insert_new(record("P1")).unwrap_err();
        assert_eq!(err.code(), "DUPLICATE_WORKFLOW");
    }

    #[test]
    fn test_lifecycle_distinguishes_archived_from_unknown() {
        let store = PanelStore::new();
        store.insert_new(record("P1")).unwrap();
        assert_eq!(store.lifecycle("P1").unwrap(), PanelLifecycle::Active);
        assert_eq!(store.lifecycle("P9").unwrap(), PanelLifecycle::Unknown);

        let snapshot = record("P1");
        store.archive("P1", snapshot).unwrap();
        assert_eq!(store.lifecycle("P1").unwrap(), PanelLifecycle::Archived);
        assert_eq!(store.get("P1").unwrap_err().code(), "PANEL_ARCHIVED");
        assert_eq!(store.get("P9").unwrap_err().code(), "PANEL_NOT_FOUND");

        // 归档后禁止重复初始化
        let err = store.insert_new(record("P1")).unwrap_err();
        assert_eq!(err.code(), "DUPLICATE_WORKFLOW");
    }

    #[test]
    fn test_insert_during_archive_never_resurrects_panel() {
        // archive 与 insert_new 并发: 移动在同一临界区内完成,
        // 重复登记在任意交错下都必须被拒绝
        for _ in 0..200 {
            let store = Arc::new(PanelStore::new());
            store.insert_new(record("P1")).unwrap();

            let archiver = {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    store.archive("P1", record("P1")).unwrap();
                })
            };
            let inserter = {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.insert_new(record("P1")))
            };

            archiver.join().unwrap();
            let result = inserter.join().unwrap();
            assert_eq!(result.unwrap_err().code(), "DUPLICATE_WORKFLOW");
            assert_eq!(store.lifecycle("P1").unwrap(), PanelLifecycle::Archived);
            assert_eq!(store.active_count().unwrap(), 0);
        }
    }

    #[test]
    fn test_enqueue_idempotent() {
        let store = PanelStore::new();
        store.enqueue("STN_EL", "P1").unwrap();
        store.enqueue("STN_EL", "P1").unwrap();
        store.enqueue("STN_EL", "P2").unwrap();
        assert_eq!(store.station_queue("STN_EL").unwrap(), vec!["P1", "P2"]);
        assert_eq!(store.next_in_queue("STN_EL").unwrap(), Some("P1".to_string()));
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let store = PanelStore::new();
        // 队列不存在时移除不报错
        store.remove_from_queue("STN_EL", "P1").expect("no-op 移除不应报错");
        store.enqueue("STN_EL", "P1").unwrap();
        store.remove_from_queue("STN_EL", "P2").unwrap();
        assert_eq!(store.station_queue("STN_EL").unwrap(), vec!["P1"]);
    }

    #[test]
    fn test_remove_from_all_queues() {
        let store = PanelStore::new();
        store.enqueue("STN_EL", "P1").unwrap();
        store.enqueue("STN_VISUAL", "P1").unwrap();
        store.remove_from_all_queues("P1").unwrap();
        assert!(store.station_queue("STN_EL").unwrap().is_empty());
        assert!(store.station_queue("STN_VISUAL").unwrap().is_empty());
    }
}
