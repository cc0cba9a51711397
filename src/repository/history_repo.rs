// ==========================================
// 光伏组件产线质检工作流系统 - 审计历史仓储
// ==========================================
// 依据: workflow_history / completed_panel 两张表
// 职责: 转换历史逐条落库 + 完成快照归档查询
// 红线: Repository 不做业务逻辑,只做数据映射
// ==========================================

use crate::domain::panel::{PanelWorkflowRecord, TransitionHistoryEntry};
use crate::domain::types::PanelState;
use crate::engine::events::PersistenceSink;
use crate::repository::error::{RepositoryError, RepositoryResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value as JsonValue;
use std::error::Error;
use std::sync::{Arc, Mutex};

/// 建表语句(幂等,启动时执行一次)
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS workflow_history (
    entry_id        TEXT PRIMARY KEY,
    panel_id        TEXT NOT NULL,
    ts              TEXT NOT NULL,
    from_state      TEXT NOT NULL,
    to_state        TEXT NOT NULL,
    reason          TEXT NOT NULL,
    additional_json TEXT
);
CREATE INDEX IF NOT EXISTS idx_workflow_history_panel
    ON workflow_history (panel_id, ts);

CREATE TABLE IF NOT EXISTS completed_panel (
    panel_id      TEXT PRIMARY KEY,
    barcode       TEXT NOT NULL,
    panel_type    TEXT NOT NULL,
    line          TEXT NOT NULL,
    rework_count  INTEGER NOT NULL,
    completed_at  TEXT NOT NULL,
    snapshot_json TEXT NOT NULL
);
"#;

// ==========================================
// CompletedPanelRow - 完成快照行
// ==========================================
#[derive(Debug, Clone)]
pub struct CompletedPanelRow {
    pub panel_id: String,
    pub barcode: String,
    pub panel_type: String,
    pub line: String,
    pub rework_count: u32,
    pub completed_at: DateTime<Utc>,
    pub snapshot: PanelWorkflowRecord,
}

// ==========================================
// WorkflowHistoryRepository - 审计历史仓储
// ==========================================
// 红线: Repository 不做业务逻辑,只做数据映射
pub struct WorkflowHistoryRepository {
    conn: Arc<Mutex<Connection>>,
}

impl WorkflowHistoryRepository {
    /// 创建仓储并确保表结构存在
    pub fn new(conn: Arc<Mutex<Connection>>) -> RepositoryResult<Self> {
        {
            let guard = conn
                .lock()
                .map_err(|e| RepositoryError::LockError(e.to_string()))?;
            guard.execute_batch(SCHEMA_SQL)?;
        }
        Ok(Self { conn })
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 写入操作
    // ==========================================

    /// 插入一条转换历史
    pub fn insert_history(
        &self,
        panel_id: &str,
        entry: &TransitionHistoryEntry,
    ) -> RepositoryResult<String> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO workflow_history (
                entry_id, panel_id, ts, from_state, to_state, reason, additional_json
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                entry.entry_id,
                panel_id,
                entry.timestamp.to_rfc3339(),
                entry.from_state.to_db_str(),
                entry.to_state.to_db_str(),
                entry.reason,
                entry.additional_data.as_ref().map(|v| v.to_string()),
            ],
        )?;
        Ok(entry.entry_id.clone())
    }

    /// 落完成快照(重复完成同一 panel_id 视为约束违反)
    pub fn insert_completion(&self, snapshot: &PanelWorkflowRecord) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO completed_panel (
                panel_id, barcode, panel_type, line, rework_count, completed_at, snapshot_json
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                snapshot.panel_id,
                snapshot.barcode,
                snapshot.panel_type,
                snapshot.line.to_string(),
                snapshot.rework_count,
                snapshot.last_update_time.to_rfc3339(),
                serde_json::to_string(snapshot)?,
            ],
        )?;
        Ok(())
    }

    // ==========================================
    // 查询操作
    // ==========================================

    /// 按组件查询转换历史(时间升序; 同一毫秒内按写入顺序)
    pub fn query_history(&self, panel_id: &str) -> RepositoryResult<Vec<TransitionHistoryEntry>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT entry_id, ts, from_state, to_state, reason, additional_json
            FROM workflow_history
            WHERE panel_id = ?1
            ORDER BY ts ASC, rowid ASC
            "#,
        )?;

        let rows = stmt.query_map(params![panel_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, Option<String>>(5)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (entry_id, ts, from_state, to_state, reason, additional_json) = row?;
            entries.push(TransitionHistoryEntry {
                entry_id,
                timestamp: parse_timestamp(&ts)?,
                from_state: parse_state(&from_state)?,
                to_state: parse_state(&to_state)?,
                reason,
                additional_data: additional_json
                    .map(|s| serde_json::from_str::<JsonValue>(&s))
                    .transpose()?,
            });
        }
        Ok(entries)
    }

    /// 读取完成快照
    pub fn find_completion(&self, panel_id: &str) -> RepositoryResult<Option<CompletedPanelRow>> {
        let conn = self.get_conn()?;
        let row = conn
            .query_row(
                r#"
                SELECT panel_id, barcode, panel_type, line, rework_count, completed_at, snapshot_json
                FROM completed_panel
                WHERE panel_id = ?1
                "#,
                params![panel_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, u32>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                    ))
                },
            )
            .optional()?;

        let Some((panel_id, barcode, panel_type, line, rework_count, completed_at, snapshot_json)) =
            row
        else {
            return Ok(None);
        };

        Ok(Some(CompletedPanelRow {
            panel_id,
            barcode,
            panel_type,
            line,
            rework_count,
            completed_at: parse_timestamp(&completed_at)?,
            snapshot: serde_json::from_str(&snapshot_json)?,
        }))
    }

    /// 完成总数(看板统计)
    pub fn count_completions(&self) -> RepositoryResult<u64> {
        let conn = self.get_conn()?;
        let count: u64 =
            conn.query_row("SELECT COUNT(*) FROM completed_panel", [], |row| row.get(0))?;
        Ok(count)
    }
}

fn parse_timestamp(raw: &str) -> RepositoryResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::SerializationError(format!("时间戳解析失败: {}", e)))
}

fn parse_state(raw: &str) -> RepositoryResult<PanelState> {
    PanelState::from_str(raw).ok_or_else(|| {
        RepositoryError::SerializationError(format!("未知状态值: {}", raw))
    })
}

// ==========================================
// PersistenceSink 实现(引擎派发器的落库端)
// ==========================================
#[async_trait]
impl PersistenceSink for WorkflowHistoryRepository {
    async fn append_history(
        &self,
        panel_id: &str,
        entry: &TransitionHistoryEntry,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.insert_history(panel_id, entry)?;
        Ok(())
    }

    async fn store_completion(
        &self,
        snapshot: &PanelWorkflowRecord,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.insert_completion(snapshot)?;
        Ok(())
    }
}
