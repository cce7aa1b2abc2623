mod schema;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use rusqlite::{Connection as SqliteConnection, OptionalExtension, Row};

use crate::models::*;
use crate::store::EntityStore;

const TASK_COLUMNS: &str = "id, project_id, name, description, status, priority, start_date, end_date,
    duration_days, assigned_to, position_x, position_y, created_at, updated_at";

const DELIVERABLE_COLUMNS: &str = "id, project_id, name, description, status, type, due_date,
    position_x, position_y, created_at, updated_at";

const CONNECTION_COLUMNS: &str =
    "id, project_id, source_type, source_id, target_type, target_id, created_at";

/// SQLite-backed entity store.
pub struct Database {
    conn: Arc<Mutex<SqliteConnection>>,
}

impl Database {
    pub fn open(path: PathBuf) -> Result<Self> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Database path has no parent directory"))?;
        std::fs::create_dir_all(parent)?;
        let conn = SqliteConnection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_memory() -> Result<Self> {
        let conn = SqliteConnection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        schema::run_migrations(&conn)
    }

    pub fn get_task(&self, id: i64) -> Result<Option<Task>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let task = conn
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?"),
                [id],
                task_from_row,
            )
            .optional()?;
        Ok(task)
    }

    pub fn get_deliverable(&self, id: i64) -> Result<Option<Deliverable>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let deliverable = conn
            .query_row(
                &format!("SELECT {DELIVERABLE_COLUMNS} FROM deliverables WHERE id = ?"),
                [id],
                deliverable_from_row,
            )
            .optional()?;
        Ok(deliverable)
    }

    fn node_in_project(&self, project_id: i64, node: NodeId) -> Result<bool> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let table = match node.kind {
            NodeKind::Task => "tasks",
            NodeKind::Deliverable => "deliverables",
        };
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {table} WHERE id = ? AND project_id = ?"),
            (node.id, project_id),
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

impl EntityStore for Database {
    // ============================================================
    // Project operations
    // ============================================================

    fn list_projects(&self) -> Result<Vec<Project>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, name, description, created_at, updated_at
             FROM projects ORDER BY name",
        )?;

        let projects = stmt
            .query_map([], project_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(projects)
    }

    fn get_project(&self, id: i64) -> Result<Option<Project>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let project = conn
            .query_row(
                "SELECT id, name, description, created_at, updated_at
                 FROM projects WHERE id = ?",
                [id],
                project_from_row,
            )
            .optional()?;
        Ok(project)
    }

    fn create_project(&self, input: CreateProjectInput) -> Result<Project> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let now = Utc::now();

        conn.execute(
            "INSERT INTO projects (name, description, created_at, updated_at)
             VALUES (?, ?, ?, ?)",
            (
                &input.name,
                &input.description,
                now.to_rfc3339(),
                now.to_rfc3339(),
            ),
        )?;

        Ok(Project {
            id: conn.last_insert_rowid(),
            name: input.name,
            description: input.description,
            created_at: now,
            updated_at: now,
        })
    }

    fn update_project(&self, id: i64, input: UpdateProjectInput) -> Result<Option<Project>> {
        let Some(existing) = self.get_project(id)? else {
            return Ok(None);
        };

        let conn = self.conn.lock().expect("database lock poisoned");
        let now = Utc::now();
        let name = input.name.unwrap_or(existing.name);
        let description = input.description.or(existing.description);

        conn.execute(
            "UPDATE projects SET name = ?, description = ?, updated_at = ? WHERE id = ?",
            (&name, &description, now.to_rfc3339(), id),
        )?;

        Ok(Some(Project {
            id,
            name,
            description,
            created_at: existing.created_at,
            updated_at: now,
        }))
    }

    fn delete_project(&self, id: i64) -> Result<bool> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let rows = conn.execute("DELETE FROM projects WHERE id = ?", [id])?;
        Ok(rows > 0)
    }

    // ============================================================
    // Task operations
    // ============================================================

    fn list_tasks(&self, project_id: i64) -> Result<Vec<Task>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE project_id = ? ORDER BY id"
        ))?;

        let tasks = stmt
            .query_map([project_id], task_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(tasks)
    }

    fn create_task(&self, project_id: i64, input: CreateTaskInput) -> Result<Task> {
        self.get_project(project_id)?
            .ok_or_else(|| anyhow::anyhow!("Project not found"))?;

        let conn = self.conn.lock().expect("database lock poisoned");
        let now = Utc::now();
        let position_x = input.position.map(|p| p.x);
        let position_y = input.position.map(|p| p.y);

        conn.execute(
            "INSERT INTO tasks (project_id, name, description, status, priority, start_date, end_date,
                duration_days, assigned_to, position_x, position_y, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            (
                project_id,
                &input.name,
                &input.description,
                input.status,
                input.priority.as_str(),
                input.start_date.map(format_date),
                input.end_date.map(format_date),
                input.duration_days,
                input.assigned_to,
                position_x,
                position_y,
                now.to_rfc3339(),
                now.to_rfc3339(),
            ),
        )?;

        Ok(Task {
            id: conn.last_insert_rowid(),
            project_id,
            name: input.name,
            description: input.description,
            status: input.status,
            priority: input.priority,
            start_date: input.start_date,
            end_date: input.end_date,
            duration_days: input.duration_days,
            assigned_to: input.assigned_to,
            position_x,
            position_y,
            created_at: now,
            updated_at: now,
        })
    }

    fn update_task(&self, id: i64, input: UpdateTaskInput) -> Result<Option<Task>> {
        let Some(existing) = self.get_task(id)? else {
            return Ok(None);
        };

        let conn = self.conn.lock().expect("database lock poisoned");
        let now = Utc::now();
        let task = Task {
            name: input.name.unwrap_or(existing.name),
            description: input.description.unwrap_or(existing.description),
            status: input.status.unwrap_or(existing.status),
            priority: input.priority.unwrap_or(existing.priority),
            start_date: input.start_date.or(existing.start_date),
            end_date: input.end_date.or(existing.end_date),
            duration_days: input.duration_days.or(existing.duration_days),
            assigned_to: input.assigned_to.or(existing.assigned_to),
            updated_at: now,
            ..existing
        };

        conn.execute(
            "UPDATE tasks SET name = ?, description = ?, status = ?, priority = ?, start_date = ?,
                end_date = ?, duration_days = ?, assigned_to = ?, updated_at = ? WHERE id = ?",
            (
                &task.name,
                &task.description,
                task.status,
                task.priority.as_str(),
                task.start_date.map(format_date),
                task.end_date.map(format_date),
                task.duration_days,
                task.assigned_to,
                now.to_rfc3339(),
                id,
            ),
        )?;

        Ok(Some(task))
    }

    fn update_task_position(&self, id: i64, position: Position) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let rows = conn.execute(
            "UPDATE tasks SET position_x = ?, position_y = ?, updated_at = ? WHERE id = ?",
            (position.x, position.y, Utc::now().to_rfc3339(), id),
        )?;
        if rows == 0 {
            anyhow::bail!("Task not found");
        }
        Ok(())
    }

    fn delete_task(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        conn.execute("DELETE FROM tasks WHERE id = ?", [id])?;
        Ok(())
    }

    // ============================================================
    // Deliverable operations
    // ============================================================

    fn list_deliverables(&self, project_id: i64) -> Result<Vec<Deliverable>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(&format!(
            "SELECT {DELIVERABLE_COLUMNS} FROM deliverables WHERE project_id = ? ORDER BY id"
        ))?;

        let deliverables = stmt
            .query_map([project_id], deliverable_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(deliverables)
    }

    fn create_deliverable(
        &self,
        project_id: i64,
        input: CreateDeliverableInput,
    ) -> Result<Deliverable> {
        self.get_project(project_id)?
            .ok_or_else(|| anyhow::anyhow!("Project not found"))?;

        let conn = self.conn.lock().expect("database lock poisoned");
        let now = Utc::now();
        let position_x = input.position.map(|p| p.x);
        let position_y = input.position.map(|p| p.y);

        conn.execute(
            "INSERT INTO deliverables (project_id, name, description, status, type, due_date,
                position_x, position_y, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            (
                project_id,
                &input.name,
                &input.description,
                input.status,
                input.type_id,
                input.due_date.map(format_date),
                position_x,
                position_y,
                now.to_rfc3339(),
                now.to_rfc3339(),
            ),
        )?;

        Ok(Deliverable {
            id: conn.last_insert_rowid(),
            project_id,
            name: input.name,
            description: input.description,
            status: input.status,
            type_id: input.type_id,
            due_date: input.due_date,
            position_x,
            position_y,
            created_at: now,
            updated_at: now,
        })
    }

    fn update_deliverable(
        &self,
        id: i64,
        input: UpdateDeliverableInput,
    ) -> Result<Option<Deliverable>> {
        let Some(existing) = self.get_deliverable(id)? else {
            return Ok(None);
        };

        let conn = self.conn.lock().expect("database lock poisoned");
        let now = Utc::now();
        let deliverable = Deliverable {
            name: input.name.unwrap_or(existing.name),
            description: input.description.unwrap_or(existing.description),
            status: input.status.unwrap_or(existing.status),
            type_id: input.type_id.unwrap_or(existing.type_id),
            due_date: input.due_date.or(existing.due_date),
            updated_at: now,
            ..existing
        };

        conn.execute(
            "UPDATE deliverables SET name = ?, description = ?, status = ?, type = ?, due_date = ?,
                updated_at = ? WHERE id = ?",
            (
                &deliverable.name,
                &deliverable.description,
                deliverable.status,
                deliverable.type_id,
                deliverable.due_date.map(format_date),
                now.to_rfc3339(),
                id,
            ),
        )?;

        Ok(Some(deliverable))
    }

    fn update_deliverable_position(&self, id: i64, position: Position) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let rows = conn.execute(
            "UPDATE deliverables SET position_x = ?, position_y = ?, updated_at = ? WHERE id = ?",
            (position.x, position.y, Utc::now().to_rfc3339(), id),
        )?;
        if rows == 0 {
            anyhow::bail!("Deliverable not found");
        }
        Ok(())
    }

    fn delete_deliverable(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        conn.execute("DELETE FROM deliverables WHERE id = ?", [id])?;
        Ok(())
    }

    // ============================================================
    // Connection operations
    // ============================================================

    fn list_connections(&self, project_id: i64) -> Result<Vec<Connection>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(&format!(
            "SELECT {CONNECTION_COLUMNS} FROM flow_connections WHERE project_id = ? ORDER BY id"
        ))?;

        let connections = stmt
            .query_map([project_id], connection_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(connections)
    }

    fn create_connection(
        &self,
        project_id: i64,
        input: CreateConnectionInput,
    ) -> Result<Connection> {
        if !self.node_in_project(project_id, input.source)? {
            anyhow::bail!("Source node {} not found in project", input.source);
        }
        if !self.node_in_project(project_id, input.target)? {
            anyhow::bail!("Target node {} not found in project", input.target);
        }

        let conn = self.conn.lock().expect("database lock poisoned");

        // Same ordered endpoint pair: hand back the existing record
        let existing = conn
            .query_row(
                &format!(
                    "SELECT {CONNECTION_COLUMNS} FROM flow_connections
                     WHERE project_id = ? AND source_type = ? AND source_id = ?
                       AND target_type = ? AND target_id = ?"
                ),
                (
                    project_id,
                    input.source.kind.as_str(),
                    input.source.id,
                    input.target.kind.as_str(),
                    input.target.id,
                ),
                connection_from_row,
            )
            .optional()?;
        if let Some(existing) = existing {
            return Ok(existing);
        }

        let now = Utc::now();
        conn.execute(
            "INSERT INTO flow_connections (project_id, source_type, source_id, target_type, target_id, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            (
                project_id,
                input.source.kind.as_str(),
                input.source.id,
                input.target.kind.as_str(),
                input.target.id,
                now.to_rfc3339(),
            ),
        )?;

        Ok(Connection {
            id: conn.last_insert_rowid(),
            project_id,
            source_type: Some(input.source.kind),
            source_id: input.source.id,
            target_type: Some(input.target.kind),
            target_id: input.target.id,
            created_at: now,
        })
    }

    fn delete_connection(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        conn.execute("DELETE FROM flow_connections WHERE id = ?", [id])?;
        Ok(())
    }

    fn delete_connections_for_node(&self, node: NodeId) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        conn.execute(
            "DELETE FROM flow_connections
             WHERE (source_type = ?1 AND source_id = ?2) OR (target_type = ?1 AND target_id = ?2)",
            (node.kind.as_str(), node.id),
        )?;
        Ok(())
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
        }
    }
}

fn project_from_row(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        created_at: parse_datetime(row.get::<_, String>(3)?),
        updated_at: parse_datetime(row.get::<_, String>(4)?),
    })
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        project_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        status: row.get(4)?,
        priority: Priority::from_str(&row.get::<_, String>(5)?).unwrap_or_default(),
        start_date: row.get::<_, Option<String>>(6)?.and_then(parse_date),
        end_date: row.get::<_, Option<String>>(7)?.and_then(parse_date),
        duration_days: row.get(8)?,
        assigned_to: row.get(9)?,
        position_x: row.get(10)?,
        position_y: row.get(11)?,
        created_at: parse_datetime(row.get::<_, String>(12)?),
        updated_at: parse_datetime(row.get::<_, String>(13)?),
    })
}

fn deliverable_from_row(row: &Row<'_>) -> rusqlite::Result<Deliverable> {
    Ok(Deliverable {
        id: row.get(0)?,
        project_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        status: row.get(4)?,
        type_id: row.get(5)?,
        due_date: row.get::<_, Option<String>>(6)?.and_then(parse_date),
        position_x: row.get(7)?,
        position_y: row.get(8)?,
        created_at: parse_datetime(row.get::<_, String>(9)?),
        updated_at: parse_datetime(row.get::<_, String>(10)?),
    })
}

fn connection_from_row(row: &Row<'_>) -> rusqlite::Result<Connection> {
    Ok(Connection {
        id: row.get(0)?,
        project_id: row.get(1)?,
        source_type: NodeKind::from_str(&row.get::<_, String>(2)?),
        source_id: row.get(3)?,
        target_type: NodeKind::from_str(&row.get::<_, String>(4)?),
        target_id: row.get(5)?,
        created_at: parse_datetime(row.get::<_, String>(6)?),
    })
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn parse_date(s: String) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()
}

fn parse_datetime(s: String) -> chrono::DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
