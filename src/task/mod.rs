//! Tasks, subtasks and the in-memory store that analysis results are applied to.
//!
//! Applying an analysis sets the task's category and priority, marks it as AI-classified,
//! and replaces any previously AI-generated subtasks with the new suggestions in order.
//! Subtasks the user created by hand are never touched.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::analysis::{ClassificationResult, Priority, SubtaskList, TaskAnalysis, TaskCategory};

const MIN_TITLE_LEN: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    #[error("Task not found: {0}")]
    NotFound(Uuid),

    #[error("Subtask not found: {0}")]
    SubtaskNotFound(Uuid),

    #[error("Title must be at least 3 characters long")]
    TitleTooShort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subtask {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub completed: bool,
    pub order: usize,
    #[serde(default)]
    pub ai_generated: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subtask {
    fn new(title: String, description: String, order: usize, ai_generated: bool) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title,
            description,
            completed: false,
            order,
            ai_generated,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub category: Option<TaskCategory>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub ai_classified: bool,
    /// Kept sorted by `order`.
    #[serde(default)]
    pub subtasks: Vec<Subtask>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Create a pending task. The title is trimmed and must keep at least three characters.
    pub fn new(title: &str, description: impl Into<String>) -> Result<Self, TaskError> {
        let title = title.trim();
        if title.chars().count() < MIN_TITLE_LEN {
            return Err(TaskError::TitleTooShort);
        }
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            title: title.to_string(),
            description: description.into(),
            status: TaskStatus::Pending,
            category: None,
            priority: None,
            ai_classified: false,
            subtasks: Vec::new(),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn completed_subtask_count(&self) -> usize {
        self.subtasks.iter().filter(|s| s.completed).count()
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    fn apply_classification(&mut self, classification: &ClassificationResult) {
        self.category = Some(classification.category);
        self.priority = Some(classification.priority);
        self.ai_classified = true;
        self.touch();
    }

    /// Drop AI-generated subtasks and add the suggestions with `order` = position.
    fn replace_generated_subtasks(&mut self, list: &SubtaskList) {
        self.subtasks.retain(|s| !s.ai_generated);
        self.subtasks
            .extend(list.subtasks.iter().enumerate().map(|(index, suggestion)| {
                Subtask::new(
                    suggestion.title.clone(),
                    suggestion.description.clone(),
                    index,
                    true,
                )
            }));
        self.subtasks.sort_by_key(|s| s.order);
        self.touch();
    }
}

/// In-memory task store.
#[derive(Debug, Clone, Default)]
pub struct TaskStore {
    tasks: Arc<RwLock<HashMap<Uuid, Task>>>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self, title: &str, description: &str) -> Result<Task, TaskError> {
        let task = Task::new(title, description)?;
        self.tasks.write().await.insert(task.id, task.clone());
        tracing::debug!(task_id = %task.id, "Task created");
        Ok(task)
    }

    pub async fn get(&self, id: Uuid) -> Option<Task> {
        self.tasks.read().await.get(&id).cloned()
    }

    /// All tasks, newest first.
    pub async fn list(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.tasks.read().await.values().cloned().collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        tasks
    }

    pub async fn delete(&self, id: Uuid) -> bool {
        self.tasks.write().await.remove(&id).is_some()
    }

    pub async fn complete(&self, id: Uuid) -> Result<Task, TaskError> {
        self.set_status(id, TaskStatus::Completed).await
    }

    pub async fn reopen(&self, id: Uuid) -> Result<Task, TaskError> {
        self.set_status(id, TaskStatus::Pending).await
    }

    async fn set_status(&self, id: Uuid, status: TaskStatus) -> Result<Task, TaskError> {
        self.update(id, |task| {
            task.status = status;
            task.touch();
        })
        .await
    }

    /// Add a hand-written subtask at the end of the list.
    pub async fn add_subtask(
        &self,
        task_id: Uuid,
        title: &str,
        description: &str,
    ) -> Result<Subtask, TaskError> {
        let mut tasks = self.tasks.write().await;
        let task = tasks.get_mut(&task_id).ok_or(TaskError::NotFound(task_id))?;
        let order = task.subtasks.iter().map(|s| s.order + 1).max().unwrap_or(0);
        let subtask = Subtask::new(title.to_string(), description.to_string(), order, false);
        task.subtasks.push(subtask.clone());
        task.touch();
        Ok(subtask)
    }

    /// Flip a subtask's completion flag.
    pub async fn toggle_subtask(&self, task_id: Uuid, subtask_id: Uuid) -> Result<Subtask, TaskError> {
        let mut tasks = self.tasks.write().await;
        let task = tasks.get_mut(&task_id).ok_or(TaskError::NotFound(task_id))?;
        let subtask = task
            .subtasks
            .iter_mut()
            .find(|s| s.id == subtask_id)
            .ok_or(TaskError::SubtaskNotFound(subtask_id))?;
        subtask.completed = !subtask.completed;
        subtask.updated_at = Utc::now();
        Ok(subtask.clone())
    }

    pub async fn apply_classification(
        &self,
        id: Uuid,
        classification: &ClassificationResult,
    ) -> Result<Task, TaskError> {
        self.update(id, |task| task.apply_classification(classification))
            .await
    }

    pub async fn replace_generated_subtasks(
        &self,
        id: Uuid,
        list: &SubtaskList,
    ) -> Result<Task, TaskError> {
        self.update(id, |task| task.replace_generated_subtasks(list))
            .await
    }

    /// Apply a full analysis under a single write lock.
    pub async fn apply_analysis(&self, id: Uuid, analysis: &TaskAnalysis) -> Result<Task, TaskError> {
        let task = self
            .update(id, |task| {
                task.apply_classification(&analysis.classification);
                task.replace_generated_subtasks(&analysis.subtasks);
            })
            .await?;
        tracing::info!(
            task_id = %id,
            category = %analysis.classification.category,
            priority = %analysis.classification.priority,
            subtasks = analysis.subtasks.subtasks.len(),
            "Applied analysis to task"
        );
        Ok(task)
    }

    async fn update<F>(&self, id: Uuid, apply: F) -> Result<Task, TaskError>
    where
        F: FnOnce(&mut Task),
    {
        let mut tasks = self.tasks.write().await;
        let task = tasks.get_mut(&id).ok_or(TaskError::NotFound(id))?;
        apply(task);
        Ok(task.clone())
    }
}
