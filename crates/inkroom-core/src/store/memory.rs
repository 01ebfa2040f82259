//! In-memory backing store.

use super::{BoardSnapshot, BoardStore, BoxFuture, Project, StoreError, StoreResult};
use std::collections::HashMap;
use std::sync::RwLock;

/// In-memory store for tests and offline use.
#[derive(Default)]
pub struct MemoryBoardStore {
    boards: RwLock<HashMap<String, BoardSnapshot>>,
    projects: RwLock<Vec<Project>>,
    /// When set, every request fails as unauthorized.
    reject_credentials: bool,
}

impl MemoryBoardStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that rejects every request as unauthorized.
    pub fn unauthorized() -> Self {
        Self {
            reject_credentials: true,
            ..Self::default()
        }
    }

    /// Add a board and its project entry.
    pub fn insert_board(&self, project: Project, snapshot: BoardSnapshot) -> StoreResult<()> {
        let mut boards = self.boards.write().map_err(lock_error)?;
        let mut projects = self.projects.write().map_err(lock_error)?;
        boards.insert(project.slug.clone(), snapshot);
        projects.retain(|p| p.slug != project.slug);
        projects.push(project);
        Ok(())
    }

    fn check_credentials(&self) -> StoreResult<()> {
        if self.reject_credentials {
            return Err(StoreError::Unauthorized);
        }
        Ok(())
    }
}

fn lock_error<E: std::fmt::Display>(e: E) -> StoreError {
    StoreError::Other(format!("Lock error: {}", e))
}

impl BoardStore for MemoryBoardStore {
    fn board_state(&self, slug: &str) -> BoxFuture<'_, StoreResult<BoardSnapshot>> {
        let slug = slug.to_string();
        Box::pin(async move {
            self.check_credentials()?;
            let boards = self.boards.read().map_err(lock_error)?;
            boards
                .get(&slug)
                .cloned()
                .ok_or(StoreError::NotFound(slug))
        })
    }

    fn projects(&self) -> BoxFuture<'_, StoreResult<Vec<Project>>> {
        Box::pin(async move {
            self.check_credentials()?;
            let projects = self.projects.read().map_err(lock_error)?;
            Ok(projects.clone())
        })
    }
}
