//! Scriptable [`ExternalTodoService`] for decorator and command tests.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Test utilities document panics where critical

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use todo_sync_core::{
    CancellationToken, ExternalServiceError, ExternalTodoService, ProviderId, ServiceFuture,
    TodoRecord,
};

/// Per-operation call counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServiceCalls {
    /// `list` calls
    pub list: usize,
    /// `get_by_id` calls
    pub get_by_id: usize,
    /// `create` calls
    pub create: usize,
    /// `update` calls
    pub update: usize,
    /// `delete` calls
    pub delete: usize,
}

#[derive(Debug)]
struct MockState {
    items: Vec<TodoRecord>,
    by_id: HashMap<ProviderId, TodoRecord>,
    write_result: bool,
    failures: VecDeque<ExternalServiceError>,
    calls: ServiceCalls,
    written: Vec<TodoRecord>,
}

/// In-memory stand-in for the provider client.
///
/// - Reads return whatever was scripted with [`set_items`](Self::set_items) and
///   [`set_item`](Self::set_item)
/// - Writes return [`set_write_result`](Self::set_write_result) (default `true`)
/// - [`fail_next`](Self::fail_next) queues an error for the next call of any kind
/// - A cancelled token fails the call with [`ExternalServiceError::Cancelled`]
///
/// Every call is counted, including failed ones.
#[derive(Debug)]
pub struct MockExternalTodoService {
    state: Mutex<MockState>,
}

impl MockExternalTodoService {
    /// Empty provider that accepts every write.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                items: Vec::new(),
                by_id: HashMap::new(),
                write_result: true,
                failures: VecDeque::new(),
                calls: ServiceCalls::default(),
                written: Vec::new(),
            }),
        }
    }

    /// Script the result of `list`.
    pub fn set_items(&self, items: Vec<TodoRecord>) {
        self.state.lock().unwrap().items = items;
    }

    /// Script the result of `get_by_id(id)`; `None` makes it absent.
    pub fn set_item(&self, id: ProviderId, item: Option<TodoRecord>) {
        let mut state = self.state.lock().unwrap();
        match item {
            Some(item) => state.by_id.insert(id, item),
            None => state.by_id.remove(&id),
        };
    }

    /// Script the result of every write.
    pub fn set_write_result(&self, succeeded: bool) {
        self.state.lock().unwrap().write_result = succeeded;
    }

    /// Fail the next call with `error`.
    pub fn fail_next(&self, error: ExternalServiceError) {
        self.state.lock().unwrap().failures.push_back(error);
    }

    /// Call counts so far.
    #[must_use]
    pub fn calls(&self) -> ServiceCalls {
        self.state.lock().unwrap().calls
    }

    /// Records passed to successful `create` and `update` calls.
    #[must_use]
    pub fn written(&self) -> Vec<TodoRecord> {
        self.state.lock().unwrap().written.clone()
    }

    fn begin(
        &self,
        cancel: &CancellationToken,
        count: impl FnOnce(&mut ServiceCalls),
    ) -> Result<(), ExternalServiceError> {
        let mut state = self.state.lock().unwrap();
        count(&mut state.calls);
        if let Some(error) = state.failures.pop_front() {
            return Err(error);
        }
        if cancel.is_cancelled() {
            return Err(ExternalServiceError::Cancelled);
        }
        Ok(())
    }

    fn write(&self, record: Option<&TodoRecord>) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.write_result {
            if let Some(record) = record {
                state.written.push(record.clone());
            }
        }
        state.write_result
    }
}

impl Default for MockExternalTodoService {
    fn default() -> Self {
        Self::new()
    }
}

impl ExternalTodoService for MockExternalTodoService {
    fn list<'a>(&'a self, cancel: &'a CancellationToken) -> ServiceFuture<'a, Vec<TodoRecord>> {
        Box::pin(async move {
            self.begin(cancel, |c| c.list += 1)?;
            Ok(self.state.lock().unwrap().items.clone())
        })
    }

    fn get_by_id<'a>(
        &'a self,
        id: ProviderId,
        cancel: &'a CancellationToken,
    ) -> ServiceFuture<'a, Option<TodoRecord>> {
        Box::pin(async move {
            self.begin(cancel, |c| c.get_by_id += 1)?;
            Ok(self.state.lock().unwrap().by_id.get(&id).cloned())
        })
    }

    fn create<'a>(
        &'a self,
        record: &'a TodoRecord,
        cancel: &'a CancellationToken,
    ) -> ServiceFuture<'a, bool> {
        Box::pin(async move {
            self.begin(cancel, |c| c.create += 1)?;
            Ok(self.write(Some(record)))
        })
    }

    fn update<'a>(
        &'a self,
        id: ProviderId,
        record: &'a TodoRecord,
        cancel: &'a CancellationToken,
    ) -> ServiceFuture<'a, bool> {
        Box::pin(async move {
            self.begin(cancel, |c| c.update += 1)?;
            let succeeded = self.write(Some(record));
            if succeeded {
                self.state.lock().unwrap().by_id.insert(id, record.clone());
            }
            Ok(succeeded)
        })
    }

    fn delete<'a>(
        &'a self,
        id: ProviderId,
        cancel: &'a CancellationToken,
    ) -> ServiceFuture<'a, bool> {
        Box::pin(async move {
            self.begin(cancel, |c| c.delete += 1)?;
            let succeeded = self.write(None);
            if succeeded {
                self.state.lock().unwrap().by_id.remove(&id);
            }
            Ok(succeeded)
        })
    }
}
