//! Recording host client for coordinator tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use sisyphus_core::{MessageInfo, Todo};
use sisyphus_host::{ClientError, HostClient, PromptRequest, Toast};

/// In-memory host that records every call and serves canned data.
#[derive(Default)]
pub struct MockHost {
    pub todos: Mutex<HashMap<String, Vec<Todo>>>,
    pub messages: Mutex<HashMap<String, Vec<MessageInfo>>>,
    pub prompts: Mutex<Vec<PromptRequest>>,
    pub toasts: Mutex<Vec<Toast>>,
    pub summarize_calls: Mutex<Vec<(String, String, String)>>,
    pub reverts: Mutex<Vec<(String, String, Option<String>)>>,
    /// Fail this many summarize calls before succeeding.
    pub summarize_failures: AtomicU32,
    /// Artificial latency for summarize calls, in milliseconds.
    pub summarize_delay_ms: AtomicU32,
    /// Fail this many revert calls before succeeding.
    pub revert_failures: AtomicU32,
}

impl MockHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_todos(&self, session_id: &str, todos: Vec<Todo>) {
        self.todos.lock().insert(session_id.to_owned(), todos);
    }

    pub fn set_messages(&self, session_id: &str, messages: Vec<MessageInfo>) {
        self.messages.lock().insert(session_id.to_owned(), messages);
    }

    pub fn prompt_count(&self) -> usize {
        self.prompts.lock().len()
    }

    pub fn toast_messages(&self) -> Vec<String> {
        self.toasts.lock().iter().map(|t| t.message.clone()).collect()
    }
}

#[async_trait]
impl HostClient for MockHost {
    async fn todos(&self, session_id: &str) -> Result<Vec<Todo>, ClientError> {
        Ok(self.todos.lock().get(session_id).cloned().unwrap_or_default())
    }

    async fn messages(&self, session_id: &str) -> Result<Vec<MessageInfo>, ClientError> {
        Ok(self
            .messages
            .lock()
            .get(session_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn prompt(&self, request: PromptRequest) -> Result<(), ClientError> {
        self.prompts.lock().push(request);
        Ok(())
    }

    async fn summarize(
        &self,
        session_id: &str,
        provider_id: &str,
        model_id: &str,
    ) -> Result<(), ClientError> {
        self.summarize_calls.lock().push((
            session_id.to_owned(),
            provider_id.to_owned(),
            model_id.to_owned(),
        ));
        let delay = self.summarize_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(delay.into())).await;
        }
        if self.summarize_failures.load(Ordering::SeqCst) > 0 {
            let _ = self.summarize_failures.fetch_sub(1, Ordering::SeqCst);
            return Err(ClientError::Rpc("summarize failed".into()));
        }
        Ok(())
    }

    async fn revert(
        &self,
        session_id: &str,
        message_id: &str,
        part_id: Option<&str>,
    ) -> Result<(), ClientError> {
        if self.revert_failures.load(Ordering::SeqCst) > 0 {
            let _ = self.revert_failures.fetch_sub(1, Ordering::SeqCst);
            return Err(ClientError::Rpc("revert failed".into()));
        }
        self.reverts.lock().push((
            session_id.to_owned(),
            message_id.to_owned(),
            part_id.map(str::to_owned),
        ));
        Ok(())
    }

    async fn show_toast(&self, toast: Toast) -> Result<(), ClientError> {
        self.toasts.lock().push(toast);
        Ok(())
    }
}

/// A todo in the given completion state.
pub fn todo(id: &str, status: sisyphus_core::TodoStatus) -> Todo {
    Todo {
        id: id.to_owned(),
        content: format!("task {id}"),
        status,
        priority: None,
    }
}
