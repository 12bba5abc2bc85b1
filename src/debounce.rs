use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::config::SEARCH_DEBOUNCE;
use crate::filters::FilterState;

#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    pending: Option<JoinHandle<()>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    pub fn schedule<F>(&mut self, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.cancel();
        let delay = self.delay;
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            action();
        }));
    }

    pub fn cancel(&mut self) {
        if let Some(task) = self.pending.take() {
            task.abort();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

pub struct SearchInput {
    filters: Arc<FilterState>,
    debouncer: Debouncer,
    text: String,
}

impl SearchInput {
    pub fn new(filters: Arc<FilterState>) -> Self {
        let text = filters.search_text();
        Self {
            filters,
            debouncer: Debouncer::new(SEARCH_DEBOUNCE),
            text,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn input(&mut self, text: impl Into<String>) {
        self.text = text.into();
        let filters = self.filters.clone();
        let query = self.text.clone();
        self.debouncer.schedule(move || filters.set_search_query(query));
    }

    pub fn clear(&mut self) {
        self.debouncer.cancel();
        self.text.clear();
        self.filters.set_search_query("");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[tokio::test(start_paused = true)]
    async fn only_last_action_runs() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut debouncer = Debouncer::new(Duration::from_millis(700));
        for text in ["m", "ma", "mat"] {
            let sink = seen.clone();
            debouncer.schedule(move || sink.lock().unwrap().push(text));
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(seen.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_millis(700)).await;
        assert_eq!(*seen.lock().unwrap(), vec!["mat"]);
        assert!(!debouncer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_cancels_pending_action() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let mut debouncer = Debouncer::new(Duration::from_millis(700));
            let sink = seen.clone();
            debouncer.schedule(move || sink.lock().unwrap().push("late"));
        }
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(seen.lock().unwrap().is_empty());
    }
}
