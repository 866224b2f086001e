//! Live interaction state
//!
//! A call or chat produces utterances one at a time. [`InteractionContext`]
//! keeps them in order so the safety gate can read the whole conversation
//! while matching works on a bounded trailing window. [`ContextRegistry`]
//! owns the contexts of all open interactions.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::engine::JobMatcher;
use crate::types::{AggregateResult, CallerProfile, ClientType, DetectOptions, MatchResult};

/// One thing the caller said
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Utterance {
    pub text: String,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionContext {
    id: Uuid,
    client_type: Option<ClientType>,
    caller: CallerProfile,
    utterances: Vec<Utterance>,
    started_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
}

impl Default for InteractionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl InteractionContext {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            client_type: None,
            caller: CallerProfile::default(),
            utterances: Vec::new(),
            started_at: now,
            last_activity: now,
        }
    }

    pub fn with_client_type(mut self, client_type: ClientType) -> Self {
        self.client_type = Some(client_type);
        self
    }

    pub fn with_caller(mut self, caller: CallerProfile) -> Self {
        self.caller = caller;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn client_type(&self) -> Option<ClientType> {
        self.client_type
    }

    pub fn caller(&self) -> &CallerProfile {
        &self.caller
    }

    pub fn utterances(&self) -> &[Utterance] {
        &self.utterances
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_activity
    }

    /// Append an utterance. Blank input is ignored.
    pub fn push(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        let now = Utc::now();
        self.utterances.push(Utterance {
            text: text.to_string(),
            received_at: now,
        });
        self.last_activity = now;
    }

    /// All utterances joined in arrival order
    pub fn full_text(&self) -> String {
        self.utterances
            .iter()
            .map(|u| u.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn is_idle(&self, max_idle: Duration, now: DateTime<Utc>) -> bool {
        now - self.last_activity > max_idle
    }

    /// Interaction-level options. With `include_history`, every utterance but
    /// the latest is passed as history so the safety gate sees them.
    pub fn detect_options(&self, include_history: bool) -> DetectOptions {
        let history = if include_history {
            let earlier = self.utterances.len().saturating_sub(1);
            self.utterances[..earlier]
                .iter()
                .map(|u| u.text.clone())
                .collect()
        } else {
            Vec::new()
        };
        DetectOptions {
            client_type: self.client_type,
            caller: self.caller,
            history,
            ..Default::default()
        }
    }
}

/// Open interactions keyed by id
pub struct ContextRegistry {
    engine: Arc<JobMatcher>,
    contexts: RwLock<HashMap<Uuid, Arc<Mutex<InteractionContext>>>>,
}

impl ContextRegistry {
    pub fn new(engine: Arc<JobMatcher>) -> Self {
        Self {
            engine,
            contexts: RwLock::new(HashMap::new()),
        }
    }

    /// Open an interaction and return its id
    pub async fn begin(&self, client_type: Option<ClientType>, caller: CallerProfile) -> Uuid {
        let mut context = InteractionContext::new().with_caller(caller);
        context.client_type = client_type;
        self.insert(context).await
    }

    /// Register an existing context (e.g. restored from a session store)
    pub async fn insert(&self, context: InteractionContext) -> Uuid {
        let id = context.id();
        self.contexts
            .write()
            .await
            .insert(id, Arc::new(Mutex::new(context)));
        debug!(interaction = %id, "Interaction opened");
        id
    }

    /// `None` when the interaction is unknown or already ended
    pub async fn detect_with_context(&self, id: Uuid, text: &str) -> Option<MatchResult> {
        let context = self.get(id).await?;
        let mut context = context.lock().await;
        Some(self.engine.detect_with_context(text, &mut context).await)
    }

    pub async fn detect_multi_task_with_context(
        &self,
        id: Uuid,
        text: &str,
    ) -> Option<AggregateResult> {
        let context = self.get(id).await?;
        let mut context = context.lock().await;
        Some(
            self.engine
                .detect_multi_task_with_context(text, &mut context)
                .await,
        )
    }

    /// Close an interaction, returning its final state
    pub async fn end_interaction(&self, id: Uuid) -> Option<InteractionContext> {
        let context = self.contexts.write().await.remove(&id)?;
        let context = context.lock().await.clone();
        debug!(interaction = %id, utterances = context.utterances.len(), "Interaction ended");
        Some(context)
    }

    /// Drop interactions with no activity for longer than `max_idle`
    pub async fn expire_idle(&self, max_idle: Duration) -> usize {
        let now = Utc::now();
        let mut contexts = self.contexts.write().await;
        let mut expired = Vec::new();
        for (id, context) in contexts.iter() {
            // A locked context is mid-detection, so it is not idle
            if let Ok(guard) = context.try_lock() {
                if guard.is_idle(max_idle, now) {
                    expired.push(*id);
                }
            }
        }
        for id in &expired {
            contexts.remove(id);
        }
        if !expired.is_empty() {
            info!(count = expired.len(), "Expired idle interactions");
        }
        expired.len()
    }

    pub async fn len(&self) -> usize {
        self.contexts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.contexts.read().await.is_empty()
    }

    async fn get(&self, id: Uuid) -> Option<Arc<Mutex<InteractionContext>>> {
        self.contexts.read().await.get(&id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_ignores_blank_and_orders() {
        let mut ctx = InteractionContext::new();
        ctx.push("hello");
        ctx.push("   ");
        ctx.push("my tap is dripping");
        assert_eq!(ctx.utterances().len(), 2);
        assert_eq!(ctx.full_text(), "hello my tap is dripping");
    }

    #[test]
    fn test_detect_options_history_excludes_latest() {
        let mut ctx = InteractionContext::new().with_client_type(ClientType::Commercial);
        ctx.push("first");
        ctx.push("second");
        let options = ctx.detect_options(true);
        assert_eq!(options.history, vec!["first".to_string()]);
        assert_eq!(options.client_type, Some(ClientType::Commercial));
        assert!(ctx.detect_options(false).history.is_empty());
    }

    #[test]
    fn test_idle() {
        let ctx = InteractionContext::new();
        let later = ctx.last_activity() + Duration::minutes(31);
        assert!(ctx.is_idle(Duration::minutes(30), later));
        assert!(!ctx.is_idle(Duration::minutes(30), ctx.last_activity()));
    }
}
