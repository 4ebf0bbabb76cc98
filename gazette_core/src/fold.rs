//! Folding an ordered list of events into an [`AggregateState`].
//!
//! Every event type is mapped to a [`FoldRule`] in a [`FoldRegistry`]. Types without a rule are
//! handled according to the [`UnknownEventPolicy`]: logged and skipped, or rejected.

use crate::config::UnknownEventPolicy;
use crate::event::{AggregateType, Event, EventType};
use crate::snapshot::AggregateState;
use log::{debug, warn};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Field set on every created aggregate to its id.
pub const ID_FIELD: &str = "id";
/// Soft-delete flag of articles.
pub const IS_DELETED_FIELD: &str = "is_deleted";
/// Timestamp set alongside [`IS_DELETED_FIELD`].
pub const DELETED_AT_FIELD: &str = "deleted_at";
/// Liveness flag of users.
pub const IS_ACTIVE_FIELD: &str = "is_active";
/// Key of the sub-map merged by [`FoldRule::Update`].
pub const UPDATED_FIELDS_KEY: &str = "updated_fields";

/// A user supplied fold step.
pub type FoldFn = dyn Fn(&mut AggregateState, &Event) -> Result<(), FoldError> + Send + Sync;

/// How a single event changes the state.
#[derive(Clone)]
pub enum FoldRule {
    /// Replaces the state with the payload, then tags it with the id and the liveness flag.
    Create,
    /// Shallow-merges `event_data.updated_fields` into the state.
    Update,
    /// Marks the state as deleted. Every other field is kept.
    Delete,
    /// Leaves the state untouched. The event is still a known, expected fact.
    Ignore,
    /// Runs a custom step.
    Custom(Arc<FoldFn>),
}

impl fmt::Debug for FoldRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FoldRule::Create => f.write_str("Create"),
            FoldRule::Update => f.write_str("Update"),
            FoldRule::Delete => f.write_str("Delete"),
            FoldRule::Ignore => f.write_str("Ignore"),
            FoldRule::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Errors raised while folding events.
#[derive(Debug, thiserror::Error)]
pub enum FoldError {
    /// No rule is registered for the event type and the policy is [`UnknownEventPolicy::Reject`].
    #[error("No fold rule registered for {event_type} (event {event_id})")]
    UnregisteredEventType {
        /// The type that has no rule
        event_type: EventType,
        /// The offending event
        event_id: i64,
    },
    /// The payload doesn't have the shape the rule needs.
    #[error("Malformed payload in {event_type} event {event_id}: {reason}")]
    MalformedPayload {
        /// The type of the offending event
        event_type: EventType,
        /// The offending event
        event_id: i64,
        /// What was wrong with it
        reason: String,
    },
}

impl FoldError {
    fn malformed(event: &Event, reason: impl Into<String>) -> Self {
        FoldError::MalformedPayload {
            event_type: event.event_type,
            event_id: event.id,
            reason: reason.into(),
        }
    }
}

/// The table of fold rules, keyed by event type.
#[derive(Clone, Debug)]
pub struct FoldRegistry {
    rules: HashMap<EventType, FoldRule>,
}

impl Default for FoldRegistry {
    /// The rules for every built-in event type.
    fn default() -> Self {
        Self::empty()
            .register(EventType::ArticleCreated, FoldRule::Create)
            .register(EventType::UserRegistered, FoldRule::Create)
            .register(EventType::ArticleUpdated, FoldRule::Update)
            .register(EventType::UserUpdated, FoldRule::Update)
            .register(EventType::ArticleDeleted, FoldRule::Delete)
            .register(EventType::ArticleViewed, FoldRule::Ignore)
            .register(EventType::ArticleLiked, FoldRule::Ignore)
            .register(EventType::ArticleDisliked, FoldRule::Ignore)
            .register(EventType::LikeRemoved, FoldRule::Ignore)
            .register(EventType::UserLoggedIn, FoldRule::Ignore)
            .register(EventType::UserLoggedOut, FoldRule::Ignore)
    }
}

impl FoldRegistry {
    /// A registry without any rule.
    pub fn empty() -> Self {
        Self {
            rules: HashMap::new(),
        }
    }

    /// Sets the rule of `event_type`, replacing any previous one.
    pub fn register(mut self, event_type: EventType, rule: FoldRule) -> Self {
        self.rules.insert(event_type, rule);
        self
    }

    /// Registers a custom fold step for `event_type`.
    pub fn register_fn<F>(self, event_type: EventType, step: F) -> Self
    where
        F: Fn(&mut AggregateState, &Event) -> Result<(), FoldError> + Send + Sync + 'static,
    {
        self.register(event_type, FoldRule::Custom(Arc::new(step)))
    }

    /// Removes the rule of `event_type`.
    pub fn unregister(mut self, event_type: EventType) -> Self {
        self.rules.remove(&event_type);
        self
    }

    /// The rule of `event_type`, if any.
    pub fn rule(&self, event_type: EventType) -> Option<&FoldRule> {
        self.rules.get(&event_type)
    }

    /// Applies a single event to `state`.
    pub fn apply(
        &self,
        state: &mut AggregateState,
        event: &Event,
        policy: UnknownEventPolicy,
    ) -> Result<(), FoldError> {
        match self.rules.get(&event.event_type) {
            Some(rule) => apply_rule(rule, state, event),
            None => match policy {
                UnknownEventPolicy::Warn => {
                    warn!(
                        "No fold rule for {} (event {}, {} {}), skipping",
                        event.event_type, event.id, event.aggregate_type, event.aggregate_id
                    );
                    Ok(())
                }
                UnknownEventPolicy::Reject => Err(FoldError::UnregisteredEventType {
                    event_type: event.event_type,
                    event_id: event.id,
                }),
            },
        }
    }

    /// Folds `events` in order on top of `state`.
    ///
    /// The result only depends on the inputs, so folding the same list twice gives the same state.
    pub fn fold<'a>(
        &self,
        mut state: AggregateState,
        events: impl IntoIterator<Item = &'a Event>,
        policy: UnknownEventPolicy,
    ) -> Result<AggregateState, FoldError> {
        for event in events {
            self.apply(&mut state, event, policy)?;
        }
        Ok(state)
    }
}

fn apply_rule(rule: &FoldRule, state: &mut AggregateState, event: &Event) -> Result<(), FoldError> {
    match rule {
        FoldRule::Create => {
            let Value::Object(fields) = &event.event_data else {
                return Err(FoldError::malformed(event, "create payload is not an object"));
            };
            *state = fields.clone();
            state.insert(ID_FIELD.to_string(), Value::from(event.aggregate_id));
            match event.aggregate_type {
                AggregateType::Article => {
                    state.insert(IS_DELETED_FIELD.to_string(), Value::Bool(false));
                }
                AggregateType::User => {
                    state.insert(IS_ACTIVE_FIELD.to_string(), Value::Bool(true));
                }
            }
        }
        FoldRule::Update => match event.event_data.get(UPDATED_FIELDS_KEY) {
            Some(Value::Object(updated)) => {
                for (key, value) in updated {
                    state.insert(key.clone(), value.clone());
                }
            }
            Some(_) => {
                return Err(FoldError::malformed(event, "updated_fields is not an object"));
            }
            None => {
                debug!(
                    "{} event {} carries no updated_fields, nothing to merge",
                    event.event_type, event.id
                );
            }
        },
        FoldRule::Delete => {
            state.insert(IS_DELETED_FIELD.to_string(), Value::Bool(true));
            state.insert(
                DELETED_AT_FIELD.to_string(),
                Value::String(event.created_at.to_rfc3339()),
            );
        }
        FoldRule::Ignore => {}
        FoldRule::Custom(step) => step(state, event)?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::NewEvent;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn persisted(id: i64, event: NewEvent) -> Event {
        let created_at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, id as u32).unwrap();
        Event::from_new(id, created_at, event)
    }

    fn fields(value: Value) -> serde_json::Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    fn fold_all(events: &[Event]) -> AggregateState {
        FoldRegistry::default()
            .fold(AggregateState::new(), events, UnknownEventPolicy::Reject)
            .unwrap()
    }

    #[test]
    fn create_then_update_merges_updated_fields() {
        init_logger();
        let events = vec![
            persisted(
                1,
                NewEvent::article_created(42, json!({"title": "A", "category": "tech"}))
                    .version(1)
                    .build()
                    .unwrap(),
            ),
            persisted(
                2,
                NewEvent::article_updated(42, fields(json!({"category": "science"})))
                    .version(2)
                    .build()
                    .unwrap(),
            ),
        ];

        let state = fold_all(&events);

        assert_eq!(
            Value::Object(state),
            json!({"title": "A", "category": "science", "id": 42, "is_deleted": false})
        );
    }

    #[test]
    fn update_only_touches_listed_fields() {
        init_logger();
        let events = vec![
            persisted(
                1,
                NewEvent::article_created(1, json!({"title": "A", "body": "text", "views": 3}))
                    .build()
                    .unwrap(),
            ),
            persisted(
                2,
                NewEvent::article_updated(1, fields(json!({"title": "X"})))
                    .build()
                    .unwrap(),
            ),
        ];

        let state = fold_all(&events);

        assert_eq!(state["title"], json!("X"));
        assert_eq!(state["body"], json!("text"));
        assert_eq!(state["views"], json!(3));
    }

    #[test]
    fn delete_keeps_created_fields() {
        init_logger();
        let events = vec![
            persisted(
                1,
                NewEvent::article_created(9, json!({"title": "Gone"}))
                    .build()
                    .unwrap(),
            ),
            persisted(2, NewEvent::article_deleted(9).build().unwrap()),
        ];

        let state = fold_all(&events);

        assert_eq!(state["is_deleted"], json!(true));
        assert_eq!(state["title"], json!("Gone"));
        assert_eq!(state["id"], json!(9));
        assert_eq!(state["deleted_at"], json!(events[1].created_at.to_rfc3339()));
    }

    #[test]
    fn registered_users_are_active() {
        init_logger();
        let events = vec![persisted(
            1,
            NewEvent::user_registered(5, json!({"username": "ada"}))
                .build()
                .unwrap(),
        )];

        let state = fold_all(&events);

        assert_eq!(
            Value::Object(state),
            json!({"username": "ada", "id": 5, "is_active": true})
        );
    }

    #[test]
    fn informational_events_leave_state_untouched() {
        init_logger();
        let created = persisted(
            1,
            NewEvent::article_created(3, json!({"title": "T"}))
                .build()
                .unwrap(),
        );
        let before = fold_all(std::slice::from_ref(&created));
        let events = vec![
            created,
            persisted(2, NewEvent::article_viewed(3, 8).build().unwrap()),
            persisted(3, NewEvent::article_liked(3, 8).build().unwrap()),
            persisted(4, NewEvent::like_removed(3, 8).build().unwrap()),
        ];

        assert_eq!(fold_all(&events), before);
    }

    #[test]
    fn fold_is_deterministic() {
        init_logger();
        let events = vec![
            persisted(
                1,
                NewEvent::article_created(4, json!({"title": "A"}))
                    .build()
                    .unwrap(),
            ),
            persisted(
                2,
                NewEvent::article_updated(4, fields(json!({"title": "B"})))
                    .build()
                    .unwrap(),
            ),
            persisted(3, NewEvent::article_deleted(4).build().unwrap()),
        ];

        assert_eq!(fold_all(&events), fold_all(&events));
    }

    #[test]
    fn unregistered_type_is_rejected_or_skipped_per_policy() {
        init_logger();
        let registry = FoldRegistry::default().unregister(EventType::ArticleViewed);
        let events = vec![persisted(7, NewEvent::article_viewed(1, 2).build().unwrap())];

        let rejected = registry.fold(AggregateState::new(), &events, UnknownEventPolicy::Reject);
        assert!(matches!(
            rejected,
            Err(FoldError::UnregisteredEventType {
                event_type: EventType::ArticleViewed,
                event_id: 7
            })
        ));

        let skipped = registry
            .fold(AggregateState::new(), &events, UnknownEventPolicy::Warn)
            .unwrap();
        assert!(skipped.is_empty());
    }

    #[test]
    fn create_with_non_object_payload_is_malformed() {
        init_logger();
        let events = vec![persisted(
            1,
            NewEvent::article_created(1, json!("just a title"))
                .build()
                .unwrap(),
        )];

        let result =
            FoldRegistry::default().fold(AggregateState::new(), &events, UnknownEventPolicy::Warn);

        assert!(matches!(result, Err(FoldError::MalformedPayload { event_id: 1, .. })));
    }

    #[test]
    fn update_without_updated_fields_is_a_no_op() {
        init_logger();
        let created = persisted(
            1,
            NewEvent::article_created(1, json!({"title": "A"}))
                .build()
                .unwrap(),
        );
        let update = persisted(
            2,
            NewEvent::builder()
                .event_type(EventType::ArticleUpdated)
                .aggregate_id(1)
                .event_data(json!({"title": "ignored"}))
                .build()
                .unwrap(),
        );

        let state = fold_all(&[created, update]);

        assert_eq!(state["title"], json!("A"));
    }

    #[test]
    fn custom_rule_counts_likes() {
        init_logger();
        let registry = FoldRegistry::default().register_fn(EventType::ArticleLiked, |state, _| {
            let likes = state.get("likes").and_then(Value::as_i64).unwrap_or(0);
            state.insert("likes".to_string(), json!(likes + 1));
            Ok(())
        });
        let events = vec![
            persisted(
                1,
                NewEvent::article_created(2, json!({"title": "A"}))
                    .build()
                    .unwrap(),
            ),
            persisted(2, NewEvent::article_liked(2, 10).build().unwrap()),
            persisted(3, NewEvent::article_liked(2, 11).build().unwrap()),
        ];

        let state = registry
            .fold(AggregateState::new(), &events, UnknownEventPolicy::Reject)
            .unwrap();

        assert_eq!(state["likes"], json!(2));
    }
}
