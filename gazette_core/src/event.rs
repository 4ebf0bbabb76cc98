//! This module defines the `Event` record persisted by the log, the `NewEvent` a producer hands to
//! a store, and the `EventBuilder` used to assemble one. It also defines the closed sets of event
//! and aggregate types together with their string forms.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// The kind of entity an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AggregateType {
    /// A news article
    Article,
    /// A registered reader
    User,
}

impl AggregateType {
    /// Every aggregate type known to the log.
    pub const ALL: [AggregateType; 2] = [AggregateType::Article, AggregateType::User];

    /// The name stored in the `aggregate_type` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateType::Article => "Article",
            AggregateType::User => "User",
        }
    }
}

impl fmt::Display for AggregateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a stored aggregate type name is not one of [`AggregateType::ALL`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown aggregate type: {0}")]
pub struct ParseAggregateTypeError(pub String);

impl FromStr for AggregateType {
    type Err = ParseAggregateTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AggregateType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ParseAggregateTypeError(s.to_string()))
    }
}

impl TryFrom<String> for AggregateType {
    type Error = ParseAggregateTypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AggregateType> for String {
    fn from(value: AggregateType) -> Self {
        value.as_str().to_string()
    }
}

/// Event type tag
///
/// The type of an event in PascalCase, like `ArticleCreated` or `UserLoggedIn`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EventType {
    /// An article was published
    ArticleCreated,
    /// Some fields of an article changed
    ArticleUpdated,
    /// An article was (soft) deleted
    ArticleDeleted,
    /// A reader opened an article
    ArticleViewed,
    /// A new reader signed up
    UserRegistered,
    /// A reader logged in
    UserLoggedIn,
    /// A reader logged out
    UserLoggedOut,
    /// Some fields of a reader profile changed
    UserUpdated,
    /// A reader liked an article
    ArticleLiked,
    /// A reader disliked an article
    ArticleDisliked,
    /// A reader withdrew a like or dislike
    LikeRemoved,
}

impl EventType {
    /// Every event type known to the log.
    pub const ALL: [EventType; 11] = [
        EventType::ArticleCreated,
        EventType::ArticleUpdated,
        EventType::ArticleDeleted,
        EventType::ArticleViewed,
        EventType::UserRegistered,
        EventType::UserLoggedIn,
        EventType::UserLoggedOut,
        EventType::UserUpdated,
        EventType::ArticleLiked,
        EventType::ArticleDisliked,
        EventType::LikeRemoved,
    ];

    /// The name stored in the `event_type` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::ArticleCreated => "ArticleCreated",
            EventType::ArticleUpdated => "ArticleUpdated",
            EventType::ArticleDeleted => "ArticleDeleted",
            EventType::ArticleViewed => "ArticleViewed",
            EventType::UserRegistered => "UserRegistered",
            EventType::UserLoggedIn => "UserLoggedIn",
            EventType::UserLoggedOut => "UserLoggedOut",
            EventType::UserUpdated => "UserUpdated",
            EventType::ArticleLiked => "ArticleLiked",
            EventType::ArticleDisliked => "ArticleDisliked",
            EventType::LikeRemoved => "LikeRemoved",
        }
    }

    /// The aggregate this kind of event is recorded against.
    ///
    /// Likes, dislikes and views are facts about the article, with the reader kept in `user_id`.
    pub fn aggregate_type(&self) -> AggregateType {
        match self {
            EventType::UserRegistered
            | EventType::UserLoggedIn
            | EventType::UserLoggedOut
            | EventType::UserUpdated => AggregateType::User,
            _ => AggregateType::Article,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a stored event type name is not one of [`EventType::ALL`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown event type: {0}")]
pub struct ParseEventTypeError(pub String);

impl FromStr for EventType {
    type Err = ParseEventTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ParseEventTypeError(s.to_string()))
    }
}

impl TryFrom<String> for EventType {
    type Error = ParseEventTypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EventType> for String {
    fn from(value: EventType) -> Self {
        value.as_str().to_string()
    }
}

/// An event that has not been persisted yet.
///
/// Producers build one of these and hand it to a store, which assigns the `id` and `created_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEvent {
    /// Event type
    pub event_type: EventType,

    /// The kind of entity this event aggregates to
    pub aggregate_type: AggregateType,

    /// The id of the entity this event aggregates to
    pub aggregate_id: i64,

    /// Payload specific to the event type
    pub event_data: Value,

    /// Provenance information, if any
    pub metadata: Option<Value>,

    /// The id of the reader that caused this event
    pub user_id: Option<i64>,

    /// Sequence number supplied by the producer. Not checked by the stores.
    pub version: u64,
}

impl NewEvent {
    /// Creates a new `EventBuilder` instance.
    pub fn builder() -> EventBuilder {
        EventBuilder::new()
    }

    /// An `ArticleCreated` builder carrying the article fields.
    pub fn article_created(article_id: i64, fields: Value) -> EventBuilder {
        EventBuilder::for_type(EventType::ArticleCreated, article_id).event_data(fields)
    }

    /// An `ArticleUpdated` builder. `updated_fields` is wrapped the way the update fold expects it.
    pub fn article_updated(article_id: i64, updated_fields: Map<String, Value>) -> EventBuilder {
        EventBuilder::for_type(EventType::ArticleUpdated, article_id)
            .event_data(updated_fields_payload(updated_fields))
    }

    /// An `ArticleDeleted` builder.
    pub fn article_deleted(article_id: i64) -> EventBuilder {
        EventBuilder::for_type(EventType::ArticleDeleted, article_id)
    }

    /// An `ArticleViewed` builder for the given reader.
    pub fn article_viewed(article_id: i64, user_id: i64) -> EventBuilder {
        EventBuilder::for_type(EventType::ArticleViewed, article_id).user_id(user_id)
    }

    /// An `ArticleLiked` builder for the given reader.
    pub fn article_liked(article_id: i64, user_id: i64) -> EventBuilder {
        EventBuilder::for_type(EventType::ArticleLiked, article_id).user_id(user_id)
    }

    /// An `ArticleDisliked` builder for the given reader.
    pub fn article_disliked(article_id: i64, user_id: i64) -> EventBuilder {
        EventBuilder::for_type(EventType::ArticleDisliked, article_id).user_id(user_id)
    }

    /// A `LikeRemoved` builder for the given reader.
    pub fn like_removed(article_id: i64, user_id: i64) -> EventBuilder {
        EventBuilder::for_type(EventType::LikeRemoved, article_id).user_id(user_id)
    }

    /// A `UserRegistered` builder carrying the profile fields. The reader is its own actor.
    pub fn user_registered(user_id: i64, fields: Value) -> EventBuilder {
        EventBuilder::for_type(EventType::UserRegistered, user_id)
            .event_data(fields)
            .user_id(user_id)
    }

    /// A `UserUpdated` builder.
    pub fn user_updated(user_id: i64, updated_fields: Map<String, Value>) -> EventBuilder {
        EventBuilder::for_type(EventType::UserUpdated, user_id)
            .event_data(updated_fields_payload(updated_fields))
            .user_id(user_id)
    }

    /// A `UserLoggedIn` builder.
    pub fn user_logged_in(user_id: i64) -> EventBuilder {
        EventBuilder::for_type(EventType::UserLoggedIn, user_id).user_id(user_id)
    }

    /// A `UserLoggedOut` builder.
    pub fn user_logged_out(user_id: i64) -> EventBuilder {
        EventBuilder::for_type(EventType::UserLoggedOut, user_id).user_id(user_id)
    }
}

fn updated_fields_payload(updated_fields: Map<String, Value>) -> Value {
    let mut payload = Map::new();
    payload.insert("updated_fields".to_string(), Value::Object(updated_fields));
    Value::Object(payload)
}

/// Event definition
///
/// A persisted event. Never modified once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Event ID, assigned by the store. Grows with every append.
    pub id: i64,

    /// Event type
    pub event_type: EventType,

    /// The kind of entity this event aggregates to
    pub aggregate_type: AggregateType,

    /// The id of the entity this event aggregates to
    pub aggregate_id: i64,

    /// Event data
    pub event_data: Value,

    /// Provenance information, if any
    pub metadata: Option<Value>,

    /// The ID of the creator of this event
    pub user_id: Option<i64>,

    /// The time at which this event was persisted
    pub created_at: DateTime<Utc>,

    /// The version number supplied by the producer
    pub version: u64,
}

impl Event {
    /// Turns a `NewEvent` into its persisted form once the store has assigned an id and timestamp.
    pub fn from_new(id: i64, created_at: DateTime<Utc>, event: NewEvent) -> Self {
        Event {
            id,
            event_type: event.event_type,
            aggregate_type: event.aggregate_type,
            aggregate_id: event.aggregate_id,
            event_data: event.event_data,
            metadata: event.metadata,
            user_id: event.user_id,
            created_at,
            version: event.version,
        }
    }
}

/// Builder for `NewEvent`
#[derive(Debug, Default)]
pub struct EventBuilder {
    /// The event type.
    pub event_type: Option<EventType>,
    /// The aggregate type. Defaults to the natural aggregate of the event type.
    pub aggregate_type: Option<AggregateType>,
    /// The aggregate id.
    pub aggregate_id: Option<i64>,
    /// The event data.
    pub event_data: Option<Value>,
    /// The provenance metadata.
    pub metadata: Option<Value>,
    /// The ID of the creator of this event.
    pub user_id: Option<i64>,
    /// The version of the event.
    pub version: Option<u64>,
}

impl EventBuilder {
    /// Creates a new `EventBuilder` instance with all fields set to `None`.
    pub fn new() -> Self {
        Self::default()
    }

    fn for_type(event_type: EventType, aggregate_id: i64) -> Self {
        Self::new().event_type(event_type).aggregate_id(aggregate_id)
    }

    /// Sets the event type.
    pub fn event_type(mut self, event_type: EventType) -> Self {
        self.event_type = Some(event_type);
        self
    }

    /// Sets the aggregate type.
    pub fn aggregate_type(mut self, aggregate_type: AggregateType) -> Self {
        self.aggregate_type = Some(aggregate_type);
        self
    }

    /// Sets the aggregate id.
    pub fn aggregate_id(mut self, aggregate_id: i64) -> Self {
        self.aggregate_id = Some(aggregate_id);
        self
    }

    /// Sets the data payload for the event.
    pub fn event_data(mut self, event_data: Value) -> Self {
        self.event_data = Some(event_data);
        self
    }

    /// Sets the provenance metadata.
    pub fn metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Sets the actor.
    pub fn user_id(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Sets the version.
    pub fn version(mut self, version: u64) -> Self {
        self.version = Some(version);
        self
    }

    /// Builds the `NewEvent` from the `EventBuilder`.
    ///
    /// # Errors
    ///
    /// Returns an error if `event_type` or `aggregate_id` are not set.
    pub fn build(self) -> Result<NewEvent, EventBuilderError> {
        let event_type = self.event_type.ok_or(EventBuilderError::EventTypeMissing)?;
        Ok(NewEvent {
            event_type,
            aggregate_type: self
                .aggregate_type
                .unwrap_or_else(|| event_type.aggregate_type()),
            aggregate_id: self
                .aggregate_id
                .ok_or(EventBuilderError::AggregateIdMissing)?,
            event_data: self
                .event_data
                .unwrap_or_else(|| Value::Object(Map::new())),
            metadata: self.metadata,
            user_id: self.user_id,
            version: self.version.unwrap_or(0),
        })
    }
}

/// Errors that can occur when building a `NewEvent`.
#[derive(Debug, thiserror::Error)]
pub enum EventBuilderError {
    /// The event type is missing.
    #[error("Event type is required")]
    EventTypeMissing,
    /// The aggregate id is missing.
    #[error("Aggregate id is required")]
    AggregateIdMissing,
}
