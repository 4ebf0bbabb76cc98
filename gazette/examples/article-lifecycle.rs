use gazette::prelude::*;
use serde_json::{Map, Value, json};

fn fields(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    // Views are informational by default; count them instead.
    let registry = FoldRegistry::default().register_fn(EventType::ArticleViewed, |state, _| {
        let views = state.get("views").and_then(Value::as_u64).unwrap_or(0);
        state.insert("views".to_string(), json!(views + 1));
        Ok(())
    });
    let log = EventLog::with_registry(
        InMemoryEventStore::new(),
        registry,
        EventLogConfig::default(),
    );

    let article_id = 42;
    log.save_event(
        NewEvent::article_created(article_id, json!({"title": "Hello", "category": "tech"}))
            .version(1)
            .build()?,
    )
    .await?;
    log.save_event(
        NewEvent::article_updated(article_id, fields(json!({"category": "science"})))
            .version(2)
            .build()?,
    )
    .await?;
    for (version, reader) in [(3, 7), (4, 8)] {
        log.save_event(
            NewEvent::article_viewed(article_id, reader)
                .version(version)
                .build()?,
        )
        .await?;
    }

    let state = log.replay_events(AggregateType::Article, article_id).await?;
    log::info!("Article before checkpoint: {:?}", state);

    if let Some(snapshot_id) = log.checkpoint(AggregateType::Article, article_id).await? {
        log::info!("Stored snapshot {}", snapshot_id);
    }

    log.save_event(
        NewEvent::article_deleted(article_id)
            .version(5)
            .user_id(7)
            .build()?,
    )
    .await?;

    let state = log.replay_events(AggregateType::Article, article_id).await?;
    println!("{}", serde_json::to_string_pretty(&state)?);

    let feed = log.get_events_since(0, 100).await?;
    for event in feed {
        println!("#{} {} {}", event.id, event.event_type, event.aggregate_id);
    }

    Ok(())
}
