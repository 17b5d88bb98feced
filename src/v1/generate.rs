use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::stream::{Stream, StreamExt};
use std::convert::Infallible;

use crate::error::{ApiError, ApiJson, Result};
use crate::proxy::{GenerateOutcome, GenerateRequest, StreamItem};
use crate::AppState;

/// Non-streaming generation. The HTTP status is 200 whatever the backend did;
/// `success` carries the outcome.
pub async fn generate(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<GenerateRequest>,
) -> Json<GenerateOutcome> {
    let outcome = state.proxy.generate(&req).await;
    if let Some(log_entry) = &outcome.log_entry {
        state.logs.append(log_entry.clone()).await;
    }
    Json(outcome)
}

/// Server-sent events: `token` events while the backend produces text, an
/// `error` event on failure, and a final `done` event carrying the log entry.
pub async fn generate_stream(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<GenerateRequest>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    let entry = state
        .proxy
        .lookup(&req.registry_id)
        .await
        .map_err(|e| ApiError::NotFound(e.to_string()))?;

    let logs = state.logs.clone();
    let events = state
        .proxy
        .clone()
        .into_stream(entry, req)
        .then(move |item| {
            let logs = logs.clone();
            async move {
                let event = match item {
                    StreamItem::Token(token) => Event::default().event("token").json_data(token),
                    StreamItem::Failed(detail) => Event::default().event("error").json_data(detail),
                    StreamItem::Finished(log_entry) => {
                        let stored = logs.append(log_entry).await;
                        Event::default().event("done").json_data(stored)
                    }
                };
                Ok(event.unwrap_or_else(|e| Event::default().event("error").data(e.to_string())))
            }
        });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
