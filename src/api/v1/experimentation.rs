//! Experimentation endpoint handlers

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{Stream, StreamExt};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, warn};

use crate::api::state::AppState;
use crate::api::types::{ApiError, ExperimentationTestResponse, Json};
use crate::domain::experimentation::{ExperimentationTest, ExperimentationTestName};
use crate::domain::DomainError;

const STREAM_EVENT: &str = "experimentation";

fn parse_name(name: &str) -> Result<ExperimentationTestName, ApiError> {
    ExperimentationTestName::new(name)
        .map_err(|e| ApiError::from(DomainError::from(e)).with_param("name"))
}

fn no_decision(name: &ExperimentationTestName) -> ApiError {
    ApiError::not_found(format!("No decision for experimentation test '{}'", name))
}

/// GET /v1/experiments/{name}
pub async fn get_experimentation_test(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ExperimentationTestResponse>, ApiError> {
    let name = parse_name(&name)?;
    debug!(test_name = %name, "Getting experimentation test");

    let test = state
        .experimentation
        .get_experimentation_test(&name)
        .await?
        .ok_or_else(|| no_decision(&name))?;

    Ok(Json(ExperimentationTestResponse::from_domain(&test)))
}

/// POST /v1/experiments/{name}/refresh
pub async fn refresh_experimentation_test(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ExperimentationTestResponse>, ApiError> {
    let name = parse_name(&name)?;
    debug!(test_name = %name, "Refreshing experimentation test");

    let test = state
        .experimentation
        .refresh(&name)
        .await?
        .ok_or_else(|| no_decision(&name))?;

    Ok(Json(ExperimentationTestResponse::from_domain(&test)))
}

/// GET /v1/experiments/{name}/stream
///
/// Sends the current value when one exists, then every later update. A slow
/// client skips intermediate values and always receives the latest one. The
/// subscription ends when the client disconnects.
pub async fn stream_experimentation_test(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let name = parse_name(&name)?;
    let (tx, rx) = watch::channel(None::<ExperimentationTest>);
    let tx = Arc::new(tx);

    let subscription = {
        let tx = Arc::clone(&tx);
        state.experimentation.subscribe(
            &name,
            Arc::new(move |test: &ExperimentationTest| {
                tx.send_replace(Some(test.clone()));
            }),
        )
    };

    // Subscribed first, so a value delivered in the meantime is newer
    if let Some(test) = state.experimentation.get_experimentation_test(&name).await? {
        tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(test);
            true
        });
    }

    debug!(test_name = %name, "Experimentation stream opened");

    let stream = latest_values(rx).filter_map(move |test| {
        // Dropping the stream drops the subscription
        let _subscription = &subscription;
        futures::future::ready(to_event(&test).map(Ok::<_, Infallible>))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Current value, then each newer one; values replaced before being read are skipped
fn latest_values(
    rx: watch::Receiver<Option<ExperimentationTest>>,
) -> impl Stream<Item = ExperimentationTest> {
    WatchStream::new(rx).filter_map(futures::future::ready)
}

fn to_event(test: &ExperimentationTest) -> Option<Event> {
    let response = ExperimentationTestResponse::from_domain(test);

    match Event::default().event(STREAM_EVENT).json_data(&response) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!(test_name = %test.name(), error = %e, "Failed to encode stream event");
            None
        }
    }
}
