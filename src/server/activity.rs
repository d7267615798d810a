//! ActivityPub routes. Discord reads these for the footer branding and the
//! author line; browsers following the same links are redirected.

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde_json::Value;

use super::{found, AppState};
use crate::render::{self, ActivityData, PROVIDER_URL};

const ACTIVITY_JSON: &str = "application/activity+json; charset=utf-8";

fn wants_activity(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| {
            accept.contains("application/activity+json") || accept.contains("application/ld+json")
        })
}

fn activity_json(doc: Value) -> Response {
    ([(header::CONTENT_TYPE, ACTIVITY_JSON)], Json(doc)).into_response()
}

pub(super) async fn note(
    State(state): State<AppState>,
    Path(encoded): Path<String>,
    headers: HeaderMap,
) -> Response {
    let data = ActivityData::decode(&encoded);
    if data.is_none() {
        tracing::debug!(encoded = %encoded, "undecodable activity data");
    }

    if wants_activity(&headers) {
        let data = data.unwrap_or_default();
        return activity_json(render::activity_note(
            &data,
            &encoded,
            state.config(),
            Utc::now(),
        ));
    }

    match data.map(|d| d.u).filter(|u| !u.is_empty()) {
        Some(original) => found(&original),
        None => found(&format!("{PROVIDER_URL}/")),
    }
}

pub(super) async fn actor(State(state): State<AppState>, Path(encoded): Path<String>) -> Response {
    let data = ActivityData::decode(&encoded).unwrap_or_default();
    activity_json(render::activity_actor(&data, &encoded, state.config()))
}

pub(super) async fn legacy_status(
    Path((author, status)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    if wants_activity(&headers) {
        activity_json(render::legacy_status(&author, &status, Utc::now()))
    } else {
        found(&format!("{PROVIDER_URL}/"))
    }
}

pub(super) async fn legacy_actor(
    State(state): State<AppState>,
    Path(author): Path<String>,
    headers: HeaderMap,
) -> Response {
    if wants_activity(&headers) {
        activity_json(render::legacy_actor(&author, state.config()))
    } else {
        found(&format!("{PROVIDER_URL}/"))
    }
}
