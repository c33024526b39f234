//! JSON envelopes: `{"data": ...}` for one item, `{"data": [...], "meta": {"count": n}}` for lists.

use axum::{http::StatusCode, Json};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ListMeta>,
}

#[derive(Debug, Serialize)]
pub struct ListMeta {
    pub count: usize,
}

pub type Reply<T> = (StatusCode, Json<Envelope<T>>);

fn reply<T: Serialize>(status: StatusCode, data: T, meta: Option<ListMeta>) -> Reply<T> {
    (status, Json(Envelope { data, meta }))
}

pub fn reply_ok<T: Serialize>(data: T) -> Reply<T> {
    reply(StatusCode::OK, data, None)
}

pub fn reply_created<T: Serialize>(data: T) -> Reply<T> {
    reply(StatusCode::CREATED, data, None)
}

pub fn reply_list<T: Serialize>(items: Vec<T>) -> Reply<Vec<T>> {
    let count = items.len();
    reply(StatusCode::OK, items, Some(ListMeta { count }))
}
