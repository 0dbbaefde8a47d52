//! Response helpers for the list and create contracts.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

pub const TOTAL_COUNT_HEADER: &str = "X-Total-Count";
pub const ENTITY_ID_HEADER: &str = "X-Entity-ID";
pub const STATUS_CODE_HEADER: &str = "X-Status-Code";
pub const EXPOSE_HEADERS: &str = "Access-Control-Expose-Headers";
pub const LOCATION_HEADER: &str = "Location";

/// 200 with a bare JSON array and the unpaginated match count in `X-Total-Count`.
pub fn list_response<T: Serialize>(rows: Vec<T>, total: i64) -> Response {
    (
        StatusCode::OK,
        [
            (EXPOSE_HEADERS, TOTAL_COUNT_HEADER.to_string()),
            (TOTAL_COUNT_HEADER, total.to_string()),
        ],
        Json(rows),
    )
        .into_response()
}

/// 201 with the created row, `Location: <entity>/<id>` and the new id.
pub fn created_response<T: Serialize>(entity: &str, id: i64, row: T) -> Response {
    (
        StatusCode::CREATED,
        [
            (EXPOSE_HEADERS, format!("{}, {}", STATUS_CODE_HEADER, ENTITY_ID_HEADER)),
            (LOCATION_HEADER, format!("{}/{}", entity, id)),
            (STATUS_CODE_HEADER, StatusCode::CREATED.as_u16().to_string()),
            (ENTITY_ID_HEADER, id.to_string()),
        ],
        Json(row),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_response_carries_total_count() {
        let resp = list_response(vec![1, 2], 3);
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["x-total-count"], "3");
        assert_eq!(resp.headers()["access-control-expose-headers"], "X-Total-Count");
    }

    #[test]
    fn created_response_points_at_the_new_row() {
        let resp = created_response("post", 12, serde_json::json!({"id": 12}));
        assert_eq!(resp.status(), StatusCode::CREATED);
        assert_eq!(resp.headers()["location"], "post/12");
        assert_eq!(resp.headers()["x-entity-id"], "12");
        assert_eq!(resp.headers()["x-status-code"], "201");
    }
}
