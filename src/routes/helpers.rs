use std::str::FromStr;

use axum::{Json, extract::FromRequest};
use chrono::{DateTime as ChronoDateTime, NaiveDate, Utc};
use mongodb::bson::{DateTime, oid::ObjectId};

use crate::{
    error::{ApiError, ApiResult},
    period::local_midnight,
};

/// `Json` whose rejection renders as a validation error.
#[derive(FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

pub(super) fn parse_id(raw: &str) -> ApiResult<ObjectId> {
    ObjectId::from_str(raw.trim()).map_err(|_| ApiError::validation("รหัสอ้างอิงไม่ถูกต้อง"))
}

pub(super) fn parse_opt_id(raw: Option<&str>) -> ApiResult<Option<ObjectId>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => parse_id(raw).map(Some),
        None => Ok(None),
    }
}

/// Parses a field value, mapping failure to a validation error naming the field.
pub(super) fn parse_opt<T: FromStr>(raw: Option<&str>, field: &str) -> ApiResult<Option<T>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| ApiError::validation(format!("ค่า {field} ไม่ถูกต้อง"))),
        None => Ok(None),
    }
}

/// Accepts RFC 3339 or a bare `YYYY-MM-DD`, which is taken as local midnight.
/// Missing means now.
pub(super) fn parse_instant(raw: Option<&str>) -> ApiResult<DateTime> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(DateTime::now());
    };
    if let Ok(dt) = ChronoDateTime::parse_from_rfc3339(raw) {
        return Ok(DateTime::from_chrono(dt.with_timezone(&Utc)));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(|date| DateTime::from_chrono(local_midnight(date)))
        .map_err(|_| ApiError::validation("รูปแบบวันที่ไม่ถูกต้อง"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BillStatus;

    #[test]
    fn ids_must_be_hex() {
        assert!(parse_id("zzz").is_err());
        let id = ObjectId::new();
        assert_eq!(parse_id(&id.to_hex()).unwrap(), id);
        assert_eq!(parse_opt_id(Some(" ")).unwrap(), None);
    }

    #[test]
    fn optional_values_parse_or_fail_with_validation() {
        assert_eq!(
            parse_opt::<BillStatus>(Some("overdue"), "status").unwrap(),
            Some(BillStatus::Overdue)
        );
        assert!(matches!(
            parse_opt::<BillStatus>(Some("late"), "status"),
            Err(ApiError::Validation(_))
        ));
        assert_eq!(parse_opt::<i32>(None, "month").unwrap(), None);
    }

    #[test]
    fn bare_dates_are_local_midnight() {
        let dt = parse_instant(Some("2024-03-25")).unwrap();
        assert_eq!(
            dt.to_chrono().to_rfc3339(),
            "2024-03-24T17:00:00+00:00"
        );
        assert!(parse_instant(Some("25/03/2024")).is_err());
    }
}
