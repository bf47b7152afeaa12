use chrono::NaiveDate;
use serde::Serialize;
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PathCount {
    pub path: String,
    pub views: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ReferrerCount {
    pub referrer: String,
    pub views: i64,
}

#[derive(Debug, Clone, Serialize, FromRow, PartialEq)]
pub struct DailyCount {
    pub day: NaiveDate,
    pub views: i64,
    pub visitors: i64,
}
