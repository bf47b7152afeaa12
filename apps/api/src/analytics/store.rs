use chrono::{DateTime, Duration, NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::analytics::{DailyCount, PathCount, ReferrerCount};

const TOP_LIMIT: i64 = 10;

/// A page view that passed the ingestion filters.
#[derive(Debug, Clone)]
pub struct NewVisitorEvent {
    pub visitor_id: String,
    pub path: String,
    pub referrer: Option<String>,
    pub utm_source: Option<String>,
    pub user_agent: Option<String>,
}

pub async fn insert_event(pool: &PgPool, event: &NewVisitorEvent) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO visitor_events (id, visitor_id, path, referrer, utm_source, user_agent)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&event.visitor_id)
    .bind(&event.path)
    .bind(&event.referrer)
    .bind(&event.utm_source)
    .bind(&event.user_agent)
    .execute(pool)
    .await?;
    Ok(())
}

/// Page views and distinct visitors since `since`.
pub async fn totals(pool: &PgPool, since: DateTime<Utc>) -> Result<(i64, i64), sqlx::Error> {
    sqlx::query_as::<_, (i64, i64)>(
        "SELECT COUNT(*), COUNT(DISTINCT visitor_id) FROM visitor_events WHERE created_at >= $1",
    )
    .bind(since)
    .fetch_one(pool)
    .await
}

pub async fn top_pages(pool: &PgPool, since: DateTime<Utc>) -> Result<Vec<PathCount>, sqlx::Error> {
    sqlx::query_as::<_, PathCount>(
        r#"
        SELECT path, COUNT(*) AS views
        FROM visitor_events
        WHERE created_at >= $1
        GROUP BY path
        ORDER BY views DESC, path ASC
        LIMIT $2
        "#,
    )
    .bind(since)
    .bind(TOP_LIMIT)
    .fetch_all(pool)
    .await
}

pub async fn top_referrers(
    pool: &PgPool,
    since: DateTime<Utc>,
) -> Result<Vec<ReferrerCount>, sqlx::Error> {
    sqlx::query_as::<_, ReferrerCount>(
        r#"
        SELECT referrer, COUNT(*) AS views
        FROM visitor_events
        WHERE created_at >= $1 AND referrer IS NOT NULL AND referrer <> ''
        GROUP BY referrer
        ORDER BY views DESC, referrer ASC
        LIMIT $2
        "#,
    )
    .bind(since)
    .bind(TOP_LIMIT)
    .fetch_all(pool)
    .await
}

/// Days with at least one event, in UTC calendar days.
pub async fn daily_counts(
    pool: &PgPool,
    since: DateTime<Utc>,
) -> Result<Vec<DailyCount>, sqlx::Error> {
    sqlx::query_as::<_, DailyCount>(
        r#"
        SELECT (created_at AT TIME ZONE 'UTC')::date AS day,
               COUNT(*) AS views,
               COUNT(DISTINCT visitor_id) AS visitors
        FROM visitor_events
        WHERE created_at >= $1
        GROUP BY day
        ORDER BY day ASC
        "#,
    )
    .bind(since)
    .fetch_all(pool)
    .await
}

/// One entry per day from `start` to `end` inclusive; days without traffic
/// read as zero.
pub fn fill_daily_series(rows: &[DailyCount], start: NaiveDate, end: NaiveDate) -> Vec<DailyCount> {
    let mut series = Vec::new();
    let mut day = start;
    while day <= end {
        let entry = rows
            .iter()
            .find(|r| r.day == day)
            .cloned()
            .unwrap_or(DailyCount {
                day,
                views: 0,
                visitors: 0,
            });
        series.push(entry);
        day += Duration::days(1);
    }
    series
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_gaps_are_zero_filled() {
        let rows = vec![
            DailyCount {
                day: date(2024, 2, 28),
                views: 5,
                visitors: 3,
            },
            DailyCount {
                day: date(2024, 3, 1),
                views: 2,
                visitors: 2,
            },
        ];
        let series = fill_daily_series(&rows, date(2024, 2, 27), date(2024, 3, 1));
        assert_eq!(series.len(), 4);
        assert_eq!(series[0].views, 0);
        assert_eq!(series[1], rows[0]);
        assert_eq!(
            series[2],
            DailyCount {
                day: date(2024, 2, 29),
                views: 0,
                visitors: 0
            }
        );
        assert_eq!(series[3], rows[1]);
    }

    #[test]
    fn test_single_day_range() {
        let series = fill_daily_series(&[], date(2024, 1, 1), date(2024, 1, 1));
        assert_eq!(series.len(), 1);
    }

    #[test]
    fn test_rows_outside_range_are_ignored() {
        let rows = vec![DailyCount {
            day: date(2023, 12, 31),
            views: 9,
            visitors: 9,
        }];
        let series = fill_daily_series(&rows, date(2024, 1, 1), date(2024, 1, 2));
        assert!(series.iter().all(|d| d.views == 0));
    }
}
