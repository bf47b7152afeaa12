//! Axum route handlers for page-view tracking and the admin dashboard.

use std::sync::OnceLock;

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    Json,
};
use chrono::{Duration, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::analytics::store::{
    daily_counts, fill_daily_series, insert_event, top_pages, top_referrers, totals,
    NewVisitorEvent,
};
use crate::errors::AppError;
use crate::forms::validation::clean;
use crate::models::analytics::{DailyCount, PathCount, ReferrerCount};
use crate::state::AppState;

const MAX_VISITOR_ID: usize = 128;
const MAX_URL: usize = 2048;
const MAX_USER_AGENT: usize = 512;
const MAX_UTM: usize = 100;
const DEFAULT_DAYS: i64 = 30;
const MAX_DAYS: i64 = 365;

/// Paths that belong to the console or the API never count as page views.
const IGNORED_PREFIXES: &[&str] = &["/admin", "/api"];

fn bot_regex() -> &'static Regex {
    static BOT: OnceLock<Regex> = OnceLock::new();
    BOT.get_or_init(|| {
        Regex::new(r"(?i)bot|crawl|spider|slurp|headless|lighthouse|preview|monitor|curl|wget")
            .expect("bot regex is valid")
    })
}

#[derive(Debug, Deserialize)]
pub struct TrackRequest {
    pub visitor_id: String,
    pub path: String,
    pub referrer: Option<String>,
    pub utm_source: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    pub days: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct AnalyticsSummary {
    pub days: i64,
    pub page_views: i64,
    pub unique_visitors: i64,
    pub top_pages: Vec<PathCount>,
    pub top_referrers: Vec<ReferrerCount>,
    pub daily: Vec<DailyCount>,
}

pub fn is_bot(user_agent: Option<&str>) -> bool {
    user_agent.is_some_and(|ua| bot_regex().is_match(ua))
}

/// Path without its query string or fragment.
fn strip_query(path: &str) -> &str {
    path.split(|c| c == '?' || c == '#').next().unwrap_or(path)
}

pub fn is_ignored_path(path: &str) -> bool {
    let path = strip_query(path);
    IGNORED_PREFIXES
        .iter()
        .any(|p| path == *p || path.starts_with(&format!("{p}/")))
}

fn truncate(value: String, max: usize) -> String {
    if value.chars().count() <= max {
        value
    } else {
        value.chars().take(max).collect()
    }
}

/// Validates the beacon and decides whether it is worth storing. `Ok(None)`
/// means the view is silently dropped.
fn to_event(req: TrackRequest, user_agent: Option<&str>) -> Result<Option<NewVisitorEvent>, AppError> {
    let visitor_id = req.visitor_id.trim();
    if visitor_id.is_empty() || visitor_id.len() > MAX_VISITOR_ID {
        return Err(AppError::Validation("visitor_id is invalid".to_string()));
    }
    let path = req.path.trim();
    if !path.starts_with('/') || path.len() > MAX_URL {
        return Err(AppError::Validation(
            "path must be a site-relative URL".to_string(),
        ));
    }
    let path = strip_query(path);

    if is_ignored_path(path) || is_bot(user_agent) {
        return Ok(None);
    }

    Ok(Some(NewVisitorEvent {
        visitor_id: visitor_id.to_string(),
        path: path.to_string(),
        referrer: clean(req.referrer.as_deref()).map(|r| truncate(r, MAX_URL)),
        utm_source: clean(req.utm_source.as_deref()).map(|u| truncate(u, MAX_UTM)),
        user_agent: clean(user_agent).map(|ua| truncate(ua, MAX_USER_AGENT)),
    }))
}

/// POST /api/analytics/track
pub async fn handle_track(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<TrackRequest>,
) -> Result<StatusCode, AppError> {
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok());

    match to_event(req, user_agent)? {
        Some(event) => insert_event(&state.db, &event).await?,
        None => debug!("Dropped page view from filtered path or bot"),
    }
    Ok(StatusCode::NO_CONTENT)
}

/// First day of a window of `days` calendar days ending today.
fn window_start(today: NaiveDate, days: i64) -> NaiveDate {
    today - Duration::days(days - 1)
}

/// GET /api/admin/analytics
pub async fn handle_summary(
    State(state): State<AppState>,
    Query(params): Query<SummaryQuery>,
) -> Result<Json<AnalyticsSummary>, AppError> {
    let days = params.days.unwrap_or(DEFAULT_DAYS);
    if !(1..=MAX_DAYS).contains(&days) {
        return Err(AppError::Validation(format!(
            "days must be between 1 and {MAX_DAYS}"
        )));
    }

    let today = Utc::now().date_naive();
    let start = window_start(today, days);
    let since = start.and_time(chrono::NaiveTime::MIN).and_utc();

    let (page_views, unique_visitors) = totals(&state.db, since).await?;
    let pages = top_pages(&state.db, since).await?;
    let referrers = top_referrers(&state.db, since).await?;
    let daily = daily_counts(&state.db, since).await?;

    Ok(Json(AnalyticsSummary {
        days,
        page_views,
        unique_visitors,
        top_pages: pages,
        top_referrers: referrers,
        daily: fill_daily_series(&daily, start, today),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn beacon(path: &str) -> TrackRequest {
        TrackRequest {
            visitor_id: "v_123".to_string(),
            path: path.to_string(),
            referrer: Some("  https://news.ycombinator.com/ ".to_string()),
            utm_source: Some("".to_string()),
        }
    }

    const BROWSER: &str =
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_4) AppleWebKit/605.1.15 Safari/605.1.15";

    #[test]
    fn test_bot_detection() {
        assert!(is_bot(Some("Googlebot/2.1 (+http://www.google.com/bot.html)")));
        assert!(is_bot(Some("Mozilla/5.0 HeadlessChrome/120.0")));
        assert!(!is_bot(Some(BROWSER)));
        assert!(!is_bot(None));
    }

    #[test]
    fn test_ignored_paths() {
        assert!(is_ignored_path("/admin"));
        assert!(is_ignored_path("/admin/conversations"));
        assert!(is_ignored_path("/api/chat"));
        assert!(!is_ignored_path("/administration-guide"));
        assert!(!is_ignored_path("/pricing"));
    }

    #[test]
    fn test_query_and_fragment_do_not_dodge_filters() {
        assert!(is_ignored_path("/admin?tab=users"));
        assert!(is_ignored_path("/api?x"));
        assert!(is_ignored_path("/admin#top"));
        assert!(!is_ignored_path("/pricing?admin"));
        assert!(to_event(beacon("/admin?tab=x"), Some(BROWSER)).unwrap().is_none());
    }

    #[test]
    fn test_stored_path_drops_query_and_fragment() {
        let event = to_event(beacon("/pricing#faq"), Some(BROWSER)).unwrap().unwrap();
        assert_eq!(event.path, "/pricing");
        let event = to_event(beacon("/blog/post?utm_source=x"), Some(BROWSER)).unwrap().unwrap();
        assert_eq!(event.path, "/blog/post");
        assert_eq!(strip_query("/"), "/");
    }

    #[test]
    fn test_event_is_cleaned() {
        let event = to_event(beacon("/pricing"), Some(BROWSER)).unwrap().unwrap();
        assert_eq!(event.path, "/pricing");
        assert_eq!(event.referrer.as_deref(), Some("https://news.ycombinator.com/"));
        assert_eq!(event.utm_source, None);
        assert_eq!(event.user_agent.as_deref(), Some(BROWSER));
    }

    #[test]
    fn test_filtered_views_are_dropped_not_rejected() {
        assert!(to_event(beacon("/admin/login"), Some(BROWSER)).unwrap().is_none());
        assert!(to_event(beacon("/pricing"), Some("AhrefsBot/7.0")).unwrap().is_none());
    }

    #[test]
    fn test_invalid_beacons_are_rejected() {
        assert!(to_event(beacon("pricing"), None).is_err());
        let mut no_visitor = beacon("/");
        no_visitor.visitor_id = "  ".to_string();
        assert!(to_event(no_visitor, None).is_err());
    }

    #[test]
    fn test_window_includes_today() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        assert_eq!(window_start(today, 1), today);
        assert_eq!(
            window_start(today, 30),
            NaiveDate::from_ymd_opt(2024, 2, 10).unwrap()
        );
    }
}
