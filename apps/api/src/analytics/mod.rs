// First-party page-view analytics for the marketing site.

pub mod handlers;
pub mod store;
