// ROI calculator: a free headline preview, with the full breakdown released
// once the visitor proves their email address with a one-time code.

pub mod calculator;
pub mod handlers;
pub mod verification;
