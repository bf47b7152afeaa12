use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::forms::validation::FormValidator;

/// Share of current DSO the product is expected to remove.
const DSO_REDUCTION: f64 = 0.30;
/// Share of manual invoice handling time that is automated away.
const AUTOMATION_RATE: f64 = 0.80;
const DAYS_PER_YEAR: f64 = 365.0;
const MAX_MONTHLY_INVOICES: f64 = 1_000_000.0;
const MAX_MINUTES_PER_INVOICE: f64 = 480.0;
const MAX_ANNUAL_REVENUE: f64 = 1e12;
const MAX_HOURLY_COST: f64 = 10_000.0;

fn default_minutes_per_invoice() -> f64 {
    15.0
}

fn default_hourly_cost() -> f64 {
    35.0
}

fn default_cost_of_capital_pct() -> f64 {
    8.0
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoiInputs {
    pub annual_revenue: f64,
    pub current_dso: f64,
    pub monthly_invoices: f64,
    #[serde(default = "default_minutes_per_invoice")]
    pub minutes_per_invoice: f64,
    #[serde(default = "default_hourly_cost")]
    pub hourly_cost: f64,
    #[serde(default = "default_cost_of_capital_pct")]
    pub cost_of_capital_pct: f64,
}

/// Full breakdown, only released after the email code is verified.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RoiResults {
    pub target_dso: f64,
    pub daily_revenue: f64,
    pub cash_released: f64,
    pub financing_savings: f64,
    pub hours_saved_per_month: f64,
    pub labor_savings: f64,
    pub total_annual_benefit: f64,
}

/// Headline numbers shown before the visitor hands over an email address.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RoiPreview {
    pub cash_released: f64,
    pub total_annual_benefit: f64,
}

impl From<&RoiResults> for RoiPreview {
    fn from(r: &RoiResults) -> Self {
        RoiPreview {
            cash_released: r.cash_released,
            total_annual_benefit: r.total_annual_benefit,
        }
    }
}

impl RoiResults {
    fn is_finite(&self) -> bool {
        [
            self.target_dso,
            self.daily_revenue,
            self.cash_released,
            self.financing_savings,
            self.hours_saved_per_month,
            self.labor_savings,
            self.total_annual_benefit,
        ]
        .iter()
        .all(|x| x.is_finite())
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

impl RoiInputs {
    pub fn validate(&self) -> Result<(), AppError> {
        let mut v = FormValidator::new();
        let all_finite = [
            self.annual_revenue,
            self.current_dso,
            self.monthly_invoices,
            self.minutes_per_invoice,
            self.hourly_cost,
            self.cost_of_capital_pct,
        ]
        .iter()
        .all(|x| x.is_finite());
        v.check(all_finite, "inputs", "All inputs must be numbers");
        if !all_finite {
            return v.finish();
        }

        v.check(
            self.annual_revenue > 0.0 && self.annual_revenue <= MAX_ANNUAL_REVENUE,
            "annual_revenue",
            "annual_revenue must be greater than 0 and at most 1,000,000,000,000",
        );
        v.check(
            self.current_dso > 0.0 && self.current_dso <= DAYS_PER_YEAR,
            "current_dso",
            "current_dso must be between 0 and 365 days",
        );
        v.check(
            (0.0..=MAX_MONTHLY_INVOICES).contains(&self.monthly_invoices),
            "monthly_invoices",
            "monthly_invoices must be between 0 and 1,000,000",
        );
        v.check(
            (0.0..=MAX_MINUTES_PER_INVOICE).contains(&self.minutes_per_invoice),
            "minutes_per_invoice",
            "minutes_per_invoice must be between 0 and 480",
        );
        v.check(
            (0.0..=MAX_HOURLY_COST).contains(&self.hourly_cost),
            "hourly_cost",
            "hourly_cost must be between 0 and 10,000",
        );
        v.check(
            (0.0..=100.0).contains(&self.cost_of_capital_pct),
            "cost_of_capital_pct",
            "cost_of_capital_pct must be between 0 and 100",
        );
        v.finish()?;

        // Every output lands in JSON, where a non-finite number becomes null.
        if !self.compute().is_finite() {
            return Err(AppError::Validation(
                "inputs produce a result that is out of range".to_string(),
            ));
        }
        Ok(())
    }

    /// Unrounded intermediates feed every later step; only outputs are rounded.
    pub fn compute(&self) -> RoiResults {
        let target_dso = self.current_dso * (1.0 - DSO_REDUCTION);
        let daily_revenue = self.annual_revenue / DAYS_PER_YEAR;
        let cash_released = (self.current_dso - target_dso) * daily_revenue;
        let financing_savings = cash_released * self.cost_of_capital_pct / 100.0;
        let hours_saved_per_month =
            self.monthly_invoices * self.minutes_per_invoice * AUTOMATION_RATE / 60.0;
        let labor_savings = hours_saved_per_month * 12.0 * self.hourly_cost;

        RoiResults {
            target_dso: round_to(target_dso, 1),
            daily_revenue: round_to(daily_revenue, 2),
            cash_released: round_to(cash_released, 2),
            financing_savings: round_to(financing_savings, 2),
            hours_saved_per_month: round_to(hours_saved_per_month, 1),
            labor_savings: round_to(labor_savings, 2),
            total_annual_benefit: round_to(financing_savings + labor_savings, 2),
        }
    }

    pub fn preview(&self) -> RoiPreview {
        RoiPreview::from(&self.compute())
    }
}
