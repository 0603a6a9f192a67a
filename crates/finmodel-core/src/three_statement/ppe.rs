use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{period_label, safe_divide, Money, Multiple, Rate};

/// Fixed-asset rollforward for a single period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PpePeriod {
    pub period: usize,
    pub label: String,
    pub beginning_net: Money,
    pub capex: Money,
    pub capex_pct_revenue: Rate,
    pub depreciation: Money,
    pub ending_net: Money,
    pub gross_ppe: Money,
    pub accumulated_depreciation: Money,
    pub capex_to_depreciation: Multiple,
}

/// Period 0. Gross PP&E is not reported, so it is back-estimated as
/// `net × gross_multiple`; accumulated depreciation is the difference.
pub fn opening(net_ppe: Money, depreciation: Money, gross_multiple: Decimal) -> PpePeriod {
    let gross_ppe = net_ppe * gross_multiple;
    PpePeriod {
        period: 0,
        label: period_label(0),
        beginning_net: net_ppe,
        capex: Decimal::ZERO,
        capex_pct_revenue: Decimal::ZERO,
        depreciation,
        ending_net: net_ppe,
        gross_ppe,
        accumulated_depreciation: gross_ppe - net_ppe,
        capex_to_depreciation: Decimal::ZERO,
    }
}

/// `ending = beginning + capex − depreciation`, where depreciation comes from
/// the shared D&A driver so it ties to the income statement.
pub fn roll_forward(
    prior: &PpePeriod,
    period: usize,
    revenue: Money,
    capex_pct: Rate,
    depreciation: Money,
) -> PpePeriod {
    let capex = revenue * capex_pct;
    PpePeriod {
        period,
        label: period_label(period),
        beginning_net: prior.ending_net,
        capex,
        capex_pct_revenue: capex_pct,
        depreciation,
        ending_net: prior.ending_net + capex - depreciation,
        gross_ppe: prior.gross_ppe + capex,
        accumulated_depreciation: prior.accumulated_depreciation + depreciation,
        capex_to_depreciation: safe_divide(capex, depreciation),
    }
}
