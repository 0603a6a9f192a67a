use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::assumptions::DividendPolicy;
use crate::types::{period_label, Money, Rate};

/// Shareholders' equity rollforward for a single period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPeriod {
    pub period: usize,
    pub label: String,
    pub common_stock: Money,
    pub stock_comp: Money,
    pub apic: Money,
    pub net_income: Money,
    pub dividends: Money,
    pub retained_earnings: Money,
    pub buybacks: Money,
    pub treasury_stock: Money,
    pub aoci: Money,
    pub total_equity: Money,
}

impl EquityPeriod {
    fn recompute_total(&mut self) {
        self.total_equity =
            self.common_stock + self.apic + self.retained_earnings - self.treasury_stock + self.aoci;
    }

    /// Shift retained earnings (and hence total equity) by a fixed amount.
    pub fn adjust_retained_earnings(&mut self, amount: Money) {
        self.retained_earnings += amount;
        self.recompute_total();
    }
}

/// Period 0 split of reported equity: common stock as given, APIC as a share
/// of the remaining paid-in equity, the rest to retained earnings. The split
/// is provisional; reconciliation overrides retained earnings.
pub fn opening(
    total_equity: Money,
    common_stock: Money,
    apic_share: Rate,
    net_income: Money,
) -> EquityPeriod {
    let apic = (total_equity - common_stock) * apic_share;
    let retained_earnings = total_equity - common_stock - apic;
    let mut row = EquityPeriod {
        period: 0,
        label: period_label(0),
        common_stock,
        stock_comp: Decimal::ZERO,
        apic,
        net_income,
        dividends: Decimal::ZERO,
        retained_earnings,
        buybacks: Decimal::ZERO,
        treasury_stock: Decimal::ZERO,
        aoci: Decimal::ZERO,
        total_equity: Decimal::ZERO,
    };
    row.recompute_total();
    row
}

/// Dividends declared for a period under the configured policy. A payout
/// ratio applies to positive earnings only.
pub fn dividends_for(policy: &DividendPolicy, net_income: Money, shares: Decimal) -> Money {
    match policy {
        DividendPolicy::PerShare(dps) => *dps * shares,
        DividendPolicy::PayoutRatio(ratio) => net_income.max(Decimal::ZERO) * *ratio,
        DividendPolicy::None => Decimal::ZERO,
    }
}

pub fn roll_forward(
    prior: &EquityPeriod,
    period: usize,
    net_income: Money,
    dividends: Money,
    stock_comp: Money,
    buyback: Money,
) -> EquityPeriod {
    let mut row = EquityPeriod {
        period,
        label: period_label(period),
        common_stock: prior.common_stock,
        stock_comp,
        apic: prior.apic + stock_comp,
        net_income,
        dividends,
        retained_earnings: prior.retained_earnings + net_income - dividends,
        buybacks: buyback,
        treasury_stock: prior.treasury_stock + buyback,
        aoci: prior.aoci,
        total_equity: Decimal::ZERO,
    };
    row.recompute_total();
    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_opening_split() {
        let row = opening(dec!(400), dec!(10), dec!(0.40), dec!(60));
        // (400 - 10) * 40%
        assert_eq!(row.apic, dec!(156));
        assert_eq!(row.retained_earnings, dec!(234));
        assert_eq!(row.total_equity, dec!(400));
    }

    #[test]
    fn test_dividend_policies() {
        assert_eq!(
            dividends_for(&DividendPolicy::PerShare(dec!(0.5)), dec!(80), dec!(100)),
            dec!(50)
        );
        assert_eq!(
            dividends_for(&DividendPolicy::PayoutRatio(dec!(0.25)), dec!(80), dec!(100)),
            dec!(20)
        );
        assert_eq!(
            dividends_for(&DividendPolicy::PayoutRatio(dec!(0.25)), dec!(-80), dec!(100)),
            Decimal::ZERO
        );
        assert_eq!(
            dividends_for(&DividendPolicy::None, dec!(80), dec!(100)),
            Decimal::ZERO
        );
    }

    #[test]
    fn test_rollforward() {
        let p0 = opening(dec!(400), dec!(10), dec!(0.40), dec!(60));
        let p1 = roll_forward(&p0, 1, dec!(70), dec!(14), dec!(10.8), dec!(5));

        assert_eq!(p1.apic, dec!(166.8));
        assert_eq!(p1.retained_earnings, dec!(290));
        assert_eq!(p1.treasury_stock, dec!(5));
        // 10 + 166.8 + 290 - 5
        assert_eq!(p1.total_equity, dec!(461.8));
        assert_eq!(
            p1.total_equity - p0.total_equity,
            p1.net_income - p1.dividends + p1.stock_comp - p1.buybacks
        );
    }

    #[test]
    fn test_adjust_retained_earnings_moves_total() {
        let mut row = opening(dec!(400), dec!(10), dec!(0.40), dec!(60));
        row.adjust_retained_earnings(dec!(-34));
        assert_eq!(row.retained_earnings, dec!(200));
        assert_eq!(row.total_equity, dec!(366));
    }
}
