//! Remote pages a field can be extracted from.

use crate::domain::Symbol;
use crate::fetch::{Endpoints, Format};

/// HiStock ratio pages. Each is addressed by a percent-encoded title segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HiStockPage {
    PeRatio,
    PbRatio,
    Dividends,
    Returns,
    Profitability,
    Liquidity,
    DebtRatio,
    InterestCoverage,
    Turnover,
    Reinvestment,
}

impl HiStockPage {
    pub const ALL: [HiStockPage; 10] = [
        Self::PeRatio,
        Self::PbRatio,
        Self::Dividends,
        Self::Returns,
        Self::Profitability,
        Self::Liquidity,
        Self::DebtRatio,
        Self::InterestCoverage,
        Self::Turnover,
        Self::Reinvestment,
    ];

    pub fn segment(&self) -> &'static str {
        match self {
            // 本益比
            Self::PeRatio => "%E6%9C%AC%E7%9B%8A%E6%AF%94",
            // 股價淨值比
            Self::PbRatio => "%E8%82%A1%E5%83%B9%E6%B7%A8%E5%80%BC%E6%AF%94",
            // 除權除息
            Self::Dividends => "%E9%99%A4%E6%AC%8A%E9%99%A4%E6%81%AF",
            // 報酬率
            Self::Returns => "%E5%A0%B1%E9%85%AC%E7%8E%87",
            // 利潤比率
            Self::Profitability => "%E5%88%A9%E6%BD%A4%E6%AF%94%E7%8E%87",
            // 流速動比率
            Self::Liquidity => "%E6%B5%81%E9%80%9F%E5%8B%95%E6%AF%94%E7%8E%87",
            // 負債佔資產比
            Self::DebtRatio => "%E8%B2%A0%E5%82%B5%E4%BD%94%E8%B3%87%E7%94%A2%E6%AF%94",
            // 利息保障倍數
            Self::InterestCoverage => "%E5%88%A9%E6%81%AF%E4%BF%9D%E9%9A%9C%E5%80%8D%E6%95%B8",
            // 營運週轉天數
            Self::Turnover => "%E7%87%9F%E9%81%8B%E9%80%B1%E8%BD%89%E5%A4%A9%E6%95%B8",
            // 盈餘再投資比率
            Self::Reinvestment => "%E7%9B%88%E9%A4%98%E5%86%8D%E6%8A%95%E8%B3%87%E6%AF%94%E7%8E%87",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Page {
    /// Yahoo quote page (price details).
    Quote,
    /// Yahoo profile page (NAV, dividend dates, fund fees).
    Profile,
    /// Yahoo cash-flow statement.
    CashFlow,
    HiStock(HiStockPage),
    /// TWSE realtime quote JSON.
    Realtime,
}

impl Page {
    pub fn url(&self, endpoints: &Endpoints, symbol: &Symbol) -> String {
        let code = symbol.as_str();
        match self {
            Self::Quote => format!("{}/{code}", endpoints.yahoo_quote),
            Self::Profile => format!("{}/{code}/profile", endpoints.yahoo_quote),
            Self::CashFlow => format!("{}/{code}/cash-flow-statement", endpoints.yahoo_quote),
            Self::HiStock(page) => format!("{}/{code}/{}", endpoints.histock, page.segment()),
            // Listed and OTC channels in one request; only one answers.
            Self::Realtime => format!(
                "{}?ex_ch=tse_{code}.tw%7Cotc_{code}.tw&json=1&delay=0",
                endpoints.twse_realtime
            ),
        }
    }

    pub fn format(&self) -> Format {
        match self {
            Self::Realtime => Format::Json,
            _ => Format::Html,
        }
    }
}
