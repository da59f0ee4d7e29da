//! Full attribute catalogue: extractors and per-kind tables.
//!
//! Equity attributes come from the Yahoo quote/profile/cash-flow pages and
//! ten HiStock ratio pages. Funds use the same quote and dividend pages plus
//! the fund section of the profile page.

use super::extract::{divs_with_class, list_items, spans, table_cells, Element};
use super::names::*;
use super::{FieldContext, FieldError, FieldSpec, HiStockPage, Page};

const SECTION_CLASS: &str = "table-grid Mb(20px) row-fit-half";
const DETAIL_CLASS: &str = "Py(8px) Pstart(12px) Bxz(bb)";
const MANAGEMENT_FEE_CLASS: &str = "Py(8px) Pstart(12px) Bxz(bb) etf-management-fee";
const PRICE_DETAIL_ITEM: &str = "price-detail-item";
const PRIOR_CLOSE_LABEL: &str = "昨收";
const CASH_FLOW_ITEM: &str = "List(n)";
const CASH_FLOW_ROW: usize = 3;

fn with_html<T>(
    ctx: &FieldContext<'_>,
    page: Page,
    f: impl FnOnce(&str) -> Result<T, FieldError>,
) -> Result<T, FieldError> {
    let doc = ctx.document(page)?;
    let html = doc
        .text()
        .ok_or_else(|| FieldError::missing(format!("{} is not an HTML page", doc.url())))?;
    f(html)
}

fn nth_text(elements: &[Element<'_>], idx: usize, what: &str) -> Result<String, FieldError> {
    elements
        .get(idx)
        .map(Element::text)
        .ok_or_else(|| FieldError::missing(format!("{what}[{idx}]")))
}

fn histock_cell(ctx: &FieldContext<'_>, page: HiStockPage, idx: usize) -> Result<String, FieldError> {
    with_html(ctx, Page::HiStock(page), |html| {
        nth_text(&table_cells(html), idx, "td")
    })
}

/// First `td` carrying an inline style: the highlighted current value.
fn histock_highlight(ctx: &FieldContext<'_>, page: HiStockPage) -> Result<String, FieldError> {
    with_html(ctx, Page::HiStock(page), |html| {
        table_cells(html)
            .into_iter()
            .find(Element::has_style)
            .map(|td| td.text())
            .ok_or_else(|| FieldError::missing("styled td"))
    })
}

/// Last detail cell of the `index`-th profile section.
fn profile_section(ctx: &FieldContext<'_>, styled_only: bool, index: usize) -> Result<String, FieldError> {
    with_html(ctx, Page::Profile, |html| {
        let sections: Vec<_> = divs_with_class(html, SECTION_CLASS)
            .into_iter()
            .filter(|d| !styled_only || d.has_style())
            .collect();
        let section = sections
            .get(index)
            .ok_or_else(|| FieldError::missing(format!("profile section[{index}]")))?;
        divs_with_class(section.inner, DETAIL_CLASS)
            .last()
            .map(Element::text)
            .ok_or_else(|| FieldError::missing("profile detail cell"))
    })
}

fn prior_close(ctx: &FieldContext<'_>) -> Result<String, FieldError> {
    with_html(ctx, Page::Quote, |html| {
        list_items(html)
            .into_iter()
            .filter(|li| li.has_class_token(PRICE_DETAIL_ITEM))
            .find(|li| li.text().contains(PRIOR_CLOSE_LABEL))
            .and_then(|li| spans(li.inner).get(1).map(Element::text))
            .ok_or_else(|| FieldError::missing("prior close price detail"))
    })
}

fn management_fee(ctx: &FieldContext<'_>) -> Result<String, FieldError> {
    with_html(ctx, Page::Profile, |html| {
        divs_with_class(html, MANAGEMENT_FEE_CLASS)
            .first()
            .map(Element::text)
            .ok_or_else(|| FieldError::missing("management fee"))
    })
}

fn nav_per_share(ctx: &FieldContext<'_>) -> Result<String, FieldError> {
    profile_section(ctx, true, 0)
}

fn dividend_pay_date(ctx: &FieldContext<'_>) -> Result<String, FieldError> {
    profile_section(ctx, true, 1)
}

fn fund_dividend_pay_date(ctx: &FieldContext<'_>) -> Result<String, FieldError> {
    profile_section(ctx, false, 0)
}

fn cash_flow(ctx: &FieldContext<'_>) -> Result<String, FieldError> {
    with_html(ctx, Page::CashFlow, |html| {
        let rows: Vec<_> = list_items(html)
            .into_iter()
            .filter(|li| li.has_class_token(CASH_FLOW_ITEM))
            .collect();
        let row = rows
            .get(CASH_FLOW_ROW)
            .ok_or_else(|| FieldError::missing(format!("cash-flow row[{CASH_FLOW_ROW}]")))?;
        nth_text(&spans(row.inner), 1, "cash-flow span")
    })
}

fn pe_ratio(ctx: &FieldContext<'_>) -> Result<String, FieldError> {
    histock_highlight(ctx, HiStockPage::PeRatio)
}

fn pb_ratio(ctx: &FieldContext<'_>) -> Result<String, FieldError> {
    histock_highlight(ctx, HiStockPage::PbRatio)
}

fn roe(ctx: &FieldContext<'_>) -> Result<String, FieldError> {
    histock_cell(ctx, HiStockPage::Returns, 1)
}

fn roa(ctx: &FieldContext<'_>) -> Result<String, FieldError> {
    histock_cell(ctx, HiStockPage::Returns, 2)
}

fn gross_margin(ctx: &FieldContext<'_>) -> Result<String, FieldError> {
    histock_cell(ctx, HiStockPage::Profitability, 1)
}

fn operating_margin(ctx: &FieldContext<'_>) -> Result<String, FieldError> {
    histock_cell(ctx, HiStockPage::Profitability, 2)
}

fn net_margin(ctx: &FieldContext<'_>) -> Result<String, FieldError> {
    histock_cell(ctx, HiStockPage::Profitability, 4)
}

fn current_ratio(ctx: &FieldContext<'_>) -> Result<String, FieldError> {
    histock_cell(ctx, HiStockPage::Liquidity, 1)
}

fn quick_ratio(ctx: &FieldContext<'_>) -> Result<String, FieldError> {
    histock_cell(ctx, HiStockPage::Liquidity, 2)
}

fn debt_ratio(ctx: &FieldContext<'_>) -> Result<String, FieldError> {
    histock_cell(ctx, HiStockPage::DebtRatio, 1)
}

fn interest_coverage(ctx: &FieldContext<'_>) -> Result<String, FieldError> {
    histock_cell(ctx, HiStockPage::InterestCoverage, 1)
}

fn receivable_days(ctx: &FieldContext<'_>) -> Result<String, FieldError> {
    histock_cell(ctx, HiStockPage::Turnover, 1)
}

fn inventory_days(ctx: &FieldContext<'_>) -> Result<String, FieldError> {
    histock_cell(ctx, HiStockPage::Turnover, 2)
}

fn reinvestment_ratio(ctx: &FieldContext<'_>) -> Result<String, FieldError> {
    histock_cell(ctx, HiStockPage::Reinvestment, 1)
}

// Dividend history table: the latest year occupies the first row.
fn ex_rights_date(ctx: &FieldContext<'_>) -> Result<String, FieldError> {
    histock_cell(ctx, HiStockPage::Dividends, 2)
}

fn ex_dividend_date(ctx: &FieldContext<'_>) -> Result<String, FieldError> {
    with_html(ctx, Page::HiStock(HiStockPage::Dividends), |html| {
        let cells = table_cells(html);
        let year = nth_text(&cells, 1, "td")?;
        let day = nth_text(&cells, 3, "td")?;
        if year.is_empty() || day.is_empty() {
            return Ok(String::new());
        }
        Ok(format!("{year}/{day}"))
    })
}

fn stock_dividend(ctx: &FieldContext<'_>) -> Result<String, FieldError> {
    histock_cell(ctx, HiStockPage::Dividends, 5)
}

fn cash_dividend(ctx: &FieldContext<'_>) -> Result<String, FieldError> {
    histock_cell(ctx, HiStockPage::Dividends, 6)
}

fn eps(ctx: &FieldContext<'_>) -> Result<String, FieldError> {
    histock_cell(ctx, HiStockPage::Dividends, 7)
}

fn dividend_yield(ctx: &FieldContext<'_>) -> Result<String, FieldError> {
    histock_cell(ctx, HiStockPage::Dividends, 9)
}

// Descriptors shared by more than one table.
const PRIOR_CLOSE_SPEC: FieldSpec = FieldSpec::extract(PRIOR_CLOSE, prior_close);
const EX_RIGHTS_SPEC: FieldSpec = FieldSpec::extract(EX_RIGHTS_DATE, ex_rights_date);
const EX_DIVIDEND_SPEC: FieldSpec = FieldSpec::extract(EX_DIVIDEND_DATE, ex_dividend_date);
const STOCK_DIVIDEND_SPEC: FieldSpec = FieldSpec::extract(STOCK_DIVIDEND, stock_dividend);
const CASH_DIVIDEND_SPEC: FieldSpec = FieldSpec::extract(CASH_DIVIDEND, cash_dividend);
const EPS_SPEC: FieldSpec = FieldSpec::extract(EPS, eps);
const DIVIDEND_YIELD_SPEC: FieldSpec = FieldSpec::extract(DIVIDEND_YIELD, dividend_yield);

pub const EQUITY_FIELDS: &[FieldSpec] = &[
    PRIOR_CLOSE_SPEC,
    FieldSpec::extract(PE_RATIO, pe_ratio),
    FieldSpec::extract(PB_RATIO, pb_ratio),
    FieldSpec::extract(ROE, roe),
    FieldSpec::extract(ROA, roa),
    FieldSpec::extract(GROSS_MARGIN, gross_margin),
    FieldSpec::extract(OPERATING_MARGIN, operating_margin),
    FieldSpec::extract(NET_MARGIN, net_margin),
    FieldSpec::extract(NAV_PER_SHARE, nav_per_share),
    EPS_SPEC,
    FieldSpec::extract(CURRENT_RATIO, current_ratio),
    FieldSpec::extract(QUICK_RATIO, quick_ratio),
    FieldSpec::extract(DEBT_RATIO, debt_ratio),
    FieldSpec::extract(INTEREST_COVERAGE, interest_coverage),
    FieldSpec::extract(RECEIVABLE_DAYS, receivable_days),
    FieldSpec::extract(INVENTORY_DAYS, inventory_days),
    CASH_DIVIDEND_SPEC,
    STOCK_DIVIDEND_SPEC,
    DIVIDEND_YIELD_SPEC,
    EX_DIVIDEND_SPEC,
    FieldSpec::extract(DIVIDEND_PAY_DATE, dividend_pay_date),
    EX_RIGHTS_SPEC,
    FieldSpec::extract(REINVESTMENT_RATIO, reinvestment_ratio),
    FieldSpec::extract(CASH_FLOW, cash_flow),
];

pub const FUND_FIELDS: &[FieldSpec] = &[
    PRIOR_CLOSE_SPEC,
    FieldSpec::extract(MANAGEMENT_FEE, management_fee),
    FieldSpec::extract(DIVIDEND_PAY_DATE, fund_dividend_pay_date),
    EX_RIGHTS_SPEC,
    EX_DIVIDEND_SPEC,
    STOCK_DIVIDEND_SPEC,
    CASH_DIVIDEND_SPEC,
    EPS_SPEC,
    DIVIDEND_YIELD_SPEC,
];

/// Used when the kind is unknown.
pub const COMMON_FIELDS: &[FieldSpec] = &[
    PRIOR_CLOSE_SPEC,
    EX_RIGHTS_SPEC,
    EX_DIVIDEND_SPEC,
    STOCK_DIVIDEND_SPEC,
    CASH_DIVIDEND_SPEC,
    EPS_SPEC,
    DIVIDEND_YIELD_SPEC,
];
