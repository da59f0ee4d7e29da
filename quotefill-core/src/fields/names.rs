//! Record keys.

// Full attribute set
pub const PRIOR_CLOSE: &str = "priorClose";
pub const PE_RATIO: &str = "peRatio";
pub const PB_RATIO: &str = "pbRatio";
pub const ROE: &str = "roe";
pub const ROA: &str = "roa";
pub const GROSS_MARGIN: &str = "grossMargin";
pub const OPERATING_MARGIN: &str = "operatingMargin";
pub const NET_MARGIN: &str = "netMargin";
pub const NAV_PER_SHARE: &str = "navPerShare";
pub const EPS: &str = "eps";
pub const CURRENT_RATIO: &str = "currentRatio";
pub const QUICK_RATIO: &str = "quickRatio";
pub const DEBT_RATIO: &str = "debtRatio";
pub const INTEREST_COVERAGE: &str = "interestCoverage";
pub const RECEIVABLE_DAYS: &str = "receivableDays";
pub const INVENTORY_DAYS: &str = "inventoryDays";
pub const CASH_DIVIDEND: &str = "cashDividend";
pub const STOCK_DIVIDEND: &str = "stockDividend";
pub const DIVIDEND_YIELD: &str = "dividendYield";
pub const EX_DIVIDEND_DATE: &str = "exDividendDate";
pub const DIVIDEND_PAY_DATE: &str = "dividendPayDate";
pub const EX_RIGHTS_DATE: &str = "exRightsDate";
pub const REINVESTMENT_RATIO: &str = "reinvestmentRatio";
pub const CASH_FLOW: &str = "cashFlow";
pub const MANAGEMENT_FEE: &str = "managementFee";

// Realtime quote
pub const DATE: &str = "date";
pub const NAME: &str = "name";
pub const BEST_BID: &str = "bestBid";
pub const BEST_ASK: &str = "bestAsk";
pub const LATEST_PRICE: &str = "latestPrice";
pub const CHANGE: &str = "change";
pub const CHANGE_PCT: &str = "changePct";
pub const TRADE_VOLUME: &str = "tradeVolume";
pub const BEST_BID_VOLUME: &str = "bestBidVolume";
pub const BEST_ASK_VOLUME: &str = "bestAskVolume";
pub const ACCUMULATED_VOLUME: &str = "accumulatedVolume";
pub const HIGH: &str = "high";
pub const LOW: &str = "low";
pub const OPEN: &str = "open";
