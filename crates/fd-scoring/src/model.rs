//! Raw, point-in-time facts consumed by the engine.
//!
//! Everything in this module is what the external raw-factor store hands
//! over for one as-of date: reference data with time-stamped classification
//! events, quarterly fundamental observations carrying their publication
//! dates, daily price/valuation bars and dividend history.

use chrono::{Days, NaiveDate};
use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::config::PublicationLag;

/// Partition label for securities without an industry classification.
pub const UNCLASSIFIED_INDUSTRY: &str = "unclassified";

/// Listing status of a security at a point in time.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
    /// Listed and eligible for scoring
    Listed,
    /// Removed from the exchange
    Delisted,
}

impl ListingStatus {
    /// Stable storage name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Listed => "listed",
            Self::Delisted => "delisted",
        }
    }

    /// Parse a storage name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "listed" => Some(Self::Listed),
            "delisted" => Some(Self::Delisted),
            _ => None,
        }
    }
}

/// A time-stamped industry/status reclassification.
///
/// Each event records the full classification in force from `effective`
/// onwards, so history is reconstructed by picking the latest event on or
/// before a date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationEvent {
    /// First date the classification applies
    pub effective: NaiveDate,
    /// Industry label, if classified
    pub industry: Option<String>,
    /// Listing status
    pub status: ListingStatus,
}

/// Security reference data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Security {
    /// Exchange-qualified code, e.g. `sh.600000`
    pub code: String,
    /// Display name
    pub name: String,
    /// Listing date
    pub list_date: NaiveDate,
    /// Delisting date, if any
    pub delist_date: Option<NaiveDate>,
    /// Total share count
    pub total_shares: Option<f64>,
    /// Free-float share count
    pub float_shares: Option<f64>,
    /// Classification history
    pub events: Vec<ClassificationEvent>,
}

impl Security {
    /// Create a listed security with a single classification event on its
    /// listing date.
    pub fn new(
        code: impl Into<String>,
        name: impl Into<String>,
        industry: Option<&str>,
        list_date: NaiveDate,
    ) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            list_date,
            delist_date: None,
            total_shares: None,
            float_shares: None,
            events: vec![ClassificationEvent {
                effective: list_date,
                industry: industry.map(str::to_string),
                status: ListingStatus::Listed,
            }],
        }
    }

    /// Set the share counts.
    pub const fn with_shares(mut self, total: f64, float: f64) -> Self {
        self.total_shares = Some(total);
        self.float_shares = Some(float);
        self
    }

    /// Append a reclassification event.
    pub fn with_event(mut self, event: ClassificationEvent) -> Self {
        self.events.push(event);
        self
    }

    fn event_as_of(&self, date: NaiveDate) -> Option<&ClassificationEvent> {
        self.events
            .iter()
            .filter(|e| e.effective <= date)
            .max_by_key(|e| e.effective)
    }

    /// Industry in force on `date`.
    pub fn industry_as_of(&self, date: NaiveDate) -> Option<&str> {
        self.event_as_of(date).and_then(|e| e.industry.as_deref())
    }

    /// Listing status in force on `date`.
    pub fn status_as_of(&self, date: NaiveDate) -> ListingStatus {
        self.event_as_of(date)
            .map_or(ListingStatus::Listed, |e| e.status)
    }

    /// Whether the security belongs to the scoring universe on `date`.
    pub fn in_universe(&self, date: NaiveDate) -> bool {
        self.list_date <= date
            && self.delist_date.is_none_or(|d| d > date)
            && self.status_as_of(date) == ListingStatus::Listed
    }

    /// Calendar days since listing.
    pub fn listed_days(&self, date: NaiveDate) -> i64 {
        (date - self.list_date).num_days()
    }
}

/// Financial statement family a metric is reported in.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Statement {
    /// Profitability figures
    Profit,
    /// Operating efficiency figures
    Operation,
    /// Growth rates
    Growth,
    /// Balance sheet ratios
    Balance,
    /// Cash flow quality
    CashFlow,
}

impl Statement {
    /// All statements in a fixed order.
    pub const ALL: [Self; 5] = [
        Self::Profit,
        Self::Operation,
        Self::Growth,
        Self::Balance,
        Self::CashFlow,
    ];

    /// Stable name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Profit => "profit",
            Self::Operation => "operation",
            Self::Growth => "growth",
            Self::Balance => "balance",
            Self::CashFlow => "cash_flow",
        }
    }
}

/// Quarterly fundamental metric.
///
/// Ratio metrics (returns, margins, growth rates and debt-to-assets) are
/// stored as fractions, so 18% ROE is `0.18`.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Return on equity
    Roe,
    /// Net profit margin
    NetProfitMargin,
    /// Gross margin
    GrossMargin,
    /// Net profit attributable to shareholders (currency)
    NetProfit,
    /// Total asset turnover
    AssetTurnover,
    /// Inventory turnover
    InventoryTurnover,
    /// Receivable turnover
    ReceivableTurnover,
    /// Revenue growth, year over year
    RevenueYoy,
    /// Net profit growth, year over year
    NetProfitYoy,
    /// Liabilities over total assets
    DebtToAssets,
    /// Current ratio
    CurrentRatio,
    /// Quick ratio
    QuickRatio,
    /// Operating cash flow over net profit
    OcfToNetProfit,
}

impl Metric {
    /// All metrics.
    pub const ALL: [Self; 13] = [
        Self::Roe,
        Self::NetProfitMargin,
        Self::GrossMargin,
        Self::NetProfit,
        Self::AssetTurnover,
        Self::InventoryTurnover,
        Self::ReceivableTurnover,
        Self::RevenueYoy,
        Self::NetProfitYoy,
        Self::DebtToAssets,
        Self::CurrentRatio,
        Self::QuickRatio,
        Self::OcfToNetProfit,
    ];

    /// Statement family.
    pub const fn statement(&self) -> Statement {
        match self {
            Self::Roe | Self::NetProfitMargin | Self::GrossMargin | Self::NetProfit => {
                Statement::Profit
            }
            Self::AssetTurnover | Self::InventoryTurnover | Self::ReceivableTurnover => {
                Statement::Operation
            }
            Self::RevenueYoy | Self::NetProfitYoy => Statement::Growth,
            Self::DebtToAssets | Self::CurrentRatio | Self::QuickRatio => Statement::Balance,
            Self::OcfToNetProfit => Statement::CashFlow,
        }
    }

    /// Stable storage name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Roe => "roe",
            Self::NetProfitMargin => "net_profit_margin",
            Self::GrossMargin => "gross_margin",
            Self::NetProfit => "net_profit",
            Self::AssetTurnover => "asset_turnover",
            Self::InventoryTurnover => "inventory_turnover",
            Self::ReceivableTurnover => "receivable_turnover",
            Self::RevenueYoy => "revenue_yoy",
            Self::NetProfitYoy => "net_profit_yoy",
            Self::DebtToAssets => "debt_to_assets",
            Self::CurrentRatio => "current_ratio",
            Self::QuickRatio => "quick_ratio",
            Self::OcfToNetProfit => "ocf_to_net_profit",
        }
    }

    /// Parse a storage name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.as_str() == name)
    }
}

/// Fiscal quarter, ordered chronologically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FiscalPeriod {
    /// Fiscal year
    pub year: i32,
    /// Quarter, 1 to 4
    pub quarter: u8,
}

impl FiscalPeriod {
    /// Create a fiscal period.
    pub const fn new(year: i32, quarter: u8) -> Self {
        Self { year, quarter }
    }

    /// Last calendar day of the period, `None` for an invalid quarter.
    pub fn period_end(&self) -> Option<NaiveDate> {
        let (month, day) = match self.quarter {
            1 => (3, 31),
            2 => (6, 30),
            3 => (9, 30),
            4 => (12, 31),
            _ => return None,
        };
        NaiveDate::from_ymd_opt(self.year, month, day)
    }

    /// Whether this is the annual (fourth quarter) report.
    pub const fn is_annual(&self) -> bool {
        self.quarter == 4
    }
}

/// A single (security, fiscal period, metric) fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawFactorObservation {
    /// Security code
    pub code: String,
    /// Fiscal period reported
    pub period: FiscalPeriod,
    /// Metric reported
    pub metric: Metric,
    /// Reported value
    pub value: f64,
    /// Publication date, when the collector knows it
    pub published: Option<NaiveDate>,
}

impl RawFactorObservation {
    /// Date from which this observation may be used.
    ///
    /// Falls back to the statutory disclosure deadline after period end when
    /// no publication date was collected. `None` means the period itself is
    /// invalid and the observation can never be used.
    pub fn effective_date(&self, lag: &PublicationLag) -> Option<NaiveDate> {
        if let Some(published) = self.published {
            return Some(published);
        }
        let end = self.period.period_end()?;
        end.checked_add_days(Days::new(u64::from(lag.days_for(self.period.quarter))))
    }

    /// Whether the observation was public on `as_of`.
    pub fn known_on(&self, as_of: NaiveDate, lag: &PublicationLag) -> bool {
        self.effective_date(lag).is_some_and(|d| d <= as_of)
    }
}

/// One trading day of price and valuation data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyBar {
    /// Security code
    pub code: String,
    /// Trading date
    pub trade_date: NaiveDate,
    /// Closing price
    pub close: f64,
    /// Traded volume (shares)
    pub volume: Option<f64>,
    /// Traded amount (currency)
    pub amount: Option<f64>,
    /// Turnover rate (percent)
    pub turnover: Option<f64>,
    /// Trailing twelve-month P/E
    pub pe_ttm: Option<f64>,
    /// Most-recent-quarter P/B
    pub pb_mrq: Option<f64>,
    /// Trailing twelve-month P/S
    pub ps_ttm: Option<f64>,
    /// Special-treatment flag
    pub is_st: bool,
    /// `false` when the security was suspended
    pub tradable: bool,
}

impl DailyBar {
    /// A tradable bar with only a close price.
    pub fn new(code: impl Into<String>, trade_date: NaiveDate, close: f64) -> Self {
        Self {
            code: code.into(),
            trade_date,
            close,
            volume: None,
            amount: None,
            turnover: None,
            pe_ttm: None,
            pb_mrq: None,
            ps_ttm: None,
            is_st: false,
            tradable: true,
        }
    }

    /// Set the valuation multiples.
    pub const fn with_valuation(mut self, pe_ttm: f64, pb_mrq: f64) -> Self {
        self.pe_ttm = Some(pe_ttm);
        self.pb_mrq = Some(pb_mrq);
        self
    }

    /// Set the traded amount.
    pub const fn with_amount(mut self, amount: f64) -> Self {
        self.amount = Some(amount);
        self
    }
}

/// A cash dividend distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DividendEvent {
    /// Security code
    pub code: String,
    /// Fiscal year the dividend belongs to
    pub year: i32,
    /// Cash per share before tax
    pub cash_per_share: Option<f64>,
    /// Plan announcement date
    pub plan_date: Option<NaiveDate>,
    /// Board/shareholder approval date
    pub operate_date: Option<NaiveDate>,
    /// Payment date
    pub pay_date: Option<NaiveDate>,
}

impl DividendEvent {
    /// Date the distribution counts from: payment, else approval, else plan.
    pub fn effective_date(&self) -> Option<NaiveDate> {
        self.pay_date.or(self.operate_date).or(self.plan_date)
    }

    /// Positive cash amount, if any.
    pub fn cash(&self) -> Option<f64> {
        self.cash_per_share.filter(|c| *c > 0.0)
    }
}

/// Everything the store hands over for one as-of date, read from a single
/// consistent snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawUniverse {
    /// As-of date the data was read for
    pub as_of: NaiveDate,
    /// Reference data
    pub securities: Vec<Security>,
    /// Quarterly fundamentals
    pub observations: Vec<RawFactorObservation>,
    /// Daily bars over the lookback window
    pub bars: Vec<DailyBar>,
    /// Dividend history
    pub dividends: Vec<DividendEvent>,
}
