//! # Domain Models
//!
//! Canonical value types shared by the acquisition and analytics layers.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`CanonicalSymbol`] | Provider-independent instrument identifier |
//! | [`DateRange`] | Inclusive calendar date range |
//! | [`LookbackPeriod`] | Named lookback window (1mo .. 5y) |
//! | [`Observation`] | One dated value with explicit gaps |
//! | [`TimeSeries`] | Ordered, immutable series for one instrument |
//!
//! All types validate their invariants at construction time:
//!
//! ```rust,ignore
//! use riskradar_core::{CanonicalSymbol, Observation, TimeSeries, Unit};
//! use time::macros::date;
//!
//! let series = TimeSeries::new(
//!     CanonicalSymbol::parse("VIX")?,
//!     Unit::Index,
//!     vec![Observation::present(date!(2024 - 01 - 02), 13.2)],
//! )?;
//! ```

mod date;
mod series;
mod symbol;

pub use date::{format_date, iso_date, parse_date, DateRange, LookbackPeriod};
pub use series::{GapPolicy, Observation, TimeSeries, Unit};
pub use symbol::CanonicalSymbol;
