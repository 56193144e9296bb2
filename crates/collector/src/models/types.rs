use std::borrow::Cow;

/// Provider identifier - mostly static constants
pub type ProviderId = Cow<'static, str>;

/// Ticker symbol as supplied by the caller
pub type Symbol = String;
