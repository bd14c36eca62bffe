//! Audience role tags.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The role an insight is most useful for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudienceRole {
    /// VP Sales: team management, pipeline strategy, forecasting, coaching.
    VpSales,
    /// Chief Revenue Officer. Classifiers emit one of `vp_sales` or `cro`,
    /// never both.
    Cro,
    /// Sales Director: first-line leadership, deal coaching, enablement.
    Director,
    /// Sales Manager: rep development, frontline coaching, hiring.
    Manager,
    /// Account Executive: running deals end to end.
    Ae,
    /// SDR / BDR: prospecting, cold outreach, booking meetings.
    Sdr,
    /// Applicable across all roles equally.
    General,
}

impl AudienceRole {
    /// Returns every role in classifier-prompt order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::VpSales,
            Self::Cro,
            Self::Director,
            Self::Manager,
            Self::Ae,
            Self::Sdr,
            Self::General,
        ]
    }

    /// Returns the roles that count as sales leadership.
    #[must_use]
    pub const fn leadership() -> &'static [Self] {
        &[Self::VpSales, Self::Cro]
    }

    /// Returns the role as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::VpSales => "vp_sales",
            Self::Cro => "cro",
            Self::Director => "director",
            Self::Manager => "manager",
            Self::Ae => "ae",
            Self::Sdr => "sdr",
            Self::General => "general",
        }
    }

    /// Parses a role from its string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "vp_sales" => Some(Self::VpSales),
            "cro" => Some(Self::Cro),
            "director" => Some(Self::Director),
            "manager" => Some(Self::Manager),
            "ae" => Some(Self::Ae),
            "sdr" => Some(Self::Sdr),
            "general" => Some(Self::General),
            _ => None,
        }
    }
}

impl fmt::Display for AudienceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rejects_unknown_role() {
        assert_eq!(AudienceRole::parse("vp_sales"), Some(AudienceRole::VpSales));
        assert_eq!(AudienceRole::parse("intern"), None);
    }

    #[test]
    fn test_serde_uses_snake_case() {
        let json = serde_json::to_string(&AudienceRole::VpSales).unwrap();
        assert_eq!(json, "\"vp_sales\"");
        let back: AudienceRole = serde_json::from_str("\"sdr\"").unwrap();
        assert_eq!(back, AudienceRole::Sdr);
    }
}
