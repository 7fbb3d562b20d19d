use serde::{Deserialize, Serialize};

/// Sports the engine has a probability model for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sport {
    Football,
    Basketball,
    Tennis,
    Hockey,
    Baseball,
    Gridiron,
    /// Any sport without a dedicated model; priced by tilting the market
    Generic,
}

impl Sport {
    pub const ALL: [Sport; 7] = [
        Sport::Football,
        Sport::Basketball,
        Sport::Tennis,
        Sport::Hockey,
        Sport::Baseball,
        Sport::Gridiron,
        Sport::Generic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Sport::Football => "football",
            Sport::Basketball => "basketball",
            Sport::Tennis => "tennis",
            Sport::Hockey => "hockey",
            Sport::Baseball => "baseball",
            Sport::Gridiron => "gridiron",
            Sport::Generic => "generic",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Sport::Football => "Football",
            Sport::Basketball => "Basketball",
            Sport::Tennis => "Tennis",
            Sport::Hockey => "Ice Hockey",
            Sport::Baseball => "Baseball",
            Sport::Gridiron => "American Football",
            Sport::Generic => "Other",
        }
    }

    /// Whether a two-way "moneyline" block without a draw price still means the 3-way market
    pub fn result_market_is_three_way(&self) -> bool {
        matches!(self, Sport::Football)
    }

    /// Line picked when a producer supplies several total lines
    pub fn default_total_line(&self) -> Option<f64> {
        match self {
            Sport::Football => Some(2.5),
            Sport::Hockey => Some(5.5),
            Sport::Baseball => Some(8.5),
            Sport::Tennis => Some(22.5),
            Sport::Gridiron => Some(44.5),
            Sport::Basketball | Sport::Generic => None,
        }
    }

    /// Map a free-form sport tag onto a sport by keyword.
    ///
    /// Returns `None` when nothing matches so the caller can decide on a fallback.
    pub fn from_tag(tag: &str) -> Option<Sport> {
        let upper = tag.trim().to_uppercase();
        if upper.is_empty() {
            return None;
        }
        if matches!(upper.as_str(), "GENERIC" | "OTHER") {
            return Some(Sport::Generic);
        }
        let has = |keys: &[&str]| keys.iter().any(|k| upper.contains(k));

        // Checked before plain "FOOTBALL" so "american football" does not land on soccer
        if has(&["GRIDIRON", "NFL", "NCAAF", "AMERICAN FOOTBALL", "AM. FOOTBALL", "AMERICANFOOTBALL", "CFL"]) {
            return Some(Sport::Gridiron);
        }
        if has(&["BASKETBALL", "NBA", "EUROLEAGUE", "NCAAB", "WNBA", "ACB"]) {
            return Some(Sport::Basketball);
        }
        if has(&["TENNIS", "ATP", "WTA", "ITF", "GRAND SLAM", "WIMBLEDON", "ROLAND"]) {
            return Some(Sport::Tennis);
        }
        if has(&["HOCKEY", "NHL", "KHL", "SHL", "AHL"]) {
            return Some(Sport::Hockey);
        }
        if has(&["BASEBALL", "MLB", "NPB", "KBO"]) {
            return Some(Sport::Baseball);
        }
        if has(&["FOOTBALL", "SOCCER", "EPL", "PREMIER", "LALIGA", "LA LIGA", "BUNDESLIGA", "SERIE A", "LIGUE 1", "UEFA", "MLS"]) {
            return Some(Sport::Football);
        }
        None
    }
}

impl std::fmt::Display for Sport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Sport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Sport::from_tag(s).ok_or_else(|| format!("unknown sport tag: {s}"))
    }
}
