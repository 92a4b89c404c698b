use crate::core::error::FetchError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchSummary {
    pub kickoff_utc: String,
    pub home: String,
    pub away: String,
    pub home_score: Option<u32>,
    pub away_score: Option<u32>,
    pub status: String,
}

impl MatchSummary {
    pub fn score_line(&self) -> String {
        let fmt = |s: Option<u32>| s.map_or(String::new(), |v| v.to_string());
        format!("{} - {}", fmt(self.home_score), fmt(self.away_score))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandingRow {
    pub position: u32,
    pub team: String,
    pub played: u32,
    pub won: u32,
    pub draw: u32,
    pub lost: u32,
    pub goals_for: u32,
    pub goals_against: u32,
    pub points: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScorerRow {
    pub player: String,
    pub team: String,
    pub goals: u32,
    pub assists: Option<u32>,
    pub appearances: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetitionSnapshot {
    pub code: String,
    pub name: String,
    pub matches_today: Vec<MatchSummary>,
    pub standings: Vec<StandingRow>,
    pub scorers: Vec<ScorerRow>,
}

#[async_trait]
pub trait FootballProvider: Send + Sync {
    async fn fetch_competition(&self, code: &str) -> Result<CompetitionSnapshot, FetchError>;
}

/// Human-readable name for the competition codes football-data.org uses.
pub fn competition_name(code: &str) -> &str {
    match code {
        "PL" => "Premier League (ENG)",
        "PD" => "La Liga (ESP)",
        "SA" => "Serie A (ITA)",
        "BL1" => "Bundesliga (GER)",
        "FL1" => "Ligue 1 (FRA)",
        other => other,
    }
}
