use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::core::cache::TtlCache;
use crate::core::error::FetchError;
use crate::core::football::{
    CompetitionSnapshot, FootballProvider, MatchSummary, ScorerRow, StandingRow, competition_name,
};
use crate::providers::util::get_json;

const MATCHES_TTL: Duration = Duration::from_secs(2 * 60);
const TABLES_TTL: Duration = Duration::from_secs(10 * 60);

/// Competitions from the football-data.org v4 API.
pub struct FootballDataProvider {
    base_url: String,
    token: String,
    client: reqwest::Client,
    matches_cache: TtlCache<String, Vec<MatchSummary>>,
    standings_cache: TtlCache<String, Vec<StandingRow>>,
    scorers_cache: TtlCache<String, Vec<ScorerRow>>,
}

impl FootballDataProvider {
    pub fn new(base_url: &str, token: &str, client: reqwest::Client) -> Self {
        FootballDataProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            client,
            matches_cache: TtlCache::new(MATCHES_TTL),
            standings_cache: TtlCache::new(TABLES_TTL),
            scorers_cache: TtlCache::new(TABLES_TTL),
        }
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, url: &str, code: &str) -> Result<T, FetchError> {
        debug!("Requesting {}", url);
        let request = self.client.get(url).header("X-Auth-Token", &self.token);
        get_json(request, code).await
    }

    async fn matches_today(&self, code: &str) -> Result<Vec<MatchSummary>, FetchError> {
        let today = Utc::now().date_naive();
        let key = format!("{code}:{today}");
        if let Some(cached) = self.matches_cache.get(&key).await {
            return Ok(cached);
        }

        let url = format!(
            "{}/v4/competitions/{}/matches?dateFrom={today}&dateTo={today}",
            self.base_url, code
        );
        let data: MatchesResponse = self.get(&url, code).await?;
        let matches: Vec<MatchSummary> = data
            .matches
            .into_iter()
            .map(|m| {
                let full_time = m.score.and_then(|s| s.full_time);
                MatchSummary {
                    kickoff_utc: m.utc_date,
                    home: m.home_team.and_then(|t| t.name).unwrap_or_default(),
                    away: m.away_team.and_then(|t| t.name).unwrap_or_default(),
                    home_score: full_time.as_ref().and_then(|s| s.home),
                    away_score: full_time.as_ref().and_then(|s| s.away),
                    status: m.status,
                }
            })
            .collect();
        self.matches_cache.put(key, matches.clone()).await;
        Ok(matches)
    }

    async fn standings(&self, code: &str) -> Result<Vec<StandingRow>, FetchError> {
        if let Some(cached) = self.standings_cache.get(&code.to_string()).await {
            return Ok(cached);
        }

        let url = format!("{}/v4/competitions/{}/standings", self.base_url, code);
        let data: StandingsResponse = self.get(&url, code).await?;
        let rows: Vec<StandingRow> = data
            .standings
            .into_iter()
            .next()
            .map(|group| group.table)
            .unwrap_or_default()
            .into_iter()
            .map(|row| StandingRow {
                position: row.position,
                team: row.team.and_then(|t| t.name).unwrap_or_default(),
                played: row.played_games,
                won: row.won,
                draw: row.draw,
                lost: row.lost,
                goals_for: row.goals_for,
                goals_against: row.goals_against,
                points: row.points,
            })
            .collect();
        self.standings_cache
            .put(code.to_string(), rows.clone())
            .await;
        Ok(rows)
    }

    async fn scorers(&self, code: &str) -> Result<Vec<ScorerRow>, FetchError> {
        if let Some(cached) = self.scorers_cache.get(&code.to_string()).await {
            return Ok(cached);
        }

        let url = format!("{}/v4/competitions/{}/scorers", self.base_url, code);
        let data: ScorersResponse = self.get(&url, code).await?;
        let mut rows: Vec<ScorerRow> = data
            .scorers
            .into_iter()
            .map(|s| ScorerRow {
                player: s.player.and_then(|p| p.name).unwrap_or_default(),
                team: s.team.and_then(|t| t.name).unwrap_or_default(),
                goals: s.goals.unwrap_or(0),
                assists: s.assists,
                appearances: s.played_matches,
            })
            .collect();
        rows.sort_by(|a, b| {
            b.goals
                .cmp(&a.goals)
                .then_with(|| b.assists.unwrap_or(0).cmp(&a.assists.unwrap_or(0)))
        });
        self.scorers_cache
            .put(code.to_string(), rows.clone())
            .await;
        Ok(rows)
    }
}

#[derive(Debug, Deserialize)]
struct Named {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FullTime {
    home: Option<u32>,
    away: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct Score {
    #[serde(rename = "fullTime")]
    full_time: Option<FullTime>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiMatch {
    #[serde(default)]
    utc_date: String,
    #[serde(default)]
    status: String,
    home_team: Option<Named>,
    away_team: Option<Named>,
    score: Option<Score>,
}

#[derive(Debug, Deserialize)]
struct MatchesResponse {
    #[serde(default)]
    matches: Vec<ApiMatch>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiStandingRow {
    position: u32,
    team: Option<Named>,
    played_games: u32,
    won: u32,
    draw: u32,
    lost: u32,
    points: u32,
    goals_for: u32,
    goals_against: u32,
}

#[derive(Debug, Deserialize)]
struct ApiStandingGroup {
    #[serde(default)]
    table: Vec<ApiStandingRow>,
}

#[derive(Debug, Deserialize)]
struct StandingsResponse {
    #[serde(default)]
    standings: Vec<ApiStandingGroup>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiScorer {
    player: Option<Named>,
    team: Option<Named>,
    goals: Option<u32>,
    assists: Option<u32>,
    played_matches: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ScorersResponse {
    #[serde(default)]
    scorers: Vec<ApiScorer>,
}

#[async_trait]
impl FootballProvider for FootballDataProvider {
    #[instrument(name = "FootballDataFetch", skip(self))]
    async fn fetch_competition(&self, code: &str) -> Result<CompetitionSnapshot, FetchError> {
        let code = code.to_uppercase();
        let (matches_today, standings, scorers) = tokio::try_join!(
            self.matches_today(&code),
            self.standings(&code),
            self.scorers(&code),
        )?;

        Ok(CompetitionSnapshot {
            name: competition_name(&code).to_string(),
            code,
            matches_today,
            standings,
            scorers,
        })
    }
}
