//! Per-player extraction from a replay detail payload.
//!
//! Only the fields that end up in the summary table are decoded; missing stat blocks read
//! as zero so older replays without e.g. movement stats still produce a row.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
struct ReplayDetail {
    id: String,
    #[serde(default)]
    created: String,
    #[serde(default)]
    blue: TeamDetail,
    #[serde(default)]
    orange: TeamDetail,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct TeamDetail {
    #[serde(default)]
    players: Vec<PlayerDetail>,
}

#[derive(Debug, Clone, Deserialize)]
struct PlayerDetail {
    #[serde(default)]
    name: String,
    #[serde(default)]
    stats: PlayerStats,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct PlayerStats {
    core: CoreStats,
    boost: BoostStats,
    movement: MovementStats,
    demo: DemoStats,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct CoreStats {
    shots: u32,
    goals: u32,
    saves: u32,
    assists: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct BoostStats {
    bpm: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct MovementStats {
    avg_speed: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct DemoStats {
    inflicted: u32,
}

impl TeamDetail {
    fn goals(&self) -> u32 {
        self.players.iter().map(|p| p.stats.core.goals).sum()
    }

    fn player(&self, name: &str) -> Option<&PlayerDetail> {
        self.players.iter().find(|p| p.name == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Blue,
    Orange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Win,
    Loss,
}

/// One row of the summary table: the tracked player's line for one replay.
///
/// Field order is the column order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRow {
    pub id: String,
    pub date: String,
    pub team: Side,
    pub outcome: Outcome,
    pub team_goals: u32,
    pub opponent_goals: u32,
    pub shots: u32,
    pub goals: u32,
    pub saves: u32,
    pub assists: u32,
    pub demos: u32,
    pub boost_bpm: f64,
    pub avg_speed: f64,
}

impl SummaryRow {
    pub const HEADERS: [&'static str; 13] = [
        "id",
        "date",
        "team",
        "outcome",
        "team_goals",
        "opponent_goals",
        "shots",
        "goals",
        "saves",
        "assists",
        "demos",
        "boost_bpm",
        "avg_speed",
    ];
}

/// Builds the summary row for `player` from a replay payload.
///
/// `Ok(None)` when the player did not play in this replay; `Err` when the payload does not
/// look like a replay at all.
pub fn extract_player_row(
    replay: &serde_json::Value,
    player: &str,
) -> Result<Option<SummaryRow>, serde_json::Error> {
    let detail = ReplayDetail::deserialize(replay)?;

    let (side, me, own, other) = if let Some(me) = detail.blue.player(player) {
        (Side::Blue, me, &detail.blue, &detail.orange)
    } else if let Some(me) = detail.orange.player(player) {
        (Side::Orange, me, &detail.orange, &detail.blue)
    } else {
        return Ok(None);
    };

    let team_goals = own.goals();
    let opponent_goals = other.goals();
    // A tie cannot happen in a finished match; it is reported as a loss.
    let outcome = if team_goals > opponent_goals {
        Outcome::Win
    } else {
        Outcome::Loss
    };

    let s = &me.stats;
    Ok(Some(SummaryRow {
        id: detail.id.clone(),
        date: detail.created.clone(),
        team: side,
        outcome,
        team_goals,
        opponent_goals,
        shots: s.core.shots,
        goals: s.core.goals,
        saves: s.core.saves,
        assists: s.core.assists,
        demos: s.demo.inflicted,
        boost_bpm: s.boost.bpm,
        avg_speed: s.movement.avg_speed,
    }))
}
