use serde_json::{json, Value};
use wager_advisor::engine::Tier;
use wager_advisor::{AdvisoryEngine, DeVigMethod, EngineConfig, EngineResult, MarketKey, Sport};

fn engine() -> AdvisoryEngine {
    AdvisoryEngine::new(EngineConfig::default()).expect("default config is valid")
}

fn football_match() -> Value {
    json!({
        "sport": "Soccer",
        "homeTeam": "Arsenal",
        "awayTeam": "Burnley",
        "league": "Premier League",
        "kickoff": "2026-10-24T14:00:00Z",
        "signals": { "home_xg": 2.0, "away_xg": 0.8 },
        "odds": {
            "1x2": { "1": 2.50, "x": 3.40, "2": 2.90 },
            "totals": [
                { "line": 2.5, "over": 1.95, "under": 1.90 },
                { "line": 3.5, "over": 3.20, "under": 1.35 }
            ],
            "btts": { "yes": 1.85, "no": 1.95 }
        }
    })
}

/// Invariants every evaluated match must satisfy
fn assert_sane(res: &EngineResult, cfg: &EngineConfig) {
    let mut total = 0.0;
    for r in &res.recommendations {
        assert!((0.0..=1.0).contains(&r.model_probability), "{}", r.label());
        assert!(r.price > 1.0);
        assert!(r.ev.is_finite());
        assert!(r.stake_fraction >= 0.0 && r.stake_fraction <= cfg.staking.max_stake + 1e-12);
        if r.ev <= 0.0 {
            assert_eq!(r.stake_fraction, 0.0, "{} has no edge but a stake", r.label());
            assert_eq!(r.tier, Tier::Avoid);
        }
        total += r.stake_fraction;
    }
    assert!(total <= cfg.staking.max_total_stake + 1e-9);

    for pair in res.recommendations.windows(2) {
        assert!(pair[0].ev >= pair[1].ev, "recommendations not sorted by EV");
    }
    // One-sided markets keep the raw implied probability
    for m in res.markets.iter().filter(|m| m.complete && m.devig_method != Some(DeVigMethod::Raw)) {
        let sum: f64 = m.fair.values().sum();
        assert!((sum - 1.0).abs() < 1e-6, "{} fair sum {sum}", m.market);
    }
}

#[test]
fn football_value_on_strong_favourite() {
    let cfg = EngineConfig::default();
    let res = engine().evaluate_value(&football_match());

    assert_eq!(res.sport, Sport::Football);
    assert_eq!(res.formula_id, "FOOTBALL_POISSON");
    assert!(res.validation.ok, "{:?}", res.validation.errors);
    assert_sane(&res, &cfg);

    let home = res
        .recommendations
        .iter()
        .find(|r| r.market == MarketKey::MatchResult && r.selection == "home")
        .expect("home 1X2 priced");
    assert!(home.model_probability > 0.5);
    assert!(home.ev > 0.0);
    assert!(home.stake_fraction > 0.0);
    assert!(home.tier.is_recommended());
    assert!(res.has_bets());

    // Only the default total line is carried through
    assert!(res
        .markets
        .iter()
        .any(|m| m.market == MarketKey::Total { line: 2.5 }));
    assert!(!res
        .markets
        .iter()
        .any(|m| m.market == MarketKey::Total { line: 3.5 }));
}

#[test]
fn every_sport_produces_a_sane_result() {
    let cfg = EngineConfig::default();
    let inputs = [
        json!({ "sport": "nba", "teams": ["Celtics", "Knicks"],
                "signals": { "home_ortg": 120, "away_ortg": 112 },
                "odds": { "moneyline": { "home": 1.8, "away": 2.1 },
                          "spread": { "line": -3.5, "home": 1.91, "away": 1.91 },
                          "totals": { "line": 228.5, "over": 1.9, "under": 1.9 } } }),
        json!({ "sport": "ATP", "teams": ["Sinner", "Rune"],
                "signals": { "home_hold": 0.88, "away_hold": 0.80, "surface": "hard" },
                "odds": { "moneyline": { "home": 1.5, "away": 2.7 } } }),
        json!({ "sport": "NHL", "teams": ["Rangers", "Bruins"],
                "signals": { "home_xg": 3.2, "away_xg": 2.7, "away_gsax": -4.0 },
                "odds": { "moneyline": { "home": 1.9, "away": 2.0 },
                          "totals": { "line": 5.5, "over": 1.95, "under": 1.87 } } }),
        json!({ "sport": "MLB", "teams": ["Yankees", "Red Sox"],
                "signals": { "home_sp_fip": 3.1, "away_sp_fip": 4.6 },
                "odds": { "moneyline": { "home": 1.75, "away": 2.15 },
                          "totals": { "line": 8.5, "over": 1.9, "under": 1.9 } } }),
        json!({ "sport": "NFL", "teams": ["Chiefs", "Bills"],
                "odds": { "moneyline": { "home": 1.8, "away": 2.05 },
                          "spread": { "line": -3.0, "home": 1.91, "away": 1.91 },
                          "totals": { "line": 47.5, "over": 1.91, "under": 1.91 } } }),
    ];
    let expected = [
        Sport::Basketball,
        Sport::Tennis,
        Sport::Hockey,
        Sport::Baseball,
        Sport::Gridiron,
    ];

    let results = engine().evaluate_batch(&inputs);
    assert_eq!(results.len(), expected.len());
    for (res, sport) in results.iter().zip(expected) {
        assert_eq!(res.sport, sport);
        assert!(res.validation.ok, "{sport}: {:?}", res.validation.errors);
        assert!(!res.recommendations.is_empty(), "{sport} produced nothing");
        assert_sane(res, &cfg);
    }
}

#[test]
fn batch_survives_malformed_entries() {
    let inputs = vec![json!("not a match"), football_match(), json!({ "odds": { "1x2": { "1": "abc" } } })];
    let results = engine().evaluate_batch(&inputs);

    assert_eq!(results.len(), 3);
    assert!(results[0].recommendations.is_empty());
    assert!(results[0].warnings.iter().any(|w| w.contains("not a JSON object")));
    assert!(results[1].has_bets());
    assert!(results[2].recommendations.is_empty());
    assert!(results[2].warnings.iter().any(|w| w.contains("invalid price")));
}

#[test]
fn unknown_sport_falls_back_to_market_tilt() {
    let cfg = EngineConfig::default();
    let res = engine().evaluate_value(&json!({
        "sport": "curling",
        "teams": ["Sweden", "Canada"],
        "signals": { "skew": 0.06 },
        "odds": { "moneyline": { "home": 2.0, "away": 1.9 } }
    }));

    assert_eq!(res.sport, Sport::Generic);
    assert_eq!(res.formula_id, "GENERIC_MARKET_TILT");
    assert!(res.warnings.iter().any(|w| w.contains("unrecognized sport 'curling'")));
    assert_sane(&res, &cfg);

    let home = res
        .recommendations
        .iter()
        .find(|r| r.market == MarketKey::Moneyline && r.selection == "home")
        .expect("home priced");
    let fair = 1.9 / 3.9;
    assert!((home.model_probability - (fair + 0.06)).abs() < 1e-9);
    assert!(home.ev > 0.0);
}

#[test]
fn football_player_props_in_the_rain() {
    let cfg = EngineConfig::default();
    let mut input = football_match();
    input["signals"]["weather"] = json!("heavy rain");
    input["player_analysis"] = json!([
        { "name": "Bukayo Saka", "team": "home", "vs_opponent_avg": 0.6 },
        { "name": "Jay Rodriguez", "team": "away", "shots": 1.2 }
    ]);
    input["odds"]["player_props"] = json!([
        { "player": "Saka", "market": "anytime goalscorer", "yes": 3.5 },
        { "player": "Jay Rodriguez", "market": "shots", "line": 1.5, "over": 2.4, "under": 1.55 }
    ]);

    let res = engine().evaluate_value(&input);
    assert_eq!(res.formula_id, "FOOTBALL_POISSON");
    assert!((res.stats["weather_factor"] - 0.9).abs() < 1e-12);
    assert!(res.notes.iter().any(|n| n.contains("rain")));
    assert_sane(&res, &cfg);

    let saka = res
        .recommendations
        .iter()
        .find(|r| r.market == MarketKey::PlayerScorer { player: 0 })
        .expect("scorer prop priced");
    assert_eq!(saka.player.as_deref(), Some("Bukayo Saka"));
    assert!((saka.model_probability - (1.0 - (-0.6f64).exp())).abs() < 1e-9);
    assert!(saka.label().contains("Bukayo Saka"));
    assert!(saka.ev > 0.0);

    let shots = res
        .markets
        .iter()
        .find(|m| m.market == MarketKey::PlayerShots { player: 1, line: 1.5 })
        .expect("shots market summarized");
    assert!(shots.complete);
    assert_ne!(shots.devig_method, Some(DeVigMethod::Raw));
    let scorer = res
        .markets
        .iter()
        .find(|m| m.market == MarketKey::PlayerScorer { player: 0 })
        .expect("scorer market summarized");
    assert_eq!(scorer.devig_method, Some(DeVigMethod::Raw));
}

#[test]
fn combo_of_two_legs_from_one_match() {
    let engine = engine();
    let res = engine.evaluate_value(&football_match());
    let legs: Vec<_> = res
        .recommendations
        .iter()
        .take(2)
        .map(|r| r.as_combo_leg(&res.match_id))
        .collect();
    assert_eq!(legs.len(), 2);

    let combo = engine.evaluate_combo(&legs, None).expect("valid legs");
    assert!(combo.correlated);
    let raw: f64 = legs.iter().map(|l| l.probability).product();
    assert!((combo.probability - raw * 0.92).abs() < 1e-9);
    assert!((combo.combined_price - legs[0].price * legs[1].price).abs() < 1e-9);

    assert!(engine.evaluate_combo(&[], None).is_err());
}

#[test]
fn tagged_input_matches_untagged() {
    let tagged = json!({
        "shape": "nested",
        "header": { "sport": "football", "home_team": "Arsenal", "away_team": "Burnley",
                    "league": "Premier League", "kickoff": "2026-10-24T14:00:00Z",
                    "signals": { "home_xg": 2.0, "away_xg": 0.8 } },
        "odds": {
            "match_result": { "home": 2.50, "draw": 3.40, "away": 2.90 },
            "totals": { "line": 2.5, "over": 1.95, "under": 1.90 },
            "btts": { "yes": 1.85, "no": 1.95 }
        }
    });
    let a = engine().evaluate_value(&tagged);
    let b = engine().evaluate_value(&football_match());
    assert_eq!(a.match_id, b.match_id);
    assert_eq!(a.recommendations, b.recommendations);
}

#[test]
fn json_text_entry_point() {
    let text = serde_json::to_string(&football_match()).unwrap();
    assert!(engine().evaluate_json(&text).is_ok());
    assert!(engine().evaluate_json("{ not json").is_err());
}
