use pulseboard::core::alert::{AlertStore, Direction};
use rust_decimal::Decimal;
use std::fs;
use std::path::Path;
use tracing::info;

// Adds automatic logging to test
mod test_utils {
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub async fn create_yahoo_mock_server(symbol: &str, mock_response: &str) -> MockServer {
        let mock_server = MockServer::start().await;
        let url_path = format!("/v8/finance/chart/{symbol}");

        Mock::given(method("GET"))
            .and(path(&url_path))
            .respond_with(ResponseTemplate::new(200).set_body_string(mock_response))
            .mount(&mock_server)
            .await;

        mock_server
    }

    pub async fn create_binance_mock_server(symbol: &str, price: &str) -> MockServer {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v3/ticker/price"))
            .and(query_param("symbol", symbol))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(format!(r#"{{"symbol": "{symbol}", "price": "{price}"}}"#)),
            )
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v3/klines"))
            .and(query_param("symbol", symbol))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
            .mount(&mock_server)
            .await;

        mock_server
    }
}

fn write_config(dir: &Path, body: &str) -> String {
    let config_path = dir.join("config.yaml");
    fs::write(&config_path, body).expect("Failed to write config file");
    config_path.to_str().unwrap().to_string()
}

#[test_log::test(tokio::test)]
async fn test_once_fetches_quotes_and_fires_alerts() {
    let yahoo_response = r#"{
        "chart": {
            "result": [{
                "meta": {"regularMarketPrice": 180.0, "regularMarketTime": 1700000000},
                "timestamp": [1699999700, 1700000000],
                "indicators": {"quote": [{"close": [178.5, 180.0]}]}
            }]
        }
    }"#;
    let yahoo = test_utils::create_yahoo_mock_server("AAPL", yahoo_response).await;
    let binance = test_utils::create_binance_mock_server("BTCUSDT", "50500.00").await;

    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let alerts_path = dir.path().join("alerts.json");
    fs::write(
        &alerts_path,
        r#"{
            "btc-50k": {"symbol": "BTCUSDT", "threshold": 50000.0, "direction": "above", "armed": true},
            "aapl-200": {"symbol": "AAPL", "threshold": 200.0, "direction": "above"},
            "broken": {"symbol": "AAPL", "threshold": -1.0, "direction": "above"}
        }"#,
    )
    .unwrap();

    let config_path = write_config(
        dir.path(),
        &format!(
            r#"
            refresh_interval_secs: 5
            retry:
              retries: 0
              delay_ms: 0
            quotes:
              equities: [aapl]
              crypto: [BTCUSDT]
            portfolio:
              - symbol: AAPL
                quantity: 10
                cost_basis: 150
              - symbol: ""
                quantity: 1
                cost_basis: 1
            alerts_path: "{}"
            providers:
              yahoo:
                base_url: {}
              binance:
                base_url: {}
            "#,
            alerts_path.display(),
            yahoo.uri(),
            binance.uri()
        ),
    );

    let result =
        pulseboard::run_command(pulseboard::AppCommand::Once, Some(config_path.as_str())).await;
    assert!(
        result.is_ok(),
        "Main function failed with: {:?}",
        result.err()
    );

    let (book, warnings) = AlertStore::new(&alerts_path).load().unwrap();
    info!(?warnings, "Alert file after one cycle");
    // The rewrite keeps only the rules that loaded.
    assert!(warnings.is_empty());
    assert_eq!(book.len(), 2);
    assert!(!book.get("btc-50k").unwrap().armed);
    assert!(book.get("aapl-200").unwrap().armed);
}

#[test_log::test(tokio::test)]
async fn test_once_survives_unreachable_upstream() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let alerts_path = dir.path().join("alerts.json");
    let config_path = write_config(
        dir.path(),
        &format!(
            r#"
            retry:
              retries: 0
              delay_ms: 0
            quotes:
              equities: [AAPL]
            alerts_path: "{}"
            providers:
              yahoo:
                base_url: "http://127.0.0.1:9"
            "#,
            alerts_path.display()
        ),
    );

    let result =
        pulseboard::run_command(pulseboard::AppCommand::Once, Some(config_path.as_str())).await;
    assert!(result.is_ok(), "Fetch failures must not be fatal: {result:?}");
}

#[test_log::test(tokio::test)]
async fn test_alert_commands_round_trip_through_file() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let alerts_path = dir.path().join("alerts.json");
    let config_path = write_config(
        dir.path(),
        &format!("alerts_path: \"{}\"\n", alerts_path.display()),
    );
    let run = |cmd| {
        pulseboard::run_command(
            pulseboard::AppCommand::Alerts(cmd),
            Some(config_path.as_str()),
        )
    };

    run(pulseboard::AlertCommand::Add {
        id: "eth".to_string(),
        symbol: "ethusdt".to_string(),
        threshold: Decimal::from(4000),
        direction: Direction::Below,
    })
    .await
    .unwrap();
    run(pulseboard::AlertCommand::List).await.unwrap();

    let (book, _) = AlertStore::new(&alerts_path).load().unwrap();
    let rule = book.get("eth").unwrap();
    assert_eq!(rule.symbol, "ETHUSDT");
    assert_eq!(rule.direction, Direction::Below);

    run(pulseboard::AlertCommand::Rearm {
        id: "eth".to_string(),
    })
    .await
    .unwrap();
    run(pulseboard::AlertCommand::Remove {
        id: "eth".to_string(),
    })
    .await
    .unwrap();
    let (book, _) = AlertStore::new(&alerts_path).load().unwrap();
    assert!(book.is_empty());

    let missing = run(pulseboard::AlertCommand::Remove {
        id: "eth".to_string(),
    })
    .await;
    assert!(missing.is_err());
}
