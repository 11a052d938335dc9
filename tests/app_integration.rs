use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::fs;
use tracing::info;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use xbal::core::config::AppConfig;
use xbal::core::credentials::{ApiCredential, CredentialUpdate, PassphraseCredential};
use xbal::core::crypto::FixedHostIdentity;
use xbal::core::exchange::ExchangeAccount;
use xbal::core::history::TimeRange;
use xbal::{App, AppCommand};

mod test_utils {
    use super::*;

    pub async fn create_binance_mock_server() -> MockServer {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/account"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"balances": [
                    {"asset": "BTC", "free": "0.01", "locked": "0"},
                    {"asset": "USDT", "free": "300", "locked": "200"}
                ]}"#,
            ))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v3/ticker/price"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"[{"symbol": "BTCUSDT", "price": "50000"}]"#),
            )
            .mount(&mock_server)
            .await;
        mock_server
    }

    pub async fn create_okx_mock_server() -> MockServer {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v5/account/balance"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"code": "0", "msg": "", "data": [{"details": [
                    {"ccy": "USDC", "cashBal": "1000", "availBal": "1000", "eqUsd": "999.9"}
                ]}]}"#,
            ))
            .mount(&mock_server)
            .await;
        mock_server
    }

    pub fn write_config(dir: &std::path::Path, binance: &str, okx: &str) -> std::path::PathBuf {
        let config_path = dir.join("config.yaml");
        let data_path = dir.join("data");
        let config_content = format!(
            r#"
accounts:
  - exchange: bybit
  - exchange: binance
  - exchange: okx
cash:
  value_usd: 250
providers:
  binance:
    base_url: "{}"
  okx:
    base_url: "{}"
request_timeout_secs: 5
data_path: "{}"
"#,
            binance,
            okx,
            data_path.display()
        );
        fs::write(&config_path, config_content).expect("Failed to write config file");
        config_path
    }
}

fn open_app(config_path: &std::path::Path) -> App {
    let config = AppConfig::load_from_path(config_path).expect("Failed to load config");
    App::open_with_host(config, &FixedHostIdentity("integration-host".into()))
        .expect("Failed to open app")
}

#[test_log::test(tokio::test)]
async fn test_full_app_flow_with_mock_exchanges() {
    let binance = test_utils::create_binance_mock_server().await;
    let okx = test_utils::create_okx_mock_server().await;
    let dir = tempfile::tempdir().unwrap();
    let config_path = test_utils::write_config(dir.path(), &binance.uri(), &okx.uri());

    let app = open_app(&config_path);
    app.run(AppCommand::SetCredentials(CredentialUpdate::Binance(
        ApiCredential::new("binance-key", "binance-secret"),
    )))
    .await
    .unwrap();
    app.run(AppCommand::SetCredentials(CredentialUpdate::Okx {
        slot: 0,
        credential: PassphraseCredential::new("okx-key", "okx-secret", "okx-pass"),
    }))
    .await
    .unwrap();

    let reports = app.aggregator.get_all_balances().await;
    info!(?reports, "Fetched balances");
    let labels: Vec<_> = reports.iter().map(|r| r.exchange.as_str()).collect();
    assert_eq!(labels, vec!["Bybit", "Binance", "OKX", "Cash"]);
    assert_eq!(
        reports[0].error.as_deref(),
        Some("Bybit API credentials not set")
    );
    assert_eq!(reports[1].total_usd, dec!(1000));
    assert_eq!(reports[2].total_usd, dec!(1000));
    assert_eq!(reports[3].total_usd, dec!(250));

    let result = app.run(AppCommand::Balances { record: true }).await;
    assert!(result.is_ok(), "Balances failed with: {:?}", result.err());

    let history = app.history.get_history(TimeRange::Week).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].total_usd, dec!(2250));
    assert_eq!(history[0].per_exchange["Bybit"], Decimal::ZERO);
    assert_eq!(history[0].per_exchange["Cash"], dec!(250));

    assert!(app.run(AppCommand::History { range: TimeRange::All }).await.is_ok());
    assert!(app.run(AppCommand::Metrics).await.is_ok());
}

#[test_log::test(tokio::test)]
async fn test_credentials_persist_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let config_path =
        test_utils::write_config(dir.path(), "http://127.0.0.1:9", "http://127.0.0.1:9");

    {
        let app = open_app(&config_path);
        app.run(AppCommand::SetCredentials(CredentialUpdate::Bybit(
            ApiCredential::new("key", "secret"),
        )))
        .await
        .unwrap();
    }

    let app = open_app(&config_path);
    assert!(app.credentials.credential(&ExchangeAccount::Bybit).is_some());
    assert!(app.credentials.credential(&ExchangeAccount::Binance).is_none());

    app.run(AppCommand::ClearCredentials).await.unwrap();
    drop(app);

    let app = open_app(&config_path);
    assert!(app.credentials.credential(&ExchangeAccount::Bybit).is_none());
}

#[test_log::test(tokio::test)]
async fn test_credentials_unreadable_on_other_host() {
    let dir = tempfile::tempdir().unwrap();
    let config_path =
        test_utils::write_config(dir.path(), "http://127.0.0.1:9", "http://127.0.0.1:9");

    {
        let app = open_app(&config_path);
        app.run(AppCommand::SetCredentials(CredentialUpdate::Binance(
            ApiCredential::new("key", "secret"),
        )))
        .await
        .unwrap();
    }

    let config = AppConfig::load_from_path(&config_path).unwrap();
    let app = App::open_with_host(config, &FixedHostIdentity("another-host".into())).unwrap();
    assert!(app.credentials.credential(&ExchangeAccount::Binance).is_none());
}

#[test_log::test(tokio::test)]
async fn test_run_command_with_missing_config_file() {
    let result = xbal::run_command(
        AppCommand::Metrics,
        Some("/nonexistent/xbal/config.yaml"),
    )
    .await;
    assert!(result.is_err());
    assert!(
        result
            .unwrap_err()
            .to_string()
            .contains("Failed to read config file")
    );
}
