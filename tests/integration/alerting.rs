//! Channel delivery behavior: webhook status handling, alert log rows,
//! and fan-out through a fully configured manager.

use std::sync::Arc;

use chrono::Utc;
use sentinel::alerts::{Alert, AlertKind, AlertManager, ChannelSender};
use sentinel::alerts::webhook::{DiscordSender, SlackSender};
use sentinel::config::{AlertsConfig, WebhookChannelConfig};
use sentinel::storage::models::{CheckInput, Incident};
use sentinel::storage::{MemoryStorage, Storage};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sample_alert(kind: AlertKind) -> Alert {
    Alert {
        kind,
        check: CheckInput {
            name: "api".to_string(),
            url: "https://api.example.com".to_string(),
            ..Default::default()
        }
        .into_check(),
        incident: None,
        error: "connection refused".to_string(),
        timestamp: Utc::now(),
    }
}

#[tokio::test]
async fn slack_accepts_200_and_rejects_other_statuses() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/ok"))
        .and(body_string_contains("attachments"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let ok = SlackSender::new(format!("{}/ok", mock_server.uri()));
    ok.send(&sample_alert(AlertKind::Down)).await.unwrap();

    let broken = SlackSender::new(format!("{}/broken", mock_server.uri()));
    let err = broken.send(&sample_alert(AlertKind::Down)).await.unwrap_err();
    assert!(err.to_string().contains("500"));
}

#[tokio::test]
async fn discord_accepts_204_and_rejects_other_statuses() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/ok"))
        .and(body_string_contains("embeds"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(400))
        .mount(&mock_server)
        .await;

    let ok = DiscordSender::new(format!("{}/ok", mock_server.uri()));
    ok.send(&sample_alert(AlertKind::Recovery)).await.unwrap();

    let broken = DiscordSender::new(format!("{}/broken", mock_server.uri()));
    let err = broken
        .send(&sample_alert(AlertKind::Recovery))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("400"));
}

#[tokio::test]
async fn manager_fans_out_and_logs_each_attempt() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/slack"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/discord"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    let storage = Arc::new(MemoryStorage::new());
    let config = AlertsConfig {
        slack: WebhookChannelConfig {
            enabled: true,
            webhook_url: format!("{}/slack", mock_server.uri()),
        },
        discord: WebhookChannelConfig {
            enabled: true,
            webhook_url: format!("{}/discord", mock_server.uri()),
        },
        ..Default::default()
    };
    let manager = AlertManager::new(config, storage.clone());

    let check = storage
        .create_check(
            &CheckInput {
                name: "api".to_string(),
                url: "https://api.example.com".to_string(),
                ..Default::default()
            }
            .into_check(),
        )
        .await
        .unwrap();
    let incident = storage
        .create_incident(&Incident {
            id: 0,
            check_id: check.id,
            started_at: Utc::now(),
            ended_at: None,
            duration_seconds: None,
            cause: "HTTP 503".to_string(),
            check_name: String::new(),
        })
        .await
        .unwrap();

    manager
        .send_down(&check, &incident, "HTTP 503")
        .await
        .unwrap();

    let slack_log = storage
        .last_alert_for_incident(incident.id, "slack")
        .await
        .unwrap()
        .unwrap();
    assert!(slack_log.success);

    let discord_log = storage
        .last_alert_for_incident(incident.id, "discord")
        .await
        .unwrap()
        .unwrap();
    assert!(discord_log.success);
}

#[tokio::test]
async fn partial_failure_still_delivers_remaining_channels() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/slack"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/discord"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    let storage = Arc::new(MemoryStorage::new());
    let config = AlertsConfig {
        slack: WebhookChannelConfig {
            enabled: true,
            webhook_url: format!("{}/slack", mock_server.uri()),
        },
        discord: WebhookChannelConfig {
            enabled: true,
            webhook_url: format!("{}/discord", mock_server.uri()),
        },
        ..Default::default()
    };
    let manager = AlertManager::new(config, storage.clone());

    let check = storage
        .create_check(
            &CheckInput {
                name: "api".to_string(),
                url: "https://api.example.com".to_string(),
                ..Default::default()
            }
            .into_check(),
        )
        .await
        .unwrap();
    let incident = storage
        .create_incident(&Incident {
            id: 0,
            check_id: check.id,
            started_at: Utc::now(),
            ended_at: None,
            duration_seconds: None,
            cause: String::new(),
            check_name: String::new(),
        })
        .await
        .unwrap();

    // The dispatcher reports the slack failure but discord still delivered.
    let result = manager.send_down(&check, &incident, "boom").await;
    assert!(result.is_err());

    let slack_log = storage
        .last_alert_for_incident(incident.id, "slack")
        .await
        .unwrap()
        .unwrap();
    assert!(!slack_log.success);
    assert!(slack_log.error_message.contains("500"));

    let discord_log = storage
        .last_alert_for_incident(incident.id, "discord")
        .await
        .unwrap()
        .unwrap();
    assert!(discord_log.success);
}
