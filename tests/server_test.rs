//! Integration tests for the session-agent HTTP server

#[cfg(feature = "server")]
mod server_tests {
    use presence_session_agent::server::{run, ServerConfig};
    use presence_session_agent::Config;
    use std::time::Duration;

    fn test_agent_config() -> Config {
        Config {
            rssi_threshold: -50,
            session_logging_enabled: false,
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        // Create server config with random port
        let config = ServerConfig::new(0, test_agent_config());

        // Start server
        let (addr, shutdown_tx) = run(config).await.expect("Failed to start server");

        // Give server time to start
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Test health endpoint
        let client = reqwest::Client::new();
        let response = client
            .get(format!("http://{}/health", addr))
            .send()
            .await
            .expect("Failed to send request");

        assert!(response.status().is_success());

        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body["status"], "ok");
        assert!(body["version"].as_str().is_some());

        // Shutdown server
        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_raddec_ingest_emits_and_drops() {
        let config = ServerConfig::new(0, test_agent_config());
        let (addr, shutdown_tx) = run(config).await.expect("Failed to start server");

        tokio::time::sleep(Duration::from_millis(100)).await;

        let client = reqwest::Client::new();

        // Above threshold with the accept-all default: a session starts.
        let strong = serde_json::json!({
            "transmitterSignature": "aabbccddeeff/2",
            "rssiSignature": [
                {"receiverId": "001bc50940810000", "receiverIdType": 1,
                 "rssi": -42, "numberOfDecodings": 3}
            ],
            "packets": [],
            "initialTime": 1000
        });

        let response = client
            .post(format!("http://{}/raddec", addr))
            .json(&strong)
            .send()
            .await
            .expect("Failed to send request");

        assert!(response.status().is_success());
        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body["status"], "emitted");
        assert_eq!(body["snapshot"]["instanceId"], "aabbccddeeff/2");
        assert_eq!(body["snapshot"]["nearest"][0]["rssi"], -42);
        let first_session = body["snapshot"]["sessionId"]
            .as_str()
            .expect("session id present")
            .to_string();

        // Same signature again: the session continues under the same id.
        let response = client
            .post(format!("http://{}/raddec", addr))
            .json(&strong)
            .send()
            .await
            .expect("Failed to send request");
        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body["snapshot"]["sessionId"], first_session.as_str());

        // Below threshold for an unknown signature: explicit no-op.
        let weak = serde_json::json!({
            "transmitterSignature": "ffeeddccbbaa/2",
            "rssiSignature": [
                {"receiverId": "001bc50940810000", "receiverIdType": 1,
                 "rssi": -90, "numberOfDecodings": 1}
            ],
            "packets": [],
            "initialTime": 2000
        });

        let response = client
            .post(format!("http://{}/raddec", addr))
            .json(&weak)
            .send()
            .await
            .expect("Failed to send request");

        assert!(response.status().is_success());
        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body["status"], "dropped");
        assert!(body.get("snapshot").is_none());

        // Shutdown server
        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_malformed_raddec_is_rejected() {
        let config = ServerConfig::new(0, test_agent_config());
        let (addr, shutdown_tx) = run(config).await.expect("Failed to start server");

        tokio::time::sleep(Duration::from_millis(100)).await;

        let client = reqwest::Client::new();
        let response = client
            .post(format!("http://{}/raddec", addr))
            .header("Content-Type", "application/json")
            .body("{\"not\": \"a raddec\"}")
            .send()
            .await
            .expect("Failed to send request");

        assert!(response.status().is_client_error());

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_cors_headers() {
        let config = ServerConfig::new(0, test_agent_config());
        let (addr, shutdown_tx) = run(config).await.expect("Failed to start server");

        tokio::time::sleep(Duration::from_millis(100)).await;

        // Send OPTIONS request to check CORS
        let client = reqwest::Client::new();
        let response = client
            .request(reqwest::Method::OPTIONS, format!("http://{}/raddec", addr))
            .header("Origin", "http://localhost")
            .header("Access-Control-Request-Method", "POST")
            .send()
            .await
            .expect("Failed to send request");

        // CORS preflight should succeed
        assert!(
            response.status().is_success() || response.status() == reqwest::StatusCode::NO_CONTENT,
            "CORS preflight failed: {}",
            response.status()
        );

        // Shutdown server
        let _ = shutdown_tx.send(());
    }
}
