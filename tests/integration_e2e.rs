//! End-to-end scenarios from spec.md §8, run against a real Relay process, a
//! real Agent transport client, and real loopback local services -- the
//! "black-box scenario tests ... over loopback sockets" SPEC_FULL.md §8
//! calls for.

use std::sync::Arc;
use std::time::Duration;

use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use reqwest::StatusCode;
use tokio::net::TcpListener;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use url::Url;

use tunnelforge::agent::admin::AgentState;
use tunnelforge::agent::build_pipeline;
use tunnelforge::agent::transport::{self, AgentTransportConfig};
use tunnelforge::relay::{self, RelayState};
use tunnelforge::rules::{ChaosRule, MockRule, RoutingRule, RuleStore};

/// Starts the relay on a loopback port and returns its base HTTP URL and the
/// `ws://.../tunnel` URL agents should dial.
async fn start_relay() -> (RelayState, String, Url) {
    let state = RelayState::new();
    let app = relay::app(state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    let http_base = format!("http://{addr}");
    let ws_url = Url::parse(&format!("ws://{addr}/tunnel")).unwrap();
    (state, http_base, ws_url)
}

/// Connects one agent to the relay and returns its rule store, a handle that
/// can cancel the connection, and the join handle of the transport task.
struct RunningAgent {
    store: Arc<RuleStore>,
    shutdown: CancellationToken,
    task: tokio::task::JoinHandle<()>,
}

async fn start_agent(relay_ws: Url, agent_id: &str, default_local_port: u16) -> RunningAgent {
    let store = Arc::new(RuleStore::new());
    let shutdown = CancellationToken::new();
    let pipeline = Arc::new(build_pipeline(store.clone(), default_local_port, shutdown.clone()));
    let state = Arc::new(AgentState::new(agent_id.to_string()));
    let config = AgentTransportConfig {
        relay_url: relay_ws,
        agent_id: agent_id.to_string(),
    };
    let task = tokio::spawn(transport::run(config, store.clone(), pipeline, state, shutdown.clone()));
    RunningAgent { store, shutdown, task }
}

async fn wait_until_online(relay: &RelayState, agent_id: &str) {
    for _ in 0..100 {
        if relay.registry.is_online(agent_id) {
            return;
        }
        sleep(Duration::from_millis(20)).await;
    }
    panic!("agent {agent_id} never came online");
}

async fn start_local_echo(port: u16) {
    let app = Router::new().route(
        "/{*path}",
        get(|| async { "local-echo".into_response() }),
    );
    let listener = TcpListener::bind(format!("127.0.0.1:{port}")).await.unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    sleep(Duration::from_millis(50)).await;
}

fn public_request(client: &reqwest::Client, base: &str, agent_id: &str, path: &str) -> reqwest::RequestBuilder {
    client
        .get(format!("{base}{path}"))
        .header(reqwest::header::HOST, format!("{agent_id}.example"))
}

#[tokio::test]
async fn mock_short_circuit_never_reaches_local_service() {
    let (relay_state, base, ws_url) = start_relay().await;
    let agent = start_agent(ws_url, "mockagent", 1).await;
    wait_until_online(&relay_state, "mockagent").await;

    agent.store.add_mock(MockRule {
        id: "m1".into(),
        name: "users".into(),
        path_pattern: "/api/users".into(),
        method: Some("GET".into()),
        enabled: true,
        status_code: 200,
        content_type: "application/json".into(),
        response_body: "[]".into(),
    });

    let client = reqwest::Client::new();
    let resp = public_request(&client, &base, "mockagent", "/api/users")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get(reqwest::header::CONTENT_TYPE).unwrap(),
        "application/json"
    );
    assert_eq!(resp.text().await.unwrap(), "[]");

    agent.shutdown.cancel();
    let _ = agent.task.await;
}

#[tokio::test]
async fn routing_rule_sends_matched_path_elsewhere_and_default_port_otherwise() {
    let (relay_state, base, ws_url) = start_relay().await;
    let agent = start_agent(ws_url, "router-agent", 19102).await;
    wait_until_online(&relay_state, "router-agent").await;

    start_local_echo(19101).await;
    start_local_echo(19102).await;

    agent.store.add_routing(RoutingRule {
        id: "r1".into(),
        name: "api".into(),
        path_pattern: "/api/*".into(),
        target_base_url: "http://localhost:19101".into(),
        enabled: true,
        priority: 0,
    });

    let client = reqwest::Client::new();
    let via_rule = public_request(&client, &base, "router-agent", "/api/v1/ping")
        .send()
        .await
        .unwrap();
    assert_eq!(via_rule.status(), StatusCode::OK);
    assert_eq!(via_rule.text().await.unwrap(), "local-echo");

    let via_default = public_request(&client, &base, "router-agent", "/health")
        .send()
        .await
        .unwrap();
    assert_eq!(via_default.status(), StatusCode::OK);

    agent.shutdown.cancel();
    let _ = agent.task.await;
}

#[tokio::test]
async fn chaos_latency_delays_the_public_response() {
    let (relay_state, base, ws_url) = start_relay().await;
    let agent = start_agent(ws_url, "slow-agent", 19201).await;
    wait_until_online(&relay_state, "slow-agent").await;
    start_local_echo(19201).await;

    agent.store.add_chaos(ChaosRule {
        id: "c1".into(),
        name: "slow".into(),
        path_pattern: "/slow".into(),
        method: None,
        enabled: true,
        latency_ms: 200,
        jitter_ms: 0,
        error_rate: 0.0,
        error_status_code: 500,
        error_body: String::new(),
    });

    let client = reqwest::Client::new();
    let start = std::time::Instant::now();
    let resp = public_request(&client, &base, "slow-agent", "/slow")
        .send()
        .await
        .unwrap();
    let elapsed = start.elapsed();

    assert_eq!(resp.status(), StatusCode::OK);
    assert!(elapsed >= Duration::from_millis(180), "elapsed was {elapsed:?}");
    assert!(elapsed < Duration::from_millis(2_000), "elapsed was {elapsed:?}");

    agent.shutdown.cancel();
    let _ = agent.task.await;
}

#[tokio::test]
async fn chaos_error_rate_one_always_injects_and_never_reaches_local_service() {
    let (relay_state, base, ws_url) = start_relay().await;
    // Deliberately no local echo server bound on this port: if the chaos
    // error rule ever failed to short-circuit, LocalForwarder would 502
    // (unreachable), not 503, so the two failure modes are distinguishable.
    let agent = start_agent(ws_url, "flaky-agent", 19301).await;
    wait_until_online(&relay_state, "flaky-agent").await;

    agent.store.add_chaos(ChaosRule {
        id: "c1".into(),
        name: "flaky".into(),
        path_pattern: "/flaky".into(),
        method: None,
        enabled: true,
        latency_ms: 0,
        jitter_ms: 0,
        error_rate: 1.0,
        error_status_code: 503,
        error_body: "nope".into(),
    });

    let client = reqwest::Client::new();
    for _ in 0..10 {
        let resp = public_request(&client, &base, "flaky-agent", "/flaky")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(resp.text().await.unwrap(), "nope");
    }

    agent.shutdown.cancel();
    let _ = agent.task.await;
}

#[tokio::test]
async fn unknown_agent_id_yields_404_and_localhost_host_yields_landing_page() {
    let (_relay_state, base, _ws_url) = start_relay().await;
    let client = reqwest::Client::new();

    let resp = public_request(&client, &base, "no-such-agent", "/anything")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let landing = client
        .get(format!("{base}/anything"))
        .header(reqwest::header::HOST, "localhost")
        .send()
        .await
        .unwrap();
    assert_eq!(landing.status(), StatusCode::OK);
}

#[tokio::test]
async fn agent_reconnects_after_relay_channel_drop() {
    let (relay_state, base, ws_url) = start_relay().await;
    let agent = start_agent(ws_url.clone(), "reconnect-agent", 19401).await;
    wait_until_online(&relay_state, "reconnect-agent").await;
    start_local_echo(19401).await;

    // Kill the first agent's connection, then bring up a second one under
    // the same id -- the gap between the two models spec.md §8 scenario 6
    // (kill the channel, observe 404 during the gap, succeed after reconnect).
    agent.shutdown.cancel();
    let _ = agent.task.await;

    // Give the relay's read loop a moment to observe the close and drop the
    // registry entry (spec.md §4.2: "on channel close ... agent-id is
    // removed from the registry").
    for _ in 0..100 {
        if !relay_state.registry.is_online("reconnect-agent") {
            break;
        }
        sleep(Duration::from_millis(20)).await;
    }

    let client = reqwest::Client::new();
    let during_gap = public_request(&client, &base, "reconnect-agent", "/health")
        .send()
        .await
        .unwrap();
    assert_eq!(during_gap.status(), StatusCode::NOT_FOUND);

    let agent2 = start_agent(ws_url, "reconnect-agent", 19401).await;
    wait_until_online(&relay_state, "reconnect-agent").await;

    let after_reconnect = public_request(&client, &base, "reconnect-agent", "/health")
        .send()
        .await
        .unwrap();
    assert_eq!(after_reconnect.status(), StatusCode::OK);

    agent2.shutdown.cancel();
    let _ = agent2.task.await;
}

/// Scenario 5 of spec.md §8: a local service that never responds must time
/// out the public request after the relay's 30s deadline. Left `#[ignore]`
/// by default since it necessarily takes ~30s; run explicitly with
/// `cargo test --test integration_e2e -- --ignored`.
#[tokio::test]
#[ignore]
async fn unresponsive_local_service_times_out_after_30_seconds() {
    let (relay_state, base, ws_url) = start_relay().await;
    let agent = start_agent(ws_url, "timeout-agent", 19501).await;
    wait_until_online(&relay_state, "timeout-agent").await;

    let app = Router::new().route(
        "/slow-forever",
        get(|| async {
            sleep(Duration::from_secs(60)).await;
            "never"
        }),
    );
    let listener = TcpListener::bind("127.0.0.1:19501").await.unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    sleep(Duration::from_millis(50)).await;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(35))
        .build()
        .unwrap();
    let start = std::time::Instant::now();
    let resp = public_request(&client, &base, "timeout-agent", "/slow-forever")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::GATEWAY_TIMEOUT);
    assert!(start.elapsed() >= Duration::from_secs(29));

    agent.shutdown.cancel();
    let _ = agent.task.await;
}
