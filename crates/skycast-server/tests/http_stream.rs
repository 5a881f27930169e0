//! End-to-end tests: real listener, fake model backend, HTTP client on the other side.

use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::routing::get;
use futures::{StreamExt as _, stream};
use skycast_core::tools::{WeatherConfig, WeatherTool};
use skycast_core::{
    APOLOGY, ContentDelta, ConversationItem, DeltaStream, ModelBackend, Orchestrator,
    PromptRequest, ProviderError, ProviderId, ToolBox, ToolCall,
};
use skycast_server::{AppState, Problem};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
enum Round {
    Fail(ProviderError),
    Text(Vec<&'static str>),
    Call(ToolCall),
    EchoToolOutput,
    Hang(&'static str),
}

struct ScriptedBackend {
    rounds: Vec<Round>,
}

#[async_trait::async_trait]
impl ModelBackend for ScriptedBackend {
    fn id(&self) -> ProviderId {
        ProviderId::new("scripted")
    }

    fn model(&self) -> &str {
        "scripted-model"
    }

    async fn start_stream(&self, req: PromptRequest) -> Result<DeltaStream, ProviderError> {
        let index = (req.round as usize).min(self.rounds.len() - 1);
        match self.rounds[index].clone() {
            Round::Fail(err) => Err(err),
            Round::Text(chunks) => Ok(Box::pin(stream::iter(
                chunks
                    .into_iter()
                    .map(|c| Ok(ContentDelta::TextChunk(c.to_string())))
                    .collect::<Vec<_>>(),
            ))),
            Round::Call(call) => Ok(Box::pin(stream::iter(vec![Ok(
                ContentDelta::ToolCallRequest(call),
            )]))),
            Round::EchoToolOutput => {
                let output = req
                    .input
                    .iter()
                    .find_map(|item| match item {
                        ConversationItem::ToolOutput { output, .. } => Some(output.clone()),
                        _ => None,
                    })
                    .unwrap_or_default();
                Ok(Box::pin(stream::iter(vec![Ok(ContentDelta::TextChunk(
                    format!("Here is what I found. {output}"),
                ))])))
            }
            Round::Hang(first) => Ok(Box::pin(
                stream::iter(vec![Ok(ContentDelta::TextChunk(first.to_string()))])
                    .chain(stream::pending()),
            )),
        }
    }
}

fn orchestrator(rounds: Vec<Round>, tools: ToolBox) -> Orchestrator {
    Orchestrator::builder(Arc::new(ScriptedBackend { rounds }))
        .tools(tools)
        .build()
}

async fn spawn_server(orchestrator: Orchestrator) -> (String, CancellationToken) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let state = AppState::new(orchestrator);
    let shutdown = state.shutdown.clone();
    tokio::spawn(skycast_server::serve(listener, state));
    (format!("http://{addr}"), shutdown)
}

async fn spawn_weather_service() -> String {
    let app = axum::Router::new().route(
        "/weather",
        get(|| async {
            Json(serde_json::json!({
                "name": "Paris",
                "main": { "temp": 8.4, "feels_like": 6.1, "humidity": 87 },
                "weather": [{ "description": "light rain" }],
                "wind": { "speed": 5.2 }
            }))
        }),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move { axum::serve(listener, app).await });
    format!("http://{addr}")
}

async fn collect_fragments(base: &str, query: &str) -> String {
    let client = reqwest::Client::new();
    let mut fragments = skycast_client::decoder::open_stream(&client, base, query)
        .await
        .expect("stream opens");
    let mut text = String::new();
    while let Some(fragment) = fragments.next().await {
        text.push_str(&fragment.expect("fragment"));
    }
    assert_eq!(fragments.state(), skycast_client::DecoderState::Completed);
    text
}

#[tokio::test]
async fn blank_query_is_a_bad_request_problem() {
    let (base, _shutdown) =
        spawn_server(orchestrator(vec![Round::Text(vec!["unused"])], ToolBox::new())).await;
    let client = reqwest::Client::new();

    for url in [format!("{base}/stream?query=%20%20"), format!("{base}/stream")] {
        let response = client.get(&url).send().await.expect("request");
        assert_eq!(response.status().as_u16(), 400, "{url}");
        assert_eq!(
            response.headers()["content-type"],
            "application/problem+json"
        );
        let problem: Problem =
            serde_json::from_str(&response.text().await.expect("body")).expect("problem");
        assert_eq!(problem.status, 400);
        assert_eq!(problem.title, "Bad Request");
    }
}

#[tokio::test]
async fn overlong_query_is_rejected_before_streaming() {
    let (base, _shutdown) =
        spawn_server(orchestrator(vec![Round::Text(vec!["unused"])], ToolBox::new())).await;
    let query = "a".repeat(2001);
    let err = skycast_client::decoder::open_stream(&reqwest::Client::new(), &base, &query)
        .await
        .err()
        .expect("rejected");
    match err {
        skycast_client::DecodeError::Status { status, problem } => {
            assert_eq!(status, 400);
            let problem = problem.expect("problem body");
            assert!(problem.detail.contains("2001"), "{}", problem.detail);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn broken_credential_streams_the_apology() {
    let (base, _shutdown) = spawn_server(orchestrator(
        vec![Round::Fail(ProviderError::provider(
            "scripted",
            "invalid api key",
            Some(401),
        ))],
        ToolBox::new(),
    ))
    .await;
    let response = reqwest::Client::new()
        .get(format!("{base}/stream"))
        .query(&[("query", "Weather in Oslo?")])
        .send()
        .await
        .expect("request");
    assert_eq!(response.status().as_u16(), 200);
    let headers = response.headers();
    assert_eq!(headers["content-type"], "text/plain; charset=utf-8");
    assert_eq!(headers["cache-control"], "no-cache");
    assert_eq!(response.text().await.expect("body"), APOLOGY);
}

#[tokio::test]
async fn decoded_text_equals_emitted_text() {
    let chunks = vec!["Lisbon: 21°C, ", "céu limpo ☀️", " / 東京: 小雨 🌧", "."];
    let expected: String = chunks.concat();
    let (base, _shutdown) =
        spawn_server(orchestrator(vec![Round::Text(chunks)], ToolBox::new())).await;
    assert_eq!(collect_fragments(&base, "Weather?").await, expected);
}

#[tokio::test]
async fn tool_result_is_incorporated_without_leaking_the_call() {
    let weather = spawn_weather_service().await;
    let tool = WeatherTool::new(WeatherConfig::new("test-key").base_url(weather)).expect("tool");
    let call = ToolCall {
        call_id: "call_42".into(),
        name: "get_weather".into(),
        arguments: r#"{"city":"Paris","date":"2025-01-01"}"#.into(),
    };
    let (base, _shutdown) = spawn_server(orchestrator(
        vec![Round::Call(call), Round::EchoToolOutput],
        ToolBox::new().with_tool(Arc::new(tool)),
    ))
    .await;

    let text = collect_fragments(&base, "Weather in Paris on 2025-01-01?").await;
    assert!(
        text.starts_with("Here is what I found. Weather in Paris on 2025-01-01: light rain, 8.4°C"),
        "{text}"
    );
    assert!(!text.contains("get_weather"));
    assert!(!text.contains("call_42"));
    assert!(!text.contains(r#"{"city""#));
}

#[tokio::test]
async fn shutdown_ends_in_flight_streams() {
    let (base, shutdown) =
        spawn_server(orchestrator(vec![Round::Hang("wait")], ToolBox::new())).await;
    let client = reqwest::Client::new();
    let mut fragments = skycast_client::decoder::open_stream(&client, &base, "Weather?")
        .await
        .expect("stream opens");

    let mut received = String::new();
    while received != "wait" {
        received.push_str(&fragments.next().await.expect("fragment").expect("ok"));
    }
    shutdown.cancel();
    let rest = tokio::time::timeout(Duration::from_secs(5), async {
        let mut rest = String::new();
        while let Some(Ok(fragment)) = fragments.next().await {
            rest.push_str(&fragment);
        }
        rest
    })
    .await
    .expect("stream ends after shutdown");
    assert!(rest.is_empty());
}

#[tokio::test]
async fn health_and_info_report_the_service() {
    let (base, _shutdown) =
        spawn_server(orchestrator(vec![Round::Text(vec!["unused"])], ToolBox::new())).await;
    let client = reqwest::Client::new();

    let health = client
        .get(format!("{base}/health"))
        .send()
        .await
        .expect("health")
        .text()
        .await
        .expect("body");
    assert_eq!(
        serde_json::from_str::<serde_json::Value>(&health).expect("json"),
        serde_json::json!({ "status": "ok" })
    );

    let info = client
        .get(format!("{base}/info"))
        .send()
        .await
        .expect("info")
        .text()
        .await
        .expect("body");
    let info: serde_json::Value = serde_json::from_str(&info).expect("json");
    assert_eq!(info["name"], "skycast-server");
    assert_eq!(info["model"], "scripted-model");
}
