use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use reqwest_retry_hooks::{
    attach_retry_policy, codes, is_network_error, Agent, ClientOptions, HttpClient, HttpResponse,
    RequestBody, RequestConfig, RequestError, RetryOptions, RetryState, TransformRequest, Transport,
};
use serde_json::json;

#[derive(Clone)]
enum Outcome {
    Reply(StatusCode, serde_json::Value),
    Fail(&'static str),
}

#[derive(Clone)]
struct Step {
    outcome: Outcome,
    delay: Duration,
}

fn reply(status: StatusCode, body: serde_json::Value) -> Step {
    Step {
        outcome: Outcome::Reply(status, body),
        delay: Duration::ZERO,
    }
}

fn fail(code: &'static str) -> Step {
    Step {
        outcome: Outcome::Fail(code),
        delay: Duration::ZERO,
    }
}

impl Step {
    fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Replays scripted outcomes per URL and records every config it receives.
#[derive(Clone, Default)]
struct ScriptedTransport {
    scripts: Arc<Mutex<HashMap<String, VecDeque<Step>>>>,
    seen: Arc<Mutex<Vec<RequestConfig>>>,
}

impl ScriptedTransport {
    fn script(self, url: &str, steps: Vec<Step>) -> Self {
        self.scripts
            .lock()
            .expect("script mutex must not be poisoned")
            .insert(url.to_owned(), steps.into());
        self
    }

    fn seen(&self) -> Vec<RequestConfig> {
        self.seen
            .lock()
            .expect("seen mutex must not be poisoned")
            .clone()
    }

    fn hits(&self, url: &str) -> usize {
        self.seen().iter().filter(|config| config.url == url).count()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, config: &RequestConfig) -> reqwest_retry_hooks::Result<HttpResponse> {
        self.seen
            .lock()
            .expect("seen mutex must not be poisoned")
            .push(config.clone());

        let step = self
            .scripts
            .lock()
            .expect("script mutex must not be poisoned")
            .get_mut(&config.url)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| {
                reply(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({"error": "no scripted response available"}),
                )
            });

        if !step.delay.is_zero() {
            tokio::time::sleep(step.delay).await;
        }

        match step.outcome {
            Outcome::Reply(status, body) => Ok(HttpResponse::new(status, body.to_string())),
            Outcome::Fail(code) => Err(RequestError::network(code, format!("scripted {code}"))),
        }
    }
}

const URL: &str = "http://svc.test/items";

fn client_with(transport: &ScriptedTransport, options: RetryOptions) -> HttpClient {
    let client = HttpClient::with_transport(ClientOptions::default(), transport.clone());
    attach_retry_policy(&client, options);
    client
}

fn retry_counts() -> (Arc<Mutex<Vec<u32>>>, impl Fn(u32, &RequestError, &RequestConfig)) {
    let counts = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&counts);
    let callback = move |retry_count: u32, _: &RequestError, _: &RequestConfig| {
        sink.lock()
            .expect("counts mutex must not be poisoned")
            .push(retry_count);
    };
    (counts, callback)
}

#[tokio::test]
async fn network_errors_are_retried_until_success() {
    let transport = ScriptedTransport::default().script(
        URL,
        vec![
            fail(codes::ECONNRESET),
            fail(codes::ECONNRESET),
            reply(StatusCode::OK, json!({"data": "ok"})),
        ],
    );
    let client = client_with(&transport, RetryOptions::new().retries(3));

    let response = client.get(URL).await.expect("third attempt succeeds");

    assert_eq!(response.json::<serde_json::Value>().expect("json"), json!({"data": "ok"}));
    assert_eq!(transport.hits(URL), 3);
}

#[tokio::test]
async fn per_request_zero_retries_overrides_global() {
    let transport = ScriptedTransport::default().script(
        URL,
        vec![
            reply(StatusCode::SERVICE_UNAVAILABLE, json!({"error": "busy"})),
            reply(StatusCode::OK, json!({"data": "late"})),
        ],
    );
    let client = client_with(&transport, RetryOptions::new().retries(3));

    let err = client
        .request(RequestConfig::new(Method::GET, URL).retry(RetryOptions::new().retries(0)))
        .await
        .expect_err("no retries allowed");

    assert_eq!(err.status_code(), Some(StatusCode::SERVICE_UNAVAILABLE));
    assert_eq!(err.code.as_deref(), Some(codes::ERR_BAD_RESPONSE));
    assert_eq!(transport.hits(URL), 1);
}

#[tokio::test]
async fn aborted_request_is_never_retried() {
    let transport = ScriptedTransport::default().script(
        URL,
        vec![
            fail(codes::ECONNABORTED),
            reply(StatusCode::OK, json!({"data": "ok"})),
        ],
    );
    let client = client_with(&transport, RetryOptions::new().retries(10));

    let err = client.get(URL).await.expect_err("abort propagates");

    assert!(err.is_aborted());
    assert!(err.response.is_none());
    assert_eq!(transport.hits(URL), 1);
}

#[tokio::test(start_paused = true)]
async fn retry_timeout_is_reduced_by_elapsed_time_and_delay() {
    let transport = ScriptedTransport::default().script(
        URL,
        vec![
            fail(codes::ECONNRESET).after(Duration::from_millis(300)),
            reply(StatusCode::OK, json!({})),
        ],
    );
    let client = client_with(
        &transport,
        RetryOptions::new()
            .should_reset_timeout(false)
            .retry_delay(|_: u32, _: &RequestError| 200u64),
    );

    client
        .request(RequestConfig::new(Method::GET, URL).timeout_ms(1_000))
        .await
        .expect("retry succeeds");

    let timeouts: Vec<_> = transport.seen().iter().map(|c| c.timeout_ms).collect();
    assert_eq!(timeouts, [Some(1_000), Some(500)]);
}

#[tokio::test(start_paused = true)]
async fn retry_timeout_never_drops_to_zero() {
    let transport = ScriptedTransport::default().script(
        URL,
        vec![
            fail(codes::ECONNRESET).after(Duration::from_millis(900)),
            reply(StatusCode::OK, json!({})),
        ],
    );
    let client = client_with(
        &transport,
        RetryOptions::new().retry_delay(|_: u32, _: &RequestError| 500u64),
    );

    client
        .request(RequestConfig::new(Method::GET, URL).timeout_ms(1_000))
        .await
        .expect("retry succeeds");

    assert_eq!(transport.seen()[1].timeout_ms, Some(1));
}

#[tokio::test(start_paused = true)]
async fn reset_timeout_keeps_full_budget() {
    let transport = ScriptedTransport::default().script(
        URL,
        vec![
            fail(codes::ECONNRESET).after(Duration::from_millis(300)),
            reply(StatusCode::OK, json!({})),
        ],
    );
    let client = client_with(&transport, RetryOptions::new().should_reset_timeout(true));

    client
        .request(RequestConfig::new(Method::GET, URL).timeout_ms(1_000))
        .await
        .expect("retry succeeds");

    assert_eq!(transport.seen()[1].timeout_ms, Some(1_000));
}

#[tokio::test(start_paused = true)]
async fn requests_without_timeout_keep_none() {
    let transport = ScriptedTransport::default().script(
        URL,
        vec![
            fail(codes::ECONNRESET).after(Duration::from_millis(300)),
            reply(StatusCode::OK, json!({})),
        ],
    );
    let client = client_with(&transport, RetryOptions::new());

    client.get(URL).await.expect("retry succeeds");

    assert_eq!(transport.seen()[1].timeout_ms, None);
}

#[tokio::test]
async fn post_server_error_is_not_retried_by_default() {
    let transport = ScriptedTransport::default().script(
        URL,
        vec![
            reply(StatusCode::SERVICE_UNAVAILABLE, json!({})),
            reply(StatusCode::OK, json!({})),
        ],
    );
    let client = client_with(&transport, RetryOptions::new());

    let err = client
        .post(URL, json!({"name": "Kit"}))
        .await
        .expect_err("post is not idempotent");

    assert_eq!(err.status_code(), Some(StatusCode::SERVICE_UNAVAILABLE));
    assert_eq!(transport.hits(URL), 1);
}

#[tokio::test]
async fn put_server_error_is_retried_by_default() {
    let transport = ScriptedTransport::default().script(
        URL,
        vec![
            reply(StatusCode::BAD_GATEWAY, json!({})),
            reply(StatusCode::OK, json!({"saved": true})),
        ],
    );
    let client = client_with(&transport, RetryOptions::new());

    client
        .put(URL, json!({"name": "Kit"}))
        .await
        .expect("put is idempotent");

    assert_eq!(transport.hits(URL), 2);
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let transport = ScriptedTransport::default().script(
        URL,
        vec![reply(StatusCode::NOT_FOUND, json!({"error": "missing"}))],
    );
    let client = client_with(&transport, RetryOptions::new());

    let err = client.get(URL).await.expect_err("404 propagates");

    assert_eq!(err.status_code(), Some(StatusCode::NOT_FOUND));
    assert_eq!(transport.hits(URL), 1);
}

#[tokio::test]
async fn exhausted_retries_propagate_last_error() {
    let transport = ScriptedTransport::default().script(
        URL,
        vec![
            fail(codes::ECONNRESET),
            fail(codes::ECONNRESET),
            fail(codes::ECONNRESET),
            fail(codes::ECONNREFUSED),
        ],
    );
    let (counts, on_retry) = retry_counts();
    let client = client_with(&transport, RetryOptions::new().retries(3).on_retry(on_retry));

    let err = client.get(URL).await.expect_err("all attempts fail");

    assert_eq!(err.code.as_deref(), Some(codes::ECONNREFUSED));
    assert_eq!(transport.hits(URL), 4);
    assert_eq!(*counts.lock().expect("counts"), [1, 2, 3]);
    let state = err
        .config
        .as_deref()
        .and_then(RequestConfig::retry_state)
        .expect("state travels with the error");
    assert_eq!(state.attempt_count(), 3);
}

#[tokio::test]
async fn denied_codes_are_not_network_errors() {
    let transport = ScriptedTransport::default().script(
        URL,
        vec![fail(codes::ENOTFOUND), reply(StatusCode::OK, json!({}))],
    );
    let client = client_with(
        &transport,
        RetryOptions::new().retries(3).retry_condition(is_network_error),
    );

    let err = client.get(URL).await.expect_err("dns failure propagates");

    assert_eq!(err.code.as_deref(), Some(codes::ENOTFOUND));
    assert_eq!(transport.hits(URL), 1);
}

#[tokio::test]
async fn concurrent_requests_keep_independent_counters() {
    const OTHER: &str = "http://svc.test/other";
    let transport = ScriptedTransport::default()
        .script(
            URL,
            vec![
                fail(codes::ECONNRESET),
                fail(codes::ECONNRESET),
                reply(StatusCode::OK, json!({"data": "first"})),
            ],
        )
        .script(
            OTHER,
            vec![
                fail(codes::ECONNRESET),
                reply(StatusCode::OK, json!({"data": "second"})),
            ],
        );
    let client = client_with(&transport, RetryOptions::new().retries(2));

    let (first, second) = tokio::join!(client.get(URL), client.get(OTHER));

    assert!(first.is_ok());
    assert!(second.is_ok());
    assert_eq!(transport.hits(URL), 3);
    assert_eq!(transport.hits(OTHER), 2);
}

#[tokio::test]
async fn retried_body_is_not_transformed_twice() {
    let transport = ScriptedTransport::default().script(
        URL,
        vec![fail(codes::ECONNRESET), reply(StatusCode::OK, json!({}))],
    );
    let client = client_with(&transport, RetryOptions::new());
    let shout: TransformRequest = Arc::new(|body, _headers| match body {
        RequestBody::Text(text) => RequestBody::Text(format!("{text}!")),
        other => other,
    });

    client
        .request(
            RequestConfig::new(Method::PUT, URL)
                .body(RequestBody::Text("hello".to_owned()))
                .transform_request(vec![shout]),
        )
        .await
        .expect("retry succeeds");

    let bodies: Vec<_> = transport.seen().into_iter().map(|c| c.body).collect();
    assert_eq!(
        bodies,
        [
            RequestBody::Text("hello!".to_owned()),
            RequestBody::Text("hello!".to_owned())
        ]
    );
}

#[tokio::test]
async fn json_body_is_encoded_once_and_resent() {
    let transport = ScriptedTransport::default().script(
        URL,
        vec![fail(codes::ECONNRESET), reply(StatusCode::OK, json!({}))],
    );
    let client = client_with(&transport, RetryOptions::new());

    client
        .put(URL, json!({"name": "Kit"}))
        .await
        .expect("retry succeeds");

    let seen = transport.seen();
    let expected = RequestBody::Bytes(br#"{"name":"Kit"}"#.as_slice().into());
    assert_eq!(seen[0].body, expected);
    assert_eq!(seen[1].body, expected);
}

#[tokio::test]
async fn default_agents_are_stripped_before_resubmission() {
    let default_agent = Agent::new(reqwest::Client::new());
    let custom_agent = Agent::new(reqwest::Client::new());
    let transport = ScriptedTransport::default().script(
        URL,
        vec![fail(codes::ECONNRESET), reply(StatusCode::OK, json!({}))],
    );
    let client = HttpClient::with_transport(
        ClientOptions::default().http_agent(default_agent.clone()),
        transport.clone(),
    );
    let observed = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&observed);
    attach_retry_policy(
        &client,
        RetryOptions::new().on_retry(move |_, _, config: &RequestConfig| {
            *sink.lock().expect("observed mutex") =
                Some((config.http_agent.is_some(), config.https_agent.clone()));
        }),
    );

    let mut config = RequestConfig::new(Method::GET, URL);
    config.https_agent = Some(custom_agent.clone());
    client.request(config).await.expect("retry succeeds");

    let (has_http_agent, https_agent) = observed
        .lock()
        .expect("observed mutex")
        .take()
        .expect("on_retry ran");
    assert!(!has_http_agent);
    assert!(https_agent.is_some_and(|agent| agent.ptr_eq(&custom_agent)));

    // The client merges its default back in for the next attempt.
    let seen = transport.seen();
    let retried = &seen[1];
    assert!(retried
        .http_agent
        .as_ref()
        .is_some_and(|agent| agent.ptr_eq(&default_agent)));
}

#[tokio::test]
async fn custom_condition_can_retry_post() {
    let transport = ScriptedTransport::default().script(
        URL,
        vec![
            reply(StatusCode::SERVICE_UNAVAILABLE, json!({})),
            reply(StatusCode::CREATED, json!({"id": 1})),
        ],
    );
    let client = client_with(
        &transport,
        RetryOptions::new().retry_condition(|error: &RequestError| {
            error.status_code() == Some(StatusCode::SERVICE_UNAVAILABLE)
        }),
    );

    let response = client
        .post(URL, json!({"name": "Kit"}))
        .await
        .expect("custom condition retries post");

    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(transport.hits(URL), 2);
}

#[tokio::test(start_paused = true)]
async fn delay_receives_increasing_retry_counts() {
    let transport = ScriptedTransport::default().script(
        URL,
        vec![
            fail(codes::ECONNRESET),
            fail(codes::ECONNRESET),
            reply(StatusCode::OK, json!({})),
        ],
    );
    let requested = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&requested);
    let client = client_with(
        &transport,
        RetryOptions::new().retry_delay(move |retry_count: u32, _: &RequestError| {
            sink.lock().expect("delay mutex").push(retry_count);
            u64::from(retry_count) * 1_000
        }),
    );

    let started = tokio::time::Instant::now();
    client.get(URL).await.expect("retry succeeds");

    assert_eq!(*requested.lock().expect("delay mutex"), [1, 2]);
    assert!(started.elapsed() >= Duration::from_millis(3_000));
}

#[tokio::test]
async fn delay_and_callback_see_the_failed_request() {
    let transport = ScriptedTransport::default().script(
        URL,
        vec![fail(codes::ECONNRESET), reply(StatusCode::OK, json!({}))],
    );
    let delay_saw = Arc::new(Mutex::new(Vec::new()));
    let callback_saw = Arc::new(Mutex::new(Vec::new()));
    let delay_sink = Arc::clone(&delay_saw);
    let callback_sink = Arc::clone(&callback_saw);
    let client = client_with(
        &transport,
        RetryOptions::new()
            .retry_delay(move |_: u32, error: &RequestError| {
                let request = error
                    .config
                    .as_deref()
                    .map(|config| (config.method.clone(), config.url.clone()));
                delay_sink.lock().expect("delay mutex").push(request);
                0u64
            })
            .on_retry(move |_, error: &RequestError, _: &RequestConfig| {
                callback_sink
                    .lock()
                    .expect("callback mutex")
                    .push(error.config.is_some());
            }),
    );

    client.get(URL).await.expect("retry succeeds");

    assert_eq!(
        *delay_saw.lock().expect("delay mutex"),
        [Some((Method::GET, URL.to_owned()))]
    );
    assert_eq!(*callback_saw.lock().expect("callback mutex"), [true]);
}

#[tokio::test]
async fn detached_policy_no_longer_retries() {
    let transport = ScriptedTransport::default().script(
        URL,
        vec![fail(codes::ECONNRESET), reply(StatusCode::OK, json!({}))],
    );
    let client = HttpClient::with_transport(ClientOptions::default(), transport.clone());
    let attached = attach_retry_policy(&client, RetryOptions::new());
    attached.detach(&client);

    let err = client.get(URL).await.expect_err("no retry hooks");

    assert_eq!(err.code.as_deref(), Some(codes::ECONNRESET));
    assert_eq!(transport.hits(URL), 1);
    assert!(err
        .config
        .as_deref()
        .and_then(RequestConfig::retry_state)
        .is_none());
}

#[tokio::test]
async fn first_attempt_starts_with_zero_retries() {
    let transport = ScriptedTransport::default()
        .script(URL, vec![reply(StatusCode::OK, json!({}))]);
    let client = client_with(&transport, RetryOptions::new());

    client.get(URL).await.expect("success");

    let state = transport.seen()[0]
        .retry_state()
        .copied()
        .expect("stamped before sending");
    assert_eq!(state.attempt_count(), 0);
    assert!(state.last_request_at().is_some());
    assert_eq!(RetryState::default().attempt_count(), 0);
}
