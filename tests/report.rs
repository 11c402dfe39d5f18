//! Report client tests against a one-shot local HTTP server.

mod common;
use common::*;

use std::io::{BufRead as _, BufReader, Read as _, Write as _};
use std::net::TcpListener;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde_json::{Value, json};
use tas::report::ReportClient;
use tas::{Runner, RunnerError, Selection};

struct Captured {
    request_line: String,
    content_type: Option<String>,
    body: Value,
}

/// Serve exactly one request, answering with `status`.
fn serve_once(status: u16) -> (String, JoinHandle<Captured>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let url = format!("http://{}/results", listener.local_addr().expect("addr"));
    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().expect("accept");
        let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));

        let mut request_line = String::new();
        reader.read_line(&mut request_line).expect("request line");
        let mut content_type = None;
        let mut length = 0usize;
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).expect("header");
            let line = line.trim_end();
            if line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                match name.to_ascii_lowercase().as_str() {
                    "content-type" => content_type = Some(value.trim().to_owned()),
                    "content-length" => length = value.trim().parse().expect("length"),
                    _ => {}
                }
            }
        }
        let mut body = vec![0; length];
        reader.read_exact(&mut body).expect("body");

        let reply = if status == 200 { "ok" } else { "boom" };
        let mut stream = stream;
        write!(
            stream,
            "HTTP/1.1 {status} X\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{reply}",
            reply.len()
        )
        .expect("write response");

        Captured {
            request_line: request_line.trim_end().to_owned(),
            content_type,
            body: serde_json::from_slice(&body).expect("json body"),
        }
    });
    (url, handle)
}

fn client() -> ReportClient {
    ReportClient::new(Duration::from_secs(5)).expect("client")
}

#[test]
fn posts_json() {
    let (url, server) = serve_once(200);
    client()
        .post(&url, &json!({"taskID": "t1"}))
        .expect("accepted");

    let captured = server.join().expect("server thread");
    assert_eq!(captured.request_line, "POST /results HTTP/1.1");
    assert_eq!(captured.content_type.as_deref(), Some("application/json"));
    assert_eq!(captured.body, json!({"taskID": "t1"}));
}

#[test]
fn non_success_status_is_an_error() {
    let (url, server) = serve_once(500);
    let err = client()
        .post(&url, &json!({}))
        .expect_err("rejected");
    server.join().expect("server thread");

    match err {
        RunnerError::Report { url: failed, message } => {
            assert_eq!(failed, url);
            assert!(message.contains("500"), "{message}");
            assert!(message.contains("boom"), "{message}");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn connection_refused_is_an_error() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let url = format!("http://{}/x", listener.local_addr().expect("addr"));
    drop(listener);

    let err = client().post(&url, &json!({})).expect_err("refused");
    assert!(matches!(err, RunnerError::Report { .. }), "{err}");
}

#[test]
fn execution_results_are_posted() {
    let repo = setup_repo(MATH_FILES);
    let host = math_host(repo.path());
    let (url, server) = serve_once(200);
    let mut ctx = context(repo.path());
    ctx.post_test_results = Some(url);
    let runner = Runner::new(&host, ctx).with_reporter(client());

    let results = runner
        .execute(&patterns(), &Selection::All)
        .expect("execute");

    let captured = server.join().expect("server thread");
    assert_eq!(captured.body["taskID"], "task-3");
    assert_eq!(captured.body["results"][0]["testResults"].as_array().map(Vec::len), Some(4));
    assert_eq!(captured.body, serde_json::to_value(&results).expect("serialize"));
}

#[test]
fn empty_endpoint_disables_reporting() {
    let repo = setup_repo(MATH_FILES);
    let host = math_host(repo.path());
    let mut ctx = context(repo.path());
    ctx.post_test_list = Some(String::new());
    let runner = Runner::new(&host, ctx);

    runner.discover(&patterns(), &[]).expect("discover without posting");
}
