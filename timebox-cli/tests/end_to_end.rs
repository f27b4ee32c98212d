//! Client against a real worker process

mod common;

use common::{fixtures, free_port, FIXTURE_BIN};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use timebox_core::RunClient;

struct SpawnedWorker(Child);

impl Drop for SpawnedWorker {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

fn spawn_worker() -> (SpawnedWorker, RunClient) {
    let port = free_port();
    let child = Command::new(FIXTURE_BIN)
        .args(["worker", "--host", "127.0.0.1", "--port", &port.to_string()])
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();
    let worker = SpawnedWorker(child);

    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        match RunClient::connect("127.0.0.1", port) {
            Ok(client) => return (worker, client),
            Err(e) if Instant::now() > deadline => panic!("worker never accepted: {}", e),
            Err(_) => thread::sleep(Duration::from_millis(20)),
        }
    }
}

#[test]
fn test_problem_10_naive() {
    let (_worker, mut client) = spawn_worker();
    client.ping().unwrap();

    let result = client.run(10, "naive").unwrap();
    assert_eq!(result.len(), 1);
    let item = &result.items[0];
    assert_eq!(item.problem_id, 10);
    assert_eq!(item.method, "naive");
    assert_eq!(item.result, 142913828922);
    assert!(item.is_finished && !item.is_timeout);
    assert!(result.message.is_empty());
}

#[test]
fn test_all_methods_and_lookup_errors() {
    let (_worker, mut client) = spawn_worker();

    let result = client.run(1, "").unwrap();
    let methods: Vec<&str> = result.items.iter().map(|i| i.method.as_str()).collect();
    assert_eq!(methods, vec!["arithmetic", "naive"]);
    assert!(result.items.iter().all(|i| i.result == 233168));

    let missing = client.run(4242, "").unwrap();
    assert!(missing.is_empty());
    assert!(missing.message.contains("no such problem"));

    // Lookup errors leave the worker serving
    client.ping().unwrap();
}

#[test]
fn test_hung_method_times_out() {
    let (_worker, mut client) = spawn_worker();
    client.set_timeouts(None, Some(Duration::from_millis(100)));

    let start = Instant::now();
    let result = client.run(fixtures::HANG_PROBLEM, "spin").unwrap();
    assert!(start.elapsed() < Duration::from_secs(2));
    assert!(result.has_timeout());
    assert_eq!(result.items[0].method, "spin");

    // The worker still answers, even with a spinning thread left behind
    let result = client.run(1, "naive").unwrap();
    assert_eq!(result.items[0].result, 233168);
}

#[test]
fn test_crashing_method_stops_worker() {
    let (mut worker, mut client) = spawn_worker();

    let result = client.run(fixtures::CRASH_PROBLEM, "boom").unwrap();
    assert!(result.has_error());
    assert!(result.message.contains("fixture method failed"));

    let deadline = Instant::now() + Duration::from_secs(5);
    let status = loop {
        if let Some(status) = worker.0.try_wait().unwrap() {
            break status;
        }
        assert!(Instant::now() < deadline, "worker did not exit");
        thread::sleep(Duration::from_millis(20));
    };
    assert!(!status.success());
}
