//! Integration tests for SLA scans and notifications.

mod common;

use chrono::{Duration, Utc};
use common::TestEnv;
use predicates::prelude::*;

fn at(offset: Duration) -> String {
    (Utc::now() + offset).to_rfc3339()
}

fn count_type(list: &serde_json::Value, kind: &str) -> usize {
    list["notifications"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|n| n["type"] == kind)
        .count()
}

#[test]
fn test_warning_raised_once() {
    let env = TestEnv::init();
    let id = env.create_incident("Core switch down", "P1");
    let when = at(Duration::minutes(186));

    let first = env.json(&["sla", "check", "--at", &when]);
    assert_eq!(first["warnings"], 1);
    assert_eq!(first["breaches"], 0);
    assert_eq!(first["raised"][0]["link"], format!("#/incidents/{}", id));
    assert_eq!(first["raised"][0]["read"], false);

    for _ in 0..2 {
        let again = env.json(&["sla", "check", "--at", &when]);
        assert!(again["raised"].as_array().unwrap().is_empty());
    }

    let list = env.json(&["notification", "list"]);
    assert_eq!(count_type(&list, "sla-warning"), 1);
}

#[test]
fn test_no_warning_with_time_left() {
    let env = TestEnv::init();
    env.create_incident("Mail delayed", "P1");
    let result = env.json(&["sla", "check", "--at", &at(Duration::hours(2))]);
    assert_eq!(result["evaluated"], 1);
    assert!(result["raised"].as_array().unwrap().is_empty());
}

#[test]
fn test_breach_supersedes_warning() {
    let env = TestEnv::init();
    env.create_incident("Core switch down", "P1");

    env.json(&["sla", "check", "--at", &at(Duration::minutes(200))]);
    let breach = env.json(&["sla", "check", "--at", &at(Duration::hours(5))]);
    assert_eq!(breach["breaches"], 1);
    env.json(&["sla", "check", "--at", &at(Duration::hours(6))]);

    let list = env.json(&["notification", "list"]);
    assert_eq!(count_type(&list, "sla-warning"), 1);
    assert_eq!(count_type(&list, "sla-breached"), 1);
    // Newest first
    assert_eq!(list["notifications"][0]["type"], "sla-breached");
}

#[test]
fn test_closed_incidents_are_not_scanned() {
    let env = TestEnv::init();
    let id = env.create_incident("Printer", "P1");
    env.json(&["bulk", "close", &id, "-c", "Solved"]);

    let result = env.json(&["sla", "check", "--at", &at(Duration::hours(10))]);
    assert_eq!(result["evaluated"], 0);
}

#[test]
fn test_configured_threshold() {
    let env = TestEnv::init();
    env.json(&["config", "set", "sla-warning-threshold", "60"]);
    env.create_incident("VPN", "P1");

    // 2h left of 4h is inside a 60% band
    let result = env.json(&["sla", "check", "--at", &at(Duration::hours(2))]);
    assert_eq!(result["warnings"], 1);
}

#[test]
fn test_invalid_timestamp() {
    let env = TestEnv::init();
    env.itsm()
        .args(["sla", "check", "--at", "yesterday"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid timestamp"));
}

#[test]
fn test_watch_stops_after_max_scans() {
    let env = TestEnv::init();
    env.create_incident("Core switch down", "P1");

    let output = env
        .itsm()
        .args(["sla", "watch", "--interval", "1", "--max-scans", "2"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    let lines: Vec<serde_json::Value> = stdout
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    // One line per scan, then the summary
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0]["evaluated"], 1);
    assert_eq!(lines[2]["scans"], 2);
    assert_eq!(lines[2]["interval_secs"], 1);
}

#[test]
fn test_watch_rejects_zero_interval() {
    let env = TestEnv::init();
    env.itsm()
        .args(["sla", "watch", "--interval", "0", "--max-scans", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("interval"));
}

#[test]
fn test_read_and_dismiss_notifications() {
    let env = TestEnv::init();
    env.create_incident("A", "P1");
    env.create_incident("B", "P1");
    env.json(&["sla", "check", "--at", &at(Duration::hours(5))]);

    let list = env.json(&["notification", "list"]);
    assert_eq!(list["unread"], 2);
    let first_id = list["notifications"][0]["id"].as_str().unwrap().to_string();

    let read = env.json(&["notification", "read", &first_id]);
    assert_eq!(read["read"], true);
    assert_eq!(read["unread"], 1);

    let unread = env.json(&["notification", "list", "--unread"]);
    assert_eq!(unread["notifications"].as_array().unwrap().len(), 1);

    let status = env.json(&["system", "status"]);
    assert_eq!(status["unread_notifications"], 1);

    let dismissed = env.json(&["notification", "dismiss-all"]);
    assert_eq!(dismissed["dismissed"], 2);
    let empty = env.json(&["notification", "list"]);
    assert!(empty["notifications"].as_array().unwrap().is_empty());
}
