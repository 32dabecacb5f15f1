//! End-to-end pipeline tests
//!
//! Drives the full dispatcher through the router with the IPFS gateway,
//! pinning service and AI jury all mocked on one wiremock server:
//! - standard single-archive evaluation and justification determinism
//! - commit/reveal parity without a second jury call
//! - multi-CID composition and prompt ordering
//! - IPFS-referenced attachments reaching the jury payload
//! - bCID name mismatch rejection
//! - reveal without a matching commit

mod support;

use ciborium::value::Value;
use sha2::{Digest, Sha256};
use support::*;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn test_minimal_standard_request() {
    let harness = Harness::start().await;
    harness
        .mount_archive(
            "bafyA",
            &[
                ("manifest.json", br#"{"version":"1.0","primary":{"filename":"q.json"}}"# as &[u8]),
                ("q.json", br#"{"query":"Q"}"#),
            ],
        )
        .await;
    harness.mount_jury(&[60, 40], "J").await;

    let (status, body) = harness
        .post_oracle(r#"{"id":"job-1","data":{"cid":"bafyA","mode":0}}"#)
        .await;

    assert_eq!(status, 200);
    assert_eq!(body["statusCode"], 200);
    assert_eq!(body["jobRunID"], "job-1");

    let result = decode_result(body["data"]["result"].as_str().unwrap());
    let items = as_array(&result);
    let cid = as_text(&items[0]);
    assert_eq!(cid, body["data"]["justificationCID"].as_str().unwrap());
    assert_eq!(as_scores(&items[1]), vec![60, 40]);

    // Identical input and verdict: the justification CID is reproducible
    let (_, second) = harness
        .post_oracle(r#"{"id":"job-1b","data":{"cid":"bafyA","mode":0}}"#)
        .await;
    assert_eq!(
        body["data"]["justificationCID"],
        second["data"]["justificationCID"]
    );
}

#[tokio::test]
async fn test_commit_then_reveal_parity() {
    let harness = Harness::start().await;
    harness
        .mount_archive(
            "bafyA",
            &[
                ("manifest.json", br#"{"version":"1.0","primary":{"filename":"q.json"}}"# as &[u8]),
                ("q.json", br#"{"query":"Q"}"#),
            ],
        )
        .await;
    // The jury must be consulted exactly once: reveal replays the commit
    harness.mount_jury_expect(&[600_000, 400_000], "J", 1).await;

    let commit_body = r#"{"id":"job-c","data":{"cid":"bafyA","mode":1,"requestID":"0xreq","classID":128}}"#;
    let (status, commit) = harness.post_oracle(commit_body).await;
    assert_eq!(status, 200);

    let commit_items = as_array(&decode_result(commit["data"]["result"].as_str().unwrap()));
    let commit_hash = match &commit_items[0] {
        Value::Bytes(bytes) => bytes.clone(),
        other => panic!("expected commit hash bytes, got {other:?}"),
    };
    assert_eq!(commit_hash.len(), 16);

    let reveal_body = r#"{"id":"job-r","data":{"cid":"bafyA","mode":2,"requestID":"0xreq","classID":128}}"#;
    let (status, reveal) = harness.post_oracle(reveal_body).await;
    assert_eq!(status, 200);

    let reveal_bytes = hex_bytes(reveal["data"]["result"].as_str().unwrap());
    let digest: [u8; 32] = Sha256::digest(&reveal_bytes).into();
    assert_eq!(&digest[..16], commit_hash.as_slice());

    // The reveal carries the committed justification CID
    assert_eq!(
        commit["data"]["justificationCID"],
        reveal["data"]["justificationCID"]
    );
}

#[tokio::test]
async fn test_multi_cid_composition() {
    let harness = Harness::start().await;
    harness
        .mount_archive(
            "bafyP",
            &[
                (
                    "manifest.json",
                    br#"{"version":"1.0","primary":{"filename":"q.json"},"bCIDs":{"sub":"desc"}}"# as &[u8],
                ),
                ("q.json", br#"{"query":"Evaluate:"}"#),
            ],
        )
        .await;
    harness
        .mount_archive(
            "bafyB",
            &[
                (
                    "manifest.json",
                    br#"{"version":"1.0","name":"sub","primary":{"filename":"q.json"}}"# as &[u8],
                ),
                ("q.json", br#"{"query":"WORK"}"#),
            ],
        )
        .await;
    harness.mount_jury(&[70, 30], "J").await;

    let (status, _) = harness
        .post_oracle(r#"{"id":"job-3","data":{"cid":"bafyP,bafyB","mode":0}}"#)
        .await;
    assert_eq!(status, 200);

    let jury_request = harness.last_jury_request().await;
    let prompt = jury_request["prompt"].as_str().unwrap();
    let eval = prompt.find("Evaluate:").expect("primary query in prompt");
    let name = prompt.find("Name: sub").expect("bCID name in prompt");
    let work = prompt.find("WORK").expect("bCID query in prompt");
    assert!(eval < name && name < work, "prompt sections out of order");
}

#[tokio::test]
async fn test_ipfs_referenced_rubric() {
    let harness = Harness::start().await;
    harness
        .mount_archive(
            "bafyA",
            &[
                (
                    "manifest.json",
                    br#"{"version":"1.0","primary":{"filename":"q.json"},
                        "additional":[{"name":"rubric","type":"ipfs/cid","hash":"bafyR"}]}"# as &[u8],
                ),
                ("q.json", br#"{"query":"Q"}"#),
            ],
        )
        .await;
    Mock::given(method("GET"))
        .and(path("/ipfs/bafyR"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"RUBRIC BYTES".to_vec()))
        .mount(&harness.mock)
        .await;
    harness.mount_jury(&[55, 45], "J").await;

    let (status, _) = harness
        .post_oracle(r#"{"id":"job-4","data":{"cid":"bafyA","mode":0}}"#)
        .await;
    assert_eq!(status, 200);

    let jury_request = harness.last_jury_request().await;
    let attachments = jury_request["attachments"].as_array().unwrap();
    assert_eq!(attachments.len(), 1);
    assert_eq!(attachments[0]["name"], "rubric");
    assert_eq!(attachments[0]["content"], "RUBRIC BYTES");
    assert_eq!(attachments[0]["mime"], "text/plain");
}

#[tokio::test]
async fn test_mismatched_bcid_name() {
    let harness = Harness::start().await;
    harness
        .mount_archive(
            "bafyP",
            &[
                (
                    "manifest.json",
                    br#"{"version":"1.0","primary":{"filename":"q.json"},"bCIDs":{"A":"first party"}}"# as &[u8],
                ),
                ("q.json", br#"{"query":"Q"}"#),
            ],
        )
        .await;
    harness
        .mount_archive(
            "bafyB",
            &[
                (
                    "manifest.json",
                    br#"{"version":"1.0","name":"B","primary":{"filename":"q.json"}}"# as &[u8],
                ),
                ("q.json", br#"{"query":"W"}"#),
            ],
        )
        .await;
    harness.mount_jury(&[50, 50], "unused").await;

    let (status, body) = harness
        .post_oracle(r#"{"id":"job-5","data":{"cid":"bafyP,bafyB","mode":0}}"#)
        .await;

    assert_eq!(status, 500);
    assert_eq!(body["statusCode"], 500);
    assert_eq!(body["data"]["error"]["kind"], "ManifestInvalid");
    // The failure is informative: an error justification was pinned
    assert!(body["data"]["justificationCID"].as_str().is_some());
}

#[tokio::test]
async fn test_reveal_without_commit() {
    let harness = Harness::start().await;
    harness
        .mount_archive(
            "bafyA",
            &[
                ("manifest.json", br#"{"version":"1.0","primary":{"filename":"q.json"}}"# as &[u8]),
                ("q.json", br#"{"query":"Q"}"#),
            ],
        )
        .await;
    harness.mount_jury(&[80, 20], "J").await;

    let (status, body) = harness
        .post_oracle(r#"{"id":"job-6","data":{"cid":"bafyA","mode":2,"requestID":"0xnever"}}"#)
        .await;

    // Miss falls through to a full evaluation rather than failing
    assert_eq!(status, 200);
    assert_eq!(body["statusCode"], 200);
    let items = as_array(&decode_result(body["data"]["result"].as_str().unwrap()));
    assert_eq!(as_scores(&items[1]), vec![80, 20]);
}

#[tokio::test]
async fn test_health_endpoint() {
    let harness = Harness::start().await;
    let (status, body) = harness.get("/health").await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["cache_entries"], 0);
}
