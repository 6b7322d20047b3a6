//! Security invariants for the lens-x402 workspace.
//!
//! Each test scans production sources for a property the payment path
//! depends on, so a regression fails `cargo test --workspace` instead of
//! shipping.

use regex::Regex;
use std::path::Path;
use walkdir::WalkDir;

/// All production `.rs` files under `crates/`, excluding `tests/` and this crate.
fn production_source_files() -> Vec<(String, String)> {
    let root = Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .and_then(Path::parent)
        .expect("crate lives at <root>/crates/<name>");

    let mut files = Vec::new();
    for entry in WalkDir::new(root.join("crates"))
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("rs") {
            continue;
        }
        let path_str = path.to_string_lossy().replace('\\', "/");
        if path_str.contains("security-audit") || path_str.contains("/tests/") {
            continue;
        }
        if let Ok(content) = std::fs::read_to_string(path) {
            files.push((path_str, content));
        }
    }
    assert!(!files.is_empty(), "no production sources found");
    files
}

/// Everything before the first `#[cfg(test)]` in a file.
fn production_lines(content: &str) -> &str {
    content
        .find("#[cfg(test)]")
        .map(|i| &content[..i])
        .unwrap_or(content)
}

fn file<'a>(files: &'a [(String, String)], suffix: &str) -> &'a str {
    files
        .iter()
        .find(|(path, _)| path.ends_with(suffix))
        .map(|(_, content)| production_lines(content))
        .unwrap_or_else(|| panic!("{suffix} not found"))
}

/// Body of `fn name` up to the next function definition.
fn function_body<'a>(content: &'a str, name: &str) -> &'a str {
    let head = Regex::new(&format!(r"fn\s+{name}\s*[(<]")).unwrap();
    let next = Regex::new(r"\n\s*(pub(\([a-z]+\))?\s+)?(async\s+)?fn\s").unwrap();

    let start = head
        .find(content)
        .unwrap_or_else(|| panic!("fn {name} not found"))
        .start();
    let rest = &content[start..];
    let end = next.find(rest).map(|m| m.start()).unwrap_or(rest.len());
    &rest[..end]
}

#[test]
fn no_hardcoded_private_keys_in_production_code() {
    let hex_64 = Regex::new(r"(0x)?[a-fA-F0-9]{64}").unwrap();

    for (path, content) in &production_source_files() {
        let prod = production_lines(content);
        for (i, line) in prod.lines().enumerate() {
            assert!(
                !hex_64.is_match(line),
                "possible hardcoded key at {path}:{}: {}",
                i + 1,
                line.trim()
            );
        }
    }
}

#[test]
fn hmac_verification_has_no_early_return() {
    let files = production_source_files();
    let body = function_body(file(&files, "lens-x402/src/hmac.rs"), "verify_body");

    assert!(
        !body.contains("return"),
        "verify_body must always reach the MAC comparison"
    );
    assert!(
        body.contains("verify_slice"),
        "verify_body must compare through Mac::verify_slice (constant time)"
    );
}

#[test]
fn http_clients_disable_redirects() {
    let builder = Regex::new(r"reqwest::Client::builder\(\)").unwrap();
    let no_redirect = Regex::new(r"redirect\s*\(\s*reqwest::redirect::Policy::none\(\)").unwrap();
    let bare_client = Regex::new(r"reqwest::Client::new\(\)").unwrap();

    for (path, content) in &production_source_files() {
        let prod = production_lines(content);
        assert!(
            !bare_client.is_match(prod),
            "{path} builds a reqwest client without timeouts or redirect policy"
        );
        for m in builder.find_iter(prod) {
            let chain_end = prod[m.end()..]
                .find(".build()")
                .map(|i| m.end() + i)
                .unwrap_or(prod.len());
            let chain = &prod[m.start()..chain_end];
            assert!(
                no_redirect.is_match(chain),
                "reqwest::Client::builder() at {path} must set redirect(Policy::none())"
            );
            assert!(
                chain.contains(".timeout("),
                "reqwest::Client::builder() at {path} must set an explicit timeout"
            );
        }
    }
}

#[test]
fn constant_time_comparison_uses_subtle() {
    let files = production_source_files();
    let security = file(&files, "lens-x402/src/security.rs");
    assert!(security.contains("subtle::") || security.contains("use subtle"));

    for (path, content) in &files {
        let prod = production_lines(content);
        if prod.contains("strip_prefix(\"Bearer \")") {
            assert!(
                prod.contains("constant_time_eq"),
                "{path} compares a bearer token without constant_time_eq"
            );
        }
    }
}

#[test]
fn nonce_ledger_has_no_release() {
    let files = production_source_files();
    let ledger = file(&files, "lens-x402/src/nonce_ledger.rs");
    let release = Regex::new(r"fn\s+(release|unreserve|remove|forget|clear)\b").unwrap();
    assert!(
        !release.is_match(ledger),
        "nonce ledger must not expose a way to un-consume a nonce"
    );

    let facilitator = file(&files, "lens-x402/src/facilitator.rs");
    let settle = function_body(facilitator, "settle");
    let reserve = settle.find("reserve(").expect("settle reserves the nonce");
    let transfer = settle
        .find("transfer_with_authorization")
        .expect("settle transfers");
    assert!(reserve < transfer, "the nonce must be reserved before the transfer");
    assert!(
        !settle.contains(".remove(") && !settle.contains("evict"),
        "a failed transfer must not release the nonce"
    );
}

#[test]
fn facilitator_uses_persistent_nonce_ledger() {
    let files = production_source_files();
    let bootstrap = file(&files, "lens-x402-facilitator/src/bootstrap.rs");
    assert!(bootstrap.contains("SqliteNonceLedger"));
    assert!(
        !bootstrap.contains("InMemoryNonceLedger"),
        "facilitator bootstrap must not fall back to an in-memory nonce ledger"
    );
}

#[test]
fn hmac_secret_required_unless_explicitly_insecure() {
    let files = production_source_files();
    let config = file(&files, "lens-x402-facilitator/src/config.rs");
    assert!(config.contains("MissingRequired(\"FACILITATOR_SHARED_SECRET\")"));
    assert!(config.contains("X402_INSECURE_NO_HMAC"));
}

#[test]
fn demo_bypass_is_off_by_default() {
    let files = production_source_files();
    let gate = file(&files, "lens-x402-server/src/gate.rs");
    assert!(gate.contains("demo_bypass_unreachable: false"));
    let bypass = function_body(gate, "unavailable");
    assert!(
        bypass.contains("FacilitatorUnreachable"),
        "the bypass may only apply to an unreachable facilitator"
    );

    let config = file(&files, "lens-x402-server/src/config.rs");
    assert!(config.contains("flag(get(\"X402_DEMO_BYPASS_UNREACHABLE\"))"));
}

#[test]
fn settlement_survives_client_disconnect() {
    let files = production_source_files();
    let gate = file(&files, "lens-x402-server/src/gate.rs");
    let admit = function_body(gate, "admit");
    assert!(
        admit.contains("tokio::spawn"),
        "settlement must run on its own task"
    );

    let routes = file(&files, "lens-x402-facilitator/src/routes.rs");
    let settle = function_body(routes, "settle");
    assert!(
        settle.contains("tokio::spawn"),
        "the facilitator's /settle must not be cancelled with its request"
    );
}

#[test]
fn error_responses_do_not_leak_internals() {
    let dangerous = ["database error", "stack trace", "RUST_BACKTRACE", "{e}\""];

    for (path, content) in &production_source_files() {
        if !content.contains("HttpResponse::") {
            continue;
        }
        let prod = production_lines(content);
        for (i, line) in prod.lines().enumerate() {
            if !(line.contains("json!") || line.contains("\"message\"")) {
                continue;
            }
            for pattern in &dangerous {
                assert!(
                    !line.contains(pattern),
                    "sensitive detail {pattern:?} in HTTP response at {path}:{}",
                    i + 1
                );
            }
        }
    }
}
