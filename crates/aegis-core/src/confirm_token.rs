//! Single-use confirm tokens.
//!
//! A confirm token is an opaque capability reference into server-side state.
//! The token carries no payload; the stored [`ConfirmTokenRequest`] binds it to
//! the policy, route, caller and the exact body and prompt that were
//! evaluated. A captured token therefore cannot be replayed against an edited
//! payload, another route or another caller.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use dashmap::DashMap;
use rand::rngs::OsRng;
use rand::RngCore;
use crate::policy::MAX_CONFIRM_TTL_SECONDS;
use sha2::{Digest, Sha256};
use std::time::{Duration, Instant};

/// 256 bits of entropy per token.
const TOKEN_BYTES: usize = 32;

/// Default upper bound on live tokens.
pub const DEFAULT_CAPACITY: usize = 10_000;

/// What a confirm token is bound to. Equal only if every field matches.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConfirmTokenRequest {
    pub policy_id: String,
    pub route_id: Option<String>,
    pub user_id: Option<String>,
    pub body_hash: String,
    pub prompt_hash: String,
}

impl ConfirmTokenRequest {
    /// Binding for a concrete request, hashing the raw body and the extracted prompt.
    pub fn for_request(
        policy_id: &str,
        route_id: Option<&str>,
        user_id: Option<&str>,
        body: &[u8],
        prompt: &str,
    ) -> Self {
        Self {
            policy_id: policy_id.to_string(),
            route_id: route_id.map(str::to_string),
            user_id: user_id.map(str::to_string),
            body_hash: content_hash(body),
            prompt_hash: content_hash(prompt.as_bytes()),
        }
    }
}

/// SHA-256 of `data`, URL-safe base64 without padding.
pub fn content_hash(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(data))
}

/// Issues and consumes confirm tokens. Implementations must be safe to share
/// across concurrent requests.
pub trait ConfirmTokenService: Send + Sync {
    /// Issue a fresh token bound to `request`, valid for `ttl`.
    fn issue_token(&self, request: ConfirmTokenRequest, ttl: Duration) -> String;

    /// Consume `token` for `request`.
    ///
    /// Returns `true` exactly once, for the bound request, before expiry. A
    /// mismatched request returns `false` and leaves the token usable.
    fn try_consume_token(&self, token: &str, request: &ConfirmTokenRequest) -> bool;
}

#[derive(Debug, Clone)]
struct ConfirmTokenEntry {
    request: ConfirmTokenRequest,
    expires_at: Instant,
}

impl ConfirmTokenEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// In-process token store.
///
/// Consumption is a single `remove_if` under the shard lock, so two requests
/// racing on the same token cannot both succeed.
///
/// `capacity` is a soft bound: room is made before each insert without a
/// store-wide lock, so concurrent issuers may briefly overshoot it by the
/// number of in-flight `issue_token` calls.
#[derive(Debug)]
pub struct InMemoryConfirmTokenService {
    entries: DashMap<String, ConfirmTokenEntry>,
    capacity: usize,
}

impl Default for InMemoryConfirmTokenService {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl InMemoryConfirmTokenService {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Number of stored tokens, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop expired entries. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    fn make_room(&self) {
        if self.entries.len() < self.capacity {
            return;
        }
        self.purge_expired();

        let excess = (self.entries.len() + 1).saturating_sub(self.capacity);
        if excess == 0 {
            return;
        }

        let mut by_expiry: Vec<(Instant, String)> = self
            .entries
            .iter()
            .map(|entry| (entry.value().expires_at, entry.key().clone()))
            .collect();
        by_expiry.sort_unstable_by_key(|(expires_at, _)| *expires_at);
        for (_, token) in by_expiry.into_iter().take(excess) {
            self.entries.remove(&token);
        }
        tracing::warn!(
            capacity = self.capacity,
            evicted = excess,
            "confirm token store full; evicted entries closest to expiry"
        );
    }
}

fn expiry(now: Instant, ttl: Duration) -> Instant {
    let ttl = ttl.min(Duration::from_secs(MAX_CONFIRM_TTL_SECONDS));
    now.checked_add(ttl).unwrap_or(now)
}

impl ConfirmTokenService for InMemoryConfirmTokenService {
    fn issue_token(&self, request: ConfirmTokenRequest, ttl: Duration) -> String {
        let token = generate_token();
        let entry = ConfirmTokenEntry {
            request,
            expires_at: expiry(Instant::now(), ttl),
        };

        self.make_room();
        self.entries.insert(token.clone(), entry);
        token
    }

    fn try_consume_token(&self, token: &str, request: &ConfirmTokenRequest) -> bool {
        if token.trim().is_empty() {
            return false;
        }

        let now = Instant::now();
        let consumed = self
            .entries
            .remove_if(token, |_, entry| !entry.is_expired(now) && entry.request == *request)
            .is_some();

        if !consumed {
            // Expired entries are dead weight either way.
            self.entries.remove_if(token, |_, entry| entry.is_expired(now));
        }
        consumed
    }
}

fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn request(suffix: &str) -> ConfirmTokenRequest {
        ConfirmTokenRequest {
            policy_id: format!("policy-{suffix}"),
            route_id: Some(format!("route-{suffix}")),
            user_id: Some(format!("user-{suffix}")),
            body_hash: format!("bodyhash-{suffix}"),
            prompt_hash: format!("prompthash-{suffix}"),
        }
    }

    const MINUTE: Duration = Duration::from_secs(60);

    #[test]
    fn test_tokens_are_url_safe_and_unique() {
        let service = InMemoryConfirmTokenService::default();
        let req = request("1");

        let t1 = service.issue_token(req.clone(), MINUTE);
        let t2 = service.issue_token(req, MINUTE);

        assert_ne!(t1, t2);
        assert_eq!(t1.len(), 43); // 32 bytes, unpadded base64
        for token in [&t1, &t2] {
            assert!(!token.contains('+'));
            assert!(!token.contains('/'));
            assert!(!token.contains('='));
        }
    }

    #[test]
    fn test_blank_token_fails() {
        let service = InMemoryConfirmTokenService::default();
        assert!(!service.try_consume_token("", &request("1")));
        assert!(!service.try_consume_token("   ", &request("1")));
    }

    #[test]
    fn test_unknown_token_fails() {
        let service = InMemoryConfirmTokenService::default();
        assert!(!service.try_consume_token("does-not-exist", &request("1")));
    }

    #[test]
    fn test_consumes_exactly_once() {
        let service = InMemoryConfirmTokenService::default();
        let req = request("1");
        let token = service.issue_token(req.clone(), MINUTE);

        assert!(service.try_consume_token(&token, &req));
        assert!(!service.try_consume_token(&token, &req));
        assert!(!service.try_consume_token(&token, &request("2")));
    }

    #[test]
    fn test_identical_requests_get_independent_tokens() {
        let service = InMemoryConfirmTokenService::default();
        let req = request("1");
        let t1 = service.issue_token(req.clone(), MINUTE);
        let t2 = service.issue_token(req.clone(), MINUTE);

        assert!(service.try_consume_token(&t2, &req));
        assert!(service.try_consume_token(&t1, &req));
    }

    #[test]
    fn test_mismatched_request_does_not_burn_token() {
        let service = InMemoryConfirmTokenService::default();
        let req = request("1");
        let token = service.issue_token(req.clone(), MINUTE);

        let mut edited_prompt = req.clone();
        edited_prompt.prompt_hash = "other".to_string();
        let mut other_user = req.clone();
        other_user.user_id = None;
        let mut other_route = req.clone();
        other_route.route_id = Some("route-2".to_string());

        assert!(!service.try_consume_token(&token, &edited_prompt));
        assert!(!service.try_consume_token(&token, &other_user));
        assert!(!service.try_consume_token(&token, &other_route));
        assert!(!service.try_consume_token(&token, &request("2")));
        assert!(service.try_consume_token(&token, &req));
    }

    #[test]
    fn test_expired_token_fails() {
        let service = InMemoryConfirmTokenService::default();
        let req = request("1");
        let token = service.issue_token(req.clone(), Duration::from_millis(50));

        std::thread::sleep(Duration::from_millis(150));

        assert!(!service.try_consume_token(&token, &req));
        assert!(service.is_empty());
    }

    #[test]
    fn test_purge_expired() {
        let service = InMemoryConfirmTokenService::default();
        service.issue_token(request("1"), Duration::ZERO);
        let live = service.issue_token(request("2"), MINUTE);

        assert_eq!(service.purge_expired(), 1);
        assert_eq!(service.len(), 1);
        assert!(service.try_consume_token(&live, &request("2")));
    }

    #[test]
    fn test_capacity_evicts_entry_closest_to_expiry() {
        let service = InMemoryConfirmTokenService::new(2);
        let short = service.issue_token(request("1"), Duration::from_secs(10));
        let long = service.issue_token(request("2"), Duration::from_secs(600));
        let newest = service.issue_token(request("3"), Duration::from_secs(300));

        assert_eq!(service.len(), 2);
        assert!(!service.try_consume_token(&short, &request("1")));
        assert!(service.try_consume_token(&long, &request("2")));
        assert!(service.try_consume_token(&newest, &request("3")));
    }

    #[test]
    fn test_oversized_ttl_is_clamped() {
        let service = InMemoryConfirmTokenService::default();
        let req = request("1");
        let token = service.issue_token(req.clone(), Duration::from_secs(u64::MAX));
        assert!(service.try_consume_token(&token, &req));

        let now = Instant::now();
        assert_eq!(
            expiry(now, Duration::MAX),
            now + Duration::from_secs(MAX_CONFIRM_TTL_SECONDS)
        );
    }

    #[test]
    fn test_full_store_evicts_in_one_pass() {
        let service = InMemoryConfirmTokenService::new(3);
        let first = service.issue_token(request("1"), Duration::from_secs(10));
        service.issue_token(request("2"), Duration::from_secs(20));
        service.issue_token(request("3"), Duration::from_secs(30));
        let fourth = service.issue_token(request("4"), Duration::from_secs(40));

        assert_eq!(service.len(), 3);
        assert!(!service.try_consume_token(&first, &request("1")));
        assert!(service.try_consume_token(&fourth, &request("4")));
    }

    #[test]
    fn test_concurrent_consume_succeeds_once() {
        let service = Arc::new(InMemoryConfirmTokenService::default());
        let req = request("race");

        for _ in 0..20 {
            let token = service.issue_token(req.clone(), MINUTE);
            let successes = Arc::new(AtomicUsize::new(0));

            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let service = Arc::clone(&service);
                    let successes = Arc::clone(&successes);
                    let token = token.clone();
                    let req = req.clone();
                    std::thread::spawn(move || {
                        if service.try_consume_token(&token, &req) {
                            successes.fetch_add(1, Ordering::SeqCst);
                        }
                    })
                })
                .collect();

            for handle in handles {
                handle.join().unwrap();
            }
            assert_eq!(successes.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn test_binding_hashes_body_and_prompt() {
        let a = ConfirmTokenRequest::for_request("Default", Some("r1"), None, b"{\"prompt\":\"x\"}", "x");
        let b = ConfirmTokenRequest::for_request("Default", Some("r1"), None, b"{\"prompt\":\"x\"}", "x");
        let c = ConfirmTokenRequest::for_request("Default", Some("r1"), None, b"{\"prompt\":\"x\" }", "x");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.prompt_hash, c.prompt_hash);
        assert!(!a.body_hash.contains('='));
    }

    #[test]
    fn test_content_hash_known_value() {
        // SHA-256("") in unpadded URL-safe base64.
        assert_eq!(content_hash(b""), "47DEQpj8HBSa-_TImW-5JCeuQeRkm5NMpJWZG3hSuFU");
    }
}
