//! End-to-end signed-nonce login: register, challenge, sign, verify.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use flk_core::config::AuthConfig;
use flk_core::AuthRejection;
use flk_crypto::identity::encode_signature;
use flk_crypto::{derive_key_pair, generate_phrase, IdentityKeyPair, LoginService, SeedPhrase};

fn new_identity() -> IdentityKeyPair {
    derive_key_pair(&generate_phrase().unwrap()).unwrap()
}

fn sign_challenge(kp: &IdentityKeyPair, nonce_b64: &str) -> String {
    let nonce = STANDARD.decode(nonce_b64).unwrap();
    encode_signature(&flk_crypto::sign(&nonce, kp))
}

#[test]
fn register_then_login_succeeds() {
    let svc = LoginService::in_memory(&AuthConfig::default());
    let kp = new_identity();
    svc.register(&kp.public_identity()).unwrap();

    let nonce = svc.start_login(kp.user_id());
    let token = svc
        .finish_login(kp.user_id(), &sign_challenge(&kp, &nonce))
        .expect("valid signature should authenticate");
    assert_eq!(token.user_id, kp.user_id());
    assert!(!token.token.is_empty());
}

#[test]
fn restored_phrase_can_log_in() {
    let svc = LoginService::in_memory(&AuthConfig::default());
    let phrase = generate_phrase().unwrap();
    let original = derive_key_pair(&phrase).unwrap();
    svc.register(&original.public_identity()).unwrap();

    // A second device restores the identity from the written-down words
    let restored = derive_key_pair(&SeedPhrase::parse(&phrase.phrase()).unwrap()).unwrap();
    let nonce = svc.start_login(restored.user_id());
    assert!(svc
        .finish_login(restored.user_id(), &sign_challenge(&restored, &nonce))
        .is_ok());
}

#[test]
fn replayed_signature_is_rejected() {
    let svc = LoginService::in_memory(&AuthConfig::default());
    let kp = new_identity();
    svc.register(&kp.public_identity()).unwrap();

    let nonce = svc.start_login(kp.user_id());
    let sig = sign_challenge(&kp, &nonce);
    svc.finish_login(kp.user_id(), &sig).unwrap();

    let err = svc.finish_login(kp.user_id(), &sig).unwrap_err();
    assert_eq!(err.auth_reason(), Some(AuthRejection::NonceMissing));
}

#[test]
fn bad_signature_burns_the_nonce() {
    let svc = LoginService::in_memory(&AuthConfig::default());
    let kp = new_identity();
    let impostor = new_identity();
    svc.register(&kp.public_identity()).unwrap();

    let nonce = svc.start_login(kp.user_id());
    let err = svc
        .finish_login(kp.user_id(), &sign_challenge(&impostor, &nonce))
        .unwrap_err();
    assert_eq!(err.auth_reason(), Some(AuthRejection::BadSignature));
    assert_eq!(err.to_string(), "unauthorized");

    let err = svc
        .finish_login(kp.user_id(), &sign_challenge(&kp, &nonce))
        .unwrap_err();
    assert_eq!(err.auth_reason(), Some(AuthRejection::NonceMissing));
}

#[test]
fn expired_nonce_is_rejected() {
    let svc = LoginService::in_memory(&AuthConfig { nonce_ttl_secs: 0 });
    let kp = new_identity();
    svc.register(&kp.public_identity()).unwrap();

    let nonce = svc.start_login(kp.user_id());
    let err = svc
        .finish_login(kp.user_id(), &sign_challenge(&kp, &nonce))
        .unwrap_err();
    assert_eq!(err.auth_reason(), Some(AuthRejection::NonceExpired));
}

#[test]
fn signature_over_stale_nonce_fails_after_reissue() {
    let svc = LoginService::in_memory(&AuthConfig::default());
    let kp = new_identity();
    svc.register(&kp.public_identity()).unwrap();

    let stale = svc.start_login(kp.user_id());
    let _fresh = svc.start_login(kp.user_id());
    let err = svc
        .finish_login(kp.user_id(), &sign_challenge(&kp, &stale))
        .unwrap_err();
    assert_eq!(err.auth_reason(), Some(AuthRejection::BadSignature));
}

#[test]
fn concurrent_finish_authenticates_once() {
    let svc = Arc::new(LoginService::in_memory(&AuthConfig::default()));
    let kp = new_identity();
    svc.register(&kp.public_identity()).unwrap();

    let nonce = svc.start_login(kp.user_id());
    let sig = sign_challenge(&kp, &nonce);
    let user_id = kp.user_id().to_string();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let svc = Arc::clone(&svc);
            let sig = sig.clone();
            let user_id = user_id.clone();
            thread::spawn(move || svc.finish_login(&user_id, &sig).is_ok())
        })
        .collect();

    let successes = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|ok| *ok)
        .count();
    assert_eq!(successes, 1);
}

#[test]
fn evict_expired_sweeps_abandoned_challenges() {
    let svc = LoginService::new(
        flk_crypto::InMemoryDirectory::new(),
        flk_crypto::RandomTokenIssuer,
        Duration::from_millis(20),
    );
    svc.start_login("a");
    svc.start_login("b");
    thread::sleep(Duration::from_millis(50));
    assert_eq!(svc.evict_expired(), 2);
}

#[test]
fn abandoned_challenges_do_not_accumulate() {
    let svc = LoginService::new(
        flk_crypto::InMemoryDirectory::new(),
        flk_crypto::RandomTokenIssuer,
        Duration::from_millis(5),
    );
    for i in 0..1000 {
        svc.start_login(&format!("ghost-{i}"));
    }
    thread::sleep(Duration::from_millis(40));
    for i in 0..1000 {
        svc.start_login(&format!("late-{i}"));
    }
    thread::sleep(Duration::from_millis(40));
    // the first wave was dropped while the second was issued
    assert!(svc.evict_expired() <= 1000);
}
