mod helpers;

use helpers::raw_newsletter;
use newsfold::{
    email::{
        DomainRateLimiter, EmailProcessor, EmailValidator, InboundEmail, LogNotifier, RiskLevel,
    },
    entities::Source,
    storage::MemoryStore,
};
use std::sync::Arc;
use uuid::Uuid;

const ADDRESS: &str = "u7@in.newsfold.app";

struct Harness {
    store: MemoryStore,
    processor: EmailProcessor,
    user_id: Uuid,
    source_id: Uuid,
}

fn harness() -> Harness {
    let store = MemoryStore::new();
    let user_id = Uuid::new_v4();
    let source_id = store.insert_source(Source::new_forwarding(user_id, ADDRESS));
    let validator = EmailValidator::new(Arc::new(DomainRateLimiter::default()));
    let processor = EmailProcessor::new(Arc::new(store.clone()), validator, Arc::new(LogNotifier));
    Harness {
        store,
        processor,
        user_id,
        source_id,
    }
}

fn inbound(raw: String) -> InboundEmail {
    InboundEmail {
        envelope_to: vec![ADDRESS.to_string()],
        raw,
        subject: None,
        from: None,
    }
}

#[tokio::test]
async fn test_same_email_twice_is_an_exact_duplicate() {
    let h = harness();
    let raw = raw_newsletter(
        ADDRESS,
        "hello@weeklybyte.example.com",
        "The Weekly Byte Newsletter #87",
    );

    let first = h.processor.process(inbound(raw.clone())).await;
    assert!(first.success, "{first:?}");
    assert!(!first.duplicate);
    assert_eq!(first.risk_level, Some(RiskLevel::Low));

    let second = h.processor.process(inbound(raw)).await;
    assert!(second.success);
    assert!(second.duplicate);
    assert_eq!(second.item_id, None);

    assert_eq!(h.store.items_for_user(h.user_id).len(), 1);
    assert_eq!(h.store.source(h.source_id).unwrap().item_count, 1);
}

#[tokio::test]
async fn test_forwarded_copy_with_prefix_is_a_duplicate() {
    let h = harness();

    let original = raw_newsletter(
        ADDRESS,
        "hello@weeklybyte.example.com",
        "The Weekly Byte Newsletter #88",
    );
    let forwarded = raw_newsletter(
        ADDRESS,
        "hello@weeklybyte.example.com",
        "Fwd: The Weekly Byte Newsletter #88",
    );

    assert!(!h.processor.process(inbound(original)).await.duplicate);
    let again = h.processor.process(inbound(forwarded)).await;
    assert!(again.success);
    assert!(again.duplicate);
}

#[tokio::test]
async fn test_spam_is_rejected_and_not_stored() {
    let h = harness();
    let raw = "From: promo@deals.example.com\r\n\
               To: u7@in.newsfold.app\r\n\
               Subject: FREE MONEY!!! ACT NOW!!!\r\n\
               Content-Type: text/html\r\n\
               \r\n\
               <p>FREE MONEY!!! ACT NOW!!! Click here before it is gone.</p>\r\n"
        .to_string();

    let result = h.processor.process(inbound(raw)).await;
    assert!(!result.success);
    assert_eq!(result.risk_level, Some(RiskLevel::High));
    assert!(result.confidence.unwrap() < 70);
    assert_eq!(h.store.item_count(), 0);
}

#[tokio::test]
async fn test_eleventh_email_from_a_domain_is_rate_limited() {
    let h = harness();

    for n in 1..=10 {
        let raw = raw_newsletter(
            ADDRESS,
            "digest@flood.example.com",
            &format!("Daily Digest Newsletter #{n}"),
        );
        let result = h.processor.process(inbound(raw)).await;
        assert!(result.success, "email {n} rejected: {:?}", result.reason);
    }

    let raw = raw_newsletter(
        ADDRESS,
        "digest@flood.example.com",
        "Daily Digest Newsletter #11",
    );
    let eleventh = h.processor.process(inbound(raw)).await;
    assert!(!eleventh.success);
    assert!(eleventh.reason.unwrap().contains("rate limit"));

    // Another domain is unaffected
    let raw = raw_newsletter(ADDRESS, "hello@calm.example.com", "Calm Weekly Newsletter #1");
    assert!(h.processor.process(inbound(raw)).await.success);
}

#[tokio::test]
async fn test_unknown_forwarding_address_is_rejected() {
    let h = harness();
    let result = h
        .processor
        .process(InboundEmail {
            envelope_to: vec!["nobody@in.newsfold.app".to_string()],
            raw: raw_newsletter(
                "nobody@in.newsfold.app",
                "hello@weeklybyte.example.com",
                "Weekly Newsletter #1",
            ),
            subject: None,
            from: None,
        })
        .await;

    assert!(!result.success);
    assert_eq!(result.reason.as_deref(), Some("unknown forwarding address"));
    assert_eq!(h.store.item_count(), 0);
}

#[tokio::test]
async fn test_message_not_delivered_to_the_forwarding_address_is_rejected() {
    let h = harness();
    let raw = raw_newsletter(
        "stranger@elsewhere.example",
        "hello@weeklybyte.example.com",
        "The Weekly Byte Newsletter #89",
    );
    let result = h.processor.process(inbound(raw)).await;

    assert!(!result.success);
    assert_eq!(result.reason, Some(format!("not addressed to {ADDRESS}")));
    assert_eq!(h.store.item_count(), 0);
}

#[tokio::test]
async fn test_disposable_sender_is_rejected() {
    let h = harness();
    let raw = raw_newsletter(ADDRESS, "news@mailinator.com", "Weekly Newsletter #5");
    let result = h.processor.process(inbound(raw)).await;

    assert!(!result.success);
    assert!(result.reason.unwrap().contains("disposable"));
}
