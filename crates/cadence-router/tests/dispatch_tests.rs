//! Signature Dispatch Tests
//!
//! - Key resolution by payload shape
//! - Positional argument extraction
//! - Fallback and dispatch errors
//! - Registration conflicts

use cadence_router::{Args, EventRouter, EventTable, Fallback, Handler, RouterError, Signature};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;

/// Calls seen by the test handlers: (handler name, positional args)
type Log = Arc<Mutex<Vec<(String, Vec<Option<Value>>)>>>;

fn recording(name: &'static str, params: &[&str]) -> Handler<Log> {
    let signature = Signature::parse(params.iter().copied()).expect("bad signature");
    Handler::new(name, signature, move |log: Log, args: Args| async move {
        let values = (0..args.len()).map(|i| args.get(i).cloned()).collect();
        log.lock().push((name.to_string(), values));
        Ok(())
    })
}

fn fallback() -> Fallback<Log> {
    Fallback::new("fallback", |log: Log, payload: Option<Value>| async move {
        log.lock().push(("fallback".to_string(), vec![payload]));
        Ok(())
    })
}

fn router() -> EventRouter<Log> {
    let mut router = EventRouter::new("test");
    router.register(recording("h1", &["a", "b"])).unwrap();
    router.register(recording("h2", &["a", "$c"])).unwrap();
    router.register(recording("zero", &[])).unwrap();
    router.register_fallback(fallback()).unwrap();
    router
}

fn last(log: &Log) -> (String, Vec<Option<Value>>) {
    log.lock().last().cloned().expect("nothing dispatched")
}

#[tokio::test]
async fn test_optional_field_selects_handler() {
    let router = router();
    let log = Log::default();

    router
        .dispatch(log.clone(), Some(json!({ "a": 1, "c": 2 })))
        .await
        .unwrap();
    assert_eq!(last(&log), ("h2".into(), vec![Some(json!(1)), Some(json!(2))]));

    router
        .dispatch(log.clone(), Some(json!({ "a": 1 })))
        .await
        .unwrap();
    assert_eq!(last(&log), ("h2".into(), vec![Some(json!(1)), None]));
}

#[tokio::test]
async fn test_required_fields_select_handler() {
    let router = router();
    let log = Log::default();

    router
        .dispatch(log.clone(), Some(json!({ "b": 2, "a": 1 })))
        .await
        .unwrap();
    assert_eq!(last(&log), ("h1".into(), vec![Some(json!(1)), Some(json!(2))]));
}

#[tokio::test]
async fn test_unmatched_shape_goes_to_fallback() {
    let router = router();
    let log = Log::default();
    let payload = json!({ "a": 1, "b": 2, "c": 3 });

    router
        .dispatch(log.clone(), Some(payload.clone()))
        .await
        .unwrap();
    assert_eq!(last(&log), ("fallback".into(), vec![Some(payload)]));
}

#[tokio::test]
async fn test_shapeless_payloads_go_to_zero_arg() {
    let router = router();
    let log = Log::default();

    for payload in [None, Some(json!({})), Some(json!([1, 2])), Some(json!("text"))] {
        router.dispatch(log.clone(), payload).await.unwrap();
        assert_eq!(last(&log), ("zero".into(), vec![]));
    }
}

#[tokio::test]
async fn test_no_match_without_fallback_is_dispatch_error() {
    let mut router = EventRouter::new("bare");
    router.register(recording("h1", &["a"])).unwrap();
    let log = Log::default();

    let err = router
        .dispatch(log.clone(), Some(json!({ "z": 1 })))
        .await
        .unwrap_err();
    assert!(matches!(err, RouterError::Dispatch { ref event, ref key } if event == "bare" && key == "z"));

    // no zero-arg handler either
    assert!(matches!(
        router.dispatch(log.clone(), None).await,
        Err(RouterError::Dispatch { .. })
    ));
    assert!(log.lock().is_empty());
}

#[tokio::test]
async fn test_overlapping_key_rejected_atomically() {
    let mut router: EventRouter<Log> = EventRouter::new("test");
    router.register(recording("h1", &["a", "b"])).unwrap();

    // keys "a", "b" and "a b": the last collides, so none may be installed
    let err = router.register(recording("h3", &["$a", "$b"])).unwrap_err();
    assert!(matches!(
        err,
        RouterError::DuplicateHandlerSignature { ref key, .. } if key == "a b"
    ));
    assert_eq!(router.keys().collect::<Vec<_>>(), vec!["a b"]);

    let log = Log::default();
    assert!(router.dispatch(log.clone(), Some(json!({ "a": 1 }))).await.is_err());
    router
        .dispatch(log.clone(), Some(json!({ "a": 1, "b": 2 })))
        .await
        .unwrap();
    assert_eq!(last(&log).0, "h1");
}

#[test]
fn test_second_zero_arg_and_fallback_rejected() {
    let mut router: EventRouter<Log> = EventRouter::new("test");
    router.register(recording("zero", &[])).unwrap();
    assert!(matches!(
        router.register(recording("zero2", &[])),
        Err(RouterError::DuplicateHandlerSignature { .. })
    ));

    router.register_fallback(fallback()).unwrap();
    assert!(router.register_fallback(fallback()).is_err());
}

#[test]
fn test_distinct_required_sets_never_collide() {
    // every pair of distinct required sets, each with the same optional field
    let sets: Vec<Vec<&str>> = vec![vec!["a"], vec!["b"], vec!["a", "b"], vec!["c", "a"]];
    let mut router: EventRouter<Log> = EventRouter::new("test");
    for (i, required) in sets.iter().enumerate() {
        let mut params: Vec<String> = required.iter().map(|s| s.to_string()).collect();
        params.push("$z".to_string());
        let signature = Signature::parse(params).unwrap();
        let name: &'static str = ["r0", "r1", "r2", "r3"][i];
        router
            .register(Handler::new(name, signature, |_: Log, _: Args| async { Ok(()) }))
            .unwrap_or_else(|e| panic!("{:?} collided: {}", required, e));
    }
    assert_eq!(router.keys().count(), sets.len() * 2);
}

#[tokio::test]
async fn test_event_table_routes_by_event_name() {
    let mut table: EventTable<Log> = EventTable::new();
    table.register("alpha", recording("alpha", &["x"])).unwrap();
    table.register("beta", recording("beta", &["x"])).unwrap();
    let log = Log::default();

    table
        .dispatch("beta", log.clone(), Some(json!({ "x": true })))
        .await
        .unwrap();
    assert_eq!(last(&log).0, "beta");

    assert!(matches!(
        table.dispatch("gamma", log.clone(), None).await,
        Err(RouterError::Dispatch { ref event, .. }) if event == "gamma"
    ));
}

#[tokio::test]
async fn test_handler_error_propagates() {
    let mut router: EventRouter<Log> = EventRouter::new("test");
    router
        .register(Handler::new(
            "boom",
            Signature::parse(["n"]).unwrap(),
            |_: Log, args: Args| async move {
                let _: u32 = args.required(0)?;
                Ok(())
            },
        ))
        .unwrap();

    let err = router
        .dispatch(Log::default(), Some(json!({ "n": "not a number" })))
        .await
        .unwrap_err();
    assert!(matches!(err, RouterError::InvalidArgument { ref name, .. } if name == "n"));
}
