/// Client-side prediction: acquires are claimed locally at once, then
/// confirmed, or rolled back when the server disagrees.
use std::{cell::RefCell, rc::Rc};

use netpool_client::shared::{
    AcquireFailedEvent, AcquireGrantedEvent, AcquireTicket, ActivatedEvent, Archetype, ClientId,
    DenyReason, MissReason, OwnerAuthority, PoolError, PoolPolicy, PredictionMiss,
    PredictionMissEvent, ReleaseProgress, ReleasedEvent, RequestId, SlotKey, SlotState,
    SpawnContext,
};
use netpool_test::{
    exchange_packets, exchange_packets_n_times, projectile, projectile_policy, test_client,
    test_server, BehaviorLog, LocalTransportHub,
};

fn predicted(ticket: AcquireTicket) -> (RequestId, SlotKey) {
    match ticket {
        AcquireTicket::Requested {
            request,
            predicted: Some(key),
        } => (request, key),
        other => panic!("expected a predicted request, got {other:?}"),
    }
}

#[test]
fn reserved_prediction_is_confirmed_by_the_server() {
    let hub = LocalTransportHub::new();
    let log = Rc::new(RefCell::new(BehaviorLog::default()));
    let pools = [(projectile(), projectile_policy())];
    let mut server = test_server(&hub, &pools, &log);
    let mut client = test_client(&hub, 1, &pools, &log);
    server.connect_user(client.client_id()).unwrap();
    exchange_packets(&mut server, &mut [&mut client]);

    let (request, key) = predicted(
        client
            .request_acquire(&projectile(), SpawnContext::default())
            .unwrap(),
    );
    let local = client.slot(key.slot()).unwrap();
    assert_eq!(local.state, SlotState::Reserved);
    assert_eq!(local.owner, OwnerAuthority::PredictingClient(ClientId::new(1)));
    assert!(client.handle(key.slot()).is_none());

    exchange_packets(&mut server, &mut [&mut client]);

    let granted = server.slot(key.slot()).unwrap();
    assert_eq!(granted.owner, OwnerAuthority::Client(ClientId::new(1)));
    assert_eq!(client.slot(key.slot()).unwrap(), granted);

    let mut events = client.take_events();
    assert_eq!(
        events.read::<AcquireGrantedEvent>().collect::<Vec<_>>(),
        vec![(request, granted.key())]
    );
    assert!(!events.has::<PredictionMissEvent>());
    assert!(client.handle(key.slot()).unwrap().visible);
}

#[test]
fn optimistic_prediction_is_visible_before_the_server_answers() {
    let hub = LocalTransportHub::new();
    let log = Rc::new(RefCell::new(BehaviorLog::default()));
    let policy = PoolPolicy {
        allow_optimistic_active: true,
        ..projectile_policy()
    };
    let pools = [(projectile(), policy)];
    let mut server = test_server(&hub, &pools, &log);
    let mut client = test_client(&hub, 1, &pools, &log);
    server.connect_user(client.client_id()).unwrap();
    exchange_packets(&mut server, &mut [&mut client]);

    let (_, key) = predicted(
        client
            .request_acquire(&projectile(), SpawnContext::default())
            .unwrap(),
    );
    assert_eq!(key.generation(), 1);
    assert!(client.is_active(key));
    assert!(client.slot(key.slot()).unwrap().is_tentative());
    let activations: Vec<_> = client.take_events().read::<ActivatedEvent>().collect();
    assert_eq!(
        activations,
        vec![(key, OwnerAuthority::PredictingClient(ClientId::new(1)))]
    );

    exchange_packets(&mut server, &mut [&mut client]);

    let view = client.slot(key.slot()).unwrap();
    assert!(!view.is_tentative());
    assert_eq!(view, server.slot(key.slot()).unwrap());
    assert!(client.is_active(key));
    assert_eq!(client.handle(key.slot()).unwrap().activations, 1);
}

#[test]
fn prediction_of_a_slot_granted_to_another_client_is_rolled_back() {
    let hub = LocalTransportHub::new();
    let log = Rc::new(RefCell::new(BehaviorLog::default()));
    let pools = [(projectile(), projectile_policy())];
    let mut server = test_server(&hub, &pools, &log);
    let mut alice = test_client(&hub, 1, &pools, &log);
    let mut bob = test_client(&hub, 2, &pools, &log);
    server.connect_user(alice.client_id()).unwrap();
    server.connect_user(bob.client_id()).unwrap();

    for _ in 0..3 {
        server
            .acquire(&projectile(), OwnerAuthority::Server, SpawnContext::default())
            .unwrap();
    }
    exchange_packets(&mut server, &mut [&mut alice, &mut bob]);
    alice.take_events();
    bob.take_events();

    let (_, alice_key) = predicted(
        alice
            .request_acquire(&projectile(), SpawnContext::default())
            .unwrap(),
    );
    let (bob_request, bob_key) = predicted(
        bob.request_acquire(&projectile(), SpawnContext::default())
            .unwrap(),
    );
    assert_eq!(alice_key.slot().index(), 3);
    assert_eq!(bob_key.slot().index(), 3);

    // alice's request reaches the server first
    exchange_packets(&mut server, &mut [&mut alice, &mut bob]);

    let slot_3 = bob_key.slot();
    assert_eq!(
        server.slot(slot_3).unwrap().owner,
        OwnerAuthority::Client(alice.client_id())
    );
    assert_eq!(bob.slot(slot_3).unwrap(), server.slot(slot_3).unwrap());
    assert_eq!(alice.slot(slot_3).unwrap(), server.slot(slot_3).unwrap());

    let mut events = bob.take_events();
    assert_eq!(
        events.read::<PredictionMissEvent>().collect::<Vec<_>>(),
        vec![PredictionMiss {
            request: Some(bob_request),
            slot: slot_3,
            reason: MissReason::ClaimedByOther,
        }]
    );
    let granted: Vec<_> = events.read::<AcquireGrantedEvent>().collect();
    assert_eq!(granted.len(), 1);
    let (request, bob_slot) = granted[0];
    assert_eq!(request, bob_request);
    assert_eq!(bob_slot.slot().index(), 4);
    assert_eq!(
        bob.slot(bob_slot.slot()).unwrap().owner,
        OwnerAuthority::Client(bob.client_id())
    );
    assert!(!alice.take_events().has::<PredictionMissEvent>());
}

#[test]
fn denied_optimistic_prediction_is_torn_down() {
    let hub = LocalTransportHub::new();
    let log = Rc::new(RefCell::new(BehaviorLog::default()));
    let spark = Archetype::new("Spark");
    let optimistic = PoolPolicy {
        allow_optimistic_active: true,
        ..PoolPolicy::fixed(2)
    };
    let mut server = test_server(&hub, &[(projectile(), projectile_policy())], &log);
    let mut client = test_client(
        &hub,
        1,
        &[(projectile(), projectile_policy()), (spark.clone(), optimistic)],
        &log,
    );
    server.connect_user(client.client_id()).unwrap();
    exchange_packets(&mut server, &mut [&mut client]);

    let (request, key) = predicted(client.request_acquire(&spark, SpawnContext::default()).unwrap());
    assert!(client.is_active(key));
    client.take_events();

    exchange_packets(&mut server, &mut [&mut client]);

    let view = client.slot(key.slot()).unwrap();
    assert_eq!(view.state, SlotState::Pooled);
    assert_eq!(view.generation, 0);
    assert!(!client.handle(key.slot()).is_some_and(|handle| handle.visible));

    let mut events = client.take_events();
    assert_eq!(
        events.read::<PredictionMissEvent>().collect::<Vec<_>>(),
        vec![PredictionMiss {
            request: Some(request),
            slot: key.slot(),
            reason: MissReason::Denied,
        }]
    );
    assert_eq!(
        events.read::<AcquireFailedEvent>().collect::<Vec<_>>(),
        vec![(request, DenyReason::UnknownArchetype)]
    );
    assert_eq!(events.read::<ReleasedEvent>().collect::<Vec<_>>(), vec![key.slot()]);
}

#[test]
fn cancelled_reservation_is_released_once_granted() {
    let hub = LocalTransportHub::new();
    let server_log = Rc::new(RefCell::new(BehaviorLog::default()));
    let client_log = Rc::new(RefCell::new(BehaviorLog::default()));
    let pools = [(projectile(), projectile_policy())];
    let mut server = test_server(&hub, &pools, &server_log);
    let mut client = test_client(&hub, 1, &pools, &client_log);
    server.connect_user(client.client_id()).unwrap();
    exchange_packets(&mut server, &mut [&mut client]);

    let (_, key) = predicted(
        client
            .request_acquire(&projectile(), SpawnContext::default())
            .unwrap(),
    );
    assert_eq!(client.release(key).unwrap(), ReleaseProgress::Completed);
    assert_eq!(client.slot(key.slot()).unwrap().state, SlotState::Pooled);

    exchange_packets_n_times(&mut server, &mut [&mut client], 2);

    let server_view = server.slot(key.slot()).unwrap();
    assert_eq!(server_view.state, SlotState::Pooled);
    assert_eq!(server_view.generation, 1);
    assert_eq!(client.slot(key.slot()).unwrap(), server_view);
    let events = client.take_events();
    assert!(!events.has::<AcquireGrantedEvent>());
    assert!(!events.has::<ActivatedEvent>());
    assert!(!events.has::<ReleasedEvent>());

    // gameplay never sees the cancelled spawn come back
    assert!(client_log.borrow().activated.is_empty());
    assert_eq!(client_log.borrow().deactivated, 0);
    assert!(client_log.borrow().released.is_empty());
    assert_eq!(server_log.borrow().activated.len(), 1);
}

#[test]
fn authority_only_archetypes_are_never_predicted() {
    let hub = LocalTransportHub::new();
    let log = Rc::new(RefCell::new(BehaviorLog::default()));
    let policy = PoolPolicy {
        authority_only: true,
        ..projectile_policy()
    };
    let pools = [(projectile(), policy)];
    let mut server = test_server(&hub, &pools, &log);
    let mut client = test_client(&hub, 1, &pools, &log);
    server.connect_user(client.client_id()).unwrap();
    exchange_packets(&mut server, &mut [&mut client]);

    let ticket = client
        .request_acquire(&projectile(), SpawnContext::default())
        .unwrap();
    let AcquireTicket::Requested { request, predicted } = ticket else {
        panic!("client acquires are requests");
    };
    assert_eq!(predicted, None);
    assert_eq!(client.pool_counts(&projectile()).unwrap().in_use(), 0);

    exchange_packets(&mut server, &mut [&mut client]);

    let granted: Vec<_> = client.take_events().read::<AcquireGrantedEvent>().collect();
    assert_eq!(granted.len(), 1);
    assert_eq!(granted[0].0, request);
    let key = granted[0].1;
    assert!(client.is_active(key));
    assert_eq!(client.slot(key.slot()).unwrap(), server.slot(key.slot()).unwrap());
}

#[test]
fn client_release_of_an_owned_slot_goes_through_the_server() {
    let hub = LocalTransportHub::new();
    let log = Rc::new(RefCell::new(BehaviorLog::default()));
    let pools = [(projectile(), projectile_policy())];
    let mut server = test_server(&hub, &pools, &log);
    let mut client = test_client(&hub, 1, &pools, &log);
    server.connect_user(client.client_id()).unwrap();
    exchange_packets(&mut server, &mut [&mut client]);

    let server_owned = server
        .acquire(&projectile(), OwnerAuthority::Server, SpawnContext::default())
        .unwrap();
    exchange_packets(&mut server, &mut [&mut client]);
    let (_, reserved) = predicted(
        client
            .request_acquire(&projectile(), SpawnContext::default())
            .unwrap(),
    );
    exchange_packets(&mut server, &mut [&mut client]);
    let owned = client.slot(reserved.slot()).unwrap().key();

    assert!(matches!(
        client.release(server_owned),
        Err(PoolError::NotOwner { .. })
    ));
    assert_eq!(client.release(owned).unwrap(), ReleaseProgress::Requested);
    assert!(client.is_active(owned));

    exchange_packets(&mut server, &mut [&mut client]);

    assert_eq!(server.slot(owned.slot()).unwrap().state, SlotState::Pooled);
    assert_eq!(client.slot(owned.slot()).unwrap().state, SlotState::Pooled);
    assert!(server.is_active(server_owned));
}
